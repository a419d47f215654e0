//! Benchmark utilities.

use unitwork_core::entity::{EntityRef, EntityType};
use unitwork_core::DependencyManager;
use unitwork_testkit::{AuditLog, Node};

/// Type ids of the eight benchmark node types.
pub fn node_types() -> Vec<EntityType> {
    vec![
        EntityType::of::<Node<0>>(),
        EntityType::of::<Node<1>>(),
        EntityType::of::<Node<2>>(),
        EntityType::of::<Node<3>>(),
        EntityType::of::<Node<4>>(),
        EntityType::of::<Node<5>>(),
        EntityType::of::<Node<6>>(),
        EntityType::of::<Node<7>>(),
    ]
}

/// A graph where every node type depends on the one before it.
pub fn chain_graph() -> DependencyManager {
    let types = node_types();
    let mut deps = DependencyManager::new();
    for pair in types.windows(2) {
        deps.register_dependency(pair[1], pair[0]);
    }
    deps
}

/// `count` nodes spread round-robin over the node types, last type first.
///
/// Nodes are unsaved unless `with_ids` is set.
pub fn generate_nodes(count: usize, with_ids: bool) -> Vec<EntityRef> {
    (0..count)
        .map(|i| {
            let id = if with_ids { i as u64 + 1 } else { 0 };
            match 7 - i % 8 {
                0 => EntityRef::new(Node::<0>::new(id)),
                1 => EntityRef::new(Node::<1>::new(id)),
                2 => EntityRef::new(Node::<2>::new(id)),
                3 => EntityRef::new(Node::<3>::new(id)),
                4 => EntityRef::new(Node::<4>::new(id)),
                5 => EntityRef::new(Node::<5>::new(id)),
                6 => EntityRef::new(Node::<6>::new(id)),
                _ => EntityRef::new(Node::<7>::new(id)),
            }
        })
        .collect()
}

/// `count` unsaved audit entries.
pub fn generate_logs(count: usize) -> Vec<EntityRef> {
    (0..count)
        .map(|i| EntityRef::new(AuditLog::new(&format!("entry {i}"))))
        .collect()
}

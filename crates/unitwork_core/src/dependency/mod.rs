//! Dependency manager.
//!
//! A directed graph over entity types. An edge `dependent -> dependency`
//! means rows of `dependency` must exist before rows of `dependent` are
//! inserted, and must outlive them on delete.
//!
//! Ordering uses Kahn's algorithm restricted to the types present in the
//! input. Whenever several types become ready at once they are taken in
//! ascending `(weight, type name)` order, so the result is fully
//! deterministic.

use crate::entity::{Entity, EntityRef, EntityType};
use crate::error::{CoreError, CoreResult};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Dependency graph and ordering weights for entity types.
#[derive(Debug, Clone, Default)]
pub struct DependencyManager {
    /// dependent -> types it depends on, without duplicates.
    dependencies: HashMap<EntityType, Vec<EntityType>>,
    weights: HashMap<EntityType, i32>,
}

impl DependencyManager {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `dependent` depends on `dependency`.
    ///
    /// Returns false if the edge already existed or is a self-edge; neither
    /// changes the graph.
    pub fn register_dependency(&mut self, dependent: EntityType, dependency: EntityType) -> bool {
        if dependent == dependency {
            return false;
        }
        let edges = self.dependencies.entry(dependent).or_default();
        if edges.contains(&dependency) {
            return false;
        }
        edges.push(dependency);
        true
    }

    /// Typed form of [`register_dependency`](Self::register_dependency).
    pub fn depends_on<D: Entity, P: Entity>(&mut self) -> bool {
        self.register_dependency(EntityType::of::<D>(), EntityType::of::<P>())
    }

    /// Removes an edge, returning true if it existed.
    pub fn remove_dependency(&mut self, dependent: EntityType, dependency: EntityType) -> bool {
        let Some(edges) = self.dependencies.get_mut(&dependent) else {
            return false;
        };
        let before = edges.len();
        edges.retain(|t| *t != dependency);
        let removed = edges.len() != before;
        if edges.is_empty() {
            self.dependencies.remove(&dependent);
        }
        removed
    }

    /// Returns true if the edge `dependent -> dependency` exists.
    #[must_use]
    pub fn has_dependency(&self, dependent: EntityType, dependency: EntityType) -> bool {
        self.dependencies
            .get(&dependent)
            .is_some_and(|edges| edges.contains(&dependency))
    }

    /// Returns the direct dependencies of a type in registration order.
    #[must_use]
    pub fn dependencies_of(&self, dependent: EntityType) -> &[EntityType] {
        self.dependencies
            .get(&dependent)
            .map_or(&[], |edges| edges.as_slice())
    }

    /// Sets the tie-breaking weight of a type. Lower weights go first.
    pub fn register_entity_weight(&mut self, entity_type: EntityType, weight: i32) {
        self.weights.insert(entity_type, weight);
    }

    /// Returns the weight of a type, zero if unset.
    #[must_use]
    pub fn weight(&self, entity_type: EntityType) -> i32 {
        self.weights.get(&entity_type).copied().unwrap_or(0)
    }

    /// Returns every type mentioned by an edge or a weight, sorted by name.
    #[must_use]
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types = BTreeSet::new();
        for (dependent, edges) in &self.dependencies {
            types.insert(*dependent);
            types.extend(edges.iter().copied());
        }
        types.extend(self.weights.keys().copied());
        types.into_iter().collect()
    }

    /// Removes every edge and weight.
    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.weights.clear();
    }

    /// Orders the given types so every dependency precedes its dependents.
    ///
    /// Duplicates in `types` are ignored. Edges to types not in `types` are
    /// ignored as well.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CircularDependency`] naming the unresolved types
    /// if the restricted graph has a cycle.
    pub fn resolve_type_order(&self, types: &[EntityType]) -> CoreResult<Vec<EntityType>> {
        let present: BTreeSet<EntityType> = types.iter().copied().collect();

        let mut in_degree: HashMap<EntityType, usize> = HashMap::with_capacity(present.len());
        let mut dependents: HashMap<EntityType, Vec<EntityType>> = HashMap::new();
        for ty in &present {
            let deps: Vec<EntityType> = self
                .dependencies_of(*ty)
                .iter()
                .copied()
                .filter(|d| present.contains(d))
                .collect();
            in_degree.insert(*ty, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(*ty);
            }
        }

        let mut ready: Vec<EntityType> = present
            .iter()
            .copied()
            .filter(|ty| in_degree.get(ty) == Some(&0))
            .collect();
        self.sort_ready(&mut ready);
        let mut queue: VecDeque<EntityType> = ready.into();

        let mut order = Vec::with_capacity(present.len());
        while let Some(ty) = queue.pop_front() {
            order.push(ty);

            let mut released = Vec::new();
            for dependent in dependents.get(&ty).map_or(&[][..], Vec::as_slice) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        released.push(*dependent);
                    }
                }
            }
            self.sort_ready(&mut released);
            queue.extend(released);
        }

        if order.len() != present.len() {
            let resolved: BTreeSet<EntityType> = order.into_iter().collect();
            let types = present
                .difference(&resolved)
                .map(|ty| ty.name().to_string())
                .collect();
            return Err(CoreError::CircularDependency { types });
        }

        Ok(order)
    }

    /// Orders entities for insertion.
    ///
    /// Types follow [`resolve_type_order`](Self::resolve_type_order);
    /// entities of one type are ordered by their stringified id, keeping
    /// input order among equal ids.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CircularDependency`] if the types involved
    /// cannot be ordered.
    pub fn insertion_order(&self, entities: &[EntityRef]) -> CoreResult<Vec<EntityRef>> {
        let mut by_type: HashMap<EntityType, Vec<(String, EntityRef)>> = HashMap::new();
        let mut types = Vec::new();
        for entity in entities {
            let ty = entity.entity_type();
            let group = by_type.entry(ty).or_insert_with(|| {
                types.push(ty);
                Vec::new()
            });
            group.push((entity.id().to_string(), entity.clone()));
        }

        let mut ordered = Vec::with_capacity(entities.len());
        for ty in self.resolve_type_order(&types)? {
            if let Some(mut group) = by_type.remove(&ty) {
                group.sort_by(|a, b| a.0.cmp(&b.0));
                ordered.extend(group.into_iter().map(|(_, entity)| entity));
            }
        }
        Ok(ordered)
    }

    /// Orders entities for deletion: the exact reverse of
    /// [`insertion_order`](Self::insertion_order).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CircularDependency`] if the types involved
    /// cannot be ordered.
    pub fn deletion_order(&self, entities: &[EntityRef]) -> CoreResult<Vec<EntityRef>> {
        let mut ordered = self.insertion_order(entities)?;
        ordered.reverse();
        Ok(ordered)
    }

    fn sort_ready(&self, types: &mut [EntityType]) {
        types.sort_by(|a, b| {
            self.weight(*a)
                .cmp(&self.weight(*b))
                .then_with(|| a.cmp(b))
        });
    }
}

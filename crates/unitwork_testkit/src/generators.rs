//! Property-based test generators using proptest.
//!
//! Provides strategies for field maps, fixture entities, mutations and
//! acyclic dependency graphs.

use crate::fixtures::{Profile, User};
use proptest::prelude::*;
use serde_json::Value;
use unitwork_core::entity::FieldValues;

/// Strategy for field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for JSON field values, nested up to three levels.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Strategy for entity field maps.
pub fn field_map_strategy() -> impl Strategy<Value = FieldValues> {
    prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..8)
}

/// Strategy for valid, unsaved users.
pub fn user_strategy() -> impl Strategy<Value = User> {
    (
        "[A-Z][a-z]{1,8}",
        prop::collection::vec("[a-z]{1,6}", 0..4),
        prop::option::of(("[a-z ]{0,20}", 0u32..120)),
    )
        .prop_map(|(name, tags, profile)| {
            let mut user = User::new(&name, &format!("{}@example.com", name.to_lowercase()));
            user.tags = tags;
            user.profile = profile.map(|(bio, age)| Profile { bio, age });
            user
        })
}

/// A change applied to a [`User`].
#[derive(Debug, Clone)]
pub enum UserMutation {
    /// Replace the name.
    Rename(String),
    /// Append a tag.
    AddTag(String),
    /// Remove every tag.
    ClearTags,
    /// Replace the profile.
    SetProfile(Option<Profile>),
    /// Write the current value back. Changes nothing.
    Touch,
}

impl UserMutation {
    /// Applies the mutation.
    pub fn apply(&self, user: &mut User) {
        match self {
            Self::Rename(name) => user.name = name.clone(),
            Self::AddTag(tag) => user.tags.push(tag.clone()),
            Self::ClearTags => user.tags.clear(),
            Self::SetProfile(profile) => user.profile = profile.clone(),
            Self::Touch => {
                let name = user.name.clone();
                user.name = name;
            }
        }
    }
}

/// Strategy for user mutations.
pub fn user_mutation_strategy() -> impl Strategy<Value = UserMutation> {
    prop_oneof![
        2 => "[A-Z][a-z]{1,8}".prop_map(UserMutation::Rename),
        2 => "[a-z]{1,6}".prop_map(UserMutation::AddTag),
        1 => Just(UserMutation::ClearTags),
        1 => prop::option::of(("[a-z ]{0,20}", 0u32..120))
            .prop_map(|p| UserMutation::SetProfile(p.map(|(bio, age)| Profile { bio, age }))),
        2 => Just(UserMutation::Touch),
    ]
}

/// Strategy for acyclic edge lists over `nodes` nodes.
///
/// Every edge `(dependent, dependency)` has `dependent > dependency`, so
/// any subset of edges is acyclic.
pub fn dag_edges_strategy(nodes: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    let pairs: Vec<(usize, usize)> = (0..nodes)
        .flat_map(|a| (0..a).map(move |b| (a, b)))
        .collect();
    let len = pairs.len();
    prop::collection::vec(any::<bool>(), len).prop_map(move |mask| {
        pairs
            .iter()
            .zip(mask)
            .filter_map(|(pair, keep)| keep.then_some(*pair))
            .collect()
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

//! Entities shared by the unit tests of this crate.

use crate::entity::{
    BaseEntity, Entity, EntityRef, Revisioned, Shared, SoftDelete, Timestamped, Validatable,
    ValidationError,
};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Widget {
    pub id: u64,
    pub name: String,
    pub tags: Vec<String>,
}

impl Widget {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            tags: Vec::new(),
        }
    }
}

impl Entity for Widget {
    fn id(&self) -> u64 {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn table_name(&self) -> &str {
        "widgets"
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Account {
    #[serde(flatten)]
    pub base: BaseEntity,
    pub owner: String,
    pub balance: i64,
}

impl Account {
    pub fn new(owner: &str) -> Self {
        Self {
            base: BaseEntity::default(),
            owner: owner.to_string(),
            balance: 0,
        }
    }

    pub fn persisted(id: u64, revision: u64, owner: &str) -> Self {
        Self {
            base: BaseEntity::persisted(id, revision),
            owner: owner.to_string(),
            balance: 0,
        }
    }
}

impl Entity for Account {
    fn id(&self) -> u64 {
        self.base.id
    }
    fn set_id(&mut self, id: u64) {
        self.base.id = id;
    }
    fn table_name(&self) -> &str {
        "accounts"
    }
    fn as_timestamped_mut(&mut self) -> Option<&mut dyn Timestamped> {
        Some(&mut self.base)
    }
    fn as_revisioned_mut(&mut self) -> Option<&mut dyn Revisioned> {
        Some(&mut self.base)
    }
    fn as_soft_delete_mut(&mut self) -> Option<&mut dyn SoftDelete> {
        Some(&mut self.base)
    }
    fn as_validatable(&self) -> Option<&dyn Validatable> {
        Some(self)
    }
}

impl Validatable for Account {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.owner.is_empty() {
            return Err(ValidationError::field("owner", "must not be empty"));
        }
        Ok(())
    }
}

macro_rules! plain_entity {
    ($name:ident, $table:literal) => {
        #[derive(Debug, Clone, Default, Serialize)]
        pub struct $name {
            pub id: u64,
            pub label: String,
        }

        impl $name {
            pub fn new(id: u64) -> Self {
                Self {
                    id,
                    label: format!("{}-{id}", stringify!($name)),
                }
            }
        }

        impl Entity for $name {
            fn id(&self) -> u64 {
                self.id
            }
            fn set_id(&mut self, id: u64) {
                self.id = id;
            }
            fn table_name(&self) -> &str {
                $table
            }
        }
    };
}

plain_entity!(Customer, "customers");
plain_entity!(Invoice, "invoices");
plain_entity!(LineItem, "line_items");

pub fn handle<E: Entity>(entity: &Shared<E>) -> EntityRef {
    EntityRef::from(entity)
}

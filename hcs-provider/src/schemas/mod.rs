//! Resource and data source schema definitions

pub mod compute_instance;
pub mod networking_secgroups;
pub mod sfs_turbos;

use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// String restricted to `variants`
pub fn enum_type(variants: &[&str]) -> AttributeType {
    AttributeType::Enum(variants.iter().map(|v| v.to_string()).collect())
}

/// Optional `timeouts { create = "45m" ... }` block
pub fn timeouts_block() -> AttributeType {
    types::blocks(
        "timeouts",
        vec![
            AttributeSchema::new("create", types::duration()),
            AttributeSchema::new("update", types::duration()),
            AttributeSchema::new("delete", types::duration()),
        ],
    )
}

/// Returns all schemas of this provider
pub fn all_schemas() -> Vec<ResourceSchema> {
    vec![
        compute_instance::compute_instance_schema(),
        networking_secgroups::networking_secgroups_schema(),
        sfs_turbos::sfs_turbos_schema(),
    ]
}

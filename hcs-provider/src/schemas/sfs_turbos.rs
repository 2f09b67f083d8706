//! sfs_turbos data source schema definition

use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub const DATA_SOURCE_TYPE: &str = "sfs_turbos";

fn turbo_block() -> AttributeType {
    let computed =
        |name: &str, attr_type: AttributeType| AttributeSchema::new(name, attr_type).computed();
    types::blocks(
        "turbos",
        vec![
            computed("id", AttributeType::String),
            computed("name", AttributeType::String),
            computed("size", AttributeType::Int),
            computed("share_proto", AttributeType::String),
            computed("share_type", AttributeType::String),
            computed("availability_zone", AttributeType::String),
            computed("vpc_id", AttributeType::String),
            computed("subnet_id", AttributeType::String),
            computed("security_group_id", AttributeType::String),
            computed("enterprise_project_id", AttributeType::String),
            computed("export_location", AttributeType::String),
            computed("available_capacity", AttributeType::String),
            computed("status", AttributeType::String),
        ],
    )
}

/// Returns the schema for sfs_turbos
pub fn sfs_turbos_schema() -> ResourceSchema {
    ResourceSchema::new(DATA_SOURCE_TYPE)
        .with_description("SFS Turbo file systems matching the given filters")
        .attribute(AttributeSchema::new("region", AttributeType::String).computed())
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(
            AttributeSchema::new("size", types::positive_int()).with_description("Capacity in GB"),
        )
        .attribute(AttributeSchema::new("share_type", AttributeType::String))
        .attribute(AttributeSchema::new("enterprise_project_id", AttributeType::String))
        .attribute(AttributeSchema::new("turbos", turbo_block()).computed())
}

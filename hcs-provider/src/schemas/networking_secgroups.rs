//! networking_secgroups data source schema definition

use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub const DATA_SOURCE_TYPE: &str = "networking_secgroups";

/// Returns the schema for networking_secgroups
pub fn networking_secgroups_schema() -> ResourceSchema {
    ResourceSchema::new(DATA_SOURCE_TYPE)
        .with_description("Security groups matching the given filters")
        .attribute(AttributeSchema::new("region", AttributeType::String).computed())
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .with_description("Exact name"),
        )
        .attribute(AttributeSchema::new("enterprise_project_id", AttributeType::String))
        .attribute(
            AttributeSchema::new("description", AttributeType::String)
                .with_description("Keyword contained in the description"),
        )
        .attribute(
            AttributeSchema::new(
                "security_groups",
                types::blocks(
                    "security_groups",
                    vec![
                        AttributeSchema::new("id", AttributeType::String).computed(),
                        AttributeSchema::new("name", AttributeType::String).computed(),
                        AttributeSchema::new("enterprise_project_id", AttributeType::String)
                            .computed(),
                        AttributeSchema::new("description", AttributeType::String).computed(),
                        AttributeSchema::new("created_at", AttributeType::String).computed(),
                        AttributeSchema::new("updated_at", AttributeType::String).computed(),
                    ],
                ),
            )
            .computed(),
        )
}

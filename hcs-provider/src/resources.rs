//! Resource and data source types handled by the HCS provider

use hcs_core::provider::ResourceType;
use hcs_core::schema::ResourceSchema;

use crate::schemas::{compute_instance, networking_secgroups, sfs_turbos};

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:path) => {
        define_resource_type!($name, $type_name, $schema, false);
    };
    ($name:ident, $type_name:expr, $schema:path, $data_source:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
            fn is_data_source(&self) -> bool {
                $data_source
            }
        }
    };
}

define_resource_type!(
    ComputeInstanceType,
    compute_instance::RESOURCE_TYPE,
    compute_instance::compute_instance_schema
);
define_resource_type!(
    NetworkingSecgroupsType,
    networking_secgroups::DATA_SOURCE_TYPE,
    networking_secgroups::networking_secgroups_schema,
    true
);
define_resource_type!(
    SfsTurbosType,
    sfs_turbos::DATA_SOURCE_TYPE,
    sfs_turbos::sfs_turbos_schema,
    true
);

/// Returns all resource and data source types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(ComputeInstanceType),
        Box::new(NetworkingSecgroupsType),
        Box::new(SfsTurbosType),
    ]
}

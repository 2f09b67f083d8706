//! compute_instance schema definition
//!
//! An Elastic Cloud Server with its NICs, disks, public IP and billing
//! settings.

use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{enum_type, timeouts_block};

pub const RESOURCE_TYPE: &str = "compute_instance";

/// Attributes that select the nova-compatible create path
pub const NOVA_ATTRIBUTES: &[&str] = &["block_device_mapping_v2", "metadata"];

/// Attributes that only apply to the native ECS create path
const ECS_DISK_ATTRIBUTES: &[&str] = &["system_disk_type", "system_disk_size", "data_disks"];

pub const POWER_ACTIONS: &[&str] = &["ON", "OFF", "REBOOT", "FORCE-OFF", "FORCE-REBOOT"];

fn spot_duration() -> AttributeType {
    AttributeType::Custom {
        name: "SpotDuration".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| match value {
            Value::Int(n) if (1..=6).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("spot_duration must be between 1 and 6, got {}", n)),
            _ => Err("Expected integer".to_string()),
        },
    }
}

fn network_block() -> AttributeType {
    types::blocks(
        "network",
        vec![
            AttributeSchema::new("uuid", AttributeType::String)
                .force_new()
                .with_description("Subnet ID"),
            AttributeSchema::new("port", AttributeType::String)
                .computed()
                .force_new(),
            AttributeSchema::new("ipv6_enable", AttributeType::Bool)
                .force_new()
                .with_default(Value::Bool(false)),
            AttributeSchema::new("fixed_ip_v4", AttributeType::String)
                .computed()
                .force_new(),
            AttributeSchema::new("source_dest_check", AttributeType::Bool)
                .with_default(Value::Bool(true)),
            AttributeSchema::new("fixed_ip_v6", AttributeType::String).computed(),
            AttributeSchema::new("mac", AttributeType::String).computed(),
            AttributeSchema::new("access_network", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        ],
    )
}

fn data_disk_block() -> AttributeType {
    types::blocks(
        "data_disks",
        vec![
            AttributeSchema::new("type", AttributeType::String).required(),
            AttributeSchema::new("size", types::positive_int()).required(),
            AttributeSchema::new("snapshot_id", AttributeType::String),
            AttributeSchema::new("kms_key_id", AttributeType::String),
        ],
    )
}

fn scheduler_hints_block() -> AttributeType {
    types::blocks(
        "scheduler_hints",
        vec![
            AttributeSchema::new("group", AttributeType::String).computed(),
            AttributeSchema::new("fault_domain", AttributeType::String),
            AttributeSchema::new("tenancy", AttributeType::String),
            AttributeSchema::new("deh_id", AttributeType::String),
        ],
    )
}

fn bandwidth_block() -> AttributeType {
    types::blocks(
        "bandwidth",
        vec![
            AttributeSchema::new("share_type", enum_type(&["PER", "WHOLE"])).required(),
            AttributeSchema::new("id", AttributeType::String)
                .with_description("ID of a shared bandwidth"),
            AttributeSchema::new("size", types::positive_int()),
            AttributeSchema::new("charge_mode", AttributeType::String),
        ],
    )
}

fn volume_attached_block() -> AttributeType {
    types::blocks(
        "volume_attached",
        vec![
            AttributeSchema::new("volume_id", AttributeType::String).computed(),
            AttributeSchema::new("boot_index", AttributeType::Int).computed(),
            AttributeSchema::new("size", AttributeType::Int).computed(),
            AttributeSchema::new("type", AttributeType::String).computed(),
            AttributeSchema::new("pci_address", AttributeType::String).computed(),
            AttributeSchema::new("kms_key_id", AttributeType::String).computed(),
        ],
    )
}

fn block_device_block() -> AttributeType {
    types::blocks(
        "block_device_mapping_v2",
        vec![
            AttributeSchema::new(
                "source_type",
                enum_type(&["blank", "image", "snapshot", "volume"]),
            )
            .required(),
            AttributeSchema::new("uuid", AttributeType::String),
            AttributeSchema::new("volume_size", AttributeType::Int),
            AttributeSchema::new("volume_type", AttributeType::String),
            AttributeSchema::new("destination_type", enum_type(&["local", "volume"])),
            AttributeSchema::new("boot_index", AttributeType::Int),
            AttributeSchema::new("delete_on_termination", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        ],
    )
}

/// Returns the schema for compute_instance
pub fn compute_instance_schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Elastic Cloud Server instance")
        .attribute(
            AttributeSchema::new("region", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("availability_zone", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(AttributeSchema::new("description", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("image_id", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("image_name", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("flavor_id", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("flavor_name", AttributeType::String)
                .computed()
                .with_description("Same value as flavor_id"),
        )
        .attribute(AttributeSchema::new("admin_pass", AttributeType::String).sensitive())
        .attribute(AttributeSchema::new("key_pair", AttributeType::String))
        .attribute(
            AttributeSchema::new("private_key", AttributeType::String)
                .sensitive()
                .with_description("Private key of the key pair in use, needed to rotate it"),
        )
        .attribute(
            AttributeSchema::new("security_groups", types::string_list())
                .computed()
                .conflicts_with(&["security_group_ids"]),
        )
        .attribute(AttributeSchema::new("security_group_ids", types::string_list()).computed())
        .attribute(
            AttributeSchema::new("network", network_block())
                .required()
                .force_new()
                .max_items(12),
        )
        .attribute(
            AttributeSchema::new("system_disk_type", AttributeType::String)
                .computed()
                .force_new()
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("system_disk_size", types::positive_int())
                .computed()
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("data_disks", data_disk_block())
                .force_new()
                .max_items(23)
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("scheduler_hints", scheduler_hints_block())
                .computed()
                .max_items(1),
        )
        .attribute(AttributeSchema::new("user_data", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("stop_before_destroy", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        )
        .attribute(
            AttributeSchema::new("delete_disks_on_termination", AttributeType::Bool)
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("delete_eip_on_termination", AttributeType::Bool)
                .with_default(Value::Bool(true))
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("eip_id", AttributeType::String)
                .force_new()
                .conflicts_with(&["eip_type", "bandwidth"]),
        )
        .attribute(
            AttributeSchema::new("eip_type", AttributeType::String)
                .force_new()
                .conflicts_with(&["eip_id"])
                .required_with(&["bandwidth"]),
        )
        .attribute(
            AttributeSchema::new("bandwidth", bandwidth_block())
                .force_new()
                .max_items(1)
                .conflicts_with(&["eip_id"])
                .required_with(&["eip_type"]),
        )
        .attribute(
            AttributeSchema::new("charging_mode", enum_type(&["prePaid", "postPaid", "spot"]))
                .computed()
                .force_new()
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("period_unit", enum_type(&["month", "year"]))
                .force_new()
                .required_with(&["period"])
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("period", types::positive_int())
                .force_new()
                .required_with(&["period_unit"])
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("auto_renew", enum_type(&["true", "false"]))
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(
            AttributeSchema::new("auto_pay", enum_type(&["true", "false"]))
                .force_new()
                .conflicts_with(NOVA_ATTRIBUTES),
        )
        .attribute(AttributeSchema::new("spot_maximum_price", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("spot_duration", spot_duration()).force_new())
        .attribute(
            AttributeSchema::new("spot_duration_count", types::positive_int())
                .computed()
                .force_new()
                .required_with(&["spot_duration"]),
        )
        .attribute(
            AttributeSchema::new("user_id", AttributeType::String)
                .force_new()
                .with_description("Required for prePaid instances logged in with a key pair"),
        )
        .attribute(AttributeSchema::new("agency_name", AttributeType::String).computed())
        .attribute(AttributeSchema::new("agent_list", AttributeType::String).computed())
        .attribute(AttributeSchema::new("tags", types::string_map()))
        .attribute(AttributeSchema::new("power_action", enum_type(POWER_ACTIONS)).computed())
        .attribute(AttributeSchema::new("volume_attached", volume_attached_block()).computed())
        .attribute(AttributeSchema::new("system_disk_id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("public_ip", AttributeType::String).computed())
        .attribute(AttributeSchema::new("access_ip_v4", AttributeType::String).computed())
        .attribute(AttributeSchema::new("access_ip_v6", AttributeType::String).computed())
        .attribute(AttributeSchema::new("status", AttributeType::String).computed())
        .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
        .attribute(AttributeSchema::new("updated_at", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("metadata", types::string_map())
                .conflicts_with(ECS_DISK_ATTRIBUTES)
                .with_description("Deprecated; selects the nova-compatible API"),
        )
        .attribute(
            AttributeSchema::new("block_device_mapping_v2", block_device_block())
                .force_new()
                .conflicts_with(ECS_DISK_ATTRIBUTES)
                .with_description("Deprecated; selects the nova-compatible API"),
        )
        .attribute(AttributeSchema::new("timeouts", timeouts_block()).max_items(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn network(uuid: &str) -> Value {
        let mut nic = HashMap::new();
        nic.insert("uuid".to_string(), Value::string(uuid));
        Value::List(vec![Value::Map(nic)])
    }

    #[test]
    fn nova_and_disk_settings_conflict() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::string("web"));
        attrs.insert("network".to_string(), network("subnet-1"));
        attrs.insert("system_disk_size".to_string(), Value::Int(40));
        attrs.insert(
            "metadata".to_string(),
            Value::Map(HashMap::from([("env".to_string(), Value::string("prod"))])),
        );

        let errors = compute_instance_schema().validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("system_disk_size"));
    }

    #[test]
    fn spot_duration_range() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::string("web"));
        attrs.insert("network".to_string(), network("subnet-1"));
        attrs.insert("spot_duration".to_string(), Value::Int(7));

        assert!(compute_instance_schema().validate(&attrs).is_err());

        attrs.insert("spot_duration".to_string(), Value::Int(6));
        assert!(compute_instance_schema().validate(&attrs).is_ok());
    }

    #[test]
    fn network_is_required() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::string("web"));
        let errors = compute_instance_schema().validate(&attrs).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("network")));
    }
}

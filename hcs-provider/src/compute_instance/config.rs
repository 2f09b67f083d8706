//! Typed configuration of a compute instance
//!
//! Declared attributes are checked against the schema, converted once into
//! an [`InstanceConfig`] and validated before any remote call is made.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use hcs_core::resource::{Attributes, Value};
use hcs_core::schema::parse_duration;

use crate::config::Config;
use crate::error::ConfigError;
use crate::schemas::compute_instance::compute_instance_schema;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SYSTEM_DISK_TYPE: &str = "GPSSD";

/// Billing mode with the settings each mode needs
#[derive(Debug, Clone, PartialEq)]
pub enum Billing {
    PostPaid,
    PrePaid {
        period_unit: String,
        period: i64,
        /// "true", "false" or empty
        auto_renew: String,
        auto_pay: bool,
    },
    Spot {
        maximum_price: String,
        /// Hours per spot period, 1 to 6
        duration: Option<i64>,
        duration_count: i64,
    },
}

impl Billing {
    pub fn is_prepaid(&self) -> bool {
        matches!(self, Billing::PrePaid { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub uuid: String,
    pub fixed_ip_v4: String,
    pub ipv6_enable: bool,
    pub source_dest_check: bool,
    pub access_network: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataDiskConfig {
    pub volume_type: String,
    pub size: i64,
    pub snapshot_id: String,
    pub kms_key_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerHintsConfig {
    pub group: String,
    pub fault_domain: String,
    pub tenancy: String,
    pub deh_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthConfig {
    pub share_type: String,
    pub id: String,
    pub size: i64,
    pub charge_mode: String,
}

/// Public IP of a native ECS create
#[derive(Debug, Clone, PartialEq)]
pub enum PublicIpConfig {
    Existing(String),
    New {
        eip_type: String,
        bandwidth: BandwidthConfig,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockDeviceConfig {
    pub source_type: String,
    pub destination_type: String,
    pub uuid: String,
    pub volume_size: i64,
    pub volume_type: String,
    pub boot_index: i64,
    pub delete_on_termination: bool,
}

impl BlockDeviceConfig {
    /// Entries of the `block_device_mapping_v2` blocks
    pub fn from_attributes(attrs: &HashMap<String, Value>) -> Vec<Self> {
        blocks(attrs, "block_device_mapping_v2")
            .map(|bd| BlockDeviceConfig {
                source_type: string_of(bd, "source_type"),
                destination_type: string_of(bd, "destination_type"),
                uuid: string_of(bd, "uuid"),
                volume_size: bd.get_int("volume_size").unwrap_or(0),
                volume_type: string_of(bd, "volume_type"),
                boot_index: bd.get_int("boot_index").unwrap_or(0),
                delete_on_termination: bd.get_bool_or("delete_on_termination", false),
            })
            .collect()
    }

    fn boots_from_local_image(&self) -> bool {
        self.source_type == "image" && self.destination_type == "local"
    }
}

/// Whether an image has to be resolved for the boot disk
///
/// Without block devices the image is the boot disk. With block devices it
/// is only needed when one of them boots from a local image.
pub fn needs_image(block_devices: &[BlockDeviceConfig]) -> bool {
    block_devices.is_empty() || block_devices.iter().any(BlockDeviceConfig::boots_from_local_image)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Read the `timeouts` block, keeping the default for unset or invalid entries
    pub fn from_attributes(attrs: &HashMap<String, Value>) -> Self {
        let mut timeouts = Timeouts::default();
        let Some(block) = attrs
            .get_list("timeouts")
            .and_then(|items| items.first())
            .and_then(Value::as_map)
        else {
            return timeouts;
        };
        let parse = |key: &str| block.get_non_empty(key).and_then(|s| parse_duration(s).ok());
        if let Some(d) = parse("create") {
            timeouts.create = d;
        }
        if let Some(d) = parse("update") {
            timeouts.update = d;
        }
        if let Some(d) = parse("delete") {
            timeouts.delete = d;
        }
        timeouts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    pub name: String,
    pub description: String,
    pub region: Option<String>,
    pub availability_zone: String,
    pub image_id: String,
    pub image_name: String,
    /// `flavor_id`, else `flavor_name`
    pub flavor: String,
    pub admin_pass: String,
    pub key_pair: String,
    pub private_key: String,
    pub security_groups: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub networks: Vec<NetworkConfig>,
    pub system_disk_type: String,
    pub system_disk_size: i64,
    pub data_disks: Vec<DataDiskConfig>,
    pub scheduler_hints: Option<SchedulerHintsConfig>,
    pub user_data: String,
    pub delete_eip_on_termination: bool,
    pub public_ip: Option<PublicIpConfig>,
    pub billing: Billing,
    /// `op_svc_userid`: the resource `user_id`, else the provider one
    pub op_svc_user_id: String,
    pub agency_name: String,
    pub agent_list: String,
    pub tags: BTreeMap<String, String>,
    pub power_action: String,
    pub metadata: BTreeMap<String, String>,
    pub block_devices: Vec<BlockDeviceConfig>,
    pub timeouts: Timeouts,
}

fn string_of(map: &HashMap<String, Value>, key: &str) -> String {
    map.get_string(key).unwrap_or_default().to_string()
}

fn blocks<'a>(
    attrs: &'a HashMap<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a HashMap<String, Value>> {
    attrs
        .get_list(key)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_map)
}

fn string_items(attrs: &HashMap<String, Value>, key: &str) -> Vec<String> {
    attrs
        .get_list(key)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl InstanceConfig {
    /// Validate declared attributes and build the typed configuration
    pub fn parse(attrs: &HashMap<String, Value>, provider: &Config) -> Result<Self, ConfigError> {
        compute_instance_schema()
            .validate(attrs)
            .map_err(ConfigError::Schema)?;

        let billing = match attrs.get_non_empty("charging_mode").unwrap_or("postPaid") {
            "prePaid" => {
                let (Some(period_unit), Some(period)) =
                    (attrs.get_non_empty("period_unit"), attrs.get_int("period"))
                else {
                    return Err(ConfigError::PrePaidPeriodRequired);
                };
                Billing::PrePaid {
                    period_unit: period_unit.to_string(),
                    period,
                    auto_renew: string_of(attrs, "auto_renew"),
                    auto_pay: attrs.get_string("auto_pay") != Some("false"),
                }
            }
            "spot" => Billing::Spot {
                maximum_price: attrs
                    .get_non_empty("spot_maximum_price")
                    .ok_or(ConfigError::SpotPriceRequired)?
                    .to_string(),
                duration: attrs.get_int("spot_duration"),
                duration_count: attrs.get_int("spot_duration_count").unwrap_or(1),
            },
            _ => Billing::PostPaid,
        };

        let op_svc_user_id = attrs
            .get_non_empty("user_id")
            .map(String::from)
            .or_else(|| provider.user_id.clone().filter(|u| !u.is_empty()))
            .unwrap_or_default();
        let key_pair = string_of(attrs, "key_pair");
        if billing.is_prepaid() && !key_pair.is_empty() && op_svc_user_id.is_empty() {
            return Err(ConfigError::UserIdRequired);
        }

        let flavor = attrs
            .get_non_empty("flavor_id")
            .or_else(|| attrs.get_non_empty("flavor_name"))
            .ok_or_else(|| {
                ConfigError::MissingArgument("the `flavor_id` must be specified".to_string())
            })?
            .to_string();

        let networks: Vec<NetworkConfig> = blocks(attrs, "network")
            .map(|nic| NetworkConfig {
                uuid: string_of(nic, "uuid"),
                fixed_ip_v4: string_of(nic, "fixed_ip_v4"),
                ipv6_enable: nic.get_bool_or("ipv6_enable", false),
                source_dest_check: nic.get_bool_or("source_dest_check", true),
                access_network: nic.get_bool_or("access_network", false),
            })
            .collect();
        if networks.first().is_none_or(|n| n.uuid.is_empty()) {
            return Err(ConfigError::InvalidAttribute {
                name: "network".to_string(),
                message: "network ID should not be empty".to_string(),
            });
        }

        let block_devices = BlockDeviceConfig::from_attributes(attrs);
        check_block_devices(&block_devices)?;

        let image_id = string_of(attrs, "image_id");
        let image_name = string_of(attrs, "image_name");
        if needs_image(&block_devices) && image_id.is_empty() && image_name.is_empty() {
            return Err(ConfigError::MissingImage);
        }

        let public_ip = parse_public_ip(attrs)?;

        let data_disks = blocks(attrs, "data_disks")
            .map(|disk| DataDiskConfig {
                volume_type: string_of(disk, "type"),
                size: disk.get_int("size").unwrap_or(0),
                snapshot_id: string_of(disk, "snapshot_id"),
                kms_key_id: string_of(disk, "kms_key_id"),
            })
            .collect();

        let scheduler_hints = blocks(attrs, "scheduler_hints")
            .next()
            .map(|hints| SchedulerHintsConfig {
                group: string_of(hints, "group"),
                fault_domain: string_of(hints, "fault_domain"),
                tenancy: string_of(hints, "tenancy"),
                deh_id: string_of(hints, "deh_id"),
            });

        Ok(Self {
            name: string_of(attrs, "name"),
            description: string_of(attrs, "description"),
            region: attrs.get_non_empty("region").map(String::from),
            availability_zone: string_of(attrs, "availability_zone"),
            image_id,
            image_name,
            flavor,
            admin_pass: string_of(attrs, "admin_pass"),
            key_pair,
            private_key: string_of(attrs, "private_key"),
            security_groups: string_items(attrs, "security_groups"),
            security_group_ids: string_items(attrs, "security_group_ids"),
            networks,
            system_disk_type: string_of(attrs, "system_disk_type"),
            system_disk_size: attrs.get_int("system_disk_size").unwrap_or(0),
            data_disks,
            scheduler_hints,
            user_data: string_of(attrs, "user_data"),
            delete_eip_on_termination: attrs.get_bool_or("delete_eip_on_termination", true),
            public_ip,
            billing,
            op_svc_user_id,
            agency_name: string_of(attrs, "agency_name"),
            agent_list: string_of(attrs, "agent_list"),
            tags: attrs.get_string_map("tags"),
            power_action: string_of(attrs, "power_action"),
            metadata: attrs.get_string_map("metadata"),
            block_devices,
            timeouts: Timeouts::from_attributes(attrs),
        })
    }

    /// Whether the deprecated settings force the nova-compatible API
    pub fn uses_nova_api(&self) -> bool {
        !self.metadata.is_empty() || !self.block_devices.is_empty()
    }

    pub fn needs_image(&self) -> bool {
        needs_image(&self.block_devices)
    }

    /// `isAutoPay` as sent to the billing APIs
    pub fn auto_pay(&self) -> &'static str {
        match &self.billing {
            Billing::PrePaid { auto_pay: false, .. } => "false",
            _ => "true",
        }
    }
}

/// Whether the boot disk comes from block devices that need no image
pub fn boots_without_image(attrs: &HashMap<String, Value>) -> bool {
    !needs_image(&BlockDeviceConfig::from_attributes(attrs))
}

fn check_block_devices(devices: &[BlockDeviceConfig]) -> Result<(), ConfigError> {
    for bd in devices {
        if bd.source_type != "blank" && bd.uuid.is_empty() {
            return Err(ConfigError::BlockDevice(format!(
                "you must specify a uuid for {} block device types",
                bd.source_type
            )));
        }
        if bd.source_type == "image" && bd.destination_type == "volume" && bd.volume_size == 0 {
            return Err(ConfigError::BlockDevice(
                "you must specify a volume_size when creating a volume from an image".to_string(),
            ));
        }
        if bd.source_type == "blank" && bd.destination_type == "local" && bd.volume_size == 0 {
            return Err(ConfigError::BlockDevice(
                "you must specify a volume_size when creating a blank block device".to_string(),
            ));
        }
    }
    Ok(())
}

fn parse_public_ip(attrs: &HashMap<String, Value>) -> Result<Option<PublicIpConfig>, ConfigError> {
    if let Some(eip_id) = attrs.get_non_empty("eip_id") {
        return Ok(Some(PublicIpConfig::Existing(eip_id.to_string())));
    }
    let Some(bw) = blocks(attrs, "bandwidth").next() else {
        return Ok(None);
    };
    let bandwidth = BandwidthConfig {
        share_type: string_of(bw, "share_type"),
        id: string_of(bw, "id"),
        size: bw.get_int("size").unwrap_or(0),
        charge_mode: string_of(bw, "charge_mode"),
    };
    let invalid = |message: &str| ConfigError::InvalidAttribute {
        name: "bandwidth".to_string(),
        message: message.to_string(),
    };
    if !bandwidth.id.is_empty() && (bandwidth.size != 0 || !bandwidth.charge_mode.is_empty()) {
        return Err(invalid("id conflicts with size and charge_mode"));
    }
    if bandwidth.id.is_empty() && (bandwidth.size == 0) != bandwidth.charge_mode.is_empty() {
        return Err(invalid("size and charge_mode must be set together"));
    }
    Ok(Some(PublicIpConfig::New {
        eip_type: string_of(attrs, "eip_type"),
        bandwidth,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> Config {
        Config::new("cn-north-1", "proj", "token")
    }

    fn base() -> HashMap<String, Value> {
        let mut nic = HashMap::new();
        nic.insert("uuid".to_string(), Value::string("subnet-1"));
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::string("web"));
        attrs.insert("image_id".to_string(), Value::string("img-1"));
        attrs.insert("flavor_id".to_string(), Value::string("s6.small.1"));
        attrs.insert("network".to_string(), Value::List(vec![Value::Map(nic)]));
        attrs
    }

    #[test]
    fn postpaid_defaults() {
        let cfg = InstanceConfig::parse(&base(), &provider()).unwrap();
        assert_eq!(cfg.billing, Billing::PostPaid);
        assert!(cfg.networks[0].source_dest_check);
        assert!(cfg.delete_eip_on_termination);
        assert!(!cfg.uses_nova_api());
        assert_eq!(cfg.timeouts, Timeouts::default());
        assert_eq!(cfg.auto_pay(), "true");
    }

    #[test]
    fn prepaid_requires_period() {
        let mut attrs = base();
        attrs.insert("charging_mode".to_string(), Value::string("prePaid"));
        let err = InstanceConfig::parse(&attrs, &provider()).unwrap_err();
        assert!(matches!(err, ConfigError::PrePaidPeriodRequired));

        attrs.insert("period_unit".to_string(), Value::string("month"));
        attrs.insert("period".to_string(), Value::Int(1));
        attrs.insert("auto_pay".to_string(), Value::string("false"));
        let cfg = InstanceConfig::parse(&attrs, &provider()).unwrap();
        assert!(cfg.billing.is_prepaid());
        assert_eq!(cfg.auto_pay(), "false");
    }

    #[test]
    fn prepaid_with_key_pair_requires_user_id() {
        let mut attrs = base();
        attrs.insert("charging_mode".to_string(), Value::string("prePaid"));
        attrs.insert("period_unit".to_string(), Value::string("month"));
        attrs.insert("period".to_string(), Value::Int(1));
        attrs.insert("key_pair".to_string(), Value::string("kp-1"));

        let err = InstanceConfig::parse(&attrs, &provider()).unwrap_err();
        assert!(matches!(err, ConfigError::UserIdRequired));

        // The provider level user ID is enough
        let cfg = InstanceConfig::parse(&attrs, &provider().with_user_id("user-1")).unwrap();
        assert_eq!(cfg.op_svc_user_id, "user-1");

        attrs.insert("user_id".to_string(), Value::string("user-2"));
        let cfg = InstanceConfig::parse(&attrs, &provider().with_user_id("user-1")).unwrap();
        assert_eq!(cfg.op_svc_user_id, "user-2");
    }

    #[test]
    fn spot_requires_price() {
        let mut attrs = base();
        attrs.insert("charging_mode".to_string(), Value::string("spot"));
        let err = InstanceConfig::parse(&attrs, &provider()).unwrap_err();
        assert!(matches!(err, ConfigError::SpotPriceRequired));

        attrs.insert("spot_maximum_price".to_string(), Value::string("0.5"));
        attrs.insert("spot_duration".to_string(), Value::Int(2));
        let cfg = InstanceConfig::parse(&attrs, &provider()).unwrap();
        assert_eq!(
            cfg.billing,
            Billing::Spot {
                maximum_price: "0.5".to_string(),
                duration: Some(2),
                duration_count: 1,
            }
        );
    }

    #[test]
    fn flavor_name_is_accepted() {
        let mut attrs = base();
        attrs.remove("flavor_id");
        let err = InstanceConfig::parse(&attrs, &provider()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required argument: the `flavor_id` must be specified"
        );

        attrs.insert("flavor_name".to_string(), Value::string("c6.large.2"));
        assert_eq!(InstanceConfig::parse(&attrs, &provider()).unwrap().flavor, "c6.large.2");
    }

    #[test]
    fn image_is_required_without_boot_volume() {
        let mut attrs = base();
        attrs.remove("image_id");
        assert!(matches!(
            InstanceConfig::parse(&attrs, &provider()).unwrap_err(),
            ConfigError::MissingImage
        ));

        let mut bd = HashMap::new();
        bd.insert("source_type".to_string(), Value::string("volume"));
        bd.insert("destination_type".to_string(), Value::string("volume"));
        bd.insert("uuid".to_string(), Value::string("vol-1"));
        attrs.insert("block_device_mapping_v2".to_string(), Value::List(vec![Value::Map(bd)]));
        let cfg = InstanceConfig::parse(&attrs, &provider()).unwrap();
        assert!(cfg.uses_nova_api());
        assert!(!cfg.needs_image());
        assert!(boots_without_image(&attrs));
    }

    #[test]
    fn block_device_combinations() {
        let mut attrs = base();
        let mut bd = HashMap::new();
        bd.insert("source_type".to_string(), Value::string("image"));
        bd.insert("destination_type".to_string(), Value::string("volume"));
        bd.insert("uuid".to_string(), Value::string("img-1"));
        attrs.insert(
            "block_device_mapping_v2".to_string(),
            Value::List(vec![Value::Map(bd.clone())]),
        );
        let err = InstanceConfig::parse(&attrs, &provider()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "you must specify a volume_size when creating a volume from an image"
        );

        bd.insert("source_type".to_string(), Value::string("snapshot"));
        bd.insert("uuid".to_string(), Value::string(""));
        attrs.insert("block_device_mapping_v2".to_string(), Value::List(vec![Value::Map(bd)]));
        let err = InstanceConfig::parse(&attrs, &provider()).unwrap_err();
        assert!(err.to_string().contains("uuid for snapshot"));
    }

    #[test]
    fn image_needed_only_for_local_boot() {
        let device = |source: &str, destination: &str| BlockDeviceConfig {
            source_type: source.to_string(),
            destination_type: destination.to_string(),
            ..Default::default()
        };
        assert!(needs_image(&[]));
        assert!(needs_image(&[device("image", "local"), device("blank", "volume")]));
        assert!(!needs_image(&[device("volume", "volume")]));

        let mut attrs = base();
        let local = HashMap::from([
            ("source_type".to_string(), Value::string("image")),
            ("destination_type".to_string(), Value::string("local")),
        ]);
        attrs.insert("block_device_mapping_v2".to_string(), Value::List(vec![Value::Map(local)]));
        assert!(!boots_without_image(&attrs));
    }

    #[test]
    fn bandwidth_settings() {
        let mut attrs = base();
        let mut bw = HashMap::new();
        bw.insert("share_type".to_string(), Value::string("PER"));
        bw.insert("size".to_string(), Value::Int(5));
        attrs.insert("eip_type".to_string(), Value::string("5_bgp"));
        attrs.insert("bandwidth".to_string(), Value::List(vec![Value::Map(bw.clone())]));
        assert!(InstanceConfig::parse(&attrs, &provider()).is_err());

        bw.insert("charge_mode".to_string(), Value::string("traffic"));
        attrs.insert("bandwidth".to_string(), Value::List(vec![Value::Map(bw)]));
        let cfg = InstanceConfig::parse(&attrs, &provider()).unwrap();
        assert!(matches!(cfg.public_ip, Some(PublicIpConfig::New { .. })));
    }

    #[test]
    fn schema_errors_come_first() {
        let mut attrs = base();
        attrs.insert("security_groups".to_string(), Value::string_list(["default"]));
        attrs.insert("security_group_ids".to_string(), Value::string_list(["sg-1"]));
        attrs.insert("charging_mode".to_string(), Value::string("prePaid"));
        assert!(matches!(
            InstanceConfig::parse(&attrs, &provider()).unwrap_err(),
            ConfigError::Schema(_)
        ));
    }

    #[test]
    fn custom_timeouts() {
        let mut attrs = base();
        let mut block = HashMap::new();
        block.insert("create".to_string(), Value::string("45m"));
        attrs.insert("timeouts".to_string(), Value::List(vec![Value::Map(block)]));
        let timeouts = InstanceConfig::parse(&attrs, &provider()).unwrap().timeouts;
        assert_eq!(timeouts.create, Duration::from_secs(45 * 60));
        assert_eq!(timeouts.delete, DEFAULT_TIMEOUT);
    }
}

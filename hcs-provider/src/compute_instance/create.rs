//! Create an instance through the native ECS API or the nova-compatible one

use std::collections::HashMap;

use log::{debug, info, warn};

use hcs_core::resource::{Resource, State, Value};

use crate::client::ServiceClient;
use crate::config::Service;
use crate::error::{ConfigError, HcsError, HcsResult, ResultExt};
use crate::provider::RegionContext;
use crate::sdk::ecs::{
    self, Bandwidth, DataVolume, Eip, MetaData, Nic, PublicIp, RootVolume, SchedulerHints,
    SecurityGroupRef, ServerExtendParam, VolumeExtendParam, VolumeMetadata,
};
use crate::sdk::vpc::{self, LegacyListOpts, LegacySecurityGroup};
use crate::sdk::{ims, nova};
use crate::utils::{encode_user_data, expand_tags};

use super::config::{Billing, DEFAULT_SYSTEM_DISK_TYPE, InstanceConfig, PublicIpConfig};
use super::network::{disable_source_dest_check, flatten_networks, instance_nics};
use super::power::do_power_action;
use super::read::read;
use super::waiters::{wait_for_job, wait_for_order, wait_for_order_resource, wait_for_server};

/// Enterprise project filter matching every project the caller may use
pub const ALL_GRANTED_EPS: &str = "all_granted_eps";

pub async fn create(ctx: &RegionContext<'_>, resource: &Resource) -> HcsResult<State> {
    let cfg = InstanceConfig::parse(&resource.attributes, ctx.config())?;
    let ecs_client = ctx.client(Service::Ecs)?;

    let image_id = if cfg.needs_image() {
        resolve_image_id(ctx, &cfg).await?
    } else {
        String::new()
    };

    let server_id = if cfg.uses_nova_api() {
        create_with_nova(ctx, &ecs_client, &cfg, &image_id).await?
    } else {
        create_with_ecs(ctx, &ecs_client, &cfg, &image_id).await?
    };

    // Create an instance in the shutdown state
    match cfg.power_action.as_str() {
        "" => {}
        action @ ("OFF" | "FORCE-OFF") => {
            do_power_action(ctx, &ecs_client, &server_id, action)
                .await
                .with_context(|| {
                    format!(
                        "doing power action ({}) for instance ({}) failed",
                        action, server_id
                    )
                })?;
        }
        action => warn!("the power action ({}) is invalid after instance created", action),
    }

    if cfg.networks.iter().any(|n| !n.source_dest_check) {
        disable_declared_source_dest_checks(ctx, &ecs_client, resource, &cfg, &server_id).await?;
    }

    let prior = State::existing(resource.id.clone(), resource.attributes.clone())
        .with_identifier(&server_id);
    let state = read(ctx, &prior).await?;
    if !state.exists {
        return Err(HcsError::Unexpected(format!(
            "instance ({}) disappeared right after creation",
            server_id
        )));
    }
    Ok(state)
}

async fn resolve_image_id(ctx: &RegionContext<'_>, cfg: &InstanceConfig) -> HcsResult<String> {
    if !cfg.image_id.is_empty() {
        return Ok(cfg.image_id.clone());
    }
    if cfg.image_name.is_empty() {
        return Err(ConfigError::MissingImage.into());
    }
    let ims_client = ctx.client(Service::Ims)?;
    Ok(find_image(&ims_client, "", &cfg.image_name).await?.id)
}

/// Look up a single image by ID or name
pub async fn find_image(client: &ServiceClient, id: &str, name: &str) -> HcsResult<ims::Image> {
    let opts = ims::ListOpts {
        id: (!id.is_empty()).then(|| id.to_string()),
        name: (!name.is_empty()).then(|| name.to_string()),
        limit: Some(1),
    };
    let images = ims::list(client, &opts).await.context("unable to query images")?;
    let Some(image) = images.into_iter().next() else {
        return Err(HcsError::Unexpected(format!(
            "unable to find images {}: Maybe not existed",
            if id.is_empty() { name } else { id }
        )));
    };
    if !id.is_empty() && image.id != id {
        return Err(HcsError::Unexpected("unexpected images ID".to_string()));
    }
    if !name.is_empty() && image.name != name {
        return Err(HcsError::Unexpected("unexpected images Name".to_string()));
    }
    debug!("Retrieved image {}: {:?}", image.id, image);
    Ok(image)
}

// =============================================================================
// Native ECS API
// =============================================================================

async fn create_with_ecs(
    ctx: &RegionContext<'_>,
    ecs_client: &ServiceClient,
    cfg: &InstanceConfig,
    image_id: &str,
) -> HcsResult<String> {
    let vpc_client = ctx.client(Service::Vpc)?;

    // Every network belongs to the VPC of the first subnet
    let subnet_id = &cfg.networks[0].uuid;
    let subnet = vpc::get_subnet(&vpc_client, subnet_id)
        .await
        .context("error retrieving subnets")?;
    let security_groups = resolve_security_groups(&vpc_client, cfg).await?;

    let mut opts = build_create_opts(cfg, image_id, &subnet.vpc_id, security_groups);
    debug!("ECS create options: {:?}", opts);
    // Set after logging so the password never reaches the log
    opts.admin_pass = cfg.admin_pass.clone();

    let response = ecs::create(ecs_client, &opts)
        .await
        .context("error creating server")?;
    let timeout = cfg.timeouts.create;

    if cfg.billing.is_prepaid() {
        let order_id = response.order_id.ok_or_else(|| {
            HcsError::Unexpected("no order ID returned for a prePaid server".to_string())
        })?;
        let bss_client = ctx.client(Service::Bss)?;
        wait_for_order(ctx, &bss_client, &order_id, timeout).await?;
        wait_for_order_resource(ctx, &bss_client, &order_id, timeout).await
    } else {
        let job_id = response.job_id.ok_or_else(|| {
            HcsError::Unexpected("no job ID returned for the server creation".to_string())
        })?;
        let job = wait_for_job(ctx, ecs_client, &job_id, timeout).await?;
        job.entity("server_id").ok_or_else(|| {
            HcsError::Unexpected(format!("job ({}) did not report a server ID", job_id))
        })
    }
}

async fn resolve_security_groups(
    client: &ServiceClient,
    cfg: &InstanceConfig,
) -> HcsResult<Vec<SecurityGroupRef>> {
    if !cfg.security_group_ids.is_empty() {
        return Ok(cfg
            .security_group_ids
            .iter()
            .map(|id| SecurityGroupRef { id: id.clone() })
            .collect());
    }
    if cfg.security_groups.is_empty() {
        return Ok(Vec::new());
    }

    let opts = LegacyListOpts {
        enterprise_project_id: Some(ALL_GRANTED_EPS.to_string()),
    };
    let groups = vpc::list_legacy_security_groups(client, &opts).await?;
    match_security_groups(&cfg.security_groups, &groups).map_err(|missing| {
        ConfigError::InvalidAttribute {
            name: "security_groups".to_string(),
            message: format!(
                "the list contains invalid security groups (num: {}), please check your entry",
                missing
            ),
        }
        .into()
    })
}

/// Resolve security group names to IDs, or count the names without a match
pub fn match_security_groups(
    names: &[String],
    groups: &[LegacySecurityGroup],
) -> Result<Vec<SecurityGroupRef>, usize> {
    let found: Vec<SecurityGroupRef> = names
        .iter()
        .filter_map(|name| groups.iter().find(|g| &g.name == name))
        .map(|g| SecurityGroupRef { id: g.id.clone() })
        .collect();
    if found.len() == names.len() {
        Ok(found)
    } else {
        Err(names.len() - found.len())
    }
}

/// Request body of a native create, without the admin password
pub fn build_create_opts(
    cfg: &InstanceConfig,
    image_id: &str,
    vpc_id: &str,
    security_groups: Vec<SecurityGroupRef>,
) -> ecs::CreateOpts {
    let root_volume = RootVolume {
        volume_type: if cfg.system_disk_type.is_empty() {
            DEFAULT_SYSTEM_DISK_TYPE.to_string()
        } else {
            cfg.system_disk_type.clone()
        },
        size: cfg.system_disk_size,
    };

    let data_volumes = cfg
        .data_disks
        .iter()
        .map(|disk| DataVolume {
            volume_type: disk.volume_type.clone(),
            size: disk.size,
            extend_param: (!disk.snapshot_id.is_empty()).then(|| VolumeExtendParam {
                snapshot_id: disk.snapshot_id.clone(),
            }),
            metadata: (!disk.kms_key_id.is_empty()).then(|| VolumeMetadata {
                system_encrypted: "1".to_string(),
                system_cmk_id: disk.kms_key_id.clone(),
            }),
        })
        .collect();

    let nics = cfg
        .networks
        .iter()
        .map(|n| Nic {
            subnet_id: n.uuid.clone(),
            ip_address: n.fixed_ip_v4.clone(),
            ipv6_enable: n.ipv6_enable,
        })
        .collect();

    let public_ip = cfg.public_ip.as_ref().map(|ip| match ip {
        PublicIpConfig::Existing(id) => PublicIp {
            id: id.clone(),
            ..Default::default()
        },
        PublicIpConfig::New { eip_type, bandwidth } => PublicIp {
            eip: Some(Eip {
                ip_type: eip_type.clone(),
                bandwidth: Bandwidth {
                    share_type: bandwidth.share_type.clone(),
                    id: bandwidth.id.clone(),
                    size: bandwidth.size,
                    charge_mode: bandwidth.charge_mode.clone(),
                },
            }),
            delete_on_termination: cfg.delete_eip_on_termination,
            ..Default::default()
        },
    });

    let extend_param = match &cfg.billing {
        Billing::PostPaid => ServerExtendParam::default(),
        Billing::PrePaid {
            period_unit,
            period,
            auto_renew,
            ..
        } => ServerExtendParam {
            charging_mode: "prePaid".to_string(),
            period_type: period_unit.clone(),
            period_num: *period,
            is_auto_renew: auto_renew.clone(),
            is_auto_pay: cfg.auto_pay().to_string(),
            ..Default::default()
        },
        Billing::Spot {
            maximum_price,
            duration,
            duration_count,
        } => {
            let mut param = ServerExtendParam {
                market_type: "spot".to_string(),
                spot_price: maximum_price.clone(),
                ..Default::default()
            };
            if let Some(hours) = duration {
                param.interruption_policy = "immediate".to_string();
                param.spot_duration_hours = *hours;
                param.spot_duration_count = *duration_count;
            }
            param
        }
    };

    let metadata = MetaData {
        op_svc_user_id: cfg.op_svc_user_id.clone(),
        agency_name: cfg.agency_name.clone(),
        agent_list: cfg.agent_list.clone(),
    };

    let scheduler_hints = cfg.scheduler_hints.as_ref().map(|hints| SchedulerHints {
        group: hints.group.clone(),
        fault_domain: hints.fault_domain.clone(),
        tenancy: hints.tenancy.clone(),
        dedicated_host_id: hints.deh_id.clone(),
    });

    ecs::CreateOpts {
        name: cfg.name.clone(),
        description: cfg.description.clone(),
        image_ref: image_id.to_string(),
        flavor_ref: cfg.flavor.clone(),
        key_name: cfg.key_pair.clone(),
        admin_pass: String::new(),
        vpc_id: vpc_id.to_string(),
        nics,
        security_groups,
        availability_zone: cfg.availability_zone.clone(),
        root_volume,
        data_volumes,
        public_ip,
        user_data: encode_user_data(&cfg.user_data),
        server_tags: expand_tags(&cfg.tags),
        extend_param: (extend_param != ServerExtendParam::default()).then_some(extend_param),
        metadata: (!metadata.is_empty()).then_some(metadata),
        scheduler_hints,
    }
}

// =============================================================================
// Nova-compatible API
// =============================================================================

async fn create_with_nova(
    ctx: &RegionContext<'_>,
    ecs_client: &ServiceClient,
    cfg: &InstanceConfig,
    image_id: &str,
) -> HcsResult<String> {
    let mut opts = build_nova_create_opts(cfg, image_id);
    let hints = cfg.scheduler_hints.as_ref().map(|h| nova::SchedulerHints {
        group: h.group.clone(),
    });
    debug!("Compute create options: {:?}", opts);
    opts.admin_pass = cfg.admin_pass.clone();

    let server = nova::create(ecs_client, &opts, hints.as_ref())
        .await
        .context("error creating server")?;
    info!("Instance ID: {}", server.id);

    debug!("Waiting for instance ({}) to become running", server.id);
    wait_for_server(
        ctx,
        ecs_client,
        &server.id,
        &["BUILD"],
        &["ACTIVE"],
        cfg.timeouts.create,
    )
    .await?;
    Ok(server.id)
}

pub fn build_nova_create_opts(cfg: &InstanceConfig, image_id: &str) -> nova::CreateOpts {
    nova::CreateOpts {
        name: cfg.name.clone(),
        image_ref: image_id.to_string(),
        flavor_ref: cfg.flavor.clone(),
        security_groups: cfg
            .security_groups
            .iter()
            .map(|name| nova::SecurityGroupName { name: name.clone() })
            .collect(),
        availability_zone: cfg.availability_zone.clone(),
        networks: cfg
            .networks
            .iter()
            .map(|n| nova::Network {
                uuid: n.uuid.clone(),
                port: String::new(),
                fixed_ip: n.fixed_ip_v4.clone(),
            })
            .collect(),
        metadata: cfg.metadata.clone(),
        admin_pass: String::new(),
        user_data: encode_user_data(&cfg.user_data),
        key_name: cfg.key_pair.clone(),
        block_device_mapping_v2: cfg
            .block_devices
            .iter()
            .map(|bd| nova::BlockDeviceMapping {
                source_type: bd.source_type.clone(),
                destination_type: bd.destination_type.clone(),
                uuid: bd.uuid.clone(),
                boot_index: bd.boot_index,
                volume_size: bd.volume_size,
                volume_type: bd.volume_type.clone(),
                delete_on_termination: bd.delete_on_termination,
                guest_format: String::new(),
            })
            .collect(),
    }
}

// =============================================================================
// Source/destination check
// =============================================================================

async fn disable_declared_source_dest_checks(
    ctx: &RegionContext<'_>,
    ecs_client: &ServiceClient,
    resource: &Resource,
    cfg: &InstanceConfig,
    server_id: &str,
) -> HcsResult<()> {
    let vpc_client = ctx.client(Service::Vpc)?;
    let server = ecs::get(ecs_client, server_id)
        .await
        .with_context(|| format!("error retrieving compute instance: {}", server_id))?;
    let nics = instance_nics(&vpc_client, &server).await?;

    let declared: Vec<HashMap<String, Value>> = resource
        .attributes
        .get("network")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_map().cloned())
        .collect();
    let networks = flatten_networks(&declared, &nics);

    for (network, flat) in cfg.networks.iter().zip(&networks) {
        let port = flat
            .as_map()
            .and_then(|m| m.get("port"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if port.is_empty() || network.source_dest_check {
            continue;
        }
        disable_source_dest_check(&vpc_client, port)
            .await
            .with_context(|| {
                format!(
                    "error disabling source dest check on port({}) of instance({})",
                    port, server_id
                )
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn attrs() -> HashMap<String, Value> {
        let nic = HashMap::from([
            ("uuid".to_string(), Value::string("subnet-1")),
            ("fixed_ip_v4".to_string(), Value::string("192.168.0.10")),
        ]);
        HashMap::from([
            ("name".to_string(), Value::string("web")),
            ("image_id".to_string(), Value::string("img-1")),
            ("flavor_id".to_string(), Value::string("s6.small.1")),
            ("network".to_string(), Value::List(vec![Value::Map(nic)])),
            ("admin_pass".to_string(), Value::string("secret")),
            ("user_data".to_string(), Value::string("#!/bin/bash")),
        ])
    }

    fn parse(attrs: &HashMap<String, Value>) -> InstanceConfig {
        InstanceConfig::parse(attrs, &Config::new("r", "p", "t").with_user_id("user-1")).unwrap()
    }

    #[test]
    fn postpaid_request_body() {
        let cfg = parse(&attrs());
        let opts = build_create_opts(&cfg, "img-1", "vpc-1", Vec::new());
        let body = serde_json::to_value(&opts).unwrap();

        assert_eq!(body["vpcid"], "vpc-1");
        assert_eq!(body["root_volume"]["volumetype"], DEFAULT_SYSTEM_DISK_TYPE);
        assert_eq!(body["nics"][0]["subnet_id"], "subnet-1");
        assert_eq!(body["nics"][0]["ip_address"], "192.168.0.10");
        assert_eq!(body["user_data"], "IyEvYmluL2Jhc2g=");
        assert!(body.get("adminPass").is_none());
        assert!(body.get("extendparam").is_none());
        assert!(body.get("publicip").is_none());
        // The provider user ID is always passed along
        assert_eq!(body["metadata"]["op_svc_userid"], "user-1");
    }

    #[test]
    fn prepaid_and_spot_extend_params() {
        let mut prepaid = attrs();
        prepaid.insert("charging_mode".to_string(), Value::string("prePaid"));
        prepaid.insert("period_unit".to_string(), Value::string("month"));
        prepaid.insert("period".to_string(), Value::Int(3));
        prepaid.insert("auto_renew".to_string(), Value::string("true"));
        let opts = build_create_opts(&parse(&prepaid), "img-1", "vpc-1", Vec::new());
        let param = opts.extend_param.unwrap();
        assert_eq!(param.charging_mode, "prePaid");
        assert_eq!(param.period_num, 3);
        assert_eq!(param.is_auto_pay, "true");
        assert_eq!(param.is_auto_renew, "true");

        let mut spot = attrs();
        spot.insert("charging_mode".to_string(), Value::string("spot"));
        spot.insert("spot_maximum_price".to_string(), Value::string("0.3"));
        spot.insert("spot_duration".to_string(), Value::Int(2));
        spot.insert("spot_duration_count".to_string(), Value::Int(3));
        let param = build_create_opts(&parse(&spot), "img-1", "vpc-1", Vec::new())
            .extend_param
            .unwrap();
        assert_eq!(param.market_type, "spot");
        assert_eq!(param.interruption_policy, "immediate");
        assert_eq!(param.spot_duration_hours, 2);
        assert_eq!(param.spot_duration_count, 3);
    }

    #[test]
    fn disks_and_public_ip() {
        let mut attrs = attrs();
        let disk = HashMap::from([
            ("type".to_string(), Value::string("SSD")),
            ("size".to_string(), Value::Int(100)),
            ("kms_key_id".to_string(), Value::string("kms-1")),
        ]);
        let bandwidth = HashMap::from([
            ("share_type".to_string(), Value::string("PER")),
            ("size".to_string(), Value::Int(10)),
            ("charge_mode".to_string(), Value::string("traffic")),
        ]);
        attrs.insert("data_disks".to_string(), Value::List(vec![Value::Map(disk)]));
        attrs.insert("eip_type".to_string(), Value::string("5_bgp"));
        attrs.insert("bandwidth".to_string(), Value::List(vec![Value::Map(bandwidth)]));
        let tags = HashMap::from([("env".to_string(), Value::string("prod"))]);
        attrs.insert("tags".to_string(), Value::Map(tags));

        let opts = build_create_opts(&parse(&attrs), "img-1", "vpc-1", Vec::new());
        let body = serde_json::to_value(opts).unwrap();
        assert_eq!(body["data_volumes"][0]["metadata"]["__system__encrypted"], "1");
        assert_eq!(body["data_volumes"][0]["metadata"]["__system__cmkid"], "kms-1");
        assert_eq!(body["publicip"]["eip"]["iptype"], "5_bgp");
        assert_eq!(body["publicip"]["eip"]["bandwidth"]["chargemode"], "traffic");
        assert_eq!(body["publicip"]["delete_on_termination"], true);
        assert_eq!(body["server_tags"][0]["key"], "env");
    }

    #[test]
    fn security_group_names_resolved() {
        let groups = vec![
            LegacySecurityGroup {
                id: "sg-1".to_string(),
                name: "default".to_string(),
                ..Default::default()
            },
            LegacySecurityGroup {
                id: "sg-2".to_string(),
                name: "web".to_string(),
                ..Default::default()
            },
        ];
        let names = vec!["web".to_string(), "default".to_string()];
        let refs = match_security_groups(&names, &groups).unwrap();
        assert_eq!(refs[0].id, "sg-2");
        assert_eq!(refs[1].id, "sg-1");

        let names = vec!["web".to_string(), "db".to_string(), "cache".to_string()];
        assert_eq!(match_security_groups(&names, &groups), Err(2));
    }

    #[test]
    fn nova_request_body() {
        let mut attrs = attrs();
        attrs.remove("image_id");
        let bd = HashMap::from([
            ("source_type".to_string(), Value::string("volume")),
            ("destination_type".to_string(), Value::string("volume")),
            ("uuid".to_string(), Value::string("vol-1")),
        ]);
        attrs.insert("block_device_mapping_v2".to_string(), Value::List(vec![Value::Map(bd)]));
        attrs.insert("security_groups".to_string(), Value::string_list(["default"]));
        let cfg = parse(&attrs);
        assert!(cfg.uses_nova_api());

        let body = serde_json::to_value(build_nova_create_opts(&cfg, "")).unwrap();
        assert!(body.get("imageRef").is_none());
        assert!(body.get("adminPass").is_none());
        assert_eq!(body["security_groups"][0]["name"], "default");
        assert_eq!(body["networks"][0]["fixed_ip"], "192.168.0.10");
        assert_eq!(body["block_device_mapping_v2"][0]["uuid"], "vol-1");
    }
}

//! Refresh an instance from the cloud

use std::collections::HashMap;

use log::debug;

use hcs_core::resource::{Attributes, ResourceId, State, Value};

use crate::client::ServiceClient;
use crate::config::Service;
use crate::error::{HcsError, HcsResult, ResultExt};
use crate::provider::RegionContext;
use crate::sdk::ecs::{self, CloudServer};
use crate::sdk::evs;
use crate::utils::{flatten_tags, format_time, normalize_charging_mode};

use super::config::boots_without_image;
use super::create::find_image;
use super::network::{access_addresses, flatten_networks, instance_nics, public_ip};

pub const IMAGE_NOT_FOUND: &str = "Image not found";
pub const BOOT_FROM_VOLUME_IMAGE: &str = "Attempt to boot from volume - no image supplied";

/// Statuses of a server that is gone
const GONE_STATUSES: &[&str] = &["DELETED", "SOFT_DELETED"];

/// Read the instance behind `prior`
///
/// Attributes the API does not return are carried over from `prior`, so
/// reading twice yields the same attributes. A missing or deleted server
/// yields a state that does not exist.
pub async fn read(ctx: &RegionContext<'_>, prior: &State) -> HcsResult<State> {
    let Some(id) = prior.identifier.as_deref() else {
        return Ok(State::not_found(prior.id.clone()));
    };
    let ecs_client = ctx.client(Service::Ecs)?;

    let server = match ecs::get(&ecs_client, id).await {
        Ok(server) => server,
        Err(e) if e.is_not_found() => {
            debug!("Instance {} is gone", id);
            return Ok(State::not_found(prior.id.clone()));
        }
        Err(e) => return Err(e.context("error retrieving compute instance")),
    };
    if GONE_STATUSES.contains(&server.status.as_str()) {
        return Ok(State::not_found(prior.id.clone()));
    }
    debug!("Retrieved compute instance {}: {:?}", id, server);

    let mut attrs = prior.attributes.clone();
    set_server_attributes(&mut attrs, &server, ctx.region());

    let ims_client = ctx.client(Service::Ims)?;
    set_image_attributes(&mut attrs, &ims_client, &server.image.id).await;

    let vpc_client = ctx.client(Service::Vpc)?;
    let declared = network_blocks(&attrs);
    let nics = instance_nics(&vpc_client, &server).await?;
    let networks = flatten_networks(&declared, &nics);
    let (access_v4, access_v6) = access_addresses(&networks, &server);
    attrs.insert("network".to_string(), Value::List(networks));
    attrs.insert("access_ip_v4".to_string(), Value::string(access_v4));
    attrs.insert("access_ip_v6".to_string(), Value::string(access_v6));

    let evs_client = ctx.client(Service::Evs)?;
    set_volume_attributes(&mut attrs, &ecs_client, &evs_client, &server).await?;

    Ok(State::existing(prior.id.clone(), attrs).with_identifier(&server.id))
}

/// Import an instance by its ID, reporting every NIC
pub async fn import(
    ctx: &RegionContext<'_>,
    id: &ResourceId,
    identifier: &str,
) -> HcsResult<State> {
    let state = read(ctx, &State::imported(id.clone(), identifier)).await?;
    if !state.exists {
        return Err(HcsError::Unexpected(format!(
            "compute instance ({}) not found",
            identifier
        )));
    }
    Ok(state)
}

fn network_blocks(attrs: &HashMap<String, Value>) -> Vec<HashMap<String, Value>> {
    attrs
        .get_list("network")
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_map().cloned())
        .collect()
}

/// Attributes taken straight from the server answer
pub fn set_server_attributes(
    attrs: &mut HashMap<String, Value>,
    server: &CloudServer,
    region: &str,
) {
    let mut set = |key: &str, value: Value| {
        attrs.insert(key.to_string(), value);
    };
    set("region", Value::string(region));
    set("availability_zone", Value::string(&server.availability_zone));
    set("name", Value::string(&server.name));
    set("description", Value::string(&server.description));
    set("status", Value::string(&server.status));
    set("agency_name", Value::string(&server.metadata.agency_name));
    set("agent_list", Value::string(&server.metadata.agent_list));
    set(
        "charging_mode",
        Value::string(normalize_charging_mode(&server.metadata.charging_mode)),
    );
    set("created_at", Value::string(format_time(server.created.as_ref())));
    set("updated_at", Value::string(format_time(server.updated.as_ref())));
    set("flavor_id", Value::string(&server.flavor.id));
    set("flavor_name", Value::string(&server.flavor.name));
    if !server.key_name.is_empty() {
        set("key_pair", Value::string(&server.key_name));
    }
    if let Some(ip) = public_ip(server) {
        set("public_ip", Value::string(ip));
    }

    let names: Vec<String> = server
        .security_groups
        .iter()
        .map(|sg| sg.name.clone())
        .collect();
    let ids: Vec<String> = server
        .security_groups
        .iter()
        .map(|sg| sg.id.clone())
        .collect();
    let names = keep_declared_order(attrs.get_list("security_groups"), names);
    let ids = keep_declared_order(attrs.get_list("security_group_ids"), ids);
    attrs.insert("security_groups".to_string(), Value::string_list(names));
    attrs.insert("security_group_ids".to_string(), Value::string_list(ids));

    if !server.scheduler_hints.group.is_empty() {
        let hints = merge_scheduler_hints(
            attrs.get_list("scheduler_hints"),
            &server.scheduler_hints.group,
        );
        attrs.insert("scheduler_hints".to_string(), hints);
    }

    let tags = flatten_tags(&server.tags);
    attrs.insert("tags".to_string(), Value::string_map(tags.iter()));
}

/// Keep the prior order of a set attribute when it holds the same members
fn keep_declared_order(prior: Option<&[Value]>, remote: Vec<String>) -> Vec<String> {
    let Some(prior) = prior else {
        return remote;
    };
    let prior: Vec<String> = prior
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    let mut a = prior.clone();
    let mut b = remote.clone();
    a.sort();
    b.sort();
    if a == b { prior } else { remote }
}

/// One `scheduler_hints` entry per server group, keeping declared fields
fn merge_scheduler_hints(prior: Option<&[Value]>, groups: &[String]) -> Value {
    let base = prior
        .and_then(|blocks| blocks.first())
        .and_then(Value::as_map)
        .cloned()
        .unwrap_or_default();
    Value::List(
        groups
            .iter()
            .map(|group| {
                let mut entry = base.clone();
                entry.insert("group".to_string(), Value::string(group));
                Value::Map(entry)
            })
            .collect(),
    )
}

async fn set_image_attributes(
    attrs: &mut HashMap<String, Value>,
    ims_client: &ServiceClient,
    image_id: &str,
) {
    if boots_without_image(attrs) {
        attrs.insert("image_id".to_string(), Value::string(BOOT_FROM_VOLUME_IMAGE));
        return;
    }
    if image_id.is_empty() {
        return;
    }
    attrs.insert("image_id".to_string(), Value::string(image_id));
    // The image may be gone while the instance still refers to it
    let name = match find_image(ims_client, image_id, "").await {
        Ok(image) => image.name,
        Err(e) => {
            debug!("Image {} of the instance could not be read: {}", image_id, e);
            IMAGE_NOT_FOUND.to_string()
        }
    };
    attrs.insert("image_name".to_string(), Value::string(name));
}

async fn set_volume_attributes(
    attrs: &mut HashMap<String, Value>,
    ecs_client: &ServiceClient,
    evs_client: &ServiceClient,
    server: &CloudServer,
) -> HcsResult<()> {
    if server.volumes_attached.is_empty() {
        return Ok(());
    }

    let mut volumes = Vec::with_capacity(server.volumes_attached.len());
    for attached in &server.volumes_attached {
        let volume = evs::get(evs_client, &attached.id)
            .await
            .with_context(|| format!("error retrieving volume ({})", attached.id))?;
        debug!("Retrieved volume {}: {:?}", attached.id, volume);
        let device = ecs::get_block_device(ecs_client, &server.id, &attached.id)
            .await
            .with_context(|| format!("error retrieving block device ({})", attached.id))?;
        debug!("Retrieved block device {}: {:?}", attached.id, device);

        if device.boot_index == 0 {
            attrs.insert("system_disk_id".to_string(), Value::string(&attached.id));
            attrs.insert("system_disk_size".to_string(), Value::Int(volume.size));
            attrs.insert("system_disk_type".to_string(), Value::string(&volume.volume_type));
        }
        volumes.push(Value::Map(HashMap::from([
            ("volume_id".to_string(), Value::string(&attached.id)),
            ("size".to_string(), Value::Int(volume.size)),
            ("type".to_string(), Value::string(&volume.volume_type)),
            ("boot_index".to_string(), Value::Int(device.boot_index)),
            ("pci_address".to_string(), Value::string(&device.pci_address)),
            (
                "kms_key_id".to_string(),
                Value::string(volume.kms_key_id().unwrap_or_default()),
            ),
        ])));
    }
    attrs.insert("volume_attached".to_string(), Value::List(volumes));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::ecs::{Flavor, ServerMetadata, ServerSchedulerHints, ServerSecurityGroup};

    fn server() -> CloudServer {
        CloudServer {
            id: "srv-1".to_string(),
            name: "web".to_string(),
            status: "ACTIVE".to_string(),
            availability_zone: "az1".to_string(),
            flavor: Flavor {
                id: "s6.small.1".to_string(),
                name: "s6.small.1".to_string(),
            },
            key_name: "kp-1".to_string(),
            security_groups: vec![
                ServerSecurityGroup {
                    id: "sg-1".to_string(),
                    name: "default".to_string(),
                },
                ServerSecurityGroup {
                    id: "sg-2".to_string(),
                    name: "web".to_string(),
                },
            ],
            metadata: ServerMetadata {
                charging_mode: "1".to_string(),
                ..Default::default()
            },
            scheduler_hints: ServerSchedulerHints {
                group: vec!["grp-1".to_string()],
            },
            tags: vec!["env=prod".to_string()],
            created: Some("2024-05-01T10:00:00Z".parse().unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn server_attributes() {
        let mut attrs = HashMap::new();
        set_server_attributes(&mut attrs, &server(), "cn-north-1");
        assert_eq!(attrs.get_string("region"), Some("cn-north-1"));
        assert_eq!(attrs.get_string("charging_mode"), Some("prePaid"));
        assert_eq!(attrs.get_string("created_at"), Some("2024-05-01T10:00:00Z"));
        assert_eq!(attrs.get_string("updated_at"), Some(""));
        assert_eq!(attrs.get_string("key_pair"), Some("kp-1"));
        assert_eq!(attrs.get_string_map("tags")["env"], "prod");
        assert_eq!(
            attrs.get_list("security_group_ids").unwrap(),
            &[Value::string("sg-1"), Value::string("sg-2")]
        );
        assert!(attrs.get("public_ip").is_none());
    }

    #[test]
    fn prior_order_and_hints_survive() {
        let mut attrs = HashMap::from([
            ("security_groups".to_string(), Value::string_list(["web", "default"])),
            (
                "scheduler_hints".to_string(),
                Value::List(vec![Value::Map(HashMap::from([
                    ("group".to_string(), Value::string("")),
                    ("tenancy".to_string(), Value::string("dedicated")),
                ]))]),
            ),
        ]);
        set_server_attributes(&mut attrs, &server(), "r");
        assert_eq!(
            attrs.get_list("security_groups").unwrap(),
            &[Value::string("web"), Value::string("default")]
        );
        let hints = attrs.get_list("scheduler_hints").unwrap()[0].as_map().unwrap();
        assert_eq!(hints.get_string("group"), Some("grp-1"));
        assert_eq!(hints.get_string("tenancy"), Some("dedicated"));

        // A second pass over its own output changes nothing
        let first = attrs.clone();
        set_server_attributes(&mut attrs, &server(), "r");
        assert_eq!(attrs, first);
    }

    #[test]
    fn changed_membership_takes_remote_order() {
        let prior = vec![Value::string("db")];
        let remote = vec!["default".to_string(), "web".to_string()];
        assert_eq!(keep_declared_order(Some(&prior), remote.clone()), remote);
    }
}

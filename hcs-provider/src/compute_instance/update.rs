//! In-place changes of an instance
//!
//! Each group of changed attributes maps to its own API call. Groups are
//! applied in a fixed order and the first failure aborts the update, leaving
//! the groups already applied in place.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use hcs_core::differ::ChangeSet;
use hcs_core::resource::{Attributes, Resource, State, Value};

use crate::client::ServiceClient;
use crate::config::Service;
use crate::error::{HcsError, HcsResult, ResultExt};
use crate::provider::RegionContext;
use crate::schemas::compute_instance::compute_instance_schema;
use crate::sdk::ecs::{self, ResizeExtendParam, ResizeOpts, Tag, UpdateOpts};
use crate::sdk::{bss, evs, kps, nova};

use super::config::InstanceConfig;
use super::network::{disable_source_dest_check, enable_source_dest_check};
use super::power::do_power_action;
use super::read::read;
use super::waiters::{wait_for_job, wait_for_keypair_task, wait_for_order, wait_for_volume_extended};

pub async fn update(ctx: &RegionContext<'_>, from: &State, to: &Resource) -> HcsResult<State> {
    let Some(id) = from.identifier.as_deref() else {
        return Err(HcsError::Unexpected(format!(
            "compute instance {} has no identifier",
            to.id
        )));
    };
    let cfg = InstanceConfig::parse(&to.attributes, ctx.config())?;
    let changes = ChangeSet::between(
        &to.attributes,
        &from.attributes,
        Some(&compute_instance_schema()),
    );
    debug!("Instance {} changed attributes: {:?}", id, changes);

    let ecs_client = ctx.client(Service::Ecs)?;

    if changes.has_changes(&["name", "description"]) {
        let opts = UpdateOpts {
            name: cfg.name.clone(),
            description: Some(cfg.description.clone()),
        };
        ecs::update(&ecs_client, id, &opts)
            .await
            .with_context(|| format!("error updating instance ({})", id))?;
    }

    if changes.has_change("metadata") {
        let old = from.attributes.get_string_map("metadata");
        for key in removed_keys(&old, &cfg.metadata) {
            nova::delete_metadata_item(&ecs_client, id, key)
                .await
                .with_context(|| {
                    format!("error deleting metadata ({}) from instance ({})", key, id)
                })?;
        }
        nova::update_metadata(&ecs_client, id, &cfg.metadata)
            .await
            .with_context(|| format!("error updating metadata of instance ({})", id))?;
    }

    let agency = agency_metadata(&changes, &cfg.agency_name, &cfg.agent_list);
    if !agency.is_empty() {
        nova::update_metadata(&ecs_client, id, &agency)
            .await
            .with_context(|| format!("error updating agency of instance ({})", id))?;
    }

    if changes.has_change("security_group_ids") {
        let old = from.attributes.get_string_set("security_group_ids");
        let new: BTreeSet<String> = cfg.security_group_ids.iter().cloned().collect();
        update_security_groups(&ecs_client, id, &old, &new).await?;
    } else if changes.has_change("security_groups") {
        let old = from.attributes.get_string_set("security_groups");
        let new: BTreeSet<String> = cfg.security_groups.iter().cloned().collect();
        update_security_groups(&ecs_client, id, &old, &new).await?;
    }

    if changes.has_change("admin_pass") && !cfg.admin_pass.is_empty() {
        ecs::change_admin_password(&ecs_client, id, &cfg.admin_pass)
            .await
            .with_context(|| format!("error changing admin password of instance ({})", id))?;
    }

    if changes.has_changes(&["flavor_id", "flavor_name"]) {
        resize(ctx, &ecs_client, id, &cfg).await?;
    }

    if changes.has_change("network") {
        let vpc_client = ctx.client(Service::Vpc)?;
        let old = from.attributes.get_list("network").unwrap_or_default();
        let new = to.attributes.get_list("network").unwrap_or_default();
        for (port, enable) in source_dest_check_changes(old, new) {
            let result = if enable {
                enable_source_dest_check(&vpc_client, &port).await
            } else {
                disable_source_dest_check(&vpc_client, &port).await
            };
            result.with_context(|| {
                format!(
                    "error updating source dest check on port({}) of instance({})",
                    port, id
                )
            })?;
        }
    }

    if changes.has_change("tags") {
        let old = from.attributes.get_string_map("tags");
        let (stale, fresh) = tag_changes(&old, &cfg.tags);
        ecs::tags_action(&ecs_client, id, "delete", &stale)
            .await
            .with_context(|| format!("error deleting tags of instance ({})", id))?;
        ecs::tags_action(&ecs_client, id, "create", &fresh)
            .await
            .with_context(|| format!("error creating tags of instance ({})", id))?;
    }

    if changes.has_change("system_disk_size") {
        let volume_id = from.attributes.get_non_empty("system_disk_id").ok_or_else(|| {
            HcsError::Unexpected(format!("system disk of instance ({}) is unknown", id))
        })?;
        extend_system_disk(ctx, volume_id, &cfg).await?;
    }

    if changes.has_change("key_pair") {
        let old = from.attributes.get_string("key_pair").unwrap_or_default();
        rotate_key_pair(ctx, id, old, &cfg).await?;
    }

    if changes.has_change("power_action") && !cfg.power_action.is_empty() {
        do_power_action(ctx, &ecs_client, id, &cfg.power_action).await?;
    }

    if changes.has_change("auto_renew") {
        let bss_client = ctx.client(Service::Bss)?;
        let result = if to.attributes.get_string("auto_renew") == Some("true") {
            bss::enable_auto_renew(&bss_client, id).await
        } else {
            bss::disable_auto_renew(&bss_client, id).await
        };
        result.with_context(|| format!("error updating auto-renew of instance ({})", id))?;
    }

    let state = read(ctx, &from.overlay(to)).await?;
    if !state.exists {
        return Err(HcsError::Unexpected(format!(
            "instance ({}) disappeared during update",
            id
        )));
    }
    Ok(state)
}

/// Metadata entries of the agency attributes that changed
fn agency_metadata(
    changes: &ChangeSet,
    agency_name: &str,
    agent_list: &str,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    if changes.has_change("agency_name") {
        metadata.insert("agency_name".to_string(), agency_name.to_string());
    }
    if changes.has_change("agent_list") {
        metadata.insert("__support_agent_list".to_string(), agent_list.to_string());
    }
    metadata
}

/// Keys of `old` absent from `new`
fn removed_keys<'a>(
    old: &'a BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Vec<&'a str> {
    old.keys()
        .filter(|k| !new.contains_key(*k))
        .map(String::as_str)
        .collect()
}

async fn update_security_groups(
    client: &ServiceClient,
    id: &str,
    old: &BTreeSet<String>,
    new: &BTreeSet<String>,
) -> HcsResult<()> {
    for group in old.difference(new) {
        match nova::remove_security_group(client, id, group).await {
            Ok(()) => info!("Removed security group ({}) from instance ({})", group, id),
            Err(e) if e.is_not_found() => {
                debug!("Security group ({}) not found on instance ({})", group, id)
            }
            Err(e) => {
                return Err(e.context(format!(
                    "error removing security group ({}) from instance ({})",
                    group, id
                )));
            }
        }
    }
    for group in new.difference(old) {
        nova::add_security_group(client, id, group)
            .await
            .with_context(|| {
                format!("error adding security group ({}) to instance ({})", group, id)
            })?;
        info!("Added security group ({}) to instance ({})", group, id);
    }
    Ok(())
}

async fn resize(
    ctx: &RegionContext<'_>,
    client: &ServiceClient,
    id: &str,
    cfg: &InstanceConfig,
) -> HcsResult<()> {
    let opts = ResizeOpts {
        flavor_ref: cfg.flavor.clone(),
        mode: "withStopServer".to_string(),
        extend_param: cfg.billing.is_prepaid().then(|| ResizeExtendParam {
            is_auto_pay: cfg.auto_pay().to_string(),
        }),
    };
    debug!("Resize options of instance {}: {:?}", id, opts);
    let job = ecs::resize(client, id, &opts)
        .await
        .with_context(|| format!("error resizing instance ({})", id))?;
    wait_for_job(ctx, client, &job.job_id, cfg.timeouts.update)
        .await
        .with_context(|| format!("error waiting for instance ({}) to be resized", id))?;
    Ok(())
}

/// Ports whose source/destination check differs between the old network
/// blocks and the new ones, with the new setting
fn source_dest_check_changes(old: &[Value], new: &[Value]) -> Vec<(String, bool)> {
    old.iter()
        .zip(new)
        .filter_map(|(old, new)| {
            let old = old.as_map()?;
            let new = new.as_map()?;
            let port = old.get_non_empty("port")?;
            let was = old.get_bool_or("source_dest_check", true);
            let wanted = new.get_bool_or("source_dest_check", true);
            (was != wanted).then(|| (port.to_string(), wanted))
        })
        .collect()
}

/// Tags to delete and tags to create to go from `old` to `new`
fn tag_changes(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> (Vec<Tag>, Vec<Tag>) {
    let tag = |(key, value): (&String, &String)| Tag {
        key: key.clone(),
        value: value.clone(),
    };
    let stale = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(tag)
        .collect();
    let fresh = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(tag)
        .collect();
    (stale, fresh)
}

async fn extend_system_disk(
    ctx: &RegionContext<'_>,
    volume_id: &str,
    cfg: &InstanceConfig,
) -> HcsResult<()> {
    let evs_client = ctx.client(Service::Evs)?;
    let prepaid = cfg.billing.is_prepaid();
    let opts = evs::ExtendOpts {
        extend: evs::ExtendSize {
            new_size: cfg.system_disk_size,
        },
        bss_param: prepaid.then(|| evs::BssParam {
            is_auto_pay: cfg.auto_pay().to_string(),
        }),
    };
    let response = evs::extend(&evs_client, volume_id, &opts)
        .await
        .with_context(|| format!("error extending system disk ({})", volume_id))?;

    if prepaid {
        let order_id = response.order_id.ok_or_else(|| {
            HcsError::Unexpected(format!(
                "no order ID returned when extending system disk ({})",
                volume_id
            ))
        })?;
        let bss_client = ctx.client(Service::Bss)?;
        wait_for_order(ctx, &bss_client, &order_id, cfg.timeouts.update).await?;
    }
    wait_for_volume_extended(ctx, &evs_client, volume_id, cfg.timeouts.update).await
}

async fn rotate_key_pair(
    ctx: &RegionContext<'_>,
    id: &str,
    old: &str,
    cfg: &InstanceConfig,
) -> HcsResult<()> {
    let kps_client = ctx.client(Service::Kps)?;
    let task = if !cfg.key_pair.is_empty() {
        kps::associate(&kps_client, &cfg.key_pair, id, &cfg.private_key)
            .await
            .with_context(|| {
                format!("error binding key pair ({}) to instance ({})", cfg.key_pair, id)
            })?
    } else if !old.is_empty() {
        kps::disassociate(&kps_client, id, &cfg.admin_pass)
            .await
            .with_context(|| format!("error unbinding key pair ({}) from instance ({})", old, id))?
    } else {
        return Ok(());
    };
    wait_for_keypair_task(ctx, &kps_client, &task.task_id, cfg.timeouts.update).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn network(port: &str, check: Option<bool>) -> Value {
        let mut block = HashMap::from([("uuid".to_string(), Value::string("subnet-1"))]);
        if !port.is_empty() {
            block.insert("port".to_string(), Value::string(port));
        }
        if let Some(check) = check {
            block.insert("source_dest_check".to_string(), Value::Bool(check));
        }
        Value::Map(block)
    }

    #[test]
    fn source_dest_check_follows_index() {
        let old = vec![network("port-1", Some(true)), network("port-2", Some(false))];
        let new = vec![network("", Some(false)), network("", None)];
        assert_eq!(
            source_dest_check_changes(&old, &new),
            vec![("port-1".to_string(), false), ("port-2".to_string(), true)]
        );

        // Unknown ports are skipped
        let old = vec![network("", Some(true))];
        assert!(source_dest_check_changes(&old, &[network("", Some(false))]).is_empty());
    }

    #[test]
    fn tags_replaced_by_key_and_value() {
        let old = BTreeMap::from([
            ("env".to_string(), "dev".to_string()),
            ("team".to_string(), "a".to_string()),
            ("keep".to_string(), "x".to_string()),
        ]);
        let new = BTreeMap::from([
            ("env".to_string(), "prod".to_string()),
            ("keep".to_string(), "x".to_string()),
            ("owner".to_string(), "b".to_string()),
        ]);
        let (stale, fresh) = tag_changes(&old, &new);
        let keys = |tags: &[Tag]| tags.iter().map(|t| t.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&stale), vec!["env", "team"]);
        assert_eq!(keys(&fresh), vec!["env", "owner"]);
        assert_eq!(fresh[0].value, "prod");
    }

    #[test]
    fn removed_metadata_keys() {
        let old = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        let new = BTreeMap::from([("b".to_string(), "3".to_string())]);
        assert_eq!(removed_keys(&old, &new), vec!["a"]);
    }

    #[test]
    fn agency_update_sends_changed_keys_only() {
        let current = HashMap::from([
            ("agency_name".to_string(), Value::string("ops")),
            ("agent_list".to_string(), Value::string("ces")),
        ]);
        let mut desired = current.clone();
        desired.insert("agency_name".to_string(), Value::string("audit"));

        let changes = ChangeSet::between(&desired, &current, None);
        let metadata = agency_metadata(&changes, "audit", "ces");
        assert_eq!(
            metadata,
            BTreeMap::from([("agency_name".to_string(), "audit".to_string())])
        );

        let unchanged = ChangeSet::between(&current, &current, None);
        assert!(agency_metadata(&unchanged, "ops", "ces").is_empty());
    }
}

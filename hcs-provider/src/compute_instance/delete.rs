//! Destroy an instance
//!
//! Pay-per-use servers go through a batch delete job. Prepaid servers are
//! unsubscribed, together with the EIP that was bought with them.

use std::collections::HashMap;

use log::{debug, warn};

use hcs_core::resource::{Attributes, State, Value};

use crate::config::Service;
use crate::error::{HcsError, HcsResult, ResultExt};
use crate::provider::RegionContext;
use crate::sdk::ecs::{self, DeleteOpts, ServerRef};
use crate::sdk::{bss, vpc};

use super::config::Timeouts;
use super::power::do_power_action;
use super::waiters::{DELETED, wait_for_job, wait_for_server};

pub async fn delete(ctx: &RegionContext<'_>, state: &State) -> HcsResult<()> {
    let Some(id) = state.identifier.as_deref() else {
        debug!("Instance {} has no identifier, nothing to delete", state.id);
        return Ok(());
    };
    let attrs = &state.attributes;
    let timeouts = Timeouts::from_attributes(attrs);
    let ecs_client = ctx.client(Service::Ecs)?;

    if attrs.get_bool_or("stop_before_destroy", false) {
        match do_power_action(ctx, &ecs_client, id, "FORCE-OFF").await {
            Ok(()) => {
                let (pending, target) = (["ACTIVE"], ["SHUTOFF"]);
                wait_for_server(ctx, &ecs_client, id, &pending, &target, timeouts.delete).await?;
            }
            Err(e) => warn!("Error stopping instance ({}): {}", id, e),
        }
    }

    if attrs.get_string("charging_mode") == Some("prePaid") {
        let mut resource_ids = vec![id.to_string()];
        if should_unsubscribe_eip(attrs)
            && let Some(address) = attrs.get_non_empty("public_ip")
        {
            let vpc_client = ctx.client(Service::Vpc)?;
            let eips = vpc::list_public_ips_by_address(&vpc_client, address)
                .await
                .with_context(|| format!("error fetching EIP ({})", address))?;
            let eip = eips.into_iter().next().ok_or_else(|| {
                HcsError::Unexpected(format!(
                    "error fetching EIP ID of instance ({}): no EIP with address {}",
                    id, address
                ))
            })?;
            resource_ids.push(eip.id);
        }
        debug!("Unsubscribing prePaid resources: {:?}", resource_ids);
        let bss_client = ctx.client(Service::Bss)?;
        bss::unsubscribe(&bss_client, &resource_ids)
            .await
            .with_context(|| format!("error unsubscribing instance ({})", id))?;
    } else {
        let opts = DeleteOpts {
            servers: vec![ServerRef { id: id.to_string() }],
            delete_public_ip: attrs.get_bool_or("delete_eip_on_termination", true),
            delete_volume: attrs.get_bool_or("delete_disks_on_termination", false),
        };
        let job = ecs::delete(&ecs_client, &opts)
            .await
            .with_context(|| format!("error deleting instance ({})", id))?;
        wait_for_job(ctx, &ecs_client, &job.job_id, timeouts.delete).await?;
    }

    // The server may linger for a while after its job or order is done
    debug!("Waiting for instance ({}) to delete", id);
    wait_for_server(
        ctx,
        &ecs_client,
        id,
        &["ACTIVE", "SHUTOFF"],
        &[DELETED, "SOFT_DELETED"],
        timeouts.delete,
    )
    .await?;
    Ok(())
}

/// Whether the EIP was bought with a prepaid instance and goes with it
///
/// An EIP joining a shared bandwidth was not part of the order.
pub fn should_unsubscribe_eip(attrs: &HashMap<String, Value>) -> bool {
    let shared_bandwidth = attrs
        .get_list("bandwidth")
        .and_then(|blocks| blocks.first())
        .and_then(Value::as_map)
        .and_then(|b| b.get_non_empty("id"))
        .is_some();
    attrs.get_bool_or("delete_eip_on_termination", true)
        && attrs.get_non_empty("public_ip").is_some()
        && attrs.get_non_empty("eip_type").is_some()
        && !shared_bandwidth
}

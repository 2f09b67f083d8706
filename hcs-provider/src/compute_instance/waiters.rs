//! Waits on servers, ECS jobs, billing orders, volumes and key pair tasks

use std::time::Duration;

use log::debug;

use hcs_core::wait::{ERROR_STATUS, Observation};

use crate::client::ServiceClient;
use crate::error::{HcsError, HcsResult, ResultExt};
use crate::provider::RegionContext;
use crate::sdk::ecs::{self, CloudServer, Job};
use crate::sdk::{bss, evs, kps};

/// Status reported for a server the API no longer knows
pub const DELETED: &str = "DELETED";

/// Refresh a server, reporting a 404 as `DELETED` and an error with its fault
pub async fn refresh_server(
    client: &ServiceClient,
    id: &str,
) -> HcsResult<Observation<CloudServer>> {
    match ecs::get(client, id).await {
        Ok(server) => Ok(server_observation(server)),
        Err(e) if e.is_not_found() => Ok(Observation::new(
            CloudServer {
                id: id.to_string(),
                ..Default::default()
            },
            DELETED,
        )),
        Err(e) => Err(e),
    }
}

fn server_observation(server: CloudServer) -> Observation<CloudServer> {
    let status = server.status.clone();
    let fault = (status == ERROR_STATUS).then(|| {
        let fault = server.fault.clone().unwrap_or_default();
        format!("error code: {}, message: {}", fault.code, fault.message)
    });
    let observation = Observation::new(server, status);
    match fault {
        Some(fault) => observation.with_fault(fault),
        None => observation,
    }
}

pub async fn wait_for_server(
    ctx: &RegionContext<'_>,
    client: &ServiceClient,
    id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> HcsResult<CloudServer> {
    ctx.state_change(pending, target, timeout)
        .wait_for_state(move || refresh_server(client, id))
        .await
        .with_context(|| {
            format!(
                "error waiting for instance ({}) to become target state ({})",
                id,
                target.join(", ")
            )
        })
}

fn job_observation(job: Job) -> Observation<Job> {
    match job.status.as_str() {
        "FAIL" => {
            let fault = format!("{} ({})", job.fail_reason, job.error_code);
            Observation::new(job, ERROR_STATUS).with_fault(fault)
        }
        status => {
            let status = status.to_string();
            Observation::new(job, status)
        }
    }
}

/// Wait for an ECS job to succeed
pub async fn wait_for_job(
    ctx: &RegionContext<'_>,
    client: &ServiceClient,
    job_id: &str,
    timeout: Duration,
) -> HcsResult<Job> {
    debug!("Waiting for job {}", job_id);
    ctx.state_change(&["INIT", "RUNNING"], &["SUCCESS"], timeout)
        .wait_for_state(move || async move {
            ecs::get_job(client, job_id).await.map(job_observation)
        })
        .await
        .with_context(|| format!("error waiting for job ({})", job_id))
}

/// Status reported for an order neither complete nor cancelled
const ORDER_IN_FLIGHT: &str = "IN_FLIGHT";

/// Pending approval, processing and pending payment all keep the order alive
fn order_observation(status: &str) -> Observation<()> {
    match status {
        bss::ORDER_COMPLETED => Observation::new((), bss::ORDER_COMPLETED),
        bss::ORDER_CANCELLED => {
            Observation::new((), ERROR_STATUS).with_fault("the order has been cancelled")
        }
        _ => Observation::new((), ORDER_IN_FLIGHT),
    }
}

/// Wait for a billing order to complete
pub async fn wait_for_order(
    ctx: &RegionContext<'_>,
    client: &ServiceClient,
    order_id: &str,
    timeout: Duration,
) -> HcsResult<()> {
    ctx.state_change(&[ORDER_IN_FLIGHT], &[bss::ORDER_COMPLETED], timeout)
        .wait_for_state(move || async move {
            let order = bss::get_order(client, order_id).await?;
            debug!("Order {} status: {}", order_id, order.status);
            Ok::<_, HcsError>(order_observation(&order.status))
        })
        .await
        .with_context(|| format!("the order ({}) is not completed", order_id))
}

/// Wait for the main resource of an order and return its ID
pub async fn wait_for_order_resource(
    ctx: &RegionContext<'_>,
    client: &ServiceClient,
    order_id: &str,
    timeout: Duration,
) -> HcsResult<String> {
    ctx.state_change(&["PENDING"], &["DONE"], timeout)
        .wait_for_state(move || async move {
            let ids = bss::order_resource_ids(client, order_id).await?;
            Ok::<_, HcsError>(match ids.into_iter().next() {
                Some(id) => Observation::new(id, "DONE"),
                None => Observation::new(String::new(), "PENDING"),
            })
        })
        .await
        .with_context(|| format!("error waiting for the resource of order ({})", order_id))
}

/// Wait for a volume extension to finish
pub async fn wait_for_volume_extended(
    ctx: &RegionContext<'_>,
    client: &ServiceClient,
    volume_id: &str,
    timeout: Duration,
) -> HcsResult<()> {
    ctx.state_change(&["extending"], &["available", "in-use"], timeout)
        .wait_for_state(move || async move {
            let volume = evs::get(client, volume_id).await?;
            let observation = if volume.status.starts_with("error") {
                Observation::new((), ERROR_STATUS).with_fault(volume.status)
            } else {
                Observation::new((), volume.status)
            };
            Ok::<_, HcsError>(observation)
        })
        .await
        .with_context(|| format!("error waiting for system disk ({}) to become ready", volume_id))
}

/// Wait for a key pair task to succeed
pub async fn wait_for_keypair_task(
    ctx: &RegionContext<'_>,
    client: &ServiceClient,
    task_id: &str,
    timeout: Duration,
) -> HcsResult<()> {
    ctx.state_change(&["READY_RESET", "RUNNING"], &["SUCCESS"], timeout)
        .wait_for_state(move || async move {
            let task = kps::get_task(client, task_id).await?;
            let observation = match task.task_status.as_str() {
                "FAILED" => Observation::new((), ERROR_STATUS)
                    .with_fault(task.failed_reason.unwrap_or_default()),
                status => Observation::new((), status),
            };
            Ok::<_, HcsError>(observation)
        })
        .await
        .with_context(|| format!("error waiting for key pair task ({})", task_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::ecs::Fault;
    use hcs_core::wait::{StateChangeConf, WaitError};

    #[test]
    fn error_status_carries_fault() {
        let server = CloudServer {
            id: "srv-1".to_string(),
            status: "ERROR".to_string(),
            fault: Some(Fault {
                code: 500,
                message: "No valid host".to_string(),
            }),
            ..Default::default()
        };
        let observation = server_observation(server);
        assert_eq!(observation.status, "ERROR");
        assert_eq!(
            observation.fault.as_deref(),
            Some("error code: 500, message: No valid host")
        );

        let active = server_observation(CloudServer {
            id: "srv-1".to_string(),
            status: "ACTIVE".to_string(),
            ..Default::default()
        });
        assert_eq!(active.fault, None);
    }

    #[test]
    fn failed_job_is_an_error() {
        let job = Job {
            status: "FAIL".to_string(),
            fail_reason: "quota exceeded".to_string(),
            error_code: "Ecs.0000".to_string(),
            ..Default::default()
        };
        let observation = job_observation(job);
        assert_eq!(observation.status, ERROR_STATUS);
        assert_eq!(observation.fault.as_deref(), Some("quota exceeded (Ecs.0000)"));

        let running = job_observation(Job {
            status: "RUNNING".to_string(),
            ..Default::default()
        });
        assert_eq!(running.status, "RUNNING");
    }

    fn order_wait() -> StateChangeConf {
        StateChangeConf::new(
            &[ORDER_IN_FLIGHT],
            &[bss::ORDER_COMPLETED],
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn order_waits_through_pending_payment() {
        let statuses = ["6", "1", bss::ORDER_PROCESSING, bss::ORDER_COMPLETED];
        let mut polls = 0;
        order_wait()
            .wait_for_state(|| {
                let status = statuses[polls];
                polls += 1;
                std::future::ready(Ok::<_, HcsError>(order_observation(status)))
            })
            .await
            .unwrap();
        assert_eq!(polls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_order_fails() {
        let err = order_wait()
            .wait_for_state(|| {
                std::future::ready(Ok::<_, HcsError>(order_observation(bss::ORDER_CANCELLED)))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Failed { .. }));
    }
}

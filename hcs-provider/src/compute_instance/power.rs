//! Power actions: start, stop and reboot

use std::time::Duration;

use crate::client::ServiceClient;
use crate::error::{HcsError, HcsResult, ResultExt};
use crate::provider::RegionContext;
use crate::sdk::ecs::{self, PowerOpts, ServerRef};

use super::waiters::wait_for_job;

/// Power changes usually take 15 to 35 seconds
const POWER_ACTION_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Map a `power_action` value to the API action and its options
pub fn power_request(server_id: &str, action: &str) -> HcsResult<(&'static str, PowerOpts)> {
    let (base, hard) = match action.strip_prefix("FORCE-") {
        Some(base) => (base, true),
        None => (action, false),
    };
    let op = match base {
        "ON" if !hard => "os-start",
        "OFF" => "os-stop",
        "REBOOT" => "reboot",
        _ => {
            return Err(HcsError::Unexpected(format!(
                "unsupported power action ({})",
                action
            )));
        }
    };
    let kind = if hard {
        Some("HARD".to_string())
    } else if base != "ON" {
        Some("SOFT".to_string())
    } else {
        None
    };
    Ok((
        op,
        PowerOpts {
            servers: vec![ServerRef {
                id: server_id.to_string(),
            }],
            kind,
        },
    ))
}

/// Run `action` on the server and wait for its job
pub async fn do_power_action(
    ctx: &RegionContext<'_>,
    client: &ServiceClient,
    server_id: &str,
    action: &str,
) -> HcsResult<()> {
    let (op, opts) = power_request(server_id, action)?;
    let job = ecs::power_action(client, op, &opts).await.with_context(|| {
        format!(
            "doing power action ({}) for instance ({}) failed",
            action, server_id
        )
    })?;
    wait_for_job(ctx, client, &job.job_id, POWER_ACTION_TIMEOUT)
        .await
        .with_context(|| {
            format!(
                "waiting power action ({}) for instance ({}) failed",
                action, server_id
            )
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_types() {
        let (op, opts) = power_request("srv-1", "ON").unwrap();
        assert_eq!(op, "os-start");
        assert_eq!(opts.kind, None);

        let (op, opts) = power_request("srv-1", "OFF").unwrap();
        assert_eq!(op, "os-stop");
        assert_eq!(opts.kind.as_deref(), Some("SOFT"));

        let (op, opts) = power_request("srv-1", "FORCE-REBOOT").unwrap();
        assert_eq!(op, "reboot");
        assert_eq!(opts.kind.as_deref(), Some("HARD"));
        assert_eq!(opts.servers[0].id, "srv-1");
    }

    #[test]
    fn unknown_actions_fail() {
        assert!(power_request("srv-1", "SUSPEND").is_err());
        assert!(power_request("srv-1", "FORCE-ON").is_err());
    }

    #[test]
    fn start_omits_type() {
        let (_, opts) = power_request("srv-1", "ON").unwrap();
        let body = serde_json::to_value(&opts).unwrap();
        assert_eq!(body, serde_json::json!({ "servers": [{ "id": "srv-1" }] }));
    }
}

//! Elastic Cloud Server native API (`/v1` and `/v1.1` cloudservers)

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{is_zero, null_default};
use crate::client::ServiceClient;
use crate::error::HcsResult;

// =============================================================================
// Create
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateOpts {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_name: String,
    #[serde(rename = "adminPass", skip_serializing_if = "String::is_empty")]
    pub admin_pass: String,
    #[serde(rename = "vpcid")]
    pub vpc_id: String,
    pub nics: Vec<Nic>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<SecurityGroupRef>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub availability_zone: String,
    pub root_volume: RootVolume,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_volumes: Vec<DataVolume>,
    #[serde(rename = "publicip", skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<PublicIp>,
    /// Base64 encoded
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_data: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub server_tags: Vec<Tag>,
    #[serde(rename = "extendparam", skip_serializing_if = "Option::is_none")]
    pub extend_param: Option<ServerExtendParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetaData>,
    #[serde(rename = "os:scheduler_hints", skip_serializing_if = "Option::is_none")]
    pub scheduler_hints: Option<SchedulerHints>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Nic {
    pub subnet_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ipv6_enable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroupRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RootVolume {
    #[serde(rename = "volumetype")]
    pub volume_type: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataVolume {
    #[serde(rename = "volumetype")]
    pub volume_type: String,
    pub size: i64,
    #[serde(rename = "extendparam", skip_serializing_if = "Option::is_none")]
    pub extend_param: Option<VolumeExtendParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VolumeMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeExtendParam {
    #[serde(rename = "snapshotId")]
    pub snapshot_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeMetadata {
    #[serde(rename = "__system__encrypted")]
    pub system_encrypted: String,
    #[serde(rename = "__system__cmkid")]
    pub system_cmk_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublicIp {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eip: Option<Eip>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub delete_on_termination: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Eip {
    #[serde(rename = "iptype")]
    pub ip_type: String,
    pub bandwidth: Bandwidth,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bandwidth {
    #[serde(rename = "sharetype")]
    pub share_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub size: i64,
    #[serde(rename = "chargemode", skip_serializing_if = "String::is_empty")]
    pub charge_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerExtendParam {
    #[serde(rename = "chargingMode", skip_serializing_if = "String::is_empty")]
    pub charging_mode: String,
    #[serde(rename = "periodType", skip_serializing_if = "String::is_empty")]
    pub period_type: String,
    #[serde(rename = "periodNum", skip_serializing_if = "is_zero")]
    pub period_num: i64,
    #[serde(rename = "isAutoRenew", skip_serializing_if = "String::is_empty")]
    pub is_auto_renew: String,
    #[serde(rename = "isAutoPay", skip_serializing_if = "String::is_empty")]
    pub is_auto_pay: String,
    #[serde(rename = "marketType", skip_serializing_if = "String::is_empty")]
    pub market_type: String,
    #[serde(rename = "spotPrice", skip_serializing_if = "String::is_empty")]
    pub spot_price: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub interruption_policy: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub spot_duration_hours: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub spot_duration_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetaData {
    #[serde(rename = "op_svc_userid", skip_serializing_if = "String::is_empty")]
    pub op_svc_user_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agency_name: String,
    #[serde(rename = "__support_agent_list", skip_serializing_if = "String::is_empty")]
    pub agent_list: String,
}

impl MetaData {
    pub fn is_empty(&self) -> bool {
        self == &MetaData::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerHints {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fault_domain: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenancy: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dedicated_host_id: String,
}

/// Answer of a create: a job for postPaid/spot, an order for prePaid
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateResponse {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default, rename = "serverIds")]
    pub server_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
}

pub async fn create(client: &ServiceClient, opts: &CreateOpts) -> HcsResult<CreateResponse> {
    #[derive(Serialize)]
    struct Body<'a> {
        server: &'a CreateOpts,
    }
    let path = format!("v1.1/{}/cloudservers", client.project_id());
    client.post(&path, &Body { server: opts }).await
}

// =============================================================================
// Get
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudServer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "OS-EXT-AZ:availability_zone")]
    pub availability_zone: String,
    #[serde(default)]
    pub flavor: Flavor,
    #[serde(default, deserialize_with = "null_default")]
    pub image: ImageRef,
    #[serde(default, deserialize_with = "null_default")]
    pub key_name: String,
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<Address>>,
    #[serde(default, rename = "accessIPv4")]
    pub access_ipv4: String,
    #[serde(default, rename = "accessIPv6")]
    pub access_ipv6: String,
    #[serde(default)]
    pub security_groups: Vec<ServerSecurityGroup>,
    #[serde(default, rename = "os-extended-volumes:volumes_attached")]
    pub volumes_attached: Vec<VolumeAttached>,
    #[serde(default)]
    pub metadata: ServerMetadata,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_default")]
    pub tags: Vec<String>,
    #[serde(default, rename = "os:scheduler_hints")]
    pub scheduler_hints: ServerSchedulerHints,
    #[serde(default)]
    pub fault: Option<Fault>,
    #[serde(default)]
    pub enterprise_project_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Flavor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default, rename = "OS-EXT-IPS-MAC:mac_addr")]
    pub mac_addr: String,
    /// "fixed" or "floating"
    #[serde(default, rename = "OS-EXT-IPS:type")]
    pub kind: String,
    #[serde(default, rename = "OS-EXT-IPS:port_id")]
    pub port_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSecurityGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeAttached {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerMetadata {
    /// "0" postPaid, "1" prePaid, "2" spot
    #[serde(default)]
    pub charging_mode: String,
    #[serde(default)]
    pub agency_name: String,
    #[serde(default, rename = "__support_agent_list")]
    pub agent_list: String,
    #[serde(default, rename = "metering.order_id")]
    pub order_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSchedulerHints {
    #[serde(default, deserialize_with = "null_default")]
    pub group: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fault {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

pub async fn get(client: &ServiceClient, id: &str) -> HcsResult<CloudServer> {
    #[derive(Deserialize)]
    struct Body {
        server: CloudServer,
    }
    let path = format!("v1/{}/cloudservers/{}", client.project_id(), id);
    let body: Body = client.get(&path).await?;
    Ok(body.server)
}

// =============================================================================
// Update / password / resize
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateOpts {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub async fn update(client: &ServiceClient, id: &str, opts: &UpdateOpts) -> HcsResult<()> {
    #[derive(Serialize)]
    struct Body<'a> {
        server: &'a UpdateOpts,
    }
    let path = format!("v1/{}/cloudservers/{}", client.project_id(), id);
    client.put_no_content(&path, &Body { server: opts }).await
}

pub async fn change_admin_password(
    client: &ServiceClient,
    id: &str,
    password: &str,
) -> HcsResult<()> {
    let path = format!(
        "v1/{}/cloudservers/{}/os-reset-password",
        client.project_id(),
        id
    );
    let body = serde_json::json!({ "reset-password": { "new_password": password } });
    client.put_no_content(&path, &body).await
}

#[derive(Debug, Clone, Serialize)]
pub struct ResizeOpts {
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    pub mode: String,
    #[serde(rename = "extendparam", skip_serializing_if = "Option::is_none")]
    pub extend_param: Option<ResizeExtendParam>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResizeExtendParam {
    #[serde(rename = "isAutoPay")]
    pub is_auto_pay: String,
}

pub async fn resize(client: &ServiceClient, id: &str, opts: &ResizeOpts) -> HcsResult<JobResponse> {
    #[derive(Serialize)]
    struct Body<'a> {
        resize: &'a ResizeOpts,
    }
    let path = format!("v1.1/{}/cloudservers/{}/resize", client.project_id(), id);
    client.post(&path, &Body { resize: opts }).await
}

// =============================================================================
// Delete / power actions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOpts {
    pub servers: Vec<ServerRef>,
    #[serde(rename = "delete_publicip")]
    pub delete_public_ip: bool,
    pub delete_volume: bool,
}

pub async fn delete(client: &ServiceClient, opts: &DeleteOpts) -> HcsResult<JobResponse> {
    let path = format!("v1/{}/cloudservers/delete", client.project_id());
    client.post(&path, opts).await
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerOpts {
    pub servers: Vec<ServerRef>,
    /// "SOFT" or "HARD"; absent for start
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Run `os-start`, `os-stop` or `reboot`
pub async fn power_action(
    client: &ServiceClient,
    action: &str,
    opts: &PowerOpts,
) -> HcsResult<JobResponse> {
    let path = format!("v1/{}/cloudservers/action", client.project_id());
    let mut body = serde_json::Map::new();
    body.insert(
        action.to_string(),
        serde_json::to_value(opts).map_err(|e| crate::error::HcsError::Unexpected(e.to_string()))?,
    );
    client.post(&path, &body).await
}

// =============================================================================
// Jobs
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub entities: JobEntities,
    #[serde(default, deserialize_with = "null_default")]
    pub fail_reason: String,
    #[serde(default, deserialize_with = "null_default")]
    pub error_code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobEntities {
    #[serde(default, deserialize_with = "null_default")]
    pub sub_jobs: Vec<SubJob>,
    #[serde(default, deserialize_with = "null_default")]
    pub server_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubJob {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub entities: HashMap<String, serde_json::Value>,
}

impl Job {
    /// Look up an entity reported by the job, e.g. `server_id`
    pub fn entity(&self, label: &str) -> Option<String> {
        let from_sub_jobs = self
            .entities
            .sub_jobs
            .iter()
            .find_map(|s| s.entities.get(label).and_then(|v| v.as_str()))
            .map(String::from);
        from_sub_jobs.or_else(|| {
            (label == "server_id" && !self.entities.server_id.is_empty())
                .then(|| self.entities.server_id.clone())
        })
    }
}

pub async fn get_job(client: &ServiceClient, job_id: &str) -> HcsResult<Job> {
    let path = format!("v1/{}/jobs/{}", client.project_id(), job_id);
    client.get(&path).await
}

// =============================================================================
// Block devices / tags
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockDevice {
    #[serde(default, rename = "volumeId")]
    pub volume_id: String,
    #[serde(default, rename = "bootIndex", deserialize_with = "null_default")]
    pub boot_index: i64,
    #[serde(default, rename = "pciAddress", deserialize_with = "null_default")]
    pub pci_address: String,
    #[serde(default, deserialize_with = "null_default")]
    pub device: String,
}

pub async fn get_block_device(
    client: &ServiceClient,
    server_id: &str,
    volume_id: &str,
) -> HcsResult<BlockDevice> {
    #[derive(Deserialize)]
    struct Body {
        #[serde(rename = "volumeAttachment")]
        attachment: BlockDevice,
    }
    let path = format!(
        "v1/{}/cloudservers/{}/block_device/{}",
        client.project_id(),
        server_id,
        volume_id
    );
    let body: Body = client.get(&path).await?;
    Ok(body.attachment)
}

/// Batch create or delete tags of a server
pub async fn tags_action(
    client: &ServiceClient,
    server_id: &str,
    action: &str,
    tags: &[Tag],
) -> HcsResult<()> {
    if tags.is_empty() {
        return Ok(());
    }
    let path = format!(
        "v1/{}/cloudservers/{}/tags/action",
        client.project_id(),
        server_id
    );
    let body = serde_json::json!({ "action": action, "tags": tags });
    client.post_no_content(&path, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_opts_skip_empty_fields() {
        let opts = CreateOpts {
            name: "web".to_string(),
            image_ref: "img".to_string(),
            flavor_ref: "s6.small.1".to_string(),
            vpc_id: "vpc-1".to_string(),
            nics: vec![Nic {
                subnet_id: "subnet-1".to_string(),
                ..Default::default()
            }],
            root_volume: RootVolume {
                volume_type: "GPSSD".to_string(),
                size: 0,
            },
            ..Default::default()
        };

        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "web",
                "imageRef": "img",
                "flavorRef": "s6.small.1",
                "vpcid": "vpc-1",
                "nics": [{"subnet_id": "subnet-1"}],
                "root_volume": {"volumetype": "GPSSD"}
            })
        );
    }

    #[test]
    fn server_decodes_extension_fields() {
        let server: CloudServer = serde_json::from_value(serde_json::json!({
            "id": "srv-1",
            "name": "web",
            "description": null,
            "status": "ACTIVE",
            "OS-EXT-AZ:availability_zone": "az1",
            "flavor": {"id": "s6.small.1", "name": "s6.small.1"},
            "image": {"id": "img-1"},
            "addresses": {
                "net-1": [{
                    "addr": "192.168.0.10",
                    "version": 4,
                    "OS-EXT-IPS-MAC:mac_addr": "fa:16:3e:00:00:01",
                    "OS-EXT-IPS:type": "fixed",
                    "OS-EXT-IPS:port_id": "port-1"
                }]
            },
            "os-extended-volumes:volumes_attached": [{"id": "vol-1"}],
            "metadata": {"charging_mode": "1"},
            "created": "2024-05-01T10:00:00Z",
            "tags": ["env=prod"],
            "os:scheduler_hints": {"group": null}
        }))
        .unwrap();

        assert_eq!(server.description, "");
        assert_eq!(server.addresses["net-1"][0].port_id, "port-1");
        assert_eq!(server.volumes_attached[0].id, "vol-1");
        assert_eq!(server.metadata.charging_mode, "1");
        assert!(server.created.is_some());
        assert!(server.scheduler_hints.group.is_empty());
    }

    #[test]
    fn job_entity_from_sub_jobs() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "status": "SUCCESS",
            "entities": {"sub_jobs": [{"status": "SUCCESS", "entities": {"server_id": "srv-9"}}]}
        }))
        .unwrap();
        assert_eq!(job.entity("server_id").as_deref(), Some("srv-9"));
        assert_eq!(job.entity("nic_id"), None);
    }
}

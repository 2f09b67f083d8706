//! Nova-compatible compute API (`/v2.1/{project}/servers`)
//!
//! Used for servers booted from explicit block device mappings and for the
//! metadata and security group operations the native API lacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::is_zero;
use crate::client::ServiceClient;
use crate::error::HcsResult;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateOpts {
    pub name: String,
    #[serde(rename = "imageRef", skip_serializing_if = "String::is_empty")]
    pub image_ref: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<SecurityGroupName>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub availability_zone: String,
    pub networks: Vec<Network>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(rename = "adminPass", skip_serializing_if = "String::is_empty")]
    pub admin_pass: String,
    /// Base64 encoded
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_data: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub block_device_mapping_v2: Vec<BlockDeviceMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroupName {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Network {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub port: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fixed_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockDeviceMapping {
    pub source_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub destination_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    pub boot_index: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub volume_size: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub volume_type: String,
    pub delete_on_termination: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub guest_format: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerHints {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

pub async fn create(
    client: &ServiceClient,
    opts: &CreateOpts,
    hints: Option<&SchedulerHints>,
) -> HcsResult<Server> {
    #[derive(Serialize)]
    struct Body<'a> {
        server: &'a CreateOpts,
        #[serde(rename = "os:scheduler_hints", skip_serializing_if = "Option::is_none")]
        hints: Option<&'a SchedulerHints>,
    }
    #[derive(Deserialize)]
    struct Response {
        server: Server,
    }
    let path = format!("v2.1/{}/servers", client.project_id());
    let response: Response = client
        .post(&path, &Body { server: opts, hints })
        .await?;
    Ok(response.server)
}
pub async fn delete_metadata_item(client: &ServiceClient, id: &str, key: &str) -> HcsResult<()> {
    let path = format!("v2.1/{}/servers/{}/metadata/{}", client.project_id(), id, key);
    client.delete::<()>(&path, None).await
}

/// Merge `metadata` into the server metadata
pub async fn update_metadata(
    client: &ServiceClient,
    id: &str,
    metadata: &BTreeMap<String, String>,
) -> HcsResult<()> {
    if metadata.is_empty() {
        return Ok(());
    }
    let path = format!("v2.1/{}/servers/{}/metadata", client.project_id(), id);
    client
        .post_no_content(&path, &serde_json::json!({ "metadata": metadata }))
        .await
}

pub async fn add_security_group(client: &ServiceClient, id: &str, name: &str) -> HcsResult<()> {
    security_group_action(client, id, "addSecurityGroup", name).await
}

pub async fn remove_security_group(client: &ServiceClient, id: &str, name: &str) -> HcsResult<()> {
    security_group_action(client, id, "removeSecurityGroup", name).await
}

async fn security_group_action(
    client: &ServiceClient,
    id: &str,
    action: &str,
    name: &str,
) -> HcsResult<()> {
    let path = format!("v2.1/{}/servers/{}/action", client.project_id(), id);
    let mut body = serde_json::Map::new();
    body.insert(action.to_string(), serde_json::json!({ "name": name }));
    client.post_no_content(&path, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_device_keeps_boot_index_zero() {
        let mapping = BlockDeviceMapping {
            source_type: "image".to_string(),
            destination_type: "volume".to_string(),
            uuid: "img-1".to_string(),
            boot_index: 0,
            volume_size: 40,
            delete_on_termination: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["boot_index"], 0);
        assert_eq!(json["volume_size"], 40);
        assert!(json.get("volume_type").is_none());
    }
}

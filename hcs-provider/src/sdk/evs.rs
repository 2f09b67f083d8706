//! Elastic Volume Service

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::null_default;
use crate::client::ServiceClient;
use crate::error::HcsResult;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_default")]
    pub metadata: HashMap<String, String>,
}

impl Volume {
    /// KMS key the volume is encrypted with, if any
    pub fn kms_key_id(&self) -> Option<&str> {
        self.metadata
            .get("__system__cmkid")
            .map(String::as_str)
            .filter(|k| !k.is_empty())
    }
}

pub async fn get(client: &ServiceClient, id: &str) -> HcsResult<Volume> {
    #[derive(Deserialize)]
    struct Response {
        volume: Volume,
    }
    let path = format!("v2/{}/cloudvolumes/{}", client.project_id(), id);
    let response: Response = client.get(&path).await?;
    Ok(response.volume)
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtendOpts {
    #[serde(rename = "os-extend")]
    pub extend: ExtendSize,
    #[serde(rename = "bssParam", skip_serializing_if = "Option::is_none")]
    pub bss_param: Option<BssParam>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtendSize {
    pub new_size: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BssParam {
    #[serde(rename = "isAutoPay")]
    pub is_auto_pay: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendResponse {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
}

pub async fn extend(
    client: &ServiceClient,
    id: &str,
    opts: &ExtendOpts,
) -> HcsResult<ExtendResponse> {
    let path = format!("v2.1/{}/cloudvolumes/{}/action", client.project_id(), id);
    client.post(&path, opts).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_body_shape() {
        let opts = ExtendOpts {
            extend: ExtendSize { new_size: 80 },
            bss_param: Some(BssParam {
                is_auto_pay: "true".to_string(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&opts).unwrap(),
            serde_json::json!({"os-extend": {"new_size": 80}, "bssParam": {"isAutoPay": "true"}})
        );
    }

    #[test]
    fn kms_key_from_metadata() {
        let volume: Volume = serde_json::from_value(serde_json::json!({
            "id": "vol-1",
            "size": 40,
            "metadata": {"__system__cmkid": "key-1"}
        }))
        .unwrap();
        assert_eq!(volume.kms_key_id(), Some("key-1"));

        let plain: Volume =
            serde_json::from_value(serde_json::json!({"id": "vol-2", "metadata": null})).unwrap();
        assert_eq!(plain.kms_key_id(), None);
    }
}

//! Key pair service: binding SSH key pairs to servers

use serde::{Deserialize, Serialize};

use crate::client::ServiceClient;
use crate::error::HcsResult;

#[derive(Debug, Clone, Serialize)]
pub struct Auth {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerAuth {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub task_status: String,
    #[serde(default)]
    pub failed_reason: Option<String>,
}

/// Unbind the key pair, switching the server to password login
pub async fn disassociate(
    client: &ServiceClient,
    server_id: &str,
    password: &str,
) -> HcsResult<TaskResponse> {
    let path = format!("v3/{}/keypairs/disassociate", client.project_id());
    let auth = (!password.is_empty()).then(|| Auth {
        kind: "password".to_string(),
        key: password.to_string(),
    });
    let body = serde_json::json!({
        "server": ServerAuth { id: server_id.to_string(), auth }
    });
    client.post(&path, &body).await
}

/// Bind `keypair_name`, proving access with the currently installed private key
pub async fn associate(
    client: &ServiceClient,
    keypair_name: &str,
    server_id: &str,
    private_key: &str,
) -> HcsResult<TaskResponse> {
    let path = format!("v3/{}/keypairs/associate", client.project_id());
    let auth = (!private_key.is_empty()).then(|| Auth {
        kind: "classic".to_string(),
        key: private_key.to_string(),
    });
    let body = serde_json::json!({
        "keypair_name": keypair_name,
        "server": ServerAuth { id: server_id.to_string(), auth }
    });
    client.post(&path, &body).await
}

pub async fn get_task(client: &ServiceClient, task_id: &str) -> HcsResult<Task> {
    let path = format!("v3/{}/tasks/{}", client.project_id(), task_id);
    client.get(&path).await
}

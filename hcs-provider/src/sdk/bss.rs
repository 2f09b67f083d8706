//! Billing orders and subscriptions

use serde::{Deserialize, Serialize};

use crate::client::ServiceClient;
use crate::error::HcsResult;

/// Order status while it is being processed
pub const ORDER_PROCESSING: &str = "3";
/// Order status once it is cancelled
pub const ORDER_CANCELLED: &str = "4";
/// Order status once it is complete
pub const ORDER_COMPLETED: &str = "5";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderInfo {
    #[serde(default)]
    pub order_id: String,
    /// Numeric status; the API sends either a number or a string
    #[serde(default, deserialize_with = "status_string")]
    pub status: String,
}

fn status_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

pub async fn get_order(client: &ServiceClient, order_id: &str) -> HcsResult<OrderInfo> {
    #[derive(Deserialize)]
    struct Response {
        order_info: OrderInfo,
    }
    let path = format!("v2/orders/customer-orders/details/{}", order_id);
    let response: Response = client.get(&path).await?;
    Ok(response.order_info)
}

/// Main resource IDs created by an order
pub async fn order_resource_ids(client: &ServiceClient, order_id: &str) -> HcsResult<Vec<String>> {
    #[derive(Deserialize)]
    struct Resource {
        resource_id: String,
    }
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        data: Vec<Resource>,
    }
    let query = [("order_id", order_id), ("only_main_resource", "1")];
    let response: Response = client
        .get_query("v2/orders/suscriptions/resources", &query)
        .await?;
    Ok(response.data.into_iter().map(|r| r.resource_id).collect())
}

#[derive(Debug, Clone, Serialize)]
struct UnsubscribeOpts<'a> {
    resource_ids: &'a [String],
    unsubscribe_type: i32,
}

/// Unsubscribe prepaid resources, releasing them immediately
pub async fn unsubscribe(client: &ServiceClient, resource_ids: &[String]) -> HcsResult<()> {
    let opts = UnsubscribeOpts {
        resource_ids,
        unsubscribe_type: 1,
    };
    client
        .post_no_content("v2/orders/subscriptions/resources/unsubscribe", &opts)
        .await
}

pub async fn enable_auto_renew(client: &ServiceClient, resource_id: &str) -> HcsResult<()> {
    let path = format!("v2/orders/subscriptions/resources/autorenew/{}", resource_id);
    let body = serde_json::json!({ "resource_id": resource_id, "action_id": "autorenew" });
    client.post_no_content(&path, &body).await
}

pub async fn disable_auto_renew(client: &ServiceClient, resource_id: &str) -> HcsResult<()> {
    let path = format!("v2/orders/subscriptions/resources/autorenew/{}", resource_id);
    client
        .delete(&path, Some(&[("action_id", "autorenew")]))
        .await
}

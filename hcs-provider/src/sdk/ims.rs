//! Image Management Service

use serde::{Deserialize, Serialize};

use crate::client::ServiceClient;
use crate::error::HcsResult;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub async fn list(client: &ServiceClient, opts: &ListOpts) -> HcsResult<Vec<Image>> {
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        images: Vec<Image>,
    }
    let response: Response = client.get_query("v2/cloudimages", opts).await?;
    Ok(response.images)
}

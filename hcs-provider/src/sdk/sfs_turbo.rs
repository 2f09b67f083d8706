//! SFS Turbo file systems

use serde::{Deserialize, Serialize};

use super::null_default;
use crate::client::ServiceClient;
use crate::error::HcsResult;

pub const PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Share {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Capacity in GB, sent as a decimal string such as "500.00"
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub share_proto: String,
    #[serde(default)]
    pub share_type: String,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub security_group_id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub enterprise_project_id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub export_location: String,
    #[serde(default, deserialize_with = "null_default")]
    pub avail_capacity: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_default")]
    pub crypt_key_id: String,
}

impl Share {
    /// Capacity truncated to whole GB
    pub fn size_gb(&self) -> Option<i64> {
        self.size.trim().parse::<f64>().ok().map(|s| s as i64)
    }
}

/// List every share, paging by offset
pub async fn list_all(client: &ServiceClient) -> HcsResult<Vec<Share>> {
    #[derive(Serialize)]
    struct Query {
        limit: usize,
        offset: usize,
    }
    #[derive(Deserialize)]
    struct Page {
        #[serde(default)]
        shares: Vec<Share>,
        #[serde(default)]
        count: usize,
    }

    let path = format!("v1/{}/sfs-turbo/shares/detail", client.project_id());
    let mut all: Vec<Share> = Vec::new();
    loop {
        let query = Query {
            limit: PAGE_SIZE,
            offset: all.len(),
        };
        let page: Page = client.get_query(&path, &query).await?;
        let received = page.shares.len();
        all.extend(page.shares);
        if received < PAGE_SIZE || all.len() >= page.count {
            break;
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_from_decimal_string() {
        let share = Share {
            size: "500.00".to_string(),
            ..Default::default()
        };
        assert_eq!(share.size_gb(), Some(500));

        let broken = Share {
            size: "n/a".to_string(),
            ..Default::default()
        };
        assert_eq!(broken.size_gb(), None);
    }
}

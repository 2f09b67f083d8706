//! VPC service: subnets, security groups, ports and public IPs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_default;
use crate::client::ServiceClient;
use crate::error::HcsResult;

/// Page size of the v1 security group listing
pub const LEGACY_PAGE_SIZE: usize = 100;

// =============================================================================
// Subnets
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Subnet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub vpc_id: String,
}

pub async fn get_subnet(client: &ServiceClient, id: &str) -> HcsResult<Subnet> {
    #[derive(Deserialize)]
    struct Response {
        subnet: Subnet,
    }
    let path = format!("v1/{}/subnets/{}", client.project_id(), id);
    let response: Response = client.get(&path).await?;
    Ok(response.subnet)
}

// =============================================================================
// Security groups
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LegacySecurityGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_default")]
    pub enterprise_project_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_default")]
    pub enterprise_project_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LegacyListOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_project_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_project_id: Option<String>,
}

/// List every v1 security group, following markers until a short page
pub async fn list_legacy_security_groups(
    client: &ServiceClient,
    opts: &LegacyListOpts,
) -> HcsResult<Vec<LegacySecurityGroup>> {
    #[derive(Serialize)]
    struct Query<'a> {
        limit: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        marker: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        enterprise_project_id: Option<&'a str>,
    }
    #[derive(Deserialize)]
    struct Page {
        #[serde(default)]
        security_groups: Vec<LegacySecurityGroup>,
    }

    let path = format!("v1/{}/security-groups", client.project_id());
    let mut all = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let query = Query {
            limit: LEGACY_PAGE_SIZE,
            marker: marker.as_deref(),
            enterprise_project_id: opts.enterprise_project_id.as_deref(),
        };
        let page: Page = client.get_query(&path, &query).await?;
        let count = page.security_groups.len();
        marker = page.security_groups.last().map(|sg| sg.id.clone());
        all.extend(page.security_groups);
        if count < LEGACY_PAGE_SIZE || marker.is_none() {
            break;
        }
    }
    Ok(all)
}

/// List every v3 security group matching `opts`, following `next_marker`
pub async fn list_security_groups(
    client: &ServiceClient,
    opts: &ListOpts,
) -> HcsResult<Vec<SecurityGroup>> {
    #[derive(Serialize)]
    struct Query<'a> {
        #[serde(flatten)]
        opts: &'a ListOpts,
        #[serde(skip_serializing_if = "Option::is_none")]
        marker: Option<&'a str>,
    }
    #[derive(Deserialize)]
    struct Page {
        #[serde(default)]
        security_groups: Vec<SecurityGroup>,
        #[serde(default)]
        page_info: PageInfo,
    }
    #[derive(Default, Deserialize)]
    struct PageInfo {
        #[serde(default)]
        next_marker: Option<String>,
    }

    let path = format!("v3/{}/vpc/security-groups", client.project_id());
    let mut all = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let query = Query {
            opts,
            marker: marker.as_deref(),
        };
        let page: Page = client.get_query(&path, &query).await?;
        let empty = page.security_groups.is_empty();
        all.extend(page.security_groups);
        match page.page_info.next_marker.filter(|m| !m.is_empty()) {
            Some(next) if !empty && marker.as_deref() != Some(next.as_str()) => marker = Some(next),
            _ => break,
        }
    }
    Ok(all)
}

// =============================================================================
// Ports
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressPair {
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Port {
    pub id: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default, deserialize_with = "null_default")]
    pub allowed_address_pairs: Vec<AddressPair>,
}

pub async fn get_port(client: &ServiceClient, id: &str) -> HcsResult<Port> {
    #[derive(Deserialize)]
    struct Response {
        port: Port,
    }
    let path = format!("v2.0/ports/{}", id);
    let response: Response = client.get(&path).await?;
    Ok(response.port)
}

/// Replace the allowed address pairs of a port
pub async fn update_port_address_pairs(
    client: &ServiceClient,
    id: &str,
    pairs: &[AddressPair],
) -> HcsResult<Port> {
    #[derive(Deserialize)]
    struct Response {
        port: Port,
    }
    let path = format!("v2.0/ports/{}", id);
    let body = serde_json::json!({ "port": { "allowed_address_pairs": pairs } });
    let response: Response = client.put(&path, &body).await?;
    Ok(response.port)
}

// =============================================================================
// Public IPs
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicIp {
    pub id: String,
    #[serde(default)]
    pub public_ip_address: String,
}

/// Find the EIPs carrying `address` in every authorized enterprise project
pub async fn list_public_ips_by_address(
    client: &ServiceClient,
    address: &str,
) -> HcsResult<Vec<PublicIp>> {
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        publicips: Vec<PublicIp>,
    }
    let path = format!("v1/{}/publicips", client.project_id());
    let query = [
        ("public_ip_address", address),
        ("enterprise_project_id", "all_granted_eps"),
    ];
    let response: Response = client.get_query(&path, &query).await?;
    Ok(response.publicips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ServiceClient {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        ServiceClient::new(reqwest::Client::new(), base, "proj", "t")
    }

    fn legacy_groups(range: std::ops::Range<usize>) -> serde_json::Value {
        let groups: Vec<_> = range
            .map(|i| {
                serde_json::json!({"id": format!("sg-{:03}", i), "name": format!("group-{}", i)})
            })
            .collect();
        serde_json::json!({ "security_groups": groups })
    }

    #[tokio::test]
    async fn legacy_listing_follows_markers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/proj/security-groups"))
            .and(query_param_is_missing("marker"))
            .respond_with(ResponseTemplate::new(200).set_body_json(legacy_groups(0..100)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/proj/security-groups"))
            .and(query_param("marker", "sg-099"))
            .respond_with(ResponseTemplate::new(200).set_body_json(legacy_groups(100..103)))
            .expect(1)
            .mount(&server)
            .await;

        let groups = list_legacy_security_groups(&client(&server), &LegacyListOpts::default())
            .await
            .unwrap();
        assert_eq!(groups.len(), 103);
        assert_eq!(groups[102].id, "sg-102");
    }

    #[tokio::test]
    async fn v3_listing_follows_next_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/proj/vpc/security-groups"))
            .and(query_param("name", "web"))
            .and(query_param_is_missing("marker"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "security_groups": [{"id": "sg-1", "name": "web"}],
                "page_info": {"next_marker": "sg-1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/proj/vpc/security-groups"))
            .and(query_param("marker", "sg-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "security_groups": [],
                "page_info": {}
            })))
            .mount(&server)
            .await;

        let opts = ListOpts {
            name: Some("web".to_string()),
            ..Default::default()
        };
        let groups = list_security_groups(&client(&server), &opts).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "web");
    }
}

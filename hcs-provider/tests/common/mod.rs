#![allow(dead_code)]

use std::time::Duration;

use hcs_provider::{Config, HcsProvider};
use serde_json::{Value as Json, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PROJECT: &str = "proj";

/// Provider sending every service call to `server`, polling without delay
pub fn provider(server: &MockServer) -> HcsProvider {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = Config::new("cn-north-1", PROJECT, "token")
        .with_endpoint(&server.uri())
        .unwrap()
        .with_poll(Duration::ZERO, Duration::from_millis(10));
    HcsProvider::new(config).unwrap()
}

/// ECS answer for server `srv-1` with one NIC on `port-1`
pub fn server_body(status: &str) -> Json {
    json!({
        "server": {
            "id": "srv-1",
            "name": "web",
            "description": "",
            "status": status,
            "OS-EXT-AZ:availability_zone": "az1",
            "flavor": { "id": "s6.small.1", "name": "s6.small.1" },
            "image": { "id": "img-1" },
            "key_name": null,
            "addresses": {
                "vpc-1": [{
                    "addr": "192.168.0.10",
                    "version": 4,
                    "OS-EXT-IPS-MAC:mac_addr": "fa:16:3e:00:00:01",
                    "OS-EXT-IPS:type": "fixed",
                    "OS-EXT-IPS:port_id": "port-1"
                }]
            },
            "security_groups": [{ "id": "sg-1", "name": "default" }],
            "metadata": { "charging_mode": "0" },
            "created": "2024-05-01T10:00:00Z",
            "updated": "2024-05-01T10:05:00Z",
            "tags": ["env=prod"]
        }
    })
}

/// Mount the calls made by a read of `srv-1`
pub async fn mount_read(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/{}/cloudservers/srv-1", PROJECT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(server_body("ACTIVE")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/cloudimages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "images": [{ "id": "img-1", "name": "ubuntu-22.04" }] })),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.0/ports/port-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "port": {
                "id": "port-1",
                "network_id": "subnet-1",
                "mac_address": "fa:16:3e:00:00:01",
                "allowed_address_pairs": []
            }
        })))
        .mount(server)
        .await;
}

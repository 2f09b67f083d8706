//! Network interfaces of an instance
//!
//! The server answer only lists addresses grouped by VPC. Each fixed address
//! is grouped by its port, and the port is then looked up for the network ID
//! and the source/destination check flag.

use std::collections::HashMap;

use log::debug;

use hcs_core::resource::{Attributes, Value};

use crate::client::ServiceClient;
use crate::error::{HcsResult, ResultExt};
use crate::sdk::ecs::CloudServer;
use crate::sdk::vpc::{self, AddressPair};

/// Address pair that turns off the source/destination check of a port
pub const ANY_ADDRESS_PAIR: &str = "1.1.1.1/0";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceNic {
    pub network_id: String,
    pub port_id: String,
    pub mac: String,
    pub fixed_ipv4: String,
    pub fixed_ipv6: String,
    pub source_dest_check: bool,
}

impl InstanceNic {
    /// The `network` block entry describing this NIC
    pub fn to_block(&self) -> HashMap<String, Value> {
        HashMap::from([
            ("uuid".to_string(), Value::string(&self.network_id)),
            ("port".to_string(), Value::string(&self.port_id)),
            ("mac".to_string(), Value::string(&self.mac)),
            ("fixed_ip_v4".to_string(), Value::string(&self.fixed_ipv4)),
            ("fixed_ip_v6".to_string(), Value::string(&self.fixed_ipv6)),
            ("ipv6_enable".to_string(), Value::Bool(!self.fixed_ipv6.is_empty())),
            ("source_dest_check".to_string(), Value::Bool(self.source_dest_check)),
            ("access_network".to_string(), Value::Bool(false)),
        ])
    }
}

/// Fixed addresses of the server grouped by port, in the order listed
pub fn group_fixed_addresses(server: &CloudServer) -> Vec<InstanceNic> {
    let mut nics: Vec<InstanceNic> = Vec::new();
    for addr in server.addresses.values().flatten() {
        if addr.kind != "fixed" || addr.port_id.is_empty() {
            continue;
        }
        let index = match nics.iter().position(|n| n.port_id == addr.port_id) {
            Some(index) => index,
            None => {
                nics.push(InstanceNic {
                    port_id: addr.port_id.clone(),
                    mac: addr.mac_addr.clone(),
                    source_dest_check: true,
                    ..Default::default()
                });
                nics.len() - 1
            }
        };
        let nic = &mut nics[index];
        if addr.version == 6 {
            nic.fixed_ipv6 = addr.addr.clone();
        } else {
            nic.fixed_ipv4 = addr.addr.clone();
        }
    }
    nics
}

fn check_disabled(pairs: &[AddressPair]) -> bool {
    pairs.iter().any(|p| p.ip_address == ANY_ADDRESS_PAIR)
}

/// Every NIC of the server with its port details
pub async fn instance_nics(
    client: &ServiceClient,
    server: &CloudServer,
) -> HcsResult<Vec<InstanceNic>> {
    let mut nics = group_fixed_addresses(server);
    for nic in &mut nics {
        let port = vpc::get_port(client, &nic.port_id).await.with_context(|| {
            format!(
                "error fetching port ({}) of instance ({})",
                nic.port_id, server.id
            )
        })?;
        nic.network_id = port.network_id;
        if nic.mac.is_empty() {
            nic.mac = port.mac_address;
        }
        nic.source_dest_check = !check_disabled(&port.allowed_address_pairs);
    }
    debug!("Instance {} NICs: {:?}", server.id, nics);
    Ok(nics)
}

/// Match declared `network` blocks with the instance NICs
///
/// Declared blocks keep their order and their configuration-only fields.
/// With nothing declared every NIC is reported.
pub fn flatten_networks(declared: &[HashMap<String, Value>], nics: &[InstanceNic]) -> Vec<Value> {
    if declared.is_empty() {
        return nics.iter().map(|nic| Value::Map(nic.to_block())).collect();
    }

    let mut used = vec![false; nics.len()];
    declared
        .iter()
        .map(|block| {
            let uuid = block.get_string("uuid").unwrap_or_default();
            let fixed_ip = block.get_non_empty("fixed_ip_v4");
            let found = nics.iter().enumerate().position(|(i, nic)| {
                !used[i]
                    && nic.network_id == uuid
                    && fixed_ip.is_none_or(|ip| ip == nic.fixed_ipv4)
            });
            let mut entry = block.clone();
            entry
                .entry("access_network".to_string())
                .or_insert(Value::Bool(false));
            if let Some(i) = found {
                used[i] = true;
                let nic = &nics[i];
                entry.insert("port".to_string(), Value::string(&nic.port_id));
                entry.insert("mac".to_string(), Value::string(&nic.mac));
                entry.insert("fixed_ip_v4".to_string(), Value::string(&nic.fixed_ipv4));
                entry.insert("fixed_ip_v6".to_string(), Value::string(&nic.fixed_ipv6));
                entry.insert("source_dest_check".to_string(), Value::Bool(nic.source_dest_check));
                entry
                    .entry("ipv6_enable".to_string())
                    .or_insert(Value::Bool(!nic.fixed_ipv6.is_empty()));
            }
            Value::Map(entry)
        })
        .collect()
}

/// Best IPv4 and IPv6 addresses to reach the instance
///
/// A block flagged `access_network` wins, else the first NIC is used. The
/// server's own access addresses take precedence when set.
pub fn access_addresses(networks: &[Value], server: &CloudServer) -> (String, String) {
    let blocks: Vec<&HashMap<String, Value>> = networks.iter().filter_map(Value::as_map).collect();
    let chosen = blocks
        .iter()
        .find(|b| b.get_bool_or("access_network", false))
        .or_else(|| blocks.first());

    let (mut v4, mut v6) = chosen
        .map(|b| {
            (
                b.get_string("fixed_ip_v4").unwrap_or_default().to_string(),
                b.get_string("fixed_ip_v6").unwrap_or_default().to_string(),
            )
        })
        .unwrap_or_default();
    if !server.access_ipv4.is_empty() {
        v4 = server.access_ipv4.clone();
    }
    if !server.access_ipv6.is_empty() {
        v6 = server.access_ipv6.clone();
    }
    (v4, v6)
}

/// First floating address of the server
pub fn public_ip(server: &CloudServer) -> Option<String> {
    server
        .addresses
        .values()
        .flatten()
        .find(|a| a.kind == "floating")
        .map(|a| a.addr.clone())
}

pub async fn disable_source_dest_check(client: &ServiceClient, port_id: &str) -> HcsResult<()> {
    let pairs = [AddressPair {
        ip_address: ANY_ADDRESS_PAIR.to_string(),
        mac_address: String::new(),
    }];
    vpc::update_port_address_pairs(client, port_id, &pairs).await?;
    Ok(())
}

pub async fn enable_source_dest_check(client: &ServiceClient, port_id: &str) -> HcsResult<()> {
    vpc::update_port_address_pairs(client, port_id, &[]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::ecs::Address;
    use std::collections::BTreeMap;

    fn address(addr: &str, version: i64, kind: &str, port: &str) -> Address {
        Address {
            addr: addr.to_string(),
            version,
            mac_addr: format!("fa:16:3e:00:00:{}", &port[port.len() - 1..]),
            kind: kind.to_string(),
            port_id: port.to_string(),
        }
    }

    fn server() -> CloudServer {
        let mut addresses = BTreeMap::new();
        addresses.insert(
            "vpc-1".to_string(),
            vec![
                address("192.168.0.10", 4, "fixed", "port-1"),
                address("2001:db8::10", 6, "fixed", "port-1"),
                address("100.64.0.1", 4, "floating", "port-1"),
                address("192.168.1.20", 4, "fixed", "port-2"),
            ],
        );
        CloudServer {
            id: "srv-1".to_string(),
            addresses,
            ..Default::default()
        }
    }

    fn nic(network: &str, port: &str, ipv4: &str) -> InstanceNic {
        InstanceNic {
            network_id: network.to_string(),
            port_id: port.to_string(),
            mac: String::new(),
            fixed_ipv4: ipv4.to_string(),
            fixed_ipv6: String::new(),
            source_dest_check: true,
        }
    }

    #[test]
    fn fixed_addresses_grouped_by_port() {
        let nics = group_fixed_addresses(&server());
        assert_eq!(nics.len(), 2);
        assert_eq!(nics[0].port_id, "port-1");
        assert_eq!(nics[0].fixed_ipv4, "192.168.0.10");
        assert_eq!(nics[0].fixed_ipv6, "2001:db8::10");
        assert_eq!(nics[1].fixed_ipv4, "192.168.1.20");
        assert_eq!(public_ip(&server()).as_deref(), Some("100.64.0.1"));
    }

    #[test]
    fn declared_networks_keep_order() {
        let nics = vec![nic("net-a", "port-1", "10.0.0.5"), nic("net-b", "port-2", "10.0.1.5")];
        let declared = vec![
            HashMap::from([
                ("uuid".to_string(), Value::string("net-b")),
                ("source_dest_check".to_string(), Value::Bool(false)),
                ("access_network".to_string(), Value::Bool(true)),
            ]),
            HashMap::from([("uuid".to_string(), Value::string("net-a"))]),
        ];
        let flat = flatten_networks(&declared, &nics);
        let first = flat[0].as_map().unwrap();
        assert_eq!(first.get_string("port"), Some("port-2"));
        assert_eq!(first.get_bool("access_network"), Some(true));
        assert_eq!(first.get_bool("ipv6_enable"), Some(false));
        // Remote state wins over the declared value
        assert_eq!(first.get_bool("source_dest_check"), Some(true));
        assert_eq!(flat[1].as_map().unwrap().get_string("port"), Some("port-1"));

        let (v4, _) = access_addresses(&flat, &CloudServer::default());
        assert_eq!(v4, "10.0.1.5");
    }

    #[test]
    fn same_subnet_matched_by_fixed_ip() {
        let nics = vec![nic("net-a", "port-1", "10.0.0.5"), nic("net-a", "port-2", "10.0.0.6")];
        let declared = vec![HashMap::from([
            ("uuid".to_string(), Value::string("net-a")),
            ("fixed_ip_v4".to_string(), Value::string("10.0.0.6")),
        ])];
        let flat = flatten_networks(&declared, &nics);
        assert_eq!(flat[0].as_map().unwrap().get_string("port"), Some("port-2"));
    }

    #[test]
    fn nothing_declared_reports_every_nic() {
        let nics = vec![nic("net-a", "port-1", "10.0.0.5"), nic("net-b", "port-2", "10.0.1.5")];
        let flat = flatten_networks(&[], &nics);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[1].as_map().unwrap().get_string("uuid"), Some("net-b"));
    }

    #[test]
    fn any_address_pair_disables_check() {
        assert!(check_disabled(&[AddressPair {
            ip_address: ANY_ADDRESS_PAIR.to_string(),
            mac_address: String::new(),
        }]));
        assert!(!check_disabled(&[]));
    }
}

//! sfs_turbos data source

use std::collections::HashMap;

use log::debug;

use hcs_core::resource::{Attributes, Resource, State, Value};

use crate::config::Service;
use crate::error::{HcsResult, ResultExt};
use crate::provider::RegionContext;
use crate::sdk::sfs_turbo::{self, Share};
use crate::utils::hash_ids;

pub use crate::schemas::sfs_turbos::DATA_SOURCE_TYPE;

use super::enterprise_project_id;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub name: Option<String>,
    pub size: Option<i64>,
    pub share_type: Option<String>,
    pub enterprise_project_id: Option<String>,
}

impl Filters {
    pub fn matches(&self, share: &Share) -> bool {
        self.name.as_deref().is_none_or(|name| share.name == name)
            && self.size.is_none_or(|size| share.size_gb() == Some(size))
            && self
                .share_type
                .as_deref()
                .is_none_or(|share_type| share.share_type == share_type)
            && self
                .enterprise_project_id
                .as_deref()
                .is_none_or(|eps| share.enterprise_project_id == eps)
    }
}

fn turbo_block(share: &Share) -> Value {
    Value::Map(HashMap::from([
        ("id".to_string(), Value::string(&share.id)),
        ("name".to_string(), Value::string(&share.name)),
        ("size".to_string(), Value::Int(share.size_gb().unwrap_or_default())),
        ("share_proto".to_string(), Value::string(&share.share_proto)),
        ("share_type".to_string(), Value::string(&share.share_type)),
        ("availability_zone".to_string(), Value::string(&share.availability_zone)),
        ("vpc_id".to_string(), Value::string(&share.vpc_id)),
        ("subnet_id".to_string(), Value::string(&share.subnet_id)),
        ("security_group_id".to_string(), Value::string(&share.security_group_id)),
        (
            "enterprise_project_id".to_string(),
            Value::string(&share.enterprise_project_id),
        ),
        ("export_location".to_string(), Value::string(&share.export_location)),
        ("available_capacity".to_string(), Value::string(&share.avail_capacity)),
        ("status".to_string(), Value::string(&share.status)),
    ]))
}

pub async fn read(ctx: &RegionContext<'_>, resource: &Resource) -> HcsResult<State> {
    let attrs = &resource.attributes;
    let filters = Filters {
        name: attrs.get_non_empty("name").map(String::from),
        size: attrs.get_int("size"),
        share_type: attrs.get_non_empty("share_type").map(String::from),
        enterprise_project_id: enterprise_project_id(attrs, ctx.config()),
    };

    let client = ctx.client(Service::SfsTurbo)?;
    let shares = sfs_turbo::list_all(&client)
        .await
        .context("error getting SFS turbos")?;
    let matched: Vec<&Share> = shares.iter().filter(|s| filters.matches(s)).collect();
    debug!("SFS turbos matching {:?}: {}", filters, matched.len());

    let ids: Vec<&str> = matched.iter().map(|s| s.id.as_str()).collect();
    let id = hash_ids(&ids);
    let mut state_attrs = attrs.clone();
    state_attrs.insert("id".to_string(), Value::string(&id));
    state_attrs.insert("region".to_string(), Value::string(ctx.region()));
    state_attrs.insert(
        "turbos".to_string(),
        Value::List(matched.into_iter().map(turbo_block).collect()),
    );
    Ok(State::existing(resource.id.clone(), state_attrs).with_identifier(id))
}

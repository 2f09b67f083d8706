//! networking_secgroups data source
//!
//! Security groups are listed through the v3 API. Regions where v3 is not
//! published answer 404, in which case the v1 API is used instead.

use std::collections::HashMap;

use log::debug;

use hcs_core::resource::{Attributes, Resource, State, Value};

use crate::config::Service;
use crate::error::{HcsResult, ResultExt};
use crate::provider::RegionContext;
use crate::sdk::vpc::{self, LegacyListOpts, LegacySecurityGroup, ListOpts};
use crate::utils::{format_time, hash_ids};

pub use crate::schemas::networking_secgroups::DATA_SOURCE_TYPE;

use super::enterprise_project_id;

/// A security group from either API version
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityGroup {
    Legacy(LegacySecurityGroup),
    Current(vpc::SecurityGroup),
}

impl SecurityGroup {
    pub fn id(&self) -> &str {
        match self {
            SecurityGroup::Legacy(sg) => &sg.id,
            SecurityGroup::Current(sg) => &sg.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SecurityGroup::Legacy(sg) => &sg.name,
            SecurityGroup::Current(sg) => &sg.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            SecurityGroup::Legacy(sg) => &sg.description,
            SecurityGroup::Current(sg) => &sg.description,
        }
    }

    /// Entry of the `security_groups` block
    ///
    /// Timestamps are only known to the v3 API.
    pub fn to_block(&self) -> Value {
        let mut block = HashMap::from([
            ("id".to_string(), Value::string(self.id())),
            ("name".to_string(), Value::string(self.name())),
            ("description".to_string(), Value::string(self.description())),
        ]);
        match self {
            SecurityGroup::Legacy(sg) => {
                block.insert(
                    "enterprise_project_id".to_string(),
                    Value::string(&sg.enterprise_project_id),
                );
            }
            SecurityGroup::Current(sg) => {
                block.insert(
                    "enterprise_project_id".to_string(),
                    Value::string(&sg.enterprise_project_id),
                );
                block.insert(
                    "created_at".to_string(),
                    Value::string(format_time(sg.created_at.as_ref())),
                );
                block.insert(
                    "updated_at".to_string(),
                    Value::string(format_time(sg.updated_at.as_ref())),
                );
            }
        }
        Value::Map(block)
    }
}

/// Filters declared on the data source, all of which must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Keyword contained in the description
    pub description: Option<String>,
    pub enterprise_project_id: Option<String>,
}

impl Filters {
    pub fn matches(&self, group: &SecurityGroup) -> bool {
        self.id.as_deref().is_none_or(|id| group.id() == id)
            && self.name.as_deref().is_none_or(|name| group.name() == name)
            && self
                .description
                .as_deref()
                .is_none_or(|keyword| group.description().contains(keyword))
    }
}

pub async fn read(ctx: &RegionContext<'_>, resource: &Resource) -> HcsResult<State> {
    let attrs = &resource.attributes;
    let filters = Filters {
        id: attrs.get_non_empty("id").map(String::from),
        name: attrs.get_non_empty("name").map(String::from),
        description: attrs.get_non_empty("description").map(String::from),
        enterprise_project_id: enterprise_project_id(attrs, ctx.config()),
    };

    let groups = list_groups(ctx, &filters).await?;
    let matched: Vec<&SecurityGroup> = groups.iter().filter(|g| filters.matches(g)).collect();
    debug!("Security groups matching {:?}: {}", filters, matched.len());

    let ids: Vec<&str> = matched.iter().map(|g| g.id()).collect();
    let id = hash_ids(&ids);
    let mut state_attrs = attrs.clone();
    state_attrs.insert("id".to_string(), Value::string(&id));
    state_attrs.insert("region".to_string(), Value::string(ctx.region()));
    state_attrs.insert(
        "security_groups".to_string(),
        Value::List(matched.iter().map(|g| g.to_block()).collect()),
    );
    Ok(State::existing(resource.id.clone(), state_attrs).with_identifier(id))
}

async fn list_groups(ctx: &RegionContext<'_>, filters: &Filters) -> HcsResult<Vec<SecurityGroup>> {
    let client = ctx.client(Service::Vpc)?;
    let opts = ListOpts {
        id: filters.id.clone(),
        name: filters.name.clone(),
        enterprise_project_id: filters.enterprise_project_id.clone(),
    };
    match vpc::list_security_groups(&client, &opts).await {
        Ok(groups) => Ok(groups.into_iter().map(SecurityGroup::Current).collect()),
        Err(e) if e.is_not_found() => {
            debug!("Security group v3 API unavailable in {}, using v1", ctx.region());
            let opts = LegacyListOpts {
                enterprise_project_id: filters.enterprise_project_id.clone(),
            };
            let groups = vpc::list_legacy_security_groups(&client, &opts)
                .await
                .context("error getting security groups")?;
            debug!("Retrieved security groups: {:?}", groups);
            Ok(groups.into_iter().map(SecurityGroup::Legacy).collect())
        }
        Err(e) => Err(e.context("error getting security groups list")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy(id: &str, name: &str, description: &str) -> SecurityGroup {
        SecurityGroup::Legacy(LegacySecurityGroup {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            enterprise_project_id: "0".to_string(),
        })
    }

    #[test]
    fn filters_combine() {
        let groups = [
            legacy("sg-1", "web", "public web tier"),
            legacy("sg-2", "web", "internal"),
            legacy("sg-3", "db", "public database"),
        ];
        let filters = Filters {
            name: Some("web".to_string()),
            description: Some("public".to_string()),
            ..Default::default()
        };
        let ids: Vec<&str> = groups
            .iter()
            .filter(|g| filters.matches(g))
            .map(|g| g.id())
            .collect();
        assert_eq!(ids, vec!["sg-1"]);

        let everything = Filters::default();
        assert!(groups.iter().all(|g| everything.matches(g)));
    }

    #[test]
    fn legacy_block_has_no_timestamps() {
        let block = legacy("sg-1", "web", "").to_block();
        let block = block.as_map().unwrap();
        assert_eq!(block.get_string("enterprise_project_id"), Some("0"));
        assert!(block.get("created_at").is_none());

        let current = SecurityGroup::Current(vpc::SecurityGroup {
            id: "sg-2".to_string(),
            created_at: Some("2024-01-02T03:04:05Z".parse().unwrap()),
            ..Default::default()
        })
        .to_block();
        let current = current.as_map().unwrap();
        assert_eq!(current.get_string("created_at"), Some("2024-01-02T03:04:05Z"));
        assert_eq!(current.get_string("updated_at"), Some(""));
    }
}

//! Read-only data sources

pub mod secgroups;
pub mod sfs_turbos;

use std::collections::HashMap;

use hcs_core::resource::{Attributes, Value};

use crate::config::Config;

/// Enterprise project filter: the declared one, else the provider default
pub fn enterprise_project_id(attrs: &HashMap<String, Value>, config: &Config) -> Option<String> {
    attrs
        .get_non_empty("enterprise_project_id")
        .map(String::from)
        .or_else(|| config.enterprise_project_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_project_wins() {
        let config = Config::new("r", "p", "t").with_enterprise_project_id("eps-default");
        let mut attrs = HashMap::new();
        assert_eq!(enterprise_project_id(&attrs, &config).as_deref(), Some("eps-default"));

        attrs.insert("enterprise_project_id".to_string(), Value::string("eps-1"));
        assert_eq!(enterprise_project_id(&attrs, &config).as_deref(), Some("eps-1"));
    }
}

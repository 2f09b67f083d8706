//! Provider configuration
//!
//! Credentials and endpoints are resolved once into a [`Config`], either from
//! the environment or through the builder methods, and handed to the provider
//! explicitly.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::client::ServiceClient;
use crate::error::{HcsError, HcsResult};

pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";

/// Bound on a single HTTP exchange, independent of the wait timeouts
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote services the provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Elastic Cloud Server (native and nova-compatible APIs)
    Ecs,
    /// VPC, security groups, ports and public IPs
    Vpc,
    /// Elastic Volume Service
    Evs,
    /// Image Management Service
    Ims,
    /// Billing orders and subscriptions
    Bss,
    /// Key pair service
    Kps,
    SfsTurbo,
}

impl Service {
    /// Host prefix of the service endpoint
    pub fn name(&self) -> &'static str {
        match self {
            Service::Ecs => "ecs",
            Service::Vpc => "vpc",
            Service::Evs => "evs",
            Service::Ims => "ims",
            Service::Bss => "bss",
            Service::Kps => "kms",
            Service::SfsTurbo => "sfs-turbo",
        }
    }
}

/// Polling cadence used by every wait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    /// Wait before the first refresh
    pub delay: Duration,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub region: String,
    pub project_id: String,
    pub auth_token: String,
    /// Domain suffix of the service endpoints
    pub cloud: String,
    /// Default `op_svc_userid` for prePaid servers using a key pair
    pub user_id: Option<String>,
    pub enterprise_project_id: Option<String>,
    /// Base URL used for every service (private deployments, tests)
    pub endpoint: Option<Url>,
    /// Per-service base URLs, taking precedence over `endpoint`
    pub endpoints: HashMap<Service, Url>,
    /// Skip TLS certificate verification
    pub insecure: bool,
    pub request_timeout: Duration,
    pub poll: PollSettings,
}

impl Config {
    pub fn new(
        region: impl Into<String>,
        project_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            project_id: project_id.into(),
            auth_token: auth_token.into(),
            cloud: DEFAULT_CLOUD.to_string(),
            user_id: None,
            enterprise_project_id: None,
            endpoint: None,
            endpoints: HashMap::new(),
            insecure: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll: PollSettings::default(),
        }
    }

    /// Build the configuration from `HCS_*` environment variables
    pub fn from_env() -> HcsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HcsResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let mut config = Config::new(
            get("HCS_REGION").unwrap_or_default(),
            get("HCS_PROJECT_ID").unwrap_or_default(),
            get("HCS_AUTH_TOKEN").unwrap_or_default(),
        );
        if let Some(cloud) = get("HCS_CLOUD") {
            config = config.with_cloud(cloud);
        }
        config.user_id = get("HCS_USER_ID");
        config.enterprise_project_id = get("HCS_ENTERPRISE_PROJECT_ID");
        if let Some(endpoint) = get("HCS_ENDPOINT") {
            config = config.with_endpoint(&endpoint)?;
        }
        config.insecure = get("HCS_INSECURE")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Ok(config)
    }

    pub fn with_cloud(mut self, cloud: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_enterprise_project_id(mut self, id: impl Into<String>) -> Self {
        self.enterprise_project_id = Some(id.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> HcsResult<Self> {
        self.endpoint = Some(parse_base_url(endpoint)?);
        Ok(self)
    }

    pub fn with_service_endpoint(mut self, service: Service, endpoint: &str) -> HcsResult<Self> {
        self.endpoints.insert(service, parse_base_url(endpoint)?);
        Ok(self)
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll(mut self, delay: Duration, interval: Duration) -> Self {
        self.poll = PollSettings { delay, interval };
        self
    }

    /// Resolve the base URL of `service` in `region`
    pub fn service_url(&self, service: Service, region: &str) -> HcsResult<Url> {
        if let Some(url) = self.endpoints.get(&service).or(self.endpoint.as_ref()) {
            return Ok(url.clone());
        }
        parse_base_url(&format!(
            "https://{}.{}.{}/",
            service.name(),
            region,
            self.cloud
        ))
    }

    /// Region of a resource, falling back to the provider region
    pub fn region_or_default<'a>(&'a self, region: Option<&'a str>) -> &'a str {
        region.filter(|r| !r.is_empty()).unwrap_or(&self.region)
    }

    /// Build the client of one service
    pub fn service_client(
        &self,
        http: &reqwest::Client,
        service: Service,
        region: &str,
    ) -> HcsResult<ServiceClient> {
        if region.is_empty() {
            return Err(HcsError::ClientConfig(
                "region must be set (HCS_REGION)".to_string(),
            ));
        }
        if self.project_id.is_empty() {
            return Err(HcsError::ClientConfig(
                "project_id must be set (HCS_PROJECT_ID)".to_string(),
            ));
        }
        if self.auth_token.is_empty() {
            return Err(HcsError::ClientConfig(
                "auth_token must be set (HCS_AUTH_TOKEN)".to_string(),
            ));
        }
        Ok(ServiceClient::new(
            http.clone(),
            self.service_url(service, region)?,
            &self.project_id,
            &self.auth_token,
        ))
    }

    /// Shared HTTP client honoring `insecure`
    pub fn http_client(&self) -> HcsResult<reqwest::Client> {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| HcsError::ClientConfig(format!("failed to build HTTP client: {}", e)))
    }
}

/// Parse a base URL, ensuring a trailing slash so relative paths join below it
fn parse_base_url(raw: &str) -> HcsResult<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash)
        .map_err(|e| HcsError::ClientConfig(format!("invalid endpoint '{}': {}", raw, e)))
}

//! Error types for the HCS provider

use hcs_core::provider::ProviderError;
use hcs_core::schema::TypeError;
use hcs_core::wait::WaitError;

pub type HcsResult<T> = Result<T, HcsError>;

#[derive(Debug, thiserror::Error)]
pub enum HcsError {
    /// Missing region, project or token, or an unusable endpoint
    #[error("client configuration error: {0}")]
    ClientConfig(String),

    #[error("{method} {url} returned {status}: {body}")]
    Api {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("{0}")]
    Unexpected(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<HcsError>,
    },
}

impl HcsError {
    /// Wrap the error with the call that produced it
    pub fn context(self, context: impl Into<String>) -> Self {
        HcsError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// HTTP status of the underlying API failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            HcsError::Api { status, .. } => Some(*status),
            HcsError::Context { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Add call context to a failed result
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> HcsResult<T>;

    fn with_context<F, S>(self, f: F) -> HcsResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: Into<HcsError>> ResultExt<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> HcsResult<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F, S>(self, f: F) -> HcsResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

/// Configuration rejected before any remote call is made
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Schema(Vec<TypeError>),

    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("{name}: {message}")]
    InvalidAttribute { name: String, message: String },

    #[error("period_unit and period are required when charging_mode is set to prePaid")]
    PrePaidPeriodRequired,

    #[error(
        "user_id must be specified when charging_mode is set to prePaid and the ECS is logged in using an SSH key"
    )]
    UserIdRequired,

    #[error("spot_maximum_price is required when charging_mode is set to spot")]
    SpotPriceRequired,

    #[error("neither a boot device, image ID, or image name were able to be determined")]
    MissingImage,

    #[error("{0}")]
    BlockDevice(String),
}

fn join_errors(errors: &[TypeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<HcsError> for ProviderError {
    fn from(e: HcsError) -> Self {
        ProviderError::new(e.to_string()).with_cause(e)
    }
}

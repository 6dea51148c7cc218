use super::actuator::Actuator;
use super::channel::{ChannelError, DistributionChannel};
use super::config::ControllerConfig;
use super::observability::MonitoringSink;
use super::store::ResourceStore;
use crate::apis::{DecodeError, FieldErrors};
use crate::synthesis::SynthesisError;
use kube::Client;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid providerConfig: {0}")]
    Validation(FieldErrors),

    #[error("invalid referenced resource: {0}")]
    Reference(FieldErrors),

    #[error("malformed providerConfig: {0}")]
    Protocol(#[from] DecodeError),

    #[error("artifact synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("distribution channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Cluster {0} not found")]
    ClusterNotFound(String),

    #[error("reconcile cancelled")]
    Cancelled,

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether a later reconcile of the same generation can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Validation(_)
            | Error::Reference(_)
            | Error::Protocol(_)
            | Error::Synthesis(_)
            | Error::SerializationError(_)
            | Error::ConfigError(_)
            | Error::MissingObjectKey(_) => false,
            Error::Channel(_)
            | Error::ClusterNotFound(_)
            | Error::Cancelled
            | Error::KubeError(_) => true,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Channel(e) if e.is_timeout())
    }

    /// Offending field path of the tenant document, when the error has one.
    #[must_use]
    pub fn field_path(&self) -> Option<&str> {
        match self {
            Error::Validation(errors) | Error::Reference(errors) => errors.first_field(),
            _ => None,
        }
    }
}

// Context shared by every reconcile
pub struct Context {
    pub client: Client,
    pub config: Arc<ControllerConfig>,
    pub channel: Arc<dyn DistributionChannel>,
    pub store: Arc<dyn ResourceStore>,
    pub monitoring: Arc<dyn MonitoringSink>,
    /// Cancelled on shutdown; every in-flight reconcile derives a child token
    pub shutdown: CancellationToken,
}

impl Context {
    /// Actuator for one reconcile, cancelled together with the controller.
    #[must_use]
    pub fn actuator(&self) -> Actuator<'_> {
        Actuator {
            channel: self.channel.as_ref(),
            store: self.store.as_ref(),
            monitoring: self.monitoring.as_ref(),
            config: &self.config,
            token: self.shutdown.child_token(),
        }
    }
}

/// Runs `fut` unless `token` is cancelled first.
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

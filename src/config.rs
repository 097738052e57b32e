//! Operator configuration
//!
//! Command line flags (each also readable from the environment) are parsed by
//! [`ControllerArgs`] and turned into an [`OperatorConfig`], which is what the
//! controller context and the webhook server consume.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::{DEFAULT_FIELD_MANAGER, DEFAULT_REQUEUE_SECS, DEFAULT_WEBHOOK_PORT};

/// Flags for the `controller` subcommand
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Only watch RavenDBClusters in this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Seconds between level-triggered passes over a healthy cluster
    #[arg(long, env = "REQUEUE_SECS", default_value_t = DEFAULT_REQUEUE_SECS)]
    pub requeue_secs: u64,

    /// Field manager recorded on every write
    #[arg(long, default_value = DEFAULT_FIELD_MANAGER)]
    pub field_manager: String,

    /// Port the admission webhook listens on
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    pub webhook_port: u16,

    /// PEM certificate served by the admission webhook
    #[arg(long, env = "WEBHOOK_CERT_FILE")]
    pub webhook_cert: Option<PathBuf>,

    /// PEM private key for the webhook certificate
    #[arg(long, env = "WEBHOOK_KEY_FILE")]
    pub webhook_key: Option<PathBuf>,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_secs: DEFAULT_REQUEUE_SECS,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            webhook_port: DEFAULT_WEBHOOK_PORT,
            webhook_cert: None,
            webhook_key: None,
        }
    }
}

/// TLS listener settings for the admission webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Listen port
    pub port: u16,
    /// PEM certificate chain
    pub cert_path: PathBuf,
    /// PEM private key
    pub key_path: PathBuf,
}

/// Resolved operator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace to watch, `None` for cluster-wide
    pub namespace: Option<String>,
    /// Delay before the next pass after a successful one
    pub requeue_interval: Duration,
    /// Field manager for creates and patches
    pub field_manager: String,
    /// Webhook listener, `None` when no certificate was configured
    pub webhook: Option<WebhookConfig>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        ControllerArgs::default().into()
    }
}

impl From<ControllerArgs> for OperatorConfig {
    fn from(args: ControllerArgs) -> Self {
        let webhook = match (args.webhook_cert, args.webhook_key) {
            (Some(cert_path), Some(key_path)) => Some(WebhookConfig {
                port: args.webhook_port,
                cert_path,
                key_path,
            }),
            _ => None,
        };

        Self {
            namespace: args.namespace.filter(|ns| !ns.is_empty()),
            requeue_interval: Duration::from_secs(args.requeue_secs),
            field_manager: args.field_manager,
            webhook,
        }
    }
}

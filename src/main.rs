//! RavenDB Operator - reconciles RavenDBCluster resources on Kubernetes

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ravendb_operator::config::{ControllerArgs, OperatorConfig};
use ravendb_operator::controller::{error_policy, reconcile, Context};
use ravendb_operator::crd::RavenDBCluster;
use ravendb_operator::webhook::serve_webhook;

/// RavenDB operator - drives RavenDBCluster resources toward their declared state
#[derive(Parser, Debug)]
#[command(name = "ravendb-operator", version, about, long_about = None)]
struct Cli {
    /// Print the RavenDBCluster CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    ///
    /// Watches RavenDBCluster resources and reconciles them. When both a
    /// webhook certificate and key are configured, the validating admission
    /// webhook is served alongside.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install the aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ravendb_operator=info,kube=warn")),
        )
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&RavenDBCluster::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller.into()).await,
    }
}

/// Run the controller until a shutdown signal arrives
async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(
        Context::builder(client.clone())
            .config(&config)
            .shutdown(shutdown.clone())
            .build(),
    );

    let clusters: Api<RavenDBCluster> = match &config.namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    let webhook = match config.webhook.clone() {
        Some(webhook) => {
            let token = shutdown.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = serve_webhook(webhook, token).await {
                    error!(error = %e, "admission webhook stopped");
                }
            }))
        }
        None => {
            warn!("webhook certificate or key not configured, admission webhook disabled");
            None
        }
    };

    info!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        requeue_secs = config.requeue_interval.as_secs(),
        "starting RavenDBCluster controller"
    );

    let signals = tokio::spawn(cancel_on_signal(shutdown.clone()));

    // Passes still running when the token fires stop at their next API call.
    Controller::new(clusters, WatcherConfig::default().timeout(25))
        .graceful_shutdown_on(shutdown.clone().cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => info!(cluster = %obj.name, "reconciled"),
                Err(e) => warn!(error = %e, "reconcile loop error"),
            }
        })
        .await;

    info!("controller stopped, shutting down");
    shutdown.cancel();
    signals.abort();
    if let Some(handle) = webhook {
        if let Err(e) = handle.await {
            error!(error = %e, "admission webhook task failed");
        }
    }
    Ok(())
}

/// Cancel `shutdown` on SIGTERM or SIGINT
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler, listening for SIGINT only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for SIGINT");
                    return;
                }
                info!("received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("received Ctrl+C");
    }

    shutdown.cancel();
}

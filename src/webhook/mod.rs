//! Validating admission webhook for RavenDBCluster
//!
//! The API server posts an `AdmissionReview` for every create and update of a
//! RavenDBCluster. The new object is decoded and run through the
//! [`validator`] chain; any violation denies the request with all messages
//! joined one per line. Other operations are allowed untouched.

pub mod validator;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Json, Router,
};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WebhookConfig;
use crate::crd::RavenDBCluster;
use crate::Error;

pub use validator::{validate_cluster, Validator, VALIDATORS};

/// Path the ValidatingWebhookConfiguration points at
pub const VALIDATE_PATH: &str = "/validate/ravendbclusters";

/// Create the webhook router
///
/// - POST /validate/ravendbclusters - Validate RavenDBCluster create / update
/// - GET /healthz - Liveness probe
pub fn webhook_router() -> Router {
    Router::new()
        .route(VALIDATE_PATH, post(validate_handler))
        .route("/healthz", get(|| async { "ok" }))
}

/// Handle a validating admission review for RavenDBCluster
pub async fn validate_handler(
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(review(&req).into_review())
}

/// Decide a single admission request
pub fn review(req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let response = AdmissionResponse::from(req);

    if !matches!(req.operation, Operation::Create | Operation::Update) {
        debug!(uid = %req.uid, operation = ?req.operation, "operation not validated");
        return response;
    }

    let Some(object) = &req.object else {
        debug!(uid = %req.uid, "no object in request, allowing");
        return response;
    };

    let cluster: RavenDBCluster = match serde_json::to_value(object).and_then(serde_json::from_value)
    {
        Ok(cluster) => cluster,
        Err(e) => {
            warn!(uid = %req.uid, error = %e, "undecodable RavenDBCluster");
            return response.deny(format!("invalid RavenDBCluster: {e}"));
        }
    };

    let name = object.metadata.name.clone().unwrap_or_default();
    match validate_cluster(&name, &cluster.spec) {
        Ok(()) => {
            debug!(uid = %req.uid, cluster = %name, "cluster spec accepted");
            response
        }
        Err(Error::Validation { message, .. }) => {
            info!(uid = %req.uid, cluster = %name, "cluster spec denied");
            response.deny(message)
        }
        Err(other) => response.deny(other.to_string()),
    }
}

/// Serve the webhook over TLS until `shutdown` fires
pub async fn serve_webhook(config: WebhookConfig, shutdown: CancellationToken) -> Result<(), Error> {
    let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(|e| Error::internal_with_context("webhook-tls", e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    info!(%addr, "starting admission webhook");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(webhook_router().into_make_service())
        .await
        .map_err(|e| Error::internal_with_context("webhook", e.to_string()))
}

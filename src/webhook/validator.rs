//! Static checks run on RavenDBCluster create and update
//!
//! Every validator runs and every violation is collected, so a user sees all
//! problems with a spec in a single admission denial.

use std::collections::HashSet;

use crate::crd::{AccessMode, ClusterSetupSpec, RavenDBClusterSpec};
use crate::Error;

/// A named admission check over a cluster spec
pub trait Validator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Every rule `spec` violates, empty when valid
    fn validate(&self, spec: &RavenDBClusterSpec) -> Vec<String>;
}

/// Node list shape: at least one node, tags non-empty and unique
pub struct NodeTagsValidator;

/// Leader / watcher topology of the automatic cluster setup
pub struct BootstrapperValidator;

/// Certificate material required by the access mode
pub struct CertificatesValidator;

/// The validator chain, in reporting order
pub const VALIDATORS: &[&dyn Validator] = &[
    &NodeTagsValidator,
    &BootstrapperValidator,
    &CertificatesValidator,
];

/// Run every validator against `spec`
///
/// Returns a [`Error::Validation`] whose message joins all violations with a
/// newline.
pub fn validate_cluster(cluster: &str, spec: &RavenDBClusterSpec) -> Result<(), Error> {
    let violations: Vec<String> = VALIDATORS
        .iter()
        .flat_map(|v| v.validate(spec))
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::validation_for(cluster, violations.join("\n")))
    }
}

impl Validator for NodeTagsValidator {
    fn name(&self) -> &'static str {
        "node-tags"
    }

    fn validate(&self, spec: &RavenDBClusterSpec) -> Vec<String> {
        let mut errors = Vec::new();
        if spec.nodes.is_empty() {
            errors.push("spec.nodes must contain at least one node".to_string());
        }

        // Object names lower-case the tag, so uniqueness is case-insensitive.
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for (i, node) in spec.nodes.iter().enumerate() {
            if node.tag.is_empty() {
                errors.push(format!("spec.nodes[{i}].tag must not be empty"));
                continue;
            }
            if !is_dns_label_fragment(&node.tag) {
                errors.push(format!(
                    "node tag {:?} may only contain letters, digits and '-', and must end with a letter or digit",
                    node.tag
                ));
            }
            let key = node.tag.to_lowercase();
            if !seen.insert(key.clone()) && reported.insert(key) {
                errors.push(format!("duplicate node tag {:?}", node.tag));
            }
        }
        errors
    }
}

/// Whether `tag` can follow `ravendb-` in an object name
fn is_dns_label_fragment(tag: &str) -> bool {
    tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && tag.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
}

impl Validator for BootstrapperValidator {
    fn name(&self) -> &'static str {
        "bootstrapper"
    }

    fn validate(&self, spec: &RavenDBClusterSpec) -> Vec<String> {
        match &spec.automatic_cluster_setup {
            Some(setup) => validate_bootstrap(spec, setup),
            None => Vec::new(),
        }
    }
}

fn validate_bootstrap(spec: &RavenDBClusterSpec, setup: &ClusterSetupSpec) -> Vec<String> {
    let mut errors = Vec::new();

    match spec.access_mode() {
        Ok(AccessMode::LetsEncrypt) if spec.ca_cert_secret_ref.is_some() => {
            errors.push("caCertSecretRef must not be set when mode is LetsEncrypt".to_string());
        }
        Ok(AccessMode::None) if spec.ca_cert_secret_ref.is_none() => {
            errors.push(
                "caCertSecretRef must be provided when mode is None and automaticClusterSetup is set"
                    .to_string(),
            );
        }
        _ => {}
    }

    let tags: HashSet<&str> = spec.node_tags().into_iter().collect();
    let leader = setup.leader.as_str();

    if leader.is_empty() {
        errors.push("spec.automaticClusterSetup.leader must not be empty".to_string());
    } else if !tags.contains(leader) {
        errors.push(format!("leader tag {leader:?} not found in spec.nodes"));
    }

    let Some(watchers) = &setup.watchers else {
        return errors;
    };
    if watchers.is_empty() {
        errors.push(
            "spec.automaticClusterSetup.watchers must contain at least one tag when present"
                .to_string(),
        );
    }

    let mut seen = HashSet::new();
    for watcher in watchers {
        let watcher = watcher.as_str();
        if !tags.contains(watcher) {
            errors.push(format!("watcher tag {watcher:?} not found in spec.nodes"));
        }
        if watcher == leader {
            errors.push(format!("watcher tag {watcher:?} cannot also be the leader"));
        }
        if !seen.insert(watcher) {
            errors.push(format!("duplicate watcher tag {watcher:?}"));
        }
    }

    if watchers.len() + 1 > spec.nodes.len() {
        errors.push("leader + watchers count exceeds number of nodes in spec.nodes".to_string());
    }
    errors
}

impl Validator for CertificatesValidator {
    fn name(&self) -> &'static str {
        "certificates"
    }

    fn validate(&self, spec: &RavenDBClusterSpec) -> Vec<String> {
        let mode = match spec.access_mode() {
            Ok(mode) => mode,
            Err(_) => {
                return vec![format!(
                    "unsupported mode {:?}, expected \"None\" or \"LetsEncrypt\"",
                    spec.mode
                )]
            }
        };
        if mode != AccessMode::LetsEncrypt {
            return Vec::new();
        }

        let mut errors = Vec::new();
        if spec.email.as_deref().map_or(true, str::is_empty) {
            errors.push("email must be set when mode is LetsEncrypt".to_string());
        }
        for node in &spec.nodes {
            if node.cert_secret_ref.is_none() {
                errors.push(format!(
                    "node {:?} must set certSecretRef when mode is LetsEncrypt",
                    node.tag
                ));
            }
        }
        errors
    }
}

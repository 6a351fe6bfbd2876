// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{self, annotations, labels, requeue};
use anyhow::{bail, Context, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::GroupVersionKind;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Annotation on target resources holding the TTL in seconds
    pub ttl_annotation: String,
    /// Label marking TTLResources created by the discovery reconciler
    pub managed_by_label: String,
    pub managed_by_value: String,
    /// Prefix used to derive a TTLResource name from its target name
    pub record_prefix: String,
    /// Target kinds, in probe priority order
    pub target_kinds: Vec<GroupVersionKind>,
    pub conflict_requeue: Duration,
    /// First retry delay after a failed reconciliation, doubling up to `error_requeue_max`
    pub error_requeue: Duration,
    pub error_requeue_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ttl_annotation: annotations::TTL_SECONDS.to_string(),
            managed_by_label: labels::MANAGED_BY.to_string(),
            managed_by_value: labels::MANAGED_BY_VALUE.to_string(),
            record_prefix: constants::RECORD_NAME_PREFIX.to_string(),
            target_kinds: parse_target_kinds(constants::DEFAULT_TARGET_KINDS)
                .unwrap_or_default(),
            conflict_requeue: Duration::from_secs(requeue::CONFLICT_SECS),
            error_requeue: Duration::from_secs(requeue::ERROR_SECS),
            error_requeue_max: Duration::from_secs(requeue::ERROR_MAX_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let target_kinds = match env::var("TTL_TARGET_KINDS") {
            Ok(v) => parse_target_kinds(&v).context("Invalid TTL_TARGET_KINDS")?,
            Err(_) => defaults.target_kinds,
        };
        if target_kinds.is_empty() {
            bail!("TTL_TARGET_KINDS must name at least one kind");
        }

        Ok(Config {
            ttl_annotation: env::var("TTL_ANNOTATION_KEY").unwrap_or(defaults.ttl_annotation),
            managed_by_label: env::var("TTL_MANAGED_BY_LABEL")
                .unwrap_or(defaults.managed_by_label),
            managed_by_value: env::var("TTL_MANAGED_BY_VALUE")
                .unwrap_or(defaults.managed_by_value),
            record_prefix: env::var("TTL_RECORD_PREFIX").unwrap_or(defaults.record_prefix),
            target_kinds,
            conflict_requeue: secs_from_env("TTL_CONFLICT_REQUEUE_SECS")?
                .unwrap_or(defaults.conflict_requeue),
            error_requeue: secs_from_env("TTL_ERROR_REQUEUE_SECS")?
                .unwrap_or(defaults.error_requeue),
            error_requeue_max: secs_from_env("TTL_ERROR_REQUEUE_MAX_SECS")?
                .unwrap_or(defaults.error_requeue_max),
        })
    }

    /// Name of the managed TTLResource shadowing the target `target_name`
    pub fn record_name(&self, target_name: &str) -> String {
        format!("{}{}", self.record_prefix, target_name)
    }

    /// Whether the object carries the managed-by marker
    pub fn is_managed(&self, meta: &ObjectMeta) -> bool {
        meta.labels
            .as_ref()
            .and_then(|l| l.get(&self.managed_by_label))
            .is_some_and(|v| *v == self.managed_by_value)
    }

    /// Labels put on every TTLResource created by the operator
    pub fn managed_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.managed_by_label.clone(), self.managed_by_value.clone()),
            (
                labels::K8S_MANAGED_BY.to_string(),
                constants::OPERATOR_NAME.to_string(),
            ),
        ])
    }
}

fn secs_from_env(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(v) => {
            let secs: u64 = v
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", name))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

/// Split an `apiVersion` into its group and version, the core group being empty
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Parse a comma separated list of `apiVersion/Kind` entries, e.g. `v1/Pod,apps/v1/Deployment`
pub fn parse_target_kinds(value: &str) -> Result<Vec<GroupVersionKind>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let Some((api_version, kind)) = entry.rsplit_once('/') else {
                bail!("'{}' is not of the form apiVersion/Kind", entry);
            };
            let (group, version) = split_api_version(api_version);
            if version.is_empty() || kind.is_empty() || version.contains('/') {
                bail!("'{}' is not of the form apiVersion/Kind", entry);
            }
            Ok(GroupVersionKind::gvk(group, version, kind))
        })
        .collect()
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Declares how long a resource may live.
///
/// Created either by the discovery reconciler for an annotated target, or
/// directly by a user. A value of 0 means the record never expires.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "ttl.example.com",
    version = "v1alpha1",
    kind = "TTLResource",
    plural = "ttlresources",
    shortname = "ttlr"
)]
#[kube(namespaced)]
#[kube(status = "TtlResourceStatus")]
#[kube(printcolumn = r#"{"name":"TTL","type":"integer","jsonPath":".spec.ttlSeconds"}"#)]
#[kube(printcolumn = r#"{"name":"Expired","type":"boolean","jsonPath":".status.expired"}"#)]
#[kube(printcolumn = r#"{"name":"ExpiredAt","type":"date","jsonPath":".status.expiredAt"}"#)]
#[serde(rename_all = "camelCase")]
pub struct TtlResourceSpec {
    pub ttl_seconds: u64,
}

/// The generated resource type, under a Rust-style name
pub type TtlResource = TTLResource;

/// Observed state, written only by the operator
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TtlResourceStatus {
    #[serde(default)]
    pub expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<Time>,
}

/// Lifecycle phase of a TTLResource, in order of progression
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// `ttlSeconds == 0`, never expires
    Unset,
    /// `createdAt` not yet recorded
    Uninitialized,
    /// Expiry known (or about to be computed) and not yet reached
    Scheduled,
    Expired,
}

impl TtlResource {
    pub fn ttl_seconds(&self) -> u64 {
        self.spec.ttl_seconds
    }

    pub fn status_or_default(&self) -> TtlResourceStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn phase(&self) -> Phase {
        let status = self.status.as_ref();
        if self.spec.ttl_seconds == 0 {
            Phase::Unset
        } else if status.is_some_and(|s| s.expired) {
            Phase::Expired
        } else if status.and_then(|s| s.created_at.as_ref()).is_none() {
            Phase::Uninitialized
        } else {
            Phase::Scheduled
        }
    }

    /// The owner reference naming the resource this record shadows
    pub fn target(&self) -> Option<&OwnerReference> {
        self.metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.first())
    }

    /// `namespace/name`, for logging
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }
}

/// `created_at + ttl_seconds`, saturating at the latest representable instant
pub fn expiry_time(created_at: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

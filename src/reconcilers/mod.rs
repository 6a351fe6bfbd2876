// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to watch events.

pub mod backoff;
pub mod target;
pub mod ttl_resource;

pub use backoff::ErrorBackoff;
pub use target::TargetReconciler;
pub use ttl_resource::TtlResourceReconciler;

use crate::error::{Result, TtlError};
use crate::expiry::{Context, ObjectKey, Outcome};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{error, warn};

/// State handed to a single controller's reconcile and error policy
pub(crate) struct ControllerState {
    pub ctx: Arc<Context>,
    pub backoff: ErrorBackoff,
}

impl ControllerState {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        let backoff = ErrorBackoff::new(ctx.config.error_requeue, ctx.config.error_requeue_max);
        Arc::new(Self { ctx, backoff })
    }

    /// Turn a reconciliation result into the controller action, clearing the
    /// key's backoff once it reconciles cleanly
    pub fn finish(&self, key: &ObjectKey, outcome: Outcome) -> Action {
        self.backoff.reset(key);
        outcome.into()
    }
}

/// Build the notifier key for a namespaced object.
pub(crate) fn object_key<K: ResourceExt>(obj: &K) -> Result<ObjectKey> {
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| TtlError::MissingNamespace(name.clone()))?;
    Ok(ObjectKey::new(namespace, name))
}

/// Shared error policy: transient API failures are retried with per-key
/// exponential backoff, everything else waits for the next change.
pub(crate) fn requeue_on_error<K: ResourceExt>(
    obj: &K,
    error: &TtlError,
    state: &ControllerState,
) -> Action {
    if !error.is_retryable() {
        error!("Reconciliation error: {}", error);
        return Action::await_change();
    }

    let retry_after = match object_key(obj) {
        Ok(key) => state.backoff.next_delay(&key),
        Err(_) => state.backoff.base(),
    };
    warn!("Reconciliation error, retrying in {:?}: {}", retry_after, error);
    Action::requeue(retry_after)
}

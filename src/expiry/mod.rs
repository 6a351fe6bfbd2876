// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! TTL enforcement: the state machine, the tracking reconciler that drives a
//! TTLResource to expiry, and the discovery reconciler that derives
//! TTLResources from annotated targets.

pub mod discovery;
pub mod state;
pub mod tracking;

use crate::config::Config;
use crate::constants::requeue;
use crate::kubernetes::KindRegistry;
use crate::types::TtlResource;
use kube::{runtime::controller::Action, Api, Client};
use std::fmt;
use std::time::Duration;

/// Shared, read-only state handed to every reconciliation
pub struct Context {
    pub client: Client,
    pub config: Config,
    pub kinds: KindRegistry,
}

impl Context {
    pub fn new(client: Client, config: Config) -> Self {
        let kinds = KindRegistry::from_gvks(&config.target_kinds);
        Self { client, config, kinds }
    }

    pub fn records(&self, namespace: &str) -> Api<TtlResource> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// A namespaced object name, as delivered by the change notifier
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of a successful reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the object changes again
    Done,
    /// Reconcile this key again no earlier than the given delay
    RequeueAfter(Duration),
}

impl Outcome {
    /// Re-observe right away, used after a write whose result must be read back
    pub fn reobserve() -> Self {
        Outcome::RequeueAfter(Duration::ZERO)
    }
}

impl From<Outcome> for Action {
    /// Delays are capped at `MAX_DELAY_SECS`, the scheduler rejects far-off deadlines
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Action::await_change(),
            Outcome::RequeueAfter(delay) => {
                Action::requeue(delay.min(Duration::from_secs(requeue::MAX_DELAY_SECS)))
            }
        }
    }
}

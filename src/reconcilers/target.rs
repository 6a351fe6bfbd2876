// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Target reconciler - watches every configured target kind and keeps the
//! derived TTLResources in line with the TTL annotation.
//!
//! The controller only sees objects that still exist, so deletions are picked
//! up by a separate watcher per kind.

use super::{object_key, requeue_on_error, ControllerState};
use crate::error::{Result, TtlError};
use crate::expiry::{discovery, Context};
use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use kube::{
    api::{ApiResource, DynamicObject},
    runtime::{
        controller::Action,
        watcher::{self, Event},
        Controller, WatchStreamExt,
    },
    Api,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct TargetReconciler {
    ctx: Arc<Context>,
}

impl TargetReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut tasks: Vec<BoxFuture<'static, ()>> = Vec::new();
        for ar in self.ctx.kinds.kinds() {
            info!("Watching {}/{} for TTL annotations", ar.api_version, ar.kind);
            tasks.push(run_controller(self.ctx.clone(), ar.clone()).boxed());
            tasks.push(watch_deletions(self.ctx.clone(), ar.clone()).boxed());
        }

        future::join_all(tasks).await;
        Ok(())
    }
}

async fn run_controller(ctx: Arc<Context>, ar: ApiResource) {
    let targets: Api<DynamicObject> = Api::all_with(ctx.client.clone(), &ar);
    let kind = ar.kind.clone();

    Controller::new_with(targets, watcher::Config::default(), ar)
        .run(reconcile, error_policy, ControllerState::new(ctx))
        .for_each(|res| {
            let kind = kind.clone();
            async move {
                match res {
                    Ok(o) => debug!("Reconciled {}: {:?}", kind, o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            }
        })
        .await;
}

async fn watch_deletions(ctx: Arc<Context>, ar: ApiResource) {
    let targets: Api<DynamicObject> = Api::all_with(ctx.client.clone(), &ar);

    watcher::watcher(targets, watcher::Config::default())
        .default_backoff()
        .for_each(|event| {
            let ctx = ctx.clone();
            let kind = ar.kind.clone();
            async move {
                match event {
                    Ok(Event::Delete(obj)) => on_deleted(&ctx, &kind, &obj).await,
                    Ok(_) => {}
                    Err(e) => warn!("{} watch error: {}", kind, e),
                }
            }
        })
        .await;
}

/// Run discovery for a target that is gone, removing its managed record.
///
/// Failures are logged and not retried. A record left behind still expires
/// on its own schedule, and its owner reference lets Kubernetes garbage
/// collection remove it as well.
async fn on_deleted(ctx: &Context, kind: &str, obj: &DynamicObject) {
    let key = match object_key(obj) {
        Ok(key) => key,
        Err(e) => {
            debug!("Ignoring deleted {}: {}", kind, e);
            return;
        }
    };

    debug!("{} {} deleted", kind, key);
    if let Err(e) = discovery::reconcile(ctx, &key).await {
        error!("Failed to clean up after deleted {} {}: {}", kind, key, e);
    }
}

async fn reconcile(target: Arc<DynamicObject>, state: Arc<ControllerState>) -> Result<Action> {
    let key = object_key(&*target)?;
    let outcome = discovery::reconcile(&state.ctx, &key).await?;
    Ok(state.finish(&key, outcome))
}

fn error_policy(
    target: Arc<DynamicObject>,
    error: &TtlError,
    state: Arc<ControllerState>,
) -> Action {
    requeue_on_error(&*target, error, &state)
}

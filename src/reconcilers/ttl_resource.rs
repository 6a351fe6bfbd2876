// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! TTLResource reconciler - drives every TTLResource through its lifecycle.

use super::{object_key, requeue_on_error, ControllerState};
use crate::error::{Result, TtlError};
use crate::expiry::{tracking, Context};
use crate::types::TtlResource;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Api,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct TtlResourceReconciler {
    ctx: Arc<Context>,
}

impl TtlResourceReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let records: Api<TtlResource> = Api::all(self.ctx.client.clone());
        info!("Watching TTLResources");

        Controller::new(records, watcher::Config::default())
            .run(reconcile, error_policy, ControllerState::new(self.ctx))
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled TTLResource: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(record: Arc<TtlResource>, state: Arc<ControllerState>) -> Result<Action> {
    let key = object_key(&*record)?;
    let outcome = tracking::reconcile(&state.ctx, &key).await?;
    Ok(state.finish(&key, outcome))
}

fn error_policy(record: Arc<TtlResource>, error: &TtlError, state: Arc<ControllerState>) -> Action {
    requeue_on_error(&*record, error, &state)
}

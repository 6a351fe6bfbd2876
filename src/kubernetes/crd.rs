// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup gate on the TTLResource CustomResourceDefinition.

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::types::TtlResource;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    runtime::wait::{await_condition, conditions},
    Api, Client, Resource,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Name of the TTLResource CRD object, `<plural>.<group>`
pub fn ttl_crd_name() -> String {
    format!("{}.{}", TtlResource::plural(&()), TtlResource::group(&()))
}

/// Block until the TTLResource CRD reports `Established`.
///
/// The CRD is watched continuously; the wait is only cut into rounds, growing
/// from POLL_INTERVAL_SECS to POLL_MAX_INTERVAL_SECS, to report progress.
pub async fn wait_for_ttl_crd(client: &Client) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let name = ttl_crd_name();
    let mut round = POLL_INTERVAL_SECS;

    loop {
        let established = await_condition(crds.clone(), &name, conditions::is_crd_established());
        match timeout(Duration::from_secs(round), established).await {
            Ok(Ok(_)) => {
                info!("CRD {} is established", name);
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!("Watching CRD {} failed: {}, retrying in {}s", name, e, round);
                sleep(Duration::from_secs(round)).await;
            }
            Err(_) => info!("CRD {} not established after {}s, still waiting", name, round),
        }
        round = (round * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

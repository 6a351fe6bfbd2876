// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ttl_operator::config::Config;
use ttl_operator::constants::OPERATOR_NAME;
use ttl_operator::expiry::Context;
use ttl_operator::kubernetes::wait_for_ttl_crd;
use ttl_operator::reconcilers::{TargetReconciler, TtlResourceReconciler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting {}", OPERATOR_NAME);

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: annotation={}, target_kinds={:?}",
        config.ttl_annotation, config.target_kinds
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for the TTLResource CRD before starting reconcilers
    info!("Waiting for TTLResource CRD to become available...");
    wait_for_ttl_crd(&client).await?;

    let ctx = Arc::new(Context::new(client, config));

    let record_reconciler = TtlResourceReconciler::new(ctx.clone());
    let target_reconciler = TargetReconciler::new(ctx);

    info!("Starting reconcilers...");

    tokio::try_join!(record_reconciler.run(), target_reconciler.run())?;

    // This should never be reached as reconcilers run forever
    warn!("All reconcilers stopped unexpectedly");
    Ok(())
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Discovery reconciler - keeps one managed TTLResource per annotated target.
//!
//! Keys arrive without a kind. A key naming a TTLResource is handed to the
//! tracking reconciler; otherwise the supported target kinds are probed in
//! order and the TTLResource `<prefix><target>` is created, updated or
//! removed to mirror the target's TTL annotation.

use super::tracking::{self, write_status, Write};
use super::{Context, ObjectKey, Outcome};
use crate::error::{is_already_exists, is_conflict, is_not_found, Result, TtlError};
use crate::types::{TtlResource, TtlResourceSpec, TtlResourceStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{
    api::{ApiResource, DeleteParams, DynamicObject, PostParams, Preconditions},
    Api, ResourceExt,
};
use tracing::{debug, info, instrument, warn};

#[instrument(skip(ctx), fields(key = %key))]
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<Outcome> {
    let records = ctx.records(&key.namespace);
    if let Some(record) = records.get_opt(&key.name).await? {
        return tracking::reconcile_record(ctx, &records, record).await;
    }

    let Some((kind, target)) = ctx
        .kinds
        .probe(&ctx.client, &key.namespace, &key.name)
        .await?
    else {
        debug!("No target named {} exists", key);
        return cleanup(ctx, key).await;
    };

    if target.metadata.deletion_timestamp.is_some() {
        debug!("{} {} is being deleted", kind.kind, key);
        return cleanup(ctx, key).await;
    }

    let ttl_seconds = match ttl_from_annotations(&target.metadata, &ctx.config.ttl_annotation) {
        Ok(Some(ttl)) => ttl,
        Ok(None) => return cleanup(ctx, key).await,
        Err(e) => {
            warn!("Ignoring TTL of {} {}: {}", kind.kind, key, e);
            return cleanup(ctx, key).await;
        }
    };

    let record_name = ctx.config.record_name(&key.name);
    match records.get_opt(&record_name).await? {
        Some(existing) if is_stale(ctx, &existing, &target) => {
            replace_stale_record(ctx, &records, existing, kind, &target, ttl_seconds).await
        }
        Some(existing) => sync_spec(ctx, &records, existing, ttl_seconds).await,
        None => {
            create_record(ctx, &records, kind, &target, &record_name, ttl_seconds).await
        }
    }
}

/// A managed record pointing at an earlier incarnation of the target
fn is_stale(ctx: &Context, record: &TtlResource, target: &DynamicObject) -> bool {
    if !ctx.config.is_managed(&record.metadata) {
        return false;
    }
    match (record.target(), target.uid()) {
        (Some(owner), Some(uid)) => owner.uid != uid,
        _ => false,
    }
}

/// Drop a record left over from a deleted target and start over for the current one
async fn replace_stale_record(
    ctx: &Context,
    records: &Api<TtlResource>,
    stale: TtlResource,
    kind: &ApiResource,
    target: &DynamicObject,
    ttl_seconds: u64,
) -> Result<Outcome> {
    let record_name = stale.name_any();
    info!(
        "TTLResource {} belongs to a previous {} {}, replacing it",
        stale.key(),
        kind.kind,
        target.name_any()
    );

    let dp = DeleteParams {
        preconditions: stale.uid().map(|uid| Preconditions {
            uid: Some(uid),
            resource_version: None,
        }),
        ..DeleteParams::default()
    };
    match records.delete(&record_name, &dp).await {
        Ok(_) => {}
        Err(e) if is_not_found(&e) => {}
        Err(e) if is_conflict(&e) => {
            debug!("TTLResource {} was replaced concurrently", stale.key());
            return Ok(Outcome::Done);
        }
        Err(e) => return Err(e.into()),
    }

    create_record(ctx, records, kind, target, &record_name, ttl_seconds).await
}

/// Read the TTL annotation.
///
/// `Ok(None)` when absent. Non-integer and non-positive values are errors the
/// caller treats the same as absence.
pub fn ttl_from_annotations(meta: &ObjectMeta, annotation: &str) -> Result<Option<u64>> {
    let Some(value) = meta.annotations.as_ref().and_then(|a| a.get(annotation)) else {
        return Ok(None);
    };

    match value.parse::<i64>() {
        Ok(ttl) if ttl > 0 => Ok(Some(ttl.unsigned_abs())),
        Ok(_) => Err(TtlError::InvalidAnnotation(format!(
            "{}={:?} must be greater than zero",
            annotation, value
        ))),
        Err(_) => Err(TtlError::InvalidAnnotation(format!(
            "{}={:?} is not an integer",
            annotation, value
        ))),
    }
}

/// Bring an existing record's ttlSeconds in line with the annotation
async fn sync_spec(
    ctx: &Context,
    records: &Api<TtlResource>,
    existing: TtlResource,
    ttl_seconds: u64,
) -> Result<Outcome> {
    if !ctx.config.is_managed(&existing.metadata) {
        debug!(
            "TTLResource {} is not managed by the operator, leaving its spec alone",
            existing.key()
        );
        return Ok(Outcome::Done);
    }
    if existing.ttl_seconds() == ttl_seconds {
        return Ok(Outcome::Done);
    }
    if existing.status.as_ref().is_some_and(|s| s.expired) {
        debug!(
            "TTLResource {} already expired, ignoring new ttlSeconds {}",
            existing.key(),
            ttl_seconds
        );
        return Ok(Outcome::Done);
    }

    let mut desired = existing.clone();
    desired.spec.ttl_seconds = ttl_seconds;

    // Conflicts are left to the record's own reconciliation
    let replaced = match records
        .replace(&existing.name_any(), &PostParams::default(), &desired)
        .await
    {
        Ok(replaced) => replaced,
        Err(e) if is_conflict(&e) || is_not_found(&e) => {
            debug!(
                "TTLResource {} changed concurrently, skipping spec update",
                existing.key()
            );
            return Ok(Outcome::Done);
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Updated TTLResource {} ttlSeconds {} -> {}",
        existing.key(),
        existing.ttl_seconds(),
        ttl_seconds
    );

    match write_status(records, &replaced, &TtlResourceStatus::default()).await? {
        Write::Written(_) => debug!("Reset status of {}", existing.key()),
        Write::Conflict | Write::Gone => debug!(
            "Could not reset status of {}, its reconciliation will",
            existing.key()
        ),
    }
    Ok(Outcome::Done)
}

async fn create_record(
    ctx: &Context,
    records: &Api<TtlResource>,
    kind: &ApiResource,
    target: &DynamicObject,
    record_name: &str,
    ttl_seconds: u64,
) -> Result<Outcome> {
    let record = TtlResource {
        metadata: ObjectMeta {
            name: Some(record_name.to_string()),
            namespace: target.namespace(),
            labels: Some(ctx.config.managed_labels()),
            owner_references: Some(vec![OwnerReference {
                api_version: kind.api_version.clone(),
                kind: kind.kind.clone(),
                name: target.name_any(),
                uid: target.uid().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: None,
            }]),
            ..Default::default()
        },
        spec: TtlResourceSpec { ttl_seconds },
        status: None,
    };

    match records.create(&PostParams::default(), &record).await {
        Ok(created) => info!(
            "Created TTLResource {} for {} {} with ttlSeconds {}",
            created.key(),
            kind.kind,
            target.name_any(),
            ttl_seconds
        ),
        Err(e) if is_already_exists(&e) => {
            debug!("TTLResource {} was created concurrently", record.key())
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Outcome::Done)
}

/// Remove the managed TTLResource derived from `key`, if any.
///
/// Records without the managed-by marker belong to users and are kept.
#[instrument(skip(ctx), fields(key = %key))]
pub async fn cleanup(ctx: &Context, key: &ObjectKey) -> Result<Outcome> {
    let records = ctx.records(&key.namespace);
    let record_name = ctx.config.record_name(&key.name);

    let Some(record) = records.get_opt(&record_name).await? else {
        return Ok(Outcome::Done);
    };
    if !ctx.config.is_managed(&record.metadata) {
        debug!("TTLResource {} is user-created, keeping it", record.key());
        return Ok(Outcome::Done);
    }

    let dp = DeleteParams {
        preconditions: record.uid().map(|uid| Preconditions {
            uid: Some(uid),
            resource_version: None,
        }),
        ..DeleteParams::default()
    };
    match records.delete(&record_name, &dp).await {
        Ok(_) => info!("Deleted TTLResource {}", record.key()),
        Err(e) if is_not_found(&e) || is_conflict(&e) => {
            debug!("TTLResource {} already gone or replaced", record.key())
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Outcome::Done)
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tracking reconciler - drives a TTLResource to expiry and cascades the deletion.

use super::state::{self, Transition};
use super::{Context, ObjectKey, Outcome};
use crate::error::{is_conflict, is_not_found, Result, TtlError};
use crate::kubernetes::kinds::is_gone;
use crate::types::{TtlResource, TtlResourceStatus};
use chrono::Utc;
use kube::{
    api::{DeleteParams, Patch, PatchParams, Preconditions},
    Api, ResourceExt,
};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

/// Result of a conditional status write
#[derive(Debug)]
pub(crate) enum Write {
    Written(TtlResource),
    /// Someone else wrote first; our read is stale
    Conflict,
    /// Deleted underneath us
    Gone,
}

/// Reconcile the TTLResource stored under `key`
#[instrument(skip(ctx), fields(record = %key))]
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<Outcome> {
    let api = ctx.records(&key.namespace);
    let Some(record) = api.get_opt(&key.name).await? else {
        debug!("TTLResource no longer exists");
        return Ok(Outcome::Done);
    };
    reconcile_record(ctx, &api, record).await
}

/// Reconcile a freshly read TTLResource
pub(crate) async fn reconcile_record(
    ctx: &Context,
    api: &Api<TtlResource>,
    mut record: TtlResource,
) -> Result<Outcome> {
    if state::spec_changed(&record) {
        info!(
            "ttlSeconds of {} changed to {}, recomputing expiry",
            record.key(),
            record.ttl_seconds()
        );
        return Ok(match write_status(api, &record, &TtlResourceStatus::default()).await? {
            Write::Written(_) => Outcome::reobserve(),
            Write::Conflict => requeue_on_conflict(ctx, &record),
            Write::Gone => Outcome::Done,
        });
    }

    loop {
        match state::evaluate(&record, Utc::now()) {
            Transition::Never => return Ok(Outcome::Done),
            Transition::Wait(delay) => {
                debug!("{} expires in {:?}", record.key(), delay);
                return Ok(Outcome::RequeueAfter(delay));
            }
            Transition::Initialize(status) => {
                return Ok(match write_status(api, &record, &status).await? {
                    Write::Written(_) => {
                        info!("Recorded creation time of {}", record.key());
                        Outcome::reobserve()
                    }
                    Write::Conflict => requeue_on_conflict(ctx, &record),
                    Write::Gone => Outcome::Done,
                });
            }
            Transition::Schedule(status) => match write_status(api, &record, &status).await? {
                Write::Written(updated) => {
                    info!(
                        "Scheduled expiry of {} at {:?}",
                        record.key(),
                        status.expired_at.as_ref().map(|t| t.0)
                    );
                    record = updated;
                }
                Write::Conflict => return Ok(requeue_on_conflict(ctx, &record)),
                Write::Gone => return Ok(Outcome::Done),
            },
            Transition::Expire(status) => {
                return match write_status(api, &record, &status).await? {
                    Write::Written(updated) => {
                        info!("TTL of {} expired, starting deletion", record.key());
                        cascade(ctx, api, &updated).await
                    }
                    Write::Conflict => Ok(requeue_on_conflict(ctx, &record)),
                    Write::Gone => Ok(Outcome::Done),
                };
            }
            Transition::Cascade => return cascade(ctx, api, &record).await,
        }
    }
}

fn requeue_on_conflict(ctx: &Context, record: &TtlResource) -> Outcome {
    debug!("Conflict updating status of {}, will retry", record.key());
    Outcome::RequeueAfter(ctx.config.conflict_requeue)
}

/// Write `status` conditionally on the resourceVersion `record` was read at
pub(crate) async fn write_status(
    api: &Api<TtlResource>,
    record: &TtlResource,
    status: &TtlResourceStatus,
) -> Result<Write> {
    let patch = json!({
        "metadata": { "resourceVersion": record.resource_version() },
        "status": {
            "expired": status.expired,
            "createdAt": status.created_at,
            "expiredAt": status.expired_at,
        }
    });

    match api
        .patch_status(&record.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(updated) => Ok(Write::Written(updated)),
        Err(e) if is_conflict(&e) => Ok(Write::Conflict),
        Err(e) if is_not_found(&e) => Ok(Write::Gone),
        Err(e) => Err(e.into()),
    }
}

/// Delete the target named by the record's owner reference, then the record itself
async fn cascade(ctx: &Context, api: &Api<TtlResource>, expired: &TtlResource) -> Result<Outcome> {
    let name = expired.name_any();
    let namespace = expired.namespace().unwrap_or_default();

    let Some(latest) = api.get_opt(&name).await? else {
        return Ok(Outcome::Done);
    };
    if latest.uid() != expired.uid() {
        debug!(
            "TTLResource {} was recreated (uid {:?} -> {:?}), leaving it to its own reconciliation",
            expired.key(),
            expired.uid(),
            latest.uid()
        );
        return Ok(Outcome::Done);
    }

    // Best effort: a failing target delete must not keep the record around
    if let Some(owner) = latest.target() {
        match ctx.kinds.delete_owner(&ctx.client, &namespace, owner).await {
            Ok(()) => info!("Deleted expired {} {}/{}", owner.kind, namespace, owner.name),
            Err(e) if is_gone(&e) => {
                debug!("{} {}/{} already deleted", owner.kind, namespace, owner.name)
            }
            Err(TtlError::KubeError(ref e)) if is_conflict(e) => warn!(
                "{} {}/{} was recreated since {} was created, not deleting it",
                owner.kind,
                namespace,
                owner.name,
                latest.key()
            ),
            Err(e) => error!(
                "Failed to delete {} {}/{}: {}",
                owner.kind, namespace, owner.name, e
            ),
        }
    }

    let dp = DeleteParams {
        preconditions: latest.uid().map(|uid| Preconditions {
            uid: Some(uid),
            resource_version: None,
        }),
        ..DeleteParams::default()
    };
    match api.delete(&name, &dp).await {
        Ok(_) => info!("TTLResource {} expired and deleted", latest.key()),
        Err(e) if is_not_found(&e) => debug!("TTLResource {} already deleted", latest.key()),
        Err(e) if is_conflict(&e) => {
            debug!("TTLResource {} was recreated, not deleting it", latest.key())
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Outcome::Done)
}

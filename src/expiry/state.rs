// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! TTL state machine.
//!
//! Pure: given a record and the current time it decides the single next
//! transition and the status to persist for it. Persisting, timers and the
//! cascade are left to the tracking reconciler.

use crate::types::{expiry_time, Phase, TtlResource, TtlResourceStatus};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// `ttlSeconds == 0`: nothing to do, ever
    Never,
    /// Record `createdAt`; persist then re-observe before going further
    Initialize(TtlResourceStatus),
    /// Record `expiredAt`; persist then continue with the written record
    Schedule(TtlResourceStatus),
    /// Not yet due, check again after the given delay
    Wait(Duration),
    /// Due: persist `expired = true`, then cascade
    Expire(TtlResourceStatus),
    /// Already marked expired: cascade without further status writes
    Cascade,
}

/// Decide the next transition for `record` at time `now`
pub fn evaluate(record: &TtlResource, now: DateTime<Utc>) -> Transition {
    let mut status = record.status_or_default();

    match record.phase() {
        Phase::Unset => Transition::Never,
        Phase::Expired => Transition::Cascade,
        Phase::Uninitialized => {
            let created = record
                .metadata
                .creation_timestamp
                .clone()
                .unwrap_or(Time(now));
            status.created_at = Some(created);
            Transition::Initialize(status)
        }
        Phase::Scheduled => {
            let Some(created_at) = status.created_at.as_ref().map(|t| t.0) else {
                return Transition::Initialize(status);
            };
            let Some(expired_at) = status.expired_at.as_ref().map(|t| t.0) else {
                status.expired_at = Some(Time(expiry_time(created_at, record.ttl_seconds())));
                return Transition::Schedule(status);
            };

            if now >= expired_at {
                status.expired = true;
                Transition::Expire(status)
            } else {
                Transition::Wait((expired_at - now).to_std().unwrap_or_default())
            }
        }
    }
}

/// Whether the stored expiry no longer matches `createdAt + ttlSeconds`.
///
/// That happens when `ttlSeconds` was edited after scheduling. Expired records
/// are never reported: `expired` only ever moves from false to true.
pub fn spec_changed(record: &TtlResource) -> bool {
    let Some(status) = record.status.as_ref() else {
        return false;
    };
    if status.expired || record.ttl_seconds() == 0 {
        return false;
    }
    match (&status.created_at, &status.expired_at) {
        (Some(created), Some(expired)) => {
            expired.0 != expiry_time(created.0, record.ttl_seconds())
        }
        _ => false,
    }
}

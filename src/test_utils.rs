// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory Kubernetes API server.
//!
//! Objects are stored as JSON under their REST path. The server assigns
//! UIDs, resource versions and creation timestamps, rejects stale writes with
//! 409 Conflict, honours UID preconditions on delete and treats `/status` as
//! a subresource, which is everything the reconcilers rely on.

use crate::constants::annotations;
use crate::types::TtlResource;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use http::{Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Value>,
    /// (method, path) -> (status code, reason, remaining count)
    failures: HashMap<(String, String), (u16, String, usize)>,
    requests: Vec<(String, String)>,
    revision: u64,
    uids: u64,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a kube Client talking to this server
    pub fn client(&self) -> Client {
        Client::new(self.clone(), "default")
    }

    /// Store an object as-is, only bumping its resourceVersion
    pub fn insert(&self, path: &str, mut obj: Value) {
        let mut state = self.state.lock().unwrap();
        let rv = state.next_revision();
        obj["metadata"]["resourceVersion"] = json!(rv);
        state.objects.insert(path.to_string(), obj);
    }

    pub fn insert_record(&self, record: &TtlResource) {
        let path = record_path(&record.namespace().unwrap_or_default(), &record.name_any());
        self.insert(&path, serde_json::to_value(record).unwrap());
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().objects.get(path).cloned()
    }

    pub fn get_record(&self, namespace: &str, name: &str) -> Option<TtlResource> {
        self.get(&record_path(namespace, name))
            .map(|v| serde_json::from_value(v).unwrap())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(path)
    }

    /// Move an object's creationTimestamp `secs` seconds into the past
    pub fn backdate(&self, path: &str, secs: i64) {
        let mut state = self.state.lock().unwrap();
        if let Some(obj) = state.objects.get_mut(path) {
            obj["metadata"]["creationTimestamp"] =
                json!(timestamp(Utc::now() - TimeDelta::seconds(secs)));
        }
    }

    /// Mutate a stored object in place, as another writer would, bumping its resourceVersion
    pub fn modify(&self, path: &str, f: impl FnOnce(&mut Value)) {
        let mut state = self.state.lock().unwrap();
        let rv = state.next_revision();
        if let Some(obj) = state.objects.get_mut(path) {
            f(obj);
            obj["metadata"]["resourceVersion"] = json!(rv);
        }
    }

    /// Answer the next `times` requests for (method, path) with an error status
    pub fn fail(&self, method: &str, path: &str, code: u16, times: usize) {
        let reason = match code {
            404 => "NotFound",
            409 => "Conflict",
            _ => "InternalError",
        };
        self.fail_with_reason(method, path, code, reason, times);
    }

    pub fn fail_with_reason(&self, method: &str, path: &str, code: u16, reason: &str, times: usize) {
        self.state.lock().unwrap().failures.insert(
            (method.to_string(), path.to_string()),
            (code, reason.to_string(), times),
        );
    }

    /// Number of requests served for (method, path), failures included
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(m, p)| m == method && p == path)
            .count()
    }
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }

    fn take_failure(&mut self, method: &str, path: &str) -> Option<(u16, String)> {
        let key = (method.to_string(), path.to_string());
        let (code, reason, remaining) = self.failures.get_mut(&key)?;
        let failure = (*code, reason.clone());
        *remaining -= 1;
        if *remaining == 0 {
            self.failures.remove(&key);
        }
        Some(failure)
    }

    fn handle(&mut self, method: &str, path: &str, body: &[u8]) -> (u16, String) {
        self.requests.push((method.to_string(), path.to_string()));

        if let Some((code, reason)) = self.take_failure(method, path) {
            return error(code, &reason, "injected failure");
        }

        let (obj_path, status_only) = match path.strip_suffix("/status") {
            Some(p) => (p, true),
            None => (path, false),
        };

        match method {
            "GET" => match self.objects.get(obj_path) {
                Some(obj) => (200, obj.to_string()),
                None => not_found(obj_path),
            },
            "POST" => self.create(path, body),
            "PUT" => self.replace(obj_path, status_only, body),
            "PATCH" => self.patch(obj_path, status_only, body),
            "DELETE" => self.delete(obj_path, body),
            _ => error(405, "MethodNotAllowed", method),
        }
    }

    fn create(&mut self, collection: &str, body: &[u8]) -> (u16, String) {
        let Ok(mut obj) = serde_json::from_slice::<Value>(body) else {
            return error(400, "BadRequest", "invalid body");
        };
        let Some(name) = obj["metadata"]["name"].as_str().map(str::to_string) else {
            return error(422, "Invalid", "metadata.name is required");
        };
        let path = format!("{}/{}", collection, name);
        if self.objects.contains_key(&path) {
            return error(409, "AlreadyExists", &format!("\"{}\" already exists", name));
        }

        self.uids += 1;
        let rv = self.next_revision();
        let meta = &mut obj["metadata"];
        meta["uid"] = json!(format!("uid-{}", self.uids));
        meta["resourceVersion"] = json!(rv);
        meta["creationTimestamp"] = json!(timestamp(Utc::now()));
        meta["generation"] = json!(1);
        if let Some(map) = obj.as_object_mut() {
            map.remove("status");
        }

        self.objects.insert(path, obj.clone());
        (201, obj.to_string())
    }

    fn replace(&mut self, path: &str, status_only: bool, body: &[u8]) -> (u16, String) {
        let Some(stored) = self.objects.get(path).cloned() else {
            return not_found(path);
        };
        let Ok(incoming) = serde_json::from_slice::<Value>(body) else {
            return error(400, "BadRequest", "invalid body");
        };
        if let Some(conflict) = check_version(&stored, &incoming) {
            return conflict;
        }

        let mut updated = if status_only {
            let mut obj = stored.clone();
            obj["status"] = incoming["status"].clone();
            obj
        } else {
            let mut obj = incoming;
            obj["status"] = stored["status"].clone();
            obj["metadata"]["uid"] = stored["metadata"]["uid"].clone();
            obj["metadata"]["creationTimestamp"] = stored["metadata"]["creationTimestamp"].clone();
            obj
        };
        self.commit(path, &stored, &mut updated)
    }

    fn patch(&mut self, path: &str, status_only: bool, body: &[u8]) -> (u16, String) {
        let Some(stored) = self.objects.get(path).cloned() else {
            return not_found(path);
        };
        let Ok(patch) = serde_json::from_slice::<Value>(body) else {
            return error(400, "BadRequest", "invalid body");
        };
        if let Some(conflict) = check_version(&stored, &patch) {
            return conflict;
        }

        let mut merged = stored.clone();
        merge_patch(&mut merged, &patch);

        let mut updated = if status_only {
            let mut obj = stored.clone();
            obj["status"] = merged["status"].clone();
            obj
        } else {
            merged["status"] = stored["status"].clone();
            merged
        };
        self.commit(path, &stored, &mut updated)
    }

    fn commit(&mut self, path: &str, stored: &Value, updated: &mut Value) -> (u16, String) {
        if updated.get("status").is_some_and(Value::is_null) {
            if let Some(map) = updated.as_object_mut() {
                map.remove("status");
            }
        }
        let generation = stored["metadata"]["generation"].as_i64().unwrap_or(1);
        updated["metadata"]["generation"] = if updated["spec"] != stored["spec"] {
            json!(generation + 1)
        } else {
            json!(generation)
        };
        updated["metadata"]["resourceVersion"] = json!(self.next_revision());

        self.objects.insert(path.to_string(), updated.clone());
        (200, updated.to_string())
    }

    fn delete(&mut self, path: &str, body: &[u8]) -> (u16, String) {
        let Some(stored) = self.objects.get(path) else {
            return not_found(path);
        };
        let params: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let preconditions = &params["preconditions"];

        if let Some(uid) = preconditions["uid"].as_str() {
            if stored["metadata"]["uid"].as_str() != Some(uid) {
                return error(
                    409,
                    "Conflict",
                    &format!("Precondition failed: UID in precondition: {}", uid),
                );
            }
        }
        if let Some(rv) = preconditions["resourceVersion"].as_str() {
            if stored["metadata"]["resourceVersion"].as_str() != Some(rv) {
                return error(409, "Conflict", "Precondition failed: resourceVersion");
            }
        }

        self.objects.remove(path);
        (
            200,
            json!({"kind": "Status", "apiVersion": "v1", "status": "Success", "code": 200})
                .to_string(),
        )
    }
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        Box::pin(async move {
            let body = req
                .into_body()
                .collect()
                .await
                .map_err(Into::<tower::BoxError>::into)?
                .to_bytes();
            let (status, payload) = state.lock().unwrap().handle(&method, &path, &body);

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(payload.into_bytes()))
                .unwrap())
        })
    }
}

/// Reject a write whose resourceVersion is stale
fn check_version(stored: &Value, incoming: &Value) -> Option<(u16, String)> {
    let expected = incoming["metadata"]["resourceVersion"].as_str()?;
    if stored["metadata"]["resourceVersion"].as_str() == Some(expected) {
        return None;
    }
    Some(error(
        409,
        "Conflict",
        "the object has been modified; please apply your changes to the latest version and try again",
    ))
}

/// JSON merge patch (RFC 7386)
fn merge_patch(target: &mut Value, patch: &Value) {
    let Some(patch_map) = patch.as_object() else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Some(target_map) = target.as_object_mut() {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn error(code: u16, reason: &str, message: &str) -> (u16, String) {
    let body = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    });
    (code, body.to_string())
}

fn not_found(path: &str) -> (u16, String) {
    error(404, "NotFound", &format!("\"{}\" not found", path))
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time truncated to whole seconds, the precision the API server stores
pub fn now_secs() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_else(Utc::now)
}

pub fn record_path(namespace: &str, name: &str) -> String {
    format!(
        "/apis/ttl.example.com/v1alpha1/namespaces/{}/ttlresources/{}",
        namespace, name
    )
}

pub fn pod_path(namespace: &str, name: &str) -> String {
    format!("/api/v1/namespaces/{}/pods/{}", namespace, name)
}

/// A Pod, optionally carrying the TTL annotation with the given raw value
pub fn pod_json(name: &str, namespace: &str, uid: &str, ttl: Option<&str>) -> Value {
    let mut pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": uid,
            "creationTimestamp": timestamp(Utc::now())
        },
        "spec": {"containers": [{"name": "app", "image": "nginx"}]}
    });
    if let Some(ttl) = ttl {
        pod["metadata"]["annotations"] = json!({ (annotations::TTL_SECONDS): ttl });
    }
    pod
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_patch_removes_nulls_and_merges_nested() {
        let mut target = json!({"status": {"expired": false, "createdAt": "x"}, "spec": {"a": 1}});
        merge_patch(
            &mut target,
            &json!({"status": {"expired": true, "createdAt": null}}),
        );

        assert_eq!(target, json!({"status": {"expired": true}, "spec": {"a": 1}}));
    }
}

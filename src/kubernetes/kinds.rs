// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Table of supported target kinds.
//!
//! Maps a (group, version, kind) triple to the dynamic API used to read and
//! delete objects of that kind. The table order is the probe order used when
//! a bare `namespace/name` key has to be resolved to a kind.

use crate::config::split_api_version;
use crate::error::{is_not_found, Result, TtlError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    api::{ApiResource, DeleteParams, DynamicObject, Preconditions},
    core::GroupVersionKind,
    Api, Client,
};
use tracing::{debug, instrument};

#[derive(Clone, Debug)]
pub struct KindRegistry {
    kinds: Vec<ApiResource>,
}

impl KindRegistry {
    pub fn new(kinds: Vec<ApiResource>) -> Self {
        Self { kinds }
    }

    /// Build the table from configured kinds, guessing plurals the way kubectl does
    pub fn from_gvks(gvks: &[GroupVersionKind]) -> Self {
        Self::new(gvks.iter().map(ApiResource::from_gvk).collect())
    }

    /// Supported kinds in probe order
    pub fn kinds(&self) -> &[ApiResource] {
        &self.kinds
    }

    pub fn lookup(&self, group: &str, version: &str, kind: &str) -> Option<&ApiResource> {
        self.kinds
            .iter()
            .find(|ar| ar.group == group && ar.version == version && ar.kind == kind)
    }

    /// Resolve an owner reference to the API of its kind
    pub fn resolve(&self, owner: &OwnerReference) -> Result<&ApiResource> {
        if owner.api_version.is_empty() || owner.kind.is_empty() {
            return Err(TtlError::InvalidOwnerReference(format!(
                "owner reference '{}' has no apiVersion or kind",
                owner.name
            )));
        }
        let (group, version) = split_api_version(&owner.api_version);
        self.lookup(group, version, &owner.kind)
            .ok_or_else(|| TtlError::UnsupportedKind(format!("{}/{}", owner.api_version, owner.kind)))
    }

    /// Find the first kind with an object named `name` in `namespace`
    #[instrument(skip(self, client))]
    pub async fn probe(
        &self,
        client: &Client,
        namespace: &str,
        name: &str,
    ) -> Result<Option<(&ApiResource, DynamicObject)>> {
        for ar in &self.kinds {
            let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, ar);
            if let Some(obj) = api.get_opt(name).await? {
                debug!("Resolved {}/{} as {}", namespace, name, ar.kind);
                return Ok(Some((ar, obj)));
            }
        }
        Ok(None)
    }

    /// Delete the object an owner reference points to.
    ///
    /// The owner's UID is sent as precondition so a namesake created after the
    /// reference was recorded is left alone. A missing object surfaces as the
    /// raw API error; callers decide whether that counts as success.
    #[instrument(skip(self, client, owner), fields(kind = %owner.kind, name = %owner.name))]
    pub async fn delete_owner(
        &self,
        client: &Client,
        namespace: &str,
        owner: &OwnerReference,
    ) -> Result<()> {
        let ar = self.resolve(owner)?;
        let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, ar);

        let dp = DeleteParams {
            preconditions: (!owner.uid.is_empty()).then(|| Preconditions {
                uid: Some(owner.uid.clone()),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };
        api.delete(&owner.name, &dp).await?;
        Ok(())
    }
}

/// Whether a delete failed only because the object was already gone
pub fn is_gone(err: &TtlError) -> bool {
    matches!(err, TtlError::KubeError(e) if is_not_found(e))
}

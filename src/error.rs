// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtlError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Unsupported owner kind: {0}")]
    UnsupportedKind(String),

    #[error("Invalid owner reference: {0}")]
    InvalidOwnerReference(String),

    #[error("Invalid annotation: {0}")]
    InvalidAnnotation(String),

    #[error("Object has no namespace: {0}")]
    MissingNamespace(String),
}

impl TtlError {
    /// Whether the controller should try again later.
    ///
    /// Unsupported kinds and malformed references point at a configuration
    /// gap, retrying will not make them succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TtlError::KubeError(_))
    }
}

pub type Result<T> = std::result::Result<T, TtlError>;

/// The API server reported the object as absent
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

/// A create raced with another writer that created the same name
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason == "AlreadyExists")
}

/// A conditional write lost against a newer resourceVersion or failed a precondition
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason != "AlreadyExists")
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys used by the TTL operator
pub mod annotations {
    /// Number of seconds a resource may live, e.g. `"300"`
    pub const TTL_SECONDS: &str = "ttl.example.com/ttl-seconds";
}

/// Label keys and values stamped on TTLResources created by the operator
pub mod labels {
    /// Marks a TTLResource as created from an annotated target resource
    pub const MANAGED_BY: &str = "ttl.example.com/managed-by";
    pub const MANAGED_BY_VALUE: &str = "resource-controller";
    /// Standard Kubernetes label for the managing tool
    pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}

/// The operator name, used for logging and the standard managed-by label
pub const OPERATOR_NAME: &str = "ttl-operator";

/// Prefix of a managed TTLResource name, followed by the target name
pub const RECORD_NAME_PREFIX: &str = "ttl-";

/// Target kinds in probe order, as `apiVersion/Kind`
pub const DEFAULT_TARGET_KINDS: &str = "v1/Pod,v1/Service,apps/v1/Deployment";

/// Requeue delays in seconds
pub mod requeue {
    /// Delay before retrying after an optimistic-concurrency conflict
    pub const CONFLICT_SECS: u64 = 1;
    /// Delay before the first retry of a failed reconciliation, doubled per failure
    pub const ERROR_SECS: u64 = 60;
    /// Upper bound for the doubled retry delay
    pub const ERROR_MAX_SECS: u64 = 900;
    /// Longest delay handed to the controller scheduler; longer waits are re-checked
    pub const MAX_DELAY_SECS: u64 = 3600;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

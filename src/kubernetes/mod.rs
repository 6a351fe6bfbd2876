// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery and target kind dispatch.

pub mod crd;
pub mod kinds;

pub use crd::wait_for_ttl_crd;
pub use kinds::KindRegistry;

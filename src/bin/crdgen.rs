// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Prints the TTLResource CustomResourceDefinition as YAML.

use kube::CustomResourceExt;
use ttl_operator::types::TtlResource;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&TtlResource::crd())?);
    Ok(())
}

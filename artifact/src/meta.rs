//! The five well-known documents an artifact carries under `meta/`, and
//! their `serde` shapes. Field names here are load-bearing: they are read
//! by consumers outside this repository and must stay bit-exact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keys {
    pub strong: String,
    pub weak: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspaced {
    pub workspaced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspacedDependencies {
    #[serde(rename = "workspaced-dependencies")]
    pub workspaced_dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub success: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
}

impl BuildResult {
    /// The value `build_result()` reports for an artifact committed before
    /// `build-result.yaml` existed.
    pub fn back_compat_default() -> BuildResult {
        BuildResult {
            success: true,
            description: "succeeded".to_string(),
            detail: None,
        }
    }
}

pub type Dependencies = BTreeMap<String, String>;

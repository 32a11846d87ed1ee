//! Configuration injected by externally managed security policies.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Attributes, Result};

/// Which jobs a fragment applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentTarget {
    Job(String),
    Stage(String),
}

/// A configuration snippet deep-merged over a job's resolved attributes.
///
/// Any failure the policy resolution service hit while building the fragment
/// arrives pre-materialized in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyFragment {
    pub target: FragmentTarget,
    #[serde(default)]
    pub payload: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Name of the policy that produced the fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

impl PolicyFragment {
    pub fn for_job(name: impl Into<String>, payload: Value) -> Self {
        Self::new(FragmentTarget::Job(name.into()), payload)
    }

    pub fn for_stage(stage: impl Into<String>, payload: Value) -> Self {
        Self::new(FragmentTarget::Stage(stage.into()), payload)
    }

    fn new(target: FragmentTarget, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Attributes::new(),
        };
        Self {
            target,
            payload,
            error: None,
            policy: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// All fragments computed for one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicySet {
    fragments: Vec<PolicyFragment>,
}

impl PolicySet {
    pub fn new(fragments: Vec<PolicyFragment>) -> Self {
        Self { fragments }
    }

    pub fn push(&mut self, fragment: PolicyFragment) {
        self.fragments.push(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Fragments for a job in application order: stage-targeted first, then
    /// job-targeted, each group in insertion order.
    pub fn fragments_for<'a>(&'a self, job: &str, stage: &str) -> Vec<&'a PolicyFragment> {
        let by_stage = self
            .fragments
            .iter()
            .filter(|f| matches!(&f.target, FragmentTarget::Stage(s) if s == stage));
        let by_job = self
            .fragments
            .iter()
            .filter(|f| matches!(&f.target, FragmentTarget::Job(n) if n == job));
        by_stage.chain(by_job).collect()
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Read a JSON array of fragments from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let set = Self::from_json(&data)?;
        tracing::debug!(path = %path.display(), fragments = set.len(), "Policy fragments loaded");
        Ok(set)
    }
}

/// DAST site and scanner profiles, already fetched by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DastProfileCatalog {
    #[serde(default)]
    pub site_profiles: BTreeMap<String, Value>,
    #[serde(default)]
    pub scanner_profiles: BTreeMap<String, Value>,
}

impl DastProfileCatalog {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }
}

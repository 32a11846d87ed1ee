//! Seeding output: resolved attributes, typed resource descriptors, and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Attributes;

/// Final attribute map for one job plus the errors accumulated while
/// resolving it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAttributes {
    pub attributes: Attributes,
    pub errors: Vec<String>,
}

impl ResolvedAttributes {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Look up a nested value, e.g. `["options", "dast_configuration"]`.
    pub fn dig(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        crate::merge::dig(self.attributes.get(*first)?, rest)
    }

    pub fn options(&self) -> Option<&Attributes> {
        self.attributes.get("options").and_then(Value::as_object)
    }
}

/// Where a bridge points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeTarget {
    /// Multi-project pipeline: `trigger: group/project` or `trigger: {project: ...}`.
    Project {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strategy: Option<String>,
    },
    /// Parent-child pipeline: `trigger: {include: ...}`.
    ChildPipeline { include: Value },
    /// `needs: {pipeline: ...}` dependency on another pipeline.
    UpstreamPipeline { pipeline: String },
    /// A present trigger whose shape is not one of the above.
    Custom { trigger: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeDescriptor {
    pub name: String,
    pub stage: String,
    pub target: BridgeTarget,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDescriptor {
    pub name: String,
    pub stage: String,
    pub attributes: Attributes,
}

/// The unit of work a job seeds into. Callers must handle both kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Bridge(BridgeDescriptor),
    Build(BuildDescriptor),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Bridge(b) => &b.name,
            Resource::Build(b) => &b.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Bridge(_) => "bridge",
            Resource::Build(_) => "build",
        }
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self, Resource::Bridge(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "resource", rename_all = "snake_case")]
pub enum SeedOutcome {
    Included(Resource),
    Excluded,
}

/// The outcome of seeding one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedResult {
    pub name: String,
    pub outcome: SeedOutcome,
    pub errors: Vec<String>,
}

impl SeedResult {
    pub fn is_included(&self) -> bool {
        matches!(self.outcome, SeedOutcome::Included(_))
    }

    pub fn resource(&self) -> Option<&Resource> {
        match &self.outcome {
            SeedOutcome::Included(resource) => Some(resource),
            SeedOutcome::Excluded => None,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

//! Bridge vs Build classification.

use serde_json::Value;

use seed_types::{
    is_present, Attributes, BridgeDescriptor, BridgeTarget, BuildDescriptor, Resource,
};

fn option<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a Value> {
    attributes
        .get("options")
        .and_then(Value::as_object)
        .and_then(|options| options.get(key))
}

fn string_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn trigger_target(trigger: &Value) -> BridgeTarget {
    match trigger {
        Value::String(path) => BridgeTarget::Project {
            path: path.clone(),
            branch: None,
            strategy: None,
        },
        Value::Object(map) => {
            if let Some(path) = string_field(map, "project") {
                BridgeTarget::Project {
                    path,
                    branch: string_field(map, "branch"),
                    strategy: string_field(map, "strategy"),
                }
            } else if let Some(include) = map.get("include").filter(|v| is_present(v)) {
                BridgeTarget::ChildPipeline {
                    include: include.clone(),
                }
            } else {
                BridgeTarget::Custom {
                    trigger: trigger.clone(),
                }
            }
        }
        other => BridgeTarget::Custom {
            trigger: other.clone(),
        },
    }
}

fn upstream_pipeline(attributes: &Attributes) -> Option<String> {
    let pipeline = option(attributes, "bridge_needs")?
        .as_object()?
        .get("pipeline")
        .filter(|v| is_present(v))?;
    Some(match pipeline {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Derive the downstream target when the attributes describe a bridge:
/// a present `options.trigger`, or a present `options.bridge_needs.pipeline`.
pub fn bridge_target(attributes: &Attributes) -> Option<BridgeTarget> {
    if let Some(trigger) = option(attributes, "trigger").filter(|v| is_present(v)) {
        return Some(trigger_target(trigger));
    }
    upstream_pipeline(attributes).map(|pipeline| BridgeTarget::UpstreamPipeline { pipeline })
}

pub fn is_bridge(attributes: &Attributes) -> bool {
    bridge_target(attributes).is_some()
}

/// Classify resolved attributes into exactly one resource kind.
///
/// `name` and `stage` are read from the attributes when present, so a policy
/// override carries into the descriptor; the arguments are the fallback.
pub fn classify(name: &str, stage: &str, attributes: &Attributes) -> Resource {
    let text = |key: &str, fallback: &str| {
        attributes
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(fallback)
            .to_string()
    };
    let (name, stage) = (text("name", name), text("stage", stage));
    match bridge_target(attributes) {
        Some(target) => Resource::Bridge(BridgeDescriptor {
            name,
            stage,
            target,
            attributes: attributes.clone(),
        }),
        None => Resource::Build(BuildDescriptor {
            name,
            stage,
            attributes: attributes.clone(),
        }),
    }
}

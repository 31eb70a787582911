//! Removal of the mapping-type level from pre-7.x mappings.
//!
//! ES 6.x mappings nest everything under a named type
//! (`{"mytype": {"properties": ...}}`, sometimes wrapped in a one-element
//! array in snapshot metadata). Targets reject typed mappings, so the
//! single type's body is hoisted to the top level. Indices with two or
//! more types have no faithful translation and are reported unsupported.

use serde_json::Value;
use tracing::debug;

use reshard_core::{GlobalMetadata, IndexMetadata};

use crate::rule::{CanApplyResult, GlobalTransformation, IndexTransformation};

/// Top-level mapping keywords that are not type names.
const MAPPING_KEYWORDS: &[&str] = &[
    "properties",
    "dynamic",
    "dynamic_templates",
    "dynamic_date_formats",
    "date_detection",
    "numeric_detection",
    "_source",
    "_meta",
    "_routing",
    "_field_names",
];

/// The mapping-type structure of one `mappings` tree.
enum TypeShape {
    /// No mappings or nothing to hoist.
    Untyped,
    /// Exactly one named type wrapping the real mapping body.
    Single(String, Value),
    /// Two or more named types.
    Multiple(Vec<String>),
}

fn classify(mappings: &Value) -> TypeShape {
    // Snapshot metadata sometimes wraps the mappings object in an array.
    let obj = match mappings {
        Value::Array(elems) => match elems.as_slice() {
            [] => return TypeShape::Untyped,
            [single] => single,
            many => {
                let names = many
                    .iter()
                    .flat_map(|e| e.as_object().map(|m| m.keys().cloned().collect::<Vec<_>>()))
                    .flatten()
                    .collect();
                return TypeShape::Multiple(names);
            }
        },
        other => other,
    };
    let Some(map) = obj.as_object() else {
        return TypeShape::Untyped;
    };
    let type_keys: Vec<&String> = map
        .iter()
        .filter(|(k, v)| v.is_object() && !MAPPING_KEYWORDS.contains(&k.as_str()))
        .map(|(k, _)| k)
        .collect();
    match type_keys.as_slice() {
        [] => TypeShape::Untyped,
        [only] => TypeShape::Single((*only).clone(), map[*only].clone()),
        many => TypeShape::Multiple(many.iter().map(|k| (*k).to_string()).collect()),
    }
}

/// Hoists the single mapping type's body in index metadata.
pub struct IndexMappingTypeRemoval;

impl IndexTransformation for IndexMappingTypeRemoval {
    fn name(&self) -> &'static str {
        "index-mapping-type-removal"
    }

    fn can_apply(&self, index: &IndexMetadata) -> CanApplyResult {
        match classify(&index.mappings) {
            TypeShape::Untyped => CanApplyResult::No,
            TypeShape::Single(..) => CanApplyResult::Yes,
            TypeShape::Multiple(names) => CanApplyResult::Unsupported(format!(
                "multiple mapping types are not supported: {}",
                names.join(", ")
            )),
        }
    }

    fn apply(&self, index: &mut IndexMetadata) {
        if let TypeShape::Single(type_name, body) = classify(&index.mappings) {
            debug!(index = index.name, type_name, "Hoisting mapping type body");
            index.mappings = body;
        }
    }
}

/// Hoists mapping types inside legacy template bodies.
pub struct TemplateMappingTypeRemoval;

impl TemplateMappingTypeRemoval {
    fn typed_templates(metadata: &GlobalMetadata) -> (Vec<String>, Vec<String>) {
        let mut single = Vec::new();
        let mut multiple = Vec::new();
        if let Some(templates) = metadata.templates.as_object() {
            for (name, body) in templates {
                match body.get("mappings").map(classify) {
                    Some(TypeShape::Single(..)) => single.push(name.clone()),
                    Some(TypeShape::Multiple(_)) => multiple.push(name.clone()),
                    _ => {}
                }
            }
        }
        (single, multiple)
    }
}

impl GlobalTransformation for TemplateMappingTypeRemoval {
    fn name(&self) -> &'static str {
        "template-mapping-type-removal"
    }

    fn can_apply(&self, metadata: &GlobalMetadata) -> CanApplyResult {
        let (single, multiple) = Self::typed_templates(metadata);
        if !multiple.is_empty() {
            return CanApplyResult::Unsupported(format!(
                "templates with multiple mapping types: {}",
                multiple.join(", ")
            ));
        }
        if single.is_empty() {
            CanApplyResult::No
        } else {
            CanApplyResult::Yes
        }
    }

    fn apply(&self, metadata: &mut GlobalMetadata) {
        let Some(templates) = metadata.templates.as_object_mut() else {
            return;
        };
        for (name, body) in templates.iter_mut() {
            let Some(mappings) = body.get("mappings") else {
                continue;
            };
            if let TypeShape::Single(type_name, hoisted) = classify(mappings) {
                debug!(template = name, type_name, "Hoisting template mapping type");
                body["mappings"] = hoisted;
            }
        }
    }
}

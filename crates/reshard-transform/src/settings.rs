//! Removal of source-only index settings the target rejects.

use serde_json::Value;
use tracing::debug;

use reshard_core::IndexMetadata;

use crate::rule::{CanApplyResult, IndexTransformation};

/// Settings that only exist on the source side. The target refuses index
/// creation when any of these appear in the body.
const UNSUPPORTED_SETTINGS: &[&str] = &["index.mapping.single_type", "index.soft_deletes.enabled"];

pub struct IndexSettingsCleanup;

impl IndexSettingsCleanup {
    fn has_setting(settings: &Value, dotted: &str) -> bool {
        if settings.get(dotted).is_some() {
            return true;
        }
        let mut node = settings;
        for part in dotted.split('.') {
            match node.get(part) {
                Some(next) => node = next,
                None => return false,
            }
        }
        true
    }

    fn remove_setting(settings: &mut Value, dotted: &str) {
        if let Some(map) = settings.as_object_mut() {
            map.remove(dotted);
        }
        // Nested form: walk to the parent object, remove the leaf, then
        // prune parents left empty.
        let parts: Vec<&str> = dotted.split('.').collect();
        remove_nested(settings, &parts);
    }
}

fn remove_nested(node: &mut Value, parts: &[&str]) {
    let Some(map) = node.as_object_mut() else {
        return;
    };
    match parts {
        [] => {}
        [leaf] => {
            map.remove(*leaf);
        }
        [head, rest @ ..] => {
            if let Some(child) = map.get_mut(*head) {
                remove_nested(child, rest);
                if child.as_object().is_some_and(|m| m.is_empty()) {
                    map.remove(*head);
                }
            }
        }
    }
}

impl IndexTransformation for IndexSettingsCleanup {
    fn name(&self) -> &'static str {
        "index-settings-cleanup"
    }

    fn can_apply(&self, index: &IndexMetadata) -> CanApplyResult {
        let any = UNSUPPORTED_SETTINGS
            .iter()
            .any(|s| Self::has_setting(&index.settings, s));
        if any {
            CanApplyResult::Yes
        } else {
            CanApplyResult::No
        }
    }

    fn apply(&self, index: &mut IndexMetadata) {
        for setting in UNSUPPORTED_SETTINGS {
            if Self::has_setting(&index.settings, setting) {
                debug!(index = index.name, setting, "Removing unsupported setting");
                Self::remove_setting(&mut index.settings, setting);
            }
        }
    }
}

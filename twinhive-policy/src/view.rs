//! Redacted JSON views.
//!
//! `build_json_view` copies a document bottom-up, keeping only the nodes
//! the caller may see. A node survives if it is matched by the
//! always-visible selector, if the caller holds unrestricted permission at
//! its resource key (in which case the whole subtree is kept, since an
//! unrestricted grant covers every descendant), or if any of
//! its descendants survives, in which case the node remains as a partial
//! shell. Dropped leaves leave no placeholder.

use serde_json::{Map, Value};

use twinhive_model::{
    AuthorizationContext, JsonPointer, Permission, PointerParseError, ResourceKey,
};

use crate::types::CompiledEnforcer;

/// Pointers that stay visible in a view regardless of permissions.
///
/// A selector entry makes the addressed node and its whole subtree
/// visible; ancestors of a visible node survive as partial shells through
/// the normal recursion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    pointers: Vec<JsonPointer>,
}

impl FieldSelector {
    /// A selector that never matches.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(pointers: Vec<JsonPointer>) -> Self {
        Self { pointers }
    }

    /// Parse a selector from pointer strings; any invalid pointer fails
    /// the whole selector.
    pub fn parse<'a, I>(pointers: I) -> Result<Self, PointerParseError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let pointers = pointers
            .into_iter()
            .map(JsonPointer::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pointers })
    }

    /// Whether the node at `pointer` is selected (directly or as part of a
    /// selected subtree).
    pub fn selects(&self, pointer: &JsonPointer) -> bool {
        self.pointers.iter().any(|p| p.is_prefix_of(pointer))
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }
}

impl CompiledEnforcer {
    /// Build the caller-visible view of `document`, rooted at `key`.
    ///
    /// Pointer positions inside the document extend `key`; array elements
    /// extend it by their index. Re-filtering an already filtered view is
    /// a no-op.
    pub fn build_json_view(
        &self,
        key: &ResourceKey,
        document: &Value,
        ctx: &AuthorizationContext,
        selector: &FieldSelector,
        permission: Permission,
    ) -> Value {
        match self.filter_value(key, &JsonPointer::root(), document, ctx, selector, permission) {
            Some(value) => value,
            None => match document {
                Value::Object(_) => Value::Object(Map::new()),
                Value::Array(_) => Value::Array(Vec::new()),
                _ => Value::Null,
            },
        }
    }

    fn filter_value(
        &self,
        key: &ResourceKey,
        relative: &JsonPointer,
        value: &Value,
        ctx: &AuthorizationContext,
        selector: &FieldSelector,
        permission: Permission,
    ) -> Option<Value> {
        if !relative.is_root() && selector.selects(relative) {
            return Some(value.clone());
        }
        if self.has_unrestricted_permission(key, ctx, permission) {
            return Some(value.clone());
        }
        match value {
            Value::Object(map) => {
                let mut surviving = Map::new();
                for (field, child) in map {
                    if let Some(kept) = self.filter_value(
                        &key.child(field.clone()),
                        &relative.child(field.clone()),
                        child,
                        ctx,
                        selector,
                        permission,
                    ) {
                        surviving.insert(field.clone(), kept);
                    }
                }
                if surviving.is_empty() {
                    None
                } else {
                    Some(Value::Object(surviving))
                }
            }
            Value::Array(items) => {
                let mut surviving = Vec::new();
                for (index, child) in items.iter().enumerate() {
                    let segment = index.to_string();
                    if let Some(kept) = self.filter_value(
                        &key.child(segment.clone()),
                        &relative.child(segment),
                        child,
                        ctx,
                        selector,
                        permission,
                    ) {
                        surviving.push(kept);
                    }
                }
                if surviving.is_empty() {
                    None
                } else {
                    Some(Value::Array(surviving))
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::compile_policy;
    use crate::types::{Policy, PolicyEntry, ResourceGrant};
    use serde_json::json;
    use twinhive_model::{AuthSubject, Permissions, PolicyId};

    fn compile(resources: Vec<ResourceGrant>) -> CompiledEnforcer {
        compile_policy(&Policy {
            id: PolicyId::parse("org.acme:p").unwrap(),
            revision: 1,
            entries: vec![PolicyEntry {
                label: "subject".to_string(),
                subjects: vec![AuthSubject::new("alice")],
                resources,
            }],
        })
        .unwrap()
    }

    fn grant(key: &str, permissions: Permissions) -> ResourceGrant {
        ResourceGrant {
            key: ResourceKey::twin_from_str(key).unwrap(),
            grant: permissions,
            revoke: Permissions::empty(),
        }
    }

    fn revoke(key: &str, permissions: Permissions) -> ResourceGrant {
        ResourceGrant {
            key: ResourceKey::twin_from_str(key).unwrap(),
            grant: Permissions::empty(),
            revoke: permissions,
        }
    }

    fn ctx() -> AuthorizationContext {
        AuthorizationContext::single("alice")
    }

    fn root_key() -> ResourceKey {
        ResourceKey::twin_from_str("/").unwrap()
    }

    #[test]
    fn test_feature_scoped_read() {
        let enforcer = compile(vec![grant("/features/temperature", Permissions::READ)]);
        let selector = FieldSelector::parse(["/id"]).unwrap();
        let document = json!({
            "id": "org.acme:device-1",
            "features": {
                "temperature": {"value": 21.5},
                "humidity": {"value": 60}
            }
        });
        let view = enforcer.build_json_view(
            &root_key(),
            &document,
            &ctx(),
            &selector,
            Permission::Read,
        );
        assert_eq!(
            view,
            json!({
                "id": "org.acme:device-1",
                "features": {
                    "temperature": {"value": 21.5}
                }
            })
        );
    }

    #[test]
    fn test_unrestricted_root_keeps_everything() {
        let enforcer = compile(vec![grant("/", Permissions::READ)]);
        let document = json!({"attributes": {"location": "kitchen"}, "features": {}});
        let view = enforcer.build_json_view(
            &root_key(),
            &document,
            &ctx(),
            &FieldSelector::none(),
            Permission::Read,
        );
        assert_eq!(view, document);
    }

    #[test]
    fn test_revoked_subtree_is_dropped() {
        let enforcer = compile(vec![
            grant("/", Permissions::READ),
            revoke("/attributes/secret", Permissions::READ),
        ]);
        let document = json!({
            "attributes": {"secret": {"code": 42}, "location": "kitchen"}
        });
        let view = enforcer.build_json_view(
            &root_key(),
            &document,
            &ctx(),
            &FieldSelector::none(),
            Permission::Read,
        );
        assert_eq!(view, json!({"attributes": {"location": "kitchen"}}));
    }

    #[test]
    fn test_no_permission_yields_empty_object() {
        let enforcer = compile(vec![]);
        let document = json!({"attributes": {"location": "kitchen"}});
        let view = enforcer.build_json_view(
            &root_key(),
            &document,
            &ctx(),
            &FieldSelector::none(),
            Permission::Read,
        );
        assert_eq!(view, json!({}));
    }

    #[test]
    fn test_allowlist_survives_without_permissions() {
        let enforcer = compile(vec![]);
        let selector = FieldSelector::parse(["/id"]).unwrap();
        let document = json!({"id": "org.acme:device-1", "attributes": {}});
        let view =
            enforcer.build_json_view(&root_key(), &document, &ctx(), &selector, Permission::Read);
        assert_eq!(view, json!({"id": "org.acme:device-1"}));
    }

    #[test]
    fn test_array_elements_filter_by_index() {
        let enforcer = compile(vec![grant("/readings/0", Permissions::READ)]);
        let document = json!({"readings": [21.5, 60, 1013]});
        let view = enforcer.build_json_view(
            &root_key(),
            &document,
            &ctx(),
            &FieldSelector::none(),
            Permission::Read,
        );
        assert_eq!(view, json!({"readings": [21.5]}));
    }

    #[test]
    fn test_view_is_idempotent() {
        let enforcer = compile(vec![
            grant("/features", Permissions::READ),
            revoke("/features/calibration", Permissions::READ),
        ]);
        let selector = FieldSelector::parse(["/id"]).unwrap();
        let document = json!({
            "id": "org.acme:device-1",
            "attributes": {"location": "kitchen"},
            "features": {
                "temperature": {"value": 21.5},
                "calibration": {"offset": 0.3}
            }
        });
        let once = enforcer.build_json_view(
            &root_key(),
            &document,
            &ctx(),
            &selector,
            Permission::Read,
        );
        let twice =
            enforcer.build_json_view(&root_key(), &once, &ctx(), &selector, Permission::Read);
        assert_eq!(once, twice);
        assert_eq!(
            once,
            json!({
                "id": "org.acme:device-1",
                "features": {
                    "temperature": {"value": 21.5}
                }
            })
        );
    }
}

//! Command authorization and response filtering.
//!
//! The authorizer is a pure decision pipeline: given a command (or
//! response) and a policy enforcer bundle, it produces the authorized
//! signal, a denial, or a filtered response. It holds no per-request
//! state; the actor layer owns loading and caching of the bundle.
//!
//! Decision order for commands:
//!
//! 1. applicability (twin domain, non-live channel)
//! 2. load-free short circuits: query with `response_required = false`
//!    (authorized no-op) and public description requests (feature-toggle
//!    gated bypass)
//! 3. permission resolution: modify → unrestricted WRITE; query → partial
//!    READ; merge → unrestricted WRITE at the top, else partial WRITE at
//!    the top plus unrestricted WRITE on every patch leaf (all-or-nothing)
//! 4. condition gating against READ
//! 5. read-granted subject stamping and channel normalization

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use twinhive_model::{
    AuthorizationContext, Channel, CommandCategory, CommandKind, DomainError, JsonPointer,
    Permission, PolicyId, ResourceKey, ResponseKind, TwinCommand, TwinResponse,
};
use twinhive_policy::{CompiledEnforcer, FieldSelector, PolicyEnforcer};

use crate::condition::{ConditionEvaluator, ConditionParser};
use crate::config::EnforcementConfig;

/// Fields of a query response that stay visible regardless of
/// authorization.
const RESPONSE_ALLOWLIST: &[&str] = &["/id"];

/// Result of a successful authorization.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationOutcome {
    /// The command may proceed; it carries stamped read-granted subjects.
    Authorized(TwinCommand),
    /// Query with `response_required = false`: authorized as a no-op,
    /// nothing is forwarded and nothing is returned.
    NotRequired,
}

/// Authorizes twin commands and filters twin responses.
#[derive(Debug, Clone)]
pub struct CommandAuthorizer {
    config: EnforcementConfig,
    conditions: ConditionEvaluator,
    response_allowlist: FieldSelector,
}

impl CommandAuthorizer {
    pub fn new(config: EnforcementConfig, parser: Arc<dyn ConditionParser>) -> Self {
        let response_allowlist = FieldSelector::parse(RESPONSE_ALLOWLIST.iter().copied())
            .expect("response allowlist pointers are valid");
        Self {
            config,
            conditions: ConditionEvaluator::new(parser),
            response_allowlist,
        }
    }

    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    /// Whether this authorizer governs the command. Live-channel commands
    /// follow a separate enforcement path; query commands are always
    /// governed here because their channel is normalized back to twin
    /// after authorization.
    pub fn is_applicable(&self, command: &TwinCommand) -> bool {
        command.is_query() || !command.headers.is_live()
    }

    /// Whether this authorizer governs the response.
    pub fn response_is_applicable(&self, response: &TwinResponse) -> bool {
        !response.headers.is_live()
    }

    /// The load-free short circuits, decided before any policy lookup.
    ///
    /// Returns `None` when the command needs the full policy path.
    pub fn pre_authorize(
        &self,
        command: &TwinCommand,
    ) -> Option<Result<AuthorizationOutcome, DomainError>> {
        if command.is_query() && !command.headers.response_required {
            // nothing will be returned, so there is nothing to authorize
            return Some(Ok(AuthorizationOutcome::NotRequired));
        }
        if self.is_description_request(command) {
            return Some(if self.config.wot_integration_enabled {
                Ok(AuthorizationOutcome::Authorized(
                    self.prepare_for_forwarding(command.clone()),
                ))
            } else {
                Err(DomainError::DescriptionsDisabled)
            });
        }
        None
    }

    /// Authorize a command against the policy enforcer.
    pub fn authorize_command(
        &self,
        command: &TwinCommand,
        policy_enforcer: &PolicyEnforcer,
    ) -> Result<AuthorizationOutcome, DomainError> {
        if let Some(outcome) = self.pre_authorize(command) {
            return outcome;
        }

        let enforcer = policy_enforcer.enforcer();
        let Some(ctx) = command.headers.authorization_context.as_ref() else {
            // no authenticated subject outside the public bypass path
            return Err(self.error_for_command(command));
        };
        let resource = ResourceKey::twin(command.path.clone());

        let authorized = match command.category() {
            CommandCategory::Merge => self.merge_authorized(command, enforcer, &resource, ctx),
            CommandCategory::Modify | CommandCategory::Create | CommandCategory::Delete => {
                enforcer.has_unrestricted_permission(&resource, ctx, Permission::Write)
            }
            CommandCategory::Query => {
                // fine-grained filtering happens in response view building
                enforcer.has_partial_permission(&resource, ctx, Permission::Read)
            }
        };

        if command.category() != CommandCategory::Create {
            if let Some(condition) = command.headers.condition.as_deref() {
                self.conditions.enforce_read_permission(
                    condition,
                    enforcer,
                    ctx,
                    || DomainError::ConditionFailed,
                )?;
            }
        }
        if let Some(live_condition) = command.headers.live_channel_condition.as_deref() {
            if !command.is_query() {
                return Err(DomainError::LiveChannelConditionNotAllowed);
            }
            if command.headers.is_live() {
                self.conditions.enforce_read_permission(
                    live_condition,
                    enforcer,
                    ctx,
                    || DomainError::LiveChannelConditionFailed,
                )?;
            }
        }

        if !authorized {
            return Err(self.error_for_command(command));
        }

        let stamped = self.with_read_granted_subjects(command.clone(), policy_enforcer, &resource);
        Ok(AuthorizationOutcome::Authorized(
            self.prepare_for_forwarding(stamped),
        ))
    }

    /// The "no policy attached" path: deny as not accessible.
    pub fn authorize_with_missing_enforcer(&self, command: &TwinCommand) -> DomainError {
        DomainError::not_accessible(command.entity_id.clone())
    }

    /// The "policy deleted after having been attached" path. Kept distinct
    /// from the missing-enforcer path; the two are separately testable
    /// error conditions.
    pub fn error_for_deleted_policy(
        &self,
        command: &TwinCommand,
        policy_id: &PolicyId,
    ) -> DomainError {
        DomainError::policy_deleted(command.entity_id.clone(), policy_id.clone())
    }

    /// Whether the response needs view filtering before being forwarded.
    pub fn should_filter_response(&self, response: &TwinResponse) -> bool {
        response.kind == ResponseKind::Query
    }

    /// Replace a query response's entity with the caller-visible view.
    /// Non-query responses and non-structured entities pass through
    /// unchanged.
    pub fn filter_response(
        &self,
        mut response: TwinResponse,
        policy_enforcer: &PolicyEnforcer,
    ) -> Result<TwinResponse, DomainError> {
        if response.kind != ResponseKind::Query {
            return Ok(response);
        }
        let Some(entity) = response.entity.as_ref() else {
            return Ok(response);
        };
        if !entity.is_object() {
            return Ok(response);
        }
        let Some(ctx) = response.headers.authorization_context.as_ref() else {
            return Err(DomainError::not_accessible(response.entity_id.clone()));
        };
        let resource = ResourceKey::twin(response.path.clone());
        let view = policy_enforcer.enforcer().build_json_view(
            &resource,
            entity,
            ctx,
            &self.response_allowlist,
            Permission::Read,
        );
        response.entity = Some(view);
        Ok(response)
    }

    /// A retrieve of the twin root or of a single feature carrying the
    /// machine-readable description accept header.
    fn is_description_request(&self, command: &TwinCommand) -> bool {
        if !matches!(command.kind, CommandKind::Retrieve) || !command.headers.accepts_description()
        {
            return false;
        }
        let segments = command.path.segments();
        segments.is_empty() || (segments.len() == 2 && segments[0] == "features")
    }

    fn merge_authorized(
        &self,
        command: &TwinCommand,
        enforcer: &CompiledEnforcer,
        resource: &ResourceKey,
        ctx: &AuthorizationContext,
    ) -> bool {
        if enforcer.has_unrestricted_permission(resource, ctx, Permission::Write) {
            return true;
        }
        if !enforcer.has_partial_permission(resource, ctx, Permission::Write) {
            return false;
        }
        // partial permission at the top: every leaf of the patch must be
        // unrestricted, any single denied leaf denies the whole command
        let CommandKind::Merge { patch } = &command.kind else {
            return false;
        };
        let leaves = merge_leaf_keys(&command.path, patch);
        enforcer.has_unrestricted_permissions(leaves.iter(), ctx, Permission::Write)
    }

    fn error_for_command(&self, command: &TwinCommand) -> DomainError {
        match command.category() {
            CommandCategory::Query => DomainError::not_accessible(command.entity_id.clone()),
            _ => DomainError::not_modifiable(command.entity_id.clone()),
        }
    }

    fn with_read_granted_subjects(
        &self,
        command: TwinCommand,
        policy_enforcer: &PolicyEnforcer,
        resource: &ResourceKey,
    ) -> TwinCommand {
        let mut subjects: Vec<_> = policy_enforcer
            .enforcer()
            .subjects_with_unrestricted_permission(resource, Permission::Read)
            .into_iter()
            .collect();
        subjects.sort_unstable();
        let headers = command.headers.clone().with_read_granted_subjects(subjects);
        command.with_headers(headers)
    }

    /// Normalize the channel of authorized query commands back to twin and
    /// apply inspection logging before the command leaves enforcement.
    fn prepare_for_forwarding(&self, command: TwinCommand) -> TwinCommand {
        let command = if command.is_query() && command.headers.is_live() {
            let headers = command.headers.clone().with_channel(Channel::Twin);
            command.with_headers(headers)
        } else {
            command
        };
        self.log_inspected(&command);
        command
    }

    fn log_inspected(&self, command: &TwinCommand) {
        if !self.config.inspects(command.entity_id.namespace()) {
            return;
        }
        let payload = match &command.kind {
            CommandKind::Modify { value } => Some(value),
            CommandKind::Merge { patch } => Some(patch),
            CommandKind::Create { entity } => Some(entity),
            _ => None,
        };
        if let Some(payload) = payload {
            let leaves = merge_leaf_keys(&command.path, payload);
            let mut keys: Vec<String> = leaves.iter().map(|k| k.to_string()).collect();
            keys.sort_unstable();
            tracing::info!(
                entity_id = %command.entity_id,
                correlation_id = %command.headers.correlation_id,
                signal_type = command.signal_type(),
                resource_keys = ?keys,
                "Forwarding modify command"
            );
        } else {
            tracing::debug!(
                entity_id = %command.entity_id,
                correlation_id = %command.headers.correlation_id,
                signal_type = command.signal_type(),
                "Forwarding command"
            );
        }
    }
}

/// Decompose a patch value into the resource keys of its leaves.
///
/// Objects recurse per field, extending the pointer; anything else
/// (including an empty object) is a terminal leaf at its own path.
pub fn merge_leaf_keys(path: &JsonPointer, value: &Value) -> HashSet<ResourceKey> {
    match value {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .flat_map(|(field, child)| merge_leaf_keys(&path.child(field.clone()), child))
            .collect(),
        _ => HashSet::from([ResourceKey::twin(path.clone())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rql::RqlConditionParser;
    use serde_json::json;
    use twinhive_model::{
        AuthSubject, EntityId, Permissions, RequestHeaders, CONTENT_TYPE_TD_JSON,
    };
    use twinhive_policy::{Policy, PolicyEntry, ResourceGrant};

    fn authorizer(config: EnforcementConfig) -> CommandAuthorizer {
        CommandAuthorizer::new(config, Arc::new(RqlConditionParser))
    }

    fn entity() -> EntityId {
        EntityId::parse("org.acme:device-1").unwrap()
    }

    fn bundle(resources: Vec<(&str, Permissions, Permissions)>) -> PolicyEnforcer {
        PolicyEnforcer::new(Policy {
            id: PolicyId::parse("org.acme:device-policy").unwrap(),
            revision: 1,
            entries: vec![PolicyEntry {
                label: "caller".to_string(),
                subjects: vec![AuthSubject::new("alice")],
                resources: resources
                    .into_iter()
                    .map(|(key, grant, revoke)| ResourceGrant {
                        key: ResourceKey::twin_from_str(key).unwrap(),
                        grant,
                        revoke,
                    })
                    .collect(),
            }],
        })
        .unwrap()
    }

    fn headers() -> RequestHeaders {
        RequestHeaders::new(AuthorizationContext::single("alice"))
    }

    fn command(path: &str, kind: CommandKind, headers: RequestHeaders) -> TwinCommand {
        TwinCommand::new(entity(), JsonPointer::parse(path).unwrap(), kind, headers)
    }

    #[test]
    fn test_modify_requires_unrestricted_write() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![("/attributes", Permissions::WRITE, Permissions::empty())]);

        let allowed = command(
            "/attributes/location",
            CommandKind::Modify {
                value: json!("kitchen"),
            },
            headers(),
        );
        assert!(matches!(
            authorizer.authorize_command(&allowed, &bundle),
            Ok(AuthorizationOutcome::Authorized(_))
        ));

        let denied = command(
            "/features/lamp",
            CommandKind::Modify { value: json!({}) },
            headers(),
        );
        let err = authorizer.authorize_command(&denied, &bundle).unwrap_err();
        assert_eq!(err.code(), "twin:notmodifiable");
    }

    #[test]
    fn test_query_needs_only_partial_read() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![(
            "/features/temperature",
            Permissions::READ,
            Permissions::empty(),
        )]);

        let query = command("/", CommandKind::Retrieve, headers());
        assert!(matches!(
            authorizer.authorize_command(&query, &bundle),
            Ok(AuthorizationOutcome::Authorized(_))
        ));

        let unrelated = command("/attributes", CommandKind::Retrieve, headers());
        let err = authorizer
            .authorize_command(&unrelated, &bundle)
            .unwrap_err();
        assert_eq!(err.code(), "twin:notaccessible");
    }

    #[test]
    fn test_merge_is_all_or_nothing() {
        let authorizer = authorizer(EnforcementConfig::default());
        // WRITE on /attributes but revoked on /attributes/secret
        let bundle = bundle(vec![
            ("/attributes", Permissions::WRITE, Permissions::empty()),
            ("/attributes/secret", Permissions::empty(), Permissions::WRITE),
        ]);

        let partial_patch = command(
            "/attributes",
            CommandKind::Merge {
                patch: json!({"name": "rover", "secret": {"pin": "0000"}}),
            },
            headers(),
        );
        let err = authorizer
            .authorize_command(&partial_patch, &bundle)
            .unwrap_err();
        assert_eq!(err.code(), "twin:notmodifiable");

        let clean_patch = command(
            "/attributes",
            CommandKind::Merge {
                patch: json!({"name": "rover"}),
            },
            headers(),
        );
        assert!(matches!(
            authorizer.authorize_command(&clean_patch, &bundle),
            Ok(AuthorizationOutcome::Authorized(_))
        ));
    }

    #[test]
    fn test_merge_unrestricted_top_skips_leaf_checks() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![("/", Permissions::WRITE, Permissions::empty())]);
        let patch = command(
            "/attributes",
            CommandKind::Merge {
                patch: json!({"anything": {"goes": true}}),
            },
            headers(),
        );
        assert!(matches!(
            authorizer.authorize_command(&patch, &bundle),
            Ok(AuthorizationOutcome::Authorized(_))
        ));
    }

    #[test]
    fn test_query_without_response_required_is_noop() {
        let authorizer = authorizer(EnforcementConfig::default());
        let query = command(
            "/",
            CommandKind::Retrieve,
            headers().with_response_required(false),
        );
        assert!(matches!(
            authorizer.pre_authorize(&query),
            Some(Ok(AuthorizationOutcome::NotRequired))
        ));
    }

    #[test]
    fn test_description_request_bypasses_policy_when_enabled() {
        let authorizer = authorizer(EnforcementConfig {
            wot_integration_enabled: true,
            ..Default::default()
        });
        let request = TwinCommand::new(
            entity(),
            JsonPointer::parse("/features/lamp").unwrap(),
            CommandKind::Retrieve,
            RequestHeaders::anonymous().with_accept(CONTENT_TYPE_TD_JSON),
        );
        assert!(matches!(
            authorizer.pre_authorize(&request),
            Some(Ok(AuthorizationOutcome::Authorized(_)))
        ));
    }

    #[test]
    fn test_description_request_denied_when_toggle_disabled() {
        let authorizer = authorizer(EnforcementConfig::default());
        let request = TwinCommand::new(
            entity(),
            JsonPointer::root(),
            CommandKind::Retrieve,
            RequestHeaders::anonymous().with_accept(CONTENT_TYPE_TD_JSON),
        );
        match authorizer.pre_authorize(&request) {
            Some(Err(err)) => assert_eq!(err.code(), "twin:descriptions.disabled"),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn test_description_accept_header_on_deep_path_is_not_bypassed() {
        let authorizer = authorizer(EnforcementConfig {
            wot_integration_enabled: true,
            ..Default::default()
        });
        let request = TwinCommand::new(
            entity(),
            JsonPointer::parse("/features/lamp/properties").unwrap(),
            CommandKind::Retrieve,
            RequestHeaders::anonymous().with_accept(CONTENT_TYPE_TD_JSON),
        );
        assert!(authorizer.pre_authorize(&request).is_none());
    }

    #[test]
    fn test_condition_gated_by_read_permission() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![
            ("/attributes", Permissions::READ | Permissions::WRITE, Permissions::empty()),
        ]);

        let readable = command(
            "/attributes/location",
            CommandKind::Modify {
                value: json!("cellar"),
            },
            headers().with_condition("eq(attributes/location,\"kitchen\")"),
        );
        assert!(authorizer.authorize_command(&readable, &bundle).is_ok());

        let unreadable = command(
            "/attributes/location",
            CommandKind::Modify {
                value: json!("cellar"),
            },
            headers().with_condition("exists(features/lamp)"),
        );
        let err = authorizer
            .authorize_command(&unreadable, &bundle)
            .unwrap_err();
        assert_eq!(err.code(), "twin:condition.failed");
    }

    #[test]
    fn test_create_skips_condition() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![("/", Permissions::WRITE, Permissions::empty())]);
        let create = command(
            "/",
            CommandKind::Create {
                entity: json!({"attributes": {}}),
            },
            headers().with_condition("exists(attributes/nonexistent)"),
        );
        // there is nothing to condition on yet
        assert!(authorizer.authorize_command(&create, &bundle).is_ok());
    }

    #[test]
    fn test_malformed_condition_is_invalid() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![("/", Permissions::READ | Permissions::WRITE, Permissions::empty())]);
        let command = command(
            "/attributes",
            CommandKind::Retrieve,
            headers().with_condition("eq(attributes/location"),
        );
        let err = authorizer.authorize_command(&command, &bundle).unwrap_err();
        assert_eq!(err.code(), "twin:condition.invalid");
    }

    #[test]
    fn test_live_channel_condition_rejected_on_modify() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![("/", Permissions::READ | Permissions::WRITE, Permissions::empty())]);
        let modify = command(
            "/attributes/location",
            CommandKind::Modify {
                value: json!("cellar"),
            },
            headers().with_live_channel_condition("eq(attributes/location,\"kitchen\")"),
        );
        let err = authorizer.authorize_command(&modify, &bundle).unwrap_err();
        assert_eq!(err.code(), "twin:livechannelcondition.notallowed");
    }

    #[test]
    fn test_live_query_is_normalized_to_twin_channel() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![("/", Permissions::READ, Permissions::empty())]);
        let query = command(
            "/",
            CommandKind::Retrieve,
            headers()
                .with_channel(Channel::Live)
                .with_live_channel_condition("exists(attributes)"),
        );
        match authorizer.authorize_command(&query, &bundle).unwrap() {
            AuthorizationOutcome::Authorized(authorized) => {
                assert_eq!(authorized.headers.channel, Channel::Twin);
            }
            other => panic!("expected authorization, got {other:?}"),
        }
    }

    #[test]
    fn test_authorized_command_is_stamped_with_read_subjects() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![("/", Permissions::READ | Permissions::WRITE, Permissions::empty())]);
        let modify = command(
            "/attributes/location",
            CommandKind::Modify {
                value: json!("cellar"),
            },
            headers(),
        );
        match authorizer.authorize_command(&modify, &bundle).unwrap() {
            AuthorizationOutcome::Authorized(authorized) => {
                assert_eq!(
                    authorized.headers.read_granted_subjects,
                    vec![AuthSubject::new("alice")]
                );
            }
            other => panic!("expected authorization, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_context_is_denied() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![("/", Permissions::READ, Permissions::empty())]);
        let query = TwinCommand::new(
            entity(),
            JsonPointer::root(),
            CommandKind::Retrieve,
            RequestHeaders::anonymous(),
        );
        let err = authorizer.authorize_command(&query, &bundle).unwrap_err();
        assert_eq!(err.code(), "twin:notaccessible");
    }

    #[test]
    fn test_filter_response_redacts_entity() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![(
            "/features/temperature",
            Permissions::READ,
            Permissions::empty(),
        )]);
        let response = TwinResponse::query(
            entity(),
            JsonPointer::root(),
            json!({
                "id": "org.acme:device-1",
                "features": {
                    "temperature": {"value": 21.5},
                    "humidity": {"value": 60}
                }
            }),
            headers(),
        );
        let filtered = authorizer.filter_response(response, &bundle).unwrap();
        assert_eq!(
            filtered.entity.unwrap(),
            json!({
                "id": "org.acme:device-1",
                "features": {
                    "temperature": {"value": 21.5}
                }
            })
        );
    }

    #[test]
    fn test_filter_passes_through_non_query_and_non_object() {
        let authorizer = authorizer(EnforcementConfig::default());
        let bundle = bundle(vec![]);
        let ack = TwinResponse::modified(entity(), JsonPointer::root(), headers());
        assert!(!authorizer.should_filter_response(&ack));
        let unchanged = authorizer.filter_response(ack.clone(), &bundle).unwrap();
        assert_eq!(unchanged, ack);

        let scalar = TwinResponse::query(
            entity(),
            JsonPointer::parse("/attributes/location").unwrap(),
            json!("kitchen"),
            headers(),
        );
        let unchanged = authorizer.filter_response(scalar.clone(), &bundle).unwrap();
        assert_eq!(unchanged, scalar);
    }

    #[test]
    fn test_merge_leaf_keys_decomposition() {
        let path = JsonPointer::parse("/attributes").unwrap();
        let patch = json!({
            "name": "rover",
            "position": {"x": 1, "y": 2},
            "tags": ["a", "b"],
            "empty": {}
        });
        let leaves = merge_leaf_keys(&path, &patch);
        let mut keys: Vec<String> = leaves.iter().map(|k| k.to_string()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "twin:/attributes/empty",
                "twin:/attributes/name",
                "twin:/attributes/position/x",
                "twin:/attributes/position/y",
                "twin:/attributes/tags",
            ]
        );
    }

    #[test]
    fn test_applicability() {
        let authorizer = authorizer(EnforcementConfig::default());
        let live_modify = command(
            "/attributes",
            CommandKind::Modify { value: json!({}) },
            headers().with_channel(Channel::Live),
        );
        assert!(!authorizer.is_applicable(&live_modify));

        let live_query = command(
            "/",
            CommandKind::Retrieve,
            headers().with_channel(Channel::Live),
        );
        assert!(authorizer.is_applicable(&live_query));
    }
}

//! The per-entity enforcer actor.
//!
//! One task per entity id, fed by a bounded mailbox. Permission math is
//! synchronous and runs inline; the two resolver calls are the only
//! suspension points and run as spawned continuations that answer the
//! requester directly and post internal messages back to the mailbox
//! (`EnforcerLoaded` to populate the cache, `Stop` to fail-stop). The
//! mailbox therefore keeps draining while loads are in flight, and
//! concurrent requests for the same entity complete in load-completion
//! order, not arrival order.
//!
//! Failure policy: a load failure on the command path answers the
//! requester with a wrapped internal error and stops the actor; the
//! supervisor recreates the unit and redelivers. On the response path the
//! same failure only logs and drops the response; failing to filter a
//! response is less catastrophic than failing to authorize a command, but
//! forwarding unfiltered is never an option.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use twinhive_model::{DomainError, EntityId, PolicyId, TwinCommand, TwinResponse};
use twinhive_policy::PolicyEnforcer;

use crate::authorize::{AuthorizationOutcome, CommandAuthorizer};
use crate::error::EnforcementError;
use crate::events::{ClusterEvent, ClusterEvents, PolicyChangeTag};
use crate::loader::{PolicyEnforcerResolver, PolicyIdResolver, ResolveError};

/// Shared dependencies of every enforcement unit.
#[derive(Clone)]
pub struct EnforcerDeps {
    pub authorizer: Arc<CommandAuthorizer>,
    pub id_resolver: Arc<dyn PolicyIdResolver>,
    pub enforcer_resolver: Arc<dyn PolicyEnforcerResolver>,
    pub events: ClusterEvents,
}

enum Protocol {
    Authorize {
        command: TwinCommand,
        reply: oneshot::Sender<Result<AuthorizationOutcome, EnforcementError>>,
    },
    Filter {
        response: TwinResponse,
        reply: oneshot::Sender<Result<TwinResponse, EnforcementError>>,
    },
    /// Continuation result: a freshly loaded enforcer for caching.
    EnforcerLoaded { enforcer: PolicyEnforcer },
    /// Continuation result: fail-stop after a command-path load failure.
    Stop { reason: String },
}

/// Handle to one per-entity enforcement unit.
#[derive(Clone)]
pub struct EnforcerHandle {
    tx: mpsc::Sender<Protocol>,
}

impl EnforcerHandle {
    /// Authorize a command; the reply arrives when this request's own
    /// continuation completes, independent of other in-flight requests.
    pub async fn authorize(
        &self,
        command: TwinCommand,
    ) -> Result<AuthorizationOutcome, EnforcementError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Protocol::Authorize { command, reply })
            .await
            .map_err(|_| EnforcementError::UnitTerminated)?;
        rx.await.map_err(|_| EnforcementError::UnitTerminated)?
    }

    /// Filter a response before it is forwarded.
    pub async fn filter_response(
        &self,
        response: TwinResponse,
    ) -> Result<TwinResponse, EnforcementError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Protocol::Filter { response, reply })
            .await
            .map_err(|_| EnforcementError::UnitTerminated)?;
        rx.await.map_err(|_| EnforcementError::UnitTerminated)?
    }

    /// Whether the unit has stopped (its mailbox is closed).
    pub fn is_terminated(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn an enforcement unit for one entity and return its handle.
pub fn spawn_enforcer_actor(
    entity_id: EntityId,
    deps: EnforcerDeps,
    mailbox_capacity: usize,
) -> EnforcerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let events_rx = deps.events.subscribe();
    let actor = EnforcerActor {
        entity_id,
        deps,
        // weak, so the unit stops once every external handle is gone
        self_tx: tx.downgrade(),
        cached: None,
        bound_policy_id: None,
    };
    tokio::spawn(actor.run(rx, events_rx));
    EnforcerHandle { tx }
}

struct EnforcerActor {
    entity_id: EntityId,
    deps: EnforcerDeps,
    /// Used by continuations to post internal messages back.
    self_tx: mpsc::WeakSender<Protocol>,
    /// The current (possibly invalidated) enforcer snapshot.
    cached: Option<PolicyEnforcer>,
    /// The policy id this unit was last bound to. Survives invalidation
    /// so a later "policy gone" load can be told apart from "never had a
    /// policy".
    bound_policy_id: Option<PolicyId>,
}

impl EnforcerActor {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Protocol>,
        mut events_rx: broadcast::Receiver<ClusterEvent>,
    ) {
        debug!(entity_id = %self.entity_id, "Enforcement unit started");
        loop {
            tokio::select! {
                message = rx.recv() => {
                    match message {
                        Some(Protocol::Authorize { command, reply }) => {
                            self.handle_authorize(command, reply);
                        }
                        Some(Protocol::Filter { response, reply }) => {
                            self.handle_filter(response, reply);
                        }
                        Some(Protocol::EnforcerLoaded { enforcer }) => {
                            self.handle_loaded(enforcer);
                        }
                        Some(Protocol::Stop { reason }) => {
                            error!(
                                entity_id = %self.entity_id,
                                reason = %reason,
                                "Failed to load policy enforcer; stopping enforcement unit"
                            );
                            break;
                        }
                        None => break,
                    }
                }
                event = events_rx.recv() => {
                    match event {
                        Ok(ClusterEvent::PolicyModified(tag)) => self.handle_policy_modified(tag),
                        Ok(ClusterEvent::NamespaceBlocklistChanged { namespaces }) => {
                            // informational at this layer
                            if namespaces.len() > 25 {
                                info!(count = namespaces.len(), "Namespace blocklist changed");
                            } else {
                                info!(namespaces = ?namespaces, "Namespace blocklist changed");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // invalidations may have been missed
                            warn!(
                                entity_id = %self.entity_id,
                                skipped,
                                "Cluster event stream lagged; dropping cached enforcer"
                            );
                            self.cached = None;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!(entity_id = %self.entity_id, "Cluster event stream closed");
                        }
                    }
                }
            }
        }
        debug!(entity_id = %self.entity_id, "Enforcement unit stopped");
    }

    fn handle_authorize(
        &self,
        command: TwinCommand,
        reply: oneshot::Sender<Result<AuthorizationOutcome, EnforcementError>>,
    ) {
        let authorizer = &self.deps.authorizer;
        if !authorizer.is_applicable(&command) {
            warn!(
                entity_id = %self.entity_id,
                signal_type = command.signal_type(),
                "Received signal not governed by twin enforcement"
            );
            let _ = reply.send(Err(EnforcementError::NotApplicable));
            return;
        }

        // load-free short circuits decide without any policy lookup
        if let Some(outcome) = authorizer.pre_authorize(&command) {
            let _ = reply.send(outcome.map_err(EnforcementError::from));
            return;
        }

        if let Some(policy_enforcer) = self.cached.clone() {
            let result = authorizer
                .authorize_command(&command, &policy_enforcer)
                .map_err(EnforcementError::from);
            Self::log_enforcement_outcome(&command, &result);
            let _ = reply.send(result);
            return;
        }

        // cache miss: resolve asynchronously while the mailbox keeps
        // draining; the continuation answers the requester itself
        let authorizer = Arc::clone(authorizer);
        let id_resolver = Arc::clone(&self.deps.id_resolver);
        let enforcer_resolver = Arc::clone(&self.deps.enforcer_resolver);
        let self_tx = self.self_tx.clone();
        let entity_id = self.entity_id.clone();
        let previously_bound = self.bound_policy_id.clone();

        tokio::spawn(async move {
            match load_policy_enforcer(&id_resolver, &enforcer_resolver, &entity_id).await {
                Ok(Some(policy_enforcer)) => {
                    if let Some(tx) = self_tx.upgrade() {
                        let _ = tx
                            .send(Protocol::EnforcerLoaded {
                                enforcer: policy_enforcer.clone(),
                            })
                            .await;
                    }
                    let result = authorizer
                        .authorize_command(&command, &policy_enforcer)
                        .map_err(EnforcementError::from);
                    Self::log_enforcement_outcome(&command, &result);
                    let _ = reply.send(result);
                }
                Ok(None) => {
                    let error = match previously_bound {
                        Some(policy_id) => {
                            authorizer.error_for_deleted_policy(&command, &policy_id)
                        }
                        None => authorizer.authorize_with_missing_enforcer(&command),
                    };
                    info!(
                        entity_id = %entity_id,
                        correlation_id = %command.headers.correlation_id,
                        code = error.code(),
                        "No policy enforcer available for entity"
                    );
                    let _ = reply.send(Err(error.into()));
                }
                Err(resolve_error) => {
                    // the requester is answered before the unit stops;
                    // the cause stays in the server-side logs
                    let internal = DomainError::internal(resolve_error.to_string());
                    let _ = reply.send(Err(internal.into()));
                    if let Some(tx) = self_tx.upgrade() {
                        let _ = tx
                            .send(Protocol::Stop {
                                reason: resolve_error.to_string(),
                            })
                            .await;
                    }
                }
            }
        });
    }

    fn handle_filter(
        &self,
        response: TwinResponse,
        reply: oneshot::Sender<Result<TwinResponse, EnforcementError>>,
    ) {
        let authorizer = &self.deps.authorizer;
        if !authorizer.response_is_applicable(&response) {
            let _ = reply.send(Err(EnforcementError::NotApplicable));
            return;
        }
        if !authorizer.should_filter_response(&response) {
            // no filtering required for non-query responses
            let _ = reply.send(Ok(response));
            return;
        }

        if let Some(policy_enforcer) = self.cached.clone() {
            let _ = reply.send(Self::filter_with(authorizer, response, &policy_enforcer));
            return;
        }

        let authorizer = Arc::clone(authorizer);
        let id_resolver = Arc::clone(&self.deps.id_resolver);
        let enforcer_resolver = Arc::clone(&self.deps.enforcer_resolver);
        let self_tx = self.self_tx.clone();
        let entity_id = self.entity_id.clone();

        tokio::spawn(async move {
            match load_policy_enforcer(&id_resolver, &enforcer_resolver, &entity_id).await {
                Ok(Some(policy_enforcer)) => {
                    if let Some(tx) = self_tx.upgrade() {
                        let _ = tx
                            .send(Protocol::EnforcerLoaded {
                                enforcer: policy_enforcer.clone(),
                            })
                            .await;
                    }
                    let _ = reply.send(Self::filter_with(&authorizer, response, &policy_enforcer));
                }
                Ok(None) => {
                    error!(
                        entity_id = %entity_id,
                        correlation_id = %response.headers.correlation_id,
                        "Could not filter response because the policy enforcer was missing"
                    );
                    let _ = reply.send(Err(EnforcementError::ResponseDropped));
                }
                Err(resolve_error) => {
                    // best-effort degrade: drop the response, keep running
                    error!(
                        entity_id = %entity_id,
                        correlation_id = %response.headers.correlation_id,
                        error = %resolve_error,
                        "Could not load policy enforcer for response filtering; dropping response"
                    );
                    let _ = reply.send(Err(EnforcementError::ResponseDropped));
                }
            }
        });
    }

    fn filter_with(
        authorizer: &CommandAuthorizer,
        response: TwinResponse,
        policy_enforcer: &PolicyEnforcer,
    ) -> Result<TwinResponse, EnforcementError> {
        match authorizer.filter_response(response, policy_enforcer) {
            Ok(filtered) => {
                info!(
                    entity_id = %filtered.entity_id,
                    correlation_id = %filtered.headers.correlation_id,
                    signal_type = filtered.signal_type(),
                    "Completed filtering of response"
                );
                Ok(filtered)
            }
            Err(domain_error) => {
                error!(
                    code = domain_error.code(),
                    "Error while filtering response; dropping it"
                );
                Err(EnforcementError::ResponseDropped)
            }
        }
    }

    /// Accept a continuation's loaded enforcer into the cache. A stale
    /// load never replaces a newer snapshot: once a newer revision is
    /// confirmed, older ones are discarded.
    fn handle_loaded(&mut self, enforcer: PolicyEnforcer) {
        let stale = self.cached.as_ref().is_some_and(|cached| {
            cached.policy_id() == enforcer.policy_id() && cached.revision() > enforcer.revision()
        });
        if stale {
            debug!(
                entity_id = %self.entity_id,
                policy_id = %enforcer.policy_id(),
                revision = enforcer.revision(),
                "Discarding stale policy enforcer load"
            );
            return;
        }
        debug!(
            entity_id = %self.entity_id,
            policy_id = %enforcer.policy_id(),
            revision = enforcer.revision(),
            "Caching policy enforcer"
        );
        self.bound_policy_id = Some(enforcer.policy_id().clone());
        self.cached = Some(enforcer);
    }

    /// Invalidate the cached enforcer when the broadcast names the policy
    /// this unit is bound to and carries a newer revision; the next
    /// request then forces a fresh load.
    fn handle_policy_modified(&mut self, tag: PolicyChangeTag) {
        let bound = match &self.bound_policy_id {
            Some(policy_id) if *policy_id == tag.policy_id => policy_id.clone(),
            _ => return,
        };
        let newer = self
            .cached
            .as_ref()
            .is_none_or(|cached| tag.revision > cached.revision());
        if newer {
            info!(
                entity_id = %self.entity_id,
                policy_id = %bound,
                revision = tag.revision,
                "Bound policy changed; invalidating cached enforcer"
            );
            self.cached = None;
        }
    }

    fn log_enforcement_outcome(
        command: &TwinCommand,
        result: &Result<AuthorizationOutcome, EnforcementError>,
    ) {
        match result {
            Ok(_) => info!(
                entity_id = %command.entity_id,
                correlation_id = %command.headers.correlation_id,
                signal_type = command.signal_type(),
                "Completed enforcement with outcome 'success'"
            ),
            Err(error) => info!(
                entity_id = %command.entity_id,
                correlation_id = %command.headers.correlation_id,
                signal_type = command.signal_type(),
                error = %error,
                "Completed enforcement with outcome 'failed'"
            ),
        }
    }
}

async fn load_policy_enforcer(
    id_resolver: &Arc<dyn PolicyIdResolver>,
    enforcer_resolver: &Arc<dyn PolicyEnforcerResolver>,
    entity_id: &EntityId,
) -> Result<Option<PolicyEnforcer>, ResolveError> {
    let policy_id = id_resolver.policy_id_for(entity_id).await?;
    enforcer_resolver.policy_enforcer_for(&policy_id).await
}

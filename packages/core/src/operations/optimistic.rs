//! Optimistic Operation Manager
//!
//! Wraps a local mutation plus an asynchronous persistence call: the
//! mutation is applied synchronously (the UI sees it immediately), a
//! pre-mutation snapshot is captured, and the persistence call is launched
//! detached - the caller never waits for it. If persistence later rejects,
//! the snapshot is restored and exactly one `error:persistence-failed`
//! envelope is published through the hub.
//!
//! Apply-time failures are different: they propagate synchronously to the
//! caller and the persist future is dropped un-polled, so the backend is
//! never contacted.
//!
//! Persistence calls from different operations may overlap and complete out
//! of order; they are not serialized. Each rollback restores only the slice
//! it snapshotted, and when two overlapping rollbacks touch the same state
//! the one physically applied last wins - an accepted race of the
//! fire-and-forget model.

use crate::operations::error::TreeError;
use crate::persistence::PersistenceError;
use crate::store::{
    AffectedOperation, DocumentContext, DomainEvent, EventEnvelope, FailureReason,
    PersistenceFailureEvent, StoreSnapshot,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Options for a single optimistic operation
#[derive(Debug, Clone)]
pub struct OperationOptions {
    /// Human-readable description, used in aggregated error messages
    pub description: String,
    /// Node ids for snapshot capture and error attribution. Include the
    /// structural anchors (parent, sibling) so their lists are snapshotted.
    pub affected_nodes: Vec<String>,
    /// Whether node *content* joins the rollback snapshot in addition to
    /// structural edges (which are always snapshotted)
    pub snapshot_data: bool,
}

impl OperationOptions {
    pub fn new(description: impl Into<String>, affected_nodes: Vec<String>) -> Self {
        Self {
            description: description.into(),
            affected_nodes,
            snapshot_data: false,
        }
    }

    /// Also capture node records for rollback
    pub fn with_snapshot_data(mut self) -> Self {
        self.snapshot_data = true;
        self
    }
}

/// Terminal state of an operation's detached persistence task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceOutcome {
    /// The backend accepted the write; the snapshot was discarded
    Persisted,
    /// The backend rejected the write; local state was rolled back
    RolledBack {
        reason: FailureReason,
        can_retry: bool,
    },
}

/// Result of a successfully applied optimistic operation.
///
/// `value` is available immediately; `persistence` resolves when the
/// detached backend call settles. The task runs to completion whether or
/// not the handle is awaited - joining it is for tests and shutdown paths.
pub struct StructuralChange<T> {
    pub value: T,
    pub persistence: JoinHandle<PersistenceOutcome>,
}

type BoxedApply = Box<dyn FnOnce() -> Result<(), TreeError> + Send>;
type BoxedPersist = Pin<Box<dyn Future<Output = Result<(), PersistenceError>> + Send>>;

/// One member of a batch: local mutation, backend call, and attribution
pub struct BatchOperation {
    pub apply: BoxedApply,
    pub persist: BoxedPersist,
    pub description: String,
    pub affected_nodes: Vec<String>,
}

impl BatchOperation {
    pub fn new(
        apply: impl FnOnce() -> Result<(), TreeError> + Send + 'static,
        persist: impl Future<Output = Result<(), PersistenceError>> + Send + 'static,
        description: impl Into<String>,
        affected_nodes: Vec<String>,
    ) -> Self {
        Self {
            apply: Box::new(apply),
            persist: Box::pin(persist),
            description: description.into(),
            affected_nodes,
        }
    }
}

/// Coordinates snapshot / apply / detached persist / rollback
pub struct OptimisticOperationManager {
    context: Arc<DocumentContext>,
}

impl OptimisticOperationManager {
    pub fn new(context: Arc<DocumentContext>) -> Self {
        Self { context }
    }

    /// Execute one optimistic structural change.
    ///
    /// Sequence: snapshot, synchronous `apply`, immediate return, detached
    /// `persist`. An `apply` error propagates without the persist future
    /// ever being polled. A `persist` rejection restores the snapshot and
    /// publishes one persistence-failed envelope.
    pub fn execute_structural_change<T, A, P>(
        &self,
        apply: A,
        persist: P,
        options: OperationOptions,
    ) -> Result<StructuralChange<T>, TreeError>
    where
        A: FnOnce() -> Result<T, TreeError>,
        P: Future<Output = Result<(), PersistenceError>> + Send + 'static,
    {
        let snapshot = StoreSnapshot::capture(
            &self.context,
            &options.affected_nodes,
            options.snapshot_data,
        );

        // Nothing committed yet on failure, so nothing to restore; the
        // un-polled persist future is dropped and the backend never sees it
        let value = apply()?;

        let context = self.context.clone();
        let persistence = tokio::spawn(async move {
            match persist.await {
                Ok(()) => {
                    debug!(operation = %options.description, "persisted");
                    PersistenceOutcome::Persisted
                }
                Err(error) => {
                    let message = error.to_string();
                    let reason = FailureReason::classify(&message);
                    warn!(
                        operation = %options.description,
                        %message,
                        ?reason,
                        "persistence failed, rolling back"
                    );
                    snapshot.restore(&context);
                    context
                        .hub
                        .publish(&EventEnvelope::error(DomainEvent::PersistenceFailed(
                            PersistenceFailureEvent {
                                message: format!("{}: {}", options.description, message),
                                failed_node_ids: options.affected_nodes.clone(),
                                failure_reason: reason,
                                can_retry: reason.can_retry(),
                                affected_operations: vec![AffectedOperation {
                                    operation: options.description.clone(),
                                    node_ids: options.affected_nodes,
                                    error: message,
                                }],
                            },
                        )));
                    PersistenceOutcome::RolledBack {
                        reason,
                        can_retry: reason.can_retry(),
                    }
                }
            }
        });

        Ok(StructuralChange { value, persistence })
    }

    /// Execute several operations as one optimistic unit.
    ///
    /// All `apply` closures run synchronously up front so the UI reflects
    /// the whole batch together; then every `persist` is launched
    /// concurrently. If any apply fails, the batch snapshot is restored and
    /// the error returned - no persist fires. If any persist rejects, the
    /// whole batch rolls back and exactly one aggregated error envelope is
    /// published, with operations and node ids concatenated in call order
    /// and descriptions joined with `", "`.
    pub fn execute_batch(
        &self,
        operations: Vec<BatchOperation>,
    ) -> Result<StructuralChange<()>, TreeError> {
        let all_affected: Vec<String> = operations
            .iter()
            .flat_map(|op| op.affected_nodes.iter().cloned())
            .collect();
        let snapshot = StoreSnapshot::capture(&self.context, &all_affected, false);

        let mut persists = Vec::with_capacity(operations.len());
        let mut metas = Vec::with_capacity(operations.len());
        for operation in operations {
            if let Err(error) = (operation.apply)() {
                warn!(
                    operation = %operation.description,
                    %error,
                    "batch apply failed, restoring already-applied members"
                );
                snapshot.restore(&self.context);
                return Err(error);
            }
            persists.push(operation.persist);
            metas.push((operation.description, operation.affected_nodes));
        }

        let context = self.context.clone();
        let persistence = tokio::spawn(async move {
            // Launch all persists concurrently; they may settle out of order
            let handles: Vec<JoinHandle<Result<(), PersistenceError>>> =
                persists.into_iter().map(tokio::spawn).collect();

            let mut failures: Vec<(usize, String)> = Vec::new();
            for (index, handle) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => failures.push((index, error.to_string())),
                    Err(join_error) => failures.push((index, join_error.to_string())),
                }
            }

            if failures.is_empty() {
                return PersistenceOutcome::Persisted;
            }

            let reason = FailureReason::classify(&failures[0].1);
            warn!(
                failed = failures.len(),
                total = metas.len(),
                ?reason,
                "batch persistence failed, rolling back all operations"
            );
            snapshot.restore(&context);

            let descriptions: Vec<&str> =
                metas.iter().map(|(description, _)| description.as_str()).collect();
            let affected_operations: Vec<AffectedOperation> = metas
                .iter()
                .enumerate()
                .map(|(index, (description, node_ids))| AffectedOperation {
                    operation: description.clone(),
                    node_ids: node_ids.clone(),
                    error: failures
                        .iter()
                        .find(|(failed, _)| *failed == index)
                        .map(|(_, error)| error.clone())
                        .unwrap_or_else(|| "rolled back with batch".to_string()),
                })
                .collect();
            let failed_node_ids: Vec<String> = metas
                .iter()
                .flat_map(|(_, node_ids)| node_ids.iter().cloned())
                .collect();

            context
                .hub
                .publish(&EventEnvelope::error(DomainEvent::PersistenceFailed(
                    PersistenceFailureEvent {
                        message: format!("Failed to persist: {}", descriptions.join(", ")),
                        failed_node_ids,
                        failure_reason: reason,
                        can_retry: reason.can_retry(),
                        affected_operations,
                    },
                )));

            PersistenceOutcome::RolledBack {
                reason,
                can_retry: reason.can_retry(),
            }
        });

        Ok(StructuralChange {
            value: (),
            persistence,
        })
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use jam_core::ServiceError;
use task::TaskReporter;

use crate::model::Association;
use crate::store::CollectionStore;

/// Tunables for the bulk executors.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Pause between two deletions so pollers can watch progress move.
    /// Zero disables it.
    pub delete_delay: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            delete_delay: Duration::from_millis(10),
        }
    }
}

/// One bulk request, as accepted by the actions routes.
#[derive(Debug, Clone)]
pub enum BulkOp {
    /// Copy every company of `source` into `destination`.
    TransferCollection { source: Uuid, destination: Uuid },
    /// Copy the listed companies into `destination`.
    TransferSelection {
        company_ids: Vec<i64>,
        destination: Uuid,
    },
    /// Empty `collection`.
    DeleteContents { collection: Uuid },
    /// Remove the listed companies from `collection`.
    DeleteSelection {
        collection: Uuid,
        company_ids: Vec<i64>,
    },
}

impl BulkOp {
    /// Short name used in task logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BulkOp::TransferCollection { .. } => "collections.transfer_collection",
            BulkOp::TransferSelection { .. } => "collections.transfer_selection",
            BulkOp::DeleteContents { .. } => "collections.delete_contents",
            BulkOp::DeleteSelection { .. } => "collections.delete_selection",
        }
    }
}

/// A single committed mutation.
#[derive(Debug, Clone, Copy)]
enum Step {
    Insert { company_id: i64, collection_id: Uuid },
    Delete { association_id: i64 },
}

/// Unit of work computed before any mutation happens.
struct Plan {
    steps: Vec<Step>,
    running: &'static str,
    done: &'static str,
    delay: Duration,
}

/// Runs bulk operations against the association store, one item per
/// transaction, reporting progress after every commit.
#[derive(Clone)]
pub struct BulkExecutor {
    store: Arc<CollectionStore>,
    config: BulkConfig,
}

impl BulkExecutor {
    pub fn new(store: Arc<CollectionStore>, config: BulkConfig) -> Self {
        Self { store, config }
    }

    /// Execute `op` for the task behind `reporter`.
    ///
    /// Returns the completion detail. An error stops the loop; items already
    /// committed stay, and the reporter's progress tells how many.
    pub async fn run(&self, op: BulkOp, reporter: TaskReporter) -> Result<String, ServiceError> {
        let plan = self.plan(op).await?;
        let total = plan.steps.len() as u64;
        reporter.start(total, plan.running)?;
        debug!(task_id = reporter.id(), total, "bulk plan ready");

        for (i, step) in plan.steps.into_iter().enumerate() {
            if i > 0 && !plan.delay.is_zero() {
                tokio::time::sleep(plan.delay).await;
            }
            self.store.run_blocking(move |store| apply(store, step)).await?;
            reporter.advance(i as u64 + 1)?;
        }

        Ok(plan.done.to_string())
    }

    async fn plan(&self, op: BulkOp) -> Result<Plan, ServiceError> {
        let delete_delay = self.config.delete_delay;
        self.store.run_blocking(move |store| match op {
            BulkOp::TransferCollection {
                source,
                destination,
            } => {
                require_collection(store, destination)?;
                let source_ids = store.company_ids_in(source)?;
                Ok(Plan {
                    steps: transfer_steps(store, source_ids, destination)?,
                    running: "In progress...",
                    done: "Transfer complete.",
                    delay: Duration::ZERO,
                })
            }
            BulkOp::TransferSelection {
                company_ids,
                destination,
            } => {
                require_collection(store, destination)?;
                Ok(Plan {
                    steps: transfer_steps(store, company_ids.into_iter().collect(), destination)?,
                    running: "Transferring selected companies...",
                    done: "Selective transfer complete.",
                    delay: Duration::ZERO,
                })
            }
            BulkOp::DeleteContents { collection } => Ok(Plan {
                steps: delete_steps(store.associations_in(collection)?),
                running: "Deleting companies from collection...",
                done: "Bulk delete complete.",
                delay: delete_delay,
            }),
            BulkOp::DeleteSelection {
                collection,
                company_ids,
            } => Ok(Plan {
                steps: delete_steps(store.associations_matching(collection, &company_ids)?),
                running: "Removing selected companies...",
                done: "Selective remove complete.",
                delay: delete_delay,
            }),
        })
        .await
    }
}

/// Inserts need an existing destination. Sources and delete targets do not:
/// an unknown one reads as empty.
fn require_collection(store: &CollectionStore, id: Uuid) -> Result<(), ServiceError> {
    match store.get_collection(id)? {
        Some(_) => Ok(()),
        None => Err(ServiceError::NotFound("Collection not found".into())),
    }
}

/// `source − destination`, ascending by company id.
fn transfer_steps(
    store: &CollectionStore,
    source: BTreeSet<i64>,
    destination: Uuid,
) -> Result<Vec<Step>, ServiceError> {
    let existing = store.company_ids_in(destination)?;
    Ok(source
        .difference(&existing)
        .map(|&company_id| Step::Insert {
            company_id,
            collection_id: destination,
        })
        .collect())
}

fn delete_steps(rows: Vec<Association>) -> Vec<Step> {
    rows.into_iter()
        .map(|a| Step::Delete {
            association_id: a.id,
        })
        .collect()
}

fn apply(store: &CollectionStore, step: Step) -> Result<(), ServiceError> {
    match step {
        Step::Insert {
            company_id,
            collection_id,
        } => store.add_association(company_id, collection_id),
        Step::Delete { association_id } => store.delete_association(association_id),
    }
}

//! Sync client - optimistic persistence of ledger mutations.
//!
//! The session applies every mutation locally first and then hands a
//! [`SyncCommand`] to this client. Commands run on one background worker task
//! in the order they were submitted, each bounded by a timeout. Outcomes come
//! back over a channel and are folded into per-entity status only when the
//! owner calls [`SyncClient::poll`] or [`SyncClient::settle`], so the ledger
//! state is never touched from the worker.
//!
//! Every command is tagged with the tenant generation it was issued under.
//! Outcomes from an older generation are dropped: a response that arrives
//! after a tenant switch can no longer affect the new tenant.

use crate::{
    backend::{Backend, CategoryRecord, CategoryUpdate, ExpenseUpdate, NewExpense},
    core::notify::Notification,
    errors::{Error, Result},
};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// One persistence call, mapped 1:1 onto a backend endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    /// `POST /add_category` with the full record
    CreateCategory(CategoryRecord),
    /// `PUT /update_category/{id}`
    UpdateCategory { id: String, update: CategoryUpdate },
    /// `DELETE /delete_category/{id}`; the backend cascades the expenses
    DeleteCategory { id: String },
    /// `POST /add_expense`
    AddExpense(NewExpense),
    /// `PUT /update_expense/{id}`
    UpdateExpense { id: String, update: ExpenseUpdate },
    /// `DELETE /delete_expense/{id}`
    DeleteExpense { id: String },
    /// `POST /update_salary`
    UpdateSalary { amount: f64 },
}

/// The entity a command affects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    /// A category, by id
    Category(String),
    /// An expense, by id
    Expense(String),
    /// The tenant's single salary value
    Salary,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(id) => write!(f, "category {id}"),
            Self::Expense(id) => write!(f, "expense {id}"),
            Self::Salary => f.write_str("salary"),
        }
    }
}

/// Persistence state of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Applied locally, not yet acknowledged by the backend
    Pending,
    /// The backend acknowledged the latest change
    Confirmed,
    /// A change failed; local state is ahead of the backend until retried or reloaded
    Failed {
        /// Last error reported for this entity
        error: String,
    },
}

impl SyncCommand {
    /// Which entity this command writes.
    #[must_use]
    pub fn entity(&self) -> EntityKey {
        match self {
            Self::CreateCategory(record) => EntityKey::Category(record.id.clone()),
            Self::UpdateCategory { id, .. } | Self::DeleteCategory { id } => {
                EntityKey::Category(id.clone())
            }
            Self::AddExpense(expense) => EntityKey::Expense(expense.id.clone()),
            Self::UpdateExpense { id, .. } | Self::DeleteExpense { id } => {
                EntityKey::Expense(id.clone())
            }
            Self::UpdateSalary { .. } => EntityKey::Salary,
        }
    }

    /// Short human-readable description used in logs and notifications.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CreateCategory(_) => "new category",
            Self::UpdateCategory { .. } => "category changes",
            Self::DeleteCategory { .. } => "category deletion",
            Self::AddExpense(_) => "new expense",
            Self::UpdateExpense { .. } => "expense changes",
            Self::DeleteExpense { .. } => "expense deletion",
            Self::UpdateSalary { .. } => "salary",
        }
    }

    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::DeleteCategory { .. } | Self::DeleteExpense { .. }
        )
    }

    #[must_use]
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::CreateCategory(_) | Self::AddExpense(_))
    }

    async fn execute<B: Backend>(&self, backend: &B) -> Result<()> {
        match self {
            Self::CreateCategory(record) => backend.add_category(record).await,
            Self::UpdateCategory { id, update } => backend.update_category(id, update).await,
            Self::DeleteCategory { id } => backend.delete_category(id).await,
            Self::AddExpense(expense) => backend.add_expense(expense).await,
            Self::UpdateExpense { id, update } => backend.update_expense(id, update).await,
            Self::DeleteExpense { id } => backend.delete_expense(id).await,
            Self::UpdateSalary { amount } => backend.update_salary(*amount).await,
        }
    }
}

#[derive(Debug)]
struct Job {
    seq: u64,
    generation: u64,
    command: SyncCommand,
}

#[derive(Debug)]
enum Message {
    Run(Job),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug)]
struct Outcome {
    seq: u64,
    generation: u64,
    command: SyncCommand,
    result: Result<()>,
}

#[derive(Debug)]
struct Tracked {
    status: SyncStatus,
    latest_seq: u64,
    failed: Vec<(u64, SyncCommand)>,
}

/// Commands that failed for one entity, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEntity {
    pub key: EntityKey,
    pub commands: Vec<SyncCommand>,
}

/// Client side of the persistence worker.
#[derive(Debug)]
pub struct SyncClient {
    sender: mpsc::UnboundedSender<Message>,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
    tracked: HashMap<EntityKey, Tracked>,
    notes: Vec<Notification>,
    next_seq: u64,
    generation: u64,
    in_flight: usize,
}

async fn run_worker<B: Backend>(
    backend: Arc<B>,
    timeout: Duration,
    mut inbox: mpsc::UnboundedReceiver<Message>,
    outbox: mpsc::UnboundedSender<Outcome>,
) {
    while let Some(message) = inbox.recv().await {
        match message {
            Message::Run(job) => {
                trace!(seq = job.seq, command = job.command.label(), "executing");
                let result =
                    match tokio::time::timeout(timeout, job.command.execute(backend.as_ref()))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(Error::network(format!(
                            "saving {} timed out after {timeout:?}",
                            job.command.label()
                        ))),
                    };
                if let Err(e) = &result {
                    warn!(seq = job.seq, command = job.command.label(), error = %e, "persistence failed");
                }
                let outcome = Outcome {
                    seq: job.seq,
                    generation: job.generation,
                    command: job.command,
                    result,
                };
                if outbox.send(outcome).is_err() {
                    break;
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("sync worker stopped");
}

impl SyncClient {
    /// Starts the background worker on the current tokio runtime.
    pub fn spawn<B: Backend>(backend: Arc<B>, timeout: Duration) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let (outbox, outcomes) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(backend, timeout, inbox, outbox));
        Self {
            sender,
            outcomes,
            tracked: HashMap::new(),
            notes: Vec::new(),
            next_seq: 0,
            generation: 0,
            in_flight: 0,
        }
    }

    /// Current tenant generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a new tenant generation and forgets all per-entity status.
    ///
    /// Outcomes of commands issued before this call are discarded when they arrive.
    pub fn begin_generation(&mut self) -> u64 {
        self.generation += 1;
        self.tracked.clear();
        debug!(generation = self.generation, "sync generation started");
        self.generation
    }

    /// Queues a command behind all previously submitted ones and marks its entity pending.
    pub fn submit(&mut self, command: SyncCommand) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let key = command.entity();
        let tracked = self.tracked.entry(key).or_insert(Tracked {
            status: SyncStatus::Pending,
            latest_seq: seq,
            failed: Vec::new(),
        });
        tracked.latest_seq = seq;
        if tracked.failed.is_empty() {
            tracked.status = SyncStatus::Pending;
        }

        let job = Job {
            seq,
            generation: self.generation,
            command,
        };
        match self.sender.send(Message::Run(job)) {
            Ok(()) => self.in_flight += 1,
            Err(mpsc::error::SendError(message)) => {
                if let Message::Run(job) = message {
                    self.record(Outcome {
                        seq: job.seq,
                        generation: job.generation,
                        command: job.command,
                        result: Err(Error::network("sync worker is not running")),
                    });
                }
            }
        }
        seq
    }

    /// Folds every finished outcome into entity status without waiting and
    /// returns the notifications raised since the last call.
    pub fn poll(&mut self) -> Vec<Notification> {
        while let Ok(outcome) = self.outcomes.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            if outcome.generation != self.generation {
                debug!(
                    seq = outcome.seq,
                    generation = outcome.generation,
                    "discarding outcome from previous tenant"
                );
                continue;
            }
            self.record(outcome);
        }
        std::mem::take(&mut self.notes)
    }

    /// Waits until every command submitted so far has run, then polls.
    pub async fn settle(&mut self) -> Vec<Notification> {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Message::Flush(done)).is_ok() {
            let _ = wait.await;
        }
        self.poll()
    }

    fn record(&mut self, outcome: Outcome) {
        let key = outcome.command.entity();
        match outcome.result {
            Ok(()) => {
                let Some(tracked) = self.tracked.get_mut(&key) else {
                    return;
                };
                if tracked.latest_seq != outcome.seq || !tracked.failed.is_empty() {
                    return;
                }
                if outcome.command.is_delete() {
                    self.tracked.remove(&key);
                } else {
                    tracked.status = SyncStatus::Confirmed;
                }
                trace!(%key, seq = outcome.seq, "confirmed");
            }
            Err(error) => {
                self.notes.push(Notification::error(format!(
                    "Could not save {}: {error}",
                    outcome.command.label()
                )));
                if let Some(tracked) = self.tracked.get_mut(&key) {
                    tracked.status = SyncStatus::Failed {
                        error: error.to_string(),
                    };
                    tracked.failed.push((outcome.seq, outcome.command));
                }
            }
        }
    }

    /// Status of one entity; `None` if it was never changed in this generation.
    #[must_use]
    pub fn status(&self, key: &EntityKey) -> Option<&SyncStatus> {
        self.tracked.get(key).map(|t| &t.status)
    }

    /// Entities whose local state is ahead of the backend because a command failed.
    #[must_use]
    pub fn unsynced(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self
            .tracked
            .iter()
            .filter(|(_, t)| matches!(t.status, SyncStatus::Failed { .. }))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of submitted commands whose outcome has not been folded in yet.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Stops tracking an entity, e.g. an expense removed with its category.
    pub fn forget(&mut self, key: &EntityKey) {
        self.tracked.remove(key);
    }

    /// Removes and returns the failed commands of every entity, ordered by the
    /// sequence number of each entity's first failure.
    pub fn take_failed(&mut self) -> Vec<FailedEntity> {
        let mut failed: Vec<(u64, FailedEntity)> = Vec::new();
        for (key, tracked) in &mut self.tracked {
            if tracked.failed.is_empty() {
                continue;
            }
            let mut commands = std::mem::take(&mut tracked.failed);
            commands.sort_by_key(|(seq, _)| *seq);
            let first_seq = commands[0].0;
            tracked.status = SyncStatus::Pending;
            failed.push((
                first_seq,
                FailedEntity {
                    key: key.clone(),
                    commands: commands.into_iter().map(|(_, c)| c).collect(),
                },
            ));
        }
        failed.sort_by_key(|(seq, _)| *seq);
        failed.into_iter().map(|(_, f)| f).collect()
    }
}

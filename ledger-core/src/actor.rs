//! Actor-based concurrency for the ledger
//!
//! Every mutation in the system runs as a unit of work on one writer task:
//! - One logical writer eliminates lost updates and check-then-insert races
//! - Each unit commits as a single RocksDB `WriteBatch` or not at all
//! - Async message passing with backpressure (bounded mailbox)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │      Exchange / TransactionStore / Ledger API         │
//! │           (any number of concurrent callers)          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ LedgerHandle::transact(closure)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │            mpsc::channel (bounded mailbox)            │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (single task)                │
//! │   UnitOfWork::begin → closure → commit | discard      │
//! │                       │                               │
//! │                       ▼                               │
//! │           Storage::write_staged (WriteBatch)          │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{unit::UnitOfWork, Error, Storage};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Work executed by the writer against the store
pub type Job = Box<dyn FnOnce(&Storage) + Send + 'static>;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Run a unit of work
    Execute(Job),

    /// Shutdown actor
    Shutdown,
}

impl std::fmt::Debug for LedgerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerMessage::Execute(_) => f.write_str("Execute(..)"),
            LedgerMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Actor that owns the write path
#[derive(Debug)]
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Units executed so far
    executed: u64,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(storage: Arc<Storage>, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self {
            storage,
            mailbox,
            executed: 0,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Execute(job) => {
                    job(&self.storage);
                    self.executed += 1;
                }
                LedgerMessage::Shutdown => break,
            }
        }

        tracing::info!(units = self.executed, "Ledger writer stopped");
    }
}

/// Handle for sending work to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Run `unit` as one atomic, serialized unit of work.
    ///
    /// The closure stages reads and writes on a fresh [`UnitOfWork`]. If it
    /// returns `Ok`, everything it staged is committed in one batch; if it
    /// returns `Err`, nothing is written and the error is handed back.
    pub async fn transact<T, E, F>(&self, unit: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move |storage: &Storage| {
            let mut uow = UnitOfWork::begin(storage);
            let outcome = match unit(&mut uow) {
                Ok(value) => uow.commit().map(|_| value).map_err(E::from),
                Err(e) => Err(e),
            };
            let _ = tx.send(outcome);
        });

        self.sender
            .send(LedgerMessage::Execute(job))
            .await
            .map_err(|_| E::from(Error::Concurrency("Actor mailbox closed".to_string())))?;

        rx.await
            .map_err(|_| E::from(Error::Concurrency("Response channel closed".to_string())))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(storage: Arc<Storage>, mailbox_capacity: usize) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = LedgerActor::new(storage, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::cf;
    use crate::Config;

    fn test_storage() -> (Arc<Storage>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Arc::new(Storage::open(&config).unwrap()), temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage, 8);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transact_commits_on_ok() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage.clone(), 8);

        let value = handle
            .transact(|uow| {
                uow.put(cf::WALLETS, b"k", &5u64)?;
                Ok::<_, Error>(5u64)
            })
            .await
            .unwrap();

        assert_eq!(value, 5);
        assert_eq!(storage.get::<u64>(cf::WALLETS, b"k").unwrap(), Some(5));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transact_discards_on_err() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage.clone(), 8);

        let result: crate::Result<()> = handle
            .transact(|uow| {
                uow.put(cf::WALLETS, b"k", &5u64)?;
                Err(Error::InvariantViolation("abort".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::InvariantViolation(_))));
        assert_eq!(storage.get::<u64>(cf::WALLETS, b"k").unwrap(), None);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_serialized() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage.clone(), 8);

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .transact(|uow| {
                        let current: u64 = uow.get(cf::WALLETS, b"counter")?.unwrap_or(0);
                        uow.put(cf::WALLETS, b"counter", &(current + 1))?;
                        Ok::<_, Error>(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(storage.get::<u64>(cf::WALLETS, b"counter").unwrap(), Some(50));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transact_after_shutdown_is_concurrency_error() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage, 8);
        handle.shutdown().await.unwrap();

        // Give the actor a chance to drain and drop its receiver
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let result = handle.transact(|_uow| Ok::<_, Error>(())).await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }
}

use agentflow_core::ExecutionContext;
use agentflow_memory::{Memory, MemoryStore};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A memory record that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryWriteFailure {
    pub agent_id: String,
    pub memory_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

struct MemoryJob {
    agent_id: String,
    store: Arc<dyn MemoryStore>,
    memory: Memory,
}

/// Fire-and-forget memory writes served by a fixed worker pool.
///
/// Submitting never blocks and never reports back to the caller. Failed writes
/// (including submissions rejected because the queue is full) are logged and
/// collected for [`MemoryWriter::take_failures`].
pub struct MemoryWriter {
    tx: Mutex<Option<mpsc::Sender<MemoryJob>>>,
    failures_tx: mpsc::Sender<MemoryWriteFailure>,
    failures_rx: Mutex<mpsc::Receiver<MemoryWriteFailure>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryWriter {
    /// Spawn `workers` writer tasks. Must be called inside a Tokio runtime.
    pub fn start(workers: usize, capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel::<MemoryJob>(capacity);
        let (failures_tx, failures_rx) = mpsc::channel(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let failures = failures_tx.clone();
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        write(job, &failures).await;
                    }
                    debug!(worker, "Memory writer worker exited");
                })
            })
            .collect();

        info!(workers = workers.max(1), capacity, "Started memory writer");
        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            failures_tx,
            failures_rx: Mutex::new(failures_rx),
            workers: Mutex::new(handles),
        })
    }

    /// Queue a write. Returns whether the job was accepted.
    pub fn submit(&self, agent_id: &str, store: Arc<dyn MemoryStore>, memory: Memory) -> bool {
        let job = MemoryJob {
            agent_id: agent_id.to_string(),
            store,
            memory,
        };
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            record(&self.failures_tx, &job, "memory writer is stopped".to_string());
            return false;
        };
        match tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                record(&self.failures_tx, &job, "memory writer queue is full".to_string());
                false
            }
            Err(TrySendError::Closed(job)) => {
                record(&self.failures_tx, &job, "memory writer is stopped".to_string());
                false
            }
        }
    }

    /// Drain the failures collected so far.
    pub fn take_failures(&self) -> Vec<MemoryWriteFailure> {
        let mut rx = self.failures_rx.lock();
        let mut out = Vec::new();
        while let Ok(failure) = rx.try_recv() {
            out.push(failure);
        }
        out
    }

    /// Stop accepting jobs and wait up to `timeout` for queued ones to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        self.tx.lock().take();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("Memory writer did not drain before timeout");
        }
    }
}

async fn write(job: MemoryJob, failures: &mpsc::Sender<MemoryWriteFailure>) {
    // Detached from the task: the task may have finished already.
    let ctx = ExecutionContext::background();
    let memory_id = job.memory.id.clone();
    match job.store.store(&ctx, job.memory.clone()).await {
        Ok(()) => debug!(agent_id = %job.agent_id, memory_id = %memory_id, "Stored memory"),
        Err(e) => record(failures, &job, e.to_string()),
    }
}

fn record(failures: &mpsc::Sender<MemoryWriteFailure>, job: &MemoryJob, error: String) {
    warn!(
        agent_id = %job.agent_id,
        memory_id = %job.memory.id,
        error = %error,
        "Memory write failed"
    );
    let failure = MemoryWriteFailure {
        agent_id: job.agent_id.clone(),
        memory_id: job.memory.id.clone(),
        error,
        timestamp: Utc::now(),
    };
    if failures.try_send(failure).is_err() {
        debug!("Memory failure channel full, failure only logged");
    }
}

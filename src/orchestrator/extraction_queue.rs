use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::orchestrator::memory_engine::MemoryEngine;

/// How long a worker waits on an empty queue before shutting down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

enum ExtractionJob {
    Extract { text: String },
    Barrier(oneshot::Sender<()>),
}

struct WorkerHandle {
    generation: u64,
    sender: mpsc::UnboundedSender<ExtractionJob>,
}

type WorkerMap = Arc<Mutex<HashMap<Uuid, WorkerHandle>>>;

/// Runs fact extraction off the response path. Each user gets one worker
/// fed by its own channel, so extraction for a user's turns completes in
/// turn order while different users proceed in parallel. Failures are
/// logged and dropped. Idle workers exit and are respawned on demand.
pub struct ExtractionQueue {
    memory: Arc<MemoryEngine>,
    workers: WorkerMap,
    next_generation: AtomicU64,
    idle_timeout: Duration,
}

impl ExtractionQueue {
    pub fn new(memory: Arc<MemoryEngine>) -> Self {
        Self::with_idle_timeout(memory, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(memory: Arc<MemoryEngine>, idle_timeout: Duration) -> Self {
        Self {
            memory,
            workers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            idle_timeout,
        }
    }

    pub fn enqueue(&self, user_id: Uuid, text: String) {
        self.send(user_id, ExtractionJob::Extract { text });
    }

    /// Resolves once every job queued for `user_id` before this call is done.
    pub async fn flush(&self, user_id: Uuid) {
        let (tx, rx) = oneshot::channel();
        self.send(user_id, ExtractionJob::Barrier(tx));
        let _ = rx.await;
    }

    /// Drops the user's worker. Jobs already queued still run, then the
    /// worker exits.
    pub fn forget(&self, user_id: Uuid) {
        if lock(&self.workers).remove(&user_id).is_some() {
            debug!(%user_id, "Extraction worker released");
        }
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }

    fn send(&self, user_id: Uuid, job: ExtractionJob) {
        let mut workers = lock(&self.workers);

        let job = match workers.get(&user_id) {
            Some(handle) => match handle.sender.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let handle = self.spawn_worker(user_id);
        if handle.sender.send(job).is_err() {
            error!(%user_id, "Extraction worker closed before receiving a job");
        }
        workers.insert(user_id, handle);
    }

    fn spawn_worker(&self, user_id: Uuid) -> WorkerHandle {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ExtractionJob>();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let memory = self.memory.clone();
        let workers = self.workers.clone();
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            info!(%user_id, "Extraction worker started");
            loop {
                let job = match tokio::time::timeout(idle_timeout, receiver.recv()).await {
                    Ok(Some(job)) => job,
                    Ok(None) => break,
                    Err(_) => {
                        // Senders only enqueue while holding the map lock, so an
                        // empty queue checked under it cannot gain a job.
                        let mut map = lock(&workers);
                        if !receiver.is_empty() {
                            continue;
                        }
                        if map
                            .get(&user_id)
                            .is_some_and(|handle| handle.generation == generation)
                        {
                            map.remove(&user_id);
                        }
                        break;
                    }
                };

                match job {
                    ExtractionJob::Extract { text } => {
                        if let Err(e) = memory.extract_and_store(user_id, &text).await {
                            error!(%user_id, "Memory extraction failed: {}", e);
                        }
                    }
                    ExtractionJob::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!(%user_id, "Extraction worker stopped");
        });

        WorkerHandle { generation, sender }
    }
}

fn lock(workers: &WorkerMap) -> MutexGuard<'_, HashMap<Uuid, WorkerHandle>> {
    match workers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

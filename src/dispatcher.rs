//! Correlation-partitioned worker pool in front of the event bus
//!
//! Every event is routed to a worker chosen by hashing its correlation id,
//! so all events of one queue message are handled by one worker, in
//! submission order, while unrelated messages run on other workers. One
//! worker gives strictly sequential processing.

use crate::bus::EventBus;
use crate::error::{Result, TrailError};
use crate::types::BusEvent;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Running dispatch workers
pub struct Dispatcher {
    /// One sender per worker; `None` once shut down
    senders: RwLock<Option<Vec<mpsc::Sender<BusEvent>>>>,

    handles: Mutex<Vec<JoinHandle<()>>>,

    stats: Arc<DispatchStats>,

    workers: usize,
}

/// Counters shared by all workers
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Causal chains dispatched
    pub chains: AtomicU64,

    /// Subscriber failures across all chains
    pub failures: AtomicU64,
}

impl Dispatcher {
    /// Spawn `workers` tasks (at least one), each with a queue of `capacity`
    pub fn spawn(bus: Arc<EventBus>, workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let stats = Arc::new(DispatchStats::default());
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let (tx, mut rx) = mpsc::channel::<BusEvent>(capacity.max(1));
            let bus = bus.clone();
            let stats = stats.clone();

            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let correlation = event.correlation.id.clone();
                    let report = bus.dispatch(event).await;

                    stats.chains.fetch_add(1, Ordering::Relaxed);
                    stats
                        .failures
                        .fetch_add(report.failures.len() as u64, Ordering::Relaxed);

                    tracing::debug!(
                        worker,
                        correlation = %correlation,
                        topics = ?report.topics(),
                        failures = report.failures.len(),
                        "Chain dispatched"
                    );
                }
                tracing::debug!(worker, "Dispatch worker drained");
            }));
            senders.push(tx);
        }

        tracing::info!(workers, capacity, "Dispatcher started");

        Self {
            senders: RwLock::new(Some(senders)),
            handles: Mutex::new(handles),
            stats,
            workers,
        }
    }

    /// Queue an event on its correlation's worker
    ///
    /// Waits when that worker's queue is full.
    pub async fn submit(&self, event: BusEvent) -> Result<()> {
        let sender = {
            let senders = self.senders.read().await;
            let senders = senders
                .as_ref()
                .ok_or_else(|| TrailError::Shutdown("dispatcher stopped".to_string()))?;
            senders[self.partition(&event.correlation.id)].clone()
        };

        sender
            .send(event)
            .await
            .map_err(|_| TrailError::Shutdown("dispatch worker exited".to_string()))
    }

    /// Worker index for a correlation id
    pub fn partition(&self, correlation_id: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        correlation_id.hash(&mut hasher);
        (hasher.finish() % self.workers as u64) as usize
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Stop accepting events, let workers finish what is queued, and wait for them
    pub async fn shutdown(&self) {
        let senders = self.senders.write().await.take();
        drop(senders);

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatch worker panicked");
            }
        }

        tracing::info!(
            chains = self.stats.chains.load(Ordering::Relaxed),
            "Dispatcher stopped"
        );
    }
}

//! Ingestion pipeline assembly and lifecycle

use crate::bus::EventBus;
use crate::config::PipelineConfig;
use crate::dispatcher::Dispatcher;
use crate::dlq::{DlqHandler, MemoryDlqHandler};
use crate::error::Result;
use crate::poller::Poller;
use crate::query::TrailQuery;
use crate::queue::QueueClient;
use crate::registry::{ComponentContext, ComponentRegistry};
use crate::store::TrailStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Poller, dispatcher and bus wired to one queue and one store
pub struct Pipeline {
    bus: Arc<EventBus>,
    dispatcher: Arc<Dispatcher>,
    poller: Poller,
    store: Arc<dyn TrailStore>,
    dlq: Arc<dyn DlqHandler>,
}

impl Pipeline {
    /// Assemble with the default components
    ///
    /// Spawns the dispatch workers, so it must run inside a Tokio runtime.
    pub fn new(queue: Arc<dyn QueueClient>, store: Arc<dyn TrailStore>, config: PipelineConfig) -> Result<Self> {
        Self::with_registry(queue, store, config, &ComponentRegistry::with_defaults())
    }

    /// Assemble with components looked up in `registry`
    pub fn with_registry(
        queue: Arc<dyn QueueClient>,
        store: Arc<dyn TrailStore>,
        config: PipelineConfig,
        registry: &ComponentRegistry,
    ) -> Result<Self> {
        let dlq: Arc<dyn DlqHandler> = Arc::new(MemoryDlqHandler::new(config.dlq_capacity));
        let ctx = ComponentContext {
            queue: queue.clone(),
            store: store.clone(),
            dlq: dlq.clone(),
        };

        let bus = registry
            .build(&config.components, &ctx)?
            .into_iter()
            .fold(EventBus::builder(), |builder, component| builder.subscribe(component))
            .build();
        let bus = Arc::new(bus);

        let dispatcher = Arc::new(Dispatcher::spawn(
            bus.clone(),
            config.workers,
            config.channel_capacity,
        ));
        let poller = Poller::new(queue.clone(), dispatcher.clone(), config.poller()).with_dlq(dlq.clone());

        tracing::info!(
            queue = queue.name(),
            store = store.name(),
            components = ?config.components,
            topics = ?bus.topics(),
            workers = config.workers,
            "Pipeline assembled"
        );

        Ok(Self {
            bus,
            dispatcher,
            poller,
            store,
            dlq,
        })
    }

    /// Poll until `cancel` fires, then drain the dispatcher
    pub async fn run(&self, cancel: CancellationToken) {
        self.poller.poll(cancel).await;
        self.dispatcher.shutdown().await;

        let stats = self.dispatcher.stats();
        tracing::info!(
            chains = stats.chains.load(Ordering::Relaxed),
            failures = stats.failures.load(Ordering::Relaxed),
            "Pipeline stopped"
        );
    }

    /// Read-side service over the same store
    pub fn query(&self) -> TrailQuery {
        TrailQuery::new(self.store.clone())
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn dlq(&self) -> &Arc<dyn DlqHandler> {
        &self.dlq
    }
}

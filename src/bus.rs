//! Topic-keyed event bus
//!
//! Subscribers register their topics once, when the bus is built. A
//! dispatch delivers one event to every subscriber of its topic, then
//! delivers whatever those subscribers emitted, in emission order, until the
//! chain is exhausted. The whole causal chain of one queue message is
//! therefore handled before `dispatch` returns.

use crate::error::{Result, TrailError};
use crate::types::BusEvent;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Upper bound on events processed in one causal chain
pub const DEFAULT_MAX_CHAIN: usize = 64;

/// A pipeline stage that reacts to bus events
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Component name used in logs and dispatch reports
    fn name(&self) -> &str;

    /// Topics this subscriber receives (e.g., `["trail:create"]`)
    fn topics(&self) -> Vec<String>;

    /// Handle one event; follow-up events go through `emitter`
    ///
    /// Emitted events are delivered even if the handler then returns an error.
    async fn handle(&self, event: &BusEvent, emitter: &mut Emitter) -> Result<()>;
}

/// Collects events a subscriber emits while handling another
#[derive(Debug, Default)]
pub struct Emitter {
    pending: Vec<BusEvent>,
}

impl Emitter {
    pub fn emit(&mut self, event: BusEvent) {
        self.pending.push(event);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the emitted events, in emission order
    pub fn into_events(self) -> Vec<BusEvent> {
        self.pending
    }

    fn drain(&mut self) -> std::vec::Drain<'_, BusEvent> {
        self.pending.drain(..)
    }
}

/// Outcome of dispatching one causal chain
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Successful subscriber deliveries
    pub delivered: usize,

    /// Subscriber failures, as `TrailError::Dispatch`
    pub failures: Vec<TrailError>,

    /// Every event processed, in processing order
    pub events: Vec<BusEvent>,

    /// The chain hit `max_chain` and the remainder was dropped
    pub truncated: bool,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty() && !self.truncated
    }

    /// Topics of the processed events, in order
    pub fn topics(&self) -> Vec<String> {
        self.events.iter().map(|e| e.topic()).collect()
    }
}

/// Builder collecting static subscriptions
#[derive(Default)]
pub struct EventBusBuilder {
    subscribers: Vec<Arc<dyn Subscriber>>,
    max_chain: Option<usize>,
}

impl EventBusBuilder {
    /// Register a subscriber for all of its topics
    pub fn subscribe(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn max_chain(mut self, max_chain: usize) -> Self {
        self.max_chain = Some(max_chain);
        self
    }

    pub fn build(self) -> EventBus {
        let mut routes: HashMap<String, Vec<Arc<dyn Subscriber>>> = HashMap::new();

        for subscriber in &self.subscribers {
            let topics = subscriber.topics();
            tracing::info!(
                subscriber = subscriber.name(),
                topics = ?topics,
                "Subscriber registered"
            );
            for topic in topics {
                routes.entry(topic).or_default().push(subscriber.clone());
            }
        }

        EventBus {
            routes,
            subscribers: self.subscribers,
            max_chain: self.max_chain.unwrap_or(DEFAULT_MAX_CHAIN),
        }
    }
}

/// In-process event bus with a fixed subscriber registry
pub struct EventBus {
    /// topic → subscribers, in registration order
    routes: HashMap<String, Vec<Arc<dyn Subscriber>>>,

    subscribers: Vec<Arc<dyn Subscriber>>,

    max_chain: usize,
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Dispatch `event` and every event emitted while handling it
    ///
    /// Never fails as a whole: subscriber errors are logged and collected in
    /// the report, and other subscribers of the same event still receive it.
    pub async fn dispatch(&self, event: BusEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            if report.events.len() >= self.max_chain {
                tracing::error!(
                    correlation = %event.correlation.id,
                    dropped = queue.len() + 1,
                    max_chain = self.max_chain,
                    "Dispatch chain too long, dropping remaining events"
                );
                report.truncated = true;
                break;
            }

            let topic = event.topic();
            let Some(subscribers) = self.routes.get(&topic) else {
                tracing::debug!(topic = %topic, event_id = %event.id, "No subscribers for topic");
                report.events.push(event);
                continue;
            };

            for subscriber in subscribers {
                let mut emitter = Emitter::default();
                match subscriber.handle(&event, &mut emitter).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        tracing::warn!(
                            subscriber = subscriber.name(),
                            topic = %topic,
                            correlation = %event.correlation.id,
                            error = %e,
                            "Subscriber failed"
                        );
                        report.failures.push(TrailError::Dispatch {
                            subscriber: subscriber.name().to_string(),
                            topic: topic.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
                queue.extend(emitter.drain());
            }

            report.events.push(event);
        }

        report
    }

    /// Registered topics, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Names of the subscribers for `topic`, in delivery order
    pub fn subscribers_of(&self, topic: &str) -> Vec<String> {
        self.routes
            .get(topic)
            .map(|subs| subs.iter().map(|s| s.name().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

//! Named bus components, built on demand from shared handles
//!
//! Deployments pick their subscribers by name in `[pipeline] components`;
//! the registry turns those names into running subscribers.

use crate::ack::AckReconciler;
use crate::bus::Subscriber;
use crate::dlq::DlqHandler;
use crate::error::{Result, TrailError};
use crate::queue::QueueClient;
use crate::sink::PersistenceSink;
use crate::store::TrailStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Handles a component constructor may capture
#[derive(Clone)]
pub struct ComponentContext {
    pub queue: Arc<dyn QueueClient>,
    pub store: Arc<dyn TrailStore>,
    pub dlq: Arc<dyn DlqHandler>,
}

type Constructor = Box<dyn Fn(&ComponentContext) -> Result<Arc<dyn Subscriber>> + Send + Sync>;

#[derive(Default)]
pub struct ComponentRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl ComponentRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `persistence` and `ack`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("persistence", |ctx| {
            Ok(Arc::new(PersistenceSink::new(ctx.store.clone())) as Arc<dyn Subscriber>)
        });
        registry.register("ack", |ctx| {
            Ok(Arc::new(AckReconciler::new(ctx.queue.clone()).with_dlq(ctx.dlq.clone())) as Arc<dyn Subscriber>)
        });
        registry
    }

    /// Register (or replace) a constructor under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&ComponentContext) -> Result<Arc<dyn Subscriber>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Build the named components in order
    ///
    /// Fails on an unknown or repeated name before constructing anything.
    pub fn build(&self, names: &[String], ctx: &ComponentContext) -> Result<Vec<Arc<dyn Subscriber>>> {
        let mut seen = HashSet::new();
        for name in names {
            if !self.contains(name) {
                return Err(TrailError::Config(format!(
                    "Unknown component '{}' (known: {})",
                    name,
                    self.names().join(", ")
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(TrailError::Config(format!("Component '{}' listed twice", name)));
            }
        }

        let mut components = Vec::with_capacity(names.len());
        for name in names {
            if let Some(constructor) = self.constructors.get(name) {
                components.push(constructor(ctx)?);
                tracing::debug!(component = %name, "Component built");
            }
        }
        Ok(components)
    }
}

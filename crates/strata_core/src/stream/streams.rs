//! Per-component-type fan-out of published values.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::consumer::{Consumer, Subscription};
use crate::config::StreamConfig;
use crate::ecs::{Component, ComponentId, Egid, GroupId};
use crate::error::{DbError, DbResult};

/// Fan-out of `C` values to every live consumer of `C`.
#[derive(Debug)]
pub struct EntityStream<C> {
    subscriptions: Mutex<Vec<Subscription<C>>>,
    published: AtomicU64,
}

impl<C: Component + Clone> Default for EntityStream<C> {
    fn default() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
        }
    }
}

impl<C: Component + Clone> EntityStream<C> {
    /// Registers a consumer.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] if `capacity` is zero.
    pub fn generate_consumer(
        &self,
        name: impl Into<String>,
        capacity: usize,
        group: Option<GroupId>,
    ) -> DbResult<Consumer<C>> {
        let name = name.into();
        if capacity == 0 {
            return Err(DbError::InvalidConfig(format!(
                "consumer `{name}` needs a capacity of at least 1"
            )));
        }
        let (subscription, consumer) = Subscription::pair(name, capacity, group);
        self.subscriptions.lock().push(subscription);
        tracing::debug!(
            consumer = consumer.name(),
            component = C::NAME,
            capacity,
            group = ?group,
            "stream consumer registered"
        );
        Ok(consumer)
    }

    /// Delivers `value` to every live consumer whose filter accepts `egid`.
    ///
    /// Disposed consumers are unlinked first. Every matching consumer is
    /// offered the value even if an earlier one overflowed.
    ///
    /// # Errors
    ///
    /// The first [`DbError::CapacityExceeded`] raised by a full consumer.
    pub fn publish(&self, value: &C, egid: Egid) -> DbResult<()> {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(Subscription::is_live);
        if subscriptions.is_empty() {
            tracing::trace!(component = C::NAME, %egid, "publish with no consumers");
            return Ok(());
        }

        let mut result = Ok(());
        let mut reached = false;
        for subscription in subscriptions.iter().filter(|s| s.accepts(egid)) {
            reached = true;
            if let Err(err) = subscription.deliver(value, egid) {
                tracing::error!(component = C::NAME, %egid, error = %err, "stream consumer overflow");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        if reached {
            self.published.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::trace!(component = C::NAME, %egid, "publish filtered out by every consumer");
        }
        result
    }

    /// Number of linked consumers, including disposed ones not yet unlinked.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Number of publishes offered to at least one consumer whose filter
    /// accepted them.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

/// Every stream, keyed by component id.
pub struct EntityStreams {
    streams: RwLock<HashMap<ComponentId, Arc<dyn Any + Send + Sync>>>,
    config: StreamConfig,
}

impl Default for EntityStreams {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

impl EntityStreams {
    /// Creates an empty set of streams.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Returns the stream of `C`, creating it on first use.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if another type claimed `C::ID`.
    pub fn get_or_create_stream<C: Component + Clone>(&self) -> DbResult<Arc<EntityStream<C>>> {
        if let Some(stream) = self.streams.read().get(&C::ID) {
            return Self::downcast(Arc::clone(stream));
        }
        let stream = Arc::clone(
            self.streams
                .write()
                .entry(C::ID)
                .or_insert_with(|| {
                    Arc::new(EntityStream::<C>::default()) as Arc<dyn Any + Send + Sync>
                }),
        );
        Self::downcast(stream)
    }

    /// Registers a consumer of every `C` published.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] if `capacity` is zero.
    pub fn generate_consumer<C: Component + Clone>(
        &self,
        name: impl Into<String>,
        capacity: usize,
    ) -> DbResult<Consumer<C>> {
        self.get_or_create_stream::<C>()?
            .generate_consumer(name, capacity, None)
    }

    /// Registers a consumer of `C` values published for entities in `group`.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] if `capacity` is zero.
    pub fn generate_group_consumer<C: Component + Clone>(
        &self,
        name: impl Into<String>,
        group: GroupId,
        capacity: usize,
    ) -> DbResult<Consumer<C>> {
        self.get_or_create_stream::<C>()?
            .generate_consumer(name, capacity, Some(group))
    }

    /// Registers a consumer with the configured default capacity.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] if the default capacity is zero.
    pub fn generate_default_consumer<C: Component + Clone>(
        &self,
        name: impl Into<String>,
    ) -> DbResult<Consumer<C>> {
        self.generate_consumer(name, self.config.default_capacity)
    }

    /// Publishes `value` for `egid` to the consumers of `C`.
    ///
    /// Publishing a type nobody consumes is a no-op.
    ///
    /// # Errors
    ///
    /// [`DbError::CapacityExceeded`] if a consumer is full.
    pub fn publish<C: Component + Clone>(&self, value: &C, egid: Egid) -> DbResult<()> {
        let stream = self.streams.read().get(&C::ID).map(Arc::clone);
        match stream {
            Some(stream) => Self::downcast::<C>(stream)?.publish(value, egid),
            None => {
                tracing::trace!(component = C::NAME, %egid, "publish with no stream");
                Ok(())
            }
        }
    }

    /// Number of consumers linked to the stream of `C`.
    #[must_use]
    pub fn consumer_count<C: Component + Clone>(&self) -> usize {
        self.streams
            .read()
            .get(&C::ID)
            .map(Arc::clone)
            .and_then(|stream| Self::downcast::<C>(stream).ok())
            .map_or(0, |stream| stream.consumer_count())
    }

    /// The configuration the streams were created with.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn downcast<C: Component + Clone>(
        stream: Arc<dyn Any + Send + Sync>,
    ) -> DbResult<Arc<EntityStream<C>>> {
        stream
            .downcast::<EntityStream<C>>()
            .map_err(|_| DbError::ComponentTypeMismatch {
                expected: "another component type",
                found: C::NAME,
            })
    }
}

impl std::fmt::Debug for EntityStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStreams")
            .field("streams", &self.streams.read().len())
            .field("config", &self.config)
            .finish()
    }
}

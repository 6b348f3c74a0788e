//! Subscription fan-out manager.
//!
//! A plugin opts into any of four categories. For discovery categories the
//! manager registers one store-level listener and then replays the store's
//! current snapshot; for tracking categories it registers one per-entity
//! callback for every entity known at activation time and, through the same
//! listener, for every entity discovered afterwards.
//!
//! Listener registration always happens before enumeration, so an entity
//! appearing in between is seen by both paths. The per-entity sets below make
//! the second sighting a no-op.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use offwatch_events::SubscriptionCategory;
use offwatch_id::{ConsumerGroupId, Offset, Partition, TopicName};
use offwatch_store::{HookResult, OffsetStore};
use tracing::debug;

use crate::Handler;

#[derive(Debug, Default)]
struct SubscriptionState {
    consumer_discovery: bool,
    topic_discovery: bool,
    commit_tracking: bool,
    message_tracking: bool,

    /// Store-level new-consumer listener registered.
    consumer_listener: bool,
    /// Store-level new-topic listener registered.
    topic_listener: bool,

    /// Groups already dispatched to `on_consumer_discovered`.
    discovered_consumers: HashSet<ConsumerGroupId>,
    /// Topics already dispatched to `on_topic_discovered`.
    discovered_topics: HashSet<TopicName>,
    /// Groups with a commit callback registered in the store.
    commit_subscriptions: HashSet<ConsumerGroupId>,
    /// Topics with a message callback registered in the store.
    message_subscriptions: HashSet<TopicName>,
}

struct Inner<H> {
    store: Arc<dyn OffsetStore>,
    handler: Arc<H>,
    state: Mutex<SubscriptionState>,
}

/// Fans store notifications out to a [`Handler`], exactly once per event.
///
/// Cloning is cheap and clones share state. Callbacks handed to the store
/// hold only a weak reference, so once every clone is dropped the store's
/// callbacks stop dispatching.
pub struct SubscriptionManager<H: Handler> {
    inner: Arc<Inner<H>>,
}

impl<H: Handler> Clone for SubscriptionManager<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: Handler> SubscriptionManager<H> {
    /// Create a manager with every category inactive.
    pub fn new(store: Arc<dyn OffsetStore>, handler: Arc<H>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                handler,
                state: Mutex::new(SubscriptionState::default()),
            }),
        }
    }

    /// The store this manager subscribes to.
    pub fn store(&self) -> &Arc<dyn OffsetStore> {
        &self.inner.store
    }

    /// The handler events are dispatched to.
    pub fn handler(&self) -> &Arc<H> {
        &self.inner.handler
    }

    /// Dispatch every existing and future consumer group to
    /// [`Handler::on_consumer_discovered`], once per group.
    ///
    /// An error from the hook stops the replay and is returned; groups not
    /// yet dispatched are picked up by the next call.
    pub fn enable_consumer_discovery(&self) -> HookResult {
        let existing = {
            let mut state = self.inner.lock();
            if !state.consumer_discovery {
                state.consumer_discovery = true;
                debug!(category = %SubscriptionCategory::ConsumerDiscovery, "Subscription enabled");
            }
            self.inner.ensure_consumer_listener(&mut state);
            self.inner.store.consumers()
        };

        for group_id in &existing {
            self.inner.handle_new_consumer(group_id)?;
        }
        Ok(())
    }

    /// Dispatch every existing and future topic to
    /// [`Handler::on_topic_discovered`], once per topic.
    pub fn enable_topic_discovery(&self) -> HookResult {
        let existing = {
            let mut state = self.inner.lock();
            if !state.topic_discovery {
                state.topic_discovery = true;
                debug!(category = %SubscriptionCategory::TopicDiscovery, "Subscription enabled");
            }
            self.inner.ensure_topic_listener(&mut state);
            self.inner.store.topics()
        };

        for topic in &existing {
            self.inner.handle_new_topic(topic)?;
        }
        Ok(())
    }

    /// Dispatch commits of every known and future consumer group to
    /// [`Handler::on_commit`].
    pub fn enable_commit_tracking(&self) {
        let mut state = self.inner.lock();
        if state.commit_tracking {
            return;
        }
        state.commit_tracking = true;
        self.inner.ensure_consumer_listener(&mut state);

        for group_id in self.inner.store.consumers() {
            self.inner.subscribe_commits(&mut state, &group_id);
        }
        debug!(
            category = %SubscriptionCategory::CommitTracking,
            groups = state.commit_subscriptions.len(),
            "Subscription enabled"
        );
    }

    /// Dispatch head offset advances of every known and future topic to
    /// [`Handler::on_message`].
    pub fn enable_message_tracking(&self) {
        let mut state = self.inner.lock();
        if state.message_tracking {
            return;
        }
        state.message_tracking = true;
        self.inner.ensure_topic_listener(&mut state);

        for topic in self.inner.store.topics() {
            self.inner.subscribe_messages(&mut state, &topic);
        }
        debug!(
            category = %SubscriptionCategory::MessageTracking,
            topics = state.message_subscriptions.len(),
            "Subscription enabled"
        );
    }

    /// Enable a category by value.
    pub fn enable(&self, category: SubscriptionCategory) -> HookResult {
        match category {
            SubscriptionCategory::ConsumerDiscovery => self.enable_consumer_discovery(),
            SubscriptionCategory::TopicDiscovery => self.enable_topic_discovery(),
            SubscriptionCategory::CommitTracking => {
                self.enable_commit_tracking();
                Ok(())
            }
            SubscriptionCategory::MessageTracking => {
                self.enable_message_tracking();
                Ok(())
            }
        }
    }

    /// Whether a category has been enabled.
    pub fn is_enabled(&self, category: SubscriptionCategory) -> bool {
        let state = self.inner.lock();
        match category {
            SubscriptionCategory::ConsumerDiscovery => state.consumer_discovery,
            SubscriptionCategory::TopicDiscovery => state.topic_discovery,
            SubscriptionCategory::CommitTracking => state.commit_tracking,
            SubscriptionCategory::MessageTracking => state.message_tracking,
        }
    }

    /// Entities covered by a category: dispatched for discovery categories,
    /// registered with the store for tracking categories.
    pub fn subscribed_count(&self, category: SubscriptionCategory) -> usize {
        let state = self.inner.lock();
        match category {
            SubscriptionCategory::ConsumerDiscovery => state.discovered_consumers.len(),
            SubscriptionCategory::TopicDiscovery => state.discovered_topics.len(),
            SubscriptionCategory::CommitTracking => state.commit_subscriptions.len(),
            SubscriptionCategory::MessageTracking => state.message_subscriptions.len(),
        }
    }
}

impl<H: Handler> Inner<H> {
    fn lock(&self) -> MutexGuard<'_, SubscriptionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_consumer_listener(self: &Arc<Self>, state: &mut SubscriptionState) {
        if state.consumer_listener {
            return;
        }
        state.consumer_listener = true;

        let weak: Weak<Self> = Arc::downgrade(self);
        self.store
            .on_new_consumer(Arc::new(move |group_id: &ConsumerGroupId| {
                match weak.upgrade() {
                    Some(inner) => inner.handle_new_consumer(group_id),
                    None => Ok(()),
                }
            }));
        debug!("Registered new-consumer listener");
    }

    fn ensure_topic_listener(self: &Arc<Self>, state: &mut SubscriptionState) {
        if state.topic_listener {
            return;
        }
        state.topic_listener = true;

        let weak: Weak<Self> = Arc::downgrade(self);
        self.store.on_new_topic(Arc::new(move |topic: &TopicName| {
            match weak.upgrade() {
                Some(inner) => inner.handle_new_topic(topic),
                None => Ok(()),
            }
        }));
        debug!("Registered new-topic listener");
    }

    fn subscribe_commits(
        self: &Arc<Self>,
        state: &mut SubscriptionState,
        group_id: &ConsumerGroupId,
    ) {
        if !state.commit_subscriptions.insert(group_id.clone()) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        self.store.on_consumer_commit(
            group_id,
            Arc::new(
                move |group_id: &ConsumerGroupId,
                      topic: &TopicName,
                      partition: Partition,
                      offset: Offset| {
                    match weak.upgrade() {
                        Some(inner) => inner.handler.on_commit(group_id, topic, partition, offset),
                        None => Ok(()),
                    }
                },
            ),
        );
        debug!(group_id = %group_id, "Subscribed to consumer commits");
    }

    fn subscribe_messages(self: &Arc<Self>, state: &mut SubscriptionState, topic: &TopicName) {
        if !state.message_subscriptions.insert(topic.clone()) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        self.store.on_topic_message(
            topic,
            Arc::new(move |topic: &TopicName, partition: Partition, offset: Offset| {
                match weak.upgrade() {
                    Some(inner) => inner.handler.on_message(topic, partition, offset),
                    None => Ok(()),
                }
            }),
        );
        debug!(topic = %topic, "Subscribed to topic messages");
    }

    /// Shared by the store listener and snapshot replay.
    ///
    /// Tracking registration happens under the lock, before the discovery
    /// hook, so nothing the hook triggers can slip past tracking.
    fn handle_new_consumer(self: &Arc<Self>, group_id: &ConsumerGroupId) -> HookResult {
        let dispatch = {
            let mut state = self.lock();
            if state.commit_tracking {
                self.subscribe_commits(&mut state, group_id);
            }
            state.consumer_discovery && state.discovered_consumers.insert(group_id.clone())
        };

        if dispatch {
            self.handler.on_consumer_discovered(group_id)?;
        }
        Ok(())
    }

    fn handle_new_topic(self: &Arc<Self>, topic: &TopicName) -> HookResult {
        let dispatch = {
            let mut state = self.lock();
            if state.message_tracking {
                self.subscribe_messages(&mut state, topic);
            }
            state.topic_discovery && state.discovered_topics.insert(topic.clone())
        };

        if dispatch {
            self.handler.on_topic_discovered(topic)?;
        }
        Ok(())
    }
}

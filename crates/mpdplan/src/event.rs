//! Synchronous publish/subscribe between the stages of the player.
//!
//! Listeners are called on the publishing task, in registration order. The
//! listener table is copied before delivery, so a listener may subscribe or
//! unsubscribe while an event is being delivered. Such changes take effect
//! from the next event on.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use bytes::Bytes;
use url::Url;

use crate::manifest::ManifestNode;

pub const MANIFEST_LOADED: &str = "manifestLoaded";
pub const MANIFEST_PARSE_COMPLETED: &str = "manifestParseCompleted";
pub const SEGMENT_LOADED: &str = "segmentLoaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Initialization,
    Media(usize),
}

/// A video segment and the audio segment at the same position.
#[derive(Debug, Clone)]
pub struct SegmentLoaded {
    pub period: usize,
    pub kind: SegmentKind,
    pub video_url: Url,
    pub audio_url: Url,
    pub video: Bytes,
    pub audio: Bytes,
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    ManifestLoaded { manifest_url: Url, text: Arc<str> },
    /// Carries the tree after template inheritance has been resolved.
    ManifestParseCompleted { manifest: Arc<ManifestNode> },
    SegmentLoaded(SegmentLoaded),
}

impl PlayerEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ManifestLoaded { .. } => MANIFEST_LOADED,
            Self::ManifestParseCompleted { .. } => MANIFEST_PARSE_COMPLETED,
            Self::SegmentLoaded(_) => SEGMENT_LOADED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    topic: String,
    listener: Listener,
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on<F>(&self, topic: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            topic: topic.into(),
            listener: Arc::new(listener),
        });
        id
    }

    /// Returns whether the subscription was still registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn trigger(&self, event: &PlayerEvent) {
        let topic = event.topic();
        let listeners: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.listener.clone())
            .collect();

        tracing::trace!("Delivering {topic} to {} listeners", listeners.len());
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.lock().iter().filter(|s| s.topic == topic).count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.lock().len())
            .finish()
    }
}

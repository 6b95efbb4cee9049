use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Fixed event topics the core pipeline emits on, per the routing and
/// verification lifecycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RoutingStarted,
    RoutingSkipped,
    RoutingSucceeded,
    RoutingFailed,
    VerificationStarted,
    VerificationSucceeded,
    VerificationFailed,
    VerificationProgress,
    VerificationSkipped,
    VerificationWarning,
    ManifestProgress,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::RoutingStarted => "routing-started",
            Topic::RoutingSkipped => "routing-skipped",
            Topic::RoutingSucceeded => "routing-succeeded",
            Topic::RoutingFailed => "routing-failed",
            Topic::VerificationStarted => "verification-started",
            Topic::VerificationSucceeded => "verification-succeeded",
            Topic::VerificationFailed => "verification-failed",
            Topic::VerificationProgress => "verification-progress",
            Topic::VerificationSkipped => "verification-skipped",
            Topic::VerificationWarning => "verification-warning",
            Topic::ManifestProgress => "manifest-progress",
        }
    }
}

pub type Handler = Arc<dyn Fn(Topic, &Value) + Send + Sync>;

/// A named-topic event bus. Emits synchronously; a child emitter forwards
/// every event to its parent after running its own local handlers. Handler
/// panics are caught and logged — they must never affect the pipeline.
#[derive(Clone)]
pub struct Emitter {
    handlers: Arc<RwLock<Vec<(Topic, Handler)>>>,
    parent: Option<Box<Emitter>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            parent: None,
        }
    }

    /// Process-wide default instance with sensible (empty) handlers.
    pub fn global() -> Self {
        use std::sync::OnceLock;
        static GLOBAL: OnceLock<Emitter> = OnceLock::new();
        GLOBAL.get_or_init(Emitter::new).clone()
    }

    /// Create a per-request child that forwards to `self` after local handlers run.
    pub fn child(&self) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn on(&self, topic: Topic, handler: Handler) {
        self.handlers.write().unwrap().push((topic, handler));
    }

    /// Emit synchronously. Handler panics are caught via `catch_unwind` and
    /// only logged — they never propagate into the pipeline.
    pub fn emit(&self, topic: Topic, payload: Value) {
        // Snapshot so concurrent `on()` calls during emission never race
        // the iteration.
        let snapshot: Vec<(Topic, Handler)> = self.handlers.read().unwrap().clone();
        for (t, handler) in snapshot.iter() {
            if *t != topic {
                continue;
            }
            let handler = handler.clone();
            let payload_ref = &payload;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(topic, payload_ref);
            }));
            if let Err(_panic) = result {
                warn!(topic = topic.as_str(), "emitter handler panicked, swallowing");
            }
        }
        if let Some(parent) = &self.parent {
            parent.emit(topic, payload);
        }
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handler_receives_matching_topic_only() {
        let emitter = Emitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        emitter.on(
            Topic::RoutingStarted,
            Arc::new(move |_t, _v| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        emitter.emit(Topic::RoutingStarted, serde_json::json!({}));
        emitter.emit(Topic::RoutingFailed, serde_json::json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn child_forwards_to_parent_after_local_handlers() {
        let parent = Emitter::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_parent = order.clone();
        parent.on(
            Topic::VerificationSucceeded,
            Arc::new(move |_t, _v| order_parent.lock().unwrap().push("parent")),
        );
        let child = parent.child();
        let order_child = order.clone();
        child.on(
            Topic::VerificationSucceeded,
            Arc::new(move |_t, _v| order_child.lock().unwrap().push("child")),
        );
        child.emit(Topic::VerificationSucceeded, serde_json::json!({}));
        assert_eq!(*order.lock().unwrap(), vec!["child", "parent"]);
    }

    #[test]
    fn panicking_handler_is_swallowed() {
        let emitter = Emitter::new();
        emitter.on(Topic::RoutingFailed, Arc::new(|_t, _v| panic!("boom")));
        // Must not propagate / abort the test.
        emitter.emit(Topic::RoutingFailed, serde_json::json!({}));
    }

    #[test]
    fn global_returns_same_instance() {
        let a = Emitter::global();
        let b = Emitter::global();
        a.on(Topic::ManifestProgress, Arc::new(|_t, _v| {}));
        // Both point at the same underlying handler list.
        assert_eq!(a.handlers.read().unwrap().len(), b.handlers.read().unwrap().len());
    }
}

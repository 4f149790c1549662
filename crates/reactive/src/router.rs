//! Delta routing from collections to live queries.
//!
//! The router holds weak references so a dropped query unregisters
//! itself; dead entries are pruned on the next publish to their source.

use hashbrown::HashMap;
use rill_ivm::DeltaBatch;
use std::cell::RefCell;
use std::rc::Weak;
use tracing::debug;

/// A consumer of source deltas. Live queries implement this.
pub trait DeltaSink {
    /// Called with each delta batch published for a source the sink
    /// registered for.
    fn deliver(&mut self, source: &str, batch: &DeltaBatch);
}

/// Routes per-collection delta batches to the sinks reading them.
#[derive(Default)]
pub struct ChangeRouter {
    routes: HashMap<String, Vec<Weak<RefCell<dyn DeltaSink>>>>,
}

impl ChangeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink for one source. A sink reading several sources
    /// registers once per source.
    pub fn register(&mut self, source: &str, sink: Weak<RefCell<dyn DeltaSink>>) {
        self.routes.entry(source.to_string()).or_default().push(sink);
    }

    /// Publishes a batch to every live sink registered for `source`.
    /// Returns how many sinks received it.
    pub fn publish(&mut self, source: &str, batch: &DeltaBatch) -> usize {
        let Some(sinks) = self.routes.get_mut(source) else {
            return 0;
        };
        let mut delivered = 0;
        sinks.retain(|weak| match weak.upgrade() {
            Some(sink) => {
                sink.borrow_mut().deliver(source, batch);
                delivered += 1;
                true
            }
            None => false,
        });
        if sinks.is_empty() {
            self.routes.remove(source);
        }
        debug!(source, delivered, "published delta batch");
        delivered
    }

    /// Number of live sinks registered for `source`.
    pub fn sink_count(&self, source: &str) -> usize {
        self.routes
            .get(source)
            .map(|sinks| sinks.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::{Key, Row, Value};
    use rill_ivm::Entry;
    use std::rc::Rc;

    struct Recorder {
        batches: Vec<(String, usize)>,
    }

    impl DeltaSink for Recorder {
        fn deliver(&mut self, source: &str, batch: &DeltaBatch) {
            self.batches.push((source.to_string(), batch.len()));
        }
    }

    fn batch() -> DeltaBatch {
        vec![Entry::insert(
            Key::Int(1),
            Row::from_pairs([("n", Value::Int(1))]),
        )]
    }

    #[test]
    fn test_publish_reaches_registered_sinks() {
        let mut router = ChangeRouter::new();
        let sink: Rc<RefCell<dyn DeltaSink>> = Rc::new(RefCell::new(Recorder { batches: vec![] }));
        router.register("users", Rc::downgrade(&sink));

        assert_eq!(router.publish("users", &batch()), 1);
        assert_eq!(router.publish("teams", &batch()), 0);
        assert_eq!(router.sink_count("users"), 1);
    }

    #[test]
    fn test_dropped_sinks_are_pruned() {
        let mut router = ChangeRouter::new();
        let sink: Rc<RefCell<dyn DeltaSink>> = Rc::new(RefCell::new(Recorder { batches: vec![] }));
        router.register("users", Rc::downgrade(&sink));
        drop(sink);

        assert_eq!(router.publish("users", &batch()), 0);
        assert_eq!(router.sink_count("users"), 0);
    }

    #[test]
    fn test_multi_source_sink() {
        let mut router = ChangeRouter::new();
        let sink = Rc::new(RefCell::new(Recorder { batches: vec![] }));
        let dynamic: Rc<RefCell<dyn DeltaSink>> = sink.clone();
        router.register("users", Rc::downgrade(&dynamic));
        router.register("teams", Rc::downgrade(&dynamic));

        router.publish("users", &batch());
        router.publish("teams", &batch());
        let recorder = sink.borrow();
        assert_eq!(recorder.batches.len(), 2);
        assert_eq!(recorder.batches[0].0, "users");
        assert_eq!(recorder.batches[1].0, "teams");
    }
}

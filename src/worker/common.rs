use hash_hasher::HashedMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use uuid::Uuid;

struct EventHandlersList<V: Clone + 'static> {
    index: usize,
    #[allow(clippy::type_complexity)]
    callbacks: HashMap<usize, Arc<dyn Fn(V) + Send + Sync>>,
}

impl<V: Clone + 'static> Default for EventHandlersList<V> {
    fn default() -> Self {
        Self {
            index: 0,
            callbacks: HashMap::new(),
        }
    }
}

/// Per target id registry of notification subscribers.
#[derive(Clone)]
pub(super) struct EventHandlers<V: Clone + 'static> {
    handlers: Arc<Mutex<HashedMap<SubscriptionTarget, EventHandlersList<V>>>>,
}

impl<V: Clone + 'static> EventHandlers<V> {
    pub(super) fn new() -> Self {
        Self {
            handlers: Arc::default(),
        }
    }

    pub(super) fn add(
        &self,
        target_id: SubscriptionTarget,
        callback: Box<dyn Fn(V) + Send + Sync + 'static>,
    ) -> SubscriptionHandler {
        let index = {
            let mut event_handlers = self.handlers.lock();
            let list = event_handlers.entry(target_id).or_default();
            let index = list.index;
            list.index += 1;
            list.callbacks.insert(index, Arc::from(callback));
            index
        };

        SubscriptionHandler::new({
            let event_handlers_weak = Arc::downgrade(&self.handlers);

            Box::new(move || {
                if let Some(event_handlers) = event_handlers_weak.upgrade() {
                    // Removed callback is dropped only after the lock is released, it may own an
                    // entity whose drop removes another subscription from this same registry.
                    let mut removed_callback = None;
                    {
                        let mut handlers = event_handlers.lock();
                        let is_empty = match handlers.get_mut(&target_id) {
                            Some(list) => {
                                removed_callback = list.callbacks.remove(&index);
                                list.callbacks.is_empty()
                            }
                            None => false,
                        };
                        if is_empty {
                            handlers.remove(&target_id);
                        }
                    }
                    drop(removed_callback);
                }
            })
        })
    }

    pub(super) fn call_callbacks_with_value(&self, target_id: &SubscriptionTarget, value: V) {
        let callbacks = match self.handlers.lock().get(target_id) {
            Some(list) => list.callbacks.values().cloned().collect::<Vec<_>>(),
            None => {
                return;
            }
        };

        // Lock is released at this point, callbacks are free to (un)subscribe
        if let Some((last, rest)) = callbacks.split_last() {
            for callback in rest {
                callback(value.clone());
            }
            last(value);
        }
    }

    pub(super) fn downgrade(&self) -> WeakEventHandlers<V> {
        WeakEventHandlers {
            handlers: Arc::downgrade(&self.handlers),
        }
    }
}

#[derive(Clone)]
pub(super) struct WeakEventHandlers<V: Clone + 'static> {
    handlers: Weak<Mutex<HashedMap<SubscriptionTarget, EventHandlersList<V>>>>,
}

impl<V: Clone + 'static> WeakEventHandlers<V> {
    pub(super) fn upgrade(&self) -> Option<EventHandlers<V>> {
        self.handlers
            .upgrade()
            .map(|handlers| EventHandlers { handlers })
    }
}

/// Target of the notification, entity id or worker process id.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) enum SubscriptionTarget {
    Uuid(Uuid),
    Number(u32),
}

impl From<u32> for SubscriptionTarget {
    fn from(number: u32) -> Self {
        Self::Number(number)
    }
}

impl SubscriptionTarget {
    /// Parse `targetId` of incoming notification, which is either a string or a number.
    pub(super) fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(string) => match Uuid::parse_str(string) {
                Ok(uuid) => Some(Self::Uuid(uuid)),
                Err(_) => string.parse::<u32>().ok().map(Self::Number),
            },
            Value::Number(number) => number
                .as_u64()
                .and_then(|number| u32::try_from(number).ok())
                .map(Self::Number),
            _ => None,
        }
    }
}

/// Subscription handler, will remove corresponding subscription when dropped
pub(crate) struct SubscriptionHandler {
    remove_callback: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionHandler {
    fn new(remove_callback: Box<dyn FnOnce() + Send + Sync>) -> Self {
        Self {
            remove_callback: Some(remove_callback),
        }
    }
}

impl Drop for SubscriptionHandler {
    fn drop(&mut self) {
        if let Some(remove_callback) = self.remove_callback.take() {
            remove_callback();
        }
    }
}

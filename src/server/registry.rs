//! Handler registry.
//!
//! Owns the per-method ordered handler lists and the ordered list of
//! universal handlers. Lists are only touched inside short synchronous
//! critical sections; dispatch works on a snapshot, so removing a handler
//! while a request is in flight only affects later requests.

use super::handler::{MethodHandler, UniversalHandler};
use crate::lock::lock_ignore_poison;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

#[derive(Default)]
struct Lists {
    named: HashMap<String, Vec<MethodHandler>>,
    universal: Vec<UniversalHandler>,
}

/// Handlers captured for one dispatch, in execution order.
#[derive(Debug, Default)]
pub(crate) struct DispatchPlan {
    pub universal: Vec<UniversalHandler>,
    pub named: Vec<MethodHandler>,
}

impl DispatchPlan {
    /// Nothing would run; the request gets no reply at all.
    pub fn is_empty(&self) -> bool {
        self.universal.is_empty() && self.named.is_empty()
    }
}

/// Registry of method handlers and universal handlers.
///
/// Removal uses handler identity (see [`MethodHandler::same_as`]), never the
/// method name alone, and always removes the first matching entry. Removing
/// an entry that is not present is a no-op.
#[derive(Default)]
pub struct HandlerRegistry {
    lists: Mutex<Lists>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append `handler` to the list for `name`.
    ///
    /// The returned [`Unsubscriber`] removes exactly this handler instance.
    pub fn subscribe(self: &Arc<Self>, name: &str, handler: MethodHandler) -> Unsubscriber {
        // ---
        {
            let mut lists = lock_ignore_poison(&self.lists);
            lists
                .named
                .entry(name.to_string())
                .or_default()
                .push(handler.clone());
        }

        Unsubscriber {
            registry: Arc::downgrade(self),
            entry: Entry::Named(name.to_string(), handler),
        }
    }

    /// Remove the first occurrence of `handler` from `name`'s list.
    pub fn unsubscribe(&self, name: &str, handler: &MethodHandler) {
        // ---
        let mut lists = lock_ignore_poison(&self.lists);

        let Some(handlers) = lists.named.get_mut(name) else {
            return;
        };

        if let Some(index) = handlers.iter().position(|h| h.same_as(handler)) {
            handlers.remove(index);
        }

        // An emptied list means "no handlers" for dispatch purposes
        if handlers.is_empty() {
            lists.named.remove(name);
        }
    }

    /// Append a universal handler.
    pub fn subscribe_universal(self: &Arc<Self>, handler: UniversalHandler) -> Unsubscriber {
        // ---
        lock_ignore_poison(&self.lists)
            .universal
            .push(handler.clone());

        Unsubscriber {
            registry: Arc::downgrade(self),
            entry: Entry::Universal(handler),
        }
    }

    /// Remove the first occurrence of a universal handler.
    pub fn unsubscribe_universal(&self, handler: &UniversalHandler) {
        // ---
        let mut lists = lock_ignore_poison(&self.lists);

        if let Some(index) = lists.universal.iter().position(|h| h.same_as(handler)) {
            lists.universal.remove(index);
        }
    }

    /// Number of handlers currently registered for `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        lock_ignore_poison(&self.lists)
            .named
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Number of universal handlers currently registered.
    pub fn universal_count(&self) -> usize {
        lock_ignore_poison(&self.lists).universal.len()
    }

    /// Snapshot the handlers a request for `method` would run.
    pub(crate) fn plan(&self, method: &str) -> DispatchPlan {
        let lists = lock_ignore_poison(&self.lists);

        DispatchPlan {
            universal: lists.universal.clone(),
            named: lists.named.get(method).cloned().unwrap_or_default(),
        }
    }
}

enum Entry {
    Named(String, MethodHandler),
    Universal(UniversalHandler),
}

/// Capability removing one previously subscribed handler.
///
/// Holding it does not keep the registry alive. Calling
/// [`unsubscribe`](Unsubscriber::unsubscribe) more than once is harmless.
pub struct Unsubscriber {
    registry: Weak<HandlerRegistry>,
    entry: Entry,
}

impl Unsubscriber {
    /// Remove the handler this capability was issued for.
    pub fn unsubscribe(&self) {
        // ---
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        match &self.entry {
            Entry::Named(name, handler) => registry.unsubscribe(name, handler),
            Entry::Universal(handler) => registry.unsubscribe_universal(handler),
        }
    }
}

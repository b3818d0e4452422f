//! Event callback registry.
//!
//! Handlers are registered per response tag and receive the raw text of
//! every inbound message that tag matches. Registrations are identified by
//! a [`CallbackToken`] that is never reused, so removing one handler can
//! never remove another, however registrations interleave.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use weylink_types::Response;

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackToken(u64);

type Persistent = Arc<dyn Fn(&str) + Send + Sync>;
type Once = Box<dyn FnOnce(&str) + Send>;

enum Handler {
    Persistent(Persistent),
    Once(Once),
}

struct Entry {
    token: CallbackToken,
    handler: Handler,
}

/// Thread-safe multimap from response tag to handlers.
pub struct CallbackRegistry {
    entries: Mutex<BTreeMap<Response, Vec<Entry>>>,
    next_token: AtomicU64,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Register a handler that runs for every matching message.
    pub fn add<F>(&self, event: Response, handler: F) -> CallbackToken
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.insert(event, Handler::Persistent(Arc::new(handler)))
    }

    /// Register a handler that runs for the next matching message only.
    pub fn add_once<F>(&self, event: Response, handler: F) -> CallbackToken
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.insert(event, Handler::Once(Box::new(handler)))
    }

    fn insert(&self, event: Response, handler: Handler) -> CallbackToken {
        let token = CallbackToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .entry(event)
            .or_default()
            .push(Entry { token, handler });
        trace!(%event, token = token.0, "registered callback");
        token
    }

    /// Remove the registration made under `token`.
    ///
    /// Returns `false` if it was already removed, or was a one-shot handler
    /// that has fired.
    pub fn remove(&self, event: Response, token: CallbackToken) -> bool {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| entry.token != token);
        let removed = list.len() != before;
        if list.is_empty() {
            entries.remove(&event);
        }
        removed
    }

    /// Number of handlers currently registered for `event`.
    pub fn len(&self, event: Response) -> usize {
        self.entries.lock().get(&event).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Run every handler registered for `event` with `payload`.
    ///
    /// Returns the number of handlers run.
    pub fn dispatch(&self, event: Response, payload: &str) -> usize {
        let due = self.collect(|tag| tag == event);
        run(due, payload)
    }

    /// Run the handlers of every tag that occurs in `text`.
    ///
    /// Tags are visited in [`Response`] order; handlers of one tag run in
    /// registration order.
    pub fn dispatch_matching(&self, text: &str) -> usize {
        let due = self.collect(|tag| tag.matches(text));
        run(due, text)
    }

    /// Snapshot the handlers to run, detaching one-shot handlers under the
    /// lock so each fires at most once. Handlers run after the lock is
    /// released and may register or remove callbacks themselves.
    fn collect(&self, selects: impl Fn(Response) -> bool) -> Vec<Handler> {
        let mut entries = self.entries.lock();
        let mut due = Vec::new();
        for (&tag, list) in entries.iter_mut() {
            if !selects(tag) {
                continue;
            }
            let mut i = 0;
            while i < list.len() {
                if let Handler::Persistent(handler) = &list[i].handler {
                    due.push(Handler::Persistent(Arc::clone(handler)));
                    i += 1;
                } else {
                    due.push(list.remove(i).handler);
                }
            }
        }
        entries.retain(|_, list| !list.is_empty());
        due
    }
}

fn run(due: Vec<Handler>, payload: &str) -> usize {
    let count = due.len();
    for handler in due {
        match handler {
            Handler::Persistent(handler) => handler(payload),
            Handler::Once(handler) => handler(payload),
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&str) + Send + Sync + Clone + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &str| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn once_handler_fires_exactly_once() {
        let registry = CallbackRegistry::new();
        let (count, handler) = counter();
        registry.add_once(Response::NewVideo, handler);

        assert_eq!(registry.dispatch(Response::NewVideo, "\"NewVideo\""), 1);
        assert_eq!(registry.dispatch(Response::NewVideo, "\"NewVideo\""), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(Response::NewVideo), 0);
    }

    #[test]
    fn persistent_handler_fires_every_time() {
        let registry = CallbackRegistry::new();
        let (count, handler) = counter();
        registry.add(Response::Error, handler);

        registry.dispatch(Response::Error, "{}");
        registry.dispatch(Response::Error, "{}");
        registry.dispatch(Response::ConfigOk, "{}");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let registry = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = Arc::clone(&order);
            if i % 2 == 0 {
                registry.add(Response::ConfigOk, move |_| order.lock().push(i));
            } else {
                registry.add_once(Response::ConfigOk, move |_| order.lock().push(i));
            }
        }
        registry.dispatch(Response::ConfigOk, "\"ConfigOk\"");
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn remove_targets_the_token_not_the_position() {
        let registry = CallbackRegistry::new();
        let (first, h1) = counter();
        let (second, h2) = counter();
        let (third, h3) = counter();
        let t1 = registry.add(Response::NewVideo, h1);
        let t2 = registry.add(Response::NewVideo, h2);
        let t3 = registry.add(Response::NewVideo, h3);

        assert!(registry.remove(Response::NewVideo, t1));
        // t3 was at index 2; after the first removal that index no longer
        // exists, but the token still finds it.
        assert!(registry.remove(Response::NewVideo, t3));
        assert!(!registry.remove(Response::NewVideo, t3));

        registry.dispatch(Response::NewVideo, "");
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
        assert!(registry.remove(Response::NewVideo, t2));
        assert!(registry.is_empty());
    }

    #[test]
    fn tokens_are_not_reused() {
        let registry = CallbackRegistry::new();
        let a = registry.add(Response::Error, |_| {});
        registry.remove(Response::Error, a);
        let b = registry.add(Response::Error, |_| {});
        assert_ne!(a, b);
        assert!(!registry.remove(Response::Error, a));
        assert_eq!(registry.len(Response::Error), 1);
    }

    #[test]
    fn removing_a_fired_once_handler_is_a_no_op() {
        let registry = CallbackRegistry::new();
        let token = registry.add_once(Response::ConfigOk, |_| {});
        registry.dispatch(Response::ConfigOk, "");
        assert!(!registry.remove(Response::ConfigOk, token));
    }

    #[test]
    fn dispatch_matching_uses_substrings() {
        let registry = CallbackRegistry::new();
        let (config_errors, h1) = counter();
        let (errors, h2) = counter();
        let (oks, h3) = counter();
        registry.add(Response::ConfigError, h1);
        registry.add(Response::Error, h2);
        registry.add(Response::ConfigOk, h3);

        let ran = registry.dispatch_matching(r#"{"ConfigError":"bad id"}"#);
        assert_eq!(ran, 2);
        assert_eq!(config_errors.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(oks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_receives_raw_payload() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(String::new()));
        let s = Arc::clone(&seen);
        registry.add_once(Response::CapturableList, move |payload| {
            s.lock().push_str(payload);
        });
        registry.dispatch_matching(r#"{"CapturableList":["A"]}"#);
        assert_eq!(*seen.lock(), r#"{"CapturableList":["A"]}"#);
    }

    #[test]
    fn handler_may_register_during_dispatch() {
        let registry = Arc::new(CallbackRegistry::new());
        let inner = Arc::clone(&registry);
        registry.add_once(Response::NewVideo, move |_| {
            inner.add(Response::NewVideo, |_| {});
        });
        assert_eq!(registry.dispatch(Response::NewVideo, ""), 1);
        assert_eq!(registry.len(Response::NewVideo), 1);
    }

    #[test]
    fn concurrent_dispatch_fires_once_handler_once() {
        let registry = Arc::new(CallbackRegistry::new());
        let (count, handler) = counter();
        for _ in 0..100 {
            registry.add_once(Response::ConfigOk, handler.clone());
        }
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        registry.dispatch(Response::ConfigOk, "");
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn concurrent_add_and_remove_keep_other_handlers() {
        let registry = Arc::new(CallbackRegistry::new());
        let (kept, handler) = counter();
        let keep = registry.add(Response::NewVideo, handler);
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let token = registry.add(Response::NewVideo, |_| {});
                        assert!(registry.remove(Response::NewVideo, token));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(registry.len(Response::NewVideo), 1);
        registry.dispatch(Response::NewVideo, "");
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert!(registry.remove(Response::NewVideo, keep));
    }
}

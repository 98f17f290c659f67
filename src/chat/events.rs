//! UI event subscriptions with disposer handles.
//!
//! Listeners are registered on an [`EventHub`] and stay registered for as
//! long as the returned [`Subscription`] lives. Dropping the subscription
//! (or calling [`Subscription::dispose`]) removes the listener, so a client
//! can be torn down without a live page.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Input events a chat page produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// The send control was activated.
    SendClicked {
        /// Input field contents at the time of the click.
        input: String,
    },
    /// A key was pressed while the input field had focus.
    KeyPressed {
        /// Key name, e.g. `Enter`.
        key: String,
        /// Input field contents at the time of the key press.
        input: String,
    },
}

impl UiEvent {
    /// Text this event submits, if it is a submission at all.
    #[must_use]
    pub fn submitted_text(&self) -> Option<&str> {
        match self {
            Self::SendClicked { input } => Some(input),
            Self::KeyPressed { key, input } if key == "Enter" => Some(input),
            Self::KeyPressed { .. } => None,
        }
    }
}

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct HubInner<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
}

/// Fan-out point for events of type `E`.
pub struct EventHub<E> {
    inner: Arc<Mutex<HubInner<E>>>,
}

impl<E: 'static> fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<E> Clone for EventHub<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventHub<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener; it stays active until the subscription is dropped.
    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<Mutex<HubInner<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            dispose: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).listeners.retain(|(lid, _)| *lid != id);
                }
            })),
        }
    }

    /// Deliver an event to every active listener. Returns how many ran.
    pub fn emit(&self, event: &E) -> usize {
        // Snapshot so listeners may subscribe or dispose while running.
        let listeners: Vec<Listener<E>> = lock(&self.inner)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Number of active listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

fn lock<E>(inner: &Mutex<HubInner<E>>) -> std::sync::MutexGuard<'_, HubInner<E>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Disposer handle for a registered listener.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

impl Subscription {
    /// Unsubscribe now.
    pub fn dispose(mut self) {
        self.run_dispose();
    }

    fn run_dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_dispose();
    }
}

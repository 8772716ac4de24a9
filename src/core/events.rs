//! Listener registry shared by connectors, wallet providers and the manager.
//!
//! Listeners are async callbacks awaited one after another in registration
//! order, so a slow listener delays the next event instead of reordering it.
//! Channel watchers (`watch`) receive the same events after all listeners ran.

use futures::channel::mpsc;
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Async event callback.
pub type Listener<T> = Rc<dyn Fn(T) -> LocalBoxFuture<'static, ()>>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Wrap a synchronous closure as a [`Listener`].
pub fn listener<T, F>(f: F) -> Listener<T>
where
    T: 'static,
    F: Fn(T) + 'static,
{
    Rc::new(move |event: T| {
        f(event);
        future::ready(()).boxed_local()
    })
}

pub struct EventEmitter<T> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, Listener<T>)>>,
    watchers: RefCell<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone + 'static> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            listeners: RefCell::new(Vec::new()),
            watchers: RefCell::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Listener<T>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Channel-based subscription; dropped receivers are pruned on the next emit.
    pub fn watch(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded();
        self.watchers.borrow_mut().push(tx);
        rx
    }

    pub async fn emit(&self, event: T) {
        // Snapshot so listeners may (un)subscribe while being called.
        let listeners: Vec<Listener<T>> =
            self.listeners.borrow().iter().map(|(_, l)| l.clone()).collect();
        for l in listeners {
            l(event.clone()).await;
        }

        let mut watchers = self.watchers.borrow_mut();
        watchers.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

impl<T: Clone + 'static> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Multicast event channel.
//!
//! A `Channel` synchronously delivers every published value to its current
//! observers, in subscription order. Channels never complete or error on
//! their own: subscriptions end only when disposed, either directly or by
//! being scoped to another channel with [`Channel::subscribe_until`].

use super::error::MachineError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Observer callback. An `Err` is not caught by the channel; it is returned
/// to whoever published.
pub type Observer<T> = Rc<dyn Fn(&T) -> Result<(), MachineError>>;

struct Slot<T> {
    id: u64,
    live: Rc<Cell<bool>>,
    observer: Observer<T>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            live: Rc::clone(&self.live),
            observer: Rc::clone(&self.observer),
        }
    }
}

struct ChannelInner<T> {
    next_id: u64,
    slots: Vec<Slot<T>>,
}

/// Broadcast primitive used for state notifications and declared events.
///
/// Cloning a channel yields another handle to the same observers.
///
/// # Example
///
/// ```rust
/// use stratum::core::Channel;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let channel: Channel<u32> = Channel::new();
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = Rc::clone(&seen);
/// let subscription = channel.subscribe(move |value| {
///     sink.borrow_mut().push(*value);
///     Ok(())
/// });
///
/// channel.publish(&1).unwrap();
/// subscription.dispose();
/// channel.publish(&2).unwrap();
///
/// assert_eq!(*seen.borrow(), vec![1]);
/// ```
pub struct Channel<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("observers", &self.inner.borrow().slots.len())
            .finish()
    }
}

impl<T: 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Channel<T> {
    /// Create a channel with no observers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChannelInner {
                next_id: 0,
                slots: Vec::new(),
            })),
        }
    }

    /// Register an observer. It receives every value published after this
    /// call until the returned subscription is disposed.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), MachineError> + 'static,
    {
        let live = Rc::new(Cell::new(true));
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.slots.push(Slot {
                id,
                live: Rc::clone(&live),
                observer: Rc::new(observer),
            });
            id
        };

        let channel: Weak<RefCell<ChannelInner<T>>> = Rc::downgrade(&self.inner);
        let subscription = Subscription::new(live);
        subscription.add_teardown(move || {
            if let Some(channel) = channel.upgrade() {
                channel.borrow_mut().slots.retain(|slot| slot.id != id);
            }
        });
        subscription
    }

    /// Register an observer that stays subscribed only until `lifetime`
    /// publishes its next value.
    pub fn subscribe_until<U, F>(&self, lifetime: &Channel<U>, observer: F) -> Subscription
    where
        U: 'static,
        F: Fn(&T) -> Result<(), MachineError> + 'static,
    {
        let subscription = self.subscribe(observer);

        let scoped = subscription.clone();
        let guard = lifetime.subscribe(move |_| {
            scoped.dispose();
            Ok(())
        });

        // Disposing either side releases both.
        let release = guard.clone();
        subscription.add_teardown(move || release.dispose());
        let release = subscription.clone();
        guard.add_teardown(move || release.dispose());

        subscription
    }

    /// Deliver `value` to every observer registered before this call.
    ///
    /// Observers disposed during delivery are skipped. Stops at, and
    /// returns, the first observer error.
    pub fn publish(&self, value: &T) -> Result<(), MachineError> {
        for slot in self.snapshot() {
            if slot.live.get() {
                (slot.observer)(value)?;
            }
        }
        Ok(())
    }

    /// Like [`publish`](Self::publish), but keeps delivering after an
    /// observer fails and returns the first error at the end.
    ///
    /// Used for lifetime channels, where every scoped subscription must
    /// be released even if one observer fails.
    pub fn publish_all(&self, value: &T) -> Result<(), MachineError> {
        let mut first_error = None;
        for slot in self.snapshot() {
            if slot.live.get() {
                if let Err(err) = (slot.observer)(value) {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .borrow()
            .slots
            .iter()
            .filter(|slot| slot.live.get())
            .count()
    }

    fn snapshot(&self) -> Vec<Slot<T>> {
        self.inner.borrow().slots.clone()
    }
}

/// Handle to a channel subscription.
///
/// Dropping the handle does not unsubscribe; call [`dispose`](Self::dispose)
/// or scope the subscription with [`Channel::subscribe_until`].
#[derive(Clone)]
pub struct Subscription {
    live: Rc<Cell<bool>>,
    teardown: Rc<RefCell<Vec<Box<dyn FnOnce()>>>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Subscription {
    fn new(live: Rc<Cell<bool>>) -> Self {
        Self {
            live,
            teardown: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn add_teardown<F: FnOnce() + 'static>(&self, f: F) {
        if self.is_closed() {
            f();
        } else {
            self.teardown.borrow_mut().push(Box::new(f));
        }
    }

    /// Stop delivery to this observer. Idempotent.
    pub fn dispose(&self) {
        if !self.live.replace(false) {
            return;
        }
        let teardown: Vec<_> = self.teardown.borrow_mut().drain(..).collect();
        for f in teardown {
            f();
        }
    }

    /// Whether this subscription has been disposed.
    pub fn is_closed(&self) -> bool {
        !self.live.get()
    }
}

//! Subscriptions with cancellable handles and the single-threaded task queue.
//!
//! Engine callbacks and document after-transaction notifications are never
//! handled inline: sources publish into an [`EventHub`], subscribers forward
//! into one [`TaskQueue`], and the owner drains that queue on its own turn.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Receiver, Sender, TryRecvError, unbounded};

/// Receives published events. Returning `false` unsubscribes.
pub type Sink<E> = Box<dyn FnMut(&E) -> bool>;

/// Keeps a subscription alive. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    active: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

struct Subscriber<E> {
    active: Arc<AtomicBool>,
    sink: Sink<E>,
}

pub struct EventHub<E> {
    subscribers: Vec<Subscriber<E>>,
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E> EventHub<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Sink<E>) -> SubscriptionHandle {
        let active = Arc::new(AtomicBool::new(true));
        self.subscribers.push(Subscriber {
            active: Arc::clone(&active),
            sink,
        });
        SubscriptionHandle { active }
    }

    /// Deliver to every live subscriber, pruning cancelled or disconnected ones.
    pub fn publish(&mut self, event: &E) {
        self.subscribers.retain_mut(|subscriber| {
            if !subscriber.active.load(Ordering::Acquire) {
                return false;
            }
            (subscriber.sink)(event)
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|s| s.active.load(Ordering::Acquire))
            .count()
    }
}

impl<E: Clone + 'static> EventHub<E> {
    /// Sink that forwards clones of each event into a channel.
    pub fn forward_to<T: 'static>(tx: Sender<T>, wrap: fn(E) -> T) -> Sink<E> {
        Box::new(move |event: &E| tx.send(wrap(event.clone())).is_ok())
    }
}

/// FIFO of pending work, fed through a channel by subscription sinks.
pub struct TaskQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    backlog: VecDeque<T>,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            backlog: VecDeque::new(),
        }
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    pub fn pop(&mut self) -> Option<T> {
        if let Some(task) = self.backlog.pop_front() {
            return Some(task);
        }
        match self.rx.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Remove and return the queued tasks matching `pred`, in order, leaving
    /// the rest queued in their original order.
    pub fn take_matching(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        self.backlog.extend(self.rx.try_iter());
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.backlog.len());
        for task in self.backlog.drain(..) {
            if pred(&task) {
                taken.push(task);
            } else {
                kept.push_back(task);
            }
        }
        self.backlog = kept;
        taken
    }

    pub fn len(&self) -> usize {
        self.backlog.len() + self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

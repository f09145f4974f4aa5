//! # Change Notifications
//!
//! Secondary inputs of the control loops and how a change to one of them is
//! described.
//!
//! Every loop reconciles the single operator resource. A change to any other
//! watched object is reduced to a [`ClusterEvent`]; a loop that wants the
//! event has its operator resource reconciled again. Events only say *what*
//! changed, so the loop always re-reads current state.
//!
//! In-process changes (recorded versions) have no watch to come from and are
//! signalled through a [`ChangeNotifier`] instead.

use futures::channel::mpsc;
use std::sync::{Mutex, PoisonError};

/// Kind of watched object an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deployment,
    Node,
    Infrastructure,
    ClusterOperator,
}

/// A change to one watched object
///
/// An empty name stands for every object of the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEvent {
    pub kind: ResourceKind,
    pub name: String,
}

impl ClusterEvent {
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Whether the event is about `name`
    #[must_use]
    pub fn concerns(&self, name: &str) -> bool {
        self.name.is_empty() || self.name == name
    }
}

/// Fan-out of "something changed" signals to any number of subscribers
///
/// Each subscription is a stream of `()`, one item per change. Closed
/// subscriptions are dropped on the next notification.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<()> {
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    pub fn notify(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|sender| sender.unbounded_send(()).is_ok());
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

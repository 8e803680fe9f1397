//! Work items: the opaque units of deferred execution.
//!
//! The wheel is deliberately ignorant of what it runs. A [`WorkItem`] is a
//! zero-argument unit of work executed synchronously on the wheel thread;
//! two adapters are provided: [`ActionJob`] wraps an arbitrary callback, and
//! [`SendJob`] performs a deferred message delivery to a named [`Endpoint`].
//!
//! # Contract
//!
//! `run` must not block or perform long-running work: every job for a tick
//! executes sequentially on the single wheel thread, so a slow job delays all
//! subsequent ticks and therefore all other timers. Jobs that need non-trivial
//! work must hand off to another execution context from within `run`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An opaque message payload delivered to an [`Endpoint`].
///
/// Repeating send jobs deliver the same payload once per fire, so the payload
/// is shared rather than consumed.
pub type Envelope = Arc<dyn Any + Send + Sync>;

/// A named destination for deferred message delivery.
///
/// This is the interface boundary to the hosting system's message bus; the
/// scheduler knows nothing about delivery semantics beyond this trait.
pub trait Endpoint: Send + Sync {
    /// A stable name for diagnostics and logging.
    fn name(&self) -> &str;

    /// Delivers a message to this endpoint.
    fn deliver(&self, message: Envelope);
}

/// A zero-argument unit of deferred work.
///
/// Executed synchronously on the wheel thread when its deadline tick is
/// swept. A panic inside `run` is caught and logged at the sweep boundary;
/// it does not stop the wheel or affect sibling jobs.
pub trait WorkItem: Send + 'static {
    /// Executes the unit of work.
    fn run(&self);

    /// Short human-readable description used in logs.
    fn describe(&self) -> String {
        "work item".to_owned()
    }
}

impl WorkItem for Box<dyn WorkItem> {
    fn run(&self) {
        (**self).run();
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Adapter wrapping a caller-supplied callback.
pub struct ActionJob {
    action: Box<dyn Fn() + Send + 'static>,
    label: Option<&'static str>,
}

impl ActionJob {
    /// Wraps a callback.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        Self {
            action: Box::new(action),
            label: None,
        }
    }

    /// Wraps a callback with a label used in diagnostics.
    pub fn with_label<F>(label: &'static str, action: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        Self {
            action: Box::new(action),
            label: Some(label),
        }
    }
}

impl WorkItem for ActionJob {
    fn run(&self) {
        (self.action)();
    }

    fn describe(&self) -> String {
        self.label.map_or_else(|| "action".to_owned(), str::to_owned)
    }
}

impl fmt::Debug for ActionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionJob")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Adapter performing a deferred message delivery.
///
/// `run` delivers the message to the receiver. The sender, when present, is
/// carried for diagnostics only; delivery itself never consults it.
pub struct SendJob {
    receiver: Arc<dyn Endpoint>,
    message: Envelope,
    sender: Option<Arc<dyn Endpoint>>,
}

impl SendJob {
    /// Creates a deferred send of `message` to `receiver`, optionally tagged
    /// with the sending endpoint.
    #[must_use]
    pub fn new(
        receiver: Arc<dyn Endpoint>,
        message: Envelope,
        sender: Option<Arc<dyn Endpoint>>,
    ) -> Self {
        Self {
            receiver,
            message,
            sender,
        }
    }

    /// Returns the receiving endpoint's name.
    #[must_use]
    pub fn receiver_name(&self) -> &str {
        self.receiver.name()
    }

    /// Returns the sending endpoint's name, if one was recorded.
    #[must_use]
    pub fn sender_name(&self) -> Option<&str> {
        self.sender.as_deref().map(Endpoint::name)
    }
}

impl WorkItem for SendJob {
    fn run(&self) {
        self.receiver.deliver(Arc::clone(&self.message));
    }

    fn describe(&self) -> String {
        match self.sender_name() {
            Some(sender) => format!("send to {} from {sender}", self.receiver.name()),
            None => format!("send to {}", self.receiver.name()),
        }
    }
}

impl fmt::Debug for SendJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendJob")
            .field("receiver", &self.receiver.name())
            .field("sender", &self.sender_name())
            .finish_non_exhaustive()
    }
}

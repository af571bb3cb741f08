//! Diagnostics and progress reporting.
//!
//! Long-running operations report progress and warnings to an optional
//! [`ArchiveObserver`]. Every event is also logged through `tracing`,
//! whether or not an observer is attached.

use std::fmt;
use std::sync::mpsc::Sender;

/// Severity of an [`ArchiveEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Normal progress
    Info,
    /// Something was skipped or looked wrong, the operation continues
    Warning,
    /// An item failed
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Position within a multi-step operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Progress {
    /// Steps completed
    pub current: u64,
    /// Total steps
    pub max: u64,
}

impl Progress {
    /// Create a progress marker
    pub const fn new(current: u64, max: u64) -> Self {
        Self { current, max }
    }

    /// Completed fraction in `0.0..=1.0`
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.max == 0 {
            1.0
        } else {
            self.current as f64 / self.max as f64
        }
    }
}

/// One diagnostic emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEvent {
    /// Severity
    pub kind: EventKind,
    /// Human-readable message
    pub message: String,
    /// Progress, for events emitted from loops
    pub progress: Option<Progress>,
}

impl ArchiveEvent {
    /// Informational event
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Info,
            message: message.into(),
            progress: None,
        }
    }

    /// Warning event
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            message: message.into(),
            progress: None,
        }
    }

    /// Error event
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            message: message.into(),
            progress: None,
        }
    }

    /// Attach a progress marker
    #[must_use]
    pub const fn with_progress(mut self, current: u64, max: u64) -> Self {
        self.progress = Some(Progress::new(current, max));
        self
    }
}

/// Receiver of engine diagnostics.
///
/// `is_cancelled` is polled between items of batch operations and between
/// entries of a rebuild.
pub trait ArchiveObserver: Send {
    /// Handle one event
    fn on_event(&self, event: ArchiveEvent);

    /// Whether the running operation should stop at the next checkpoint
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl ArchiveObserver for Sender<ArchiveEvent> {
    fn on_event(&self, event: ArchiveEvent) {
        // Receiver gone means nobody is listening
        let _ = self.send(event);
    }
}

/// Optional observer plus the logging that accompanies every event
#[derive(Default)]
pub(crate) struct EventSink {
    observer: Option<Box<dyn ArchiveObserver>>,
}

impl EventSink {
    pub(crate) fn set(&mut self, observer: Option<Box<dyn ArchiveObserver>>) {
        self.observer = observer;
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.observer.is_some()
    }

    /// Log an event and hand it to the observer, if any.
    pub(crate) fn emit<F>(&self, build: F)
    where
        F: FnOnce() -> ArchiveEvent,
    {
        let event = build();
        match event.kind {
            EventKind::Info => tracing::trace!("{}", event.message),
            EventKind::Warning => tracing::warn!("{}", event.message),
            EventKind::Error => tracing::error!("{}", event.message),
        }
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.observer.as_ref().is_some_and(|o| o.is_cancelled())
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, mpsc};

    #[test]
    fn test_progress_fraction() {
        assert!((Progress::new(1, 4).fraction() - 0.25).abs() < f64::EPSILON);
        assert!((Progress::new(0, 0).fraction() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_channel_observer() {
        let (tx, rx) = mpsc::channel();
        let mut sink = EventSink::default();
        sink.set(Some(Box::new(tx)));

        sink.emit(|| ArchiveEvent::warning("skipped x.exe").with_progress(1, 2));
        let event = rx.recv().expect("event");
        assert_eq!(event.kind, EventKind::Warning);
        assert_eq!(event.message, "skipped x.exe");
        assert_eq!(event.progress, Some(Progress::new(1, 2)));
        assert!(!sink.is_cancelled());
    }

    #[test]
    fn test_events_logged_without_observer() {
        let sink = EventSink::default();
        let built = Cell::new(false);
        sink.emit(|| {
            built.set(true);
            ArchiveEvent::warning("skipped x.exe")
        });
        assert!(built.get());
        assert!(!sink.is_attached());
        assert!(!sink.is_cancelled());
    }

    struct Cancelling(Arc<AtomicBool>);

    impl ArchiveObserver for Cancelling {
        fn on_event(&self, _event: ArchiveEvent) {}

        fn is_cancelled(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_cancellation_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut sink = EventSink::default();
        sink.set(Some(Box::new(Cancelling(Arc::clone(&flag)))));
        assert!(!sink.is_cancelled());
        flag.store(true, Ordering::SeqCst);
        assert!(sink.is_cancelled());
    }
}

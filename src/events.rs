//! Action log queue
//!
//! Page operations report what they did as [`PageEvent`]s after their
//! transaction commits. Events go through a bounded channel to a background
//! thread that hands them to a [`PageEventSink`]. Submission never blocks: when
//! the queue is full the event is dropped with a warning, so a slow sink can
//! never hold up a page write.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::thread::JoinHandle;
use tracing::{info, warn};

use crate::model::VersionKind;

/// Something that happened to a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// Page created under `parent_code`
    Added {
        /// Page code
        code: String,
        /// Parent code
        parent_code: String,
    },
    /// Draft metadata, widgets or group rewritten
    Updated {
        /// Page code
        code: String,
    },
    /// Page removed
    Deleted {
        /// Page code
        code: String,
    },
    /// Page reparented or moved among its siblings
    Moved {
        /// Page code
        code: String,
        /// Parent after the move
        parent_code: String,
        /// Position after the move
        position: i32,
    },
    /// Draft copied to online
    Published {
        /// Page code
        code: String,
    },
    /// Online version removed
    Unpublished {
        /// Page code
        code: String,
    },
    /// A draft frame was joined, emptied or swapped
    WidgetChanged {
        /// Page code
        code: String,
        /// Frames touched
        frames: Vec<i32>,
    },
}

impl PageEvent {
    /// Code of the page the event is about
    pub fn code(&self) -> &str {
        match self {
            PageEvent::Added { code, .. }
            | PageEvent::Updated { code }
            | PageEvent::Deleted { code }
            | PageEvent::Moved { code, .. }
            | PageEvent::Published { code }
            | PageEvent::Unpublished { code }
            | PageEvent::WidgetChanged { code, .. } => code,
        }
    }

    /// Version the event changed
    pub fn version(&self) -> VersionKind {
        match self {
            PageEvent::Published { .. } | PageEvent::Unpublished { .. } => VersionKind::Online,
            _ => VersionKind::Draft,
        }
    }
}

/// Consumer of page events, called on the action log thread
pub trait PageEventSink: Send + 'static {
    /// Record one event
    fn record(&mut self, event: PageEvent);
}

impl<F> PageEventSink for F
where
    F: FnMut(PageEvent) + Send + 'static,
{
    fn record(&mut self, event: PageEvent) {
        self(event)
    }
}

/// Sink that writes events to the `tracing` log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PageEventSink for TracingSink {
    fn record(&mut self, event: PageEvent) {
        info!(target: "pagetree::actions", page = event.code(), version = %event.version(), ?event, "page action");
    }
}

/// Handle to the action log worker; dropping it drains the queue and joins the thread
pub struct ActionLog {
    tx: Option<Sender<PageEvent>>,
    thread: Option<JoinHandle<()>>,
}

impl ActionLog {
    /// Start a worker with a queue of `capacity` events
    pub fn start<S: PageEventSink>(capacity: usize, sink: S) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        let thread = std::thread::Builder::new()
            .name("pagetree-action-log".into())
            .spawn(move || Self::run(rx, sink))
            .map_err(|err| warn!(error = %err, "could not spawn action log thread, events will be dropped"))
            .ok();
        Self { tx: thread.as_ref().map(|_| tx), thread }
    }

    fn run<S: PageEventSink>(rx: Receiver<PageEvent>, mut sink: S) {
        for event in rx {
            sink.record(event);
        }
    }

    /// Queue an event without blocking. Returns whether it was queued.
    pub fn submit(&self, event: PageEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(page = event.code(), "action log queue full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                warn!(page = event.code(), "action log worker stopped, dropping event");
                false
            }
        }
    }
}

impl std::fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLog").field("running", &self.thread.is_some()).finish()
    }
}

impl Drop for ActionLog {
    fn drop(&mut self) {
        // Closing the sender ends the worker loop once the queue is drained
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

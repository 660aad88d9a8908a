//! Host environment port
//!
//! Window/document lifecycle hooks (before-unload, page-hide, visibility
//! change). Each installed hook is a [`HostListener`] owned by the session;
//! dropping it removes the hook.

use crate::config::Platform;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Page visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Hook kinds a session can install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostEventKind {
    BeforeUnload,
    PageHide,
    VisibilityChange,
}

impl HostEventKind {
    /// Hooks installed for a platform
    pub fn required_for(platform: Platform) -> &'static [HostEventKind] {
        match platform {
            Platform::Desktop => &[HostEventKind::BeforeUnload],
            Platform::Mobile => &[
                HostEventKind::BeforeUnload,
                HostEventKind::PageHide,
                HostEventKind::VisibilityChange,
            ],
        }
    }
}

/// Event raised by the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostEvent {
    BeforeUnload,
    PageHide,
    VisibilityChanged(Visibility),
}

impl HostEvent {
    pub fn kind(&self) -> HostEventKind {
        match self {
            HostEvent::BeforeUnload => HostEventKind::BeforeUnload,
            HostEvent::PageHide => HostEventKind::PageHide,
            HostEvent::VisibilityChanged(_) => HostEventKind::VisibilityChange,
        }
    }
}

/// Delivers host events into a session's event loop
#[derive(Debug, Clone)]
pub struct HostEventSender {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl HostEventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self { tx }
    }

    /// Send an event; returns false once the session is gone
    pub fn send(&self, event: HostEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// An installed hook; removed from the host when dropped
pub struct HostListener {
    kind: HostEventKind,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl HostListener {
    pub fn new(kind: HostEventKind, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind,
            release: Some(Box::new(release)),
        }
    }

    pub fn kind(&self) -> HostEventKind {
        self.kind
    }
}

impl fmt::Debug for HostListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostListener").field("kind", &self.kind).finish()
    }
}

impl Drop for HostListener {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("Removing {:?} host listener", self.kind);
            release();
        }
    }
}

/// The window/document the view runs in
pub trait HostEnvironment: Send + Sync {
    fn platform(&self) -> Platform;

    /// Install a hook forwarding `kind` events to `sender`
    fn listen(&self, kind: HostEventKind, sender: HostEventSender) -> HostListener;
}

type ListenerTable = HashMap<u64, (HostEventKind, HostEventSender)>;

/// Host whose events are fired by hand; used by the demo and tests
#[derive(Clone)]
pub struct ManualHost {
    platform: Platform,
    listeners: Arc<Mutex<ListenerTable>>,
    next_id: Arc<AtomicU64>,
}

impl ManualHost {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fire an event at every matching listener, returning how many got it
    pub fn fire(&self, event: HostEvent) -> usize {
        let listeners = self.listeners.lock();
        listeners
            .values()
            .filter(|(kind, _)| *kind == event.kind())
            .filter(|(_, sender)| sender.send(event))
            .count()
    }

    /// Number of installed hooks
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Number of installed hooks of one kind
    pub fn listener_count_for(&self, kind: HostEventKind) -> usize {
        self.listeners
            .lock()
            .values()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl HostEnvironment for ManualHost {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn listen(&self, kind: HostEventKind, sender: HostEventSender) -> HostListener {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, (kind, sender));

        let listeners = Arc::clone(&self.listeners);
        HostListener::new(kind, move || {
            listeners.lock().remove(&id);
        })
    }
}

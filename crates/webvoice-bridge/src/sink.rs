//! Host event channel
//!
//! The host attaches a listener with [`HostEventChannel::listen`] and receives every
//! encoded [`HostEvent`] as a string. Delivery is fire-and-forget: with no listener
//! attached, or after the listener went away, events are logged and dropped.

use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::events::HostEvent;

/// Stream of encoded host events
pub struct HostEventStream {
    inner: UnboundedReceiverStream<String>,
}

impl HostEventStream {
    /// Get the next event
    pub async fn next(&mut self) -> Option<String> {
        use tokio_stream::StreamExt;
        self.inner.next().await
    }

    /// Take an event if one is already queued
    pub fn try_next(&mut self) -> Option<String> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl Stream for HostEventStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Single-listener event channel towards the host
#[derive(Default)]
pub struct HostEventChannel {
    listener: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl std::fmt::Debug for HostEventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEventChannel")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl HostEventChannel {
    /// Create a channel with no listener
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener, replacing (and releasing) any previous one
    pub fn listen(&self) -> HostEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.listener.lock().replace(tx).is_some() {
            debug!("replaced existing host event listener");
        }
        HostEventStream {
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    /// Detach the listener
    ///
    /// Returns `true` if a listener was released. Calling it again is a no-op.
    pub fn detach(&self) -> bool {
        self.listener.lock().take().is_some()
    }

    /// True while a listener is attached
    pub fn is_attached(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Deliver an event
    pub fn send(&self, event: &HostEvent) {
        self.send_raw(event.encode());
    }

    /// Deliver an already encoded event string
    pub fn send_raw(&self, event: String) {
        let mut slot = self.listener.lock();
        let Some(tx) = slot.as_ref() else {
            warn!(event = %event, "cannot send host event: no listener attached");
            return;
        };
        if let Err(mpsc::error::SendError(event)) = tx.send(event) {
            warn!(event = %event, "host listener went away, releasing it");
            slot.take();
        }
    }
}

//! Change notifications published by a document session.

use serde::{Deserialize, Serialize};

use crate::document::DocumentId;

/// Capacity of each document's broadcast channel.
///
/// Slow subscribers that fall further behind than this see
/// [`tokio::sync::broadcast::error::RecvError::Lagged`] and should re-read
/// the state they render.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What changed in a document session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Placements or the background reference changed.
    Model,
    /// The selection or the lone mover changed.
    Selection,
    /// The decoded background image or its load status changed.
    Background,
    /// Steady pan or zoom changed.
    Viewport,
    /// A gesture started, updated, ended or was cancelled.
    Gesture,
}

/// A change notification for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvent {
    /// The document that changed.
    pub document: DocumentId,
    /// What changed.
    pub kind: ChangeKind,
}

impl DocumentEvent {
    /// Create a new event.
    #[must_use]
    pub const fn new(document: DocumentId, kind: ChangeKind) -> Self {
        Self { document, kind }
    }
}

/// Sending half of a document's change channel.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    document: DocumentId,
    tx: tokio::sync::broadcast::Sender<DocumentEvent>,
}

impl Notifier {
    pub(crate) fn new(document: DocumentId) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { document, tx }
    }

    pub(crate) fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DocumentEvent> {
        self.tx.subscribe()
    }

    /// Publish a change. Having no subscribers is not an error.
    pub(crate) fn notify(&self, kind: ChangeKind) {
        let _ = self.tx.send(DocumentEvent::new(self.document, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_reaches_subscribers() {
        let id = DocumentId::new();
        let notifier = Notifier::new(id);
        let mut rx = notifier.subscribe();

        notifier.notify(ChangeKind::Selection);
        let event = rx.try_recv().expect("event");
        assert_eq!(event, DocumentEvent::new(id, ChangeKind::Selection));
    }

    #[test]
    fn test_notify_without_subscribers_is_silent() {
        let notifier = Notifier::new(DocumentId::new());
        notifier.notify(ChangeKind::Model);
    }

    #[test]
    fn test_dropped_receiver_unsubscribes() {
        let notifier = Notifier::new(DocumentId::new());
        let rx = notifier.subscribe();
        assert_eq!(notifier.tx.receiver_count(), 1);
        drop(rx);
        assert_eq!(notifier.tx.receiver_count(), 0);
    }
}

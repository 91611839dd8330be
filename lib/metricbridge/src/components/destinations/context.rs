use tokio::sync::mpsc;

use crate::event::TelemetryEvent;

/// Context surrounding a running destination.
///
/// Carries the event stream: a bounded channel the host pushes events into, one at a time. When the sending side is
/// dropped, the stream terminates and the destination shuts down.
pub struct DestinationContext {
    events: mpsc::Receiver<TelemetryEvent>,
}

impl DestinationContext {
    /// Creates a context with an event stream of the given capacity, returning the paired sender.
    pub fn with_capacity(capacity: usize) -> (mpsc::Sender<TelemetryEvent>, Self) {
        let (events_tx, events_rx) = mpsc::channel(capacity);
        (events_tx, Self { events: events_rx })
    }

    /// Gets a mutable reference to the event stream.
    pub fn events(&mut self) -> &mut mpsc::Receiver<TelemetryEvent> {
        &mut self.events
    }
}

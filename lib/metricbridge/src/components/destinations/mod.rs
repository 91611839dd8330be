//! Destination component basics.

use async_trait::async_trait;

use crate::error::GenericError;

mod builder;
pub use self::builder::DestinationBuilder;

mod context;
pub use self::context::DestinationContext;

/// A destination.
///
/// Destinations are the final step in the bridge, where events are reshaped and sent to an external system. They run
/// until their event stream is terminated, processing one event at a time.
#[async_trait]
pub trait Destination {
    /// Runs the destination.
    ///
    /// The destination context provides access to the event stream, used to receive the events sent to the
    /// destination by the host.
    ///
    /// # Errors
    ///
    /// If an unrecoverable error occurs while running, an error is returned. Per-event failures are not
    /// unrecoverable: destinations log and skip them rather than stopping the stream.
    async fn run(self: Box<Self>, context: DestinationContext) -> Result<(), GenericError>;
}

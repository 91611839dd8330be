use async_trait::async_trait;

use super::Destination;
use crate::error::GenericError;

/// A destination builder.
#[async_trait]
pub trait DestinationBuilder {
    /// Builds the destination.
    ///
    /// # Errors
    ///
    /// If the destination could not be built for any reason, an error is returned.
    async fn build(&self) -> Result<Box<dyn Destination + Send>, GenericError>;
}

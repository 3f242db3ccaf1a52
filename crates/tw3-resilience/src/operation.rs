//! The shape every protected external call conforms to

use async_trait::async_trait;
use std::sync::Arc;

/// A fallible call to an external service (news lookup, model inference).
///
/// Wrappers may invoke an operation more than once, so `invoke` takes `&self`.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Value produced on success
    type Output: Send;
    /// Error produced on failure
    type Error: std::fmt::Display + Send;

    /// Run the call once
    async fn invoke(&self) -> Result<Self::Output, Self::Error>;
}

#[async_trait]
impl<O: Operation + ?Sized> Operation for Arc<O> {
    type Output = O::Output;
    type Error = O::Error;

    async fn invoke(&self) -> Result<Self::Output, Self::Error> {
        (**self).invoke().await
    }
}

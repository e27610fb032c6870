//! The pooled resource and the factory that creates it

use crate::config::ClientOptions;
use crate::pool::key::DestinationKey;

/// A long-lived client handle bound to one destination.
///
/// Creating one must not perform I/O; the transport is established lazily
/// on first use and may be re-established after [`Connection::reset`].
pub trait Connection: Send + 'static {
    /// Whether the transport previously entered an error state
    fn is_errored(&self) -> bool;

    /// Close the stale transport and re-establish it on next use. The
    /// handle and its configuration stay valid.
    fn reset(&mut self);

    /// Close the transport for good; the handle is about to be dropped.
    fn close(&mut self);
}

/// Creates connections for a destination
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    fn create(&self, key: &DestinationKey, options: &ClientOptions) -> Self::Connection;
}

impl<F, C> ConnectionFactory for F
where
    F: Fn(&DestinationKey, &ClientOptions) -> C + Send + Sync + 'static,
    C: Connection,
{
    type Connection = C;

    fn create(&self, key: &DestinationKey, options: &ClientOptions) -> C {
        self(key, options)
    }
}

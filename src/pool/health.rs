//! Pre-use health check for pooled connections

use tracing::info;

use super::connection::Connection;
use super::key::DestinationKey;

/// Reset a connection whose transport previously failed.
///
/// The stale transport is closed and reconnection is deferred to the next
/// use; the handle itself is kept. Returns whether a reset happened.
pub(crate) fn sanitize<C: Connection>(key: &DestinationKey, conn: &mut C) -> bool {
    if !conn.is_errored() {
        return false;
    }

    info!(key = %key, "Reconnecting: transport reported an error");
    conn.reset();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Flaky {
        errored: bool,
        resets: u32,
        closed: bool,
    }

    impl Connection for Flaky {
        fn is_errored(&self) -> bool {
            self.errored
        }

        fn reset(&mut self) {
            self.errored = false;
            self.resets += 1;
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn key() -> DestinationKey {
        DestinationKey::parse("https://example.com").unwrap()
    }

    #[test]
    fn test_healthy_connection_untouched() {
        let mut conn = Flaky::default();
        assert!(!sanitize(&key(), &mut conn));
        assert_eq!(conn.resets, 0);
        assert!(!conn.closed);
    }

    #[test]
    fn test_errored_connection_reset_not_closed() {
        let mut conn = Flaky {
            errored: true,
            ..Default::default()
        };
        assert!(sanitize(&key(), &mut conn));
        assert_eq!(conn.resets, 1);
        assert!(!conn.is_errored());
        assert!(!conn.closed);
    }
}

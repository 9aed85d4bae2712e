//! Thread-safe request-id counter.
//!
//! Both RCON dialects match responses to commands by a signed 32-bit request
//! identifier.  Ids issued here cycle through `1..=9000`, which keeps them
//! clear of the values the protocols reserve: `0` and `-1` mark auth-related
//! frames on the binary wire, non-positive identifiers mark unsolicited
//! pushes on the JSON wire, and `9999` is the binary client's
//! end-of-response sentinel.

use std::sync::atomic::{AtomicU32, Ordering};

/// Largest id issued before the counter wraps back to 1.
pub const MAX_REQUEST_ID: i32 = 9000;

/// A thread-safe counter issuing request ids in the cycle `1..=9000`.
///
/// # Examples
///
/// ```rust
/// use rcon_core::protocol::RequestIdCounter;
///
/// let counter = RequestIdCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
pub struct RequestIdCounter {
    inner: AtomicU32,
}

impl RequestIdCounter {
    /// Creates a counter whose first issued id is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next request id, wrapping from 9000 back to 1.
    ///
    /// `Ordering::Relaxed` suffices: ids only need to be distinct, they
    /// carry no memory-synchronisation role.
    pub fn next(&self) -> i32 {
        let n = self.inner.fetch_add(1, Ordering::Relaxed);
        (n % MAX_REQUEST_ID as u32) as i32 + 1
    }
}

impl Default for RequestIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

use std::time::Duration;
use tokio::time::Instant;

/// Monotonic millisecond clock shared by all parts of an endpoint.
///
/// Anchoring at a `tokio::time::Instant` epoch means paused-time test
/// runtimes control this clock along with all sleeps.
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Clock {
        Clock { epoch: Instant::now() }
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// the wire representation of 'now': milliseconds truncated to 32 bits
    pub fn wire_now(&self) -> u32 {
        self.now_ms() as u32
    }

    pub(crate) fn instant_at(&self, deadline_ms: u64) -> Instant {
        self.epoch + Duration::from_millis(deadline_ms)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

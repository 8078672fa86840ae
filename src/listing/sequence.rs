use std::sync::atomic::{AtomicU64, Ordering};

/// Generation counter that lets the newest request win.
///
/// Every request takes a token from [`begin`](Self::begin). When its response
/// arrives, [`commit`](Self::commit) only hands the value back if no newer
/// request has started in the meantime.
#[derive(Debug, Default)]
pub struct RequestSequence {
    latest: AtomicU64,
}

/// Generation of one in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestToken(u64);

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::Acquire) == token.0
    }

    /// `Some(value)` if `token` is still the latest generation, `None` for a
    /// superseded response.
    pub fn commit<T>(&self, token: RequestToken, value: T) -> Option<T> {
        if self.is_current(token) {
            Some(value)
        } else {
            tracing::debug!(
                token = token.0,
                latest = self.latest.load(Ordering::Acquire),
                "Discarding superseded response"
            );
            None
        }
    }
}

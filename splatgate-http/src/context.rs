use crate::headers::RequestId;
use std::time::{Duration, Instant};

/// Holds the context in which a request is being executed
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone)]
pub struct Context {
    /// Correlation ID for the current request
    request_id: RequestId,

    /// When the request reached the handler
    received_at: Instant,
}

impl Context {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            received_at: Instant::now(),
        }
    }

    #[inline]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }
}

//! Global fixed-window request ceiling.
//!
//! One counter for the whole process, reset every second. Crude on purpose:
//! the service sits behind a trusted gateway and the ceiling only guards
//! against runaway clients.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{extract::Request, extract::State, middleware::Next, response::Response};

use super::error::ApiError;

const WINDOW: Duration = Duration::from_secs(1);

pub struct FixedWindowLimiter {
    max: u32,
    window: Mutex<(Instant, u32)>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self {
            max,
            window: Mutex::new((Instant::now(), 0)),
        }
    }

    /// Count one request against the current window.
    pub fn allow(&self) -> bool {
        let Ok(mut window) = self.window.lock() else {
            return true;
        };
        let now = Instant::now();
        if now.duration_since(window.0) >= WINDOW {
            *window = (now, 0);
        }
        if window.1 >= self.max {
            return false;
        }
        window.1 += 1;
        true
    }
}

pub async fn enforce(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !limiter.allow() {
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(request).await)
}

/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub type RequestError = Arc<dyn Error + Send + Sync>;

/// Nanoseconds since the unix epoch, `None` for earlier times
pub(crate) fn unix_nanos(t: SystemTime) -> Option<u64> {
    let d = t.duration_since(SystemTime::UNIX_EPOCH).ok()?;
    Some(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Outcome of one completed operation.
#[derive(Clone, Debug, Default)]
pub struct RequestResult {
    pub request_id: String,
    /// status code from the request stack, 0 for ok
    pub status: i32,
    pub error: Option<RequestError>,
    pub msg: String,
    pub queued_at: Option<SystemTime>,
    pub started_at: Option<SystemTime>,
    pub ended_at: Option<SystemTime>,
    pub queue_wait: Duration,
    pub latency: Duration,
}

impl RequestResult {
    pub fn new(request_id: &str) -> Self {
        RequestResult {
            request_id: request_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_queue_wait(mut self, queue_wait: Duration) -> Self {
        self.queue_wait = queue_wait;
        self
    }

    pub fn with_error(mut self, error: RequestError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    pub fn with_msg(mut self, msg: &str) -> Self {
        self.msg = msg.to_string();
        self
    }

    pub fn with_times(
        mut self,
        queued_at: Option<SystemTime>,
        started_at: SystemTime,
        ended_at: SystemTime,
    ) -> Self {
        self.queued_at = queued_at;
        self.started_at = Some(started_at);
        self.ended_at = Some(ended_at);
        self
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Fill in the derived fields that were left empty
    pub fn normalize(&mut self) {
        if self.latency.is_zero()
            && let (Some(start), Some(end)) = (self.started_at, self.ended_at)
        {
            self.latency = end.duration_since(start).unwrap_or_default();
        }
        if self.queue_wait.is_zero()
            && let (Some(queued), Some(start)) = (self.queued_at, self.started_at)
        {
            self.queue_wait = start.duration_since(queued).unwrap_or_default();
        }
        if self.msg.is_empty() {
            if let Some(e) = &self.error {
                self.msg = e.to_string();
            } else if self.status != 0 {
                self.msg = format!("status code {}", self.status);
            }
        }
    }
}

/// Caller supplied values attached to a record call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Option<u64>,
}

impl RequestContext {
    pub fn new() -> Self {
        RequestContext::default()
    }

    pub fn with_request_id(id: u64) -> Self {
        RequestContext {
            request_id: Some(id),
        }
    }

    #[inline]
    pub fn set_request_id(&mut self, id: u64) {
        self.request_id = Some(id);
    }

    /// The request-range key, if any
    #[inline]
    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn derive_durations() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let mut rr = RequestResult::new("r").with_times(
            Some(t0),
            t0 + Duration::from_millis(5),
            t0 + Duration::from_millis(25),
        );
        rr.normalize();
        assert_eq!(rr.queue_wait, Duration::from_millis(5));
        assert_eq!(rr.latency, Duration::from_millis(20));
        assert!(rr.msg.is_empty());
    }

    #[test]
    fn keep_explicit_latency() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let mut rr = RequestResult::new("r")
            .with_latency(Duration::from_millis(7))
            .with_times(None, t0, t0 + Duration::from_millis(25));
        rr.normalize();
        assert_eq!(rr.latency, Duration::from_millis(7));
        assert!(rr.queue_wait.is_zero());
    }

    #[test]
    fn clock_going_back() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let mut rr = RequestResult::new("r").with_times(None, t0, t0 - Duration::from_secs(1));
        rr.normalize();
        assert!(rr.latency.is_zero());
    }

    #[test]
    fn default_message() {
        let mut rr = RequestResult::new("r")
            .with_error(Arc::new(io::Error::other("connection reset")));
        rr.normalize();
        assert!(rr.is_error());
        assert_eq!(rr.msg, "connection reset");

        let mut rr = RequestResult::new("r").with_status(14);
        rr.normalize();
        assert!(!rr.is_error());
        assert_eq!(rr.msg, "status code 14");

        let mut rr = RequestResult::new("r")
            .with_status(14)
            .with_msg("unavailable");
        rr.normalize();
        assert_eq!(rr.msg, "unavailable");
    }

    #[test]
    fn epoch_nanos() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_nanos(1_500);
        assert_eq!(unix_nanos(t), Some(1_500));
        assert_eq!(unix_nanos(SystemTime::UNIX_EPOCH - Duration::from_secs(1)), None);
    }

    #[test]
    fn context() {
        assert_eq!(RequestContext::new().request_id(), None);
        let mut ctx = RequestContext::with_request_id(7);
        assert_eq!(ctx.request_id(), Some(7));
        ctx.set_request_id(9);
        assert_eq!(ctx.request_id(), Some(9));
    }
}

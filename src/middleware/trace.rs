use std::time::Instant;

use async_trait::async_trait;
use http::StatusCode;
use tracing::info;

use super::{Flow, Middleware};
use crate::context::Context;
use crate::error::Error;

/// Logs method, path, status and latency once per request.
///
/// Errors pass through untouched; the status logged for them is the one a
/// renderer would use.
#[derive(Debug, Default)]
pub struct Trace {
    started: Option<Instant>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Middleware for Trace {
    async fn enter(&mut self, _cx: &mut Context) -> Result<(), Error> {
        self.started = Some(Instant::now());
        Ok(())
    }

    async fn leave(&mut self, cx: &mut Context, error: Option<&Error>) -> Result<Flow, Error> {
        let latency = self.started.map(|t| t.elapsed()).unwrap_or_default();
        let status = match (error, cx.response()) {
            (Some(err), _)    => err.status(),
            (None, Some(res)) => res.status_code(),
            (None, None)      => StatusCode::NO_CONTENT,
        };
        info!(
            method = %cx.request().method(),
            path = cx.request().path(),
            status = status.as_u16(),
            latency_us = latency.as_micros() as u64,
            "request finished",
        );
        Ok(Flow::Pass)
    }
}

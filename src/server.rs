//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **Ctrl-C** the server:
//! 1. Stops `listener.accept()` immediately; no new connections are made.
//! 2. Lets in-flight connection tasks run to completion, for at most the
//!    configured drain timeout.
//! 3. Aborts the remaining connections and cancels their request pipelines.
//! 4. Waits, again for at most the drain timeout, until every pipeline has
//!    torn its middleware down, then returns from [`Server::serve`].
//!
//! # Request cancellation
//!
//! Every request's pipeline runs on its own task. If the client goes away
//! hyper drops the service future, which fires that pipeline's
//! cancellation signal: the middleware stack abandons the work in flight
//! and tears down with [`Error::Cancelled`].

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::App;
use crate::config::ServerConfig;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. Other settings keep their defaults.
    ///
    /// ```rust
    /// use ferrule::Server;
    /// let server = Server::bind("127.0.0.1:3000").unwrap();
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse()
            .map_err(|e| Error::Config(format!("invalid socket address {addr:?}: {e}")))?;
        Ok(Self { config: ServerConfig { addr, ..ServerConfig::default() } })
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Starts accepting connections and dispatching them through `app`.
    ///
    /// Returns only after shutdown (SIGTERM or Ctrl-C, followed by the
    /// drain).
    pub async fn serve(self, app: App) -> Result<(), Error> {
        let listener = TcpListener::bind(self.config.addr).await?;
        let app = Arc::new(app);

        info!(addr = %self.config.addr, "ferrule listening");

        let mut tasks = tokio::task::JoinSet::new();
        let pipelines = Pipelines::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first, so a signal stops accepting even under load.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let tracker = pipelines.tracker();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| serve_request(Arc::clone(&app), tracker.clone(), req));

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        let drained = tokio::time::timeout(self.config.drain_timeout(), async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(remaining = tasks.len(), "drain timeout elapsed, aborting connections");
            pipelines.abort();
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        if !pipelines.finish(self.config.drain_timeout()).await {
            warn!("request pipelines still tearing down at exit");
        }

        info!("ferrule stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request and runs it through the app on its own task.
///
/// Every failure becomes a response here, so hyper never sees an error.
async fn serve_request(
    app: Arc<App>,
    tracker: Tracker,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return Ok(unreadable_body(&app, e).into_http().await),
    };

    let request = match Request::from_parts(parts, body) {
        Ok(request) => request,
        Err(err) => return Ok(app.render_error(&err).into_http().await),
    };

    // Dropping `_cancel` (hyper drops this future when the client goes away)
    // resolves `cancelled` inside the pipeline.
    let (_cancel, cancelled) = oneshot::channel::<()>();
    match spawn_pipeline(app, tracker, request, cancelled).await {
        Ok(res) => Ok(res),
        Err(e) => {
            error!("request task failed: {e}");
            Ok(Response::status(StatusCode::INTERNAL_SERVER_ERROR).into_http().await)
        }
    }
}

/// A body that could not be read is a client error, rendered like any other.
fn unreadable_body(app: &App, e: impl std::fmt::Display) -> Response {
    warn!("failed to read request body: {e}");
    app.render_error(&Error::BadRequest(format!("unreadable request body: {e}")))
}

/// Runs `request` through `app` on its own task. The pipeline is cancelled
/// when `cancelled` resolves or the server aborts all pipelines.
fn spawn_pipeline(
    app: Arc<App>,
    tracker: Tracker,
    request: Request,
    cancelled: oneshot::Receiver<()>,
) -> JoinHandle<http::Response<Full<Bytes>>> {
    let Tracker { mut aborted, live } = tracker;
    tokio::spawn(async move {
        let cancel = async move {
            tokio::select! {
                _ = cancelled => {}
                () = wait_for_abort(&mut aborted) => {}
            }
        };
        let res = app.respond_with_cancel(request, cancel).await;
        drop(live);
        res.into_http().await
    })
}

// ── Pipeline tracking ─────────────────────────────────────────────────────────

/// Every request pipeline the server has spawned.
///
/// Each pipeline holds a [`Tracker`]; [`finish`](Pipelines::finish) resolves
/// once the last one is dropped.
struct Pipelines {
    abort: watch::Sender<bool>,
    live: mpsc::Sender<()>,
    finished: mpsc::Receiver<()>,
}

#[derive(Clone)]
struct Tracker {
    aborted: watch::Receiver<bool>,
    live: mpsc::Sender<()>,
}

impl Pipelines {
    fn new() -> Self {
        let (abort, _) = watch::channel(false);
        let (live, finished) = mpsc::channel(1);
        Self { abort, live, finished }
    }

    fn tracker(&self) -> Tracker {
        Tracker { aborted: self.abort.subscribe(), live: self.live.clone() }
    }

    /// Cancels every pipeline still running.
    fn abort(&self) {
        self.abort.send_replace(true);
    }

    /// Waits up to `limit` for every pipeline to finish. Returns `false` if
    /// some were still running.
    async fn finish(self, limit: Duration) -> bool {
        let Self { abort, live, mut finished } = self;
        drop(live);
        let done = tokio::time::timeout(limit, finished.recv()).await.is_ok();
        drop(abort);
        done
    }
}

async fn wait_for_abort(aborted: &mut watch::Receiver<bool>) {
    // A closed channel means the server is gone without aborting.
    let closed = aborted.wait_for(|&abort| abort).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::context::Context;
    use crate::endpoint::{Candidate, Endpoint};
    use crate::handler::Call;
    use crate::method::Method;
    use crate::middleware::{Flow, Middleware};
    use crate::output::Text;

    struct Teardown(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Middleware for Teardown {
        async fn leave(&mut self, _cx: &mut Context, error: Option<&Error>) -> Result<Flow, Error> {
            let seen = error.map_or_else(|| "ok".to_owned(), ToString::to_string);
            self.0.lock().unwrap().push(seen);
            Ok(Flow::Pass)
        }
    }

    async fn stall(_: Call) -> &'static str {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        "never"
    }

    #[tokio::test]
    async fn aborted_pipelines_tear_down_before_finish_returns() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let slow = Endpoint::builder("slow")
            .candidate(Candidate::new(Method::Get, "wait", stall).returns(Text))
            .build();
        let app = App::new()
            .middleware(move || Teardown(Arc::clone(&sink)))
            .routes(move |r| {
                r.route("/slow", &slow);
            });

        let pipelines = Pipelines::new();
        let (_cancel, cancelled) = oneshot::channel();
        let task = spawn_pipeline(Arc::new(app), pipelines.tracker(), Request::new(Method::Get, "/slow"), cancelled);
        tokio::time::sleep(Duration::from_millis(10)).await;

        pipelines.abort();
        assert!(pipelines.finish(Duration::from_secs(5)).await);
        assert_eq!(*log.lock().unwrap(), ["request cancelled"]);
        assert_eq!(task.await.unwrap().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn finish_without_pipelines_returns_at_once() {
        assert!(Pipelines::new().finish(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn unreadable_body_goes_through_the_renderer() {
        let app = App::new().error_renderer(|err| {
            Response::builder()
                .status(err.status())
                .body(crate::response::ContentType::Json, r#"{"error":"bad body"}"#)
        });
        let res = unreadable_body(&app, "connection reset").into_http().await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"error":"bad body"}"#);
    }
}

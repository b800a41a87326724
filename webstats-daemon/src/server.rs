//! Pixel HTTP server -- request handler and hyper accept loop.
//!
//! Every request, whatever its path or method, is answered the same way:
//! `200 OK` with `Content-Type: text/css` and an empty body when the host is
//! allowlisted, `404 Not Found` with an empty body otherwise. The client never
//! sees whether a batch flush succeeded.
//!
//! One tokio task serves each connection. On cancellation the listener stops
//! accepting, open connections are asked to finish their in-flight request,
//! and anything still open after [`CONNECTION_DRAIN_TIMEOUT`] is aborted.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::Empty;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use webstats_collector::Collector;
use webstats_collector::extract::{extract, request_host};

/// How long open connections may keep running after shutdown starts.
pub const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Response body type: always empty.
pub type PixelBody = Empty<Bytes>;

/// Handle a single pixel request.
///
/// `peer` is the remote address of the connection, used when neither
/// `X-Real-IP` nor `X-Forwarded-For` is present.
pub fn handle_request<B>(
    collector: &Collector,
    req: &Request<B>,
    peer: Option<SocketAddr>,
) -> Response<PixelBody> {
    let observation = collector.observe(request_host(req), || extract(req, peer));
    if observation.is_accepted() {
        pixel_response()
    } else {
        not_found()
    }
}

/// `200 OK`, `text/css`, empty body.
pub fn pixel_response() -> Response<PixelBody> {
    let mut response = Response::new(Empty::new());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/css"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

/// `404 Not Found`, empty body.
pub fn not_found() -> Response<PixelBody> {
    let mut response = Response::new(Empty::new());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

/// HTTP/1 pixel server bound to a TCP listener.
pub struct PixelServer {
    listener: TcpListener,
    collector: Arc<Collector>,
}

impl PixelServer {
    /// Bind the listener.
    pub async fn bind(addr: SocketAddr, collector: Arc<Collector>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, collector))
    }

    /// Wrap an already bound listener.
    pub fn from_listener(listener: TcpListener, collector: Arc<Collector>) -> Self {
        Self {
            listener,
            collector,
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until `cancel` fires.
    ///
    /// Returns once every connection has finished or been aborted.
    ///
    /// # Errors
    ///
    /// Returns an error for accept failures other than aborted, reset or
    /// refused connections.
    pub async fn serve(self, cancel: CancellationToken) -> io::Result<()> {
        let addr = self.local_addr()?;
        info!(listen_addr = %addr, "pixel server listening");

        let server = http1::Builder::new();
        let mut connections = JoinSet::new();

        let result = loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        break Err(e);
                    }
                    Ok(conn) => conn,
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!(error = %e, "connection handler panicked");
                        }
                    }
                    continue;
                }
            };

            let collector = Arc::clone(&self.collector);
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = handle_request(&collector, &req, Some(peer));
                async move { Ok::<_, Infallible>(response) }
            });

            let server = server.clone();
            let cancel = cancel.clone();
            connections.spawn(async move {
                let conn = server.serve_connection(TokioIo::new(stream), service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = cancel.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };
                if let Err(e) = result {
                    debug!(peer = %peer, error = %e, "connection error");
                }
            });
        };

        drain_connections(&mut connections).await;
        info!(listen_addr = %addr, "pixel server stopped");
        result
    }
}

async fn drain_connections(connections: &mut JoinSet<()>) {
    if connections.is_empty() {
        return;
    }

    debug!(open = connections.len(), "waiting for open connections");
    let drained = tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            open = connections.len(),
            "connections still open after drain timeout, aborting"
        );
        connections.shutdown().await;
    }
}

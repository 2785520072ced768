// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview gateway.
//!
//! A separate listener, no bearer auth: the Host header names the
//! project (`{port}-{prefix8}[-{token}].{base-domain}`) and the embedded
//! capability token gates non-public projects. Plain HTTP streams
//! through a reverse-proxy client; upgraded requests get a second
//! WebSocket dial and a byte shovel. The gateway never retries.
//!
//! The inbound server carries three timeout dimensions: a header read
//! budget on each connection, a per-write deadline while streaming
//! response bodies or shoveling frames, and an idle window after which a
//! quiet connection is dropped. [`serve`] owns the accept loop so each
//! socket can be wrapped before hyper sees it.

use crate::bridge::{to_client, to_upstream, Relay};
use crate::state::AppState;
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::ws::{Message as ClientMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt as _;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use loft_core::{PreviewHost, ProjectStatus};
use loft_engine::Endpoints;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpListener;
use tower::ServiceExt as _;

/// Streaming reverse-proxy client shared by all preview requests.
pub type ProxyClient = Client<HttpConnector, Body>;

pub fn proxy_client() -> ProxyClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Inbound read budget: time allowed to read a request's header block.
const READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-write deadline while streaming a response body or shoveling
/// frames to the client.
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);
/// Idle window after which a quiet preview connection is dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
/// Budget for the upstream to produce response headers.
const UPSTREAM_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
/// Upstream WebSocket handshake budget.
const WS_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Hop-by-hop headers are connection-local and never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn router(state: AppState) -> Router {
    Router::new().fallback(handle).with_state(state)
}

/// Accept loop for the preview listener. Each socket is wrapped in the
/// idle-timeout adapter and served by hyper with the header read budget
/// applied; upgrades pass through for the WebSocket shovel.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => accepted?,
        };

        let router = router.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(IdleTimeout::new(stream, IDLE_TIMEOUT));
            let service = service_fn(move |request: hyper::Request<Incoming>| {
                router.clone().oneshot(request.map(Body::new))
            });

            let mut builder = auto::Builder::new(TokioExecutor::new());
            builder.http1().timer(TokioTimer::new()).header_read_timeout(READ_TIMEOUT);
            if let Err(e) = builder.serve_connection_with_upgrades(io, service).await {
                tracing::debug!(%peer, error = %e, "preview connection ended");
            }
        });
    }
    Ok(())
}

enum GatewayError {
    /// Unknown prefix or unparsable host; both read as 404.
    NotFound,
    /// Wrong or missing capability token.
    Forbidden,
    /// Upstream connect failure.
    BadGateway(String),
    /// Upstream exceeded its response budget.
    Timeout,
    BadRequest(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::NotFound => (StatusCode::NOT_FOUND, "unknown preview host"),
            GatewayError::Forbidden => (StatusCode::FORBIDDEN, "invalid preview token"),
            GatewayError::BadGateway(message) => {
                tracing::warn!(error = %message, "preview upstream unreachable");
                (StatusCode::BAD_GATEWAY, "upstream unreachable")
            }
            GatewayError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "upstream timed out"),
            GatewayError::BadRequest(message) => {
                tracing::debug!(error = %message, "bad preview request");
                (StatusCode::BAD_REQUEST, "bad request")
            }
        }
        .into_response()
    }
}

async fn handle(State(state): State<AppState>, req: Request) -> Response {
    match proxy(state, req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn proxy(state: AppState, req: Request) -> Result<Response, GatewayError> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let preview = PreviewHost::parse(host).map_err(|_| GatewayError::NotFound)?;

    let project = state
        .store
        .get_project_by_prefix(&preview.prefix)
        .await
        .map_err(|_| GatewayError::NotFound)?;

    // Wrong or absent token never reaches upstream.
    if !project.public && preview.token.as_deref() != Some(project.capability_token.as_str()) {
        return Err(GatewayError::Forbidden);
    }

    if project.status != ProjectStatus::Running {
        return Err(GatewayError::BadGateway(format!("project is {}", project.status)));
    }
    let endpoints = state
        .resolver
        .resolve(&project)
        .await
        .map_err(|e| GatewayError::BadGateway(e.to_string()))?;

    if is_websocket_upgrade(req.headers()) {
        proxy_websocket(req, endpoints, preview.port).await
    } else {
        proxy_http(state, req, endpoints, preview.port).await
    }
}

/// Transparent streaming proxy: method, path, query, and non-hop-by-hop
/// headers pass through untouched. The response body is re-wrapped so
/// every chunk is bounded by the write deadline.
async fn proxy_http(
    state: AppState,
    mut req: Request,
    endpoints: Endpoints,
    port: u16,
) -> Result<Response, GatewayError> {
    let path_and_query =
        req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string();
    let uri: Uri = format!("{}{}", endpoints.preview_url(port), path_and_query)
        .parse()
        .map_err(|e| GatewayError::BadGateway(format!("bad upstream uri: {e}")))?;
    *req.uri_mut() = uri;
    strip_hop_by_hop(req.headers_mut());

    match tokio::time::timeout(UPSTREAM_RESPONSE_TIMEOUT, state.proxy.request(req)).await {
        Ok(Ok(response)) => {
            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(parts, with_write_deadline(body, WRITE_TIMEOUT)))
        }
        Ok(Err(e)) => Err(GatewayError::BadGateway(e.to_string())),
        Err(_) => Err(GatewayError::Timeout),
    }
}

/// Second WebSocket dial with the same path, then a byte shovel in both
/// directions until either side closes.
async fn proxy_websocket(
    req: Request,
    endpoints: Endpoints,
    port: u16,
) -> Result<Response, GatewayError> {
    let path_and_query =
        req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string();
    let target = format!("ws://{}:{}{}", endpoints.host, port, path_and_query);

    let (mut parts, _body) = req.into_parts();
    let ws = WebSocketUpgrade::from_request_parts(&mut parts, &())
        .await
        .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    Ok(ws.on_upgrade(move |client| shovel(client, target)).into_response())
}

/// Bidirectional byte shovel between the browser and the guest port.
/// Every send is bounded by the write deadline so a stalled peer tears
/// the pair down instead of parking it forever.
async fn shovel(mut client: WebSocket, target: String) {
    let upstream = match tokio::time::timeout(
        WS_DIAL_TIMEOUT,
        tokio_tungstenite::connect_async(target.as_str()),
    )
    .await
    {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            tracing::warn!(%target, error = %e, "preview ws dial failed");
            let _ = client.send(ClientMessage::Close(None)).await;
            return;
        }
        Err(_) => {
            tracing::warn!(%target, "preview ws dial timed out");
            let _ = client.send(ClientMessage::Close(None)).await;
            return;
        }
    };

    let (mut up_sink, mut up_stream) = upstream.split();
    loop {
        tokio::select! {
            message = client.recv() => match message {
                Some(Ok(message)) => match to_upstream(message) {
                    Relay::Forward(frame) => {
                        let sent =
                            tokio::time::timeout(WRITE_TIMEOUT, up_sink.send(frame)).await;
                        if !matches!(sent, Ok(Ok(()))) {
                            break;
                        }
                    }
                    Relay::Control => {}
                    Relay::Shutdown => break,
                },
                Some(Err(_)) | None => break,
            },
            message = up_stream.next() => match message {
                Some(Ok(message)) => match to_client(message) {
                    Relay::Forward(frame) => {
                        let sent =
                            tokio::time::timeout(WRITE_TIMEOUT, client.send(frame)).await;
                        if !matches!(sent, Ok(Ok(()))) {
                            break;
                        }
                    }
                    Relay::Control => {}
                    Relay::Shutdown => break,
                },
                Some(Err(_)) | None => break,
            },
        }
    }
    let _ = up_sink.send(tokio_tungstenite::tungstenite::Message::Close(None)).await;
    let _ = client.send(ClientMessage::Close(None)).await;
}

/// Re-wrap a proxied response body so producing each chunk is bounded by
/// `deadline`. A consumer that stops draining (or an upstream that stops
/// producing) aborts the stream instead of pinning the connection open.
fn with_write_deadline<B>(body: B, deadline: Duration) -> Body
where
    B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<axum::BoxError>,
{
    let stream = futures_util::stream::try_unfold(body, move |mut body| async move {
        loop {
            match tokio::time::timeout(deadline, body.frame()).await {
                Ok(Some(Ok(frame))) => {
                    if let Ok(data) = frame.into_data() {
                        return Ok(Some((data, body)));
                    }
                    // Trailers and other non-data frames are dropped.
                }
                Ok(Some(Err(e))) => {
                    return Err(io::Error::new(io::ErrorKind::Other, e.into()));
                }
                Ok(None) => return Ok(None),
                Err(_) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "write deadline lapsed"));
                }
            }
        }
    });
    Body::from_stream(stream)
}

/// I/O adapter that errors when a connection makes no read or write
/// progress inside the idle window. The window resets on every completed
/// poll in either direction.
struct IdleTimeout<S> {
    inner: S,
    window: Duration,
    deadline: Pin<Box<tokio::time::Sleep>>,
}

impl<S> IdleTimeout<S> {
    fn new(inner: S, window: Duration) -> Self {
        Self { inner, window, deadline: Box::pin(tokio::time::sleep(window)) }
    }

    fn touch(&mut self) {
        let at = tokio::time::Instant::now() + self.window;
        self.deadline.as_mut().reset(at);
    }

    fn idle_expired(&mut self, cx: &mut Context<'_>) -> bool {
        self.deadline.as_mut().poll(cx).is_ready()
    }

    fn idle_error() -> io::Error {
        io::Error::new(io::ErrorKind::TimedOut, "preview connection idle")
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for IdleTimeout<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => {
                if this.idle_expired(cx) {
                    return Poll::Ready(Err(Self::idle_error()));
                }
                Poll::Pending
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for IdleTimeout<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => {
                if this.idle_expired(cx) {
                    return Poll::Ready(Err(Self::idle_error()));
                }
                Poll::Pending
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => {
                if this.idle_expired(cx) {
                    return Poll::Ready(Err(Self::idle_error()));
                }
                Poll::Pending
            }
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by the Connection header are hop-by-hop too.
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .collect();
    for name in HOP_BY_HOP.iter().copied().map(str::to_string).chain(named) {
        headers.remove(name.as_str());
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;

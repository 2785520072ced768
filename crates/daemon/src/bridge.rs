// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace session bridge.
//!
//! Client socket ⇄ VM socket. Pre-bridge steps (authorize, resolve,
//! build env) run synchronously and fail as HTTP statuses; once the
//! upgrade is accepted, failures surface as a structured error frame and
//! a close. The session itself is three cooperative tasks (two
//! forwarders and a heartbeat) bounded by whichever side goes away
//! first.
//!
//! Invariants:
//! - exactly one writer touches the client socket at a time (the write
//!   mutex serializes data frames, pings, and the error frame);
//! - frames are opaque bytes end to end, never parsed or rewritten;
//! - teardown is idempotent (the done token cancels at most once, both
//!   sockets close exactly once, the forwarders join before return);
//! - no frame is staged in an unbounded queue: a slow client blocks the
//!   forwarder, which stalls the upstream receive buffer.

use crate::auth::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::ws::{Message as ClientMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use loft_core::{AgentEnv, Correlation, ProjectId, ProjectStatus, SystemClock};
use loft_engine::{ActivityTracker, Endpoints};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Read limit on the client socket.
const CLIENT_READ_LIMIT: usize = 8 * 1024;
/// How long the client has to show life (any inbound frame, pongs
/// included) before the session is torn down.
const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping cadence: pong-wait × 0.9.
const PING_INTERVAL: Duration = Duration::from_secs(54);
/// Per-write deadline on the client socket.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Upstream dial: attempts, gap, and per-attempt handshake budget.
const DIAL_ATTEMPTS: usize = 5;
const DIAL_RETRY_DELAY: Duration = Duration::from_secs(2);
const DIAL_HANDSHAKE_BUDGET: Duration = Duration::from_secs(10);

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ClientWriter = Arc<Mutex<SplitSink<WebSocket, ClientMessage>>>;

/// `GET /projects/{id}/workspace`: authenticate (middleware), authorize,
/// resolve, build env, upgrade, bridge.
pub async fn workspace(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let project = state.store.get_project_by_user(id, ctx.user).await?;
    if project.status != ProjectStatus::Running {
        return Err(ApiError::BadRequest(format!("project is {}", project.status)));
    }

    let endpoints = state
        .resolver
        .resolve(&project)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let correlation = Correlation {
        request_id: ctx.request_id,
        user_id: ctx.user,
        project_id: project.id,
    };
    let env = state.lifecycle.agent_env(&project, Some(correlation)).await?;

    Ok(ws
        .protocols(["bearer"])
        .max_message_size(CLIENT_READ_LIMIT)
        .on_upgrade(move |client| run_session(state, project.id, endpoints, env, client)))
}

async fn run_session(
    state: AppState,
    project_id: ProjectId,
    endpoints: Endpoints,
    env: AgentEnv,
    mut client: WebSocket,
) {
    let url = endpoints.workspace_url();

    let (upstream, pending) = match dial_with_retry(&url, &env, &mut client).await {
        Ok(DialOutcome::Connected { upstream, pending }) => (upstream, pending),
        Ok(DialOutcome::ClientGone) => {
            tracing::debug!(%project_id, "client left during upstream dial");
            return;
        }
        Err(message) => {
            tracing::warn!(%project_id, error = %message, "upstream dial failed");
            send_error_frame(&mut client, &message).await;
            let _ = client.send(ClientMessage::Close(None)).await;
            return;
        }
    };
    tracing::info!(%project_id, upstream = %url, "workspace session established");

    let (mut up_sink, up_stream) = upstream.split();
    let (client_sink, client_stream) = client.split();
    let writer: ClientWriter = Arc::new(Mutex::new(client_sink));
    let done = CancellationToken::new();

    // Frames the client sent while we were dialing go out first so
    // ordering is preserved.
    for frame in pending {
        if up_sink.send(frame).await.is_err() {
            done.cancel();
            break;
        }
    }

    let uplink = tokio::spawn(client_to_upstream(
        client_stream,
        up_sink,
        state.activity.clone(),
        project_id,
        done.clone(),
    ));
    let downlink = tokio::spawn(upstream_to_client(
        up_stream,
        writer.clone(),
        state.activity.clone(),
        project_id,
        done.clone(),
    ));
    let pinger = tokio::spawn(heartbeat(writer.clone(), done.clone()));

    done.cancelled().await;

    // Close the client side under the write mutex; the upstream side is
    // closed by the uplink forwarder on its way out.
    {
        let mut sink = writer.lock().await;
        let _ = tokio::time::timeout(WRITE_DEADLINE, sink.send(ClientMessage::Close(None))).await;
    }
    let _ = tokio::join!(uplink, downlink, pinger);
    state.activity.forget(project_id);
    tracing::info!(%project_id, "workspace session closed");
}

/// What a relayed frame turns into on the other socket.
pub(crate) enum Relay<T> {
    Forward(T),
    /// Pings/pongs are transport-local, never bridged.
    Control,
    Shutdown,
}

pub(crate) fn to_upstream(message: ClientMessage) -> Relay<UpstreamMessage> {
    match message {
        ClientMessage::Text(text) => Relay::Forward(UpstreamMessage::Text(text.into())),
        ClientMessage::Binary(data) => Relay::Forward(UpstreamMessage::Binary(data.into())),
        ClientMessage::Ping(_) | ClientMessage::Pong(_) => Relay::Control,
        ClientMessage::Close(_) => Relay::Shutdown,
    }
}

pub(crate) fn to_client(message: UpstreamMessage) -> Relay<ClientMessage> {
    match message {
        UpstreamMessage::Text(text) => {
            Relay::Forward(ClientMessage::Text(text.as_str().to_string()))
        }
        UpstreamMessage::Binary(data) => Relay::Forward(ClientMessage::Binary(data.to_vec())),
        UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) => Relay::Control,
        UpstreamMessage::Close(_) => Relay::Shutdown,
        // Raw frames never surface from a read.
        UpstreamMessage::Frame(_) => Relay::Control,
    }
}

/// Client → upstream forwarder. Owns the upstream sink; closes it on the
/// way out so the guest sees EOF exactly once.
async fn client_to_upstream(
    mut client: SplitStream<WebSocket>,
    mut upstream: SplitSink<Upstream, UpstreamMessage>,
    activity: ActivityTracker<SystemClock>,
    project_id: ProjectId,
    done: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = done.cancelled() => break,
            next = tokio::time::timeout(PONG_WAIT, client.next()) => next,
        };
        // Any inbound frame (pongs included) refreshes the read deadline.
        let Ok(next) = next else {
            tracing::debug!(%project_id, "client read deadline lapsed");
            break;
        };
        match next {
            Some(Ok(message)) => match to_upstream(message) {
                Relay::Forward(frame) => {
                    activity.touch(project_id);
                    if upstream.send(frame).await.is_err() {
                        break;
                    }
                }
                Relay::Control => {}
                Relay::Shutdown => break,
            },
            Some(Err(_)) | None => break,
        }
    }
    let _ = upstream.send(UpstreamMessage::Close(None)).await;
    done.cancel();
}

/// Upstream → client forwarder. Writes under the client write mutex with
/// the per-write deadline.
async fn upstream_to_client(
    mut upstream: SplitStream<Upstream>,
    writer: ClientWriter,
    activity: ActivityTracker<SystemClock>,
    project_id: ProjectId,
    done: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = done.cancelled() => break,
            next = upstream.next() => next,
        };
        match next {
            Some(Ok(message)) => match to_client(message) {
                Relay::Forward(frame) => {
                    activity.touch(project_id);
                    if !write_client(&writer, frame).await {
                        break;
                    }
                }
                Relay::Control => {}
                Relay::Shutdown => break,
            },
            Some(Err(_)) | None => break,
        }
    }
    done.cancel();
}

/// Heartbeat: a ping under the write mutex every [`PING_INTERVAL`].
async fn heartbeat(writer: ClientWriter, done: CancellationToken) {
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // immediate first tick
    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {
                if !write_client(&writer, ClientMessage::Ping(Vec::new())).await {
                    break;
                }
            }
        }
    }
    done.cancel();
}

/// One serialized client write with the 10 s deadline.
async fn write_client(writer: &ClientWriter, frame: ClientMessage) -> bool {
    let mut sink = writer.lock().await;
    matches!(tokio::time::timeout(WRITE_DEADLINE, sink.send(frame)).await, Ok(Ok(())))
}

enum DialOutcome {
    Connected { upstream: Upstream, pending: Vec<UpstreamMessage> },
    ClientGone,
}

/// Dial the guest with finite retry. Between attempts the client socket
/// is watched: data frames are stashed for delivery after connect, and a
/// gone client aborts the loop early.
async fn dial_with_retry(
    url: &str,
    env: &AgentEnv,
    client: &mut WebSocket,
) -> Result<DialOutcome, String> {
    let mut pending = Vec::new();
    let mut last_error = String::new();

    for attempt in 0..DIAL_ATTEMPTS {
        if attempt > 0 {
            let wait = tokio::time::sleep(DIAL_RETRY_DELAY);
            tokio::pin!(wait);
            loop {
                tokio::select! {
                    _ = &mut wait => break,
                    message = client.recv() => match message {
                        Some(Ok(message)) => match to_upstream(message) {
                            Relay::Forward(frame) => pending.push(frame),
                            Relay::Control => {}
                            Relay::Shutdown => return Ok(DialOutcome::ClientGone),
                        },
                        Some(Err(_)) | None => return Ok(DialOutcome::ClientGone),
                    },
                }
            }
        }

        match dial_once(url, env).await {
            Ok(upstream) => return Ok(DialOutcome::Connected { upstream, pending }),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "upstream dial attempt failed");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

async fn dial_once(url: &str, env: &AgentEnv) -> Result<Upstream, String> {
    let mut request =
        url.into_client_request().map_err(|e| format!("bad upstream url: {e}"))?;
    for (name, value) in env.to_headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("bad env header name: {e}"))?;
        let value =
            HeaderValue::from_str(&value).map_err(|e| format!("bad env header value: {e}"))?;
        request.headers_mut().insert(name, value);
    }

    match tokio::time::timeout(DIAL_HANDSHAKE_BUDGET, tokio_tungstenite::connect_async(request))
        .await
    {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(format!("upstream connect: {e}")),
        Err(_) => Err("upstream connect: handshake timed out".to_string()),
    }
}

/// Post-upgrade failures surface as a structured error frame before the
/// close; transport errors after that are a silent teardown.
async fn send_error_frame(client: &mut WebSocket, message: &str) {
    let frame = error_frame(message);
    let _ = tokio::time::timeout(WRITE_DEADLINE, client.send(ClientMessage::Text(frame))).await;
}

fn error_frame(message: &str) -> String {
    serde_json::json!({ "channel": "error", "type": "error", "error": message }).to_string()
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;

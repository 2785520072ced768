// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the scenario specs.

use axum::body::Body;
use clap::Parser as _;
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use jsonwebtoken::{encode, EncodingKey, Header};
use loft_adapters::{FakeProvider, MachineProvider};
use loft_core::{ProjectStatus, SystemClock, UserId};
use loft_daemon::{gateway, routes, AppState, Config};
use loft_engine::{
    ActivityTracker, ConnectionResolver, EngineConfig, InfraManager, Lifecycle, Vault,
};
use loft_storage::{MemStore, Store};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub use serde_json::json;

pub const JWT_SECRET: &str = "spec-secret";
pub const ENCRYPTION_KEY: &str = "spec-encryption-key";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A daemon with both listeners on real ephemeral sockets.
pub struct Harness {
    pub state: AppState,
    pub provider: FakeProvider,
    pub store: Arc<MemStore>,
    pub api: SocketAddr,
    pub preview: SocketAddr,
    http: Client<HttpConnector, Body>,
}

impl Harness {
    pub async fn spawn() -> Harness {
        let config = Config::try_parse_from([
            "loftd",
            "--store",
            "memory",
            "--jwt-secret",
            JWT_SECRET,
            "--encryption-key",
            ENCRYPTION_KEY,
        ])
        .unwrap();

        let store = Arc::new(MemStore::new());
        let provider = FakeProvider::new();
        let store_dyn: Arc<dyn Store> = store.clone();
        let provider_dyn: Arc<dyn MachineProvider> = Arc::new(provider.clone());
        let vault = Arc::new(Vault::new(ENCRYPTION_KEY));
        let engine_config = Arc::new(EngineConfig::default());
        let clock = SystemClock;

        let state = AppState {
            lifecycle: Lifecycle::new(
                store_dyn.clone(),
                provider_dyn.clone(),
                vault.clone(),
                engine_config.clone(),
                clock.clone(),
            ),
            infra: InfraManager::new(
                store_dyn.clone(),
                provider_dyn.clone(),
                vault.clone(),
                engine_config,
            ),
            resolver: ConnectionResolver::new(provider_dyn),
            activity: ActivityTracker::new(store_dyn.clone(), clock),
            store: store_dyn,
            vault,
            config: Arc::new(config),
            proxy: gateway::proxy_client(),
        };

        let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api = api_listener.local_addr().unwrap();
        let api_router = routes::router(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(api_listener, api_router).await;
        });

        let preview_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let preview = preview_listener.local_addr().unwrap();
        let preview_router = gateway::router(state.clone());
        tokio::spawn(async move {
            // The real accept loop, idle wrapper and read budget included.
            let _ = gateway::serve(preview_listener, preview_router, std::future::pending()).await;
        });

        Harness {
            state,
            provider,
            store,
            api,
            preview,
            http: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
        }
    }

    pub fn token(&self, user: UserId) -> String {
        #[derive(Serialize)]
        struct Claims {
            sub: String,
            exp: usize,
        }
        let claims = Claims {
            sub: user.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes()))
            .unwrap()
    }

    /// One API request; returns the status and the parsed JSON body
    /// (null when the body is empty).
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder =
            Request::builder().method(method).uri(format!("http://{}{}", self.api, path));
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = self.http.request(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, value)
    }

    /// One preview request with an explicit Host header.
    pub async fn preview_request(&self, host: &str, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri(format!("http://{}{}", self.preview, path))
            .header("host", host)
            .body(Body::empty())
            .unwrap();
        let response = self.http.request(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Create a project and return its JSON body.
    pub async fn create_project(&self, token: &str, body: serde_json::Value) -> serde_json::Value {
        let (status, project) = self.request("POST", "/projects", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{project}");
        project
    }

    /// Poll the API until the project reports `status`.
    pub async fn wait_api_status(
        &self,
        token: &str,
        id: &str,
        status: ProjectStatus,
    ) -> serde_json::Value {
        let want = status.to_string();
        for _ in 0..200 {
            let (code, project) =
                self.request("GET", &format!("/projects/{id}"), Some(token), None).await;
            assert_eq!(code, StatusCode::OK, "{project}");
            if project["status"] == want.as_str() {
                return project;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("project never reached {want}");
    }

    /// Open a workspace session using the subprotocol smuggle. Returns
    /// the socket and the negotiated subprotocol.
    pub async fn open_workspace(&self, token: &str, id: &str) -> (WsClient, Option<String>) {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;
        let mut request = format!("ws://{}/projects/{}/workspace", self.api, id)
            .into_client_request()
            .unwrap();
        request.headers_mut().insert(
            "sec-websocket-protocol",
            format!("bearer, {token}").parse().unwrap(),
        );
        let (ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
        let protocol = response
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        (ws, protocol)
    }
}

/// Next data frame from a socket, skipping transport control frames.
/// `None` on close, error, or timeout.
pub async fn next_text(ws: &mut WsClient, timeout: Duration) -> Option<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(tokio::time::Instant::now())?;
        let message = tokio::time::timeout(remaining, ws.next()).await.ok()??;
        match message {
            Ok(Message::Text(text)) => return Some(text.as_str().to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// An echo WebSocket server standing in for the guest's workspace
/// daemon. Captures the `X-Agent-Env-*` handshake headers.
pub struct FakeUpstream {
    pub addr: SocketAddr,
    pub env_headers: Arc<Mutex<Vec<(String, String)>>>,
}

pub async fn spawn_echo_upstream() -> FakeUpstream {
    use tokio_tungstenite::tungstenite::handshake::server::{
        Request as WsRequest, Response as WsResponse,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let env_headers = Arc::new(Mutex::new(Vec::new()));

    let captured = env_headers.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let captured = captured.clone();
            tokio::spawn(async move {
                let callback = |req: &WsRequest, response: WsResponse| {
                    let mut headers = captured.lock().unwrap();
                    for (name, value) in req.headers() {
                        if name.as_str().starts_with("x-agent-env-") {
                            headers.push((
                                name.as_str().to_string(),
                                value.to_str().unwrap_or_default().to_string(),
                            ));
                        }
                    }
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(_) | Message::Binary(_) => {
                            if ws.send(message).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    FakeUpstream { addr, env_headers }
}

/// A port nothing is listening on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

//! ==============================================================================
//! server.rs - web server and observer transport
//! ==============================================================================
//!
//! purpose:
//!     the process entry point for observers.
//!
//!     routes:
//!         GET  /             static dashboard page (read from disk)
//!         GET  /ws           websocket: telemetry out, commands in
//!         GET  /api/status   link + hub + loop counters as json
//!         POST /api/command  ?action=manual_retract|manual_reverse|steamer_on
//!
//!     websocket frames are json envelopes:
//!         out: {"event": "sensor_data", "data": {temperature, humidity, light, mq135, rain, alerts}}
//!         in:  {"event": "manual_retract"}   (a bare event name as text also works)
//!
//! relationships:
//!     - spawned by: main.rs
//!     - uses: hub.rs (observer registry, fan-out, inbound commands)
//!
//! ==============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::domain::{SensorData, TelemetryEvent};
use crate::hub::BroadcastHub;
use crate::link::DeviceLink;
use crate::telemetry::TelemetryStats;

pub const SENSOR_DATA_EVENT: &str = "sensor_data";

#[derive(Clone)]
pub struct ServerState {
    pub hub: BroadcastHub,
    pub link: DeviceLink,
    pub stats: Arc<TelemetryStats>,
    pub index_path: PathBuf,
}

#[derive(Serialize)]
struct OutboundFrame<'a> {
    event: &'a str,
    data: SensorData<'a>,
}

#[derive(Deserialize)]
struct InboundFrame {
    event: String,
}

#[derive(Serialize)]
pub struct StatusReport {
    pub device_connected: bool,
    pub port: Option<String>,
    pub observers: usize,
    pub published: u64,
    pub rejected: u64,
    pub faults: u64,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler))
        .route("/api/command", post(command_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(config: &ServerConfig, state: ServerState) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// encode one telemetry event as an outbound websocket frame
pub fn encode_event(event: &TelemetryEvent) -> serde_json::Result<String> {
    serde_json::to_string(&OutboundFrame { event: SENSOR_DATA_EVENT, data: event.sensor_data() })
}

/// pull the event name out of an inbound frame
pub fn decode_inbound(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) => Some(frame.event),
        Err(_) if !text.starts_with('{') => Some(text.trim_matches('"').to_string()),
        Err(_) => None,
    }
}

async fn index_handler(State(state): State<ServerState>) -> Html<String> {
    match tokio::fs::read_to_string(&state.index_path).await {
        Ok(html) => Html(html),
        Err(e) => {
            tracing::warn!("failed to read {}: {}", state.index_path.display(), e);
            Html(format!(
                r#"<!doctype html>
<html>
<head><title>error</title></head>
<body style="font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee;">
    <h1 style="color: #ff6b6b;">⚠️ dashboard unavailable</h1>
    <p>failed to load the dashboard page:</p>
    <pre style="background: #16213e; padding: 1rem; border-radius: 8px; overflow-x: auto;">{}</pre>
    <p style="color: #888;">live data is still available on <code>/ws</code> and <code>/api/status</code>.</p>
</body>
</html>"#,
                html_escape(&format!("{}: {}", state.index_path.display(), e))
            ))
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: ServerState) {
    let mut session = state.hub.register(Some(addr));
    let id = session.id;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = decode_inbound(&text) {
                        tracing::debug!("observer {} sent {:?}", id, event);
                        // each command runs on its own, like a per-event handler
                        let hub = state.hub.clone();
                        tokio::spawn(async move {
                            hub.handle_inbound(&event).await;
                        });
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!("observer {} socket error: {}", id, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
            event = session.events.recv() => match event {
                Ok(event) => match encode_event(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("failed to encode event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("observer {} lagging, skipped {} events", id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    state.hub.unregister(id);
}

async fn status_handler(State(state): State<ServerState>) -> Json<StatusReport> {
    let stats = state.stats.snapshot();
    Json(StatusReport {
        device_connected: state.link.is_connected(),
        port: state.link.port_name(),
        observers: state.hub.observer_count(),
        published: stats.published,
        rejected: stats.rejected,
        faults: stats.faults,
    })
}

/// command params
#[derive(Deserialize)]
struct CommandParams {
    action: String,
}

/// command endpoint
/// POST /api/command?action=manual_retract|manual_reverse|steamer_on
async fn command_handler(
    State(state): State<ServerState>,
    Query(params): Query<CommandParams>,
) -> Json<serde_json::Value> {
    match state.hub.handle_inbound(&params.action).await {
        Some(outcome) => Json(serde_json::json!({
            "status": "ok",
            "action": params.action,
            "outcome": outcome,
        })),
        None => Json(serde_json::json!({"status": "error", "message": "unknown action"})),
    }
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::CommandDispatcher;
    use crate::domain::Reading;
    use crate::link::testing::board_pair;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

    const WAIT: Duration = Duration::from_secs(5);

    fn state_with(link: DeviceLink, index_path: PathBuf) -> ServerState {
        ServerState {
            hub: BroadcastHub::new(8, CommandDispatcher::new(link.clone())),
            link,
            stats: Arc::new(TelemetryStats::default()),
            index_path,
        }
    }

    #[test]
    fn test_outbound_frame_shape() {
        let event = TelemetryEvent::new(
            Reading { temperature: 25.0, humidity: 99.0, light: 80, gas_level: 150, rain: 20 },
            vec!["High Humidity: Rain likely!".to_string()],
        );
        let value: serde_json::Value = serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "sensor_data",
                "data": {
                    "temperature": 25.0,
                    "humidity": 99.0,
                    "light": 80,
                    "mq135": 150,
                    "rain": 20,
                    "alerts": ["High Humidity: Rain likely!"],
                }
            })
        );
    }

    #[test]
    fn test_decode_inbound_forms() {
        assert_eq!(decode_inbound(r#"{"event":"manual_retract"}"#).as_deref(), Some("manual_retract"));
        assert_eq!(decode_inbound("steamer_on").as_deref(), Some("steamer_on"));
        assert_eq!(decode_inbound("\"manual_reverse\"").as_deref(), Some("manual_reverse"));
        assert_eq!(decode_inbound("{not json"), None);
        assert_eq!(decode_inbound("   "), None);
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[tokio::test]
    async fn test_index_serves_page_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<h1>weather</h1>").unwrap();

        let Html(body) = index_handler(State(state_with(DeviceLink::absent(), path))).await;
        assert_eq!(body, "<h1>weather</h1>");
    }

    #[tokio::test]
    async fn test_missing_index_renders_error_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.html");

        let Html(body) = index_handler(State(state_with(DeviceLink::absent(), path))).await;
        assert!(body.contains("dashboard unavailable"));
    }

    #[tokio::test]
    async fn test_status_without_device() {
        let state = state_with(DeviceLink::absent(), PathBuf::from("index.html"));
        let _observer = state.hub.register(None);

        let Json(report) = status_handler(State(state)).await;
        assert!(!report.device_connected);
        assert_eq!(report.port, None);
        assert_eq!(report.observers, 1);
        assert_eq!(report.published, 0);
    }

    #[tokio::test]
    async fn test_command_endpoint_writes_token() {
        let (host, mut board) = board_pair();
        let state = state_with(DeviceLink::from_port(host), PathBuf::from("index.html"));

        let Json(body) = command_handler(
            State(state.clone()),
            Query(CommandParams { action: "manual_reverse".to_string() }),
        )
        .await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["outcome"], "written");

        let mut buf = [0u8; 8];
        board.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"REVERSE\n");

        let Json(body) = command_handler(
            State(state),
            Query(CommandParams { action: "launch".to_string() }),
        )
        .await;
        assert_eq!(body["status"], "error");
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        timeout(WAIT, async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_websocket_session_round_trip() {
        let (host, mut board) = board_pair();
        let state = state_with(DeviceLink::from_port(host), PathBuf::from("index.html"));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        wait_for(|| state.hub.observer_count() == 1).await;

        // telemetry out
        state.hub.publish(TelemetryEvent::new(
            Reading { temperature: 25.0, humidity: 60.0, light: 80, gas_level: 150, rain: 20 },
            Vec::new(),
        ));
        let frame = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(value["event"], "sensor_data");
        assert_eq!(value["data"]["mq135"], 150);
        assert_eq!(value["data"]["rain"], 20);

        // command in
        ws.send(WsMessage::Text(r#"{"event":"manual_retract"}"#.into())).await.unwrap();
        let mut buf = [0u8; 8];
        timeout(WAIT, board.read_exact(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf, b"RETRACT\n");

        ws.close(None).await.unwrap();
        wait_for(|| state.hub.observer_count() == 0).await;
    }
}

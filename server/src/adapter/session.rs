//! WebSocket delivery.
//!
//! One session serves one request: the client sends a single JSON text
//! message, receives `{"status":"processing"}`, then one binary message per
//! frame, and finally `{"status":"complete","chunks_sent":N}` or
//! `{"status":"error","detail":...}` before the socket is closed.

use std::fmt::Display;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tts_core::{AudioFrame, FrameStream, TtsError};
use uuid::Uuid;

use super::TtsRequest;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingRequest,
    Processing,
    Streaming,
    Complete,
    Error,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (AwaitingRequest, Processing | Error | Closed)
                | (Processing, Streaming | Error | Closed)
                | (Streaming, Complete | Error | Closed)
                | (Complete, Closed)
                | (Error, Closed)
        )
    }
}

/// Status messages sent as JSON text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusMessage {
    Processing,
    Complete { chunks_sent: u64 },
    Error { detail: String },
}

#[derive(Debug)]
pub struct StreamSession {
    id: Uuid,
    state: SessionState,
    frames_sent: u64,
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::AwaitingRequest,
            frames_sent: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(session_id = %self.id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /ws/tts`
pub async fn ws_tts(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, inbound) = socket.split();
        run_session(state, sink, inbound).await;
    })
}

enum Inbound {
    Text(String),
    Unexpected(&'static str),
    Gone,
}

enum Step {
    Frame(Option<tts_core::Result<AudioFrame>>),
    IdleTimeout,
    ClientGone,
    ClientMessage,
}

/// Drive one session to `Closed` and return it.
pub async fn run_session<S, R, E>(state: AppState, mut sink: S, mut inbound: R) -> StreamSession
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut session = StreamSession::new();
    let idle = state.config.ws_idle_timeout();
    let endpoint = &state.metrics.websocket;
    info!(session_id = %session.id, "WebSocket session opened");

    let text = match tokio::time::timeout(idle, next_request(&mut inbound)).await {
        Ok(Inbound::Text(text)) => text,
        Ok(Inbound::Unexpected(kind)) => {
            let detail = format!("expected a JSON text message, got {kind}");
            fail(&mut sink, &mut session, detail).await;
            return session;
        }
        Ok(Inbound::Gone) => {
            session.advance(SessionState::Closed);
            info!(session_id = %session.id, "Client left before sending a request");
            return session;
        }
        Err(_) => {
            let detail = format!("no request received within {}s", idle.as_secs());
            fail(&mut sink, &mut session, detail).await;
            return session;
        }
    };

    endpoint.record_request();
    let started = Instant::now();
    let mut frames = match start_request(&state, &text) {
        Ok(frames) => frames,
        Err(e) => {
            endpoint.record_error();
            fail(&mut sink, &mut session, e.detail().to_string()).await;
            return session;
        }
    };

    session.advance(SessionState::Processing);
    if let Err(e) = send_status(&mut sink, &StatusMessage::Processing).await {
        disconnect(&mut frames, &mut session, e);
        return session;
    }

    // Only audio moves the deadline; client chatter does not.
    let idle_timer = tokio::time::sleep(idle);
    tokio::pin!(idle_timer);

    loop {
        let step = tokio::select! {
            next = frames.next_frame() => Step::Frame(next),
            _ = &mut idle_timer => Step::IdleTimeout,
            incoming = inbound.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => Step::ClientGone,
                Some(Ok(_)) => Step::ClientMessage,
            },
        };

        match step {
            Step::Frame(Some(Ok(frame))) => {
                if session.state == SessionState::Processing {
                    session.advance(SessionState::Streaming);
                    endpoint.record_first_audio(started.elapsed());
                }
                if let Err(e) = sink.send(Message::Binary(frame.payload.into())).await {
                    disconnect(&mut frames, &mut session, e.to_string());
                    return session;
                }
                session.frames_sent += 1;
                idle_timer
                    .as_mut()
                    .reset(tokio::time::Instant::now() + idle);
            }
            Step::Frame(Some(Err(e))) => {
                endpoint.record_error();
                fail(&mut sink, &mut session, e.detail().to_string()).await;
                return session;
            }
            Step::Frame(None) if session.state == SessionState::Processing => {
                endpoint.record_error();
                fail(&mut sink, &mut session, "synthesis produced no audio".to_string()).await;
                return session;
            }
            Step::Frame(None) => break,
            Step::IdleTimeout => {
                frames.cancel();
                endpoint.record_error();
                let detail = format!("no audio produced within {}s", idle.as_secs());
                fail(&mut sink, &mut session, detail).await;
                return session;
            }
            Step::ClientGone => {
                disconnect(&mut frames, &mut session, "client closed the socket".to_string());
                return session;
            }
            Step::ClientMessage => {
                debug!(session_id = %session.id, "Ignoring message received while streaming");
            }
        }
    }

    let request_id = frames.request_id().to_string();
    if let Some(summary) = frames.metrics().await {
        state.metrics.synthesis.record(&summary);
    }

    session.advance(SessionState::Complete);
    let complete = StatusMessage::Complete {
        chunks_sent: session.frames_sent,
    };
    let _ = send_status(&mut sink, &complete).await;
    let _ = sink.close().await;
    session.advance(SessionState::Closed);
    info!(
        session_id = %session.id,
        request_id = %request_id,
        chunks_sent = session.frames_sent,
        "WebSocket session complete"
    );
    session
}

fn start_request(state: &AppState, text: &str) -> Result<FrameStream, ApiError> {
    let req: TtsRequest = serde_json::from_str(text)
        .map_err(|e| ApiError::InvalidInput(format!("Malformed request: {e}")))?;
    let request = req.into_synthesis_request(&state.config)?;
    Ok(state.coordinator.run(request)?)
}

async fn next_request<R, E>(inbound: &mut R) -> Inbound
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(message) = inbound.next().await {
        match message {
            Ok(Message::Text(text)) => return Inbound::Text(text.as_str().to_owned()),
            Ok(Message::Binary(_)) => return Inbound::Unexpected("binary"),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => return Inbound::Gone,
            Err(e) => {
                debug!("WebSocket receive error: {e}");
                return Inbound::Gone;
            }
        }
    }
    Inbound::Gone
}

async fn send_status<S>(sink: &mut S, status: &StatusMessage) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = serde_json::to_string(status).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}

async fn fail<S>(sink: &mut S, session: &mut StreamSession, detail: String)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    warn!(session_id = %session.id, detail = %detail, "WebSocket session failed");
    session.advance(SessionState::Error);
    let _ = send_status(sink, &StatusMessage::Error { detail }).await;
    let _ = sink.close().await;
    session.advance(SessionState::Closed);
}

/// The client is gone: stop synthesis and close without a status message.
fn disconnect(frames: &mut FrameStream, session: &mut StreamSession, reason: String) {
    frames.cancel();
    let err = TtsError::Transport(reason);
    info!(
        session_id = %session.id,
        frames_sent = session.frames_sent,
        error = %err,
        "Cancelling synthesis"
    );
    session.advance(SessionState::Closed);
}

//! HTTP front end.
//!
//! A thin axum shell over the turn pipeline: one chat endpoint plus health
//! and banner routes. The mutable stores sit behind async mutexes; the
//! process serves a single active conversation, so coarse serialization is
//! the correctness story, not a bottleneck.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::brain::{Brain, TurnMode};
use crate::memory::rollup::PersonalityMemory;
use crate::memory::session::SessionMemory;
use crate::relationship::RelationshipTracker;

pub struct AppState {
    pub brain: Brain,
    pub session: Mutex<SessionMemory>,
    pub tracker: Mutex<RelationshipTracker>,
    pub personality: Mutex<PersonalityMemory>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    user_id: String,
    message: String,
}

pub struct Config {
    pub port: u16,
    pub bind: String,
}

pub async fn run(config: Config, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn home() -> Json<serde_json::Value> {
    Json(json!({
        "message": "anima is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tracker = state.tracker.lock().await;
    Json(json!({
        "status": "ok",
        "active_users": tracker.user_count(),
    }))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let user_id = req.user_id.trim().to_string();
    let message = req.message.trim().to_string();
    if user_id.is_empty() || message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "user_id and message are required"})),
        )
            .into_response();
    }

    {
        let mut tracker = state.tracker.lock().await;
        if tracker.get_user_relationship(&user_id).is_none() {
            if let Err(e) = tracker.register_user(&user_id, &user_id) {
                error!(error = %e, "failed to register user");
            } else {
                info!(%user_id, "registered new user");
            }
        }
    }

    let mode = state.brain.triage(&message).await;
    info!(%user_id, ?mode, "handling chat message");

    let mut session = state.session.lock().await;
    let mut tracker = state.tracker.lock().await;
    let personality = state.personality.lock().await;

    let result = match mode {
        TurnMode::Light => {
            state
                .brain
                .handle_light_turn(&user_id, &message, &mut session, &mut tracker, &personality)
                .await
        }
        TurnMode::Full => {
            state
                .brain
                .handle_turn(&user_id, &message, &mut session, &mut tracker, &personality)
                .await
        }
    };

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            error!(error = %e, "turn failed");
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    state
        .brain
        .summarize_interaction(&mut session, &message, &output.reply)
        .await;

    let debug = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "mode": output.mode,
        "emotion_route": output.emotion_route,
        "relationship_score": output.relationship_score,
        "mood": { "value": output.mood_value, "phrase": output.mood_phrase },
        "emotional_state": output.emotional_state,
        "emotion_context": output.emotion_context,
        "value_resonances": output.moral.values,
        "fragment_resonances": output.moral.fragments,
        "patterns": output.patterns,
        "summary_count": session.summaries().len(),
    });

    Json(json!({ "reply": output.reply, "debug": debug })).into_response()
}

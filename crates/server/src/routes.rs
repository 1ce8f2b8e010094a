//! HTTP surface.
//!
//! - `GET  /`                   - liveness text
//! - `GET  /health`             - readiness JSON
//! - `POST /slack/commands`     - slash command form
//! - `POST /slack/interactive`  - dialog submissions and button clicks (`payload` form field)

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use tokenbot_slack::events::{DispatchError, EventHandlerError};
use tokenbot_slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use tokenbot_slack::{
    EventContext, EventDispatcher, HandlerResult, InteractivePayload, RequestVerifier, SlackEvent,
    SlashCommandPayload,
};

/// Slack caps payloads well below this.
const MAX_BODY_BYTES: usize = 1024 * 1024;
const UNAUTHORIZED_BODY: &str = "Access attempt not authorized\n";

#[derive(Clone)]
pub struct SlackState {
    pub dispatcher: Arc<EventDispatcher>,
    pub verifier: Arc<RequestVerifier>,
}

#[derive(Debug, Deserialize)]
pub struct InteractiveForm {
    pub payload: String,
}

pub fn router(state: SlackState) -> Router {
    Router::new()
        .route("/slack/commands", post(slash_command))
        .route("/slack/interactive", post(interactive))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state.verifier), verify_signature))
        .with_state(state)
        .route("/", get(root))
}

pub async fn root() -> &'static str {
    "Hello, world!"
}

/// Buffers the body so the signing secret can be checked against the exact
/// bytes Slack sent, then hands the request on untouched.
async fn verify_signature(
    State(verifier): State<Arc<RequestVerifier>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::BAD_REQUEST, "Unhandled data\n").into_response();
    };

    let header = |name: &str| parts.headers.get(name).and_then(|value| value.to_str().ok());
    let verified = verifier.verify_signature(
        header(TIMESTAMP_HEADER),
        header(SIGNATURE_HEADER),
        &bytes,
        Utc::now().timestamp(),
    );
    if let Err(error) = verified {
        warn!(
            event_name = "slack.request.unauthorized",
            path = %parts.uri.path(),
            error = %error,
            "rejected slack request signature"
        );
        return (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn slash_command(
    State(state): State<SlackState>,
    Form(payload): Form<SlashCommandPayload>,
) -> Response {
    if let Err(error) = state.verifier.verify_token(&payload.token) {
        warn!(
            event_name = "slack.request.unauthorized",
            command = %payload.command,
            error = %error,
            "rejected slash command"
        );
        return (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response();
    }

    dispatch(&state, SlackEvent::SlashCommand(payload)).await
}

async fn interactive(
    State(state): State<SlackState>,
    Form(form): Form<InteractiveForm>,
) -> Response {
    let payload = match InteractivePayload::parse(&form.payload) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "slack.interactive.malformed",
                error = %error,
                "could not decode interactive payload"
            );
            return (StatusCode::BAD_REQUEST, "Bad Callback Response\n").into_response();
        }
    };

    if let Err(error) = state.verifier.verify_token(payload.token()) {
        warn!(
            event_name = "slack.request.unauthorized",
            error = %error,
            "rejected interactive payload"
        );
        return (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response();
    }

    dispatch(&state, SlackEvent::Interaction(payload)).await
}

async fn dispatch(state: &SlackState, event: SlackEvent) -> Response {
    let ctx = EventContext { correlation_id: Uuid::new_v4().to_string() };
    debug!(
        event_name = "slack.event.dispatch",
        correlation_id = %ctx.correlation_id,
        event_type = ?event.event_type(),
        "dispatching slack event"
    );

    match state.dispatcher.dispatch(&event, &ctx).await {
        Ok(HandlerResult::Responded(message)) => Json(message).into_response(),
        Ok(HandlerResult::Rejected(errors)) => Json(errors).into_response(),
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => StatusCode::OK.into_response(),
        Err(DispatchError::Handler(EventHandlerError::Parse(error))) => {
            warn!(
                event_name = "slack.event.rejected",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "slack event not accepted"
            );
            (StatusCode::BAD_REQUEST, format!("{error}\n")).into_response()
        }
        Err(error) => {
            error!(
                event_name = "slack.event.failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "slack event handler failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{error}\n")).into_response()
        }
    }
}

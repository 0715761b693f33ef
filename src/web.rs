use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api_errors::AppError;
use crate::app_state::AppState;
use crate::config::UiConfig;
use crate::ensemble::ENSEMBLE_SIZE;
use crate::errors::TierError;
use crate::model_cache::LoadPolicy;
use crate::predictor::Prediction;
use crate::render::{self, Notice, MSG_BAD_CREDENTIALS, MSG_ENTER_CREDENTIALS};
use crate::session_context::{clear_cookie, session_cookie, AuthStatus, SessionContext};
use crate::story::StoryForm;
use crate::vocabulary::Field;

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Build the application router: login gate, prediction form, JSON API
/// and health checks.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/predict", post(predict_form))
        .route("/api/predict", post(predict_api))
        .route("/api/vocabulary", get(vocabulary))
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn html_error(state: &AppState, err: TierError) -> Response {
    let status = err.status_code();
    error!(status = status.as_u16(), error = %err, "request failed");
    (status, Html(render::error_page(&state.config.ui, &err.to_string()))).into_response()
}

/// Page for a visitor who is not signed in.
fn login_gate(ui: &UiConfig, session: &SessionContext) -> Response {
    match &session.status {
        AuthStatus::Rejected => {
            let page = render::login_page(ui, Some(Notice::Error(MSG_BAD_CREDENTIALS)));
            (StatusCode::UNAUTHORIZED, Html(page)).into_response()
        }
        AuthStatus::NotSubmitted | AuthStatus::Authenticated { .. } => {
            Html(render::login_page(ui, Some(Notice::Warning(MSG_ENTER_CREDENTIALS)))).into_response()
        }
    }
}

async fn index(State(state): State<Arc<AppState>>, session: SessionContext) -> Response {
    let ui = &state.config.ui;
    match &session.status {
        AuthStatus::Authenticated { display_name, .. } => {
            Html(render::form_page(ui, display_name, &StoryForm::default(), None, None)).into_response()
        }
        _ => login_gate(ui, &session),
    }
}

async fn login(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    let ui = &state.config.ui;
    if form.username.trim().is_empty() && form.password.is_empty() {
        return login_gate(ui, &SessionContext::anonymous());
    }

    // bcrypt verification blocks
    let verifier = Arc::clone(&state);
    let submitted = form.username.clone();
    let verified = tokio::task::spawn_blocking(move || {
        verifier
            .credentials
            .verify(&submitted, &form.password)
            .map(|user| user.username.clone())
    })
    .await;

    let username = match verified {
        Ok(Some(username)) => username,
        Ok(None) => {
            warn!(user = %form.username.trim(), "login rejected");
            return login_gate(ui, &SessionContext::rejected());
        }
        Err(e) => {
            return html_error(&state, TierError::internal(format!("credential check failed: {e}")))
        }
    };

    if let Err(e) = state.audit.log(&username).await {
        return html_error(&state, e);
    }

    let token = match state.signer.issue(&username, Utc::now()) {
        Ok(token) => token,
        Err(e) => return html_error(&state, e),
    };
    info!(user = %username, "login succeeded");

    let mut resp = Redirect::to("/").into_response();
    let max_age = state.signer.lifetime().num_seconds();
    if let Some(cookie) = session_cookie(&state.config.auth.cookie_name, &token, max_age) {
        resp.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    resp
}

async fn logout(State(state): State<Arc<AppState>>, session: SessionContext) -> Response {
    if let Some(user) = session.username() {
        info!(user = %user, "logged out");
    }
    let mut resp = Redirect::to("/").into_response();
    if let Some(cookie) = clear_cookie(&state.config.auth.cookie_name) {
        resp.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    resp
}

async fn predict_form(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<StoryForm>,
) -> Response {
    let Some(display_name) = session.display_name() else {
        return Redirect::to("/").into_response();
    };
    let ui = &state.config.ui;

    let story = match form.clone().into_attributes() {
        Ok(story) => story,
        Err(e) => {
            warn!(error = %e, "rejected story form");
            let message = e.to_string();
            let page = render::form_page(ui, display_name, &form, None, Some(Notice::Error(&message)));
            return (StatusCode::BAD_REQUEST, Html(page)).into_response();
        }
    };

    match state.predictor.predict_async(story).await {
        Ok(prediction) => {
            Html(render::form_page(ui, display_name, &form, Some(&prediction), None)).into_response()
        }
        Err(e) => html_error(&state, e),
    }
}

async fn predict_api(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Json(form): Json<StoryForm>,
) -> Result<Json<Prediction>, AppError> {
    if !session.is_authenticated() {
        return Err(AppError::unauthorized("authentication required"));
    }
    let story = form.into_attributes()?;
    let prediction = state.predictor.predict_async(story).await?;
    Ok(Json(prediction))
}

async fn vocabulary() -> Json<serde_json::Value> {
    let fields: serde_json::Map<String, serde_json::Value> = Field::ALL
        .iter()
        .map(|field| {
            (
                field.form_key().to_string(),
                serde_json::json!({
                    "column": field.column(),
                    "label": field.label(),
                    "values": field.vocabulary(),
                }),
            )
        })
        .collect();
    Json(serde_json::Value::Object(fields))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readyz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models = state.predictor.models();
    let cached = models.cached_models();
    let ready = models.policy() == LoadPolicy::PerRequest || cached == ENSEMBLE_SIZE;
    Json(serde_json::json!({
        "ready": ready,
        "load_policy": models.policy(),
        "cached_models": cached,
        "audit_sink": state.audit.sink_name(),
    }))
}

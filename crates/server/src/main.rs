use std::{collections::BTreeSet, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use gateway::{HttpGateway, NewsletterApi};
use serde::Serialize;
use shared::{
    domain::Profile,
    error::{ApiError, ErrorCode},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use url::Url;
use workflow::{
    flows::{optin, preferences, request_link, subscription},
    forms::REQUEST_LINK_TITLE,
    permissions::{check_access, PermissionDefinition, PermissionRegistry, Route},
    protection::Honeypot,
    selection::FormSubmission,
    FlowOutcome, Redirect, WorkflowContext,
};

mod config;

use config::load_settings;

const MAX_FORM_BYTES: usize = 64 * 1024;

struct AppState {
    workflow: WorkflowContext,
    granted_permissions: BTreeSet<String>,
    permissions: PermissionRegistry,
}

type HttpError = (StatusCode, Json<ApiError>);

/// Body of every flow response: the page title plus the flow outcome.
#[derive(Debug, Serialize)]
struct PageBody {
    title: String,
    #[serde(flatten)]
    outcome: FlowOutcome,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings()?;
    let endpoint = settings.connector_endpoint()?;
    info!(%endpoint, "using CiviCRM REST endpoint");
    let gateway = HttpGateway::new(endpoint).with_credentials(
        settings.connector.api_key.clone(),
        settings.connector.site_key.clone(),
    );

    let mut workflow = WorkflowContext::new(
        NewsletterApi::new(Arc::new(gateway)),
        settings.workflow.clone(),
    );
    if settings.honeypot.enabled {
        workflow = workflow.with_protection(Arc::new(Honeypot::new(
            settings.honeypot.time_limit_seconds,
        )));
    }

    let state = AppState {
        workflow,
        granted_permissions: settings.granted_permissions.clone(),
        permissions: PermissionRegistry::new(),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/permissions", get(list_permissions))
        .route(
            "/newsletter/:profile/subscribe",
            get(subscription_form).post(subscription_submit),
        )
        .route(
            "/newsletter/:profile/preferences/:checksum",
            get(preferences_form).post(preferences_submit),
        )
        .route(
            "/newsletter/:profile/request-link",
            get(request_link_form).post(request_link_submit),
        )
        .route(
            "/newsletter/:profile/request-link/:checksum",
            get(request_link_with_checksum),
        )
        .route("/newsletter/:profile/optin/:checksum", get(optin_page))
        .layer(RequestBodyLimitLayer::new(MAX_FORM_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_permissions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PermissionDefinition>>, HttpError> {
    let profiles = state.workflow.api.profiles().await.map_err(|error| {
        warn!(%error, "could not list profiles");
        unavailable()
    })?;
    let names: Vec<String> = profiles.into_iter().map(|profile| profile.name).collect();
    Ok(Json(state.permissions.definitions(&names).await))
}

async fn subscription_form(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
) -> Result<Response, HttpError> {
    let profile = resolve_profile(&state, &profile, Route::SubscriptionForm).await?;
    let outcome = subscription::load(&state.workflow, &profile);
    page(profile.form_title.clone(), outcome)
}

async fn subscription_submit(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, HttpError> {
    let profile = resolve_profile(&state, &profile, Route::SubscriptionForm).await?;
    let submission = FormSubmission::from_pairs(pairs);
    let outcome = subscription::submit(&state.workflow, &profile, &submission).await;
    page(profile.form_title.clone(), outcome)
}

async fn preferences_form(
    State(state): State<Arc<AppState>>,
    Path((profile, checksum)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let profile = resolve_profile(&state, &profile, Route::PreferencesForm).await?;
    let outcome = preferences::load(&state.workflow, &profile, &checksum).await;
    page(profile.form_title.clone(), outcome)
}

async fn preferences_submit(
    State(state): State<Arc<AppState>>,
    Path((profile, checksum)): Path<(String, String)>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, HttpError> {
    let profile = resolve_profile(&state, &profile, Route::PreferencesForm).await?;
    let submission = FormSubmission::from_pairs(pairs);
    let outcome = preferences::submit(&state.workflow, &profile, &checksum, &submission).await;
    page(profile.form_title.clone(), outcome)
}

async fn request_link_form(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
) -> Result<Response, HttpError> {
    let profile = resolve_profile(&state, &profile, Route::RequestForm).await?;
    page(REQUEST_LINK_TITLE.into(), request_link::load(&state.workflow, &profile))
}

async fn request_link_submit(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, HttpError> {
    let profile = resolve_profile(&state, &profile, Route::RequestForm).await?;
    let submission = FormSubmission::from_pairs(pairs);
    let outcome = request_link::submit(&state.workflow, &profile, &submission).await;
    page(REQUEST_LINK_TITLE.into(), outcome)
}

async fn request_link_with_checksum(
    State(state): State<Arc<AppState>>,
    Path((profile, checksum)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let profile = resolve_profile(&state, &profile, Route::RequestForm).await?;
    let outcome = request_link::with_checksum(&state.workflow, &profile, &checksum).await;
    page(REQUEST_LINK_TITLE.into(), outcome)
}

async fn optin_page(
    State(state): State<Arc<AppState>>,
    Path((profile, checksum)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let profile = resolve_profile(&state, &profile, Route::OptinPage).await?;
    let outcome = optin::run(&state.workflow, &profile, &checksum).await;
    page(profile.form_title.clone(), outcome)
}

/// Looks the profile up on the backend, then checks the visitor may use `route` with it.
async fn resolve_profile(state: &AppState, name: &str, route: Route) -> Result<Profile, HttpError> {
    let profile = state
        .workflow
        .api
        .profile(name)
        .await
        .map_err(|error| {
            warn!(profile = name, %error, "could not load profile");
            unavailable()
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new(ErrorCode::NotFound, "newsletter profile not found")),
            )
        })?;

    if !check_access(&state.granted_permissions, route, &profile.name) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiError::new(ErrorCode::Forbidden, "access denied")),
        ));
    }
    Ok(profile)
}

fn page(title: String, outcome: FlowOutcome) -> Result<Response, HttpError> {
    let location = outcome.redirect().map(redirect_location).transpose()?;
    let body = Json(PageBody { title, outcome });
    match location {
        Some(location) => {
            Ok((StatusCode::SEE_OTHER, [(header::LOCATION, location)], body).into_response())
        }
        None => Ok((StatusCode::OK, body).into_response()),
    }
}

fn redirect_location(redirect: &Redirect) -> Result<HeaderValue, HttpError> {
    let location = match redirect {
        Redirect::RequestLinkForm { profile } => request_link_path(profile),
        Redirect::Path { path } => Some(path.clone()),
    };
    location
        .and_then(|location| HeaderValue::from_str(&location).ok())
        .ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(ErrorCode::Internal, "invalid redirect target")),
            )
        })
}

/// Path of the request-link form, with the profile name percent-encoded as one segment.
fn request_link_path(profile: &str) -> Option<String> {
    let mut url = Url::parse("http://localhost/").ok()?;
    url.path_segments_mut()
        .ok()?
        .clear()
        .extend(["newsletter", profile, "request-link"]);
    Some(url.path().to_string())
}

fn unavailable() -> HttpError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiError::new(
            ErrorCode::Unavailable,
            "the newsletter service is temporarily unavailable",
        )),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

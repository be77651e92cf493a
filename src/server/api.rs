use crate::agent::GbalaAgent;
use crate::analysis::AnalysisError;
use crate::models::chat::ChatRequest;
use crate::models::waste::DumpSite;
use crate::sms::{ flood_alert_body, SendSmsRequest, SmsClient };

use axum::{
    extract::{ DefaultBodyLimit, Query, Request, State },
    http::{ StatusCode, Uri },
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use governor::{ DefaultDirectRateLimiter, Quota, RateLimiter };
use log::{ error, info, warn };
use serde::{ Deserialize, Serialize };
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{ Any, CorsLayer };

/// Photo and satellite data URIs are sent inline.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const API_KEY_HEADER: &str = "x-api-key";
const API_KEY_QUERY: &str = "api_key";

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    details: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FloodRiskRequest {
    area_name: String,
    weather_forecast: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DumpSiteQuery {
    waste_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WastePhotoRequest {
    photo_data_uri: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlasticAccumulationRequest {
    satellite_image_data_uri: String,
}

#[derive(Deserialize)]
struct SubscribeRequest {
    to: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        let status = if e.is_bad_input() { StatusCode::BAD_REQUEST } else { StatusCode::BAD_GATEWAY };
        error!("Analysis failed: {}", e);
        Self { status, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    agent: Arc<RwLock<GbalaAgent>>,
    sms: SmsClient,
    limiter: Arc<DefaultDirectRateLimiter>,
    api_key: Option<String>,
}

impl AppState {
    pub fn new(
        agent: Arc<RwLock<GbalaAgent>>,
        sms: SmsClient,
        api_key: Option<String>,
        rate_limit_per_second: u32
    ) -> Self {
        let per_second = NonZeroU32::new(rate_limit_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            agent,
            sms,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api = Router::new()
        .route("/chat", post(chat_handler))
        .route("/flood-risk", post(flood_risk_handler))
        .route("/flood-risk/dashboard", get(dashboard_flood_risk_handler))
        .route("/waste-types", get(waste_types_handler))
        .route("/reports", get(reports_handler))
        .route("/flood-zones", get(flood_zones_handler))
        .route("/dump-sites", get(dump_sites_handler))
        .route("/analyze/waste-photo", post(waste_photo_handler))
        .route("/analyze/plastic-accumulation", post(plastic_accumulation_handler))
        .route("/sms", post(sms_handler))
        .route("/alerts/subscribe", post(subscribe_handler))
        .route("/reload-prompts", get(reload_prompts_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded
        ::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_param(req.uri(), API_KEY_QUERY));

    if provided.as_deref() == Some(expected) {
        next.run(req).await
    } else {
        warn!("Rejected {} {}: missing or invalid API key", req.method(), req.uri().path());
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid or missing API key" }))).into_response()
    }
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.limiter.check().is_err() {
        warn!("Global rate limit exceeded for {}", req.uri().path());
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded" })),
        ).into_response();
    }
    next.run(req).await
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Result<Response, ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let agent = state.agent.read().await;
    let response = agent.respond(&req.history, &req.query).await;
    Ok(Json(response).into_response())
}

async fn flood_risk_handler(
    State(state): State<AppState>,
    Json(req): Json<FloodRiskRequest>
) -> Result<Response, ApiError> {
    if req.area_name.trim().is_empty() {
        return Err(ApiError::bad_request("areaName must not be empty"));
    }
    let agent = state.agent.read().await;
    let forecast = req.weather_forecast.as_deref().unwrap_or(agent.weather_forecast());
    let assessment = agent
        .analyst()
        .assess_flood_risk(&agent.dataset().reports, &req.area_name, forecast).await?;
    Ok(Json(assessment).into_response())
}

async fn dashboard_flood_risk_handler(State(state): State<AppState>) -> impl IntoResponse {
    let agent = state.agent.read().await;
    Json(agent.dashboard_flood_risk().await)
}

async fn waste_types_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.agent.read().await.dataset().waste_types.clone())
}

async fn reports_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.agent.read().await.dataset().reports.clone())
}

async fn flood_zones_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.agent.read().await.dataset().flood_zones.clone())
}

async fn dump_sites_handler(
    State(state): State<AppState>,
    Query(query): Query<DumpSiteQuery>
) -> impl IntoResponse {
    let agent = state.agent.read().await;
    let dataset = agent.dataset();
    let sites: Vec<DumpSite> = match query.waste_type.as_deref().filter(|t| !t.is_empty()) {
        Some(waste_type) => dataset.dump_sites_accepting(waste_type).cloned().collect(),
        None => dataset.dump_sites.clone(),
    };
    Json(sites)
}

async fn waste_photo_handler(
    State(state): State<AppState>,
    Json(req): Json<WastePhotoRequest>
) -> Result<Response, ApiError> {
    let agent = state.agent.read().await;
    let analysis = agent.analyst().analyze_waste_photo(&req.photo_data_uri).await?;
    Ok(Json(analysis).into_response())
}

async fn plastic_accumulation_handler(
    State(state): State<AppState>,
    Json(req): Json<PlasticAccumulationRequest>
) -> Result<Response, ApiError> {
    let agent = state.agent.read().await;
    let zones = agent.analyst().analyze_plastic_accumulation(&req.satellite_image_data_uri).await?;
    Ok(Json(zones).into_response())
}

async fn sms_handler(
    State(state): State<AppState>,
    Json(req): Json<SendSmsRequest>
) -> Result<Response, ApiError> {
    if req.to.trim().is_empty() || req.body.trim().is_empty() {
        return Err(ApiError::bad_request("'to' and 'body' are required"));
    }
    Ok(Json(state.sms.send(&req.to, &req.body).await).into_response())
}

async fn subscribe_handler(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>
) -> Result<Response, ApiError> {
    if req.to.trim().is_empty() {
        return Err(ApiError::bad_request("'to' is required"));
    }
    let assessment = state.agent.read().await.dashboard_flood_risk().await;
    info!("Sending {} flood alert to new subscriber", assessment.risk_level);
    let output = state.sms.send(&req.to, &flood_alert_body(&assessment)).await;
    Ok(Json(output).into_response())
}

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut agent = match state.agent.try_write() {
        Ok(g) => g,
        Err(_) =>
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReloadResponse {
                    success: false,
                    message: "Agent busy".into(),
                    details: None,
                }),
            ).into_response(),
    };

    let (ok, detail) = match agent.reload_prompts_if_changed().await {
        Ok(true) => (true, "Prompts reloaded".to_string()),
        Ok(false) => (true, "Prompts unchanged".to_string()),
        Err(e) => (false, format!("Prompt reload error: {}", e)),
    };

    let code = if ok { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    (
        code,
        Json(ReloadResponse {
            success: ok,
            message: if ok { "Reload complete".into() } else { "Reload errors".into() },
            details: Some(vec![detail]),
        }),
    ).into_response()
}

use super::convert::ProspectConverter;
use super::error::ProspectError;
use super::scoring::LeadScoreTracker;
use super::service::ProspectService;
use super::types::*;
use crate::shared::actor::{Actor, Permission};
use crate::shared::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn prospects_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_prospects_handler))
        .route("/", post(create_prospect_handler))
        .route("/bulk", post(bulk_create_handler))
        .route("/statistics", get(statistics_handler))
        .route("/:id", get(get_prospect_handler))
        .route("/:id", put(update_prospect_handler))
        .route("/:id", delete(delete_prospect_handler))
        .route("/:id/engagement", get(engagement_handler))
        .route("/:id/convert", post(convert_handler))
        .route("/:id/lead-score", post(update_lead_score_handler))
        .route("/:id/lead-score/history", get(lead_score_history_handler))
        .with_state(state)
}

pub async fn list_prospects_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ProspectListQuery>,
) -> Result<Json<ProspectListResponse>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsView) {
        return Err(ProspectError::Forbidden);
    }
    let service = ProspectService::new(state.conn.clone());
    Ok(Json(service.list_prospects(query)?))
}

pub async fn create_prospect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateProspectRequest>,
) -> Result<Json<Prospect>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsCreate) {
        return Err(ProspectError::Forbidden);
    }
    let service = ProspectService::new(state.conn.clone());
    Ok(Json(service.create_prospect(request, actor.id)?))
}

pub async fn bulk_create_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<BulkCreateRequest>,
) -> Result<Json<BulkCreateResult>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsCreate) {
        return Err(ProspectError::Forbidden);
    }
    let service = ProspectService::new(state.conn.clone());
    Ok(Json(service.bulk_create(request, actor.id)?))
}

pub async fn get_prospect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(prospect_id): Path<Uuid>,
) -> Result<Json<Prospect>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsView) {
        return Err(ProspectError::Forbidden);
    }
    let service = ProspectService::new(state.conn.clone());
    Ok(Json(service.get_prospect(prospect_id)?))
}

pub async fn engagement_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(prospect_id): Path<Uuid>,
) -> Result<Json<ProspectWithEngagement>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsView) {
        return Err(ProspectError::Forbidden);
    }
    let service = ProspectService::new(state.conn.clone());
    Ok(Json(service.get_with_engagement(prospect_id)?))
}

pub async fn update_prospect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(prospect_id): Path<Uuid>,
    Json(request): Json<UpdateProspectRequest>,
) -> Result<Json<Prospect>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsEdit) {
        return Err(ProspectError::Forbidden);
    }
    // A status change to converted runs the full conversion, so it needs
    // the convert permission too.
    if request.status == Some(ProspectStatus::Converted)
        && !actor.has(Permission::ProspectsConvert)
    {
        return Err(ProspectError::Forbidden);
    }
    let service = ProspectService::new(state.conn.clone());
    Ok(Json(service.update_prospect(
        prospect_id,
        request,
        Some(actor.id),
    )?))
}

pub async fn delete_prospect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(prospect_id): Path<Uuid>,
) -> Result<StatusCode, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsDelete) {
        return Err(ProspectError::Forbidden);
    }
    let service = ProspectService::new(state.conn.clone());
    service.delete_prospect(prospect_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn convert_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(prospect_id): Path<Uuid>,
    Json(request): Json<ConversionRequest>,
) -> Result<Json<ConversionResult>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsConvert) {
        return Err(ProspectError::Forbidden);
    }
    let converter = ProspectConverter::new(state.conn.clone());
    Ok(Json(converter.convert(prospect_id, &request, actor.id)?))
}

pub async fn update_lead_score_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(prospect_id): Path<Uuid>,
    Json(request): Json<LeadScoreUpdateRequest>,
) -> Result<Json<Prospect>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsEdit) {
        return Err(ProspectError::Forbidden);
    }
    let tracker = LeadScoreTracker::new(state.conn.clone());
    Ok(Json(tracker.update_score(
        prospect_id,
        &request,
        Some(actor.id),
    )?))
}

pub async fn lead_score_history_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(prospect_id): Path<Uuid>,
) -> Result<Json<Vec<LeadScoreHistoryEntry>>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsView) {
        return Err(ProspectError::Forbidden);
    }
    let tracker = LeadScoreTracker::new(state.conn.clone());
    Ok(Json(tracker.get_history(prospect_id)?))
}

pub async fn statistics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ProspectStatisticsQuery>,
) -> Result<Json<ProspectStatistics>, ProspectError> {
    let actor = Actor::from_headers(&headers);
    if !actor.has(Permission::ProspectsView) {
        return Err(ProspectError::Forbidden);
    }
    let service = ProspectService::new(state.conn.clone());
    Ok(Json(service.get_statistics(query.campaign_id)?))
}

use super::audience::AudienceManager;
use super::engagement::EngagementTracker;
use super::error::CampaignError;
use super::executor::CampaignExecutor;
use super::metrics::MetricsAggregator;
use super::service::CampaignService;
use super::types::*;
use crate::shared::actor::{Actor, Permission};
use crate::shared::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn campaigns_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_campaigns_handler))
        .route("/", post(create_campaign_handler))
        .route("/statistics", get(statistics_handler))
        .route("/:id", get(get_campaign_handler))
        .route("/:id", put(update_campaign_handler))
        .route("/:id", delete(delete_campaign_handler))
        .route("/:id/audience", get(list_audience_handler))
        .route("/:id/audience", post(add_audience_handler))
        .route("/:id/audience/member", post(add_member_handler))
        .route("/:id/audience/:engagement_id", delete(remove_member_handler))
        .route("/:id/audience/:engagement_id/resend", post(resend_member_handler))
        .route("/:id/execute", post(execute_handler))
        .route("/:id/send-pending", post(send_pending_handler))
        .route("/:id/metrics", get(metrics_handler))
        .route("/:id/metrics/recompute", post(recompute_handler))
        .route("/:id/analytics", get(analytics_handler))
        .route("/:id/timeline", get(timeline_handler))
        .route("/:id/conversions", get(conversions_handler))
        .route("/:id/link-deal", post(link_deal_handler))
        .with_state(state)
}

/// Engagement event ingestion (delivery webhooks, tracking pixels, reply
/// detection). These carry no actor; the engagement id is the capability.
pub fn engagements_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/by-message/:message_id", get(get_by_message_id_handler))
        .route("/:id", get(get_engagement_handler))
        .route("/:id/delivered", post(record_delivered_handler))
        .route("/:id/opened", post(record_open_handler))
        .route("/:id/clicked", post(record_click_handler))
        .route("/:id/responded", post(record_response_handler))
        .route("/:id/converted", post(record_conversion_handler))
        .route("/:id/bounced", post(record_bounce_handler))
        .route("/:id/unsubscribed", post(record_unsubscribe_handler))
        .with_state(state)
}

fn actor_from(headers: &HeaderMap) -> Actor {
    Actor::from_headers(headers)
}

pub async fn list_campaigns_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CampaignListQuery>,
) -> Result<Json<CampaignListResponse>, CampaignError> {
    let actor = actor_from(&headers);
    if !actor.has(Permission::CampaignsViewAll) && !actor.has(Permission::CampaignsViewOwn) {
        return Err(CampaignError::Forbidden);
    }

    // View-own actors are scoped to their campaigns inside the query so
    // pagination and totals stay correct.
    let mut query = query;
    if !actor.has(Permission::CampaignsViewAll) {
        query.owner_id = Some(actor.id);
    }

    let service = CampaignService::new(state.conn.clone());
    Ok(Json(service.list_campaigns(query)?))
}

pub async fn create_campaign_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>, CampaignError> {
    let actor = actor_from(&headers);
    if !actor.has(Permission::CampaignsCreate) {
        return Err(CampaignError::Forbidden);
    }
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.create_campaign(request, actor.id)?;
    Ok(Json(campaign))
}

pub async fn get_campaign_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_view_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    Ok(Json(campaign))
}

pub async fn update_campaign_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<UpdateCampaignRequest>,
) -> Result<Json<Campaign>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let existing = service.get_campaign(campaign_id)?;
    if !actor.can_edit_campaign(existing.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let campaign = service.update_campaign(campaign_id, request)?;
    Ok(Json(campaign))
}

pub async fn delete_campaign_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<StatusCode, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let existing = service.get_campaign(campaign_id)?;
    if !actor.can_delete_campaign(existing.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    service.delete_campaign(campaign_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_audience_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<AudienceQuery>,
) -> Result<Json<AudienceListResponse>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_view_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let manager = AudienceManager::new(state.conn.clone());
    Ok(Json(manager.list(campaign_id, &query)?))
}

pub async fn add_audience_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<AddAudienceRequest>,
) -> Result<Json<AddAudienceResponse>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_edit_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let manager = AudienceManager::new(state.conn.clone());
    Ok(Json(manager.add_audience(campaign_id, &request)?))
}

pub async fn add_member_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> Result<Json<AddMemberResponse>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_edit_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let manager = AudienceManager::new(state.conn.clone());
    Ok(Json(manager.add_member(campaign_id, &request)?))
}

pub async fn remove_member_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((campaign_id, engagement_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_edit_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let manager = AudienceManager::new(state.conn.clone());
    manager.remove_member(campaign_id, engagement_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn execute_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecutionResult>, CampaignError> {
    let actor = actor_from(&headers);
    if !actor.has(Permission::CampaignsExecute) {
        return Err(CampaignError::Forbidden);
    }
    let executor = CampaignExecutor::new(
        state.conn.clone(),
        state.transport.clone(),
        state.config.email.clone(),
    );
    Ok(Json(executor.execute(campaign_id, &request).await?))
}

pub async fn send_pending_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<ExecutionResult>, CampaignError> {
    let actor = actor_from(&headers);
    if !actor.has(Permission::CampaignsExecute) {
        return Err(CampaignError::Forbidden);
    }
    let executor = CampaignExecutor::new(
        state.conn.clone(),
        state.transport.clone(),
        state.config.email.clone(),
    );
    Ok(Json(executor.send_pending(campaign_id).await?))
}

pub async fn resend_member_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((campaign_id, engagement_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ExecutionResult>, CampaignError> {
    let actor = actor_from(&headers);
    if !actor.has(Permission::CampaignsExecute) {
        return Err(CampaignError::Forbidden);
    }
    let executor = CampaignExecutor::new(
        state.conn.clone(),
        state.transport.clone(),
        state.config.email.clone(),
    );
    Ok(Json(executor.resend_member(campaign_id, engagement_id).await?))
}

pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignMetricsResponse>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_view_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let aggregator = MetricsAggregator::new(state.conn.clone());
    Ok(Json(aggregator.get_metrics(campaign_id)?))
}

pub async fn recompute_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignMetricsResponse>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_view_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let aggregator = MetricsAggregator::new(state.conn.clone());
    let metrics = aggregator.recompute(campaign_id)?;
    // An explicit recompute also lands on the timeline.
    aggregator.record_snapshot(campaign_id)?;
    Ok(Json(metrics))
}

pub async fn analytics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<AnalyticsResponse>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_view_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let aggregator = MetricsAggregator::new(state.conn.clone());
    Ok(Json(aggregator.get_analytics(campaign_id)?))
}

pub async fn timeline_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<Vec<TimelinePoint>>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_view_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let aggregator = MetricsAggregator::new(state.conn.clone());
    Ok(Json(aggregator.get_timeline(campaign_id, query.days.unwrap_or(30))?))
}

pub async fn conversions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<ConversionsResponse>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_view_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let aggregator = MetricsAggregator::new(state.conn.clone());
    Ok(Json(aggregator.get_conversions(campaign_id)?))
}

pub async fn link_deal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<LinkDealRequest>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let actor = actor_from(&headers);
    let service = CampaignService::new(state.conn.clone());
    let campaign = service.get_campaign(campaign_id)?;
    if !actor.can_edit_campaign(campaign.owner_id) {
        return Err(CampaignError::Forbidden);
    }
    let tracker = EngagementTracker::new(state.conn.clone());
    let record = tracker.link_deal(
        campaign_id,
        request.prospect_id,
        request.deal_id,
        request.conversion_value,
    )?;
    let aggregator = MetricsAggregator::new(state.conn.clone());
    aggregator.recompute(campaign_id)?;
    Ok(Json(record))
}

pub async fn statistics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CampaignStatistics>, CampaignError> {
    let actor = actor_from(&headers);
    if !actor.has(Permission::CampaignsViewAll) {
        return Err(CampaignError::Forbidden);
    }
    let aggregator = MetricsAggregator::new(state.conn.clone());
    Ok(Json(aggregator.get_statistics()?))
}

pub async fn get_engagement_handler(
    State(state): State<Arc<AppState>>,
    Path(engagement_id): Path<Uuid>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    Ok(Json(tracker.get(engagement_id)?))
}

/// Delivery and bounce webhooks identify the send by the provider message
/// id, not by our engagement id.
pub async fn get_by_message_id_handler(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    Ok(Json(tracker.find_by_message_id(&message_id)?))
}

pub async fn record_delivered_handler(
    State(state): State<Arc<AppState>>,
    Path(engagement_id): Path<Uuid>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    Ok(Json(tracker.record_delivered(engagement_id)?))
}

pub async fn record_open_handler(
    State(state): State<Arc<AppState>>,
    Path(engagement_id): Path<Uuid>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    Ok(Json(tracker.record_open(engagement_id)?))
}

pub async fn record_click_handler(
    State(state): State<Arc<AppState>>,
    Path(engagement_id): Path<Uuid>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    Ok(Json(tracker.record_click(engagement_id)?))
}

pub async fn record_response_handler(
    State(state): State<Arc<AppState>>,
    Path(engagement_id): Path<Uuid>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    Ok(Json(tracker.record_response(engagement_id)?))
}

#[derive(Debug, Deserialize)]
pub struct ConversionEventRequest {
    pub deal_id: Option<Uuid>,
    pub conversion_value: Option<BigDecimal>,
}

pub async fn record_conversion_handler(
    State(state): State<Arc<AppState>>,
    Path(engagement_id): Path<Uuid>,
    Json(request): Json<ConversionEventRequest>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    Ok(Json(tracker.record_conversion(
        engagement_id,
        request.deal_id,
        request.conversion_value,
    )?))
}

#[derive(Debug, Deserialize)]
pub struct BounceEventRequest {
    pub bounce_type: Option<String>,
    pub error_message: Option<String>,
}

pub async fn record_bounce_handler(
    State(state): State<Arc<AppState>>,
    Path(engagement_id): Path<Uuid>,
    Json(request): Json<BounceEventRequest>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    let bounce_type = request.bounce_type.as_deref().unwrap_or("hard");
    Ok(Json(tracker.record_bounce(
        engagement_id,
        bounce_type,
        request.error_message.as_deref(),
    )?))
}

pub async fn record_unsubscribe_handler(
    State(state): State<Arc<AppState>>,
    Path(engagement_id): Path<Uuid>,
) -> Result<Json<EngagementRecord>, CampaignError> {
    let tracker = EngagementTracker::new(state.conn.clone());
    Ok(Json(tracker.record_unsubscribe(engagement_id)?))
}

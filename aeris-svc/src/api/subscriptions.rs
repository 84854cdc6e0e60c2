//! Subscription management endpoints.

use aeris_common::model::{
    Alert, PrefsPatch, Subscriber, SubscriberLocation, SubscriberPrefs,
};
use aeris_common::Error;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub subscriber_id: String,
    pub location: SubscriberLocation,
    #[serde(default)]
    pub prefs: SubscriberPrefs,
}

/// `POST /api/subscriptions`
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> ApiResult<Json<Subscriber>> {
    let subscriber = state
        .registry
        .subscribe(request.subscriber_id, request.location, request.prefs)
        .await?;
    Ok(Json(subscriber))
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeAck {
    pub subscriber_id: String,
    pub removed: bool,
}

/// `DELETE /api/subscriptions/:id`
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<UnsubscribeAck> {
    let removed = state.registry.unsubscribe(&id).await;
    Json(UnsubscribeAck {
        subscriber_id: id,
        removed,
    })
}

/// `PUT /api/subscriptions/:id/prefs`
pub async fn update_prefs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<PrefsPatch>,
) -> ApiResult<Json<Subscriber>> {
    let subscriber = state.registry.update_prefs(&id, patch).await?;
    Ok(Json(subscriber))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub subscriber_id: String,
    pub alerts: Vec<Alert>,
    pub at: DateTime<Utc>,
}

/// `GET /api/subscriptions/:id/history`
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<HistoryRecord>>> {
    let limit = params.limit.unwrap_or(100);
    if limit == 0 || limit > 1000 {
        return Err(ApiError::from(Error::bad_request(
            "limit out of range [1, 1000]",
        )));
    }
    let records = state
        .dispatcher
        .history(Some(&id), limit)
        .into_iter()
        .map(|record| HistoryRecord {
            id: record.id,
            subscriber_id: record.subscriber_id,
            alerts: record.alerts,
            at: record.at,
        })
        .collect();
    Ok(Json(records))
}

/// `POST /api/subscriptions/:id/test` — inject a synthetic info alert,
/// bypassing the cooldown.
pub async fn test_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Alert>> {
    let entry = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::from(Error::bad_request(format!("unknown subscriber {id}"))))?;
    let alert = state.dispatcher.dispatch_test(&entry, Utc::now()).await;
    Ok(Json(alert))
}

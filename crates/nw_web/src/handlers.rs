use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use nw_core::{ArticleFilter, ArticlePage, ArticleStats, FilterField, Pagination, RunTotals, StoredArticle};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub source_id: Option<String>,
    pub sentiment: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl ArticleQuery {
    fn filter(&self) -> ApiResult<ArticleFilter> {
        Ok(ArticleFilter {
            category: non_empty(&self.category),
            country: non_empty(&self.country),
            language: non_empty(&self.language),
            source_id: non_empty(&self.source_id),
            sentiment: non_empty(&self.sentiment),
            search: non_empty(&self.q),
            from: self.from.as_deref().map(|raw| parse_bound(raw, false)).transpose()?,
            to: self.to.as_deref().map(|raw| parse_bound(raw, true)).transpose()?,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD`. A bare date used as an upper
/// bound covers the whole day.
fn parse_bound(raw: &str, end_of_day: bool) -> ApiResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date: {}", raw)))?;
    let (hour, minute, second) = if end_of_day { (23, 59, 59) } else { (0, 0, 0) };
    date.and_hms_opt(hour, minute, second)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid date: {}", raw)))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn trigger_ingestion(State(state): State<Arc<AppState>>) -> ApiResult<Json<RunTotals>> {
    let totals = state.runner.trigger_manual_ingestion().await?;
    Ok(Json(totals))
}

pub async fn ingestion_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "running": state.runner.is_running() }))
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleQuery>,
) -> ApiResult<Json<ArticlePage>> {
    let filter = query.filter()?;
    let pagination = Pagination::new(query.page, query.limit);
    let page = state.store.find(&filter, pagination).await?;
    Ok(Json(page))
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StoredArticle>> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Article not found: {}", id)))
}

pub async fn list_filters(State(state): State<Arc<AppState>>) -> ApiResult<Json<Map<String, Value>>> {
    let mut filters = Map::new();
    for field in FilterField::ALL {
        let values = state.store.distinct_values(field).await?;
        filters.insert(field.as_str().to_string(), json!(values));
    }
    Ok(Json(filters))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<ArticleStats>> {
    Ok(Json(state.store.stats().await?))
}

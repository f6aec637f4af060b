//! Catalog route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pizzeria_core::PizzaId;

use super::extract::ApiQuery;
use crate::error::{AppError, Result};
use crate::models::{Pizza, PizzaFilter};
use crate::state::AppState;

/// Page size when `limit` is not given.
pub const DEFAULT_LIMIT: u32 = 20;
/// Largest accepted `limit`.
pub const MAX_LIMIT: u32 = 100;

/// Raw listing query. Numbers are parsed by hand for precise messages.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub tags: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PizzaListResponse {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub results: Vec<Pizza>,
}

impl TryFrom<ListQuery> for PizzaFilter {
    type Error = AppError;

    fn try_from(query: ListQuery) -> Result<Self> {
        let limit = match query.limit.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_LIMIT,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|limit| *limit <= MAX_LIMIT)
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "Invalid limit: must be an integer between 0 and {MAX_LIMIT}"
                    ))
                })?,
        };

        let offset = match query.offset.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                AppError::BadRequest("Invalid offset: must be a non-negative integer".to_string())
            })?,
        };

        Ok(Self {
            tags: parse_tags(query.tags.as_deref()),
            limit,
            offset,
        })
    }
}

/// Split a comma-separated tag list into distinct lowercase names.
fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// List pizzas, optionally filtered by tags.
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<PizzaListResponse>> {
    let filter = PizzaFilter::try_from(query)?;
    let page = state.catalog().list(&filter).await?;

    Ok(Json(PizzaListResponse {
        total: page.total,
        limit: filter.limit,
        offset: filter.offset,
        results: page.pizzas,
    }))
}

/// Pizza detail.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Pizza>> {
    let id = parse_pizza_id(&id)?;
    state
        .catalog()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Pizza not found".to_string()))
}

/// Parse a pizza id from a path segment or request body.
pub(super) fn parse_pizza_id(raw: &str) -> Result<PizzaId> {
    raw.parse::<PizzaId>()
        .map_err(|_| AppError::BadRequest("Invalid pizza id".to_string()))
}

//! Failure category registry.
//!
//! Each category carries the SLA window (in hours) applied to tickets
//! filed under it. Editing `sla_hours` only affects tickets created
//! afterwards; existing deadlines are never recomputed.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::error::EngineError;
use crate::shared::schema::categories;
use crate::shared::state::AppState;

pub const DEFAULT_SLA_HOURS: i32 = 24;
pub const DEFAULT_COLOR: &str = "#007bff";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = categories)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sla_hours: i32,
    pub active: bool,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub sla_hours: Option<i32>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub description: Option<String>,
    pub sla_hours: Option<i32>,
    pub active: Option<bool>,
    pub color: Option<String>,
}

pub fn get_category(conn: &mut PgConnection, id: Uuid) -> Result<Category, EngineError> {
    categories::table
        .filter(categories::id.eq(id))
        .first(conn)
        .map_err(|_| EngineError::NotFound(format!("category {id} not found")))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, EngineError> {
    let mut conn = state.conn.get()?;

    let rows: Vec<Category> = categories::table
        .filter(categories::active.eq(true))
        .order(categories::name.asc())
        .load(&mut conn)?;

    Ok(Json(rows))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<Json<Category>, EngineError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(EngineError::validation("category name must not be blank"));
    }
    let sla_hours = req.sla_hours.unwrap_or(DEFAULT_SLA_HOURS);
    if sla_hours <= 0 {
        return Err(EngineError::validation("sla_hours must be positive"));
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let category = Category {
        id: Uuid::new_v4(),
        name,
        description: req.description,
        sla_hours,
        active: true,
        color: req.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(categories::table)
        .values(&category)
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => EngineError::Conflict(format!("category \"{}\" already exists", category.name)),
            other => other.into(),
        })?;

    Ok(Json(category))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, EngineError> {
    if let Some(hours) = req.sla_hours {
        if hours <= 0 {
            return Err(EngineError::validation("sla_hours must be positive"));
        }
    }

    let mut conn = state.conn.get()?;
    let mut category = get_category(&mut conn, id)?;

    if let Some(description) = req.description {
        category.description = Some(description);
    }
    if let Some(hours) = req.sla_hours {
        category.sla_hours = hours;
    }
    if let Some(active) = req.active {
        category.active = active;
    }
    if let Some(color) = req.color {
        category.color = color;
    }
    category.updated_at = Utc::now();

    diesel::update(categories::table.filter(categories::id.eq(id)))
        .set(&category)
        .execute(&mut conn)?;

    Ok(Json(category))
}

pub fn configure_categories_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/:id", axum::routing::put(update_category))
}

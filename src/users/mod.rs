//! User directory: admins, technicians and end users.
//!
//! Technicians carry a set of category specialties. The specialty rule
//! is enforced when a ticket is assigned, not when the account is
//! created, so a technician with no specialties is a valid account that
//! simply cannot be assigned anything yet.

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

use crate::categories::Category;
use crate::shared::enums::Role;
use crate::shared::error::EngineError;
use crate::shared::schema::{categories, user_specialties, users};
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = user_specialties)]
pub struct UserSpecialty {
    pub user_id: Uuid,
    pub category_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetSpecialtiesRequest {
    pub category_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    pub user: User,
    pub specialties: Vec<Category>,
}

pub fn get_user(conn: &mut PgConnection, id: Uuid) -> Result<User, EngineError> {
    users::table
        .filter(users::id.eq(id))
        .first(conn)
        .map_err(|_| EngineError::NotFound(format!("user {id} not found")))
}

/// Whether the technician carries the given category among their
/// specialties.
pub fn has_specialty(
    conn: &mut PgConnection,
    user_id: Uuid,
    category_id: Uuid,
) -> Result<bool, EngineError> {
    let count: i64 = user_specialties::table
        .filter(user_specialties::user_id.eq(user_id))
        .filter(user_specialties::category_id.eq(category_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn specialties_of(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Category>, EngineError> {
    let rows: Vec<Category> = user_specialties::table
        .inner_join(categories::table)
        .filter(user_specialties::user_id.eq(user_id))
        .select(categories::all_columns)
        .order(categories::name.asc())
        .load(conn)?;
    Ok(rows)
}

pub async fn list_technicians(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<User>>, EngineError> {
    let mut conn = state.conn.get()?;

    let rows: Vec<User> = users::table
        .filter(users::role.eq(Role::Technician.as_str()))
        .filter(users::active.eq(true))
        .order(users::username.asc())
        .load(&mut conn)?;

    Ok(Json(rows))
}

pub async fn get_user_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserDetail>, EngineError> {
    let mut conn = state.conn.get()?;

    let user = get_user(&mut conn, id)?;
    let specialties = specialties_of(&mut conn, id)?;

    Ok(Json(UserDetail { user, specialties }))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, EngineError> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(EngineError::validation("username must not be blank"));
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let user = User {
        id: Uuid::new_v4(),
        username,
        full_name: req.full_name.trim().to_string(),
        email: req.email,
        phone: req.phone,
        whatsapp: req.whatsapp,
        role: req.role,
        active: true,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => EngineError::Conflict(format!("username \"{}\" already exists", user.username)),
            other => other.into(),
        })?;

    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, EngineError> {
    let mut conn = state.conn.get()?;
    let mut user = get_user(&mut conn, id)?;

    if let Some(full_name) = req.full_name {
        user.full_name = full_name;
    }
    if let Some(email) = req.email {
        user.email = Some(email);
    }
    if let Some(phone) = req.phone {
        user.phone = Some(phone);
    }
    if let Some(whatsapp) = req.whatsapp {
        user.whatsapp = Some(whatsapp);
    }
    if let Some(role) = req.role {
        user.role = role;
    }
    if let Some(active) = req.active {
        user.active = active;
    }
    user.updated_at = Utc::now();

    diesel::update(users::table.filter(users::id.eq(id)))
        .set(&user)
        .execute(&mut conn)?;

    Ok(Json(user))
}

pub async fn set_specialties(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetSpecialtiesRequest>,
) -> Result<Json<UserDetail>, EngineError> {
    let mut conn = state.conn.get()?;
    let user = get_user(&mut conn, id)?;

    if user.role != Role::Technician {
        return Err(EngineError::validation(format!(
            "specialties only apply to technicians, \"{}\" is {}",
            user.username, user.role
        )));
    }

    let rows: Vec<UserSpecialty> = req
        .category_ids
        .iter()
        .map(|&category_id| UserSpecialty {
            user_id: id,
            category_id,
        })
        .collect();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(user_specialties::table.filter(user_specialties::user_id.eq(id)))
            .execute(conn)?;
        diesel::insert_into(user_specialties::table)
            .values(&rows)
            .execute(conn)?;
        Ok(())
    })?;

    let specialties = specialties_of(&mut conn, id)?;
    Ok(Json(UserDetail { user, specialties }))
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", axum::routing::post(create_user))
        .route("/api/users/technicians", get(list_technicians))
        .route("/api/users/:id", get(get_user_detail).put(update_user))
        .route("/api/users/:id/specialties", axum::routing::put(set_specialties))
}

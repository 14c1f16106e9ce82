//! Location registry.
//!
//! Tickets are filed against physical retail locations. Intake accepts
//! free-text location names, so the registry owns an explicit
//! resolve-or-create operation with a suffix retry loop that survives
//! concurrent provisioning of the same code.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Datelike, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::enums::TicketStatus;
use crate::shared::error::EngineError;
use crate::shared::schema::{locations, tickets};
use crate::shared::state::AppState;

diesel::define_sql_function! {
    fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text;
}

/// Bounded attempts when hunting for a free location code.
const MAX_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = locations)]
pub struct Location {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub province: Option<String>,
    pub municipality: Option<String>,
    pub phone: Option<String>,
    pub manager_name: Option<String>,
    pub manager_phone: Option<String>,
    pub active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLocationRequest {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub province: Option<String>,
    pub municipality: Option<String>,
    pub phone: Option<String>,
    pub manager_name: Option<String>,
    pub manager_phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub province: Option<String>,
    pub municipality: Option<String>,
    pub phone: Option<String>,
    pub manager_name: Option<String>,
    pub manager_phone: Option<String>,
    pub active: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LocationDetail {
    pub location: Location,
    pub open_tickets: i64,
    pub tickets_this_month: i64,
}

fn new_location(code: String, name: String) -> Location {
    let now = Utc::now();
    Location {
        id: Uuid::new_v4(),
        code,
        name,
        address: None,
        province: None,
        municipality: None,
        phone: None,
        manager_name: None,
        manager_phone: None,
        active: true,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

/// Code candidate for the n-th provisioning attempt: the raw text first,
/// then "text-2", "text-3", ...
pub fn code_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, attempt + 1)
    }
}

fn find_by_code(conn: &mut PgConnection, code: &str) -> Result<Option<Location>, EngineError> {
    let found = locations::table
        .filter(lower(locations::code).eq(code.to_lowercase()))
        .first::<Location>(conn)
        .optional()?;
    Ok(found)
}

/// Resolves free-text intake input against the registry, provisioning a
/// new location when nothing matches.
///
/// Lookup is case-insensitive, by name first and then by code. A
/// unique-violation during provisioning means another request won the
/// race; when the winner holds the same text we reuse its row, otherwise
/// the next suffixed code is tried.
pub fn resolve_or_create_location(
    conn: &mut PgConnection,
    text: &str,
) -> Result<Location, EngineError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EngineError::validation(
            "you must provide the location name or code",
        ));
    }

    let by_name = locations::table
        .filter(lower(locations::name).eq(text.to_lowercase()))
        .first::<Location>(conn)
        .optional()?;
    if let Some(location) = by_name {
        return Ok(location);
    }
    if let Some(location) = find_by_code(conn, text)? {
        return Ok(location);
    }

    for attempt in 0..MAX_CODE_ATTEMPTS {
        let code = code_candidate(text, attempt);
        if find_by_code(conn, &code)?.is_some() {
            continue;
        }

        let location = new_location(code, text.to_string());
        match diesel::insert_into(locations::table)
            .values(&location)
            .execute(conn)
        {
            Ok(_) => {
                info!(
                    "auto-provisioned location {} ({})",
                    location.code, location.id
                );
                return Ok(location);
            }
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                // Lost the race. Reuse the winner's row if it was created
                // from the same text, otherwise keep suffixing.
                if let Some(existing) = find_by_code(conn, &location.code)? {
                    if existing.name.eq_ignore_ascii_case(text) {
                        return Ok(existing);
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(EngineError::Conflict(format!(
        "could not allocate a unique code for location \"{text}\""
    )))
}

pub fn open_ticket_count(conn: &mut PgConnection, location_id: Uuid) -> Result<i64, EngineError> {
    let count = tickets::table
        .filter(tickets::location_id.eq(location_id))
        .filter(tickets::status.eq_any(vec![
            TicketStatus::Pending.as_str(),
            TicketStatus::InProgress.as_str(),
        ]))
        .count()
        .get_result(conn)?;
    Ok(count)
}

pub fn month_ticket_count(
    conn: &mut PgConnection,
    location_id: Uuid,
    now: DateTime<Utc>,
) -> Result<i64, EngineError> {
    let month_start = now
        .date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        .unwrap_or(now);

    let count = tickets::table
        .filter(tickets::location_id.eq(location_id))
        .filter(tickets::created_at.ge(month_start))
        .count()
        .get_result(conn)?;
    Ok(count)
}

pub async fn list_locations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Location>>, EngineError> {
    let mut conn = state.conn.get()?;

    let rows: Vec<Location> = locations::table
        .filter(locations::active.eq(true))
        .order(locations::code.asc())
        .load(&mut conn)?;

    Ok(Json(rows))
}

pub async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LocationDetail>, EngineError> {
    let mut conn = state.conn.get()?;

    let location: Location = locations::table
        .filter(locations::id.eq(id))
        .first(&mut conn)
        .map_err(|_| EngineError::NotFound(format!("location {id} not found")))?;

    let open_tickets = open_ticket_count(&mut conn, id)?;
    let tickets_this_month = month_ticket_count(&mut conn, id, Utc::now())?;

    Ok(Json(LocationDetail {
        location,
        open_tickets,
        tickets_this_month,
    }))
}

pub async fn create_location(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLocationRequest>,
) -> Result<Json<Location>, EngineError> {
    let code = req.code.trim().to_string();
    let name = req.name.trim().to_string();
    if code.is_empty() || name.is_empty() {
        return Err(EngineError::validation(
            "location code and name must not be blank",
        ));
    }

    let mut conn = state.conn.get()?;

    let mut location = new_location(code, name);
    location.address = req.address;
    location.province = req.province;
    location.municipality = req.municipality;
    location.phone = req.phone;
    location.manager_name = req.manager_name;
    location.manager_phone = req.manager_phone;
    location.notes = req.notes;

    diesel::insert_into(locations::table)
        .values(&location)
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => EngineError::Conflict(format!("location code \"{}\" already exists", location.code)),
            other => other.into(),
        })?;

    Ok(Json(location))
}

pub async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLocationRequest>,
) -> Result<Json<Location>, EngineError> {
    let mut conn = state.conn.get()?;

    let mut location: Location = locations::table
        .filter(locations::id.eq(id))
        .first(&mut conn)
        .map_err(|_| EngineError::NotFound(format!("location {id} not found")))?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::validation("location name must not be blank"));
        }
        location.name = name;
    }
    if let Some(address) = req.address {
        location.address = Some(address);
    }
    if let Some(province) = req.province {
        location.province = Some(province);
    }
    if let Some(municipality) = req.municipality {
        location.municipality = Some(municipality);
    }
    if let Some(phone) = req.phone {
        location.phone = Some(phone);
    }
    if let Some(manager_name) = req.manager_name {
        location.manager_name = Some(manager_name);
    }
    if let Some(manager_phone) = req.manager_phone {
        location.manager_phone = Some(manager_phone);
    }
    if let Some(active) = req.active {
        location.active = active;
    }
    if let Some(notes) = req.notes {
        location.notes = Some(notes);
    }
    location.updated_at = Utc::now();

    diesel::update(locations::table.filter(locations::id.eq(id)))
        .set(&location)
        .execute(&mut conn)?;

    Ok(Json(location))
}

pub fn configure_locations_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/locations", get(list_locations).post(create_location))
        .route(
            "/api/locations/:id",
            get(get_location).put(update_location),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_candidate_is_the_raw_text() {
        assert_eq!(code_candidate("gd01", 0), "gd01");
    }

    #[test]
    fn retries_append_numeric_suffixes_from_two() {
        assert_eq!(code_candidate("gd01", 1), "gd01-2");
        assert_eq!(code_candidate("gd01", 2), "gd01-3");
        assert_eq!(code_candidate("gd01", 4), "gd01-5");
    }
}

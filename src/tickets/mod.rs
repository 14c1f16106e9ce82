//! Ticket lifecycle & SLA engine, exposed over the HTTP API.

pub mod engine;
pub mod sla;
pub mod sweep;

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::notifications::{spawn_notify, NotificationEvent};
use crate::shared::enums::{Priority, TicketStatus};
use crate::shared::error::EngineError;
use crate::shared::schema::{ticket_comments, tickets};
use crate::shared::state::AppState;
use crate::tickets::sla::SlaColor;
use crate::users::get_user;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub location_id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub work_started_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub sla_deadline: DateTime<Utc>,
    pub resolution_notes: Option<String>,
    pub resolution_photo: Option<String>,
    pub sla_deadline_notified: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub internal: bool,
    pub created_at: DateTime<Utc>,
}

/// Flat ticket view handed to the notification dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct TicketSummary {
    pub id: Uuid,
    pub ticket_number: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub assigned_to: Option<Uuid>,
}

/// Ticket plus the SLA read queries, evaluated at response time.
#[derive(Debug, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub overdue: bool,
    pub time_remaining_secs: Option<i64>,
    pub elapsed_secs: i64,
    pub percent_sla_used: f64,
    pub sla_color: SlaColor,
}

impl TicketView {
    pub fn at(ticket: Ticket, now: DateTime<Utc>) -> Self {
        let overdue = ticket.is_overdue(now);
        let time_remaining_secs = ticket.time_remaining(now).map(|d| d.num_seconds());
        let elapsed_secs = ticket.elapsed_time(now).num_seconds();
        let percent_sla_used = ticket.percent_sla_used(now);
        let sla_color = ticket.sla_color(now);
        Self {
            ticket,
            overdue,
            time_remaining_secs,
            elapsed_secs,
            percent_sla_used,
            sla_color,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    /// Free-text location name or code; auto-provisioned if unknown.
    pub location: String,
    pub category_id: Uuid,
    pub title: Option<String>,
    pub description: String,
    pub priority: Option<Priority>,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub technician_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: TicketStatus,
    pub resolution_notes: Option<String>,
    pub resolution_photo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub author_id: Uuid,
    pub body: String,
    pub internal: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CommentsQuery {
    /// Viewer account; internal comments are filtered out unless the
    /// viewer's role may see them.
    pub viewer: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub category_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TicketStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub resolved: i64,
    pub closed: i64,
    pub cancelled: i64,
    pub overdue: i64,
}

#[derive(Debug, Serialize)]
pub struct TicketWithComments {
    #[serde(flatten)]
    pub view: TicketView,
    pub comments: Vec<TicketComment>,
}

/// Builds the summary and hands the event to the dispatcher without
/// blocking the request. Dispatch failures are logged only; the ticket
/// mutation has already committed.
fn emit_event(state: &Arc<AppState>, conn: &mut PgConnection, ticket: &Ticket, event: NotificationEvent) {
    match engine::summarize(conn, ticket) {
        Ok(summary) => spawn_notify(state.notifier.clone(), summary, event),
        Err(e) => error!(
            "could not build notification summary for {}: {e}",
            ticket.ticket_number
        ),
    }
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<TicketView>, EngineError> {
    let mut conn = state.conn.get()?;

    let ticket = engine::create_ticket(
        &mut conn,
        engine::NewTicketInput {
            location_text: req.location,
            category_id: req.category_id,
            title: req.title,
            description: req.description,
            priority: req.priority,
            created_by: req.created_by,
            assigned_to: req.assigned_to,
        },
    )?;

    if ticket.assigned_to.is_some() {
        emit_event(&state, &mut conn, &ticket, NotificationEvent::Assigned);
    }

    Ok(Json(TicketView::at(ticket, Utc::now())))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TicketView>>, EngineError> {
    let mut conn = state.conn.get()?;
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = tickets::table.into_boxed();

    if let Some(status) = query.status {
        q = q.filter(tickets::status.eq(status.as_str()));
    }
    if let Some(priority) = query.priority {
        q = q.filter(tickets::priority.eq(priority.as_str()));
    }
    if let Some(category_id) = query.category_id {
        q = q.filter(tickets::category_id.eq(category_id));
    }
    if let Some(location_id) = query.location_id {
        q = q.filter(tickets::location_id.eq(location_id));
    }
    if let Some(assigned_to) = query.assigned_to {
        q = q.filter(tickets::assigned_to.eq(assigned_to));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            tickets::ticket_number
                .ilike(pattern.clone())
                .or(tickets::title.ilike(pattern.clone()))
                .or(tickets::description.ilike(pattern)),
        );
    }

    let rows: Vec<Ticket> = q
        .order(tickets::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    let now = Utc::now();
    Ok(Json(rows.into_iter().map(|t| TicketView::at(t, now)).collect()))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketView>, EngineError> {
    let mut conn = state.conn.get()?;
    let ticket = engine::get_ticket(&mut conn, id)?;
    Ok(Json(TicketView::at(ticket, Utc::now())))
}

pub async fn get_ticket_with_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<CommentsQuery>,
) -> Result<Json<TicketWithComments>, EngineError> {
    let mut conn = state.conn.get()?;

    let ticket = engine::get_ticket(&mut conn, id)?;
    let comments = visible_comments(&mut conn, id, query.viewer)?;

    Ok(Json(TicketWithComments {
        view: TicketView::at(ticket, Utc::now()),
        comments,
    }))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<Json<TicketView>, EngineError> {
    let mut conn = state.conn.get()?;

    let ticket = engine::assign(&mut conn, id, req.technician_id)?;
    emit_event(&state, &mut conn, &ticket, NotificationEvent::Assigned);

    Ok(Json(TicketView::at(ticket, Utc::now())))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<TicketView>, EngineError> {
    let mut conn = state.conn.get()?;

    let ticket = engine::transition(
        &mut conn,
        id,
        req.status,
        req.resolution_notes,
        req.resolution_photo,
    )?;

    Ok(Json(TicketView::at(ticket, Utc::now())))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<Json<TicketComment>, EngineError> {
    let mut conn = state.conn.get()?;

    let comment = engine::add_comment(
        &mut conn,
        id,
        req.author_id,
        req.body,
        req.internal.unwrap_or(false),
    )?;

    Ok(Json(comment))
}

fn visible_comments(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<Vec<TicketComment>, EngineError> {
    let can_see_internal = match viewer {
        Some(viewer_id) => get_user(conn, viewer_id)?.role.can_view_internal_comments(),
        None => false,
    };

    let mut comments = engine::list_comments(conn, ticket_id)?;
    if !can_see_internal {
        comments.retain(|c| !c.internal);
    }
    Ok(comments)
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<CommentsQuery>,
) -> Result<Json<Vec<TicketComment>>, EngineError> {
    let mut conn = state.conn.get()?;
    Ok(Json(visible_comments(&mut conn, id, query.viewer)?))
}

fn count_by_status(conn: &mut PgConnection, status: TicketStatus) -> Result<i64, EngineError> {
    let count = tickets::table
        .filter(tickets::status.eq(status.as_str()))
        .count()
        .get_result(conn)?;
    Ok(count)
}

pub async fn get_ticket_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TicketStats>, EngineError> {
    let mut conn = state.conn.get()?;

    let total: i64 = tickets::table.count().get_result(&mut conn)?;
    let pending = count_by_status(&mut conn, TicketStatus::Pending)?;
    let in_progress = count_by_status(&mut conn, TicketStatus::InProgress)?;
    let resolved = count_by_status(&mut conn, TicketStatus::Resolved)?;
    let closed = count_by_status(&mut conn, TicketStatus::Closed)?;
    let cancelled = count_by_status(&mut conn, TicketStatus::Cancelled)?;

    let now = Utc::now();
    let overdue: i64 = tickets::table
        .filter(tickets::sla_deadline.lt(now))
        .filter(tickets::status.ne_all(vec![
            TicketStatus::Resolved.as_str(),
            TicketStatus::Closed.as_str(),
            TicketStatus::Cancelled.as_str(),
        ]))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(TicketStats {
        total,
        pending,
        in_progress,
        resolved,
        closed,
        cancelled,
        overdue,
    }))
}

pub async fn list_overdue_tickets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TicketView>>, EngineError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::sla_deadline.lt(now))
        .filter(tickets::status.ne_all(vec![
            TicketStatus::Resolved.as_str(),
            TicketStatus::Closed.as_str(),
            TicketStatus::Cancelled.as_str(),
        ]))
        .order(tickets::sla_deadline.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(|t| TicketView::at(t, now)).collect()))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/stats", get(get_ticket_stats))
        .route("/api/tickets/overdue", get(list_overdue_tickets))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/full", get(get_ticket_with_comments))
        .route("/api/tickets/:id/assign", put(assign_ticket))
        .route("/api/tickets/:id/status", put(change_status))
        .route("/api/tickets/:id/comments", get(list_comments).post(add_comment))
}

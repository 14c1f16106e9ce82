//! Ticket lifecycle engine: creation, numbering, assignment, state
//! transitions and the SLA sweep queries.
//!
//! All operations run synchronously on one pooled connection.
//! Uniqueness races on the ticket number are recovered internally by
//! regenerating against the fresh maximum and retrying the insert;
//! they never surface to callers.

use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use log::warn;
use uuid::Uuid;

use crate::categories::{get_category, Category};
use crate::locations::resolve_or_create_location;
use crate::shared::enums::{Priority, Role, TicketStatus};
use crate::shared::error::EngineError;
use crate::shared::schema::{categories, locations, ticket_comments, tickets};
use crate::tickets::sla::{deadline_for, next_ticket_number};
use crate::tickets::{Ticket, TicketComment, TicketSummary};
use crate::users::{get_user, has_specialty, User};

/// Bounded retries when two creations race for the same number.
const MAX_NUMBER_ATTEMPTS: u32 = 5;

pub struct NewTicketInput {
    pub location_text: String,
    pub category_id: Uuid,
    pub title: Option<String>,
    pub description: String,
    pub priority: Option<Priority>,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
}

/// Checks that `technician_id` may take tickets of `category`: the user
/// must hold the technician role and carry the category among their
/// specialties. Applied on creation and on every re-assignment alike.
pub fn validate_technician(
    conn: &mut PgConnection,
    technician_id: Uuid,
    category: &Category,
) -> Result<User, EngineError> {
    let user = get_user(conn, technician_id)?;

    if user.role != Role::Technician {
        return Err(EngineError::validation(format!(
            "\"{}\" is not a technician and cannot be assigned tickets",
            user.display_name()
        )));
    }
    if !has_specialty(conn, technician_id, category.id)? {
        return Err(EngineError::validation(format!(
            "technician \"{}\" does not have \"{}\" among their specialties",
            user.display_name(),
            category.name
        )));
    }

    Ok(user)
}

pub fn get_ticket(conn: &mut PgConnection, id: Uuid) -> Result<Ticket, EngineError> {
    tickets::table
        .filter(tickets::id.eq(id))
        .first(conn)
        .map_err(|_| EngineError::NotFound(format!("ticket {id} not found")))
}

pub fn create_ticket(
    conn: &mut PgConnection,
    input: NewTicketInput,
) -> Result<Ticket, EngineError> {
    let location = resolve_or_create_location(conn, &input.location_text)?;
    let category = get_category(conn, input.category_id)?;

    if let Some(technician_id) = input.assigned_to {
        validate_technician(conn, technician_id, &category)?;
    }

    let now = Utc::now();
    let title = input
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("{} - {}", category.name, location.code));

    let mut ticket = Ticket {
        id: Uuid::new_v4(),
        ticket_number: String::new(),
        location_id: location.id,
        category_id: category.id,
        title,
        description: input.description,
        priority: input.priority.unwrap_or_default(),
        status: TicketStatus::Pending,
        created_by: input.created_by,
        assigned_to: None,
        created_at: now,
        assigned_at: None,
        work_started_at: None,
        resolved_at: None,
        closed_at: None,
        sla_deadline: deadline_for(now, category.sla_hours),
        resolution_notes: None,
        resolution_photo: None,
        sla_deadline_notified: false,
        updated_at: now,
    };
    if let Some(technician_id) = input.assigned_to {
        ticket.assign_to(technician_id, now);
    }

    // Speculative numbering: read the current maximum, insert, and on a
    // unique-violation regenerate against the fresh maximum.
    for attempt in 0..MAX_NUMBER_ATTEMPTS {
        let last: Option<String> = tickets::table
            .select(max(tickets::ticket_number))
            .first(conn)?;
        ticket.ticket_number = next_ticket_number(last.as_deref());

        match diesel::insert_into(tickets::table)
            .values(&ticket)
            .execute(conn)
        {
            Ok(_) => return Ok(ticket),
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                warn!(
                    "ticket number {} taken by a concurrent insert (attempt {})",
                    ticket.ticket_number,
                    attempt + 1
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(EngineError::Conflict(
        "could not allocate a unique ticket number".to_string(),
    ))
}

pub fn assign(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    technician_id: Uuid,
) -> Result<Ticket, EngineError> {
    let mut ticket = get_ticket(conn, ticket_id)?;
    let category = get_category(conn, ticket.category_id)?;
    validate_technician(conn, technician_id, &category)?;

    ticket.assign_to(technician_id, Utc::now());

    diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
        .set((
            tickets::assigned_to.eq(ticket.assigned_to),
            tickets::assigned_at.eq(ticket.assigned_at),
            tickets::updated_at.eq(ticket.updated_at),
        ))
        .execute(conn)?;

    Ok(ticket)
}

pub fn transition(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    new_status: TicketStatus,
    resolution_notes: Option<String>,
    resolution_photo: Option<String>,
) -> Result<Ticket, EngineError> {
    let mut ticket = get_ticket(conn, ticket_id)?;

    ticket.apply_status(new_status, Utc::now());
    if let Some(notes) = resolution_notes {
        ticket.resolution_notes = Some(notes);
    }
    if let Some(photo) = resolution_photo {
        ticket.resolution_photo = Some(photo);
    }

    diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
        .set(&ticket)
        .execute(conn)?;

    Ok(ticket)
}

pub fn add_comment(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    author_id: Uuid,
    body: String,
    internal: bool,
) -> Result<TicketComment, EngineError> {
    if body.trim().is_empty() {
        return Err(EngineError::validation("comment body must not be blank"));
    }
    let ticket = get_ticket(conn, ticket_id)?;
    let now = Utc::now();

    let comment = TicketComment {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        author_id,
        body,
        internal,
        created_at: now,
    };

    diesel::insert_into(ticket_comments::table)
        .values(&comment)
        .execute(conn)?;
    diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
        .set(tickets::updated_at.eq(now))
        .execute(conn)?;

    Ok(comment)
}

pub fn list_comments(
    conn: &mut PgConnection,
    ticket_id: Uuid,
) -> Result<Vec<TicketComment>, EngineError> {
    let comments = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(ticket_id))
        .order(ticket_comments::created_at.asc())
        .load(conn)?;
    Ok(comments)
}

/// Tickets past their deadline, still open, whose overdue notification
/// has not gone out yet. The flag is only set after the dispatcher
/// reports success, so a failed dispatch leaves the ticket eligible for
/// the next sweep.
pub fn find_overdue_unnotified(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Ticket>, EngineError> {
    let rows = tickets::table
        .filter(tickets::sla_deadline.lt(now))
        .filter(tickets::status.ne_all(vec![
            TicketStatus::Resolved.as_str(),
            TicketStatus::Closed.as_str(),
            TicketStatus::Cancelled.as_str(),
        ]))
        .filter(tickets::sla_deadline_notified.eq(false))
        .order(tickets::sla_deadline.asc())
        .load(conn)?;
    Ok(rows)
}

pub fn mark_sla_notified(conn: &mut PgConnection, ticket_id: Uuid) -> Result<(), EngineError> {
    diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
        .set((
            tickets::sla_deadline_notified.eq(true),
            tickets::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

/// Flat ticket view for the notification boundary: everything the
/// dispatcher needs, nothing about tokens or endpoints.
pub fn summarize(conn: &mut PgConnection, ticket: &Ticket) -> Result<TicketSummary, EngineError> {
    let location_name: String = locations::table
        .filter(locations::id.eq(ticket.location_id))
        .select(locations::name)
        .first(conn)?;
    let category_name: String = categories::table
        .filter(categories::id.eq(ticket.category_id))
        .select(categories::name)
        .first(conn)?;

    Ok(TicketSummary {
        id: ticket.id,
        ticket_number: ticket.ticket_number.clone(),
        title: ticket.title.clone(),
        description: ticket.description.clone(),
        location: location_name,
        category: category_name,
        priority: ticket.priority,
        status: ticket.status,
        assigned_to: ticket.assigned_to,
    })
}

//! Notification dispatcher.
//!
//! The engine hands over a `TicketSummary` and an event kind; tokens,
//! endpoints and credentials stay on this side of the boundary. A
//! dispatch failure never propagates into the ticket mutation that
//! triggered it: assignment events are fire-and-forget, and the SLA
//! sweep simply leaves the notified flag unset so the next run retries.

pub mod fcm;
pub mod whatsapp;

use async_trait::async_trait;
use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{FcmConfig, WhatsAppConfig};
use crate::shared::enums::Role;
use crate::shared::error::EngineError;
use crate::shared::schema::{notification_devices, users};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;
use crate::tickets::TicketSummary;
use crate::users::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    Assigned,
    SlaOverdue,
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assigned => f.write_str("assigned"),
            Self::SlaOverdue => f.write_str("sla_overdue"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("gateway rejected the message: {0}")]
    Gateway(String),
    #[error("no recipients reachable")]
    NoRecipients,
    #[error("lookup failed: {0}")]
    Lookup(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Outbound side of the engine. `deliver` reports success or failure so
/// the SLA sweep can decide whether to set the notified flag.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        ticket: &TicketSummary,
        event: NotificationEvent,
    ) -> Result<(), DispatchError>;
}

/// Fire-and-forget dispatch for events emitted inside a request.
pub fn spawn_notify(
    notifier: Arc<dyn NotificationSink>,
    summary: TicketSummary,
    event: NotificationEvent,
) {
    tokio::spawn(async move {
        if let Err(e) = notifier.deliver(&summary, event).await {
            error!(
                "notification ({event}) for {} failed: {e}",
                summary.ticket_number
            );
        }
    });
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = notification_devices)]
pub struct NotificationDevice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub push_token: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Production sink: FCM push plus the Twilio WhatsApp gateway.
pub struct PushSink {
    conn: DbPool,
    base_url: String,
    fcm: fcm::FcmClient,
    whatsapp: whatsapp::TwilioClient,
}

impl PushSink {
    pub fn new(
        conn: DbPool,
        base_url: String,
        fcm_config: FcmConfig,
        whatsapp_config: WhatsAppConfig,
    ) -> Self {
        Self {
            conn,
            base_url,
            fcm: fcm::FcmClient::new(fcm_config),
            whatsapp: whatsapp::TwilioClient::new(whatsapp_config),
        }
    }

    fn ticket_url(&self, ticket_id: Uuid) -> String {
        format!("{}/tickets/{}", self.base_url.trim_end_matches('/'), ticket_id)
    }

    fn active_tokens_for(&self, user_id: Uuid) -> Result<Vec<String>, DispatchError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;
        let tokens = notification_devices::table
            .filter(notification_devices::user_id.eq(user_id))
            .filter(notification_devices::active.eq(true))
            .filter(notification_devices::push_token.ne(""))
            .select(notification_devices::push_token)
            .load(&mut conn)
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;
        Ok(tokens)
    }

    fn admin_tokens(&self) -> Result<Vec<String>, DispatchError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;
        let tokens = notification_devices::table
            .inner_join(users::table)
            .filter(users::role.eq(Role::Admin.as_str()))
            .filter(users::active.eq(true))
            .filter(notification_devices::active.eq(true))
            .filter(notification_devices::push_token.ne(""))
            .select(notification_devices::push_token)
            .load(&mut conn)
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;
        Ok(tokens)
    }

    fn whatsapp_number_of(&self, user_id: Uuid) -> Result<Option<String>, DispatchError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;
        let user: User = users::table
            .filter(users::id.eq(user_id))
            .first(&mut conn)
            .map_err(|e| DispatchError::Lookup(e.to_string()))?;
        Ok(user.whatsapp)
    }

    async fn deliver_assigned(&self, ticket: &TicketSummary) -> Result<(), DispatchError> {
        let Some(technician_id) = ticket.assigned_to else {
            info!(
                "{}: no technician assigned, skipping push",
                ticket.ticket_number
            );
            return Ok(());
        };

        let url = self.ticket_url(ticket.id);
        let title = format!("New ticket {}", ticket.ticket_number);
        let body = format!("{} - {}", ticket.location, ticket.category);

        for token in self.active_tokens_for(technician_id)? {
            if let Err(e) = self
                .fcm
                .send_push(&token, &title, &body, ticket, &url)
                .await
            {
                error!("FCM push for {} failed: {e}", ticket.ticket_number);
            }
        }

        if let Some(number) = self.whatsapp_number_of(technician_id)? {
            let message = whatsapp::assigned_message(ticket, &url);
            if let Err(e) = self.whatsapp.send_message(&number, &message).await {
                error!("WhatsApp for {} failed: {e}", ticket.ticket_number);
            }
        }

        Ok(())
    }

    async fn deliver_sla_overdue(&self, ticket: &TicketSummary) -> Result<(), DispatchError> {
        let tokens = self.admin_tokens()?;
        if tokens.is_empty() {
            return Err(DispatchError::NoRecipients);
        }

        let url = self.ticket_url(ticket.id);
        let title = format!("SLA breached {}", ticket.ticket_number);
        let body = format!("{} - {}", ticket.location, ticket.category);

        let mut delivered = 0usize;
        for token in tokens {
            match self.fcm.send_push(&token, &title, &body, ticket, &url).await {
                Ok(()) => delivered += 1,
                Err(e) => error!("FCM SLA push for {} failed: {e}", ticket.ticket_number),
            }
        }

        if delivered == 0 {
            return Err(DispatchError::NoRecipients);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for PushSink {
    async fn deliver(
        &self,
        ticket: &TicketSummary,
        event: NotificationEvent,
    ) -> Result<(), DispatchError> {
        match event {
            NotificationEvent::Assigned => self.deliver_assigned(ticket).await,
            NotificationEvent::SlaOverdue => self.deliver_sla_overdue(ticket).await,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub user_id: Uuid,
    pub push_token: String,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateDeviceRequest {
    pub push_token: String,
}

/// Registers (or reactivates) a push token for a user.
pub async fn register_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<Json<NotificationDevice>, EngineError> {
    let push_token = req.push_token.trim().to_string();
    if push_token.is_empty() {
        return Err(EngineError::validation("push_token must not be blank"));
    }

    let mut conn = state.conn.get()?;

    let existing: Option<NotificationDevice> = notification_devices::table
        .filter(notification_devices::user_id.eq(req.user_id))
        .filter(notification_devices::push_token.eq(&push_token))
        .first(&mut conn)
        .optional()?;

    if let Some(device) = existing {
        diesel::update(
            notification_devices::table.filter(notification_devices::id.eq(device.id)),
        )
        .set(notification_devices::active.eq(true))
        .execute(&mut conn)?;
        return Ok(Json(NotificationDevice {
            active: true,
            ..device
        }));
    }

    let device = NotificationDevice {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        push_token,
        active: true,
        created_at: Utc::now(),
    };

    diesel::insert_into(notification_devices::table)
        .values(&device)
        .execute(&mut conn)?;

    Ok(Json(device))
}

pub async fn deactivate_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeactivateDeviceRequest>,
) -> Result<Json<serde_json::Value>, EngineError> {
    let mut conn = state.conn.get()?;

    let updated = diesel::update(
        notification_devices::table
            .filter(notification_devices::push_token.eq(&req.push_token)),
    )
    .set(notification_devices::active.eq(false))
    .execute(&mut conn)?;

    Ok(Json(serde_json::json!({ "deactivated": updated })))
}

pub fn configure_devices_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/devices", post(register_device))
        .route("/api/devices/deactivate", post(deactivate_device))
}

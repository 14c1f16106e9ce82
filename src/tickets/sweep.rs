//! Periodic SLA-overdue sweep.
//!
//! Runs on a fixed interval, finds open tickets past their deadline
//! that have not been notified yet, and dispatches one SlaOverdue event
//! per ticket. The notified flag is set only after the dispatcher
//! reports success, so a failed delivery is retried on the next pass.
//! A ticket resolved between the query and the dispatch may still be
//! notified once; that race is accepted.

use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};

use crate::notifications::NotificationEvent;
use crate::shared::error::EngineError;
use crate::shared::state::AppState;
use crate::tickets::engine;

/// Background loop. Spawned once at startup; never returns.
pub async fn run_sla_sweep(state: Arc<AppState>) {
    let period = std::time::Duration::from_secs(state.config.sweep_interval_secs);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("SLA sweep running every {}s", period.as_secs());
    loop {
        ticker.tick().await;
        match sweep_once(&state).await {
            Ok(0) => {}
            Ok(sent) => info!("SLA sweep: notified {sent} ticket(s)"),
            Err(e) => error!("SLA sweep failed: {e}"),
        }
    }
}

/// One sweep pass. Re-entrant: overlapping invocations at worst
/// duplicate a notification for the same ticket, never corrupt state.
pub async fn sweep_once(state: &Arc<AppState>) -> Result<usize, EngineError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let due = engine::find_overdue_unnotified(&mut conn, now)?;
    if due.is_empty() {
        return Ok(0);
    }
    info!("SLA sweep: {} overdue ticket(s) to notify", due.len());

    let mut sent = 0usize;
    for ticket in due {
        let summary = engine::summarize(&mut conn, &ticket)?;
        match state
            .notifier
            .deliver(&summary, NotificationEvent::SlaOverdue)
            .await
        {
            Ok(()) => {
                engine::mark_sla_notified(&mut conn, ticket.id)?;
                sent += 1;
            }
            Err(e) => warn!(
                "SLA notification for {} failed, retrying next sweep: {e}",
                ticket.ticket_number
            ),
        }
    }

    Ok(sent)
}

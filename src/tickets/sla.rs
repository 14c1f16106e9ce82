//! SLA arithmetic and first-entry timestamp bookkeeping.
//!
//! Everything here is pure: the engine persists whatever these
//! functions compute. The deadline is fixed once at creation; later
//! edits to a category's SLA window never touch existing tickets.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::shared::enums::TicketStatus;
use crate::tickets::Ticket;

pub const TICKET_NUMBER_PREFIX: &str = "TKT-";

/// Next ticket number after the highest one currently allocated.
/// Numbers are zero-padded to six digits, so the lexicographic maximum
/// of the column is also the numeric maximum.
pub fn next_ticket_number(last: Option<&str>) -> String {
    let last_seq = last
        .and_then(|n| n.strip_prefix(TICKET_NUMBER_PREFIX))
        .and_then(|d| d.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}{:06}", TICKET_NUMBER_PREFIX, last_seq + 1)
}

/// SLA deadline for a ticket created at `created_at` under a category
/// allowing `sla_hours` hours.
pub fn deadline_for(created_at: DateTime<Utc>, sla_hours: i32) -> DateTime<Utc> {
    created_at + Duration::hours(i64::from(sla_hours))
}

/// Traffic-light banding used by dashboards and list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaColor {
    Success,
    Warning,
    Danger,
}

impl Ticket {
    /// A ticket in a terminal state is never overdue, whatever its
    /// deadline says.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        now > self.sla_deadline
    }

    /// Time left before the deadline, floored at zero. `None` once the
    /// ticket reaches a terminal state.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.status.is_terminal() {
            return None;
        }
        let remaining = self.sla_deadline - now;
        Some(remaining.max(Duration::zero()))
    }

    /// Wall-clock time the ticket has been open. A closed ticket stops
    /// the clock at `closed_at`.
    pub fn elapsed_time(&self, now: DateTime<Utc>) -> Duration {
        if self.status == TicketStatus::Closed {
            if let Some(closed_at) = self.closed_at {
                return closed_at - self.created_at;
            }
        }
        now - self.created_at
    }

    /// Share of the SLA window already consumed, clamped to [0, 100].
    /// A degenerate zero-hour window counts as fully used.
    pub fn percent_sla_used(&self, now: DateTime<Utc>) -> f64 {
        let total = (self.sla_deadline - self.created_at).num_seconds();
        if total <= 0 {
            return 100.0;
        }
        let used = (now - self.created_at).num_seconds();
        (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn sla_color(&self, now: DateTime<Utc>) -> SlaColor {
        if matches!(self.status, TicketStatus::Resolved | TicketStatus::Closed) {
            return SlaColor::Success;
        }
        let pct = self.percent_sla_used(now);
        if pct < 50.0 {
            SlaColor::Success
        } else if pct < 75.0 {
            SlaColor::Warning
        } else {
            SlaColor::Danger
        }
    }

    /// Moves the ticket into `new_status`, recording first-entry
    /// timestamps. Timestamps record "first reached", not "currently
    /// in": re-entering a state never overwrites them and leaving one
    /// never clears them.
    pub fn apply_status(&mut self, new_status: TicketStatus, now: DateTime<Utc>) {
        self.status = new_status;
        match new_status {
            TicketStatus::InProgress => {
                if self.work_started_at.is_none() {
                    self.work_started_at = Some(now);
                }
            }
            TicketStatus::Resolved => {
                if self.resolved_at.is_none() {
                    self.resolved_at = Some(now);
                }
            }
            TicketStatus::Closed => {
                if self.closed_at.is_none() {
                    self.closed_at = Some(now);
                }
            }
            TicketStatus::Pending | TicketStatus::Cancelled => {}
        }
        self.updated_at = now;
    }

    /// Hands the ticket to a technician. `assigned_at` is set on the
    /// first assignment only; re-assignment keeps the original value.
    pub fn assign_to(&mut self, technician_id: uuid::Uuid, now: DateTime<Utc>) {
        self.assigned_to = Some(technician_id);
        if self.assigned_at.is_none() {
            self.assigned_at = Some(now);
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::Priority;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn sample_ticket(sla_hours: i32) -> Ticket {
        let created = t0();
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: "TKT-000001".to_string(),
            location_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            title: "Electrical fault".to_string(),
            description: "No power at the counter".to_string(),
            priority: Priority::Medium,
            status: TicketStatus::Pending,
            created_by: Uuid::new_v4(),
            assigned_to: None,
            created_at: created,
            assigned_at: None,
            work_started_at: None,
            resolved_at: None,
            closed_at: None,
            sla_deadline: deadline_for(created, sla_hours),
            resolution_notes: None,
            resolution_photo: None,
            sla_deadline_notified: false,
            updated_at: created,
        }
    }

    #[test]
    fn numbering_starts_at_one_and_increments() {
        assert_eq!(next_ticket_number(None), "TKT-000001");
        assert_eq!(next_ticket_number(Some("TKT-000001")), "TKT-000002");
        assert_eq!(next_ticket_number(Some("TKT-000041")), "TKT-000042");
        assert_eq!(next_ticket_number(Some("TKT-999998")), "TKT-999999");
    }

    #[test]
    fn numbering_is_strictly_increasing() {
        let mut prev = next_ticket_number(None);
        for _ in 0..20 {
            let next = next_ticket_number(Some(&prev));
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn deadline_is_creation_plus_category_hours() {
        assert_eq!(deadline_for(t0(), 4), t0() + Duration::hours(4));
        assert_eq!(deadline_for(t0(), 24), t0() + Duration::hours(24));
    }

    #[test]
    fn four_hour_sla_scenario() {
        // Category "Electricidad", sla_hours = 4, created at T0.
        let mut ticket = sample_ticket(4);
        assert_eq!(ticket.sla_deadline, t0() + Duration::hours(4));

        let five_hours_in = t0() + Duration::hours(5);
        assert!(ticket.is_overdue(five_hours_in));

        ticket.apply_status(TicketStatus::Resolved, five_hours_in);
        assert!(!ticket.is_overdue(five_hours_in));
    }

    #[test]
    fn terminal_states_are_never_overdue() {
        let past_deadline = t0() + Duration::hours(100);
        for status in [
            TicketStatus::Resolved,
            TicketStatus::Closed,
            TicketStatus::Cancelled,
        ] {
            let mut ticket = sample_ticket(1);
            ticket.apply_status(status, past_deadline);
            assert!(!ticket.is_overdue(past_deadline), "{status} must not be overdue");
        }
    }

    #[test]
    fn time_remaining_floors_at_zero() {
        let ticket = sample_ticket(4);
        let remaining = ticket.time_remaining(t0() + Duration::hours(2)).unwrap();
        assert_eq!(remaining, Duration::hours(2));

        let late = ticket.time_remaining(t0() + Duration::hours(10)).unwrap();
        assert_eq!(late, Duration::zero());
    }

    #[test]
    fn time_remaining_is_none_for_terminal_states() {
        let mut ticket = sample_ticket(4);
        ticket.apply_status(TicketStatus::Cancelled, t0());
        assert!(ticket.time_remaining(t0()).is_none());
    }

    #[test]
    fn percent_sla_used_is_clamped() {
        let ticket = sample_ticket(4);
        assert_eq!(ticket.percent_sla_used(t0()), 0.0);
        assert_eq!(ticket.percent_sla_used(t0() + Duration::hours(2)), 50.0);
        assert_eq!(ticket.percent_sla_used(t0() + Duration::hours(400)), 100.0);
        // A "now" before creation should not go negative either.
        assert_eq!(ticket.percent_sla_used(t0() - Duration::hours(1)), 0.0);
    }

    #[test]
    fn zero_hour_window_counts_as_fully_used() {
        let ticket = sample_ticket(0);
        assert_eq!(ticket.percent_sla_used(t0()), 100.0);
    }

    #[test]
    fn resolved_timestamp_is_first_entry_only() {
        let mut ticket = sample_ticket(4);
        let first = t0() + Duration::hours(1);
        let second = t0() + Duration::hours(2);

        ticket.apply_status(TicketStatus::Resolved, first);
        assert_eq!(ticket.resolved_at, Some(first));

        ticket.apply_status(TicketStatus::Resolved, second);
        assert_eq!(ticket.resolved_at, Some(first));
        assert_eq!(ticket.updated_at, second);
    }

    #[test]
    fn reopening_does_not_clear_timestamps() {
        let mut ticket = sample_ticket(4);
        let resolved = t0() + Duration::hours(1);
        let closed = t0() + Duration::hours(2);
        let reopened = t0() + Duration::hours(3);

        ticket.apply_status(TicketStatus::Resolved, resolved);
        ticket.apply_status(TicketStatus::Closed, closed);
        ticket.apply_status(TicketStatus::Pending, reopened);

        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(ticket.resolved_at, Some(resolved));
        assert_eq!(ticket.closed_at, Some(closed));
    }

    #[test]
    fn work_started_recorded_on_first_in_progress() {
        let mut ticket = sample_ticket(4);
        let first = t0() + Duration::minutes(30);
        ticket.apply_status(TicketStatus::InProgress, first);
        ticket.apply_status(TicketStatus::Pending, t0() + Duration::hours(1));
        ticket.apply_status(TicketStatus::InProgress, t0() + Duration::hours(2));
        assert_eq!(ticket.work_started_at, Some(first));
    }

    #[test]
    fn elapsed_time_stops_at_closure() {
        let mut ticket = sample_ticket(4);
        let closed = t0() + Duration::hours(3);
        ticket.apply_status(TicketStatus::Closed, closed);

        let much_later = t0() + Duration::hours(50);
        assert_eq!(ticket.elapsed_time(much_later), Duration::hours(3));

        let mut open_ticket = sample_ticket(4);
        open_ticket.apply_status(TicketStatus::Resolved, closed);
        assert_eq!(open_ticket.elapsed_time(much_later), Duration::hours(50));
    }

    #[test]
    fn assignment_timestamp_set_once() {
        let mut ticket = sample_ticket(4);
        let first_tech = Uuid::new_v4();
        let second_tech = Uuid::new_v4();
        let first = t0() + Duration::minutes(10);
        let second = t0() + Duration::minutes(40);

        ticket.assign_to(first_tech, first);
        assert_eq!(ticket.assigned_at, Some(first));

        ticket.assign_to(second_tech, second);
        assert_eq!(ticket.assigned_to, Some(second_tech));
        assert_eq!(ticket.assigned_at, Some(first));
    }

    #[test]
    fn sla_color_banding() {
        let ticket = sample_ticket(4);
        assert_eq!(ticket.sla_color(t0() + Duration::hours(1)), SlaColor::Success);
        assert_eq!(ticket.sla_color(t0() + Duration::minutes(150)), SlaColor::Warning);
        assert_eq!(ticket.sla_color(t0() + Duration::minutes(210)), SlaColor::Danger);

        let mut resolved = sample_ticket(4);
        resolved.apply_status(TicketStatus::Resolved, t0() + Duration::hours(10));
        assert_eq!(resolved.sla_color(t0() + Duration::hours(10)), SlaColor::Success);
    }
}

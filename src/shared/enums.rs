//! Closed enum types shared across the ticket engine.
//!
//! All three enums are stored as text columns and map through Diesel's
//! `Text` SQL type, so an unknown value in the database surfaces as a
//! deserialization error instead of silently flowing through string
//! comparisons.

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Account role. Capability checks live here so callers never compare
/// role strings directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Technician,
    EndUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Technician => "TECHNICIAN",
            Self::EndUser => "END_USER",
        }
    }

    pub fn can_assign_tickets(&self) -> bool {
        matches!(self, Self::Admin)
    }

    pub fn can_close_tickets(&self) -> bool {
        matches!(self, Self::Admin | Self::Technician)
    }

    pub fn can_view_internal_comments(&self) -> bool {
        matches!(self, Self::Admin | Self::Technician)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Self::Admin),
            "TECHNICIAN" => Ok(Self::Technician),
            "END_USER" => Ok(Self::EndUser),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Ticket lifecycle state. Any state is reachable from any other; the
/// engine only attaches first-entry side effects to some of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Pending,
    InProgress,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states stop SLA tracking entirely.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::Cancelled)
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "RESOLVED" => Ok(Self::Resolved),
            "CLOSED" => Ok(Self::Closed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

macro_rules! text_sql_impls {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(serialize::IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $ty {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let s = std::str::from_utf8(bytes.as_bytes())?;
                s.parse::<$ty>().map_err(Into::into)
            }
        }
    };
}

text_sql_impls!(Role);
text_sql_impls!(TicketStatus);
text_sql_impls!(Priority);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Admin, Role::Technician, Role::EndUser] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("TECNICO".parse::<Role>().is_err());
    }

    #[test]
    fn terminal_states_are_exactly_resolved_closed_cancelled() {
        assert!(!TicketStatus::Pending.is_terminal());
        assert!(!TicketStatus::InProgress.is_terminal());
        assert!(TicketStatus::Resolved.is_terminal());
        assert!(TicketStatus::Closed.is_terminal());
        assert!(TicketStatus::Cancelled.is_terminal());
    }

    #[test]
    fn capability_checks_follow_role() {
        assert!(Role::Admin.can_assign_tickets());
        assert!(!Role::Technician.can_assign_tickets());
        assert!(Role::Technician.can_view_internal_comments());
        assert!(!Role::EndUser.can_view_internal_comments());
    }

    #[test]
    fn defaults_match_intake() {
        assert_eq!(TicketStatus::default(), TicketStatus::Pending);
        assert_eq!(Priority::default(), Priority::Medium);
    }
}

pub mod categories;
pub mod config;
pub mod locations;
pub mod notifications;
pub mod shared;
pub mod tickets;
pub mod users;

pub mod auth;
pub mod email;
pub mod jobs;
pub mod knowledge;
pub mod notifications;
pub mod stats;
pub mod tickets;
pub mod tokens;
pub mod uploads;

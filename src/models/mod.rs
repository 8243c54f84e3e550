pub mod auth;
pub mod knowledge;
pub mod notification;
pub mod ticket;
pub mod user;

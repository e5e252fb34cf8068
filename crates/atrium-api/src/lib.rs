pub mod admin;
pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod settings;
pub mod users;

pub mod connection;
pub mod dispatcher;
pub mod filter;
pub mod rooms;
pub mod session;

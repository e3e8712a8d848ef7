pub mod agents;
pub mod chat;
pub mod config;
pub mod message;
pub mod model;
pub mod providers;
pub mod session;

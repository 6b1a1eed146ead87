pub mod admin;
pub mod chat;
pub mod config;
pub mod counter;

pub mod config;
pub mod error;
pub mod service;
pub mod router;
pub mod handlers;
pub mod middleware;
pub mod db;
pub mod api;
pub mod types;

pub use error::ShowcaseError;
pub use service::relay::ChatRelay;
pub use service::usage::UsageHandle;

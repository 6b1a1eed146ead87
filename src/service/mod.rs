pub mod config_watch;
pub mod relay;
pub mod usage;

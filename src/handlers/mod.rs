pub mod health_handlers;
pub mod snapshot_handlers;

pub mod analyze;
pub mod error;
pub mod handler_utils;
pub mod server;

pub mod analysis;
pub mod api;
pub mod db;
pub mod fetch;
pub mod provider;

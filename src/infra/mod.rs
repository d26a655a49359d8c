pub mod db;
pub mod error;
pub mod notify;
pub mod telemetry;

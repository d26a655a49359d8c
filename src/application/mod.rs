pub mod catalog;
pub mod error;
pub mod jobs;
pub mod orders;
pub mod reports;
pub mod repos;

pub mod backup_exchange;
pub mod catalog;
pub mod core;
pub mod dashboard;
pub mod digest;
pub mod forum;
pub mod mastery;
pub mod students;
pub mod workplan;

pub mod backup;
pub mod calendar;
pub mod config;
pub mod db;
pub mod digest;
pub mod ipc;
pub mod seed;

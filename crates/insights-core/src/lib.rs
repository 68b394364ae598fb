pub mod application;
pub mod clock;
pub mod config;
pub mod error;
pub mod funnel;
pub mod goal;
pub mod keys;
pub mod metrics;
pub mod realtime;
pub mod records;
pub mod retention;
pub mod session;
pub mod tracking;
pub mod traffic;
pub mod visitor;

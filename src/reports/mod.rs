pub mod aggregate;
pub mod batching;
pub mod event_reports;
pub mod flexible;

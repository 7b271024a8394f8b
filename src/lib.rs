pub mod attribution;
pub mod errors;
pub mod filters;
pub mod privacy;
pub mod records;
pub mod reports;
pub mod store;
pub mod values;

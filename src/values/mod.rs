pub mod json;
pub mod time;
pub mod unsigned_long;

pub use time::Timestamp;
pub use unsigned_long::UnsignedLong;

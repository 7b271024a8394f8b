/// Epoch milliseconds.
pub type Timestamp = i64;

pub const ONE_MINUTE_MS: i64 = 60 * 1000;
pub const ONE_HOUR_MS: i64 = 60 * ONE_MINUTE_MS;
pub const ONE_DAY_MS: i64 = 24 * ONE_HOUR_MS;

pub const fn minutes(n: i64) -> i64 {
    n * ONE_MINUTE_MS
}

pub const fn hours(n: i64) -> i64 {
    n * ONE_HOUR_MS
}

pub const fn days(n: i64) -> i64 {
    n * ONE_DAY_MS
}

/// Rounds a timestamp down to the start of its UTC day.
pub fn round_down_to_day(timestamp: Timestamp) -> Timestamp {
    timestamp.div_euclid(ONE_DAY_MS) * ONE_DAY_MS
}

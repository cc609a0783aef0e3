use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds since the Unix epoch, the unit sample timestamps are exposed in.
pub fn now_millis() -> i64 {
    now().timestamp_millis()
}

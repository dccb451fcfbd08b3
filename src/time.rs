use std::time::{SystemTime, UNIX_EPOCH};

pub fn create_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since_the_epoch| since_the_epoch.as_millis() as u64)
        .unwrap_or(0)
}

/// Seconds since the epoch, the unit token claims are expressed in.
pub fn create_timestamp_secs() -> u64 {
    create_timestamp() / 1000
}

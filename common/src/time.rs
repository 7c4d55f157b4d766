use chrono::{DateTime, Utc};

pub type Timestamp = DateTime<Utc>;

// Current wall-clock time; every entity timestamp flows through here
pub fn now() -> Timestamp {
    Utc::now()
}

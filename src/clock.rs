// Time source for task creation

use chrono::{DateTime, Utc};

/// Supplies the current time to the store
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock(std::cell::Cell<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn at_ms(ms: i64) -> Self {
        let start = DateTime::from_timestamp_millis(ms).expect("timestamp in range");
        Self(std::cell::Cell::new(start))
    }

    pub(crate) fn advance_ms(&self, ms: i64) {
        self.0.set(self.0.get() + chrono::Duration::milliseconds(ms));
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.get()
    }
}

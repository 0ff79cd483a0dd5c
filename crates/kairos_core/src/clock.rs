//! Injectable source of "now".
//!
//! All reads of the current instant in core go through a `Clock`. Tests use
//! `VirtualClock` to pin time and reproduce classification boundaries.

use chrono::{DateTime, Utc};
use std::cell::Cell;
use std::rc::Rc;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn is_past(&self, instant: DateTime<Utc>) -> bool {
        instant <= self.now()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for deterministic tests and simulations.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    now: Cell<DateTime<Utc>>,
}

impl VirtualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, VirtualClock};
    use chrono::{Duration, TimeZone, Utc};
    use std::rc::Rc;

    #[test]
    fn virtual_clock_is_shared_through_rc() {
        let start = Utc
            .with_ymd_and_hms(2008, 12, 1, 17, 0, 0)
            .single()
            .expect("utc instant");
        let clock = Rc::new(VirtualClock::at(start));
        let handle: Box<dyn Clock> = Box::new(clock.clone());

        clock.advance(Duration::hours(2));
        assert_eq!(handle.now(), start + Duration::hours(2));
        assert!(handle.is_past(start));
        assert!(!handle.is_past(start + Duration::days(1)));
    }
}

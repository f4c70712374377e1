//! Wall-clock throttling of intermediate results.
//!
//! Iterative reducers run hundreds of steps. Forwarding every step would
//! flood the consumer, so intermediate states pass through a
//! [`ProgressScheduler`] which admits at most one per interval. The final
//! state is always admitted. Rejected states are dropped, not buffered.

use std::time::{Duration, Instant};

/// Default minimum spacing between intermediate frames.
pub const MESSAGE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ProgressScheduler {
    interval: Duration,
    last_emit: Instant,
}

impl ProgressScheduler {
    /// Start the clock now.
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last_emit: start,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide whether the state produced at `now` should be emitted.
    ///
    /// An intermediate state is admitted only once strictly more than the
    /// interval has passed since the previous emission, which then restarts
    /// the interval.
    pub fn admit_at(&mut self, now: Instant, is_final: bool) -> bool {
        if is_final {
            self.last_emit = now;
            return true;
        }
        if now.saturating_duration_since(self.last_emit) > self.interval {
            self.last_emit = now;
            return true;
        }
        false
    }

    pub fn admit(&mut self, is_final: bool) -> bool {
        self.admit_at(Instant::now(), is_final)
    }
}

impl Default for ProgressScheduler {
    fn default() -> Self {
        Self::new(MESSAGE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn final_state_is_always_admitted() {
        let start = Instant::now();
        let mut scheduler = ProgressScheduler::starting_at(MESSAGE_INTERVAL, start);
        assert!(scheduler.admit_at(start, true));
        assert!(scheduler.admit_at(start + ms(1), true));
    }

    #[test]
    fn intermediate_states_are_throttled() {
        let start = Instant::now();
        let mut scheduler = ProgressScheduler::starting_at(MESSAGE_INTERVAL, start);

        assert!(!scheduler.admit_at(start + ms(50), false));
        assert!(!scheduler.admit_at(start + ms(200), false), "boundary is exclusive");
        assert!(scheduler.admit_at(start + ms(201), false));

        // Interval restarts from the last emission
        assert!(!scheduler.admit_at(start + ms(300), false));
        assert!(scheduler.admit_at(start + ms(402), false));
    }

    #[test]
    fn skipped_states_do_not_accumulate() {
        let start = Instant::now();
        let mut scheduler = ProgressScheduler::starting_at(ms(100), start);

        let admitted = (1..=1000u64)
            .filter(|&step| scheduler.admit_at(start + ms(step), false))
            .count();

        // 1000ms of steps at >100ms spacing
        assert_eq!(admitted, 9);
    }

    #[test]
    fn clock_going_backwards_is_not_an_emission() {
        let start = Instant::now() + ms(500);
        let mut scheduler = ProgressScheduler::starting_at(ms(100), start);
        assert!(!scheduler.admit_at(start - ms(400), false));
    }
}

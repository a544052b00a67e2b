/// Schedule for a one-second countdown that corrects for callback drift.
///
/// The interval only does arithmetic on millisecond timestamps; whoever owns
/// it sleeps for [`Fire::next_delay_ms`] and calls [`DriftCorrectedInterval::fire`]
/// when woken. Late callbacks still produce exactly one tick. A callback more
/// than one full interval off schedule resynchronizes: late ones (a throttled
/// host) do not queue catch-up ticks, and early ones (the wall clock stepped
/// backwards) do not stall the countdown.
#[derive(Debug, Clone)]
pub struct DriftCorrectedInterval {
    interval_ms: i64,
    expected_next_ms: Option<i64>,
}

/// Outcome of one scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fire {
    /// `now - expected`; negative when the callback was early.
    pub drift_ms: i64,
    /// The schedule was re-anchored to `now` because the callback was too far off.
    pub resynced: bool,
    pub next_delay_ms: i64,
}

pub const DEFAULT_INTERVAL_MS: i64 = 1_000;

impl DriftCorrectedInterval {
    pub fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            expected_next_ms: None,
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    pub fn is_started(&self) -> bool {
        self.expected_next_ms.is_some()
    }

    pub fn expected_next_ms(&self) -> Option<i64> {
        self.expected_next_ms
    }

    /// Anchors the schedule at `now`. Restarting discards the previous anchor.
    pub fn start(&mut self, now_ms: i64) -> i64 {
        self.expected_next_ms = Some(now_ms + self.interval_ms);
        self.interval_ms
    }

    pub fn stop(&mut self) {
        self.expected_next_ms = None;
    }

    /// Accounts for one callback at `now_ms`. The caller emits one tick per call.
    pub fn fire(&mut self, now_ms: i64) -> Fire {
        let expected = self.expected_next_ms.unwrap_or(now_ms);
        let drift_ms = now_ms - expected;

        let resynced = drift_ms.abs() > self.interval_ms;
        let next = if resynced {
            now_ms + self.interval_ms
        } else {
            expected + self.interval_ms
        };
        self.expected_next_ms = Some(next);

        Fire {
            drift_ms,
            resynced,
            next_delay_ms: (next - now_ms).max(0),
        }
    }
}

impl Default for DriftCorrectedInterval {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_callbacks_shorten_the_next_delay() {
        let mut interval = DriftCorrectedInterval::default();
        assert_eq!(interval.start(0), 1_000);

        let fire = interval.fire(1_030);
        assert_eq!(fire.drift_ms, 30);
        assert!(!fire.resynced);
        assert_eq!(fire.next_delay_ms, 970);
        assert_eq!(interval.expected_next_ms(), Some(2_000));
    }

    #[test]
    fn early_callbacks_lengthen_the_next_delay() {
        let mut interval = DriftCorrectedInterval::default();
        interval.start(0);

        let fire = interval.fire(990);
        assert_eq!(fire.drift_ms, -10);
        assert_eq!(fire.next_delay_ms, 1_010);
    }

    #[test]
    fn error_stays_bounded_over_many_ticks() {
        let mut interval = DriftCorrectedInterval::default();
        interval.start(0);

        // Every callback arrives 15ms after it was asked to.
        let mut now = 0;
        let mut delay = 1_000;
        for _ in 0..1_000 {
            now += delay + 15;
            delay = interval.fire(now).next_delay_ms;
        }

        let ideal = 1_000 * 1_000;
        assert!((now - ideal).abs() <= 15, "accumulated error {}", now - ideal);
    }

    #[test]
    fn backgrounded_callback_resyncs_instead_of_bursting() {
        let mut interval = DriftCorrectedInterval::default();
        interval.start(0);

        // Tab throttled: the first callback arrives five seconds late.
        let fire = interval.fire(6_000);
        assert!(fire.resynced);
        assert_eq!(fire.drift_ms, 5_000);
        assert_eq!(fire.next_delay_ms, 1_000);
        assert_eq!(interval.expected_next_ms(), Some(7_000));

        let next = interval.fire(7_000);
        assert!(!next.resynced);
        assert_eq!(next.drift_ms, 0);
    }

    #[test]
    fn backward_clock_step_resyncs_instead_of_stalling() {
        let mut interval = DriftCorrectedInterval::default();
        interval.start(0);
        interval.fire(1_000);

        // Wall clock corrected 30 seconds into the past.
        let fire = interval.fire(-28_000);
        assert!(fire.resynced);
        assert_eq!(fire.drift_ms, -30_000);
        assert_eq!(fire.next_delay_ms, 1_000);
        assert_eq!(interval.expected_next_ms(), Some(-27_000));
    }

    #[test]
    fn exactly_one_interval_late_does_not_resync() {
        let mut interval = DriftCorrectedInterval::default();
        interval.start(0);

        let fire = interval.fire(2_000);
        assert!(!fire.resynced);
        assert_eq!(fire.next_delay_ms, 0);
    }

    #[test]
    fn restart_reanchors_the_schedule() {
        let mut interval = DriftCorrectedInterval::default();
        interval.start(0);
        interval.fire(1_000);
        interval.stop();
        assert!(!interval.is_started());

        interval.start(50_000);
        assert_eq!(interval.expected_next_ms(), Some(51_000));
    }
}

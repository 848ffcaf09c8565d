//! Progress tracking and throttling
//!
//! [`ProgressState`] is owned by the worker executing a job. After every
//! chunk the worker records the new byte count and asks the
//! [`ProgressThrottler`] whether a progress event is due.
//!
//! An event is emitted when **either** rule fires:
//!
//! - **Time**: at least `interval` has elapsed since the last emission
//! - **Fraction**: the content length is known, `divider > 0`, and at least
//!   `content_length / divider` bytes arrived since the last emission
//!
//! With an unknown content length only the time rule applies. At end of
//! stream [`ProgressThrottler::finish`] forces a terminal emission so the
//! last reported count equals the final byte count.

use std::time::{Duration, Instant};

/// Per-job progress counters
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Expected total, if the peer advertised one
    pub content_length: Option<u64>,
    /// Bytes moved so far (non-decreasing)
    pub bytes_transferred: u64,
    /// Byte count carried by the last emitted event
    pub last_emitted_bytes: u64,
    /// Time of the last emission (or of the start of the transfer)
    pub last_emit_at: Instant,
    /// Number of events emitted so far
    pub emitted: u64,
}

impl ProgressState {
    /// Start tracking a transfer at `now`
    #[must_use]
    pub fn new(content_length: Option<u64>, now: Instant) -> Self {
        Self {
            content_length,
            bytes_transferred: 0,
            last_emitted_bytes: 0,
            last_emit_at: now,
            emitted: 0,
        }
    }

    /// Add a chunk to the running total
    pub fn advance(&mut self, chunk_len: usize) -> u64 {
        self.bytes_transferred = self.bytes_transferred.saturating_add(chunk_len as u64);
        self.bytes_transferred
    }

    fn mark_emitted(&mut self, now: Instant) {
        self.last_emitted_bytes = self.bytes_transferred;
        // Clock samples fed by the caller may arrive out of order
        if now > self.last_emit_at {
            self.last_emit_at = now;
        }
        self.emitted += 1;
    }
}

/// Emission policy for progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressThrottler {
    interval: Duration,
    divider: u32,
}

impl ProgressThrottler {
    /// Create a throttler
    ///
    /// # Arguments
    ///
    /// * `interval` - Minimum time between emissions (zero: every chunk)
    /// * `divider` - Emit every `1/divider` of the content length (zero: disabled)
    #[must_use]
    pub fn new(interval: Duration, divider: u32) -> Self {
        Self { interval, divider }
    }

    /// Throttler configured from millisecond interval and divider
    #[must_use]
    pub fn from_millis(interval_ms: u64, divider: u32) -> Self {
        Self::new(Duration::from_millis(interval_ms), divider)
    }

    /// Configured interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Configured divider
    #[must_use]
    pub fn divider(&self) -> u32 {
        self.divider
    }

    /// Byte step that triggers the fraction rule, if it is active
    #[must_use]
    pub fn byte_step(&self, content_length: Option<u64>) -> Option<u64> {
        match (content_length, self.divider) {
            (Some(total), divider) if divider > 0 => Some(total / u64::from(divider)),
            _ => None,
        }
    }

    /// Decide whether to emit for the state's current byte count
    ///
    /// Updates `last_emitted_bytes` and `last_emit_at` when it returns true.
    pub fn should_emit(&self, state: &mut ProgressState, now: Instant) -> bool {
        if state.bytes_transferred == state.last_emitted_bytes && state.emitted > 0 {
            return false;
        }

        let elapsed = now.saturating_duration_since(state.last_emit_at);
        let time_due = elapsed >= self.interval;
        let bytes_due = self
            .byte_step(state.content_length)
            .is_some_and(|step| state.bytes_transferred - state.last_emitted_bytes >= step);

        if time_due || bytes_due {
            state.mark_emitted(now);
            true
        } else {
            false
        }
    }

    /// Terminal emission at end of stream
    ///
    /// Returns true if the final byte count has not been reported yet.
    pub fn finish(&self, state: &mut ProgressState, now: Instant) -> bool {
        if state.emitted > 0 && state.last_emitted_bytes == state.bytes_transferred {
            return false;
        }
        if state.emitted == 0 && state.bytes_transferred == 0 {
            return false;
        }
        state.mark_emitted(now);
        true
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::new(Duration::ZERO, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(len: Option<u64>, start: Instant) -> ProgressState {
        ProgressState::new(len, start)
    }

    #[test]
    fn test_zero_interval_emits_every_chunk() {
        let start = Instant::now();
        let throttler = ProgressThrottler::default();
        let mut st = state(Some(100), start);

        for _ in 0..5 {
            st.advance(10);
            assert!(throttler.should_emit(&mut st, start));
        }
        assert_eq!(st.emitted, 5);
        assert_eq!(st.last_emitted_bytes, 50);
    }

    #[test]
    fn test_time_rule() {
        let start = Instant::now();
        let throttler = ProgressThrottler::from_millis(100, 0);
        let mut st = state(Some(1000), start);

        st.advance(10);
        assert!(!throttler.should_emit(&mut st, start + Duration::from_millis(50)));
        st.advance(10);
        assert!(throttler.should_emit(&mut st, start + Duration::from_millis(100)));
        assert_eq!(st.last_emitted_bytes, 20);

        st.advance(10);
        assert!(!throttler.should_emit(&mut st, start + Duration::from_millis(150)));
        assert!(throttler.should_emit(&mut st, start + Duration::from_millis(200)));
    }

    #[test]
    fn test_divider_rule() {
        let start = Instant::now();
        let throttler = ProgressThrottler::from_millis(60_000, 10);
        let mut st = state(Some(1000), start);

        st.advance(99);
        assert!(!throttler.should_emit(&mut st, start));
        st.advance(1);
        assert!(throttler.should_emit(&mut st, start));
        assert_eq!(st.last_emitted_bytes, 100);

        st.advance(50);
        assert!(!throttler.should_emit(&mut st, start));
        st.advance(60);
        assert!(throttler.should_emit(&mut st, start));
        assert_eq!(st.last_emitted_bytes, 210);
    }

    #[test]
    fn test_unknown_length_disables_divider() {
        let start = Instant::now();
        let throttler = ProgressThrottler::from_millis(60_000, 10);
        let mut st = state(None, start);

        st.advance(1_000_000);
        assert!(!throttler.should_emit(&mut st, start));
        assert_eq!(throttler.byte_step(None), None);
        assert!(throttler.should_emit(&mut st, start + Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_divider_disables_fraction_rule() {
        let throttler = ProgressThrottler::from_millis(1000, 0);
        assert_eq!(throttler.byte_step(Some(1000)), None);
    }

    #[test]
    fn test_no_duplicate_emission_without_new_bytes() {
        let start = Instant::now();
        let throttler = ProgressThrottler::default();
        let mut st = state(Some(100), start);

        st.advance(10);
        assert!(throttler.should_emit(&mut st, start));
        assert!(!throttler.should_emit(&mut st, start + Duration::from_secs(1)));
    }

    #[test]
    fn test_finish_reports_final_count() {
        let start = Instant::now();
        let throttler = ProgressThrottler::from_millis(60_000, 0);
        let mut st = state(Some(30), start);

        st.advance(10);
        assert!(!throttler.should_emit(&mut st, start));
        st.advance(20);
        assert!(throttler.finish(&mut st, start));
        assert_eq!(st.last_emitted_bytes, 30);

        // Already reported
        assert!(!throttler.finish(&mut st, start));
    }

    #[test]
    fn test_finish_on_empty_transfer_is_silent() {
        let start = Instant::now();
        let throttler = ProgressThrottler::default();
        let mut st = state(Some(0), start);
        assert!(!throttler.finish(&mut st, start));
        assert_eq!(st.emitted, 0);
    }

    #[test]
    fn test_timestamps_never_move_backwards() {
        let start = Instant::now();
        let throttler = ProgressThrottler::default();
        let mut st = state(None, start);

        st.advance(1);
        assert!(throttler.should_emit(&mut st, start + Duration::from_millis(10)));
        st.advance(1);
        assert!(throttler.should_emit(&mut st, start + Duration::from_millis(5)));
        assert_eq!(st.last_emit_at, start + Duration::from_millis(10));
    }
}

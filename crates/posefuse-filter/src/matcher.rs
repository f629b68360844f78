//! [`BracketMatcher`] – pairs each helper sample with the two master samples
//! that surround it in time.
//!
//! Both streams grow independently.  Whenever a helper sample `h` has a
//! master sample at or before it and another at or after it,
//! [`BracketMatcher::next_match`] yields `(h, before, after)` with
//! `before.time ≤ h.time ≤ after.time`.  Helpers are matched in arrival
//! order and at most once; the `before` boundary is consumed by the match.
//!
//! A helper older than every retained master can never be bracketed and is
//! dropped.  A helper newer than every master waits for the next master.
//!
//! # Example
//!
//! ```rust
//! use posefuse_filter::matcher::BracketMatcher;
//! use posefuse_types::Stamped;
//!
//! let mut m = BracketMatcher::new(5_000);
//! m.push_master(Stamped::new(0, 'a')).unwrap();
//! m.push_helper(Stamped::new(4, 1.0)).unwrap();
//! assert!(m.next_match().is_none()); // no master after t=4 yet
//!
//! m.push_master(Stamped::new(10, 'b')).unwrap();
//! let b = m.next_match().unwrap();
//! assert_eq!((b.helper.time_ms, b.before.value, b.after.value), (4, 'a', 'b'));
//! ```

use std::collections::VecDeque;

use posefuse_types::{FusionError, Stamped, Stream};
use tracing::debug;

/// One helper sample together with its bracketing master samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket<M, H> {
    pub helper: Stamped<H>,
    pub before: Stamped<M>,
    pub after: Stamped<M>,
}

impl<M, H> Bracket<M, H> {
    /// Width of the master bracket (ms).
    pub fn interval_ms(&self) -> i64 {
        self.after.time_ms - self.before.time_ms
    }
}

/// Buffers two timestamped streams and emits bracket matches.
#[derive(Debug)]
pub struct BracketMatcher<M, H> {
    masters: VecDeque<Stamped<M>>,
    helpers: VecDeque<Stamped<H>>,
    last_master_ms: Option<i64>,
    last_helper_ms: Option<i64>,
    horizon_ms: i64,
}

impl<M: Clone, H> BracketMatcher<M, H> {
    /// Samples older than the newest sample of their own stream by more than
    /// `horizon_ms` are discarded.
    pub fn new(horizon_ms: i64) -> Self {
        Self {
            masters: VecDeque::new(),
            helpers: VecDeque::new(),
            last_master_ms: None,
            last_helper_ms: None,
            horizon_ms,
        }
    }

    /// Buffer a master sample.
    ///
    /// # Errors
    ///
    /// [`FusionError::NonMonotonic`] if `sample` is older than the previous
    /// master sample; the sample is not buffered.
    pub fn push_master(&mut self, sample: Stamped<M>) -> Result<(), FusionError> {
        check_order(Stream::Master, self.last_master_ms, sample.time_ms)?;
        self.last_master_ms = Some(sample.time_ms);
        let oldest = sample.time_ms - self.horizon_ms;
        while self.masters.front().is_some_and(|m| m.time_ms < oldest) {
            self.masters.pop_front();
        }
        self.masters.push_back(sample);
        Ok(())
    }

    /// Buffer a helper sample.
    ///
    /// # Errors
    ///
    /// [`FusionError::NonMonotonic`] if `sample` is older than the previous
    /// helper sample; the sample is not buffered.
    pub fn push_helper(&mut self, sample: Stamped<H>) -> Result<(), FusionError> {
        check_order(Stream::Helper, self.last_helper_ms, sample.time_ms)?;
        self.last_helper_ms = Some(sample.time_ms);
        let oldest = sample.time_ms - self.horizon_ms;
        while self.helpers.front().is_some_and(|h| h.time_ms < oldest) {
            self.helpers.pop_front();
        }
        self.helpers.push_back(sample);
        Ok(())
    }

    /// Pop the next ready match, if any.
    pub fn next_match(&mut self) -> Option<Bracket<M, H>> {
        loop {
            let helper_ms = self.helpers.front()?.time_ms;
            if self.masters.len() < 2 {
                return None;
            }
            let before_ms = self.masters[0].time_ms;
            let after_ms = self.masters[1].time_ms;
            if helper_ms < before_ms {
                debug!(helper_ms, before_ms, "dropping helper older than every master");
                self.helpers.pop_front();
            } else if helper_ms > after_ms {
                self.masters.pop_front();
            } else {
                let helper = self.helpers.pop_front()?;
                let before = self.masters.pop_front()?;
                let after = self.masters.front()?.clone();
                return Some(Bracket {
                    helper,
                    before,
                    after,
                });
            }
        }
    }

    /// Drain every match that is ready now.
    pub fn drain(&mut self) -> impl Iterator<Item = Bracket<M, H>> + '_ {
        std::iter::from_fn(move || self.next_match())
    }

    pub fn pending_masters(&self) -> usize {
        self.masters.len()
    }

    pub fn pending_helpers(&self) -> usize {
        self.helpers.len()
    }
}

fn check_order(stream: Stream, last_ms: Option<i64>, got_ms: i64) -> Result<(), FusionError> {
    match last_ms {
        Some(last_ms) if got_ms < last_ms => Err(FusionError::NonMonotonic {
            stream,
            last_ms,
            got_ms,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> BracketMatcher<u32, u32> {
        BracketMatcher::new(10_000)
    }

    #[test]
    fn waits_for_master_after_helper() {
        let mut m = matcher();
        m.push_master(Stamped::new(0, 0)).unwrap();
        m.push_master(Stamped::new(10, 1)).unwrap();
        m.push_helper(Stamped::new(15, 100)).unwrap();
        assert!(m.next_match().is_none());
        assert_eq!(m.pending_helpers(), 1);

        m.push_master(Stamped::new(20, 2)).unwrap();
        let b = m.next_match().expect("bracketed");
        assert_eq!(b.helper.value, 100);
        assert_eq!(b.before.value, 1);
        assert_eq!(b.after.value, 2);
        assert_eq!(b.interval_ms(), 10);
    }

    #[test]
    fn single_master_never_matches() {
        let mut m = matcher();
        m.push_master(Stamped::new(10, 0)).unwrap();
        m.push_helper(Stamped::new(10, 7)).unwrap();
        assert!(m.next_match().is_none());
    }

    #[test]
    fn helper_older_than_all_masters_is_dropped() {
        let mut m = matcher();
        m.push_helper(Stamped::new(5, 1)).unwrap();
        m.push_master(Stamped::new(10, 0)).unwrap();
        m.push_master(Stamped::new(20, 1)).unwrap();
        assert!(m.next_match().is_none());
        assert_eq!(m.pending_helpers(), 0);
        assert_eq!(m.pending_masters(), 2);
    }

    #[test]
    fn drain_yields_every_queued_helper_in_order() {
        let mut m = matcher();
        m.push_master(Stamped::new(0, 0)).unwrap();
        m.push_helper(Stamped::new(2, 10)).unwrap();
        m.push_helper(Stamped::new(12, 11)).unwrap();
        m.push_helper(Stamped::new(27, 12)).unwrap();
        m.push_master(Stamped::new(10, 1)).unwrap();
        m.push_master(Stamped::new(20, 2)).unwrap();
        m.push_master(Stamped::new(30, 3)).unwrap();

        let matches: Vec<_> = m.drain().collect();
        let got: Vec<_> = matches
            .iter()
            .map(|b| (b.helper.value, b.before.value, b.after.value))
            .collect();
        assert_eq!(got, vec![(10, 0, 1), (11, 1, 2), (12, 2, 3)]);
        for b in &matches {
            assert!(b.before.time_ms <= b.helper.time_ms);
            assert!(b.helper.time_ms <= b.after.time_ms);
        }
        assert_eq!(m.pending_helpers(), 0);
    }

    #[test]
    fn helpers_sharing_a_bracket_match_once_each() {
        let mut m = matcher();
        m.push_master(Stamped::new(0, 0)).unwrap();
        m.push_master(Stamped::new(10, 1)).unwrap();
        m.push_helper(Stamped::new(3, 10)).unwrap();
        m.push_helper(Stamped::new(6, 11)).unwrap();

        let first = m.next_match().expect("first");
        assert_eq!(first.helper.value, 10);
        assert!(m.next_match().is_none());
        assert_eq!(m.pending_helpers(), 1);

        // `before` was consumed, so the second helper is older than every
        // master once the next one arrives.
        m.push_master(Stamped::new(20, 2)).unwrap();
        assert!(m.next_match().is_none());
        assert_eq!(m.pending_helpers(), 0);
    }

    #[test]
    fn helper_on_master_timestamp_matches() {
        let mut m = matcher();
        m.push_master(Stamped::new(0, 0)).unwrap();
        m.push_master(Stamped::new(10, 1)).unwrap();
        m.push_helper(Stamped::new(10, 5)).unwrap();
        let b = m.next_match().expect("bracketed");
        assert_eq!(b.before.time_ms, 0);
        assert_eq!(b.after.time_ms, 10);
    }

    #[test]
    fn zero_width_bracket_is_accepted() {
        let mut m = matcher();
        m.push_master(Stamped::new(10, 0)).unwrap();
        m.push_master(Stamped::new(10, 1)).unwrap();
        m.push_helper(Stamped::new(10, 5)).unwrap();
        let b = m.next_match().expect("bracketed");
        assert_eq!(b.interval_ms(), 0);
    }

    #[test]
    fn rejects_non_monotonic_samples() {
        let mut m = matcher();
        m.push_master(Stamped::new(10, 0)).unwrap();
        let err = m.push_master(Stamped::new(9, 1)).unwrap_err();
        assert!(matches!(
            err,
            FusionError::NonMonotonic {
                stream: Stream::Master,
                last_ms: 10,
                got_ms: 9
            }
        ));
        assert_eq!(m.pending_masters(), 1);

        m.push_helper(Stamped::new(5, 0)).unwrap();
        assert!(m.push_helper(Stamped::new(4, 0)).is_err());
        // Equal timestamps are allowed.
        assert!(m.push_helper(Stamped::new(5, 1)).is_ok());
    }

    #[test]
    fn horizon_bounds_master_buffer() {
        let mut m: BracketMatcher<u32, u32> = BracketMatcher::new(100);
        for t in 0..1_000 {
            m.push_master(Stamped::new(t * 10, 0)).unwrap();
        }
        assert!(m.pending_masters() <= 11);
    }
}

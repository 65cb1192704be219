// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! Retry cadence control. A [`Backoffer`] belongs to one logical
//! operation: every backoff reason keeps its own exponential sleeper, but
//! the elapsed sleep is charged against a single per-operation budget.

use futures_timer::Delay;
use log::debug;
use rand::{thread_rng, Rng};
use rangekv_common::{Error, Result};
use std::{collections::HashMap, time::Duration};

/// Total sleep budget for a user point read.
pub const GET_MAX_BACKOFF_MS: u64 = 20_000;
/// Total sleep budget for a multi-key point read.
pub const BATCH_GET_MAX_BACKOFF_MS: u64 = 20_000;
/// Total sleep budget for one scanner advance.
pub const SCAN_MAX_BACKOFF_MS: u64 = 40_000;
/// Total sleep budget for a transaction commit; consumed by the
/// transactional layer above this crate.
pub const COMMIT_MAX_BACKOFF_MS: u64 = 600_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BackoffKind {
    NoJitter,
    FullJitter,
    EqualJitter,
}

/// Exponential sleeper for a single backoff reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    kind: BackoffKind,
    base_delay_ms: u64,
    max_delay_ms: u64,
    attempts: u32,
}

impl Backoff {
    pub const fn no_jitter_backoff(base_delay_ms: u64, max_delay_ms: u64) -> Backoff {
        Backoff {
            kind: BackoffKind::NoJitter,
            base_delay_ms,
            max_delay_ms,
            attempts: 0,
        }
    }

    /// Sleeps a uniformly random share of the exponential delay.
    pub const fn full_jitter_backoff(base_delay_ms: u64, max_delay_ms: u64) -> Backoff {
        Backoff {
            kind: BackoffKind::FullJitter,
            base_delay_ms,
            max_delay_ms,
            attempts: 0,
        }
    }

    /// Sleeps half the exponential delay plus a random share of the rest.
    pub const fn equal_jitter_backoff(base_delay_ms: u64, max_delay_ms: u64) -> Backoff {
        Backoff {
            kind: BackoffKind::EqualJitter,
            base_delay_ms,
            max_delay_ms,
            attempts: 0,
        }
    }

    /// `min(cap, base * 2^attempts)`, jittered per kind.
    fn next_delay_ms(&mut self) -> u64 {
        let capped = self
            .max_delay_ms
            .min(self.base_delay_ms.saturating_mul(2u64.saturating_pow(self.attempts)));
        self.attempts = self.attempts.saturating_add(1);
        match self.kind {
            BackoffKind::NoJitter => capped,
            BackoffKind::FullJitter => thread_rng().gen_range(0..=capped),
            BackoffKind::EqualJitter => {
                let half = capped / 2;
                half + thread_rng().gen_range(0..=capped - half)
            }
        }
    }
}

/// Why an operation is sleeping. Reasons stay distinct because their
/// typical causes recover on different time scales.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackoffReason {
    PdRpc,
    RegionMiss,
    RegionScheduling,
    ServerBusy,
    TxnLock,
    TxnLockFast,
    UpdateLeader,
}

impl BackoffReason {
    fn sleeper(self) -> Backoff {
        match self {
            BackoffReason::PdRpc => Backoff::equal_jitter_backoff(500, 3_000),
            BackoffReason::RegionMiss => Backoff::no_jitter_backoff(2, 500),
            BackoffReason::RegionScheduling => Backoff::no_jitter_backoff(2, 500),
            BackoffReason::ServerBusy => Backoff::equal_jitter_backoff(2_000, 10_000),
            BackoffReason::TxnLock => Backoff::equal_jitter_backoff(200, 3_000),
            BackoffReason::TxnLockFast => Backoff::equal_jitter_backoff(100, 3_000),
            BackoffReason::UpdateLeader => Backoff::no_jitter_backoff(1, 10),
        }
    }
}

/// Per-operation retry budget. Owned by one logical operation and never
/// shared between threads.
pub struct Backoffer {
    max_sleep_ms: u64,
    total_slept_ms: u64,
    sleepers: HashMap<BackoffReason, Backoff>,
}

impl Backoffer {
    pub fn new(max_sleep_ms: u64) -> Backoffer {
        Backoffer {
            max_sleep_ms,
            total_slept_ms: 0,
            sleepers: HashMap::new(),
        }
    }

    /// Sleeps once for `reason`, or fails with
    /// [`Error::BackoffExceeded`] wrapping `cause` when the budget cannot
    /// cover the next sleep.
    pub async fn backoff(&mut self, reason: BackoffReason, cause: Error) -> Result<()> {
        let delay_ms = self
            .sleepers
            .entry(reason)
            .or_insert_with(|| reason.sleeper())
            .next_delay_ms();
        if self.total_slept_ms + delay_ms > self.max_sleep_ms {
            return Err(Error::BackoffExceeded(Box::new(cause)));
        }
        debug!("backoff {:?} sleeps {}ms, cause: {}", reason, delay_ms, cause);
        Delay::new(Duration::from_millis(delay_ms)).await;
        self.total_slept_ms += delay_ms;
        Ok(())
    }

    pub fn total_slept_ms(&self) -> u64 {
        self.total_slept_ms
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_no_jitter_doubles_up_to_cap() {
        let mut sleeper = Backoff::no_jitter_backoff(2, 500);
        let delays: Vec<u64> = (0..10).map(|_| sleeper.next_delay_ms()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 64, 128, 256, 500, 500]);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut full = Backoff::full_jitter_backoff(100, 1_000);
        let mut equal = Backoff::equal_jitter_backoff(100, 1_000);
        for attempt in 0..8 {
            let capped = 1_000.min(100 * 2u64.pow(attempt));
            assert!(full.next_delay_ms() <= capped);
            let delay = equal.next_delay_ms();
            assert!(delay >= capped / 2 && delay <= capped);
        }
    }

    #[test]
    fn test_budget_exceeded_carries_cause() {
        let mut bo = Backoffer::new(0);
        let result = block_on(bo.backoff(
            BackoffReason::RegionMiss,
            Error::RegionUnavailable("nothing to route to".to_owned()),
        ));
        match result {
            Err(Error::BackoffExceeded(cause)) => {
                assert!(matches!(*cause, Error::RegionUnavailable(_)))
            }
            other => panic!("expected backoff exceeded, got {:?}", other),
        }
        assert_eq!(bo.total_slept_ms(), 0);
    }

    #[test]
    fn test_budget_is_shared_across_reasons() {
        let mut bo = Backoffer::new(6);
        block_on(bo.backoff(
            BackoffReason::RegionMiss,
            Error::RegionUnavailable("r1".to_owned()),
        ))
        .unwrap();
        block_on(bo.backoff(
            BackoffReason::RegionScheduling,
            Error::RegionUnavailable("r2".to_owned()),
        ))
        .unwrap();
        assert_eq!(bo.total_slept_ms(), 4);
        // Third sleep would be 4ms for a 6ms budget.
        let result = block_on(bo.backoff(
            BackoffReason::RegionMiss,
            Error::RegionUnavailable("r3".to_owned()),
        ));
        assert!(matches!(result, Err(Error::BackoffExceeded(_))));
    }

    #[test]
    fn test_attempts_counted_per_reason() {
        let mut bo = Backoffer::new(1_000);
        for _ in 0..3 {
            block_on(bo.backoff(
                BackoffReason::RegionMiss,
                Error::RegionUnavailable("miss".to_owned()),
            ))
            .unwrap();
        }
        // 2 + 4 + 8 from one reason's sleeper.
        assert_eq!(bo.total_slept_ms(), 14);
        block_on(bo.backoff(
            BackoffReason::UpdateLeader,
            Error::RegionUnavailable("leader moved".to_owned()),
        ))
        .unwrap();
        // A fresh reason starts over at its own base delay.
        assert_eq!(bo.total_slept_ms(), 15);
    }
}

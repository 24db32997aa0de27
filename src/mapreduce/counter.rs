//! Instance counter threaded through a map task.
//!
//! The counter only drives the neighborhood width. A per-partition counter
//! keeps map tasks independent and deterministic; a shared counter gives
//! globally unique values at the cost of an atomic per record and
//! scheduling-dependent assignment.

use crate::config::CounterMode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts input vectors processed by a map task.
#[derive(Debug, Clone)]
pub enum InstanceCounter {
    /// Counter owned by one partition.
    Local(u64),
    /// Counter shared across partitions.
    Shared(Arc<AtomicU64>),
}

impl InstanceCounter {
    /// Creates a partition-local counter starting at `baseline`.
    pub fn local(baseline: u64) -> Self {
        InstanceCounter::Local(baseline)
    }

    /// Creates a counter shared by every clone, starting at `baseline`.
    pub fn shared(baseline: u64) -> Self {
        InstanceCounter::Shared(Arc::new(AtomicU64::new(baseline)))
    }

    /// Creates a counter for `mode`.
    pub fn for_mode(mode: CounterMode, baseline: u64) -> Self {
        match mode {
            CounterMode::PerPartition => Self::local(baseline),
            CounterMode::Global => Self::shared(baseline),
        }
    }

    /// Returns the value for the next vector and advances by one.
    ///
    /// Saturates at `u64::MAX`; the neighborhood width is already zero there.
    #[inline]
    pub fn advance(&mut self) -> u64 {
        match self {
            InstanceCounter::Local(n) => {
                let t = *n;
                *n = t.saturating_add(1);
                t
            }
            InstanceCounter::Shared(n) => n
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| {
                    Some(t.saturating_add(1))
                })
                .unwrap_or_else(|t| t),
        }
    }

    /// Current value: the number the next vector would receive.
    pub fn value(&self) -> u64 {
        match self {
            InstanceCounter::Local(n) => *n,
            InstanceCounter::Shared(n) => n.load(Ordering::Relaxed),
        }
    }
}

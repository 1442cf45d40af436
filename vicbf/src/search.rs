use log::debug;
use thiserror::Error;

use crate::{filter::HEADER_SIZE, try_estimate_fpr, DEFAULT_DIGIT_BASE};

/// Default false positive rate targeted by a search
pub const DEFAULT_TARGET: f64 = 0.001;
/// Default accepted absolute deviation around the target
pub const DEFAULT_DEVIATION: f64 = 0.0001;

/// Iterations granted per entry by [IterationLimit::Auto]. Reaching a
/// 0.001 target takes roughly ten iterations per entry.
pub const ITERATIONS_PER_ENTRY: u64 = 1_000;
/// Lower bound of the iterations granted by [IterationLimit::Auto]
pub const MIN_ITERATIONS: u64 = 1_000_000;

/// Observed ratio between compressed and uncompressed serialized filters
pub const COMPRESSION_RATIO: f64 = 0.52;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("slot count reached {slots}, false positive rate is undefined")]
    DivisionByZero { slots: i64 },
    #[error("false positive rate is not a number (k={hash_functions} m={slots} fpr={fpr})")]
    NumericDegenerate {
        hash_functions: u64,
        slots: i64,
        fpr: f64,
    },
    #[error("no convergence after {iterations} iterations (k={hash_functions} m={slots} fpr={fpr})")]
    NonConvergence {
        iterations: u64,
        hash_functions: u64,
        slots: i64,
        fpr: f64,
    },
}

/// Bounds the number of false positive estimations a search may do
/// before giving up with [SearchError::NonConvergence]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IterationLimit {
    /// `max(MIN_ITERATIONS, ITERATIONS_PER_ENTRY * entries)`
    #[default]
    Auto,
    Fixed(u64),
    /// The search runs until it converges or fails, it may never return
    Unbounded,
}

impl IterationLimit {
    #[inline]
    fn max_for(&self, entries: u64) -> Option<u64> {
        match self {
            Self::Auto => Some(MIN_ITERATIONS.max(entries.saturating_mul(ITERATIONS_PER_ENTRY))),
            Self::Fixed(max) => Some(*max),
            Self::Unbounded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    /// desired false positive rate
    pub target: f64,
    /// accepted absolute deviation around target
    pub deviation: f64,
    /// digit base of the filter encoding
    pub digit_base: f64,
    pub limit: IterationLimit,
}

impl Default for Params {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET, DEFAULT_DEVIATION)
    }
}

impl Params {
    pub fn new(target: f64, deviation: f64) -> Self {
        Params {
            target,
            deviation,
            digit_base: DEFAULT_DIGIT_BASE,
            limit: IterationLimit::Auto,
        }
    }

    pub fn digit_base(mut self, l: f64) -> Self {
        self.digit_base = l;
        self
    }

    pub fn limit(mut self, limit: IterationLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if !(0.0..1.0).contains(&self.target) {
            return Err(SearchError::InvalidInput(format!(
                "target must be in [0, 1), got {}",
                self.target
            )));
        }

        if !(self.deviation.is_finite() && self.deviation > 0.0) {
            return Err(SearchError::InvalidInput(format!(
                "deviation must be strictly positive, got {}",
                self.deviation
            )));
        }

        if !(self.digit_base.is_finite() && self.digit_base >= 1.0) {
            return Err(SearchError::InvalidInput(format!(
                "digit base must be at least 1, got {}",
                self.digit_base
            )));
        }

        Ok(())
    }

    /// Searches the number of hash functions and slots a filter holding
    /// `entries` needs to reach the target false positive rate.
    ///
    /// # Example
    ///
    /// ```
    /// use vicbf_params::Params;
    ///
    /// let spec = Params::default().find(1000).unwrap();
    /// assert_eq!(spec.hash_functions, 7);
    /// assert_eq!(spec.slots, 6082);
    /// ```
    pub fn find(&self, entries: i64) -> Result<FilterSpec, SearchError> {
        self.validate()?;

        if entries < 0 {
            return Err(SearchError::InvalidInput(format!(
                "number of entries cannot be negative, got {entries}"
            )));
        }

        let n = entries as f64;
        let max_iterations = self.limit.max_for(entries as u64);
        let mut state = SearchState::new(entries);
        let mut iterations = 0u64;

        loop {
            if state.slots <= 0 {
                return Err(SearchError::DivisionByZero { slots: state.slots });
            }

            if max_iterations.is_some_and(|max| iterations >= max) {
                return Err(SearchError::NonConvergence {
                    iterations,
                    hash_functions: state.hash_functions,
                    slots: state.slots,
                    fpr: state.last_fpr,
                });
            }

            let fpr = try_estimate_fpr(
                n,
                state.slots as f64,
                self.digit_base,
                state.hash_functions as f64,
            )?;
            iterations += 1;

            if state.step(fpr, self.target, self.deviation) {
                debug!(
                    "entries={entries} converged after {iterations} iterations: k={} m={} fpr={fpr}",
                    state.hash_functions, state.slots
                );
                return Ok(FilterSpec {
                    entries: entries as u64,
                    hash_functions: state.hash_functions,
                    slots: state.slots as u64,
                    fpr,
                    iterations,
                });
            }
        }
    }
}

/// Shortcut for [Params::find] with the default digit base and iteration limit
pub fn find_params(entries: i64, target: f64, deviation: f64) -> Result<FilterSpec, SearchError> {
    Params::new(target, deviation).find(entries)
}

/// Parameters found for a given number of entries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub entries: u64,
    /// number of hash functions (k)
    pub hash_functions: u64,
    /// number of counters (m)
    pub slots: u64,
    /// estimated false positive rate with these parameters
    pub fpr: f64,
    /// number of estimations done by the search
    pub iterations: u64,
}

impl FilterSpec {
    #[inline]
    pub fn size_estimate(&self) -> SizeEstimate {
        SizeEstimate::from_slots(self.slots)
    }
}

/// Serialized size of a filter, in bytes, derived from its number of slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimate {
    pub uncompressed: u64,
    pub compressed: u64,
}

impl SizeEstimate {
    pub fn from_slots(slots: u64) -> Self {
        let uncompressed = slots + HEADER_SIZE as u64;
        Self {
            uncompressed,
            compressed: (uncompressed as f64 * COMPRESSION_RATIO).round() as u64,
        }
    }
}

#[derive(Debug)]
struct SearchState {
    hash_functions: u64,
    slots: i64,
    last_fpr: f64,
    /// true when the last move incremented hash_functions
    change_k: bool,
}

impl SearchState {
    fn new(entries: i64) -> Self {
        Self {
            hash_functions: 1,
            slots: entries,
            last_fpr: 0.0,
            change_k: false,
        }
    }

    /// Moves to the next candidate given the fpr of the current one.
    /// Returns true when fpr is within tolerance.
    #[inline]
    fn step(&mut self, fpr: f64, target: f64, deviation: f64) -> bool {
        let delta = fpr - target;

        if delta > deviation {
            // adding a hash function is kept as long as fpr decreases. When
            // it stops paying off, the last one is removed and a slot is
            // added instead.
            if self.last_fpr > fpr || !self.change_k {
                self.hash_functions += 1;
                self.change_k = true;
            } else {
                self.hash_functions -= 1;
                self.change_k = false;
                self.slots += 1;
            }
        } else if delta < -deviation {
            self.slots -= 1;
            self.change_k = false;
        } else {
            return true;
        }

        self.last_fpr = fpr;
        false
    }
}

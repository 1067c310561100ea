use log::warn;
use serde::Deserialize;

use crate::algo::DEFAULT_MAX_CENTROIDS;

/// Default per-accumulator memory budget.
pub const DEFAULT_MAX_ACCUMULATOR_BYTES: usize = 100 * 1024 * 1024;

pub const MAX_BYTES_ENV: &str = "PERCENTILE_MAX_ACCUMULATOR_BYTES";
pub const ACCURATE_ENV: &str = "PERCENTILE_ACCURATE_PERCENTILES";
pub const MAX_CENTROIDS_ENV: &str = "PERCENTILE_APPROXIMATE_MAX_CENTROIDS";

/// Settings shared by every accumulator built for one evaluation.
///
/// Passed explicitly to validation and construction so both states of the
/// exact-method gate can be exercised side by side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccumulatorConfig {
    /// Memory budget applied when a construction call does not override it.
    pub max_memory_bytes: usize,
    /// Whether `discrete` and `continuous` may be requested.
    pub accurate_percentiles: bool,
    /// Compression of `approximate` sketches: centroids kept after each fold.
    pub approximate_max_centroids: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: DEFAULT_MAX_ACCUMULATOR_BYTES,
            accurate_percentiles: true,
            approximate_max_centroids: DEFAULT_MAX_CENTROIDS,
        }
    }
}

impl AccumulatorConfig {
    /// Defaults overlaid with `PERCENTILE_MAX_ACCUMULATOR_BYTES`,
    /// `PERCENTILE_ACCURATE_PERCENTILES` and
    /// `PERCENTILE_APPROXIMATE_MAX_CENTROIDS`.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(MAX_BYTES_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.max_memory_bytes = n,
                Err(_) => warn!("ignoring {}={:?}: not a byte count", MAX_BYTES_ENV, raw),
            }
        }
        if let Some(raw) = lookup(ACCURATE_ENV) {
            match parse_flag(&raw) {
                Some(flag) => self.accurate_percentiles = flag,
                None => warn!("ignoring {}={:?}: expected true or false", ACCURATE_ENV, raw),
            }
        }
        if let Some(raw) = lookup(MAX_CENTROIDS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n >= 3 => self.approximate_max_centroids = n,
                _ => warn!("ignoring {}={:?}: expected an integer >= 3", MAX_CENTROIDS_ENV, raw),
            }
        }
        self
    }

    pub fn with_max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    pub fn with_accurate_percentiles(mut self, enabled: bool) -> Self {
        self.accurate_percentiles = enabled;
        self
    }

    pub fn with_approximate_max_centroids(mut self, max_centroids: usize) -> Self {
        self.approximate_max_centroids = max_centroids;
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    let v = raw.trim();
    if v == "1" || v.eq_ignore_ascii_case("true") {
        Some(true)
    } else if v == "0" || v.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

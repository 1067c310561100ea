use std::mem::size_of;

use super::partial::ExactPartial;

/// Retained samples, sorted lazily on the first read after a write.
#[derive(Debug, Clone, Default)]
struct SampleBuffer {
    values: Vec<f64>,
    sorted: bool,
}

impl SampleBuffer {
    fn push(&mut self, x: f64) {
        if self.sorted {
            self.sorted = self.values.last().map_or(true, |last| *last <= x);
        }
        self.values.push(x);
    }

    fn extend(&mut self, xs: &[f64]) {
        if xs.is_empty() {
            return;
        }
        self.values.extend_from_slice(xs);
        self.sorted = false;
    }

    fn sorted(&mut self) -> &[f64] {
        if !self.sorted {
            self.values.sort_unstable_by(f64::total_cmp);
            self.sorted = true;
        }
        &self.values
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn memory_usage_bytes(&self) -> usize {
        self.values.capacity() * size_of::<f64>()
    }

    fn to_partial(&self) -> ExactPartial {
        ExactPartial {
            values: self.values.clone(),
        }
    }
}

/// Index (0-based) of the nearest-rank percentile: rank `ceil(p * n)`,
/// clamped to `[1, n]`.
///
/// `p * n` within a few ULPs of an integer counts as that integer.
fn nearest_rank_index(p: f64, n: usize) -> usize {
    let scaled = p * n as f64;
    let nearest = scaled.round();
    let scaled = if (scaled - nearest).abs() <= 4.0 * f64::EPSILON * nearest.abs().max(1.0) {
        nearest
    } else {
        scaled
    };
    (scaled.ceil() as usize).clamp(1, n) - 1
}

/// Linear interpolation between the order statistics around `p * (n - 1)`.
fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let last = sorted.len() - 1;
    let rank = p * last as f64;
    let lo = (rank.floor() as usize).min(last);
    let hi = (rank.ceil() as usize).min(last);
    let lower = sorted[lo];
    if lo == hi {
        return lower;
    }
    let upper = sorted[hi];
    if lower == upper {
        return lower;
    }
    let frac = rank - lo as f64;
    let span = upper - lower;
    if span.is_finite() {
        return lower + span * frac;
    }
    let weighted = lower * (1.0 - frac) + upper * frac;
    if !weighted.is_nan() {
        return weighted;
    }
    // -inf and +inf as neighbours: take the nearer order statistic.
    if frac < 0.5 {
        lower
    } else {
        upper
    }
}

/// Nearest-rank exact percentile. Always returns one of the samples.
#[derive(Debug, Clone, Default)]
pub struct DiscretePercentile {
    samples: SampleBuffer,
}

impl DiscretePercentile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incorporate(&mut self, x: f64) {
        self.samples.push(x);
    }

    pub fn combine(&mut self, partial: &ExactPartial) {
        self.samples.extend(&partial.values);
    }

    pub fn count(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn compute_percentiles(&mut self, ps: &[f64]) -> Vec<f64> {
        let n = self.samples.len();
        if n == 0 {
            return Vec::new();
        }
        let sorted = self.samples.sorted();
        ps.iter().map(|&p| sorted[nearest_rank_index(p, n)]).collect()
    }

    pub fn serialize(&self) -> ExactPartial {
        self.samples.to_partial()
    }

    pub fn memory_usage_bytes(&self) -> usize {
        self.samples.memory_usage_bytes()
    }
}

/// Exact percentile interpolated between neighbouring order statistics.
#[derive(Debug, Clone, Default)]
pub struct ContinuousPercentile {
    samples: SampleBuffer,
}

impl ContinuousPercentile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incorporate(&mut self, x: f64) {
        self.samples.push(x);
    }

    pub fn combine(&mut self, partial: &ExactPartial) {
        self.samples.extend(&partial.values);
    }

    pub fn count(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn compute_percentiles(&mut self, ps: &[f64]) -> Vec<f64> {
        if self.samples.len() == 0 {
            return Vec::new();
        }
        let sorted = self.samples.sorted();
        ps.iter().map(|&p| interpolate(sorted, p)).collect()
    }

    pub fn serialize(&self) -> ExactPartial {
        self.samples.to_partial()
    }

    pub fn memory_usage_bytes(&self) -> usize {
        self.samples.memory_usage_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrete(values: &[f64], ps: &[f64]) -> Vec<f64> {
        let mut d = DiscretePercentile::new();
        values.iter().for_each(|v| d.incorporate(*v));
        d.compute_percentiles(ps)
    }

    fn continuous(values: &[f64], ps: &[f64]) -> Vec<f64> {
        let mut c = ContinuousPercentile::new();
        values.iter().for_each(|v| c.incorporate(*v));
        c.compute_percentiles(ps)
    }

    #[test]
    fn test_continuous_exact_values() {
        assert_eq!(
            continuous(&[0.0, 1.0, 2.0], &[0.5, 0.9, 0.1]),
            vec![1.0, 1.8, 0.2]
        );
        assert_eq!(continuous(&[2.0, 0.0], &[0.9]), vec![1.8]);
    }

    #[test]
    fn test_discrete_nearest_rank() {
        let values: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        assert_eq!(
            discrete(&values, &[0.0, 0.1, 0.15, 0.5, 0.95, 1.0]),
            vec![1.0, 1.0, 2.0, 5.0, 10.0, 10.0]
        );
        assert_eq!(discrete(&[27.0, 5.0, 10.0], &[0.5]), vec![10.0]);
    }

    #[test]
    fn test_discrete_rank_ignores_rounding_noise() {
        let values: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        assert_eq!(discrete(&values, &[0.07, 0.14, 0.29, 0.57]), vec![7.0, 14.0, 29.0, 57.0]);
        assert_eq!(nearest_rank_index(0.07, 100), 6);
        assert_eq!(nearest_rank_index(0.071, 100), 7);
    }

    #[test]
    fn test_extremes_are_min_and_max() {
        let values = [3.5, -7.0, 12.0, 0.0, 12.0, 4.25];
        assert_eq!(discrete(&values, &[0.0, 1.0]), vec![-7.0, 12.0]);
        assert_eq!(continuous(&values, &[0.0, 1.0]), vec![-7.0, 12.0]);
    }

    #[test]
    fn test_infinities() {
        let values = [f64::NEG_INFINITY, 1.0, f64::INFINITY];
        assert_eq!(continuous(&values, &[0.0, 0.5, 1.0]), vec![f64::NEG_INFINITY, 1.0, f64::INFINITY]);
        assert_eq!(continuous(&values, &[0.25]), vec![f64::NEG_INFINITY]);
        assert_eq!(discrete(&values, &[1.0]), vec![f64::INFINITY]);

        let values = [f64::NEG_INFINITY, f64::INFINITY];
        assert_eq!(continuous(&values, &[0.25, 0.75]), vec![f64::NEG_INFINITY, f64::INFINITY]);
    }

    #[test]
    fn test_no_samples_yields_nothing() {
        assert!(discrete(&[], &[0.5]).is_empty());
        assert!(continuous(&[], &[0.5]).is_empty());
    }

    #[test]
    fn test_combine_matches_union() {
        let (left, right) = ([5.0, 1.0, 9.0], [4.0, 4.0, 0.5, 8.0]);
        let ps = [0.0, 0.2, 0.33, 0.5, 0.77, 1.0];

        let mut a = ContinuousPercentile::new();
        left.iter().for_each(|v| a.incorporate(*v));
        let mut b = ContinuousPercentile::new();
        right.iter().for_each(|v| b.incorporate(*v));
        a.combine(&b.serialize());

        let union: Vec<f64> = left.iter().chain(right.iter()).copied().collect();
        assert_eq!(a.compute_percentiles(&ps), continuous(&union, &ps));
        assert_eq!(a.count(), 7);
    }

    #[test]
    fn test_incorporate_after_compute() {
        let mut d = DiscretePercentile::new();
        d.incorporate(3.0);
        d.incorporate(1.0);
        assert_eq!(d.compute_percentiles(&[1.0]), vec![3.0]);
        d.incorporate(2.0);
        assert_eq!(d.compute_percentiles(&[0.5]), vec![2.0]);
    }
}

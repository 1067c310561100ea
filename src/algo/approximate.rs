use std::borrow::Cow;
use std::mem::size_of;

use tdigests::{Centroid, TDigest};

use super::partial::{CentroidState, SketchPartial};

/// Default upper bound on the number of centroids kept after compression.
pub const DEFAULT_MAX_CENTROIDS: usize = 200;

/// Samples are staged here and folded into the digest in batches.
const BUFFER_LIMIT: usize = 1024;

/// t-digest backed percentile sketch.
///
/// Memory is bounded by `max_centroids` centroids plus one staging buffer,
/// independent of the number of samples. Accuracy is best near the tails:
/// the scale function packs centroids densely close to q = 0 and q = 1, so
/// the rank error of an estimate at quantile q is roughly proportional to
/// `q * (1 - q) / max_centroids`. The minimum and maximum are always exact.
///
/// Infinite samples never enter the digest, whose centroid means cannot hold
/// them. They are counted on the side and occupy the lowest and highest ranks.
#[derive(Debug, Clone)]
pub struct ApproximateSketch {
    digest: Option<TDigest>,
    buffer: Vec<f64>,
    max_centroids: usize,
    count: u64,
    neg_inf: u64,
    pos_inf: u64,
}

impl Default for ApproximateSketch {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CENTROIDS)
    }
}

impl ApproximateSketch {
    pub fn new(max_centroids: usize) -> Self {
        Self {
            digest: None,
            buffer: Vec::new(),
            max_centroids: max_centroids.max(3),
            count: 0,
            neg_inf: 0,
            pos_inf: 0,
        }
    }

    pub fn max_centroids(&self) -> usize {
        self.max_centroids
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn incorporate(&mut self, x: f64) {
        self.count += 1;
        if x == f64::NEG_INFINITY {
            self.neg_inf += 1;
            return;
        }
        if x == f64::INFINITY {
            self.pos_inf += 1;
            return;
        }
        self.buffer.push(x);
        if self.buffer.len() >= BUFFER_LIMIT {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let values = std::mem::replace(&mut self.buffer, Vec::with_capacity(BUFFER_LIMIT));
        self.fold(TDigest::from_values(values));
    }

    fn fold(&mut self, incoming: TDigest) {
        let mut merged = match self.digest.take() {
            Some(existing) => existing.merge(&incoming),
            None => incoming,
        };
        merged.compress(self.max_centroids);
        self.digest = Some(merged);
    }

    /// The digest including any staged samples, without mutating `self`.
    fn snapshot(&self) -> Option<Cow<'_, TDigest>> {
        if self.buffer.is_empty() {
            return self.digest.as_ref().map(Cow::Borrowed);
        }
        let incoming = TDigest::from_values(self.buffer.clone());
        let mut merged = match &self.digest {
            Some(existing) => existing.merge(&incoming),
            None => incoming,
        };
        merged.compress(self.max_centroids);
        Some(Cow::Owned(merged))
    }

    fn estimate(&self, p: f64) -> f64 {
        let finite = self.count.saturating_sub(self.neg_inf + self.pos_inf);
        // 0-based position among all samples, infinities included.
        let position = p * (self.count - 1) as f64;
        if position < self.neg_inf as f64 {
            return f64::NEG_INFINITY;
        }
        if position > (self.neg_inf + finite) as f64 - 1.0 {
            return f64::INFINITY;
        }
        let Some(digest) = &self.digest else {
            return f64::NAN;
        };
        let q = if finite > 1 {
            ((position - self.neg_inf as f64) / (finite - 1) as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        digest.estimate_quantile(q)
    }

    pub fn compute_percentiles(&mut self, ps: &[f64]) -> Vec<f64> {
        self.flush();
        if self.count == 0 {
            return Vec::new();
        }
        ps.iter().map(|&p| self.estimate(p)).collect()
    }

    pub fn combine(&mut self, partial: &SketchPartial) {
        self.count += partial.count;
        self.neg_inf += partial.neg_inf;
        self.pos_inf += partial.pos_inf;
        let centroids: Vec<Centroid> = partial
            .centroids
            .iter()
            .filter(|c| c.weight > 0.0 && c.mean.is_finite())
            .map(|c| Centroid::new(c.mean, c.weight))
            .collect();
        if centroids.is_empty() {
            return;
        }
        self.flush();
        self.fold(TDigest::from_centroids(centroids));
    }

    pub fn serialize(&self) -> SketchPartial {
        let centroids = self
            .snapshot()
            .map(|digest| {
                digest
                    .centroids()
                    .iter()
                    .map(|c| CentroidState {
                        mean: c.mean,
                        weight: c.weight,
                    })
                    .collect()
            })
            .unwrap_or_default();
        SketchPartial {
            count: self.count,
            neg_inf: self.neg_inf,
            pos_inf: self.pos_inf,
            centroids,
        }
    }

    /// Staging buffer plus the centroid allocation. A compressed digest owns
    /// `max_centroids` slots, an uncompressed one exactly its length.
    pub fn memory_usage_bytes(&self) -> usize {
        let slots = self
            .digest
            .as_ref()
            .map_or(0, |d| d.centroids().len().max(self.max_centroids));
        self.buffer.capacity() * size_of::<f64>() + slots * size_of::<Centroid>()
    }
}

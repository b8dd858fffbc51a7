use serde::{Deserialize, Serialize};

const DEFAULT_COMPRESSION: f64 = 100.0;
const BUFFER_LIMIT: usize = 512;

/// One weighted point of a serialized sketch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CentroidNode {
    pub mean: f64,
    pub count: u64,
}

/// Merging t-digest over call latencies.
///
/// Keeps a bounded set of weighted centroids so that millions of samples per
/// minute fit in constant memory per key while tail quantiles stay accurate
/// enough for cross-worker aggregation. Incoming samples buffer unsorted and
/// fold into the centroid list once the buffer fills or the sketch is read.
#[derive(Clone, Debug)]
pub struct LatencySketch {
    compression: f64,
    /// Ascending by mean; invariant holds between compressions.
    centroids: Vec<CentroidNode>,
    buffer: Vec<CentroidNode>,
    total: u64,
}

impl Default for LatencySketch {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencySketch {
    #[must_use]
    pub fn new() -> Self {
        Self::with_compression(DEFAULT_COMPRESSION)
    }

    #[must_use]
    pub fn with_compression(compression: f64) -> Self {
        Self {
            compression: compression.max(10.0),
            centroids: Vec::new(),
            buffer: Vec::new(),
            total: 0,
        }
    }

    /// Restores a sketch from serialized centroids, preserving centroid count
    /// and total weight exactly.
    #[must_use]
    pub fn from_centroids(nodes: &[CentroidNode]) -> Self {
        let mut centroids: Vec<CentroidNode> = nodes
            .iter()
            .copied()
            .filter(|node| node.count > 0 && node.mean.is_finite())
            .collect();
        centroids.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        let total = centroids
            .iter()
            .fold(0u64, |acc, node| acc.saturating_add(node.count));
        Self {
            compression: DEFAULT_COMPRESSION,
            centroids,
            buffer: Vec::new(),
            total,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.add_weighted(value, 1);
    }

    pub fn add_weighted(&mut self, mean: f64, count: u64) {
        if count == 0 || !mean.is_finite() {
            return;
        }
        self.buffer.push(CentroidNode { mean, count });
        self.total = self.total.saturating_add(count);
        if self.buffer.len() >= BUFFER_LIMIT {
            self.compress();
        }
    }

    /// Total weight across all centroids and buffered samples.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.total
    }

    /// Serializes the sketch as centroids in ascending mean order.
    pub fn to_centroids(&mut self) -> Vec<CentroidNode> {
        self.compress();
        self.centroids.clone()
    }

    /// Approximate value at quantile `q` in `[0, 1]`.
    pub fn quantile(&mut self, q: f64) -> f64 {
        self.compress();
        if self.centroids.is_empty() {
            return 0.0;
        }
        let total = self.total as f64;
        let target = q.clamp(0.0, 1.0) * total;
        let mut cumulative = 0.0;
        for (position, centroid) in self.centroids.iter().enumerate() {
            let half = centroid.count as f64 / 2.0;
            if cumulative + half >= target {
                if position == 0 {
                    return centroid.mean;
                }
                let previous = self.centroids[position - 1];
                let previous_mid = cumulative - previous.count as f64 / 2.0;
                let span = (cumulative + half) - previous_mid;
                if span <= 0.0 {
                    return centroid.mean;
                }
                let fraction = ((target - previous_mid) / span).clamp(0.0, 1.0);
                return previous.mean + (centroid.mean - previous.mean) * fraction;
            }
            cumulative += centroid.count as f64;
        }
        self.centroids.last().map_or(0.0, |centroid| centroid.mean)
    }

    /// k1 scale function; its unit spacing bounds how much weight one
    /// centroid may absorb at a given quantile.
    fn scale(&self, q: f64) -> f64 {
        let clamped = q.clamp(0.0, 1.0);
        self.compression / (2.0 * std::f64::consts::PI) * (2.0 * clamped - 1.0).asin()
    }

    fn compress(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut self.centroids);
        pending.append(&mut self.buffer);
        pending.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        let total = self.total as f64;
        let mut merged: Vec<CentroidNode> = Vec::new();
        let mut nodes = pending.into_iter();
        let Some(mut current) = nodes.next() else {
            return;
        };
        let mut weight_before = 0f64;
        let mut scale_left = self.scale(0.0);

        for node in nodes {
            let projected =
                weight_before + current.count.saturating_add(node.count) as f64;
            if self.scale(projected / total) - scale_left <= 1.0 {
                let combined = current.count.saturating_add(node.count);
                current.mean = (current.mean * current.count as f64
                    + node.mean * node.count as f64)
                    / combined as f64;
                current.count = combined;
            } else {
                weight_before += current.count as f64;
                scale_left = self.scale(weight_before / total);
                merged.push(current);
                current = node;
            }
        }
        merged.push(current);
        self.centroids = merged;
    }
}

//! IVF-Flat approximate nearest-neighbor index.
//!
//! Vectors are clustered into `nlist` inverted lists with k-means. A query
//! ranks the centroids, probes the `nprobe` closest lists and scans their
//! members exactly. Probing every list is an exact search.

use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::warn;

use framesift_core::DistanceMetric;

/// Upper bound on k-means refinement rounds.
const MAX_KMEANS_ITERATIONS: usize = 25;

/// In-memory IVF-Flat index over the rows of a matrix.
pub struct IvfFlatIndex {
    metric: DistanceMetric,
    /// Stored vectors, shape (N, dim). Rows are unit-normalized for cosine.
    vectors: Array2<f32>,
    /// Cluster centroids, shape (nlist, dim).
    centroids: Array2<f32>,
    /// Row indices belonging to each centroid.
    lists: Vec<Vec<usize>>,
}

impl IvfFlatIndex {
    /// Build an index over `vectors` (one row per record).
    ///
    /// The effective list count is `min(nlist, N)` and at least 1 when the
    /// matrix is not empty.
    pub fn build(mut vectors: Array2<f32>, metric: DistanceMetric, nlist: usize) -> Self {
        if metric == DistanceMetric::Cosine {
            for mut row in vectors.rows_mut() {
                let norm = row.dot(&row).sqrt();
                if norm > 1e-9 {
                    row /= norm;
                }
            }
        }

        let n = vectors.nrows();
        if n == 0 {
            return Self {
                metric,
                centroids: Array2::zeros((0, vectors.ncols())),
                vectors,
                lists: Vec::new(),
            };
        }

        let k = nlist.clamp(1, n);
        let (centroids, assignment) = kmeans(&vectors, k);
        let mut lists = vec![Vec::new(); k];
        for (row, &cluster) in assignment.iter().enumerate() {
            lists[cluster].push(row);
        }

        Self {
            metric,
            vectors,
            centroids,
            lists,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Effective number of inverted lists.
    pub fn nlist(&self) -> usize {
        self.lists.len()
    }

    /// Top-`k` rows closest to `query` as `(row, distance)`, ascending by
    /// distance (ties broken by row order).
    pub fn search(&self, query: ArrayView1<'_, f32>, nprobe: usize, k: usize) -> Vec<(usize, f32)> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }

        let query: Array1<f32> = match self.metric {
            DistanceMetric::Cosine => {
                let norm = query.dot(&query).sqrt();
                if norm < 1e-9 {
                    warn!("Zero-norm query has no cosine distance; returning no results");
                    return Vec::new();
                }
                &query / norm
            }
            DistanceMetric::L2 => query.to_owned(),
        };

        let mut ranked_lists: Vec<(usize, f32)> = self
            .centroids
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, c)| (i, squared_l2(c, query.view())))
            .collect();
        ranked_lists.sort_by(|a, b| by_distance(a, b));

        let probes = nprobe.clamp(1, self.nlist());
        let mut candidates: Vec<(usize, f32)> = Vec::new();
        for &(list, _) in ranked_lists.iter().take(probes) {
            for &row in &self.lists[list] {
                candidates.push((row, self.distance(self.vectors.row(row), query.view())));
            }
        }

        candidates.sort_by(|a, b| by_distance(a, b));
        candidates.truncate(k);
        candidates
    }

    fn distance(&self, a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
        match self.metric {
            DistanceMetric::L2 => squared_l2(a, b),
            DistanceMetric::Cosine => 1.0 - a.dot(&b),
        }
    }
}

fn by_distance(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

fn squared_l2(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest_centroid(centroids: &Array2<f32>, v: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.axis_iter(Axis(0)).enumerate() {
        let d = squared_l2(c, v);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

/// Lloyd's k-means with deterministic, evenly spaced initial centroids.
/// Returns the centroids and the cluster of every row.
fn kmeans(vectors: &Array2<f32>, k: usize) -> (Array2<f32>, Vec<usize>) {
    let n = vectors.nrows();
    let dim = vectors.ncols();

    let mut centroids = Array2::zeros((k, dim));
    for c in 0..k {
        centroids.row_mut(c).assign(&vectors.row(c * n / k));
    }

    let mut assignment = vec![usize::MAX; n];
    for _ in 0..MAX_KMEANS_ITERATIONS {
        let mut changed = false;
        for (i, row) in vectors.axis_iter(Axis(0)).enumerate() {
            let cluster = nearest_centroid(&centroids, row);
            if assignment[i] != cluster {
                assignment[i] = cluster;
                changed = true;
            }
        }
        if !changed {
            return (centroids, assignment);
        }

        let mut sums = Array2::<f32>::zeros((k, dim));
        let mut counts = vec![0usize; k];
        for (i, row) in vectors.axis_iter(Axis(0)).enumerate() {
            let mut sum = sums.row_mut(assignment[i]);
            sum += &row;
            counts[assignment[i]] += 1;
        }
        // Empty clusters keep their previous centroid.
        for (c, &count) in counts.iter().enumerate() {
            if count > 0 {
                let mean = &sums.row(c) / count as f32;
                centroids.row_mut(c).assign(&mean);
            }
        }
    }

    for (i, row) in vectors.axis_iter(Axis(0)).enumerate() {
        assignment[i] = nearest_centroid(&centroids, row);
    }
    (centroids, assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Two well-separated blobs around (0, 0) and (10, 10).
    fn blobs() -> Array2<f32> {
        array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.1],
            [10.0, 10.1],
            [10.2, 9.9],
            [9.9, 10.0],
        ]
    }

    fn brute_force(vectors: &Array2<f32>, q: &Array1<f32>, k: usize) -> Vec<usize> {
        let mut all: Vec<(usize, f32)> = vectors
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, r)| (i, squared_l2(r, q.view())))
            .collect();
        all.sort_by(|a, b| by_distance(a, b));
        all.into_iter().take(k).map(|(i, _)| i).collect()
    }

    #[test]
    fn test_empty_index() {
        let index = IvfFlatIndex::build(Array2::zeros((0, 4)), DistanceMetric::L2, 8);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 4);
        assert!(index.search(array![0.0, 0.0, 0.0, 0.0].view(), 4, 10).is_empty());
    }

    #[test]
    fn test_nlist_clamped_to_rows() {
        let index = IvfFlatIndex::build(blobs(), DistanceMetric::L2, 128);
        assert_eq!(index.nlist(), 6);
        let index = IvfFlatIndex::build(blobs(), DistanceMetric::L2, 2);
        assert_eq!(index.nlist(), 2);
    }

    #[test]
    fn test_clusters_separate_blobs() {
        let index = IvfFlatIndex::build(blobs(), DistanceMetric::L2, 2);
        let mut sizes: Vec<usize> = index.lists.iter().map(|l| l.len()).collect();
        sizes.sort();
        assert_eq!(sizes, vec![3, 3]);

        // Probing only the nearest list still finds the nearby blob.
        let hits = index.search(array![10.0, 10.0].view(), 1, 3);
        let mut rows: Vec<usize> = hits.iter().map(|(r, _)| *r).collect();
        rows.sort();
        assert_eq!(rows, vec![3, 4, 5]);
    }

    #[test]
    fn test_full_probe_matches_brute_force() {
        let vectors = blobs();
        let index = IvfFlatIndex::build(vectors.clone(), DistanceMetric::L2, 3);
        let q = array![5.0, 4.0];
        let hits: Vec<usize> = index
            .search(q.view(), index.nlist(), 4)
            .into_iter()
            .map(|(r, _)| r)
            .collect();
        assert_eq!(hits, brute_force(&vectors, &q, 4));
    }

    #[test]
    fn test_results_sorted_and_limited() {
        let index = IvfFlatIndex::build(blobs(), DistanceMetric::L2, 2);
        let hits = index.search(array![1.0, 1.0].view(), 2, 4);
        assert_eq!(hits.len(), 4);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(hits[0].0, 2);
        assert!((hits[0].1 - 1.62).abs() < 1e-4);
    }

    #[test]
    fn test_cosine_distance() {
        let vectors = array![[1.0, 0.0], [0.0, 2.0], [3.0, 3.0]];
        let index = IvfFlatIndex::build(vectors, DistanceMetric::Cosine, 1);
        let hits = index.search(array![5.0, 0.0].view(), 1, 3);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1.abs() < 1e-6);
        assert_eq!(hits[1].0, 2);
        assert!((hits[2].1 - 1.0).abs() < 1e-6);
    }
}

//! Lloyd iterations of one KMeans run

use stat_core::functor::ClusterRun;

/// Centres and per-cluster statistics of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct FittedRun {
    pub run_id: i64,
    pub centers: Vec<Vec<f64>>,
    pub cardinalities: Vec<u64>,
    /// Sum of squared distances of each cluster's members to its centre
    pub errors: Vec<f64>,
    pub iterations: u64,
}

impl FittedRun {
    pub fn k(&self) -> usize {
        self.centers.len()
    }

    pub fn total_error(&self) -> f64 {
        self.errors.iter().sum()
    }

    pub fn cluster_run(&self) -> ClusterRun {
        ClusterRun {
            run_id: self.run_id,
            centers: self.centers.clone(),
        }
    }

    /// Cardinality-weighted mean of the centres of two fits of the same run
    ///
    /// A cluster empty in both keeps the centre of `self`.
    pub fn merge(&self, other: &FittedRun) -> FittedRun {
        let mut merged = self.clone();
        for (i, center) in merged.centers.iter_mut().enumerate() {
            let (na, nb) = (self.cardinalities[i], other.cardinalities[i]);
            let total = na + nb;
            if total > 0 {
                for (c, (a, b)) in center.iter_mut().zip(self.centers[i].iter().zip(&other.centers[i])) {
                    *c = (a * na as f64 + b * nb as f64) / total as f64;
                }
            }
            merged.cardinalities[i] = total;
            merged.errors[i] = self.errors[i] + other.errors[i];
        }
        merged.iterations = self.iterations.max(other.iterations);
        merged
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn closest(centers: &[Vec<f64>], point: &[f64]) -> usize {
    let mut best = (f64::INFINITY, 0);
    for (id, center) in centers.iter().enumerate() {
        let d2 = squared_distance(center, point);
        if d2 < best.0 {
            best = (d2, id);
        }
    }
    best.1
}

/// Fit one run starting from `seeds`
///
/// Iterates until at most `tolerance·n` points change cluster or
/// `max_iterations` is reached. A cluster that loses all its members keeps
/// its previous centre.
pub fn lloyd(
    run_id: i64,
    points: &[Vec<f64>],
    seeds: Vec<Vec<f64>>,
    max_iterations: u64,
    tolerance: f64,
) -> FittedRun {
    let k = seeds.len();
    let dimension = seeds.first().map_or(0, Vec::len);
    let mut centers = seeds;
    let mut assignments = vec![usize::MAX; points.len()];
    let mut iterations = 0;

    while iterations < max_iterations && k > 0 {
        iterations += 1;
        let mut changed = 0usize;
        for (point, assigned) in points.iter().zip(assignments.iter_mut()) {
            let id = closest(&centers, point);
            if id != *assigned {
                *assigned = id;
                changed += 1;
            }
        }

        let mut sums = vec![vec![0.0; dimension]; k];
        let mut counts = vec![0u64; k];
        for (point, id) in points.iter().zip(&assignments) {
            counts[*id] += 1;
            for (s, v) in sums[*id].iter_mut().zip(point) {
                *s += v;
            }
        }
        for ((center, sum), count) in centers.iter_mut().zip(sums).zip(&counts) {
            if *count > 0 {
                *center = sum.into_iter().map(|s| s / *count as f64).collect();
            }
        }

        if changed as f64 <= tolerance * points.len() as f64 {
            break;
        }
    }

    let mut cardinalities = vec![0u64; k];
    let mut errors = vec![0.0; k];
    for (point, id) in points.iter().zip(&assignments) {
        if *id < k {
            cardinalities[*id] += 1;
            errors[*id] += squared_distance(&centers[*id], point);
        }
    }
    FittedRun {
        run_id,
        centers,
        cardinalities,
        errors,
        iterations,
    }
}

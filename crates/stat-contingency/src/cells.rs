//! Joint occurrence counts of one variable pair

use stat_core::functor::CellProbabilities;
use stat_core::math::entropy_term;
use stat_core::value::{Datum, ValueKind};
use std::collections::BTreeMap;

/// Value kind a pair of columns is counted in
///
/// Two integer columns stay integers, numeric pairs become reals, and
/// anything involving text falls back to the text encoding.
pub fn specialize(x: ValueKind, y: ValueKind) -> ValueKind {
    match (x, y) {
        (ValueKind::Integer, ValueKind::Integer) => ValueKind::Integer,
        (ValueKind::Text, _) | (_, ValueKind::Text) => ValueKind::Text,
        _ => ValueKind::Real,
    }
}

/// Pearson chi-square statistics of the independence hypothesis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquare {
    pub dof: i64,
    pub chi2: f64,
    pub chi2_yates: f64,
}

/// Sparse two-way table: only observed `(x, y)` cells are stored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointCounts {
    cells: BTreeMap<(Datum, Datum), u64>,
}

impl JointCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: Datum, y: Datum) {
        self.add(x, y, 1);
    }

    pub fn add(&mut self, x: Datum, y: Datum, count: u64) {
        *self.cells.entry((x, y)).or_insert(0) += count;
    }

    pub fn merge(&mut self, other: &JointCounts) {
        for ((x, y), count) in &other.cells {
            self.add(x.clone(), y.clone(), *count);
        }
    }

    pub fn total(&self) -> u64 {
        self.cells.values().sum()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Datum, &Datum, u64)> {
        self.cells.iter().map(|((x, y), c)| (x, y, *c))
    }

    pub fn get(&self, x: &Datum, y: &Datum) -> u64 {
        self.cells
            .get(&(x.clone(), y.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Kind of the stored values, text for an empty table
    pub fn kinds(&self) -> (ValueKind, ValueKind) {
        self.cells
            .keys()
            .next()
            .map_or((ValueKind::Text, ValueKind::Text), |(x, y)| (x.kind(), y.kind()))
    }

    pub fn marginal_x(&self) -> BTreeMap<Datum, u64> {
        let mut marginal = BTreeMap::new();
        for ((x, _), c) in &self.cells {
            *marginal.entry(x.clone()).or_insert(0) += c;
        }
        marginal
    }

    pub fn marginal_y(&self) -> BTreeMap<Datum, u64> {
        let mut marginal = BTreeMap::new();
        for ((_, y), c) in &self.cells {
            *marginal.entry(y.clone()).or_insert(0) += c;
        }
        marginal
    }

    /// Joint, conditional and pointwise mutual information of every cell
    pub fn probabilities(&self) -> Vec<CellProbabilities> {
        let n = self.total() as f64;
        let mx = self.marginal_x();
        let my = self.marginal_y();
        self.cells
            .iter()
            .map(|((x, y), c)| {
                let joint = *c as f64 / n;
                let px = mx.get(x).copied().unwrap_or(0) as f64 / n;
                let py = my.get(y).copied().unwrap_or(0) as f64 / n;
                CellProbabilities {
                    joint,
                    y_given_x: joint / px,
                    x_given_y: joint / py,
                    pmi: (joint / (px * py)).ln(),
                }
            })
            .collect()
    }

    /// `[H(X,Y), H(Y|X), H(X|Y)]` in nats
    pub fn entropies(&self) -> [f64; 3] {
        let mut h = [0.0; 3];
        for p in self.probabilities() {
            h[0] += entropy_term(p.joint, p.joint);
            h[1] += entropy_term(p.joint, p.y_given_x);
            h[2] += entropy_term(p.joint, p.x_given_y);
        }
        h
    }

    /// Chi-square over the full cross product of both marginal supports
    ///
    /// Cells never observed still contribute their expected count, so the
    /// cost is `|X|·|Y|` even when the table is sparse.
    pub fn chi_square(&self) -> ChiSquare {
        let n = self.total() as f64;
        let mx = self.marginal_x();
        let my = self.marginal_y();
        let mut chi2 = 0.0;
        let mut chi2_yates = 0.0;
        for (x, cx) in &mx {
            for (y, cy) in &my {
                let expected = (*cx as f64) * (*cy as f64) / n;
                let delta = expected - self.get(x, y) as f64;
                chi2 += delta * delta / expected;
                let corrected = delta.abs() - 0.5;
                chi2_yates += corrected * corrected / expected;
            }
        }
        let dof = (mx.len().saturating_sub(1) * my.len().saturating_sub(1)) as i64;
        ChiSquare {
            dof,
            chi2,
            chi2_yates,
        }
    }
}

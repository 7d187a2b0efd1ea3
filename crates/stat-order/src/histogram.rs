//! Value histograms and quantile extraction

use stat_core::table::{Column, Table};
use stat_core::value::Datum;
use stat_core::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How a quantile falling exactly between two ranks is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantileDefinition {
    /// Nearest rank: the smallest value whose cumulative count reaches `⌈n·k/q⌉`
    #[default]
    InverseCdf,
    /// Midpoint of the two bracketing values when `n·k/q` is integral;
    /// non-numeric values fall back to the nearest rank
    InverseCdfAveragedSteps,
}

impl QuantileDefinition {
    pub fn code(self) -> i64 {
        match self {
            QuantileDefinition::InverseCdf => 0,
            QuantileDefinition::InverseCdfAveragedSteps => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(QuantileDefinition::InverseCdf),
            1 => Some(QuantileDefinition::InverseCdfAveragedSteps),
            _ => None,
        }
    }
}

impl fmt::Display for QuantileDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantileDefinition::InverseCdf => write!(f, "InverseCDF"),
            QuantileDefinition::InverseCdfAveragedSteps => write!(f, "InverseCDFAveragedSteps"),
        }
    }
}

impl FromStr for QuantileDefinition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "InverseCDF" => Ok(QuantileDefinition::InverseCdf),
            "InverseCDFAveragedSteps" => Ok(QuantileDefinition::InverseCdfAveragedSteps),
            other => Err(Error::InvalidParameter(format!(
                "unknown quantile definition {other}"
            ))),
        }
    }
}

/// Occurrence count of every distinct value, in ascending value order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueHistogram {
    counts: BTreeMap<Datum, u64>,
}

impl ValueHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence; NaN reals are not ordered data and are dropped
    pub fn push(&mut self, value: Datum) -> bool {
        if matches!(value, Datum::Real(v) if v.is_nan()) {
            return false;
        }
        *self.counts.entry(value).or_insert(0) += 1;
        true
    }

    pub fn add(&mut self, value: Datum, count: u64) {
        if count > 0 {
            *self.counts.entry(value).or_insert(0) += count;
        }
    }

    pub fn merge(&mut self, other: &ValueHistogram) {
        for (value, count) in &other.counts {
            self.add(value.clone(), *count);
        }
    }

    /// Number of observations
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Datum, u64)> {
        self.counts.iter().map(|(v, c)| (v, *c))
    }

    pub fn min(&self) -> Option<&Datum> {
        self.counts.keys().next()
    }

    pub fn max(&self) -> Option<&Datum> {
        self.counts.keys().next_back()
    }

    /// Number of observations less than or equal to `value`
    pub fn count_at_most(&self, value: &Datum) -> u64 {
        self.counts.range(..=value.clone()).map(|(_, c)| *c).sum()
    }

    /// Re-bin numeric values into `bins` equal-width bins keyed by midpoint
    ///
    /// Returns `None` when the histogram already fits or holds text.
    pub fn rebin(&self, bins: usize) -> Option<ValueHistogram> {
        if bins == 0 || self.len() <= bins {
            return None;
        }
        let lo = self.min()?.as_f64()?;
        let hi = self.max()?.as_f64()?;
        let width = (hi - lo) / bins as f64;
        if !(width > 0.0) {
            return None;
        }
        let mut binned = ValueHistogram::new();
        for (value, count) in self.iter() {
            let v = value.as_f64()?;
            let index = (((v - lo) / width).floor() as usize).min(bins - 1);
            binned.add(Datum::real(lo + (index as f64 + 0.5) * width), count);
        }
        Some(binned)
    }

    /// Value holding rank `r` (1-based) in the sorted sample
    fn at_rank(&self, rank: u64) -> Option<&Datum> {
        let mut cumulative = 0;
        for (value, count) in &self.counts {
            cumulative += count;
            if cumulative >= rank {
                return Some(value);
            }
        }
        self.max()
    }

    /// The `q+1` cut points `Q[0] = min, ..., Q[q] = max`
    ///
    /// An empty histogram gives NaN cut points.
    pub fn quantiles(&self, intervals: u64, definition: QuantileDefinition) -> Vec<Datum> {
        let q = intervals.max(1);
        let n = self.total();
        let (Some(min), Some(max)) = (self.min(), self.max()) else {
            return vec![Datum::real(f64::NAN); q as usize + 1];
        };
        let mut cuts = Vec::with_capacity(q as usize + 1);
        cuts.push(min.clone());
        // n·k can exceed u64 for large samples; every rank fits again after /q
        let wide_q = u128::from(q);
        for k in 1..q {
            let scaled = u128::from(n) * u128::from(k);
            let rank = ((scaled + wide_q - 1) / wide_q) as u64;
            let nearest = self.at_rank(rank).unwrap_or(max);
            let cut = match definition {
                QuantileDefinition::InverseCdfAveragedSteps if scaled % wide_q == 0 => {
                    let floor = (scaled / wide_q) as u64;
                    let lower = self.at_rank(floor).unwrap_or(min);
                    let upper = self.at_rank(floor + 1).unwrap_or(max);
                    midpoint(lower, upper).unwrap_or_else(|| nearest.clone())
                }
                _ => nearest.clone(),
            };
            cuts.push(cut);
        }
        cuts.push(max.clone());
        cuts
    }

    pub fn from_table(table: &Table) -> Result<Self> {
        let values = table.variants("Value")?;
        let counts = table.integers("Cardinality")?;
        let mut histogram = ValueHistogram::new();
        for (value, count) in values.iter().zip(counts) {
            let count = u64::try_from(*count)
                .map_err(|_| Error::inconsistent(format!("negative count for value {value}")))?;
            histogram.add(value.clone(), count);
        }
        Ok(histogram)
    }

    pub fn to_table(&self) -> Result<Table> {
        Table::new()
            .with_column("Value", Column::Variant(self.counts.keys().cloned().collect()))?
            .with_column(
                "Cardinality",
                Column::Integer(self.counts.values().map(|c| *c as i64).collect()),
            )
    }
}

fn midpoint(a: &Datum, b: &Datum) -> Option<Datum> {
    if a == b {
        return Some(a.clone());
    }
    Some(Datum::real((a.as_f64()? + b.as_f64()?) / 2.0))
}

impl FromIterator<Datum> for ValueHistogram {
    fn from_iter<I: IntoIterator<Item = Datum>>(iter: I) -> Self {
        let mut histogram = ValueHistogram::new();
        for value in iter {
            histogram.push(value);
        }
        histogram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integers(values: impl IntoIterator<Item = i64>) -> ValueHistogram {
        values.into_iter().map(Datum::Integer).collect()
    }

    #[test]
    fn test_quartiles_nearest_rank() {
        let h = integers(1..=9);
        let q = h.quantiles(4, QuantileDefinition::InverseCdf);
        let expected: Vec<Datum> = [1, 3, 5, 7, 9].into_iter().map(Datum::Integer).collect();
        assert_eq!(q, expected);
    }

    #[test]
    fn test_averaged_steps() {
        let h = integers(1..=8);
        // n·k/q is integral for every k: 2, 4, 6
        let q = h.quantiles(4, QuantileDefinition::InverseCdfAveragedSteps);
        assert_eq!(q[0], Datum::Integer(1));
        assert_eq!(q[1], Datum::real(2.5));
        assert_eq!(q[2], Datum::real(4.5));
        assert_eq!(q[3], Datum::real(6.5));
        assert_eq!(q[4], Datum::Integer(8));

        let nearest = h.quantiles(4, QuantileDefinition::InverseCdf);
        assert_eq!(nearest[2], Datum::Integer(4));
    }

    #[test]
    fn test_text_values_never_average() {
        let h: ValueHistogram = ["a", "b", "c", "d"].into_iter().map(Datum::from).collect();
        let q = h.quantiles(2, QuantileDefinition::InverseCdfAveragedSteps);
        assert_eq!(q, vec![Datum::from("a"), Datum::from("b"), Datum::from("d")]);
    }

    #[test]
    fn test_repeated_values() {
        let h = integers([5, 5, 5, 1]);
        let q = h.quantiles(2, QuantileDefinition::InverseCdf);
        assert_eq!(q, vec![Datum::Integer(1), Datum::Integer(5), Datum::Integer(5)]);
        assert_eq!(h.count_at_most(&Datum::Integer(4)), 1);
        assert_eq!(h.count_at_most(&Datum::real(5.0)), 4);
    }

    #[test]
    fn test_ranks_of_huge_counts() {
        let half = u64::MAX / 2;
        let mut h = ValueHistogram::new();
        h.add(Datum::Integer(1), half);
        h.add(Datum::Integer(2), half);
        let q = h.quantiles(3, QuantileDefinition::InverseCdfAveragedSteps);
        let expected: Vec<Datum> = [1, 1, 2, 2].into_iter().map(Datum::Integer).collect();
        assert_eq!(q, expected);
    }

    #[test]
    fn test_empty_histogram() {
        let q = ValueHistogram::new().quantiles(3, QuantileDefinition::InverseCdf);
        assert_eq!(q.len(), 4);
        assert!(q.iter().all(|d| d.as_f64().map_or(false, f64::is_nan)));
    }

    #[test]
    fn test_rebin_midpoints() {
        let h: ValueHistogram = (0..10).map(|v| Datum::real(v as f64)).collect();
        assert!(h.rebin(10).is_none());
        let binned = h.rebin(3).unwrap();
        assert_eq!(binned.len(), 3);
        assert_eq!(binned.total(), 10);
        assert_eq!(binned.min(), Some(&Datum::real(1.5)));
        assert_eq!(binned.max(), Some(&Datum::real(7.5)));
    }

    #[test]
    fn test_nan_is_dropped() {
        let mut h = ValueHistogram::new();
        assert!(!h.push(Datum::real(f64::NAN)));
        assert!(h.push(Datum::real(1.0)));
        assert_eq!(h.total(), 1);
    }

    #[test]
    fn test_definition_codes() {
        assert_eq!(
            "InverseCDFAveragedSteps".parse::<QuantileDefinition>().unwrap(),
            QuantileDefinition::InverseCdfAveragedSteps
        );
        assert!("Median".parse::<QuantileDefinition>().is_err());
        assert_eq!(QuantileDefinition::from_code(2), None);
    }
}

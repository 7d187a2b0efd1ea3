//! Dynamically typed cell values
//!
//! [`Datum`] is the value kind carried by variant columns, histogram keys and
//! contingency cells. Numeric data compares numerically across the integer and
//! real kinds so that a quantile learned on integers can bucket real input.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datum {
    Integer(i64),
    Real(#[serde(with = "crate::nullable::ordered")] OrderedFloat<f64>),
    Text(String),
}

/// Kind tag of a [`Datum`], used to pick a specialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Integer,
    Real,
    Text,
}

impl Datum {
    /// Real value constructor
    pub fn real(value: f64) -> Self {
        Datum::Real(OrderedFloat(value))
    }

    /// Numeric view of the value, `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Integer(v) => Some(*v as f64),
            Datum::Real(v) => Some(v.0),
            Datum::Text(_) => None,
        }
    }

    /// Integer view of the value; reals are accepted only when integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Integer(v) => Some(*v),
            Datum::Real(v) if v.0.fract() == 0.0 && v.0.is_finite() => Some(v.0 as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Datum::Text(_))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Datum::Integer(_) => ValueKind::Integer,
            Datum::Real(_) => ValueKind::Real,
            Datum::Text(_) => ValueKind::Text,
        }
    }

    /// Re-encode the value in the given kind
    ///
    /// Integer targets accept integral reals; anything else that cannot be
    /// represented falls back to the text encoding, which is total.
    pub fn coerce(&self, kind: ValueKind) -> Datum {
        match kind {
            ValueKind::Integer => match self.as_i64() {
                Some(v) => Datum::Integer(v),
                None => Datum::Text(self.to_string()),
            },
            ValueKind::Real => match self.as_f64() {
                Some(v) => Datum::real(v),
                None => Datum::Text(self.to_string()),
            },
            ValueKind::Text => match self {
                Datum::Text(s) => Datum::Text(s.clone()),
                other => Datum::Text(other.to_string()),
            },
        }
    }
}

impl Datum {
    /// Compare by value only: an integer and a real holding the same number
    /// are equal here, while the total order keeps them apart
    pub fn value_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Datum::Integer(a), Datum::Real(b)) => OrderedFloat(*a as f64).cmp(b),
            (Datum::Real(a), Datum::Integer(b)) => a.cmp(&OrderedFloat(*b as f64)),
            _ => self.cmp(other),
        }
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Datum::Text(a), Datum::Text(b)) => a.cmp(b),
            (Datum::Text(_), _) => Ordering::Greater,
            (_, Datum::Text(_)) => Ordering::Less,
            (Datum::Integer(a), Datum::Integer(b)) => a.cmp(b),
            (Datum::Real(a), Datum::Real(b)) => a.cmp(b),
            // Mixed numeric kinds compare by value, integers first on ties
            (Datum::Integer(a), Datum::Real(b)) => OrderedFloat(*a as f64)
                .cmp(b)
                .then(Ordering::Less),
            (Datum::Real(a), Datum::Integer(b)) => a
                .cmp(&OrderedFloat(*b as f64))
                .then(Ordering::Greater),
        }
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Integer(v) => write!(f, "{v}"),
            Datum::Real(v) => write!(f, "{}", v.0),
            Datum::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Integer(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::real(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::Text(value.to_string())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::Text(value)
    }
}

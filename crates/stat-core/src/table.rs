//! Columnar tables
//!
//! A [`Table`] is an ordered set of named, homogeneously typed columns with a
//! uniform row count and an optional per-row ghost mask. Engines read their
//! input through it and write every model table as one.

use crate::error::{Error, Result};
use crate::value::{Datum, ValueKind};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

bitflags! {
    /// Ghost bits attached to a row
    ///
    /// A row is skipped during Learn when its ghost byte overlaps the engine's
    /// skip mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct GhostFlags: u8 {
        const DUPLICATE = 0x01;
        const HIGH_CONNECTIVITY = 0x02;
        const LOW_CONNECTIVITY = 0x04;
        const REFINED = 0x08;
        const EXTERIOR = 0x10;
        const HIDDEN = 0x20;
    }
}

/// A homogeneously typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Real(#[serde(with = "crate::nullable::reals")] Vec<f64>),
    Integer(Vec<i64>),
    Text(Vec<String>),
    Variant(Vec<Datum>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Real(v) => v.len(),
            Column::Integer(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Variant(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable kind name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Column::Real(_) => "real",
            Column::Integer(_) => "integer",
            Column::Text(_) => "text",
            Column::Variant(_) => "variant",
        }
    }

    /// Whether every value of the column is numeric
    pub fn is_numeric(&self) -> bool {
        match self {
            Column::Real(_) | Column::Integer(_) => true,
            Column::Text(_) => false,
            Column::Variant(v) => v.iter().all(Datum::is_numeric),
        }
    }

    /// Kind used when the column's values become dictionary keys
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Column::Real(_) => ValueKind::Real,
            Column::Integer(_) => ValueKind::Integer,
            Column::Text(_) => ValueKind::Text,
            Column::Variant(v) => {
                if v.iter().all(|d| matches!(d, Datum::Integer(_))) {
                    ValueKind::Integer
                } else if v.iter().all(Datum::is_numeric) {
                    ValueKind::Real
                } else {
                    ValueKind::Text
                }
            }
        }
    }

    /// Value at `row` as a [`Datum`]
    pub fn get(&self, row: usize) -> Option<Datum> {
        match self {
            Column::Real(v) => v.get(row).map(|x| Datum::real(*x)),
            Column::Integer(v) => v.get(row).map(|x| Datum::Integer(*x)),
            Column::Text(v) => v.get(row).map(|x| Datum::Text(x.clone())),
            Column::Variant(v) => v.get(row).cloned(),
        }
    }

    /// Numeric value at `row`, `None` for text or out of range
    pub fn get_f64(&self, row: usize) -> Option<f64> {
        match self {
            Column::Real(v) => v.get(row).copied(),
            Column::Integer(v) => v.get(row).map(|x| *x as f64),
            Column::Text(_) => None,
            Column::Variant(v) => v.get(row).and_then(Datum::as_f64),
        }
    }

    /// Text value at `row`, converting non-text values
    pub fn get_text(&self, row: usize) -> Option<Cow<'_, str>> {
        match self {
            Column::Text(v) => v.get(row).map(|s| Cow::Borrowed(s.as_str())),
            other => other.get(row).map(|d| Cow::Owned(d.to_string())),
        }
    }

    pub fn as_real(&self) -> Option<&[f64]> {
        match self {
            Column::Real(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<&[i64]> {
        match self {
            Column::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&[Datum]> {
        match self {
            Column::Variant(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view of the whole column, borrowing when already real
    pub fn to_f64(&self) -> Option<Cow<'_, [f64]>> {
        match self {
            Column::Real(v) => Some(Cow::Borrowed(v.as_slice())),
            Column::Integer(v) => Some(Cow::Owned(v.iter().map(|x| *x as f64).collect())),
            Column::Text(_) => None,
            Column::Variant(v) => v
                .iter()
                .map(Datum::as_f64)
                .collect::<Option<Vec<_>>>()
                .map(Cow::Owned),
        }
    }

    /// New column holding the given rows, in order
    pub fn select(&self, rows: &[usize]) -> Column {
        fn pick<T: Clone>(v: &[T], rows: &[usize]) -> Vec<T> {
            rows.iter().filter_map(|r| v.get(*r).cloned()).collect()
        }
        match self {
            Column::Real(v) => Column::Real(pick(v, rows)),
            Column::Integer(v) => Column::Integer(pick(v, rows)),
            Column::Text(v) => Column::Text(pick(v, rows)),
            Column::Variant(v) => Column::Variant(pick(v, rows)),
        }
    }
}

/// A table of named columns with uniform length
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    ghosts: Option<Vec<u8>>,
}

/// Serialized form of a [`Table`], checked before it becomes one
#[derive(Deserialize)]
struct RawTable {
    names: Vec<String>,
    columns: Vec<Column>,
    ghosts: Option<Vec<u8>>,
}

impl TryFrom<RawTable> for Table {
    type Error = Error;

    fn try_from(raw: RawTable) -> Result<Self> {
        if raw.names.len() != raw.columns.len() {
            return Err(Error::inconsistent(format!(
                "table has {} names for {} columns",
                raw.names.len(),
                raw.columns.len()
            )));
        }
        for (i, name) in raw.names.iter().enumerate() {
            if raw.names[..i].contains(name) {
                return Err(Error::inconsistent(format!("duplicate column {name}")));
            }
        }
        let rows = raw.columns.first().map(Column::len);
        for (name, column) in raw.names.iter().zip(&raw.columns) {
            if Some(column.len()) != rows {
                return Err(Error::inconsistent(format!(
                    "column {name} has {} rows, expected {}",
                    column.len(),
                    rows.unwrap_or(0)
                )));
            }
        }
        if let (Some(rows), Some(ghosts)) = (rows, &raw.ghosts) {
            if ghosts.len() != rows {
                return Err(Error::inconsistent(format!(
                    "ghost mask has {} rows, expected {rows}",
                    ghosts.len()
                )));
            }
        }
        Ok(Self {
            names: raw.names,
            columns: raw.columns,
            ghosts: raw.ghosts,
        })
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Table::add_column`]
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.add_column(name, column)?;
        Ok(self)
    }

    /// Append a column, replacing any existing column of the same name
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.columns.is_empty() || self.ghosts.is_some() {
            let rows = self.num_rows();
            let replacing_only =
                self.columns.len() == 1 && self.names.first().map_or(false, |n| *n == name);
            if column.len() != rows && !replacing_only {
                return Err(Error::size_mismatch(rows, column.len(), &format!("column {name}")));
            }
        }
        match self.names.iter().position(|n| *n == name) {
            Some(index) => self.columns[index] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    /// Attach a ghost mask, one byte per row
    pub fn set_ghosts(&mut self, ghosts: Vec<u8>) -> Result<()> {
        if !self.columns.is_empty() && ghosts.len() != self.num_rows() {
            return Err(Error::size_mismatch(self.num_rows(), ghosts.len(), "ghost mask"));
        }
        self.ghosts = Some(ghosts);
        Ok(())
    }

    pub fn ghosts(&self) -> Option<&[u8]> {
        self.ghosts.as_deref()
    }

    /// Whether `row` is excluded under `skip_mask`
    pub fn is_ghost(&self, row: usize, skip_mask: u8) -> bool {
        skip_mask != 0
            && self
                .ghosts
                .as_ref()
                .and_then(|g| g.get(row))
                .map_or(false, |bits| bits & skip_mask != 0)
    }

    /// Rows that survive `skip_mask`, in order
    pub fn live_rows(&self, skip_mask: u8) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_rows()).filter(move |r| !self.is_ghost(*r, skip_mask))
    }

    pub fn num_rows(&self) -> usize {
        self.columns
            .first()
            .map(Column::len)
            .or_else(|| self.ghosts.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    /// Column lookup that reports a missing column as an error
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| Error::missing_column(name))
    }

    /// Numeric view of a column
    ///
    /// Fails with [`Error::MissingColumn`] or [`Error::TypeMismatch`].
    pub fn numeric(&self, name: &str) -> Result<Cow<'_, [f64]>> {
        let column = self.require(name)?;
        column
            .to_f64()
            .ok_or_else(|| Error::type_mismatch(name, "numeric", column.kind_name()))
    }

    /// Typed access to a real column of a model table
    pub fn reals(&self, name: &str) -> Result<&[f64]> {
        let column = self.require(name)?;
        column
            .as_real()
            .ok_or_else(|| Error::type_mismatch(name, "real", column.kind_name()))
    }

    pub fn integers(&self, name: &str) -> Result<&[i64]> {
        let column = self.require(name)?;
        column
            .as_integer()
            .ok_or_else(|| Error::type_mismatch(name, "integer", column.kind_name()))
    }

    pub fn texts(&self, name: &str) -> Result<&[String]> {
        let column = self.require(name)?;
        column
            .as_text()
            .ok_or_else(|| Error::type_mismatch(name, "text", column.kind_name()))
    }

    pub fn variants(&self, name: &str) -> Result<&[Datum]> {
        let column = self.require(name)?;
        column
            .as_variant()
            .ok_or_else(|| Error::type_mismatch(name, "variant", column.kind_name()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Rows `rows` as a new table, ghost mask included
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            ghosts: self
                .ghosts
                .as_ref()
                .map(|g| rows.iter().filter_map(|r| g.get(*r).copied()).collect()),
        }
    }

    /// Contiguous row range as a new table
    pub fn slice_rows(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.num_rows());
        let rows: Vec<usize> = (start.min(end)..end).collect();
        self.select_rows(&rows)
    }
}

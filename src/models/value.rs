//! The attribute value-type ontology and example data carried into loads.
//!
//! Value types form a small tree rooted at `AttributeValue`. Type mapping
//! climbs `parent()` links when a leaf has no directly supported native
//! type, so the tree shape here is load-bearing for fallback resolution.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Internal taxonomy of attribute data kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Root of the ontology; any kind of value.
    AttributeValue,
    Nominal,
    /// Two-valued nominal.
    Binominal,
    /// Unbounded free text.
    Text,
    Numerical,
    Integer,
    Real,
    DateTime,
    Date,
    Time,
}

impl ValueType {
    /// Parent link in the ontology tree; `None` only at the root.
    pub fn parent(self) -> Option<ValueType> {
        match self {
            ValueType::AttributeValue => None,
            ValueType::Nominal | ValueType::Numerical | ValueType::DateTime => {
                Some(ValueType::AttributeValue)
            }
            ValueType::Binominal | ValueType::Text => Some(ValueType::Nominal),
            ValueType::Integer | ValueType::Real => Some(ValueType::Numerical),
            ValueType::Date | ValueType::Time => Some(ValueType::DateTime),
        }
    }

    /// Whether values of this type are stored as text.
    pub fn is_nominal(self) -> bool {
        matches!(
            self,
            ValueType::Nominal | ValueType::Binominal | ValueType::Text
        )
    }

    pub fn is_numerical(self) -> bool {
        matches!(
            self,
            ValueType::Numerical | ValueType::Integer | ValueType::Real
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ValueType::DateTime | ValueType::Date | ValueType::Time
        )
    }
}

/// A single cell of example data.
///
/// `Missing` stands for an absent value of any type; numeric reads of a
/// missing cell yield NaN, and writes bind SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Missing,
    Int(i64),
    Real(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    /// Numeric view of the cell. Missing maps to NaN.
    pub fn as_f64(&self) -> f64 {
        match self {
            CellValue::Missing => f64::NAN,
            CellValue::Int(i) => *i as f64,
            CellValue::Real(r) => *r,
            CellValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            CellValue::Text(_)
            | CellValue::Date(_)
            | CellValue::Time(_)
            | CellValue::DateTime(_) => f64::NAN,
        }
    }

    /// Textual view of the cell, for nominal columns. Missing has none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Missing => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Int(i) => Some(i.to_string()),
            CellValue::Real(r) => Some(r.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Date(d) => Some(d.to_string()),
            CellValue::Time(t) => Some(t.to_string()),
            CellValue::DateTime(dt) => Some(dt.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(r: f64) -> Self {
        if r.is_nan() {
            CellValue::Missing
        } else {
            CellValue::Real(r)
        }
    }
}

/// An attribute: column name plus its ontology type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value_type: ValueType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// One example row: cells positionally aligned with an attribute list.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub cells: Vec<CellValue>,
}

impl DataRow {
    pub fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }

    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.cells.get(index)
    }
}

impl From<Vec<CellValue>> for DataRow {
    fn from(cells: Vec<CellValue>) -> Self {
        Self::new(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_links_reach_root() {
        // Every type reaches AttributeValue in at most the tree depth.
        for vt in [
            ValueType::AttributeValue,
            ValueType::Nominal,
            ValueType::Binominal,
            ValueType::Text,
            ValueType::Numerical,
            ValueType::Integer,
            ValueType::Real,
            ValueType::DateTime,
            ValueType::Date,
            ValueType::Time,
        ] {
            let mut current = vt;
            let mut steps = 0;
            while let Some(parent) = current.parent() {
                current = parent;
                steps += 1;
                assert!(steps <= 3, "ontology deeper than expected at {:?}", vt);
            }
            assert_eq!(current, ValueType::AttributeValue);
        }
    }

    #[test]
    fn test_missing_reads_as_nan() {
        assert!(CellValue::Missing.as_f64().is_nan());
        assert_eq!(CellValue::Int(3).as_f64(), 3.0);
    }

    #[test]
    fn test_nan_converts_to_missing() {
        assert!(CellValue::from(f64::NAN).is_missing());
        assert_eq!(CellValue::from(2.5), CellValue::Real(2.5));
    }

    #[test]
    fn test_kind_predicates() {
        assert!(ValueType::Text.is_nominal());
        assert!(ValueType::Integer.is_numerical());
        assert!(ValueType::Time.is_temporal());
        assert!(!ValueType::Date.is_numerical());
    }
}

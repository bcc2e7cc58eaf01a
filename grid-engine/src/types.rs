use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use chrono::NaiveDateTime;

/// Stable identity of a row.
///
/// `Int`/`Str` ids are supplied by the caller and never regenerated. `Group` ids are synthesized
/// by the tree builder from the grouping path leading to the group, so they can never collide
/// with caller ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RowId {
    Int(i64),
    Str(String),
    Group(Vec<String>),
}

impl RowId {
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::Group(path) => {
                f.write_str("group:")?;
                for (i, segment) in path.iter().enumerate() {
                    if i > 0 {
                        f.write_str("/")?;
                    }
                    f.write_str(segment)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for RowId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for RowId {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for RowId {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A raw cell value as stored in a row record.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Blank means "nothing to show": null or an all-whitespace string.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Date(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Date(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One row of caller data.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowRecord {
    pub id: RowId,
    pub values: BTreeMap<String, CellValue>,
}

impl RowRecord {
    pub fn new(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> &CellValue {
        static NULL: CellValue = CellValue::Null;
        self.values.get(field).unwrap_or(&NULL)
    }
}

/// An incremental row collection patch.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RowUpdate {
    /// Inserts the record, or merges its values into the existing record with the same id.
    Upsert(RowRecord),
    Delete(RowId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkOperator {
    #[default]
    And,
    Or,
}

/// Row/header density. Scales the configured base heights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Density {
    Compact,
    #[default]
    Standard,
    Comfortable,
}

impl Density {
    /// Applies the density factor (0.7 / 1.0 / 1.3) to a base size, rounding down.
    pub fn scale(self, base: u32) -> u32 {
        let base = base as u64;
        let scaled = match self {
            Self::Compact => base * 7 / 10,
            Self::Standard => base,
            Self::Comfortable => base * 13 / 10,
        };
        scaled.min(u32::MAX as u64) as u32
    }
}

/// An inclusive index range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexSpan {
    pub first: usize,
    pub last: usize, // inclusive
}

impl IndexSpan {
    pub fn len(&self) -> usize {
        self.last + 1 - self.first
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.first && index <= self.last
    }

    pub fn range(&self) -> core::ops::Range<usize> {
        self.first..self.last + 1
    }
}

/// The buffered set of rows/columns that must be materialized for the current viewport.
///
/// Row indexes point into the visible ordering, column indexes into the visible columns. An axis
/// is `None` when its collection is empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderWindow {
    pub rows: Option<IndexSpan>,
    pub columns: Option<IndexSpan>,
    /// Left edge of the first materialized column.
    pub offset_left: u64,
    /// Top edge of the first materialized row, relative to the current page.
    pub offset_top: u64,
}

impl RenderWindow {
    pub fn first_row_index(&self) -> Option<usize> {
        self.rows.map(|s| s.first)
    }

    pub fn last_row_index(&self) -> Option<usize> {
        self.rows.map(|s| s.last)
    }

    pub fn first_column_index(&self) -> Option<usize> {
        self.columns.map(|s| s.first)
    }

    pub fn last_column_index(&self) -> Option<usize> {
        self.columns.map(|s| s.last)
    }
}

/// Row accounting for the current state. `visible + hidden_by_collapse + filtered_out == total`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowCounts {
    pub visible: usize,
    pub hidden_by_collapse: usize,
    pub filtered_out: usize,
    pub total: usize,
}

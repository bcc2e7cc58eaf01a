use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::operators::{self, FilterOperator, fold_case, parse_date_time};
use crate::{CellValue, GridError, Result, RowRecord};

/// Total order over two non-blank cell values of the same column.
///
/// Blank values never reach a comparator: the sorting engine orders them after every non-blank
/// value on its own, so both directions keep blanks at the end.
pub type SortComparator = Arc<dyn Fn(&CellValue, &CellValue) -> Ordering + Send + Sync>;

/// Derives the cell value of a column from the whole record.
pub type ValueGetter = Arc<dyn Fn(&RowRecord) -> CellValue + Send + Sync>;

/// Produces the externally visible string of a cell value.
pub type ValueFormatter = Arc<dyn Fn(&CellValue) -> String + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Date,
    DateTime,
    Boolean,
}

impl ColumnType {
    /// Normalizes a raw value into the column's domain.
    ///
    /// Values that cannot be interpreted (e.g. `"abc"` in a number column) become `Null`.
    pub fn coerce(self, value: &CellValue) -> CellValue {
        match self {
            Self::String => value.clone(),
            Self::Number => match value {
                CellValue::Number(n) if !n.is_nan() => CellValue::Number(*n),
                CellValue::Text(s) => match s.trim().parse::<f64>() {
                    Ok(n) if !n.is_nan() => CellValue::Number(n),
                    _ => CellValue::Null,
                },
                _ => CellValue::Null,
            },
            Self::Date | Self::DateTime => match value {
                CellValue::Date(d) => CellValue::Date(*d),
                CellValue::Text(s) => parse_date_time(s).map_or(CellValue::Null, CellValue::Date),
                _ => CellValue::Null,
            },
            Self::Boolean => match value {
                CellValue::Bool(b) => CellValue::Bool(*b),
                CellValue::Text(s) => match s.trim() {
                    "true" => CellValue::Bool(true),
                    "false" => CellValue::Bool(false),
                    _ => CellValue::Null,
                },
                _ => CellValue::Null,
            },
        }
    }

    pub fn default_comparator(self) -> SortComparator {
        match self {
            Self::String => Arc::new(compare_string_or_number),
            Self::Number => Arc::new(|a, b| match (a, b) {
                (CellValue::Number(a), CellValue::Number(b)) => {
                    a.partial_cmp(b).unwrap_or(Ordering::Equal)
                }
                _ => Ordering::Equal,
            }),
            Self::Date | Self::DateTime => Arc::new(|a, b| match (a, b) {
                (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
                _ => Ordering::Equal,
            }),
            Self::Boolean => Arc::new(|a, b| match (a, b) {
                (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
                _ => Ordering::Equal,
            }),
        }
    }

    pub fn default_operators(self) -> Vec<FilterOperator> {
        match self {
            Self::String => operators::string_operators(),
            Self::Number => operators::number_operators(),
            Self::Date => operators::date_operators(false),
            Self::DateTime => operators::date_operators(true),
            Self::Boolean => operators::boolean_operators(),
        }
    }

    fn format(self, value: &CellValue) -> String {
        match (self, value) {
            (Self::Date, CellValue::Date(d)) => d.date().to_string(),
            _ => value.to_string(),
        }
    }
}

fn compare_string_or_number(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Number(a), CellValue::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        _ => {
            let (a, b) = (a.to_string(), b.to_string());
            fold_case(&a).cmp(&fold_case(&b)).then_with(|| a.cmp(&b))
        }
    }
}

/// Schema of one column.
#[derive(Clone)]
pub struct ColumnDef {
    pub field: String,
    pub header_name: Option<String>,
    pub column_type: ColumnType,
    pub width: u32,
    /// Hidden columns stay in the schema but never enter the render window.
    pub hidden: bool,
    /// `None` makes the column unsortable.
    pub sort_comparator: Option<SortComparator>,
    pub filter_operators: Vec<FilterOperator>,
    pub value_getter: Option<ValueGetter>,
    pub value_formatter: Option<ValueFormatter>,
}

pub const DEFAULT_COLUMN_WIDTH: u32 = 100;

impl ColumnDef {
    pub fn new(field: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            field: field.into(),
            header_name: None,
            column_type,
            width: DEFAULT_COLUMN_WIDTH,
            hidden: false,
            sort_comparator: Some(column_type.default_comparator()),
            filter_operators: column_type.default_operators(),
            value_getter: None,
            value_formatter: None,
        }
    }

    pub fn string(field: impl Into<String>) -> Self {
        Self::new(field, ColumnType::String)
    }

    pub fn number(field: impl Into<String>) -> Self {
        Self::new(field, ColumnType::Number)
    }

    pub fn date(field: impl Into<String>) -> Self {
        Self::new(field, ColumnType::Date)
    }

    pub fn date_time(field: impl Into<String>) -> Self {
        Self::new(field, ColumnType::DateTime)
    }

    pub fn boolean(field: impl Into<String>) -> Self {
        Self::new(field, ColumnType::Boolean)
    }

    pub fn with_header_name(mut self, header_name: impl Into<String>) -> Self {
        self.header_name = Some(header_name.into());
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_sort_comparator(
        mut self,
        comparator: Option<impl Fn(&CellValue, &CellValue) -> Ordering + Send + Sync + 'static>,
    ) -> Self {
        self.sort_comparator = comparator.map(|f| Arc::new(f) as _);
        self
    }

    pub fn with_sortable(mut self, sortable: bool) -> Self {
        self.sort_comparator = sortable.then(|| self.column_type.default_comparator());
        self
    }

    pub fn with_value_getter(
        mut self,
        getter: impl Fn(&RowRecord) -> CellValue + Send + Sync + 'static,
    ) -> Self {
        self.value_getter = Some(Arc::new(getter));
        self
    }

    pub fn with_value_formatter(
        mut self,
        formatter: impl Fn(&CellValue) -> String + Send + Sync + 'static,
    ) -> Self {
        self.value_formatter = Some(Arc::new(formatter));
        self
    }

    pub fn with_filter_operators(mut self, operators: Vec<FilterOperator>) -> Self {
        self.filter_operators = operators;
        self
    }

    pub fn with_filter_operator(mut self, operator: FilterOperator) -> Self {
        self.filter_operators.retain(|op| op.value != operator.value);
        self.filter_operators.push(operator);
        self
    }

    pub fn is_sortable(&self) -> bool {
        self.sort_comparator.is_some()
    }

    pub fn operator(&self, name: &str) -> Option<&FilterOperator> {
        self.filter_operators.iter().find(|op| op.value == name)
    }

    /// The raw value of this column for `row` (value getter first, then the record field).
    pub fn cell_value(&self, row: &RowRecord) -> CellValue {
        match &self.value_getter {
            Some(getter) => getter(row),
            None => row.get(&self.field).clone(),
        }
    }

    /// The value in the column's domain; unparseable values become `Null`.
    pub fn typed_value(&self, row: &RowRecord) -> CellValue {
        self.column_type.coerce(&self.cell_value(row))
    }

    /// The externally visible string of `value`.
    pub fn format(&self, value: &CellValue) -> String {
        match &self.value_formatter {
            Some(formatter) => formatter(value),
            None => self.column_type.format(value),
        }
    }
}

impl core::fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ColumnDef")
            .field("field", &self.field)
            .field("header_name", &self.header_name)
            .field("column_type", &self.column_type)
            .field("width", &self.width)
            .field("hidden", &self.hidden)
            .field("sortable", &self.is_sortable())
            .field("filter_operators", &self.filter_operators)
            .finish_non_exhaustive()
    }
}

/// An ordered, field-unique column collection.
#[derive(Clone, Debug, Default)]
pub struct ColumnSet {
    columns: Vec<ColumnDef>,
    index: BTreeMap<String, usize>,
}

impl ColumnSet {
    pub fn new(columns: impl IntoIterator<Item = ColumnDef>) -> Result<Self> {
        let mut set = Self::default();
        for column in columns {
            set.push(column)?;
        }
        Ok(set)
    }

    pub fn push(&mut self, column: ColumnDef) -> Result<()> {
        if self.index.contains_key(&column.field) {
            return Err(GridError::DuplicateField {
                field: column.field,
            });
        }
        self.index.insert(column.field.clone(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    pub fn insert(&mut self, position: usize, column: ColumnDef) -> Result<()> {
        if self.index.contains_key(&column.field) {
            return Err(GridError::DuplicateField {
                field: column.field,
            });
        }
        let position = position.min(self.columns.len());
        self.columns.insert(position, column);
        self.reindex();
        Ok(())
    }

    /// Replaces the column with the same field, or appends it.
    pub fn upsert(&mut self, column: ColumnDef) {
        match self.index.get(&column.field) {
            Some(&i) => self.columns[i] = column,
            None => {
                self.index.insert(column.field.clone(), self.columns.len());
                self.columns.push(column);
            }
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<ColumnDef> {
        let i = self.index.remove(field)?;
        let removed = self.columns.remove(i);
        self.reindex();
        Some(removed)
    }

    pub fn get(&self, field: &str) -> Option<&ColumnDef> {
        self.index.get(field).map(|&i| &self.columns[i])
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut ColumnDef> {
        self.index.get(field).map(|&i| &mut self.columns[i])
    }

    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter()
    }

    pub fn visible(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| !c.hidden)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.field.as_str())
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, column) in self.columns.iter().enumerate() {
            self.index.insert(column.field.clone(), i);
        }
    }
}

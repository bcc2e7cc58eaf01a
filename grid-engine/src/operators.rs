//! Built-in filter operators.
//!
//! Every operator follows the same two failure directions:
//! - a filter value that is blank or cannot be interpreted makes the item inert (it matches
//!   everything), so half-typed filter input never hides the whole grid;
//! - a row whose own value cannot be interpreted does not match.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::{CellValue, ColumnDef, ColumnType, FilterValue};

/// A row-level test produced by an operator for one filter value.
pub type ApplyFilterFn = Arc<dyn Fn(&CellValue) -> bool + Send + Sync>;

/// Turns a filter value into a row-level test, or declines (`None`) to constrain anything.
pub type GetApplyFilterFn =
    Arc<dyn Fn(Option<&FilterValue>, &ColumnDef) -> Option<ApplyFilterFn> + Send + Sync>;

/// A named filter operator of a column.
#[derive(Clone)]
pub struct FilterOperator {
    pub value: String,
    /// When `true`, a blank filter value makes the item inert without consulting the operator.
    pub requires_value: bool,
    pub get_apply_filter_fn: GetApplyFilterFn,
}

impl FilterOperator {
    pub fn new(
        value: impl Into<String>,
        requires_value: bool,
        get_apply_filter_fn: impl Fn(Option<&FilterValue>, &ColumnDef) -> Option<ApplyFilterFn>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            value: value.into(),
            requires_value,
            get_apply_filter_fn: Arc::new(get_apply_filter_fn),
        }
    }

    pub fn predicate(
        &self,
        value: Option<&FilterValue>,
        column: &ColumnDef,
    ) -> Option<ApplyFilterFn> {
        if self.requires_value && value.is_none_or(FilterValue::is_blank) {
            return None;
        }
        (self.get_apply_filter_fn)(value, column)
    }
}

impl core::fmt::Debug for FilterOperator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FilterOperator")
            .field("value", &self.value)
            .field("requires_value", &self.requires_value)
            .finish_non_exhaustive()
    }
}

/// Lowercases `s` (case-insensitive matching).
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

/// Folds `s` for base-sensitivity comparison: decomposes, drops combining marks and lowercases,
/// so `"Émile"` and `"emile"` compare equal.
pub fn fold_base(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Parses the date/date-time forms accepted by date filters and date cells.
pub fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    const DATE_TIME_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn text_of(value: Option<&FilterValue>) -> Option<&str> {
    match value? {
        FilterValue::Text(s) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

fn list_of(value: Option<&FilterValue>) -> Vec<&str> {
    match value {
        Some(FilterValue::List(items)) => items
            .iter()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(FilterValue::Text(s)) if !s.trim().is_empty() => alloc::vec![s.as_str()],
        _ => Vec::new(),
    }
}

fn emptiness_operators() -> [FilterOperator; 2] {
    [
        FilterOperator::new("isEmpty", false, |_, _| {
            Some(Arc::new(|v: &CellValue| v.is_blank()) as ApplyFilterFn)
        }),
        FilterOperator::new("isNotEmpty", false, |_, _| {
            Some(Arc::new(|v: &CellValue| !v.is_blank()) as ApplyFilterFn)
        }),
    ]
}

fn string_operator(name: &str, test: fn(&str, &str) -> bool) -> FilterOperator {
    FilterOperator::new(name, true, move |value, column| {
        let needle = fold_case(text_of(value)?);
        let column = column.clone();
        Some(Arc::new(move |v: &CellValue| {
            test(&fold_case(&column.format(v)), &needle)
        }) as ApplyFilterFn)
    })
}

pub fn string_operators() -> Vec<FilterOperator> {
    let mut ops = alloc::vec![
        string_operator("contains", |hay, needle| hay.contains(needle)),
        string_operator("startsWith", |hay, needle| hay.starts_with(needle)),
        string_operator("endsWith", |hay, needle| hay.ends_with(needle)),
        FilterOperator::new("equals", true, |value, column| {
            let needle = fold_base(text_of(value)?);
            let column = column.clone();
            Some(Arc::new(move |v: &CellValue| fold_base(&column.format(v)) == needle)
                as ApplyFilterFn)
        }),
        FilterOperator::new("isAnyOf", true, |value, column| {
            let needles: Vec<String> = list_of(value).into_iter().map(fold_base).collect();
            if needles.is_empty() {
                return None;
            }
            let column = column.clone();
            Some(Arc::new(move |v: &CellValue| {
                let hay = fold_base(&column.format(v));
                needles.iter().any(|n| *n == hay)
            }) as ApplyFilterFn)
        }),
    ];
    ops.extend(emptiness_operators());
    ops
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

fn row_number(v: &CellValue) -> Option<f64> {
    match ColumnType::Number.coerce(v) {
        CellValue::Number(n) => Some(n),
        _ => None,
    }
}

fn number_operator(name: &str, test: fn(f64, f64) -> bool) -> FilterOperator {
    FilterOperator::new(name, true, move |value, _| {
        let target = parse_number(text_of(value)?)?;
        Some(Arc::new(move |v: &CellValue| row_number(v).is_some_and(|n| test(n, target)))
            as ApplyFilterFn)
    })
}

pub fn number_operators() -> Vec<FilterOperator> {
    let mut ops = alloc::vec![
        number_operator("=", |a, b| a == b),
        number_operator("!=", |a, b| a != b),
        number_operator(">", |a, b| a > b),
        number_operator(">=", |a, b| a >= b),
        number_operator("<", |a, b| a < b),
        number_operator("<=", |a, b| a <= b),
        FilterOperator::new("isAnyOf", true, |value, _| {
            let targets: Vec<f64> = list_of(value).into_iter().filter_map(parse_number).collect();
            if targets.is_empty() {
                return None;
            }
            Some(Arc::new(move |v: &CellValue| {
                row_number(v).is_some_and(|n| targets.contains(&n))
            }) as ApplyFilterFn)
        }),
    ];
    ops.extend(emptiness_operators());
    ops
}

/// Comparison key: calendar day for date columns, day + hour + minute for date-time columns.
type DateKey = (NaiveDate, u32, u32);

fn date_key(dt: &NaiveDateTime, keep_time: bool) -> DateKey {
    if keep_time {
        (dt.date(), dt.hour(), dt.minute())
    } else {
        (dt.date(), 0, 0)
    }
}

fn row_date(v: &CellValue, keep_time: bool) -> Option<DateKey> {
    match ColumnType::DateTime.coerce(v) {
        CellValue::Date(dt) => Some(date_key(&dt, keep_time)),
        _ => None,
    }
}

fn date_operator(
    name: &str,
    keep_time: bool,
    test: fn(&DateKey, &DateKey) -> bool,
) -> FilterOperator {
    FilterOperator::new(name, true, move |value, _| {
        let target = date_key(&parse_date_time(text_of(value)?)?, keep_time);
        Some(Arc::new(move |v: &CellValue| {
            row_date(v, keep_time).is_some_and(|d| test(&d, &target))
        }) as ApplyFilterFn)
    })
}

pub fn date_operators(keep_time: bool) -> Vec<FilterOperator> {
    let mut ops = alloc::vec![
        date_operator("is", keep_time, |a, b| a == b),
        date_operator("not", keep_time, |a, b| a != b),
        date_operator("after", keep_time, |a, b| a > b),
        date_operator("onOrAfter", keep_time, |a, b| a >= b),
        date_operator("before", keep_time, |a, b| a < b),
        date_operator("onOrBefore", keep_time, |a, b| a <= b),
    ];
    ops.extend(emptiness_operators());
    ops
}

pub fn boolean_operators() -> Vec<FilterOperator> {
    alloc::vec![FilterOperator::new("is", true, |value, _| {
        let target = match text_of(value)?.trim() {
            "true" => true,
            "false" => false,
            _ => return None,
        };
        Some(Arc::new(move |v: &CellValue| {
            ColumnType::Boolean.coerce(v) == CellValue::Bool(target)
        }) as ApplyFilterFn)
    })]
}

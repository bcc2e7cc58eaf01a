use crate::*;

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        // Deterministic, dependency-free PRNG for tests.
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 11
    }

    fn gen_range_u64(&mut self, start: u64, end_exclusive: u64) -> u64 {
        debug_assert!(start < end_exclusive);
        start + (self.next_u64() % (end_exclusive - start))
    }

    fn gen_range_usize(&mut self, start: usize, end_exclusive: usize) -> usize {
        self.gen_range_u64(start as u64, end_exclusive as u64) as usize
    }

    fn gen_range_u32(&mut self, start: u32, end_exclusive: u32) -> u32 {
        self.gen_range_u64(start as u64, end_exclusive as u64) as u32
    }

    fn gen_bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

fn ids(v: &[i64]) -> Vec<RowId> {
    v.iter().map(|&i| RowId::Int(i)).collect()
}

fn brands() -> Vec<RowRecord> {
    ["Nike", "Adidas", "Puma"]
        .iter()
        .enumerate()
        .map(|(i, b)| RowRecord::new(i as i64 + 1).with("brand", *b))
        .collect()
}

fn row_map(rows: &[RowRecord]) -> IdMap<RowRecord> {
    rows.iter().map(|r| (r.id.clone(), r.clone())).collect()
}

fn flat_tree(rows: &[RowRecord]) -> RowTree {
    let inputs: Vec<TreeInput> = rows.iter().map(|r| TreeInput::flat(r.id.clone())).collect();
    build_row_tree(&inputs, &ExpansionConfig::default()).unwrap()
}

fn filtered_ids(rows: &[RowRecord], columns: &ColumnSet, model: &FilterModel) -> Vec<RowId> {
    let map = row_map(rows);
    let tree = flat_tree(rows);
    let result = filter_rows(&tree, model, columns, &RowAccess::new(&map, &tree), false).unwrap();
    rows.iter()
        .map(|r| r.id.clone())
        .filter(|id| result.is_visible(id))
        .collect()
}

fn sorted_ids(rows: &[RowRecord], columns: &ColumnSet, model: &SortModel) -> Vec<RowId> {
    let map = row_map(rows);
    let tree = flat_tree(rows);
    let order: Vec<RowId> = rows.iter().map(|r| r.id.clone()).collect();
    sort_row_ids(&order, model, columns, &RowAccess::new(&map, &tree)).unwrap()
}

fn item(field: &str, operator: &str, value: &str) -> FilterItem {
    FilterItem::new(field, operator, Some(value))
}

/// Tree-data rows: `name` is the last path segment, `n` a number.
fn file_rows() -> Vec<RowRecord> {
    [
        (1, "docs", 10),
        (2, "docs/a.txt", 20),
        (3, "docs/b.txt", 30),
        (4, "src/main.rs", 40),
    ]
    .iter()
    .map(|&(id, path, n)| {
        let name = path.rsplit('/').next().unwrap_or(path);
        RowRecord::new(id)
            .with("path", path)
            .with("name", name)
            .with("n", n as i64)
    })
    .collect()
}

fn path_of(row: &RowRecord) -> Vec<String> {
    row.get("path")
        .as_str()
        .map(|p| p.split('/').map(String::from).collect())
        .unwrap_or_default()
}

fn file_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::string("path"),
        ColumnDef::string("name"),
        ColumnDef::number("n"),
    ]
}

fn tree_of(rows: &[RowRecord]) -> RowTree {
    let inputs: Vec<TreeInput> = rows
        .iter()
        .map(|r| TreeInput {
            id: r.id.clone(),
            path: RowPath::Tree(path_of(r)),
        })
        .collect();
    build_row_tree(&inputs, &ExpansionConfig::default()).unwrap()
}

fn tree_engine() -> GridEngine {
    let mut engine = GridEngine::new(
        GridOptions::new().with_grouping(GroupingKind::tree_data(path_of)),
    );
    engine.set_columns(file_columns()).unwrap();
    engine.set_rows(file_rows()).unwrap();
    engine.report_viewport_size(800, 600);
    engine
}

fn recorder(engine: &mut GridEngine) -> Arc<Mutex<Vec<GridEventKind>>> {
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    engine.subscribe(move |event| sink.lock().unwrap().push(event.kind()));
    kinds
}

fn assert_counts_consistent(engine: &GridEngine) {
    let counts = engine.row_counts();
    assert_eq!(
        counts.visible + counts.hidden_by_collapse + counts.filtered_out,
        counts.total,
        "{counts:?}"
    );
    assert_eq!(counts.visible, engine.visible_ordering().len());
}

// ---- sorting ----

#[test]
fn empty_sort_model_keeps_insertion_order() {
    let mut rng = Lcg::new(7);
    let rows: Vec<RowRecord> = (0..200i64)
        .map(|i| RowRecord::new(i).with("n", rng.gen_range_u64(0, 10) as i64))
        .collect();
    let columns = ColumnSet::new([ColumnDef::number("n")]).unwrap();
    let expected: Vec<RowId> = rows.iter().map(|r| r.id.clone()).collect();
    assert_eq!(sorted_ids(&rows, &columns, &SortModel::default()), expected);
}

#[test]
fn multi_key_sort_breaks_ties_with_next_key() {
    let rows = vec![
        RowRecord::new(1).with("a", 1i64).with("b", 2i64),
        RowRecord::new(2).with("a", 1i64).with("b", 1i64),
    ];
    let columns = ColumnSet::new([ColumnDef::number("a"), ColumnDef::number("b")]).unwrap();
    let model = SortModel::new([SortItem::asc("a"), SortItem::asc("b")]);
    assert_eq!(sorted_ids(&rows, &columns, &model), ids(&[2, 1]));
}

#[test]
fn blanks_sort_last_in_both_directions() {
    let rows = vec![
        RowRecord::new(1).with("n", 3i64),
        RowRecord::new(2).with("n", CellValue::Null),
        RowRecord::new(3).with("n", 1i64),
        RowRecord::new(4).with("n", "abc"),
        RowRecord::new(5).with("n", 2i64),
    ];
    let columns = ColumnSet::new([ColumnDef::number("n")]).unwrap();
    assert_eq!(
        sorted_ids(&rows, &columns, &SortModel::new([SortItem::asc("n")])),
        ids(&[3, 5, 1, 2, 4])
    );
    assert_eq!(
        sorted_ids(&rows, &columns, &SortModel::new([SortItem::desc("n")])),
        ids(&[1, 5, 3, 2, 4])
    );
}

#[test]
fn sort_model_keeps_first_item_per_field() {
    let model = SortModel::new([SortItem::asc("a"), SortItem::desc("a"), SortItem::desc("b")]);
    assert_eq!(model.items().len(), 2);
    assert_eq!(model.direction("a"), Some(SortDirection::Asc));
}

#[test]
fn sort_rejects_unknown_and_unsortable_fields() {
    let rows = brands();
    let columns = ColumnSet::new([
        ColumnDef::string("brand"),
        ColumnDef::string("note").with_sortable(false),
    ])
    .unwrap();
    let map = row_map(&rows);
    let tree = flat_tree(&rows);
    let access = RowAccess::new(&map, &tree);
    let order = ids(&[1, 2, 3]);

    let err = sort_row_ids(&order, &SortModel::new([SortItem::asc("gone")]), &columns, &access);
    assert_eq!(
        err,
        Err(GridError::UnknownSortField {
            field: "gone".into()
        })
    );
    let err = sort_row_ids(&order, &SortModel::new([SortItem::asc("note")]), &columns, &access);
    assert_eq!(
        err,
        Err(GridError::ColumnNotSortable {
            field: "note".into()
        })
    );
}

#[test]
fn string_sort_is_case_insensitive_with_custom_comparator_override() {
    let rows = vec![
        RowRecord::new(1).with("s", "beta"),
        RowRecord::new(2).with("s", "Alpha"),
        RowRecord::new(3).with("s", "gamma"),
    ];
    let columns = ColumnSet::new([ColumnDef::string("s")]).unwrap();
    let model = SortModel::new([SortItem::asc("s")]);
    assert_eq!(sorted_ids(&rows, &columns, &model), ids(&[2, 1, 3]));

    // Order by string length instead.
    let by_len = ColumnSet::new([ColumnDef::string("s").with_sort_comparator(Some(
        |a: &CellValue, b: &CellValue| {
            let len = |v: &CellValue| v.as_str().map_or(0, str::len);
            len(a).cmp(&len(b))
        },
    ))])
    .unwrap();
    assert_eq!(sorted_ids(&rows, &by_len, &model), ids(&[1, 2, 3]));
}

#[test]
fn header_click_cycles_through_sorting_order() {
    let order = [Some(SortDirection::Asc), Some(SortDirection::Desc), None];
    let m0 = SortModel::default();
    let m1 = toggle_sort_model(&m0, "a", false, &order);
    assert_eq!(m1.direction("a"), Some(SortDirection::Asc));
    let m2 = toggle_sort_model(&m1, "a", false, &order);
    assert_eq!(m2.direction("a"), Some(SortDirection::Desc));
    let m3 = toggle_sort_model(&m2, "a", false, &order);
    assert!(m3.is_empty());

    let multi = toggle_sort_model(&m1, "b", true, &order);
    assert_eq!(
        multi.items(),
        &[SortItem::asc("a"), SortItem::asc("b")][..]
    );
    let single = toggle_sort_model(&multi, "b", false, &order);
    assert_eq!(single.items(), &[SortItem::desc("b")][..]);
}

#[test]
fn grouped_sort_orders_siblings_and_keeps_nesting() {
    let rows = vec![
        RowRecord::new(1).with("path", "b").with("name", "b"),
        RowRecord::new(2).with("path", "b/z").with("name", "z"),
        RowRecord::new(3).with("path", "b/a").with("name", "a"),
        RowRecord::new(4).with("path", "a").with("name", "a"),
    ];
    let tree = tree_of(&rows);
    let map = row_map(&rows);
    let columns = ColumnSet::new([ColumnDef::string("name")]).unwrap();
    let access = RowAccess::new(&map, &tree);
    let model = SortModel::new([SortItem::asc("name")]);

    let sorted = sort_row_tree(&tree, &model, &columns, &access, false).unwrap();
    assert_eq!(sorted.flatten(), ids(&[4, 1, 3, 2]));

    let top_only = sort_row_tree(&tree, &model, &columns, &access, true).unwrap();
    assert_eq!(top_only.flatten(), ids(&[4, 1, 2, 3]));
}

// ---- filtering ----

#[test]
fn blank_filter_value_matches_every_row() {
    let rows = brands();
    let columns = ColumnSet::new([ColumnDef::string("brand")]).unwrap();
    let model = FilterModel::new([item("brand", "contains", "")]);
    assert_eq!(filtered_ids(&rows, &columns, &model), ids(&[1, 2, 3]));

    let no_value = FilterModel::new([FilterItem::new("brand", "contains", None::<&str>)]);
    assert_eq!(filtered_ids(&rows, &columns, &no_value), ids(&[1, 2, 3]));
}

#[test]
fn link_operator_composes_items() {
    let rows = brands();
    let columns = ColumnSet::new([ColumnDef::string("brand")]).unwrap();
    let items = [item("brand", "contains", "a"), item("brand", "contains", "m")];

    let and = FilterModel::new(items.clone());
    assert_eq!(filtered_ids(&rows, &columns, &and), ids(&[3]));

    let or = FilterModel::new(items).with_link_operator(LinkOperator::Or);
    assert_eq!(filtered_ids(&rows, &columns, &or), ids(&[2, 3]));
}

#[test]
fn string_operators_use_formatted_value_and_fold_case() {
    let rows = vec![
        RowRecord::new(1).with("name", "Émile"),
        RowRecord::new(2).with("name", "emile"),
        RowRecord::new(3).with("name", "Emilie"),
        RowRecord::new(4).with("code", 7i64),
    ];
    let columns = ColumnSet::new([
        ColumnDef::string("name"),
        ColumnDef::string("code").with_value_formatter(|v| format!("#{v}")),
    ])
    .unwrap();

    let equals = FilterModel::new([item("name", "equals", "EMILE")]);
    assert_eq!(filtered_ids(&rows, &columns, &equals), ids(&[1, 2]));

    let starts = FilterModel::new([item("name", "startsWith", "EMI")]);
    assert_eq!(filtered_ids(&rows, &columns, &starts), ids(&[2, 3]));

    let ends = FilterModel::new([item("name", "endsWith", "LIE")]);
    assert_eq!(filtered_ids(&rows, &columns, &ends), ids(&[3]));

    let formatted = FilterModel::new([item("code", "startsWith", "#7")]);
    assert_eq!(filtered_ids(&rows, &columns, &formatted), ids(&[4]));

    let any_of = FilterModel::new([FilterItem::new(
        "name",
        "isAnyOf",
        Some(FilterValue::List(vec!["emilie".into(), "nobody".into()])),
    )]);
    assert_eq!(filtered_ids(&rows, &columns, &any_of), ids(&[3]));
}

#[test]
fn number_filters_fail_open_on_item_and_closed_on_row() {
    let rows = vec![
        RowRecord::new(1).with("price", 10i64),
        RowRecord::new(2).with("price", "abc"),
        RowRecord::new(3),
        RowRecord::new(4).with("price", "5"),
    ];
    let columns = ColumnSet::new([ColumnDef::number("price")]).unwrap();

    let unparseable = FilterModel::new([item("price", ">", "abc")]);
    assert_eq!(filtered_ids(&rows, &columns, &unparseable), ids(&[1, 2, 3, 4]));

    let gt = FilterModel::new([item("price", ">", "6")]);
    assert_eq!(filtered_ids(&rows, &columns, &gt), ids(&[1]));

    let le = FilterModel::new([item("price", "<=", "5")]);
    assert_eq!(filtered_ids(&rows, &columns, &le), ids(&[4]));

    let empty = FilterModel::new([FilterItem::new("price", "isEmpty", None::<&str>)]);
    assert_eq!(filtered_ids(&rows, &columns, &empty), ids(&[3]));

    let any_of = FilterModel::new([FilterItem::new(
        "price",
        "isAnyOf",
        Some(FilterValue::List(vec!["5".into(), "10".into()])),
    )]);
    assert_eq!(filtered_ids(&rows, &columns, &any_of), ids(&[1, 4]));
}

#[test]
fn date_filters_compare_days_or_minutes() {
    let rows = vec![
        RowRecord::new(1).with("day", "2024-03-01"),
        RowRecord::new(2).with("day", "2024-03-02T10:30"),
        RowRecord::new(3).with("day", "not a date"),
    ];
    let dates = ColumnSet::new([ColumnDef::date("day")]).unwrap();
    let after = FilterModel::new([item("day", "after", "2024-03-01")]);
    assert_eq!(filtered_ids(&rows, &dates, &after), ids(&[2]));
    let is = FilterModel::new([item("day", "is", "2024-03-02")]);
    assert_eq!(filtered_ids(&rows, &dates, &is), ids(&[2]));
    let garbage = FilterModel::new([item("day", "before", "someday")]);
    assert_eq!(filtered_ids(&rows, &dates, &garbage), ids(&[1, 2, 3]));

    let date_times = ColumnSet::new([ColumnDef::date_time("day")]).unwrap();
    let on_or_after = FilterModel::new([item("day", "onOrAfter", "2024-03-02T10:30")]);
    assert_eq!(filtered_ids(&rows, &date_times, &on_or_after), ids(&[2]));
    let is_day = FilterModel::new([item("day", "is", "2024-03-02")]);
    assert!(filtered_ids(&rows, &date_times, &is_day).is_empty());
}

#[test]
fn boolean_filter_ignores_values_other_than_true_false() {
    let rows = vec![
        RowRecord::new(1).with("ok", true),
        RowRecord::new(2).with("ok", false),
        RowRecord::new(3),
    ];
    let columns = ColumnSet::new([ColumnDef::boolean("ok")]).unwrap();
    let is_true = FilterModel::new([item("ok", "is", "true")]);
    assert_eq!(filtered_ids(&rows, &columns, &is_true), ids(&[1]));
    let any = FilterModel::new([item("ok", "is", "any")]);
    assert_eq!(filtered_ids(&rows, &columns, &any), ids(&[1, 2, 3]));
}

#[test]
fn custom_operator_can_be_added_to_a_column() {
    let rows = brands();
    let columns = ColumnSet::new([ColumnDef::string("brand").with_filter_operator(
        FilterOperator::new("hasLength", true, |value, _| {
            let FilterValue::Text(s) = value? else {
                return None;
            };
            let len: usize = s.trim().parse().ok()?;
            Some(Arc::new(move |v: &CellValue| {
                v.as_str().is_some_and(|s| s.chars().count() == len)
            }) as ApplyFilterFn)
        }),
    )])
    .unwrap();
    let model = FilterModel::new([item("brand", "hasLength", "4")]);
    assert_eq!(filtered_ids(&rows, &columns, &model), ids(&[1, 3]));
}

#[test]
fn filter_rejects_unknown_field_and_operator() {
    let columns = ColumnSet::new([ColumnDef::string("brand")]).unwrap();
    assert_eq!(
        FilterModel::new([item("gone", "contains", "a")]).validate(&columns),
        Err(GridError::UnknownFilterField {
            field: "gone".into()
        })
    );
    assert_eq!(
        FilterModel::new([item("brand", ">", "a")]).validate(&columns),
        Err(GridError::UnknownOperator {
            field: "brand".into(),
            operator: ">".into()
        })
    );
}

#[test]
fn grouped_filter_keeps_ancestors_of_matches() {
    let rows = vec![
        RowRecord::new(1).with("path", "b").with("name", "b"),
        RowRecord::new(2).with("path", "b/z").with("name", "z"),
        RowRecord::new(3).with("path", "b/a").with("name", "a"),
        RowRecord::new(4).with("path", "a").with("name", "a"),
    ];
    let tree = tree_of(&rows);
    let map = row_map(&rows);
    let columns = ColumnSet::new([ColumnDef::string("name")]).unwrap();
    let access = RowAccess::new(&map, &tree);
    let id = |i: i64| RowId::Int(i);

    let z = FilterModel::new([item("name", "equals", "z")]);
    let result = filter_rows(&tree, &z, &columns, &access, false).unwrap();
    assert!(result.is_visible(&id(1)) && result.is_visible(&id(2)));
    assert!(!result.is_visible(&id(3)) && !result.is_visible(&id(4)));
    assert_eq!(result.descendant_count(&id(1)), 1);
    assert!(!result.passing_direct.contains(&id(1)));

    let b = FilterModel::new([item("name", "equals", "b")]);
    let result = filter_rows(&tree, &b, &columns, &access, false).unwrap();
    assert_eq!(result.visible.len(), 1);
    assert_eq!(result.descendant_count(&id(1)), 0);

    // Only roots are tested; descendants follow their root.
    let result = filter_rows(&tree, &b, &columns, &access, true).unwrap();
    assert_eq!(result.visible.len(), 3);
    assert_eq!(result.descendant_count(&id(1)), 2);
    let result = filter_rows(&tree, &z, &columns, &access, true).unwrap();
    assert!(result.visible.is_empty());
}

#[test]
fn synthesized_groups_are_not_counted_as_descendants() {
    let rows = vec![
        RowRecord::new(1).with("path", "g/h/x").with("name", "x"),
        RowRecord::new(2).with("path", "g/y").with("name", "y"),
    ];
    let tree = tree_of(&rows);
    let map = row_map(&rows);
    let columns = ColumnSet::new([ColumnDef::string("name")]).unwrap();
    let access = RowAccess::new(&map, &tree);
    let g = RowId::Group(vec!["g".into()]);

    let model = FilterModel::new([item("name", "contains", "x")]);
    let result = filter_rows(&tree, &model, &columns, &access, false).unwrap();
    assert!(result.is_visible(&g));
    assert!(result.is_visible(&RowId::Group(vec!["g".into(), "h".into()])));
    assert_eq!(result.descendant_count(&g), 1);
}

#[test]
fn synthesized_groups_show_only_through_matching_descendants() {
    let mut rows = vec![
        RowRecord::new(1).with("path", "g/x").with("name", "x"),
        RowRecord::new(2)
            .with("path", "h/y")
            .with("name", "y")
            .with("note", "set"),
    ];
    let tree = tree_of(&rows);
    let columns = ColumnSet::new([
        ColumnDef::string(TREE_DATA_GROUP_FIELD),
        ColumnDef::string("name"),
        ColumnDef::string("note"),
    ])
    .unwrap();
    let g = RowId::Group(vec!["g".into()]);
    let h = RowId::Group(vec!["h".into()]);

    let empty_note = FilterModel::new([FilterItem::new("note", "isEmpty", None::<&str>)]);
    for disable in [false, true] {
        let map = row_map(&rows);
        let access =
            RowAccess::new(&map, &tree).with_grouping_field(Some(TREE_DATA_GROUP_FIELD));
        let result = filter_rows(&tree, &empty_note, &columns, &access, disable).unwrap();
        assert!(result.is_visible(&g) && result.is_visible(&RowId::Int(1)));
        assert!(!result.is_visible(&h) && !result.is_visible(&RowId::Int(2)));
        assert!(!result.passing_direct.contains(&g));
    }

    // A filter on the grouping column reads the group's own key.
    let by_group = FilterModel::new([item(TREE_DATA_GROUP_FIELD, "equals", "h")]);
    let map = row_map(&rows);
    let access = RowAccess::new(&map, &tree).with_grouping_field(Some(TREE_DATA_GROUP_FIELD));
    let result = filter_rows(&tree, &by_group, &columns, &access, false).unwrap();
    assert!(result.passing_direct.contains(&h));
    assert!(!result.is_visible(&g) && !result.is_visible(&RowId::Int(2)));
    let result = filter_rows(&tree, &by_group, &columns, &access, true).unwrap();
    assert!(result.is_visible(&h) && result.is_visible(&RowId::Int(2)));
    assert!(!result.is_visible(&g));
    assert_eq!(result.descendant_count(&h), 1);

    // Rows below a synthesized root are tested on their own, also incrementally.
    let prev = filter_rows(&tree, &empty_note, &columns, &access, true).unwrap();
    rows[1].values.remove("note");
    let map = row_map(&rows);
    let access = RowAccess::new(&map, &tree).with_grouping_field(Some(TREE_DATA_GROUP_FIELD));
    let changed = [RowId::Int(2)];
    let incremental =
        refilter_rows(&prev, &changed, &tree, &empty_note, &columns, &access, true).unwrap();
    let full = filter_rows(&tree, &empty_note, &columns, &access, true).unwrap();
    assert_eq!(incremental, full);
    assert!(full.is_visible(&h) && full.is_visible(&RowId::Int(2)));
}

#[test]
fn incremental_refilter_matches_full_filter() {
    let mut rng = Lcg::new(42);
    let mut rows: Vec<RowRecord> = Vec::new();
    let mut paths: Vec<String> = Vec::new();
    for i in 0..120i64 {
        let path = if i > 0 && rng.gen_bool() {
            let parent = &paths[rng.gen_range_usize(0, paths.len())];
            format!("{parent}/r{i}")
        } else {
            format!("r{i}")
        };
        paths.push(path.clone());
        rows.push(
            RowRecord::new(i)
                .with("path", path)
                .with("n", rng.gen_range_u64(0, 100) as i64),
        );
    }
    let tree = tree_of(&rows);
    let columns = ColumnSet::new([ColumnDef::number("n")]).unwrap();
    let model = FilterModel::new([item("n", ">", "50")]);

    let mut map = row_map(&rows);
    let mut prev =
        filter_rows(&tree, &model, &columns, &RowAccess::new(&map, &tree), false).unwrap();

    for _ in 0..30 {
        let changed: Vec<RowId> = (0..rng.gen_range_usize(1, 6))
            .map(|_| RowId::Int(rng.gen_range_u64(0, 120) as i64))
            .collect();
        for id in &changed {
            let n = rng.gen_range_u64(0, 100) as i64;
            if let Some(row) = map.get_mut(id) {
                row.values.insert("n".into(), CellValue::from(n));
            }
        }
        let access = RowAccess::new(&map, &tree);
        let incremental =
            refilter_rows(&prev, &changed, &tree, &model, &columns, &access, false).unwrap();
        let full = filter_rows(&tree, &model, &columns, &access, false).unwrap();
        assert_eq!(incremental, full);
        prev = full;
    }
}

// ---- row tree ----

#[test]
fn tree_build_is_independent_of_input_order() {
    let a = [TreeInput::tree(1, ["x"]), TreeInput::tree(2, ["x", "y"])];
    let b = [TreeInput::tree(2, ["x", "y"]), TreeInput::tree(1, ["x"])];
    let config = ExpansionConfig::default();
    let ta = build_row_tree(&a, &config).unwrap();
    let tb = build_row_tree(&b, &config).unwrap();
    assert_eq!(ta, tb);
    assert_eq!(ta.children(&RowId::Int(1)), &ids(&[2])[..]);
    assert_eq!(ta.node(&RowId::Int(2)).map(|n| n.depth), Some(1));
    ta.validate().unwrap();
}

#[test]
fn duplicate_paths_are_rejected() {
    let rows = [TreeInput::tree(1, ["x"]), TreeInput::tree(2, ["x"])];
    assert_eq!(
        build_row_tree(&rows, &ExpansionConfig::default()),
        Err(GridError::DuplicatePath {
            existing: RowId::Int(1),
            duplicate: RowId::Int(2),
        })
    );
    let dup_ids = [TreeInput::flat(1), TreeInput::flat(1)];
    assert_eq!(
        build_row_tree(&dup_ids, &ExpansionConfig::default()),
        Err(GridError::DuplicateRowId { id: RowId::Int(1) })
    );
}

#[test]
fn missing_ancestors_are_synthesized() {
    let tree = build_row_tree(
        &[TreeInput::tree(1, ["a", "b", "c"]), TreeInput::tree(2, ["a"])],
        &ExpansionConfig::default(),
    )
    .unwrap();
    assert_eq!(tree.roots(), &ids(&[2])[..]);
    let b = RowId::Group(vec!["a".into(), "b".into()]);
    let node = tree.node(&b).unwrap();
    assert!(node.is_auto_generated);
    assert_eq!(node.grouping_key.as_deref(), Some("b"));
    assert_eq!(node.parent, Some(RowId::Int(2)));
    assert_eq!(tree.ancestors(&RowId::Int(1)).unwrap(), vec![b, RowId::Int(2)]);
    tree.validate().unwrap();
}

#[test]
fn corrupted_parent_links_report_a_cycle() {
    let inputs = [TreeInput::tree(1, ["a"]), TreeInput::tree(2, ["a", "b"])];
    let tree = build_row_tree(&inputs, &ExpansionConfig::default()).unwrap();
    let (one, two) = (RowId::Int(1), RowId::Int(2));

    // Parent loop cut off from the roots.
    let mut looped = tree.clone();
    looped.roots.clear();
    if let Some(node) = looped.nodes.get_mut(&one) {
        node.parent = Some(two.clone());
    }
    assert_eq!(
        looped.ancestors(&two),
        Err(GridError::TreeCycle { id: two.clone() })
    );
    assert!(matches!(
        looped.validate(),
        Err(GridError::TreeCycle { .. })
    ));

    // A child list leading back to the root.
    let mut reentrant = tree.clone();
    if let Some(node) = reentrant.nodes.get_mut(&two) {
        node.children.push(one.clone());
    }
    assert_eq!(
        reentrant.validate(),
        Err(GridError::TreeCycle { id: one.clone() })
    );
    let rows: IdMap<RowRecord> = IdMap::default();
    let columns = ColumnSet::new([ColumnDef::string("name")]).unwrap();
    let model = FilterModel::new([item("name", "contains", "a")]);
    let access = RowAccess::new(&rows, &reentrant);
    assert_eq!(
        filter_rows(&reentrant, &model, &columns, &access, false),
        Err(GridError::TreeCycle { id: one })
    );
}

#[test]
fn empty_paths_degrade_to_flat_rows() {
    let tree = build_row_tree(
        &[TreeInput::tree(1, Vec::<String>::new()), TreeInput::flat(2)],
        &ExpansionConfig::default(),
    )
    .unwrap();
    assert_eq!(tree.roots(), &ids(&[1, 2])[..]);
    assert!(!tree.is_hierarchical());
}

#[test]
fn expansion_defaults_follow_depth_unless_predicate_is_given() {
    let rows = [
        TreeInput::tree(1, ["a"]),
        TreeInput::tree(2, ["a", "b"]),
        TreeInput::tree(3, ["a", "b", "c"]),
    ];
    let depth0 = ExpansionConfig {
        default_expansion_depth: Some(0),
        predicate: None,
    };
    let tree = build_row_tree(&rows, &depth0).unwrap();
    assert!(tree.node(&RowId::Int(1)).unwrap().children_expanded);
    assert!(!tree.node(&RowId::Int(2)).unwrap().children_expanded);

    let predicate = ExpansionConfig {
        default_expansion_depth: Some(5),
        predicate: Some(Arc::new(|node: &RowNode| node.depth == 1)),
    };
    let tree = build_row_tree(&rows, &predicate).unwrap();
    assert!(!tree.node(&RowId::Int(1)).unwrap().children_expanded);
    assert!(tree.node(&RowId::Int(2)).unwrap().children_expanded);
}

#[test]
fn row_grouping_builds_group_nodes_from_values() {
    let rows = [
        TreeInput {
            id: RowId::Int(1),
            path: RowPath::Groups(vec![("kind".into(), "fruit".into())]),
        },
        TreeInput {
            id: RowId::Int(2),
            path: RowPath::Groups(vec![("kind".into(), "veg".into())]),
        },
        TreeInput {
            id: RowId::Int(3),
            path: RowPath::Groups(vec![("kind".into(), "fruit".into())]),
        },
    ];
    let tree = build_row_tree(&rows, &ExpansionConfig::default()).unwrap();
    let fruit = RowId::Group(vec!["fruit".into()]);
    assert_eq!(tree.roots().len(), 2);
    assert_eq!(tree.children(&fruit), &ids(&[1, 3])[..]);
    assert_eq!(
        tree.node(&fruit).unwrap().grouping_field.as_deref(),
        Some("kind")
    );
}

// ---- preprocessing ----

fn push(tag: &'static str) -> impl Fn(Vec<&'static str>, &bool) -> Vec<&'static str> {
    move |mut acc, _| {
        acc.push(tag);
        acc
    }
}

#[test]
fn registry_orders_by_registration_then_id() {
    let mut registry: PreProcessorRegistry<Vec<&'static str>, bool> = PreProcessorRegistry::new();
    registry.register("hook", "b", push("b"));
    registry.register("hook", "a", push("a"));
    assert_eq!(registry.run("hook", Vec::new(), &false), vec!["b", "a"]);

    registry.batch(|r| {
        r.register("hook", "d", push("d"));
        r.register("hook", "c", push("c"));
    });
    assert_eq!(registry.contributors("hook"), vec!["b", "a", "c", "d"]);

    // Replacing keeps the slot.
    registry.register("hook", "b", push("B"));
    assert_eq!(
        registry.run("hook", Vec::new(), &false),
        vec!["B", "a", "c", "d"]
    );

    assert!(registry.unregister("hook", "a"));
    assert!(!registry.unregister("hook", "a"));
    assert_eq!(registry.contributors("hook"), vec!["b", "c", "d"]);
}

#[test]
fn registry_recomputes_only_on_invalidation() {
    let mut registry: PreProcessorRegistry<Vec<&'static str>, bool> = PreProcessorRegistry::new();
    registry.register("hook", "a", push("a"));
    let seed = Vec::new();

    assert_eq!(registry.run_cached("hook", 0, &seed, &false), (vec!["a"], true));
    assert!(!registry.run_cached("hook", 0, &seed, &false).1);
    assert!(registry.run_cached("hook", 0, &seed, &true).1);
    assert!(!registry.run_cached("hook", 0, &seed, &true).1);
    assert!(registry.run_cached("hook", 1, &seed, &true).1);

    registry.register("other", "x", push("x"));
    assert!(!registry.run_cached("hook", 1, &seed, &true).1);

    registry.register("hook", "b", push("b"));
    assert_eq!(
        registry.run_cached("hook", 1, &seed, &true),
        (vec!["a", "b"], true)
    );
    registry.unregister("hook", "a");
    assert_eq!(registry.run_cached("hook", 1, &seed, &true), (vec!["b"], true));
}

#[test]
fn grouping_contributors_insert_synthetic_columns() {
    let mut registry = PreProcessorRegistry::new();
    register_grouping_contributors(&mut registry);
    assert_eq!(
        registry.contributors(HYDRATE_COLUMNS),
        vec![ROW_GROUPING_CONTRIBUTOR, TREE_DATA_CONTRIBUTOR]
    );
    let seed = ColumnSet::new([ColumnDef::string("name")]).unwrap();

    let flat = registry.run(HYDRATE_COLUMNS, seed.clone(), &HydrationDeps::default());
    assert_eq!(flat.fields().collect::<Vec<_>>(), vec!["name"]);

    let tree = registry.run(
        HYDRATE_COLUMNS,
        seed.clone(),
        &GroupingKind::tree_data(path_of).hydration_deps(),
    );
    assert_eq!(
        tree.fields().collect::<Vec<_>>(),
        vec![TREE_DATA_GROUP_FIELD, "name"]
    );

    let grouped = registry.run(
        HYDRATE_COLUMNS,
        seed,
        &GroupingKind::row_grouping(["name"]).hydration_deps(),
    );
    assert_eq!(
        grouped.fields().collect::<Vec<_>>(),
        vec![ROW_GROUP_FIELD, "name"]
    );
}

// ---- sizing ----

fn sizing_input(row_count: usize, box_width: u32, box_height: u32, columns: u64) -> SizingInput {
    SizingInput {
        row_count,
        row_height: 52,
        header_height: 56,
        density: Density::Standard,
        box_width,
        box_height,
        columns_total_width: columns,
        scrollbar_size: 15,
        ..SizingInput::default()
    }
}

#[test]
fn density_scales_row_and_header_heights() {
    let mut input = sizing_input(10, 500, 400, 100);
    input.density = Density::Compact;
    let s = compute_sizing(&input);
    assert_eq!((s.row_height, s.header_height), (36, 39));
    assert_eq!(s.total_height, 360);

    input.density = Density::Comfortable;
    assert_eq!(compute_sizing(&input).row_height, 67);
}

#[test]
fn vertical_scrollbar_can_force_horizontal_one() {
    let s = compute_sizing(&sizing_input(5, 500, 400, 300));
    assert!(!s.has_scroll_x && !s.has_scroll_y);
    assert_eq!(s.viewport_inner, Size { width: 500, height: 344 });

    // 490px of columns fit in 500px, but not beside a 15px vertical scrollbar.
    let s = compute_sizing(&sizing_input(100, 500, 400, 490));
    assert!(s.has_scroll_x && s.has_scroll_y);
    assert_eq!(s.viewport_inner, Size { width: 485, height: 329 });
}

#[test]
fn scrollbar_fixed_point_terminates_and_reproduces() {
    let mut rng = Lcg::new(99);
    for _ in 0..2000 {
        let input = SizingInput {
            row_count: rng.gen_range_usize(0, 40),
            row_height: rng.gen_range_u32(1, 60),
            header_height: rng.gen_range_u32(0, 60),
            density: Density::Standard,
            box_width: rng.gen_range_u32(0, 600),
            box_height: rng.gen_range_u32(0, 600),
            columns_total_width: rng.gen_range_u64(0, 700),
            scrollbar_size: rng.gen_range_u32(0, 30),
            ..SizingInput::default()
        };
        let s = compute_sizing(&input);
        let again = compute_sizing_seeded(&input, s.has_scroll_x, s.has_scroll_y);
        assert_eq!(s, again, "{input:?}");

        let sb = input.scrollbar_size as u64;
        let inner_width =
            (input.box_width as u64).saturating_sub(if s.has_scroll_y { sb } else { 0 });
        let inner_height = (input.box_height as u64)
            .saturating_sub(s.header_height as u64)
            .saturating_sub(if s.has_scroll_x { sb } else { 0 });
        if !s.has_scroll_x {
            assert!(input.columns_total_width <= inner_width, "{input:?}");
        }
        if !s.has_scroll_y {
            assert!(s.total_height <= inner_height, "{input:?}");
        }
    }
}

#[test]
fn pagination_clamps_to_rows_remaining_on_page() {
    let mut input = sizing_input(25, 500, 400, 100);
    input.pagination = Some(Pagination {
        page: 2,
        page_size: 10,
    });
    let s = compute_sizing(&input);
    assert_eq!((s.page_first_row, s.virtual_row_count), (20, 5));
    assert_eq!(s.page_row_count, 5);
    assert_eq!(s.page_count(25), 3);

    input.pagination = Some(Pagination {
        page: 9,
        page_size: 10,
    });
    assert_eq!(compute_sizing(&input).page_first_row, 20);

    input.pagination = Some(Pagination {
        page: 0,
        page_size: 10,
    });
    // 344px fit six full rows.
    assert_eq!(compute_sizing(&input).page_row_count, 6);
}

#[test]
fn auto_height_grows_the_box_and_skips_vertical_scroll() {
    let mut input = sizing_input(5, 500, 100, 100);
    input.auto_height = true;
    let s = compute_sizing(&input);
    assert!(!s.has_scroll_y);
    assert_eq!(s.box_height, 56 + 5 * 52);
    assert_eq!(s.page_row_count, 5);
}

#[test]
fn auto_page_size_uses_rows_that_fit() {
    let mut input = sizing_input(20, 500, 400, 100);
    input.auto_page_size = true;
    let s = compute_sizing(&input);
    assert_eq!(s.page_size, Some(6));
    assert_eq!(s.virtual_row_count, 6);
    assert!(!s.has_scroll_y);
}

// ---- windowing ----

fn ten_columns() -> Arc<ColumnPositions> {
    Arc::new(ColumnPositions::from_widths([100; 10]))
}

fn layout() -> WindowLayout {
    WindowLayout {
        viewport_width: 300,
        viewport_height: 500,
        row_height: 52,
        page_first_row: 0,
        row_count: 100,
        columns: ten_columns(),
        row_buffer: 3,
        column_buffer: 1,
    }
}

#[test]
fn spans_apply_buffers_and_clamp() {
    assert_eq!(
        compute_row_span(0, 500, 52, 100, 3),
        Some(IndexSpan { first: 0, last: 12 })
    );
    assert_eq!(
        compute_row_span(1040, 500, 52, 100, 3),
        Some(IndexSpan {
            first: 17,
            last: 32
        })
    );
    assert_eq!(
        compute_row_span(1_000_000, 500, 52, 100, 3),
        Some(IndexSpan {
            first: 96,
            last: 99
        })
    );
    assert_eq!(compute_row_span(0, 500, 52, 0, 3), None);

    let columns = ten_columns();
    assert_eq!(
        compute_column_span(&columns, 250, 300, 1),
        Some(IndexSpan { first: 1, last: 6 })
    );
    assert_eq!(columns.index_at(99), Some(0));
    assert_eq!(columns.index_at(100), Some(1));
    assert_eq!(columns.index_at(5000), Some(9));
    assert_eq!(
        compute_column_span(&ColumnPositions::default(), 0, 300, 1),
        None
    );
}

#[test]
fn window_is_none_until_measured() {
    let mut windowing = Windowing::new();
    assert_eq!(windowing.update(&layout(), ScrollState::default()), None);
    assert_eq!(windowing.phase(), WindowPhase::Uninitialized);

    windowing.measure();
    assert_eq!(windowing.phase(), WindowPhase::Measured);
    assert!(windowing.update(&layout(), ScrollState::default()).is_some());
    assert_eq!(windowing.phase(), WindowPhase::Updating);
}

#[test]
fn small_scroll_deltas_keep_the_same_window() {
    let mut windowing = Windowing::new();
    windowing.measure();
    let layout = layout();
    let first = windowing
        .update(&layout, ScrollState { left: 0, top: 0 })
        .unwrap();
    let second = windowing
        .update(&layout, ScrollState { left: 10, top: 10 })
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(windowing.phase(), WindowPhase::Stable);

    let third = windowing
        .update(&layout, ScrollState { left: 10, top: 1040 })
        .unwrap();
    assert!(!Arc::ptr_eq(&second, &third));
    assert_eq!(windowing.phase(), WindowPhase::Updating);
    // A vertical scroll leaves the column span alone.
    assert_eq!(third.columns, second.columns);
    assert_eq!(third.first_row_index(), Some(17));
    assert_eq!(third.offset_top, 17 * 52);
}

#[test]
fn window_rows_are_offset_by_the_page_start() {
    let mut windowing = Windowing::new();
    windowing.measure();
    let layout = WindowLayout {
        page_first_row: 20,
        row_count: 5,
        ..layout()
    };
    let window = windowing.update(&layout, ScrollState::default()).unwrap();
    assert_eq!(window.rows, Some(IndexSpan { first: 20, last: 24 }));
    assert_eq!(window.offset_top, 0);
    assert_eq!(window.offset_left, 0);
}

// ---- events ----

#[test]
fn batch_coalesces_events_in_pipeline_order() {
    let mut subscribers = Subscribers::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = subscribers.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

    subscribers.begin_batch();
    subscribers.publish(GridEvent::FilterApplied(Arc::from(ids(&[1]))));
    subscribers.publish(GridEvent::SortApplied(Arc::from(ids(&[1, 2]))));
    subscribers.publish(GridEvent::FilterApplied(Arc::from(ids(&[2]))));
    assert!(seen.lock().unwrap().is_empty());
    subscribers.end_batch();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            GridEvent::SortApplied(Arc::from(ids(&[1, 2]))),
            GridEvent::FilterApplied(Arc::from(ids(&[2]))),
        ]
    );

    assert!(subscribers.unsubscribe(id));
    subscribers.publish(GridEvent::SizingChanged(Sizing::default()));
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn batch_keeps_every_error() {
    let mut subscribers = Subscribers::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    subscribers.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

    let sort = GridError::UnknownSortField {
        field: "a".into(),
    };
    let filter = GridError::UnknownFilterField {
        field: "b".into(),
    };
    subscribers.begin_batch();
    subscribers.publish(GridEvent::Error(sort.clone()));
    subscribers.publish(GridEvent::SortApplied(Arc::from(ids(&[1]))));
    subscribers.publish(GridEvent::Error(filter.clone()));
    subscribers.end_batch();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            GridEvent::SortApplied(Arc::from(ids(&[1]))),
            GridEvent::Error(sort),
            GridEvent::Error(filter),
        ]
    );
}

// ---- engine ----

fn brand_engine() -> GridEngine {
    let mut engine = GridEngine::default();
    engine
        .set_columns([ColumnDef::string("brand"), ColumnDef::number("n")])
        .unwrap();
    engine.set_rows(brands()).unwrap();
    engine
}

#[test]
fn engine_renders_nothing_before_measurement() {
    let mut engine = brand_engine();
    assert_eq!(engine.render_window(), None);
    assert_eq!(engine.window_phase(), WindowPhase::Uninitialized);

    engine.report_viewport_size(500, 400);
    let window = engine.render_window().unwrap();
    assert_eq!(window.rows, Some(IndexSpan { first: 0, last: 2 }));
    assert_eq!(window.columns, Some(IndexSpan { first: 0, last: 1 }));
}

#[test]
fn engine_sort_intents() {
    let mut engine = brand_engine();
    engine.toggle_column_sort("brand", false).unwrap();
    assert_eq!(&*engine.visible_ordering(), &ids(&[2, 1, 3])[..]);
    engine.toggle_column_sort("brand", false).unwrap();
    assert_eq!(&*engine.visible_ordering(), &ids(&[3, 1, 2])[..]);
    engine.toggle_column_sort("brand", false).unwrap();
    assert!(engine.sort_model().is_empty());
    assert_eq!(&*engine.visible_ordering(), &ids(&[1, 2, 3])[..]);

    let bad = engine.set_sort_model(SortModel::new([SortItem::asc("gone")]));
    assert_eq!(
        bad,
        Err(GridError::UnknownSortField {
            field: "gone".into()
        })
    );
    assert!(engine.sort_model().is_empty());
    assert_eq!(engine.last_error(), None);
}

#[test]
fn engine_reports_stale_models_after_column_removal() {
    let mut engine = brand_engine();
    engine
        .set_sort_model(SortModel::new([SortItem::desc("brand")]))
        .unwrap();
    let kinds = recorder(&mut engine);

    engine.remove_column("brand").unwrap();
    assert_eq!(
        engine.last_error(),
        Some(&GridError::UnknownSortField {
            field: "brand".into()
        })
    );
    assert!(engine.sort_model().is_empty());
    assert_eq!(&*engine.visible_ordering(), &ids(&[1, 2, 3])[..]);
    assert!(kinds.lock().unwrap().contains(&GridEventKind::Error));
}

#[test]
fn engine_notifies_after_each_stage_and_batches() {
    let mut engine = brand_engine();
    engine.report_viewport_size(500, 400);
    let kinds = recorder(&mut engine);

    engine
        .set_filter_model(FilterModel::new([item("brand", "contains", "a")]))
        .unwrap();
    {
        let seen = kinds.lock().unwrap();
        assert_eq!(seen.first(), Some(&GridEventKind::FilterApplied));
        assert!(seen.contains(&GridEventKind::WindowChanged));
    }
    kinds.lock().unwrap().clear();

    engine.batch_update(|e| {
        e.set_sort_model(SortModel::new([SortItem::asc("brand")]))
            .unwrap();
        e.set_filter_model(FilterModel::default()).unwrap();
        e.set_sort_model(SortModel::new([SortItem::desc("brand")]))
            .unwrap();
    });
    let seen = kinds.lock().unwrap().clone();
    let mut deduped = seen.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(seen, deduped);
    assert!(seen.contains(&GridEventKind::SortApplied));
    assert_eq!(&*engine.visible_ordering(), &ids(&[3, 1, 2])[..]);
}

#[test]
fn engine_window_is_identity_stable_under_small_scrolls() {
    let mut engine = GridEngine::default();
    engine
        .set_columns((0..10).map(|i| ColumnDef::number(format!("c{i}"))))
        .unwrap();
    engine
        .set_rows((0..200i64).map(|i| RowRecord::new(i).with("c0", i)))
        .unwrap();
    engine.report_viewport_size(400, 400);
    engine.report_scroll(0, 520);
    let before = engine.render_window().unwrap();
    engine.report_scroll(5, 530);
    let after = engine.render_window().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(engine.window_phase(), WindowPhase::Stable);
}

#[test]
fn engine_tree_data_expansion_and_counts() {
    let mut engine = tree_engine();
    let src = RowId::Group(vec!["src".into()]);
    assert_eq!(
        engine.columns().iter().next().map(|c| c.field.as_str()),
        Some(TREE_DATA_GROUP_FIELD)
    );
    assert_eq!(&*engine.visible_ordering(), &[RowId::Int(1), src.clone()][..]);
    assert_eq!(
        engine.row_counts(),
        RowCounts {
            visible: 2,
            hidden_by_collapse: 3,
            filtered_out: 0,
            total: 5
        }
    );

    engine.set_row_expansion(&RowId::Int(1), true).unwrap();
    assert_eq!(
        &*engine.visible_ordering(),
        &[RowId::Int(1), RowId::Int(2), RowId::Int(3), src.clone()][..]
    );
    assert_counts_consistent(&engine);

    // Remembered across a structural change.
    engine
        .update_rows([RowUpdate::Upsert(
            RowRecord::new(5).with("path", "docs/c.txt").with("name", "c.txt"),
        )])
        .unwrap();
    assert!(engine.row_node(&RowId::Int(1)).unwrap().children_expanded);
    assert_eq!(engine.visible_index(&RowId::Int(5)), Some(3));

    assert_eq!(
        engine.set_row_expansion(&RowId::Int(99), true),
        Err(GridError::UnknownRow { id: RowId::Int(99) })
    );
}

#[test]
fn engine_tree_data_filter_counts_descendants() {
    let mut engine = tree_engine();
    engine
        .set_filter_model(FilterModel::new([item("name", "contains", "a.txt")]))
        .unwrap();
    assert_eq!(engine.filtered_descendant_count(&RowId::Int(1)), 1);
    assert_eq!(
        engine.row_counts(),
        RowCounts {
            visible: 1,
            hidden_by_collapse: 1,
            filtered_out: 3,
            total: 5
        }
    );

    engine
        .set_sort_model(SortModel::new([SortItem::desc(TREE_DATA_GROUP_FIELD)]))
        .unwrap();
    assert_counts_consistent(&engine);
}

#[test]
fn engine_duplicate_path_update_is_rejected_and_rolled_back() {
    let mut engine = tree_engine();
    engine.set_row_expansion(&RowId::Int(1), true).unwrap();
    let before = engine.row_tree();
    let visible = engine.visible_ordering();
    let kinds = recorder(&mut engine);

    let result = engine.update_rows([
        RowUpdate::Delete(RowId::Int(3)),
        RowUpdate::Upsert(RowRecord::new(1).with("n", 99)),
        RowUpdate::Upsert(RowRecord::new(9).with("path", "docs/a.txt")),
    ]);
    assert_eq!(
        result,
        Err(GridError::DuplicatePath {
            existing: RowId::Int(2),
            duplicate: RowId::Int(9),
        })
    );
    assert_eq!(engine.last_error(), result.err().as_ref());
    assert!(kinds.lock().unwrap().contains(&GridEventKind::Error));

    assert!(Arc::ptr_eq(&before, &engine.row_tree()));
    assert_eq!(engine.visible_ordering(), visible);
    assert_eq!(engine.row_ids(), &ids(&[1, 2, 3, 4])[..]);
    assert_eq!(engine.row(&RowId::Int(9)), None);
    assert_eq!(engine.row(&RowId::Int(1)).unwrap().get("n"), &CellValue::from(10i64));
    assert!(engine.row(&RowId::Int(3)).is_some());
    assert!(engine.row_node(&RowId::Int(1)).unwrap().children_expanded);
    assert_counts_consistent(&engine);
}

#[test]
fn engine_set_rows_with_duplicate_path_keeps_previous_rows() {
    let mut engine = tree_engine();
    let mut rows = file_rows();
    rows.push(RowRecord::new(9).with("path", "docs/a.txt"));

    assert_eq!(
        engine.set_rows(rows),
        Err(GridError::DuplicatePath {
            existing: RowId::Int(2),
            duplicate: RowId::Int(9),
        })
    );
    assert_eq!(engine.row_ids(), &ids(&[1, 2, 3, 4])[..]);
    assert_eq!(engine.row_counts().total, 5);
    assert_counts_consistent(&engine);
}

#[test]
fn engine_row_grouping() {
    let mut engine = GridEngine::new(GridOptions::new().with_default_expansion_depth(Some(0)));
    engine
        .set_columns([ColumnDef::string("kind"), ColumnDef::string("name")])
        .unwrap();
    engine
        .set_rows([
            RowRecord::new(1).with("kind", "fruit").with("name", "apple"),
            RowRecord::new(2).with("kind", "veg").with("name", "leek"),
            RowRecord::new(3).with("kind", "fruit").with("name", "pear"),
        ])
        .unwrap();
    engine.set_grouping(GroupingKind::row_grouping(["kind"]));

    let fruit = RowId::Group(vec!["fruit".into()]);
    let veg = RowId::Group(vec!["veg".into()]);
    assert_eq!(
        engine.columns().iter().next().map(|c| c.field.as_str()),
        Some(ROW_GROUP_FIELD)
    );
    assert_eq!(
        &*engine.visible_ordering(),
        &[fruit.clone(), RowId::Int(1), RowId::Int(3), veg.clone(), RowId::Int(2)][..]
    );

    engine
        .set_sort_model(SortModel::new([SortItem::desc(ROW_GROUP_FIELD)]))
        .unwrap();
    assert_eq!(engine.visible_ordering().first(), Some(&veg));

    engine.set_grouping(GroupingKind::None);
    assert!(!engine.columns().contains(ROW_GROUP_FIELD));
    assert!(engine.sort_model().is_empty());
    assert_eq!(engine.visible_ordering().len(), 3);
}

#[test]
fn engine_value_patch_refilters_without_rebuilding_tree() {
    let mut engine = brand_engine();
    engine
        .set_filter_model(FilterModel::new([item("brand", "contains", "u")]))
        .unwrap();
    assert_eq!(&*engine.visible_ordering(), &ids(&[3])[..]);
    let tree = engine.row_tree();

    engine
        .update_rows([RowUpdate::Upsert(RowRecord::new(1).with("brand", "Nuke"))])
        .unwrap();
    assert_eq!(&*engine.visible_ordering(), &ids(&[1, 3])[..]);
    assert!(Arc::ptr_eq(&tree, &engine.row_tree()));

    engine
        .update_rows([RowUpdate::Delete(RowId::Int(3))])
        .unwrap();
    assert_eq!(&*engine.visible_ordering(), &ids(&[1])[..]);
    assert_eq!(engine.row_counts().total, 2);
}

#[test]
fn engine_select_all_visible_selects_only_the_visible_ordering() {
    let mut engine = tree_engine();
    let src = RowId::Group(vec!["src".into()]);
    engine
        .set_filter_model(FilterModel::new([item("n", ">=", "30")]))
        .unwrap();
    // Everything is collapsed: docs shows for its match, src is a group.
    assert_eq!(&*engine.visible_ordering(), &[RowId::Int(1), src.clone()][..]);
    assert_eq!(engine.select_all_visible(), 1);
    assert_eq!(engine.selected_rows(), ids(&[1]));

    engine.set_row_expansion(&RowId::Int(1), true).unwrap();
    engine.set_row_expansion(&src, true).unwrap();
    assert_eq!(engine.select_all_visible(), 3);
    assert_eq!(engine.selected_rows(), ids(&[1, 3, 4]));
    assert!(!engine.is_row_selected(&RowId::Int(2)));
    assert!(!engine.is_row_selected(&src));
    for id in engine.selected_rows() {
        assert!(engine.visible_index(&id).is_some());
    }

    assert_eq!(
        engine.select_row(&src, true),
        Err(GridError::UnknownRow { id: src.clone() })
    );
    engine
        .update_rows([RowUpdate::Delete(RowId::Int(3))])
        .unwrap();
    assert_eq!(engine.selected_rows(), ids(&[1, 4]));
    assert!(engine.deselect_all());
}

#[test]
fn engine_pagination_limits_window_to_page() {
    let mut engine = GridEngine::new(GridOptions::new().with_pagination(Some(10)));
    engine.set_columns([ColumnDef::number("n")]).unwrap();
    engine
        .set_rows((0..25i64).map(|i| RowRecord::new(i).with("n", i)))
        .unwrap();
    engine.report_viewport_size(500, 800);
    assert_eq!(engine.page_count(), 3);

    engine.set_page(7);
    assert_eq!(engine.page(), 2);
    assert_eq!(engine.page_rows(), &ids(&[20, 21, 22, 23, 24])[..]);
    let window = engine.render_window().unwrap();
    assert_eq!(window.rows, Some(IndexSpan { first: 20, last: 24 }));
}

#[test]
fn engine_column_visibility_and_width_feed_the_window() {
    let mut engine = brand_engine();
    engine.report_viewport_size(500, 400);
    engine.set_column_width("brand", 300).unwrap();
    assert_eq!(engine.column_positions().total_width(), 400);
    engine.set_column_visibility("n", false).unwrap();
    assert_eq!(engine.visible_columns().count(), 1);
    assert_eq!(
        engine.render_window().unwrap().columns,
        Some(IndexSpan { first: 0, last: 0 })
    );
    assert_eq!(
        engine.set_column_visibility("gone", false),
        Err(GridError::UnknownColumn {
            field: "gone".into()
        })
    );
}

#[test]
fn engine_custom_column_preprocessor_recomputes_dependents() {
    let mut engine = brand_engine();
    engine.register_column_preprocessor("zz-extra", |mut columns, _| {
        columns.upsert(ColumnDef::string("extra"));
        columns
    });
    assert!(engine.columns().contains("extra"));
    engine
        .set_sort_model(SortModel::new([SortItem::asc("extra")]))
        .unwrap();

    assert!(engine.unregister_column_preprocessor("zz-extra"));
    assert!(!engine.columns().contains("extra"));
    assert!(engine.sort_model().is_empty());
    assert!(matches!(
        engine.last_error(),
        Some(GridError::UnknownSortField { .. })
    ));
}

#[test]
fn engine_counts_stay_consistent_under_random_intents() {
    let mut rng = Lcg::new(2024);
    let mut engine = GridEngine::new(
        GridOptions::new()
            .with_grouping(GroupingKind::tree_data(path_of))
            .with_default_expansion_depth(Some(0)),
    );
    engine.set_columns(file_columns()).unwrap();

    let mut paths: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    for i in 0..80i64 {
        let path = if i > 0 && rng.gen_bool() {
            let parent = &paths[rng.gen_range_usize(0, paths.len())];
            format!("{parent}/r{i}")
        } else {
            format!("g{}/r{i}", rng.gen_range_u64(0, 4))
        };
        paths.push(path.clone());
        rows.push(
            RowRecord::new(i)
                .with("path", path)
                .with("n", rng.gen_range_u64(0, 100) as i64),
        );
    }
    engine.set_rows(rows).unwrap();
    engine.report_viewport_size(600, 400);
    assert_counts_consistent(&engine);

    for _ in 0..200 {
        match rng.gen_range_u32(0, 5) {
            0 => {
                let nodes: Vec<RowId> = engine.row_tree().nodes().map(|n| n.id.clone()).collect();
                let id = &nodes[rng.gen_range_usize(0, nodes.len())];
                engine.set_row_expansion(id, rng.gen_bool()).unwrap();
            }
            1 => {
                let threshold = rng.gen_range_u64(0, 100).to_string();
                engine
                    .set_filter_model(FilterModel::new([item("n", ">", &threshold)]))
                    .unwrap();
            }
            2 => {
                let id = rng.gen_range_u64(0, 80) as i64;
                let n = rng.gen_range_u64(0, 100) as i64;
                engine
                    .update_rows([RowUpdate::Upsert(RowRecord::new(id).with("n", n))])
                    .unwrap();
            }
            3 => {
                engine.toggle_column_sort("n", false).unwrap();
            }
            _ => {
                let disable = rng.gen_bool();
                engine.update_options(|o| o.disable_children_filtering = disable);
            }
        }
        assert_counts_consistent(&engine);
        if let Some(window) = engine.render_window() {
            if let Some(rows) = window.rows {
                assert!(rows.last < engine.visible_ordering().len());
            }
        }
    }
}

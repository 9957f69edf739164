use std::collections::{HashMap, HashSet};

use crate::core::types::{SortOrder, SortableValue};
use crate::query::QueryParams;
use crate::search::params::FieldReference;

/// One flattened row: field name -> scalar. Rows own their keys and values,
/// so nothing in the pipeline borrows from shard storage.
pub type DocValues = HashMap<String, SortableValue>;

static NULL_VALUE: SortableValue = SortableValue::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerFunc {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Max,
    Min,
}

impl ReducerFunc {
    pub fn from_name(name: &str) -> Option<ReducerFunc> {
        let func = if name.eq_ignore_ascii_case("COUNT") {
            ReducerFunc::Count
        } else if name.eq_ignore_ascii_case("COUNT_DISTINCT") {
            ReducerFunc::CountDistinct
        } else if name.eq_ignore_ascii_case("SUM") {
            ReducerFunc::Sum
        } else if name.eq_ignore_ascii_case("AVG") {
            ReducerFunc::Avg
        } else if name.eq_ignore_ascii_case("MAX") {
            ReducerFunc::Max
        } else if name.eq_ignore_ascii_case("MIN") {
            ReducerFunc::Min
        } else {
            return None;
        };
        Some(func)
    }
}

/// (source field or empty, result field, function). COUNT takes no source,
/// everything else requires one; the grammar enforces that pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct Reducer {
    pub source: String,
    pub result_field: String,
    pub func: ReducerFunc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortParams {
    pub fields: Vec<(String, SortOrder)>,
    pub max: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Group { fields: Vec<String>, reducers: Vec<Reducer> },
    Sort(SortParams),
    Limit { offset: usize, num: usize },
}

#[derive(Debug, Clone, Default)]
pub struct AggregateParams {
    pub index: String,
    pub query: String,
    /// Accumulated leading LOAD clauses; may only appear before any step.
    pub load_fields: Option<Vec<FieldReference>>,
    pub steps: Vec<Step>,
    pub params: QueryParams,
}

#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub values: Vec<DocValues>,
    /// Final projection, in emission order.
    pub fields_to_print: Vec<String>,
}

/// Hashable canonical form of a scalar, used for group keys and
/// COUNT_DISTINCT (doubles compared by bit pattern, IEEE equality).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyValue {
    Null,
    Num(u64),
    Str(String),
}

fn key_of(value: Option<&SortableValue>) -> KeyValue {
    match value {
        None | Some(SortableValue::Null) => KeyValue::Null,
        Some(SortableValue::Double(d)) => KeyValue::Num(d.to_bits()),
        Some(SortableValue::Text(s)) => KeyValue::Str(s.clone()),
    }
}

fn restore(key: KeyValue) -> SortableValue {
    match key {
        KeyValue::Null => SortableValue::Null,
        KeyValue::Num(bits) => SortableValue::Double(f64::from_bits(bits)),
        KeyValue::Str(s) => SortableValue::Text(s),
    }
}

fn coerce_numeric(value: &SortableValue) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

fn reduce(reducer: &Reducer, rows: &[DocValues]) -> SortableValue {
    let present = || rows.iter().filter_map(|row| row.get(&reducer.source));
    match reducer.func {
        ReducerFunc::Count => SortableValue::Double(rows.len() as f64),
        ReducerFunc::CountDistinct => {
            let distinct: HashSet<KeyValue> = present().map(|v| key_of(Some(v))).collect();
            SortableValue::Double(distinct.len() as f64)
        }
        ReducerFunc::Sum => SortableValue::Double(present().map(coerce_numeric).sum()),
        ReducerFunc::Avg => {
            let values: Vec<f64> = present().map(coerce_numeric).collect();
            if values.is_empty() {
                SortableValue::Null
            } else {
                SortableValue::Double(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        ReducerFunc::Max => present()
            .max_by(|a, b| a.cmp_natural(b))
            .cloned()
            .unwrap_or(SortableValue::Null),
        ReducerFunc::Min => present()
            .min_by(|a, b| a.cmp_natural(b))
            .cloned()
            .unwrap_or(SortableValue::Null),
    }
}

fn apply_group(rows: Vec<DocValues>, fields: &[String], reducers: &[Reducer]) -> Vec<DocValues> {
    // Insertion-ordered partitions so the output is deterministic.
    let mut partitions: Vec<(Vec<KeyValue>, Vec<DocValues>)> = Vec::new();
    let mut lookup: HashMap<Vec<KeyValue>, usize> = HashMap::new();

    for row in rows {
        let key: Vec<KeyValue> = fields.iter().map(|f| key_of(row.get(f))).collect();
        match lookup.get(&key) {
            Some(&slot) => partitions[slot].1.push(row),
            None => {
                lookup.insert(key.clone(), partitions.len());
                partitions.push((key, vec![row]));
            }
        }
    }

    partitions
        .into_iter()
        .map(|(key, members)| {
            let mut out = DocValues::new();
            for (field, part) in fields.iter().zip(key) {
                out.insert(field.clone(), restore(part));
            }
            for reducer in reducers {
                out.insert(reducer.result_field.clone(), reduce(reducer, &members));
            }
            out
        })
        .collect()
}

fn apply_sort(rows: &mut Vec<DocValues>, params: &SortParams) {
    rows.sort_by(|l, r| {
        for (field, order) in &params.fields {
            let lv = l.get(field).unwrap_or(&NULL_VALUE);
            let rv = r.get(field).unwrap_or(&NULL_VALUE);
            let ord = match order {
                SortOrder::Asc => lv.cmp_natural(rv),
                SortOrder::Desc => lv.cmp_natural(rv).reverse(),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    if let Some(max) = params.max {
        rows.truncate(max);
    }
}

fn apply_limit(rows: Vec<DocValues>, offset: usize, num: usize) -> Vec<DocValues> {
    let start = offset.min(rows.len());
    let end = start.saturating_add(num).min(rows.len());
    rows.into_iter().skip(start).take(end - start).collect()
}

/// Run the declared steps over the flattened shard rows.
///
/// The projection starts as the loaded fields (deduplicated by output name);
/// a GROUP step replaces it with its group fields plus reducer outputs, SORT
/// and LIMIT preserve it.
pub fn process(
    mut rows: Vec<DocValues>,
    load_fields: &[String],
    steps: &[Step],
) -> AggregationResult {
    let mut fields_to_print: Vec<String> = Vec::new();
    for field in load_fields {
        if !fields_to_print.iter().any(|f| f == field) {
            fields_to_print.push(field.clone());
        }
    }

    for step in steps {
        match step {
            Step::Group { fields, reducers } => {
                rows = apply_group(rows, fields, reducers);
                fields_to_print = fields.clone();
                for reducer in reducers {
                    if !fields_to_print.iter().any(|f| *f == reducer.result_field) {
                        fields_to_print.push(reducer.result_field.clone());
                    }
                }
            }
            Step::Sort(params) => apply_sort(&mut rows, params),
            Step::Limit { offset, num } => rows = apply_limit(rows, *offset, *num),
        }
    }

    AggregationResult { values: rows, fields_to_print }
}

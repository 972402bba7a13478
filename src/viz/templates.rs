//! Deterministic Vega-Lite templates keyed on result shape.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};

use super::spec::{ChartSpec, VEGA_LITE_SCHEMA};
use crate::dataset::{ChartKind, QueryResult, Record, ResultShape};
use crate::sandbox::title_case;

/// Chart width in pixels.
pub const WIDTH: u32 = 600;
/// Chart height in pixels.
pub const HEIGHT: u32 = 400;

const PRIMARY: &str = "#4A90E2";
const SECONDARY: &str = "#50C878";
const MUTED: &str = "lightgray";

static SELECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Names of the two interaction selections attached to one chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selections {
    /// Interval selection on x.
    pub brush: String,
    /// Point selection on click.
    pub click: String,
}

/// Suffix for selection names; never repeats within a process.
pub(crate) fn selection_token() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let seq = SELECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{:x}", &uuid[..8], seq)
}

impl Selections {
    /// A fresh pair; no two calls in a process return the same names.
    pub fn fresh() -> Self {
        let token = selection_token();
        Self {
            brush: format!("brush_{}", token),
            click: format!("click_{}", token),
        }
    }

    fn params(&self) -> Value {
        json!([
            {
                "name": self.brush,
                "select": {"type": "interval", "encodings": ["x"]}
            },
            {
                "name": self.click,
                "select": {"type": "point", "on": "click", "toggle": true, "nearest": true}
            }
        ])
    }

    fn highlight(&self, color: &str) -> Value {
        json!({
            "condition": {"param": self.brush, "value": color},
            "value": MUTED
        })
    }

    fn emphasis(&self) -> Value {
        json!({
            "condition": {"param": self.click, "value": 1},
            "value": 0.6
        })
    }
}

fn axis(field: &str, field_type: &str) -> Value {
    json!({"field": field, "type": field_type, "title": title_case(field)})
}

fn document(description: String, rows: Vec<Value>, selections: &Selections, mark: Value, encoding: Value) -> Value {
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "description": description,
        "width": WIDTH,
        "height": HEIGHT,
        "data": {"values": rows},
        "params": selections.params(),
        "mark": mark,
        "encoding": encoding
    })
}

fn bar(category: &str, measure: &str, rows: Vec<Value>, selections: &Selections) -> Value {
    let mut x = axis(category, "ordinal");
    x["sort"] = Value::Null;
    x["axis"] = json!({"labelAngle": -45});
    let y = axis(measure, "quantitative");

    document(
        format!("{} by {}", title_case(measure), title_case(category)),
        rows,
        selections,
        json!({"type": "bar", "cursor": "pointer"}),
        json!({
            "x": x,
            "y": y,
            "color": selections.highlight(PRIMARY),
            "opacity": selections.emphasis(),
            "tooltip": [axis(category, "ordinal"), axis(measure, "quantitative")]
        }),
    )
}

fn line(index: &str, measure: &str, rows: Vec<Value>, selections: &Selections) -> Value {
    let mut x = axis(index, "quantitative");
    x["axis"] = json!({"format": "d"});
    let y = axis(measure, "quantitative");

    document(
        format!("{} by {}", title_case(measure), title_case(index)),
        rows,
        selections,
        json!({
            "type": "line",
            "strokeWidth": 2,
            "stroke": PRIMARY,
            "point": {"filled": true, "size": 80, "color": PRIMARY}
        }),
        json!({
            "x": x,
            "y": y,
            "opacity": selections.emphasis(),
            "tooltip": [
                {"field": index, "type": "quantitative", "title": title_case(index), "format": "d"},
                axis(measure, "quantitative")
            ]
        }),
    )
}

fn histogram(field: &str, rows: Vec<Value>, selections: &Selections) -> Value {
    document(
        format!("Distribution of {}", title_case(field)),
        rows,
        selections,
        json!({"type": "bar", "cursor": "pointer"}),
        json!({
            "x": {
                "field": field,
                "type": "quantitative",
                "bin": {"maxbins": 30},
                "title": title_case(field)
            },
            "y": {"aggregate": "count", "type": "quantitative", "title": "Number Of Papers"},
            "color": selections.highlight(PRIMARY),
            "opacity": selections.emphasis(),
            "tooltip": [
                {"field": field, "type": "quantitative", "bin": {"maxbins": 30}, "title": title_case(field)},
                {"aggregate": "count", "type": "quantitative", "title": "Number Of Papers"}
            ]
        }),
    )
}

fn binned(bucket: &str, count: &str, rows: Vec<Value>, selections: &Selections) -> Value {
    let mut x = axis(bucket, "ordinal");
    x["sort"] = Value::Null;
    let y = axis(count, "quantitative");

    document(
        format!("{} per {}", title_case(count), title_case(bucket)),
        rows,
        selections,
        json!({"type": "bar", "cursor": "pointer"}),
        json!({
            "x": x,
            "y": y,
            "color": selections.highlight(SECONDARY),
            "opacity": selections.emphasis(),
            "tooltip": [axis(bucket, "ordinal"), axis(count, "quantitative")]
        }),
    )
}

/// Build the template document for `shape` over `rows`.
pub fn for_shape(shape: &ResultShape, rows: Vec<Value>) -> ChartSpec {
    let selections = Selections::fresh();
    let value = match shape {
        ResultShape::Grouped { category, measure } => bar(category, measure, rows, &selections),
        ResultShape::Series { index, measure } => line(index, measure, rows, &selections),
        ResultShape::Distribution { field } => histogram(field, rows, &selections),
        ResultShape::Binned { bucket, count } => binned(bucket, count, rows, &selections),
    };
    ChartSpec::from_template(value)
}

/// Template chart for `result`, if its shape has one and agrees with `requested`.
pub fn render(result: &QueryResult, requested: Option<ChartKind>) -> Result<ChartSpec, String> {
    if result.rows.is_empty() {
        return Err("query returned no rows".to_string());
    }
    let shape = result
        .resolved_shape()
        .ok_or_else(|| "no template fits the result columns".to_string())?;
    let kind = shape.chart_kind();
    if let Some(requested) = requested {
        if requested != kind {
            return Err(format!(
                "{} chart requested but the result shape fits a {} chart",
                requested, kind
            ));
        }
    }
    let rows = result.rows.iter().cloned().map(Value::Object).collect();
    Ok(for_shape(&shape, rows))
}

/// Template chart inferred from loose rows.
pub fn auto_chart(rows: Vec<Value>) -> Option<ChartSpec> {
    let records: Vec<Record> = rows
        .iter()
        .filter_map(|row| row.as_object().cloned())
        .collect();
    let shape = ResultShape::infer(&records)?;
    Some(for_shape(&shape, rows))
}

/// Bare document with a mark, data and no encodings yet.
pub fn blank_chart(mark: Value, rows: Vec<Value>) -> Value {
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "width": WIDTH,
        "height": HEIGHT,
        "data": {"values": rows},
        "mark": mark,
        "encoding": {}
    })
}

//! The allow-listed helper functions available to chart scripts.

use std::cmp::Ordering;

use serde_json::{json, Map, Value};

use super::eval::Meter;
use crate::error::{SandboxError, SandboxResult};
use crate::viz::templates;

/// Every helper a script may call.
pub const HELPERS: &[&str] = &[
    "len",
    "take",
    "sort_by",
    "filter_eq",
    "filter_range",
    "pluck",
    "sum",
    "mean",
    "max",
    "min",
    "get",
    "set",
    "merge",
    "coalesce",
    "concat",
    "title_case",
    "palette",
    "chart",
    "encode",
    "auto_chart",
];

/// Most segments a `get`/`set` path may have.
const MAX_PATH_SEGMENTS: usize = 32;

/// Named colour schemes for `palette`.
const PALETTES: &[(&str, &[&str])] = &[
    ("default", &["#4A90E2", "#50C878", "#F5A623", "#D0021B", "#9013FE", "#7ED321"]),
    ("ocean", &["#03045E", "#0077B6", "#00B4D8", "#48CAE4", "#90E0EF", "#CAF0F8"]),
    ("sunset", &["#F94144", "#F3722C", "#F8961E", "#F9C74F", "#90BE6D", "#43AA8B"]),
    ("forest", &["#081C15", "#1B4332", "#2D6A4F", "#40916C", "#52B788", "#95D5B2"]),
    ("mono", &["#212529", "#495057", "#868E96", "#ADB5BD", "#DEE2E6", "#F8F9FA"]),
];

fn type_error(helper: &str, message: impl Into<String>) -> SandboxError {
    SandboxError::Type {
        context: format!("{}()", helper),
        message: message.into(),
    }
}

struct Args<'a> {
    helper: &'a str,
    values: Vec<Value>,
}

impl<'a> Args<'a> {
    fn arity(&self, min: usize, max: usize) -> SandboxResult<()> {
        let n = self.values.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(type_error(
                self.helper,
                format!("expected {} arguments, got {}", expected, n),
            ));
        }
        Ok(())
    }

    fn take(&mut self, i: usize) -> Value {
        self.values
            .get_mut(i)
            .map(Value::take)
            .unwrap_or(Value::Null)
    }

    fn rows(&mut self, i: usize) -> SandboxResult<Vec<Value>> {
        match self.take(i) {
            Value::Array(rows) => Ok(rows),
            other => Err(type_error(
                self.helper,
                format!("argument {} must be an array, got {}", i + 1, kind(&other)),
            )),
        }
    }

    fn string(&self, i: usize) -> SandboxResult<String> {
        match self.values.get(i) {
            Some(Value::String(s)) => Ok(s.clone()),
            other => Err(type_error(
                self.helper,
                format!(
                    "argument {} must be a string, got {}",
                    i + 1,
                    other.map(kind).unwrap_or("nothing")
                ),
            )),
        }
    }

    fn path(&self, i: usize) -> SandboxResult<String> {
        let path = self.string(i)?;
        let segments = path.split('.').count();
        if segments > MAX_PATH_SEGMENTS {
            return Err(type_error(
                self.helper,
                format!("path has {} segments, at most {} allowed", segments, MAX_PATH_SEGMENTS),
            ));
        }
        Ok(path)
    }

    fn optional_string(&self, i: usize) -> SandboxResult<Option<String>> {
        match self.values.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.string(i).map(Some),
        }
    }

    fn number(&self, i: usize) -> SandboxResult<Option<f64>> {
        match self.values.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(type_error(
                self.helper,
                format!("argument {} must be a number, got {}", i + 1, kind(other)),
            )),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Numbers in `rows`, read from `field` when given.
fn numbers(rows: &[Value], field: Option<&str>) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| match field {
            Some(f) => row.get(f),
            None => Some(row),
        })
        .filter_map(Value::as_f64)
        .collect()
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// Read a dotted path; numeric segments index arrays.
pub fn get_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write a dotted path, creating objects along the way.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) {
    let mut current = value;
    for segment in path.split('.') {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    *current = new_value;
}

/// Recursive merge; values from `overlay` win.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// `cited_by_count` -> `Cited By Count`.
pub fn title_case(text: &str) -> String {
    text.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn size_of(value: &Value) -> u64 {
    match value {
        Value::Array(items) => items.len() as u64,
        Value::Object(map) => map.len() as u64,
        _ => 1,
    }
}

/// Run helper `name`. Data helpers charge `meter` per row.
pub fn call(name: &str, values: Vec<Value>, meter: &mut Meter) -> SandboxResult<Value> {
    if !HELPERS.contains(&name) {
        return Err(SandboxError::UnknownHelper {
            name: name.to_string(),
        });
    }
    let cost: u64 = values.iter().map(size_of).sum();
    meter.charge(cost)?;

    let mut args = Args {
        helper: name,
        values,
    };

    match name {
        "len" => {
            args.arity(1, 1)?;
            match args.take(0) {
                Value::Array(items) => Ok(json!(items.len())),
                Value::Object(map) => Ok(json!(map.len())),
                Value::String(s) => Ok(json!(s.chars().count())),
                Value::Null => Ok(json!(0)),
                other => Err(type_error(name, format!("cannot take length of {}", kind(&other)))),
            }
        }
        "take" => {
            args.arity(2, 2)?;
            let n = args.number(1)?.unwrap_or(0.0).max(0.0) as usize;
            let mut rows = args.rows(0)?;
            rows.truncate(n);
            Ok(Value::Array(rows))
        }
        "sort_by" => {
            args.arity(2, 3)?;
            let field = args.string(1)?;
            let descending = match args.optional_string(2)?.as_deref() {
                None | Some("asc") => false,
                Some("desc") => true,
                Some(other) => {
                    return Err(type_error(name, format!("order must be \"asc\" or \"desc\", got \"{}\"", other)))
                }
            };
            let mut rows = args.rows(0)?;
            meter.charge(rows.len() as u64)?;
            rows.sort_by(|a, b| {
                let ord = compare(
                    a.get(&field).unwrap_or(&Value::Null),
                    b.get(&field).unwrap_or(&Value::Null),
                );
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
            Ok(Value::Array(rows))
        }
        "filter_eq" => {
            args.arity(3, 3)?;
            let field = args.string(1)?;
            let expected = args.take(2);
            let rows = args.rows(0)?;
            Ok(Value::Array(
                rows.into_iter()
                    .filter(|row| row.get(&field) == Some(&expected))
                    .collect(),
            ))
        }
        "filter_range" => {
            args.arity(4, 4)?;
            let field = args.string(1)?;
            let low = args.number(2)?;
            let high = args.number(3)?;
            let rows = args.rows(0)?;
            Ok(Value::Array(
                rows.into_iter()
                    .filter(|row| match row.get(&field).and_then(Value::as_f64) {
                        Some(v) => low.map_or(true, |l| v >= l) && high.map_or(true, |h| v <= h),
                        None => false,
                    })
                    .collect(),
            ))
        }
        "pluck" => {
            args.arity(2, 2)?;
            let field = args.string(1)?;
            let rows = args.rows(0)?;
            Ok(Value::Array(
                rows.iter()
                    .map(|row| row.get(&field).cloned().unwrap_or(Value::Null))
                    .collect(),
            ))
        }
        "sum" | "mean" | "max" | "min" => {
            args.arity(1, 2)?;
            let field = args.optional_string(1)?;
            let rows = args.rows(0)?;
            let values = numbers(&rows, field.as_deref());
            let result = match name {
                "sum" => Some(values.iter().sum::<f64>()),
                "mean" if values.is_empty() => None,
                "mean" => Some(values.iter().sum::<f64>() / values.len() as f64),
                "max" => values.iter().copied().reduce(f64::max),
                _ => values.iter().copied().reduce(f64::min),
            };
            Ok(result.map(number_value).unwrap_or(Value::Null))
        }
        "get" => {
            args.arity(2, 2)?;
            let path = args.path(1)?;
            let target = args.take(0);
            Ok(get_path(&target, &path).cloned().unwrap_or(Value::Null))
        }
        "set" => {
            args.arity(3, 3)?;
            let path = args.path(1)?;
            if path.is_empty() {
                return Err(type_error(name, "path must not be empty"));
            }
            let new_value = args.take(2);
            let mut target = args.take(0);
            set_path(&mut target, &path, new_value);
            Ok(target)
        }
        "merge" => {
            args.arity(2, 2)?;
            let overlay = args.take(1);
            Ok(deep_merge(args.take(0), overlay))
        }
        "coalesce" => {
            args.arity(1, 16)?;
            Ok(args
                .values
                .into_iter()
                .find(|v| !v.is_null())
                .unwrap_or(Value::Null))
        }
        "concat" => {
            args.arity(2, 2)?;
            match (args.take(0), args.take(1)) {
                (Value::Array(mut a), Value::Array(b)) => {
                    a.extend(b);
                    Ok(Value::Array(a))
                }
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                (a, b) => Err(type_error(
                    name,
                    format!("cannot concatenate {} and {}", kind(&a), kind(&b)),
                )),
            }
        }
        "title_case" => {
            args.arity(1, 1)?;
            Ok(Value::String(title_case(&args.string(0)?)))
        }
        "palette" => {
            args.arity(0, 1)?;
            let requested = args.optional_string(0)?.unwrap_or_else(|| "default".to_string());
            PALETTES
                .iter()
                .find(|(n, _)| *n == requested)
                .map(|(_, colors)| json!(colors))
                .ok_or_else(|| {
                    let known: Vec<&str> = PALETTES.iter().map(|(n, _)| *n).collect();
                    type_error(
                        name,
                        format!("unknown palette \"{}\"; known: {}", requested, known.join(", ")),
                    )
                })
        }
        "chart" => {
            args.arity(2, 2)?;
            let mark = args.take(0);
            if !(mark.is_string() || mark.is_object()) {
                return Err(type_error(name, "mark must be a string or an object"));
            }
            let rows = args.rows(1)?;
            Ok(templates::blank_chart(mark, rows))
        }
        "encode" => {
            args.arity(4, 4)?;
            let channel = args.string(1)?;
            let field = args.string(2)?;
            let field_type = args.string(3)?;
            if !["quantitative", "ordinal", "nominal", "temporal"].contains(&field_type.as_str()) {
                return Err(type_error(name, format!("unknown field type \"{}\"", field_type)));
            }
            let mut spec = args.take(0);
            set_path(
                &mut spec,
                &format!("encoding.{}", channel),
                json!({"field": field, "type": field_type, "title": title_case(&field)}),
            );
            Ok(spec)
        }
        "auto_chart" => {
            args.arity(1, 1)?;
            let rows = args.rows(0)?;
            templates::auto_chart(rows)
                .map(|spec| spec.into_value())
                .ok_or_else(|| type_error(name, "no chart template fits these rows"))
        }
        _ => Err(SandboxError::UnknownHelper {
            name: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn meter() -> Meter {
        Meter::new(10_000, Arc::new(AtomicBool::new(false)), 1000)
    }

    fn rows() -> Value {
        json!([
            {"year": 2020, "count": 5},
            {"year": 2021, "count": 9},
            {"year": 2022, "count": 2}
        ])
    }

    #[test]
    fn test_unknown_helper() {
        let err = call("read_file", vec![json!("/etc/passwd")], &mut meter()).unwrap_err();
        assert_eq!(
            err,
            SandboxError::UnknownHelper {
                name: "read_file".to_string()
            }
        );
    }

    #[test]
    fn test_sort_take_pluck() {
        let m = &mut meter();
        let sorted = call("sort_by", vec![rows(), json!("count"), json!("desc")], m).unwrap();
        let top = call("take", vec![sorted, json!(2)], m).unwrap();
        let years = call("pluck", vec![top, json!("year")], m).unwrap();
        assert_eq!(years, json!([2021, 2020]));
    }

    #[test]
    fn test_filters() {
        let m = &mut meter();
        let eq = call("filter_eq", vec![rows(), json!("year"), json!(2021)], m).unwrap();
        assert_eq!(call("len", vec![eq], m).unwrap(), json!(1));

        let range = call("filter_range", vec![rows(), json!("count"), json!(3), json!(null)], m).unwrap();
        assert_eq!(call("len", vec![range], m).unwrap(), json!(2));
    }

    #[test]
    fn test_aggregates() {
        let m = &mut meter();
        assert_eq!(call("sum", vec![rows(), json!("count")], m).unwrap(), json!(16));
        assert_eq!(call("max", vec![rows(), json!("count")], m).unwrap(), json!(9));
        assert_eq!(call("min", vec![rows(), json!("count")], m).unwrap(), json!(2));
        assert_eq!(call("mean", vec![json!([1, 2]), json!(null)], m).unwrap(), json!(1.5));
        assert_eq!(call("mean", vec![json!([]), json!("count")], m).unwrap(), json!(null));
    }

    #[test]
    fn test_paths() {
        let m = &mut meter();
        let spec = call("set", vec![json!({}), json!("config.axis.grid"), json!(false)], m).unwrap();
        assert_eq!(spec, json!({"config": {"axis": {"grid": false}}}));
        assert_eq!(
            call("get", vec![spec, json!("config.axis.grid")], m).unwrap(),
            json!(false)
        );
        assert_eq!(
            call("get", vec![rows(), json!("1.year")], m).unwrap(),
            json!(2021)
        );
    }

    #[test]
    fn test_merge_is_deep() {
        let merged = call(
            "merge",
            vec![json!({"a": {"b": 1, "c": 2}}), json!({"a": {"c": 3}})],
            &mut meter(),
        )
        .unwrap();
        assert_eq!(merged, json!({"a": {"b": 1, "c": 3}}));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("cited_by_count"), "Cited By Count");
        assert_eq!(title_case("year"), "Year");
    }

    #[test]
    fn test_palette() {
        let m = &mut meter();
        let ocean = call("palette", vec![json!("ocean")], m).unwrap();
        assert_eq!(ocean.as_array().unwrap().len(), 6);
        assert!(call("palette", vec![json!("neon")], m).is_err());
    }

    #[test]
    fn test_type_errors() {
        let m = &mut meter();
        assert!(matches!(
            call("take", vec![json!("abc"), json!(1)], m),
            Err(SandboxError::Type { .. })
        ));
        assert!(matches!(
            call("len", vec![], m),
            Err(SandboxError::Type { .. })
        ));
    }

    #[test]
    fn test_long_paths_rejected() {
        let m = &mut meter();
        let path = vec!["a"; 8000].join(".");
        let err = call("set", vec![json!({}), json!(path), json!(1)], m).unwrap_err();
        assert!(err.to_string().contains("8000 segments"), "{}", err);
        assert!(call("get", vec![json!({}), json!(path)], m).is_err());

        let ok = vec!["a"; 32].join(".");
        assert!(call("set", vec![json!({}), json!(ok), json!(1)], m).is_ok());
    }

    #[test]
    fn test_data_helpers_cost_per_row() {
        let mut small = Meter::new(3, Arc::new(AtomicBool::new(false)), 1000);
        let big: Vec<Value> = (0..10).map(|i| json!({"v": i})).collect();
        let err = call("sum", vec![Value::Array(big), json!("v")], &mut small).unwrap_err();
        assert_eq!(err, SandboxError::FuelExhausted { limit: 3 });
    }
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row.
pub type Record = Map<String, Value>;

/// Chart family suggested by a result's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Categorical grouping.
    Bar,
    /// Year-indexed series.
    Line,
    /// Numeric distribution.
    Histogram,
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChartKind::Bar => write!(f, "bar"),
            ChartKind::Line => write!(f, "line"),
            ChartKind::Histogram => write!(f, "histogram"),
        }
    }
}

impl std::str::FromStr for ChartKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bar" => Ok(ChartKind::Bar),
            "line" => Ok(ChartKind::Line),
            "histogram" => Ok(ChartKind::Histogram),
            other => Err(format!("Unknown chart type: {}", other)),
        }
    }
}

/// Which columns of a result play which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultShape {
    /// A count per category.
    Grouped {
        /// Categorical column.
        category: String,
        /// Numeric column.
        measure: String,
    },
    /// A value per year.
    Series {
        /// Year column.
        index: String,
        /// Numeric column.
        measure: String,
    },
    /// Raw rows whose numeric column is to be binned.
    Distribution {
        /// Numeric column.
        field: String,
    },
    /// Pre-binned counts.
    Binned {
        /// Bucket column.
        bucket: String,
        /// Count column.
        count: String,
    },
}

const CATEGORY_KEYS: &[&str] = &["display_name", "citation_range", "authorid", "fieldid", "name"];
const MEASURE_KEYS: &[&str] = &["paper_count", "count", "value"];
const DISTRIBUTION_KEYS: &[&str] = &["cited_by_count", "actual_patent_count", "patent_count"];

impl ResultShape {
    /// Chart family for this shape.
    pub fn chart_kind(&self) -> ChartKind {
        match self {
            ResultShape::Grouped { .. } => ChartKind::Bar,
            ResultShape::Series { .. } => ChartKind::Line,
            ResultShape::Distribution { .. } | ResultShape::Binned { .. } => ChartKind::Histogram,
        }
    }

    /// Columns the shape refers to.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            ResultShape::Grouped { category, measure } => vec![category, measure],
            ResultShape::Series { index, measure } => vec![index, measure],
            ResultShape::Distribution { field } => vec![field],
            ResultShape::Binned { bucket, count } => vec![bucket, count],
        }
    }

    /// Infer a shape from the rows alone. Looks only at the first row's keys
    /// and value types, so the answer depends on nothing but the data.
    pub fn infer(rows: &[Record]) -> Option<Self> {
        let first = rows.first()?;
        let is_number = |key: &str| first.get(key).map(Value::is_number).unwrap_or(false);
        let is_string = |key: &str| first.get(key).map(Value::is_string).unwrap_or(false);

        let measure = MEASURE_KEYS.iter().copied().find(|k| is_number(k));

        if let Some(measure) = measure {
            if let Some(category) = CATEGORY_KEYS.iter().copied().find(|k| is_string(k)) {
                return Some(ResultShape::Grouped {
                    category: category.to_string(),
                    measure: measure.to_string(),
                });
            }
            if is_number("year") {
                return Some(ResultShape::Series {
                    index: "year".to_string(),
                    measure: measure.to_string(),
                });
            }
            if !is_string("paperid") {
                if let Some(bucket) = first
                    .iter()
                    .find(|(k, v)| k.as_str() != measure && v.is_number())
                    .map(|(k, _)| k.clone())
                {
                    return Some(ResultShape::Binned {
                        bucket,
                        count: measure.to_string(),
                    });
                }
            }
        }

        DISTRIBUTION_KEYS
            .iter()
            .copied()
            .find(|k| is_number(k))
            .map(str::to_string)
            .or_else(|| {
                first
                    .iter()
                    .find(|(k, v)| k.as_str() != "year" && v.is_number())
                    .map(|(k, _)| k.clone())
            })
            .map(|field| ResultShape::Distribution { field })
    }
}

/// Output of a data-query tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Whether the query ran.
    pub success: bool,
    /// Tool that produced the result.
    pub tool: String,
    /// Result rows.
    pub rows: Vec<Record>,
    /// Aggregate statistics.
    pub stats: Map<String, Value>,
    /// Chart family derived from the shape.
    pub chart_type_hint: Option<ChartKind>,
    /// Column roles, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ResultShape>,
    /// One-sentence description of the stats.
    #[serde(default)]
    pub summary: String,
}

impl QueryResult {
    /// Build a successful result from typed rows.
    pub fn from_rows<T: Serialize>(
        tool: impl Into<String>,
        rows: &[T],
        stats: Map<String, Value>,
        shape: ResultShape,
    ) -> Result<Self, serde_json::Error> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if let Value::Object(record) = serde_json::to_value(row)? {
                records.push(record);
            }
        }

        Ok(Self {
            success: true,
            tool: tool.into(),
            rows: records,
            stats,
            chart_type_hint: Some(shape.chart_kind()),
            shape: Some(shape),
            summary: String::new(),
        })
    }

    /// Attach the summary sentence.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// The declared shape, or one inferred from the rows.
    pub fn resolved_shape(&self) -> Option<ResultShape> {
        self.shape.clone().or_else(|| ResultShape::infer(&self.rows))
    }

    /// Column names with their JSON types, from the first row.
    pub fn columns(&self) -> Vec<(String, &'static str)> {
        self.rows
            .first()
            .map(|row| {
                row.iter()
                    .map(|(k, v)| {
                        let ty = match v {
                            Value::Null => "null",
                            Value::Bool(_) => "boolean",
                            Value::Number(n) if n.is_f64() => "number",
                            Value::Number(_) => "integer",
                            Value::String(_) => "string",
                            Value::Array(_) => "array",
                            Value::Object(_) => "object",
                        };
                        (k.clone(), ty)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

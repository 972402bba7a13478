//! Parameter structs of the data-query tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dataset::TrendMetric;
use crate::error::ToolError;
use crate::tools::{check_min, check_not_blank, check_ordered, check_range, ToolParams};

const MIN_YEAR: i64 = 1900;
const MAX_YEAR: i64 = 2100;

fn check_year(field: &str, value: Option<i64>) -> Result<(), ToolError> {
    check_range(field, value, MIN_YEAR, MAX_YEAR)
}

fn default_paper_limit() -> i64 {
    100
}

fn default_author_limit() -> i64 {
    10
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PapersByFieldParams {
    /// Maximum fields to return
    #[schemars(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    /// Substring of the field name
    pub field_name: Option<String>,
}

impl ToolParams for PapersByFieldParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_range("limit", self.limit, 1, 100)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PapersByYearParams {
    /// Single publication year
    #[schemars(range(min = 1900, max = 2100))]
    pub year: Option<i64>,
    /// First year, inclusive
    #[schemars(range(min = 1900, max = 2100))]
    pub start_year: Option<i64>,
    /// Last year, inclusive
    #[schemars(range(min = 1900, max = 2100))]
    pub end_year: Option<i64>,
    /// Only papers from the current year minus this many years onwards
    #[schemars(range(min = 1, max = 100))]
    pub years: Option<i64>,
}

impl ToolParams for PapersByYearParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_year("year", self.year)?;
        check_year("start_year", self.start_year)?;
        check_year("end_year", self.end_year)?;
        check_range("years", self.years, 1, 100)?;
        check_ordered(("start_year", self.start_year), ("end_year", self.end_year))
    }
}

impl PapersByYearParams {
    /// Lower year bound once `years` is resolved against `current_year`.
    ///
    /// Both bounds apply when both are given, so the later one wins.
    pub fn effective_start_year(&self, current_year: i64) -> Option<i64> {
        let lookback = self.years.map(|n| current_year - n);
        match (self.start_year, lookback) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PapersByCitationsParams {
    /// Minimum citations, inclusive
    #[schemars(range(min = 0))]
    pub min_citations: Option<i64>,
    /// Maximum citations, inclusive
    #[schemars(range(min = 0))]
    pub max_citations: Option<i64>,
    /// Publication year
    #[schemars(range(min = 1900, max = 2100))]
    pub year: Option<i64>,
    /// Substring of a field name
    pub field: Option<String>,
}

impl ToolParams for PapersByCitationsParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_min("min_citations", self.min_citations, 0)?;
        check_min("max_citations", self.max_citations, 0)?;
        check_year("year", self.year)?;
        check_ordered(
            ("min_citations", self.min_citations),
            ("max_citations", self.max_citations),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PapersByPatentsParams {
    /// Minimum linked patents
    #[schemars(range(min = 0))]
    pub min_patents: Option<i64>,
    /// Only papers with (true) or without (false) patents
    pub has_patents: Option<bool>,
    /// Publication year
    #[schemars(range(min = 1900, max = 2100))]
    pub year: Option<i64>,
}

impl ToolParams for PapersByPatentsParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_min("min_patents", self.min_patents, 0)?;
        check_year("year", self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PapersAdvancedParams {
    /// Publication year
    #[schemars(range(min = 1900, max = 2100))]
    pub year: Option<i64>,
    /// First year, inclusive
    #[schemars(range(min = 1900, max = 2100))]
    pub start_year: Option<i64>,
    /// Last year, inclusive
    #[schemars(range(min = 1900, max = 2100))]
    pub end_year: Option<i64>,
    /// Substring of a field name
    pub field: Option<String>,
    /// Exact field names; any may match
    #[serde(default)]
    pub fields: Vec<String>,
    /// Minimum citations
    #[schemars(range(min = 0))]
    pub min_citations: Option<i64>,
    /// Maximum citations
    #[schemars(range(min = 0))]
    pub max_citations: Option<i64>,
    /// Minimum linked patents
    #[schemars(range(min = 0))]
    pub min_patents: Option<i64>,
    /// Require or exclude linked patents
    pub has_patents: Option<bool>,
    /// Author identifier
    pub author_id: Option<String>,
    /// Maximum papers to return
    #[serde(default = "default_paper_limit")]
    #[schemars(range(min = 1, max = 1000))]
    pub limit: i64,
}

impl ToolParams for PapersAdvancedParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_year("year", self.year)?;
        check_year("start_year", self.start_year)?;
        check_year("end_year", self.end_year)?;
        check_min("min_citations", self.min_citations, 0)?;
        check_min("max_citations", self.max_citations, 0)?;
        check_min("min_patents", self.min_patents, 0)?;
        check_range("limit", Some(self.limit), 1, 1000)?;
        check_ordered(("start_year", self.start_year), ("end_year", self.end_year))?;
        check_ordered(
            ("min_citations", self.min_citations),
            ("max_citations", self.max_citations),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TopAuthorsParams {
    /// Maximum authors
    #[serde(default = "default_author_limit")]
    #[schemars(range(min = 1, max = 100))]
    pub limit: i64,
    /// Minimum papers per author
    #[schemars(range(min = 1))]
    pub min_papers: Option<i64>,
    /// Substring of a field name
    pub field_filter: Option<String>,
}

impl ToolParams for TopAuthorsParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_range("limit", Some(self.limit), 1, 100)?;
        check_min("min_papers", self.min_papers, 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldTrendsParams {
    /// Substring of a field name
    pub field: Option<String>,
    /// First year, inclusive
    #[schemars(range(min = 1900, max = 2100))]
    pub start_year: Option<i64>,
    /// Last year, inclusive
    #[schemars(range(min = 1900, max = 2100))]
    pub end_year: Option<i64>,
    /// Metric per year: count, citations or patents
    #[serde(default)]
    pub metric: TrendMetric,
}

impl ToolParams for FieldTrendsParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_year("start_year", self.start_year)?;
        check_year("end_year", self.end_year)?;
        check_ordered(("start_year", self.start_year), ("end_year", self.end_year))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CitationPatternsParams {
    /// Publication year
    #[schemars(range(min = 1900, max = 2100))]
    pub year: Option<i64>,
    /// Substring of a field name
    pub field: Option<String>,
    /// Minimum citations
    #[schemars(range(min = 0))]
    pub min_citations: Option<i64>,
}

impl ToolParams for CitationPatternsParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_year("year", self.year)?;
        check_min("min_citations", self.min_citations, 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PatentDistributionParams {
    /// Publication year
    #[schemars(range(min = 1900, max = 2100))]
    pub year: Option<i64>,
    /// Substring of a field name
    pub field: Option<String>,
}

impl ToolParams for PatentDistributionParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_year("year", self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ClarificationParams {
    /// Question for the user
    pub question: String,
}

impl ToolParams for ClarificationParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_not_blank("question", &self.question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{input_schema, parse_arguments};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_years_counts_back_from_current_year() {
        let params: PapersByYearParams = parse_arguments(r#"{"years": 3}"#).unwrap();
        assert_eq!(params.effective_start_year(2026), Some(2023));
    }

    #[test]
    fn test_years_and_start_year_both_bound() {
        let params: PapersByYearParams =
            parse_arguments(r#"{"years": 10, "start_year": 2020}"#).unwrap();
        assert_eq!(params.effective_start_year(2026), Some(2020));

        let params: PapersByYearParams =
            parse_arguments(r#"{"years": 2, "start_year": 2000}"#).unwrap();
        assert_eq!(params.effective_start_year(2026), Some(2024));

        assert_eq!(PapersByYearParams::default().effective_start_year(2026), None);
    }

    #[test]
    fn test_old_lookback_name_rejected() {
        let err = parse_arguments::<PapersByYearParams>(r#"{"recent_years": 3}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field `recent_years`"), "{}", err);
    }

    #[test]
    fn test_year_out_of_range() {
        let err = parse_arguments::<PapersByCitationsParams>(r#"{"year": 1850}"#).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: year - must be >= 1900");
    }

    #[test]
    fn test_citation_range_ordered() {
        let err = parse_arguments::<PapersAdvancedParams>(
            r#"{"min_citations": 50, "max_citations": 5}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min_citations (50) must be <= max_citations (5)"));
    }

    #[test]
    fn test_defaults() {
        let advanced: PapersAdvancedParams = parse_arguments("{}").unwrap();
        assert_eq!(advanced.limit, 100);
        assert!(advanced.fields.is_empty());

        let authors: TopAuthorsParams = parse_arguments("").unwrap();
        assert_eq!(authors.limit, 10);

        let trends: FieldTrendsParams = parse_arguments(r#"{"metric": "citations"}"#).unwrap();
        assert_eq!(trends.metric, TrendMetric::Citations);
        assert_eq!(parse_arguments::<FieldTrendsParams>("{}").unwrap().metric, TrendMetric::Count);
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let err = parse_arguments::<FieldTrendsParams>(r#"{"metric": "impact"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown variant `impact`"), "{}", err);
    }

    #[test]
    fn test_blank_question_rejected() {
        assert!(parse_arguments::<ClarificationParams>(r#"{"question": " "}"#).is_err());
    }

    #[test]
    fn test_schema_carries_bounds_and_defaults() {
        let schema = input_schema::<PapersAdvancedParams>();
        let properties = &schema["properties"];

        assert_eq!(properties["year"]["type"], "integer");
        assert_eq!(properties["year"]["maximum"], json!(2100.0));
        assert_eq!(properties["limit"]["default"], json!(100));
        assert_eq!(properties["fields"]["type"], "array");
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["required"], json!([]));

        let clarification = input_schema::<ClarificationParams>();
        assert_eq!(clarification["required"], json!(["question"]));
    }
}

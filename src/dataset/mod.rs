//! Query engine over the research-paper dataset.
//!
//! [`QueryEngine`] is the read-only collaborator behind the data-query tools.
//! Limited queries are ordered by their metric, highest first, with ties
//! broken by insertion order so results are reproducible.

mod result;
mod sqlite;

pub use result::{ChartKind, QueryResult, Record, ResultShape};
pub use sqlite::SqliteQueryEngine;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// Paper-level filters shared by most queries. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperFilter {
    /// Exact publication year.
    pub year: Option<i64>,
    /// Inclusive lower year bound.
    pub start_year: Option<i64>,
    /// Inclusive upper year bound.
    pub end_year: Option<i64>,
    /// Case-insensitive substring of a field name.
    pub field: Option<String>,
    /// Exact field names; a paper matches if it belongs to any of them.
    pub fields: Vec<String>,
    /// Inclusive minimum citation count.
    pub min_citations: Option<i64>,
    /// Inclusive maximum citation count.
    pub max_citations: Option<i64>,
    /// Inclusive minimum number of linked patents.
    pub min_patents: Option<i64>,
    /// Require (true) or exclude (false) papers with linked patents.
    pub has_patents: Option<bool>,
    /// Papers written by this author.
    pub author_id: Option<String>,
}

/// Metric aggregated per year by [`QueryEngine::field_trend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    /// Number of papers.
    #[default]
    Count,
    /// Mean citation count.
    Citations,
    /// Mean linked-patent count.
    Patents,
}

impl std::fmt::Display for TrendMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendMetric::Count => write!(f, "count"),
            TrendMetric::Citations => write!(f, "citations"),
            TrendMetric::Patents => write!(f, "patents"),
        }
    }
}

impl std::str::FromStr for TrendMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(TrendMetric::Count),
            "citations" => Ok(TrendMetric::Citations),
            "patents" => Ok(TrendMetric::Patents),
            other => Err(format!("Unknown trend metric: {}", other)),
        }
    }
}

/// Papers per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FieldCount {
    /// Field identifier.
    pub fieldid: String,
    /// Field name.
    pub display_name: String,
    /// Distinct papers in the field.
    pub paper_count: i64,
}

/// Papers per year, as returned by the year filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct YearCount {
    /// Publication year.
    pub year: i64,
    /// Papers published that year.
    pub count: i64,
}

/// Papers per year over the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct YearPaperCount {
    /// Publication year.
    pub year: i64,
    /// Papers published that year.
    pub paper_count: i64,
}

/// A paper with its citation metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaperRow {
    /// Paper identifier.
    pub paperid: String,
    /// Publication year.
    pub year: i64,
    /// Document type.
    pub doctype: Option<String>,
    /// Citation count.
    pub cited_by_count: i64,
    /// Patent count reported by the source.
    pub patent_count: i64,
    /// Number of fields the paper belongs to.
    pub field_count: i64,
}

/// A paper with its linked-patent count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PatentPaperRow {
    /// Paper identifier.
    pub paperid: String,
    /// Publication year.
    pub year: i64,
    /// Document type.
    pub doctype: Option<String>,
    /// Citation count.
    pub cited_by_count: i64,
    /// Patents linked to the paper.
    pub actual_patent_count: i64,
}

/// Papers per author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthorCount {
    /// Author identifier.
    pub authorid: String,
    /// Distinct papers by the author.
    pub paper_count: i64,
}

/// One year of a trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrendPoint {
    /// Publication year.
    pub year: i64,
    /// Metric value for the year.
    pub value: f64,
}

/// Papers per citation bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CitationBucket {
    /// Bucket label: "0", "1-10", "11-50", "51-100" or "100+".
    pub citation_range: String,
    /// Papers in the bucket.
    pub paper_count: i64,
}

/// Papers per linked-patent count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PatentBucket {
    /// Number of linked patents.
    pub patent_count: i64,
    /// Papers with exactly that many patents.
    pub paper_count: i64,
}

/// Aggregates over every paper matching a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaperStats {
    /// Matching papers.
    pub total: i64,
    /// Mean citation count, rounded to 2 decimals.
    pub avg_citations: f64,
    /// Highest citation count.
    pub max_citations: i64,
    /// Matching papers with at least one linked patent.
    pub papers_with_patents: i64,
    /// Mean linked-patent count, rounded to 2 decimals.
    pub avg_patents: f64,
}

/// A limited result together with the number of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Rows up to the limit.
    pub rows: Vec<T>,
    /// Matching rows before the limit.
    pub total: i64,
}

/// Read-only access to the paper dataset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Papers per field, optionally restricted to fields whose name contains `field_name`.
    async fn papers_by_field(
        &self,
        field_name: Option<String>,
        limit: Option<i64>,
    ) -> StorageResult<Vec<FieldCount>>;

    /// Papers per year, ascending by year.
    async fn papers_by_year(&self, filter: &PaperFilter) -> StorageResult<Vec<YearCount>>;

    /// Aggregates over all matching papers, ignoring any limit.
    async fn paper_stats(&self, filter: &PaperFilter) -> StorageResult<PaperStats>;

    /// Matching papers, most cited first.
    async fn papers(&self, filter: &PaperFilter, limit: i64) -> StorageResult<Page<PaperRow>>;

    /// Matching papers with their linked-patent counts, most patents first.
    async fn papers_with_patents(
        &self,
        filter: &PaperFilter,
        limit: i64,
    ) -> StorageResult<Page<PatentPaperRow>>;

    /// Every field that has at least one paper.
    async fn available_fields(&self) -> StorageResult<Vec<FieldCount>>;

    /// Every year that has at least one paper.
    async fn available_years(&self) -> StorageResult<Vec<YearPaperCount>>;

    /// Most prolific authors.
    async fn top_authors(
        &self,
        filter: &PaperFilter,
        min_papers: Option<i64>,
        limit: i64,
    ) -> StorageResult<Vec<AuthorCount>>;

    /// One metric per year, ascending by year.
    async fn field_trend(
        &self,
        filter: &PaperFilter,
        metric: TrendMetric,
    ) -> StorageResult<Vec<TrendPoint>>;

    /// Papers per citation bucket, in bucket order.
    async fn citation_buckets(&self, filter: &PaperFilter) -> StorageResult<Vec<CitationBucket>>;

    /// Papers per linked-patent count, ascending.
    async fn patent_distribution(&self, filter: &PaperFilter) -> StorageResult<Vec<PatentBucket>>;
}

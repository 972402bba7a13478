//! The fixed catalogue of data-query tools.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use serde_json::{json, Map, Value};

use super::params::{
    CitationPatternsParams, ClarificationParams, FieldTrendsParams, PapersAdvancedParams,
    PapersByCitationsParams, PapersByFieldParams, PapersByPatentsParams, PapersByYearParams,
    PatentDistributionParams, TopAuthorsParams,
};
use crate::dataset::{PaperFilter, QueryEngine, QueryResult, ResultShape};
use crate::error::{RegistryError, ToolError};
use crate::tools::{
    text, Observation, ToolArguments, ToolDescriptor, ToolHandler, ToolRegistry, ToolSchema,
};

/// Row cap for paper-level queries that take no limit.
const PAPER_ROW_CAP: i64 = 100;

/// Names of the data tools, in catalogue order.
pub const DATA_TOOL_NAMES: [&str; 12] = [
    "query_papers_by_field",
    "query_papers_by_year",
    "query_papers_by_citations",
    "query_papers_by_patents",
    "query_papers_advanced",
    "explore_available_fields",
    "explore_available_years",
    "explore_top_authors",
    "analyze_field_trends",
    "analyze_citation_patterns",
    "analyze_patent_distribution",
    "ask_clarification_question",
];

/// Per-call context for data tools: the last successful result.
#[derive(Debug, Clone, Default)]
pub struct DataContext {
    /// Most recent successful query result.
    pub last_result: Option<QueryResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataTool {
    PapersByField,
    PapersByYear,
    PapersByCitations,
    PapersByPatents,
    PapersAdvanced,
    AvailableFields,
    AvailableYears,
    TopAuthors,
    FieldTrends,
    CitationPatterns,
    PatentDistribution,
    Clarification,
}

const ALL_TOOLS: [DataTool; 12] = [
    DataTool::PapersByField,
    DataTool::PapersByYear,
    DataTool::PapersByCitations,
    DataTool::PapersByPatents,
    DataTool::PapersAdvanced,
    DataTool::AvailableFields,
    DataTool::AvailableYears,
    DataTool::TopAuthors,
    DataTool::FieldTrends,
    DataTool::CitationPatterns,
    DataTool::PatentDistribution,
    DataTool::Clarification,
];

impl DataTool {
    fn name(self) -> &'static str {
        match self {
            DataTool::PapersByField => DATA_TOOL_NAMES[0],
            DataTool::PapersByYear => DATA_TOOL_NAMES[1],
            DataTool::PapersByCitations => DATA_TOOL_NAMES[2],
            DataTool::PapersByPatents => DATA_TOOL_NAMES[3],
            DataTool::PapersAdvanced => DATA_TOOL_NAMES[4],
            DataTool::AvailableFields => DATA_TOOL_NAMES[5],
            DataTool::AvailableYears => DATA_TOOL_NAMES[6],
            DataTool::TopAuthors => DATA_TOOL_NAMES[7],
            DataTool::FieldTrends => DATA_TOOL_NAMES[8],
            DataTool::CitationPatterns => DATA_TOOL_NAMES[9],
            DataTool::PatentDistribution => DATA_TOOL_NAMES[10],
            DataTool::Clarification => DATA_TOOL_NAMES[11],
        }
    }

    fn description(self) -> &'static str {
        match self {
            DataTool::PapersByField => "Paper counts per research field, largest first. Use limit for top-N questions.",
            DataTool::PapersByYear => "Paper counts per publication year, for one year, a year range or the most recent N years.",
            DataTool::PapersByCitations => "Papers within a citation range, most cited first (at most 100 rows).",
            DataTool::PapersByPatents => "Papers with their linked-patent counts, most patents first (at most 100 rows).",
            DataTool::PapersAdvanced => "Papers matching any combination of year, field, citation, patent and author filters.",
            DataTool::AvailableFields => "Every research field in the dataset with its paper count.",
            DataTool::AvailableYears => "Every publication year in the dataset with its paper count.",
            DataTool::TopAuthors => "Most prolific authors, optionally within a field.",
            DataTool::FieldTrends => "Per-year paper count, mean citations or mean patents, optionally for one field.",
            DataTool::CitationPatterns => "Papers per citation bucket (0, 1-10, 11-50, 51-100, 100+).",
            DataTool::PatentDistribution => "Papers per linked-patent count.",
            DataTool::Clarification => "Ask the user a question when the request is too ambiguous to query. Ends the analysis.",
        }
    }

    fn schema(self) -> ToolSchema {
        match self {
            DataTool::PapersByField => ToolSchema::of::<PapersByFieldParams>(),
            DataTool::PapersByYear => ToolSchema::of::<PapersByYearParams>(),
            DataTool::PapersByCitations => ToolSchema::of::<PapersByCitationsParams>(),
            DataTool::PapersByPatents => ToolSchema::of::<PapersByPatentsParams>(),
            DataTool::PapersAdvanced => ToolSchema::of::<PapersAdvancedParams>(),
            DataTool::AvailableFields | DataTool::AvailableYears => ToolSchema::empty(),
            DataTool::TopAuthors => ToolSchema::of::<TopAuthorsParams>(),
            DataTool::FieldTrends => ToolSchema::of::<FieldTrendsParams>(),
            DataTool::CitationPatterns => ToolSchema::of::<CitationPatternsParams>(),
            DataTool::PatentDistribution => ToolSchema::of::<PatentDistributionParams>(),
            DataTool::Clarification => ToolSchema::of::<ClarificationParams>(),
        }
    }
}

struct DataToolHandler {
    tool: DataTool,
    engine: Arc<dyn QueryEngine>,
}

fn stats(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl DataToolHandler {
    async fn query(&self, args: ToolArguments) -> Result<QueryResult, ToolError> {
        let name = self.tool.name();
        let engine = self.engine.as_ref();

        let result = match self.tool {
            DataTool::PapersByField => {
                let params: PapersByFieldParams = args.into_params()?;
                let rows = engine
                    .papers_by_field(text(&params.field_name), params.limit)
                    .await?;
                let total: i64 = rows.iter().map(|r| r.paper_count).sum();
                let top = rows.first().map(|r| r.display_name.clone());
                let summary = match &top {
                    Some(top) => format!(
                        "Found {} research fields with {} total papers. Top field: {}.",
                        rows.len(),
                        total,
                        top
                    ),
                    None => "No research fields matched.".to_string(),
                };
                QueryResult::from_rows(
                    name,
                    &rows,
                    stats(json!({"total_fields": rows.len(), "total_papers": total, "top_field": top})),
                    ResultShape::Grouped {
                        category: "display_name".to_string(),
                        measure: "paper_count".to_string(),
                    },
                )?
                .with_summary(summary)
            }
            DataTool::PapersByYear => {
                let params: PapersByYearParams = args.into_params()?;
                let filter = PaperFilter {
                    year: params.year,
                    start_year: params.effective_start_year(chrono::Utc::now().year() as i64),
                    end_year: params.end_year,
                    ..Default::default()
                };
                let rows = engine.papers_by_year(&filter).await?;
                let total: i64 = rows.iter().map(|r| r.count).sum();
                let avg = if rows.is_empty() {
                    0.0
                } else {
                    round2(total as f64 / rows.len() as f64)
                };
                let max_year = rows
                    .iter()
                    .fold(None::<&crate::dataset::YearCount>, |best, r| match best {
                        Some(b) if b.count >= r.count => Some(b),
                        _ => Some(r),
                    })
                    .map(|r| r.year);
                QueryResult::from_rows(
                    name,
                    &rows,
                    stats(json!({
                        "total_years": rows.len(),
                        "total_papers": total,
                        "avg_per_year": avg,
                        "max_year": max_year
                    })),
                    ResultShape::Series {
                        index: "year".to_string(),
                        measure: "count".to_string(),
                    },
                )?
                .with_summary(format!(
                    "Analyzed {} years with {} total papers. Average: {:.1} papers per year.",
                    rows.len(),
                    total,
                    avg
                ))
            }
            DataTool::PapersByCitations => {
                let params: PapersByCitationsParams = args.into_params()?;
                let filter = PaperFilter {
                    min_citations: params.min_citations,
                    max_citations: params.max_citations,
                    year: params.year,
                    field: text(&params.field),
                    ..Default::default()
                };
                let page = engine.papers(&filter, PAPER_ROW_CAP).await?;
                let agg = engine.paper_stats(&filter).await?;
                QueryResult::from_rows(
                    name,
                    &page.rows,
                    stats(json!({
                        "total_papers": page.total,
                        "avg_citations": agg.avg_citations,
                        "max_citations": agg.max_citations
                    })),
                    ResultShape::Distribution {
                        field: "cited_by_count".to_string(),
                    },
                )?
                .with_summary(format!(
                    "Found {} papers (showing {}). Average citations: {:.2}, maximum: {}.",
                    page.total,
                    page.rows.len(),
                    agg.avg_citations,
                    agg.max_citations
                ))
            }
            DataTool::PapersByPatents => {
                let params: PapersByPatentsParams = args.into_params()?;
                let filter = PaperFilter {
                    min_patents: params.min_patents,
                    has_patents: params.has_patents,
                    year: params.year,
                    ..Default::default()
                };
                let page = engine.papers_with_patents(&filter, PAPER_ROW_CAP).await?;
                let agg = engine.paper_stats(&filter).await?;
                QueryResult::from_rows(
                    name,
                    &page.rows,
                    stats(json!({
                        "total_papers": page.total,
                        "papers_with_patents": agg.papers_with_patents,
                        "avg_patents": agg.avg_patents
                    })),
                    ResultShape::Distribution {
                        field: "actual_patent_count".to_string(),
                    },
                )?
                .with_summary(format!(
                    "{} papers matched; {} have patents. Average: {:.2} patents per paper.",
                    page.total, agg.papers_with_patents, agg.avg_patents
                ))
            }
            DataTool::PapersAdvanced => {
                let params: PapersAdvancedParams = args.into_params()?;
                let filter = PaperFilter {
                    year: params.year,
                    start_year: params.start_year,
                    end_year: params.end_year,
                    field: text(&params.field),
                    fields: params.fields,
                    min_citations: params.min_citations,
                    max_citations: params.max_citations,
                    min_patents: params.min_patents,
                    has_patents: params.has_patents,
                    author_id: text(&params.author_id),
                };
                let page = engine.papers(&filter, params.limit).await?;
                QueryResult::from_rows(
                    name,
                    &page.rows,
                    stats(json!({"total_papers": page.total, "sample_size": page.rows.len()})),
                    ResultShape::Distribution {
                        field: "cited_by_count".to_string(),
                    },
                )?
                .with_summary(format!(
                    "Found {} matching papers; returning {}.",
                    page.total,
                    page.rows.len()
                ))
            }
            DataTool::AvailableFields => {
                let rows = engine.available_fields().await?;
                let total: i64 = rows.iter().map(|r| r.paper_count).sum();
                QueryResult::from_rows(
                    name,
                    &rows,
                    stats(json!({"total_fields": rows.len(), "total_papers": total})),
                    ResultShape::Grouped {
                        category: "display_name".to_string(),
                        measure: "paper_count".to_string(),
                    },
                )?
                .with_summary(format!("{} research fields are available.", rows.len()))
            }
            DataTool::AvailableYears => {
                let rows = engine.available_years().await?;
                let total: i64 = rows.iter().map(|r| r.paper_count).sum();
                let summary = match (rows.first(), rows.last()) {
                    (Some(first), Some(last)) => format!(
                        "Data covers {} years ({}-{}) with {} papers.",
                        rows.len(),
                        first.year,
                        last.year,
                        total
                    ),
                    _ => "The dataset has no papers.".to_string(),
                };
                QueryResult::from_rows(
                    name,
                    &rows,
                    stats(json!({"total_years": rows.len(), "total_papers": total})),
                    ResultShape::Series {
                        index: "year".to_string(),
                        measure: "paper_count".to_string(),
                    },
                )?
                .with_summary(summary)
            }
            DataTool::TopAuthors => {
                let params: TopAuthorsParams = args.into_params()?;
                let filter = PaperFilter {
                    field: text(&params.field_filter),
                    ..Default::default()
                };
                let rows = engine
                    .top_authors(&filter, params.min_papers, params.limit)
                    .await?;
                let top = rows.first().map(|r| r.paper_count).unwrap_or(0);
                QueryResult::from_rows(
                    name,
                    &rows,
                    stats(json!({"total_authors": rows.len(), "top_author_papers": top})),
                    ResultShape::Grouped {
                        category: "authorid".to_string(),
                        measure: "paper_count".to_string(),
                    },
                )?
                .with_summary(format!(
                    "Listed {} authors; the most prolific has {} papers.",
                    rows.len(),
                    top
                ))
            }
            DataTool::FieldTrends => {
                let params: FieldTrendsParams = args.into_params()?;
                let filter = PaperFilter {
                    field: text(&params.field),
                    start_year: params.start_year,
                    end_year: params.end_year,
                    ..Default::default()
                };
                let metric = params.metric;
                let rows = engine.field_trend(&filter, metric).await?;
                QueryResult::from_rows(
                    name,
                    &rows,
                    stats(json!({"total_years": rows.len(), "metric": metric.to_string()})),
                    ResultShape::Series {
                        index: "year".to_string(),
                        measure: "value".to_string(),
                    },
                )?
                .with_summary(format!("Trend of {} over {} years.", metric, rows.len()))
            }
            DataTool::CitationPatterns => {
                let params: CitationPatternsParams = args.into_params()?;
                let filter = PaperFilter {
                    year: params.year,
                    field: text(&params.field),
                    min_citations: params.min_citations,
                    ..Default::default()
                };
                let rows = engine.citation_buckets(&filter).await?;
                let total: i64 = rows.iter().map(|r| r.paper_count).sum();
                QueryResult::from_rows(
                    name,
                    &rows,
                    stats(json!({"total_papers": total})),
                    ResultShape::Grouped {
                        category: "citation_range".to_string(),
                        measure: "paper_count".to_string(),
                    },
                )?
                .with_summary(format!(
                    "{} papers across {} citation ranges.",
                    total,
                    rows.len()
                ))
            }
            DataTool::PatentDistribution => {
                let params: PatentDistributionParams = args.into_params()?;
                let filter = PaperFilter {
                    year: params.year,
                    field: text(&params.field),
                    ..Default::default()
                };
                let rows = engine.patent_distribution(&filter).await?;
                let total: i64 = rows.iter().map(|r| r.paper_count).sum();
                let with_patents: i64 = rows
                    .iter()
                    .filter(|r| r.patent_count > 0)
                    .map(|r| r.paper_count)
                    .sum();
                let patents: i64 = rows.iter().map(|r| r.patent_count * r.paper_count).sum();
                let avg = if total > 0 {
                    round2(patents as f64 / total as f64)
                } else {
                    0.0
                };
                QueryResult::from_rows(
                    name,
                    &rows,
                    stats(json!({
                        "total_papers": total,
                        "papers_with_patents": with_patents,
                        "avg_patents": avg
                    })),
                    ResultShape::Binned {
                        bucket: "patent_count".to_string(),
                        count: "paper_count".to_string(),
                    },
                )?
                .with_summary(format!(
                    "Patent distribution: {} papers analyzed. {} papers have patents. Average: {:.2} patents per paper.",
                    total, with_patents, avg
                ))
            }
            DataTool::Clarification => {
                return Err(ToolError::Execution {
                    message: "clarification is not a query".to_string(),
                })
            }
        };

        Ok(result)
    }
}

#[async_trait]
impl ToolHandler<DataContext> for DataToolHandler {
    async fn call(
        &self,
        ctx: &mut DataContext,
        args: ToolArguments,
    ) -> Result<Observation, ToolError> {
        if self.tool == DataTool::Clarification {
            let params: ClarificationParams = args.into_params()?;
            return Ok(Observation::clarification(params.question.trim().to_string()));
        }

        let result = self.query(args).await?;
        let observation = Observation::from_query(&result);
        ctx.last_result = Some(result);
        Ok(observation)
    }
}

/// Registry holding the twelve data tools bound to `engine`.
pub fn data_tool_registry(
    engine: Arc<dyn QueryEngine>,
    timeout: Duration,
) -> Result<ToolRegistry<DataContext>, RegistryError> {
    let mut registry = ToolRegistry::new(timeout);
    for tool in ALL_TOOLS {
        registry.register(ToolDescriptor::new(
            tool.name(),
            tool.description(),
            tool.schema(),
            Arc::new(DataToolHandler {
                tool,
                engine: engine.clone(),
            }),
        ))?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FieldCount, MockQueryEngine, Page, PaperStats, PatentBucket, YearCount};
    use crate::error::StorageError;
    use crate::dataset::ChartKind;
    use pretty_assertions::assert_eq;

    fn registry(engine: MockQueryEngine) -> ToolRegistry<DataContext> {
        data_tool_registry(Arc::new(engine), Duration::from_secs(5)).unwrap()
    }

    fn field(id: &str, name: &str, count: i64) -> FieldCount {
        FieldCount {
            fieldid: id.to_string(),
            display_name: name.to_string(),
            paper_count: count,
        }
    }

    #[test]
    fn test_catalogue_has_twelve_tools() {
        let registry = registry(MockQueryEngine::new());
        assert_eq!(registry.names(), DATA_TOOL_NAMES.to_vec());
    }

    #[tokio::test]
    async fn test_papers_by_field_stats() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_papers_by_field()
            .withf(|name, limit| name.is_none() && *limit == Some(2))
            .times(1)
            .returning(|_, _| Ok(vec![field("F1", "Medicine", 7), field("F2", "Biology", 3)]));

        let mut ctx = DataContext::default();
        let obs = registry(engine)
            .dispatch(&mut ctx, "query_papers_by_field", r#"{"limit": 2}"#)
            .await;

        assert!(obs.success);
        assert_eq!(obs.chart_type, Some(ChartKind::Bar));
        let stats = obs.stats.unwrap();
        assert_eq!(stats["total_fields"], 2);
        assert_eq!(stats["total_papers"], 10);
        assert_eq!(stats["top_field"], "Medicine");

        let result = ctx.last_result.unwrap();
        assert_eq!(
            result.summary,
            "Found 2 research fields with 10 total papers. Top field: Medicine."
        );
    }

    #[tokio::test]
    async fn test_negative_limit_never_queries() {
        let engine = MockQueryEngine::new();
        let mut ctx = DataContext::default();
        let obs = registry(engine)
            .dispatch(&mut ctx, "query_papers_by_field", r#"{"limit": -5}"#)
            .await;

        assert!(!obs.success);
        assert!(obs.error.unwrap().contains("limit"));
        assert!(ctx.last_result.is_none());
    }

    #[tokio::test]
    async fn test_year_stats_pick_busiest_year() {
        let mut engine = MockQueryEngine::new();
        engine.expect_papers_by_year().returning(|_| {
            Ok(vec![
                YearCount { year: 2020, count: 2 },
                YearCount { year: 2021, count: 5 },
                YearCount { year: 2022, count: 5 },
            ])
        });

        let mut ctx = DataContext::default();
        let obs = registry(engine)
            .dispatch(&mut ctx, "query_papers_by_year", "{}")
            .await;

        let stats = obs.stats.unwrap();
        assert_eq!(stats["max_year"], 2021);
        assert_eq!(stats["avg_per_year"], 4.0);
        assert_eq!(obs.chart_type, Some(ChartKind::Line));
    }

    #[tokio::test]
    async fn test_years_looks_back_from_current_year() {
        let current = chrono::Utc::now().year() as i64;
        let mut engine = MockQueryEngine::new();
        engine
            .expect_papers_by_year()
            .withf(move |f| f.start_year == Some(current - 3) && f.end_year.is_none())
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let obs = registry(engine)
            .dispatch(&mut DataContext::default(), "query_papers_by_year", r#"{"years": 3}"#)
            .await;
        assert!(obs.success, "{:?}", obs.error);
    }

    #[test]
    fn test_catalogue_schemas_are_generated() {
        let catalogue = registry(MockQueryEngine::new()).catalogue();
        let by_year = catalogue
            .iter()
            .find(|t| t["name"] == "query_papers_by_year")
            .unwrap();
        let properties = &by_year["inputSchema"]["properties"];

        assert_eq!(properties["years"]["type"], "integer");
        assert_eq!(properties["start_year"]["minimum"], json!(1900.0));
        assert!(properties.get("recent_years").is_none());
        for tool in &catalogue {
            assert_eq!(tool["inputSchema"]["additionalProperties"], json!(false), "{}", tool["name"]);
        }
    }

    #[tokio::test]
    async fn test_advanced_query_passes_typed_filters() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_papers()
            .withf(|f, limit| {
                f.fields == vec!["Biology".to_string()]
                    && f.has_patents == Some(true)
                    && f.author_id.is_none()
                    && *limit == 100
            })
            .times(1)
            .returning(|_, _| Ok(Page { rows: Vec::new(), total: 0 }));

        let obs = registry(engine)
            .dispatch(
                &mut DataContext::default(),
                "query_papers_advanced",
                r#"{"fields": ["Biology"], "has_patents": true, "author_id": "  "}"#,
            )
            .await;
        assert!(obs.success, "{:?}", obs.error);
    }

    #[tokio::test]
    async fn test_citation_query_uses_full_stats() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_papers()
            .withf(|f, limit| f.min_citations == Some(10) && *limit == 100)
            .returning(|_, _| Ok(Page { rows: Vec::new(), total: 250 }));
        engine.expect_paper_stats().returning(|_| {
            Ok(PaperStats {
                total: 250,
                avg_citations: 31.5,
                max_citations: 900,
                papers_with_patents: 4,
                avg_patents: 0.1,
            })
        });

        let obs = registry(engine)
            .dispatch(
                &mut DataContext::default(),
                "query_papers_by_citations",
                r#"{"min_citations": 10}"#,
            )
            .await;

        let stats = obs.stats.unwrap();
        assert_eq!(stats["total_papers"], 250);
        assert_eq!(stats["max_citations"], 900);
        assert_eq!(obs.chart_type, Some(ChartKind::Histogram));
    }

    #[tokio::test]
    async fn test_patent_distribution_average() {
        let mut engine = MockQueryEngine::new();
        engine.expect_patent_distribution().returning(|_| {
            Ok(vec![
                PatentBucket { patent_count: 0, paper_count: 6 },
                PatentBucket { patent_count: 2, paper_count: 2 },
            ])
        });

        let obs = registry(engine)
            .dispatch(&mut DataContext::default(), "analyze_patent_distribution", "")
            .await;

        let stats = obs.stats.unwrap();
        assert_eq!(stats["total_papers"], 8);
        assert_eq!(stats["papers_with_patents"], 2);
        assert_eq!(stats["avg_patents"], 0.5);
    }

    #[tokio::test]
    async fn test_storage_failure_is_observation() {
        let mut engine = MockQueryEngine::new();
        engine.expect_available_fields().returning(|| {
            Err(StorageError::Query {
                message: "disk I/O error".to_string(),
            })
        });

        let obs = registry(engine)
            .dispatch(&mut DataContext::default(), "explore_available_fields", "{}")
            .await;

        assert!(!obs.success);
        assert!(obs.error.unwrap().contains("disk I/O error"));
    }

    #[tokio::test]
    async fn test_clarification_observation() {
        let obs = registry(MockQueryEngine::new())
            .dispatch(
                &mut DataContext::default(),
                "ask_clarification_question",
                r#"{"question": "Which field do you mean?"}"#,
            )
            .await;

        assert!(obs.needs_clarification);
        assert_eq!(obs.question.as_deref(), Some("Which field do you mean?"));
    }

    #[tokio::test]
    async fn test_unknown_metric_rejected() {
        let obs = registry(MockQueryEngine::new())
            .dispatch(
                &mut DataContext::default(),
                "analyze_field_trends",
                r#"{"metric": "impact"}"#,
            )
            .await;
        assert!(!obs.success);
        assert!(obs.error.unwrap().contains("unknown variant `impact`"));
    }
}

//! Integration tests for the SQLite dataset: import, queries and the audit log.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use mcp_langbase_dataviz::config::DatabaseConfig;
use mcp_langbase_dataviz::dataset::{PaperFilter, QueryEngine, SqliteQueryEngine, TrendMetric};
use mcp_langbase_dataviz::error::StorageError;
use mcp_langbase_dataviz::storage::{DatasetBundle, Invocation, SqliteStorage, Storage};

use common::{sample_bundle, seeded_storage, write_bundle};

#[cfg(test)]
mod import_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_import_from_directory_into_file_database() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path());

        let config = DatabaseConfig {
            path: dir.path().join("db").join("papers.db"),
            max_connections: 2,
        };
        let storage = SqliteStorage::new(&config).await.unwrap();
        let bundle = DatasetBundle::from_dir(dir.path()).unwrap();
        let summary = storage.import_dataset(&bundle).await.unwrap();

        assert_eq!(summary.papers, 5);
        assert_eq!(summary.fields, 3);
        assert_eq!(summary.paper_fields, 6);
        assert_eq!(summary.paper_authors, 6);
        assert_eq!(summary.patent_links, 3);
        assert!(config.path.exists());

        let engine = SqliteQueryEngine::new(&storage);
        assert_eq!(engine.available_years().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_import_missing_papers_file() {
        let dir = TempDir::new().unwrap();
        let err = DatasetBundle::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Import { ref file, .. } if file == "papers.json"));
    }

    #[tokio::test]
    async fn test_reimport_replaces_papers() {
        let storage = seeded_storage().await;
        let mut bundle = sample_bundle();
        bundle.papers.truncate(1);
        bundle.papers[0].cited_by_count = 500;
        bundle.fields.clear();
        bundle.paper_fields.clear();
        bundle.paper_authors.clear();
        bundle.patent_links.clear();
        storage.import_dataset(&bundle).await.unwrap();

        let engine = SqliteQueryEngine::new(&storage);
        let stats = engine.paper_stats(&PaperFilter::default()).await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.max_citations, 500);
    }
}

#[cfg(test)]
mod query_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn engine() -> SqliteQueryEngine {
        SqliteQueryEngine::new(&seeded_storage().await)
    }

    #[tokio::test]
    async fn test_papers_by_field_ordered_by_count() {
        let rows = engine().await.papers_by_field(None, None).await.unwrap();
        let names: Vec<(&str, i64)> = rows
            .iter()
            .map(|r| (r.display_name.as_str(), r.paper_count))
            .collect();
        assert_eq!(
            names,
            vec![("Computer Science", 3), ("Biology", 2), ("Physics", 1)]
        );
    }

    #[tokio::test]
    async fn test_papers_by_field_limit_and_name_filter() {
        let engine = engine().await;

        let top = engine.papers_by_field(None, Some(2)).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].display_name, "Computer Science");

        let bio = engine
            .papers_by_field(Some("bio".to_string()), None)
            .await
            .unwrap();
        assert_eq!(bio.len(), 1);
        assert_eq!(bio[0].display_name, "Biology");

        let wildcard = engine
            .papers_by_field(Some("%".to_string()), None)
            .await
            .unwrap();
        assert!(wildcard.is_empty());
    }

    #[tokio::test]
    async fn test_papers_by_year_and_range() {
        let engine = engine().await;

        let all = engine.papers_by_year(&PaperFilter::default()).await.unwrap();
        let counts: Vec<(i64, i64)> = all.iter().map(|r| (r.year, r.count)).collect();
        assert_eq!(counts, vec![(2019, 1), (2020, 2), (2021, 2)]);

        let filter = PaperFilter {
            start_year: Some(2020),
            end_year: Some(2020),
            ..Default::default()
        };
        let ranged = engine.papers_by_year(&filter).await.unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].count, 2);
    }

    #[tokio::test]
    async fn test_paper_stats() {
        let stats = engine()
            .await
            .paper_stats(&PaperFilter::default())
            .await
            .unwrap();

        assert_eq!(stats.total, 5);
        assert_eq!(stats.avg_citations, 48.0);
        assert_eq!(stats.max_citations, 120);
        assert_eq!(stats.papers_with_patents, 2);
        assert_eq!(stats.avg_patents, 0.6);
    }

    #[tokio::test]
    async fn test_papers_most_cited_first_with_total() {
        let page = engine()
            .await
            .papers(&PaperFilter::default(), 2)
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        let ids: Vec<&str> = page.rows.iter().map(|r| r.paperid.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p5"]);
        assert_eq!(page.rows[1].field_count, 2);
    }

    #[tokio::test]
    async fn test_papers_with_patents() {
        let filter = PaperFilter {
            has_patents: Some(true),
            ..Default::default()
        };
        let page = engine().await.papers_with_patents(&filter, 10).await.unwrap();

        assert_eq!(page.total, 2);
        let rows: Vec<(&str, i64)> = page
            .rows
            .iter()
            .map(|r| (r.paperid.as_str(), r.actual_patent_count))
            .collect();
        assert_eq!(rows, vec![("p1", 2), ("p4", 1)]);
    }

    #[tokio::test]
    async fn test_field_filter_combines_with_citations() {
        let filter = PaperFilter {
            field: Some("computer".to_string()),
            min_citations: Some(10),
            ..Default::default()
        };
        let page = engine().await.papers(&filter, 10).await.unwrap();

        let ids: Vec<&str> = page.rows.iter().map(|r| r.paperid.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p4"]);
    }

    #[tokio::test]
    async fn test_top_authors() {
        let engine = engine().await;

        let all = engine
            .top_authors(&PaperFilter::default(), None, 10)
            .await
            .unwrap();
        let counts: Vec<(&str, i64)> = all
            .iter()
            .map(|r| (r.authorid.as_str(), r.paper_count))
            .collect();
        assert_eq!(counts, vec![("a1", 3), ("a3", 2), ("a2", 1)]);

        let prolific = engine
            .top_authors(&PaperFilter::default(), Some(2), 10)
            .await
            .unwrap();
        assert_eq!(prolific.len(), 2);
    }

    #[tokio::test]
    async fn test_field_trend_metrics() {
        let engine = engine().await;
        let filter = PaperFilter {
            field: Some("Computer".to_string()),
            ..Default::default()
        };

        let counts = engine.field_trend(&filter, TrendMetric::Count).await.unwrap();
        let points: Vec<(i64, f64)> = counts.iter().map(|p| (p.year, p.value)).collect();
        assert_eq!(points, vec![(2019, 1.0), (2020, 1.0), (2021, 1.0)]);

        let cites = engine
            .field_trend(&filter, TrendMetric::Citations)
            .await
            .unwrap();
        assert_eq!(cites[0].value, 120.0);
    }

    #[tokio::test]
    async fn test_citation_buckets_in_order() {
        let buckets = engine()
            .await
            .citation_buckets(&PaperFilter::default())
            .await
            .unwrap();
        let labels: Vec<&str> = buckets.iter().map(|b| b.citation_range.as_str()).collect();
        assert_eq!(labels, vec!["0", "1-10", "11-50", "51-100", "100+"]);
        assert!(buckets.iter().all(|b| b.paper_count == 1));
    }

    #[tokio::test]
    async fn test_patent_distribution() {
        let buckets = engine()
            .await
            .patent_distribution(&PaperFilter::default())
            .await
            .unwrap();
        let counts: Vec<(i64, i64)> = buckets
            .iter()
            .map(|b| (b.patent_count, b.paper_count))
            .collect();
        assert_eq!(counts, vec![(0, 3), (1, 1), (2, 1)]);
    }
}

#[cfg(test)]
mod invocation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_invocations_oldest_first_per_session() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();

        let first = Invocation::new("query_paper_data", json!({"request": "papers by field"}))
            .with_session("s1")
            .with_pipe("dataviz-orchestrator-v1")
            .success(json!({"success": true}), 12);
        let second = Invocation::new("generate_visualization", json!({}))
            .with_session("s1")
            .failure("no data", 3);
        let other = Invocation::new("chat", json!({})).with_session("s2");

        storage.log_invocation(&first).await.unwrap();
        storage.log_invocation(&second).await.unwrap();
        storage.log_invocation(&other).await.unwrap();

        let rows = storage.get_invocations("s1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tool_name, "query_paper_data");
        assert_eq!(rows[0].pipe_name.as_deref(), Some("dataviz-orchestrator-v1"));
        assert_eq!(rows[0].output, Some(json!({"success": true})));
        assert!(!rows[1].success);
        assert_eq!(rows[1].error.as_deref(), Some("no data"));
    }
}

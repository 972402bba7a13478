use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::{
    AuthorCount, CitationBucket, FieldCount, Page, PaperFilter, PaperRow, PaperStats, PatentBucket,
    PatentPaperRow, QueryEngine, TrendMetric, TrendPoint, YearCount, YearPaperCount,
};
use crate::error::StorageResult;
use crate::storage::SqliteStorage;

/// Linked-patent counts per paper, joined as `pat`.
const PATENT_JOIN: &str = " LEFT JOIN (SELECT paperid, COUNT(*) AS n FROM patent_links GROUP BY paperid) pat ON pat.paperid = p.paperid";

/// [`QueryEngine`] over the SQLite dataset tables.
#[derive(Clone)]
pub struct SqliteQueryEngine {
    pool: SqlitePool,
}

impl SqliteQueryEngine {
    /// Query engine sharing the storage connection pool.
    pub fn new(storage: &SqliteStorage) -> Self {
        Self {
            pool: storage.pool().clone(),
        }
    }
}

/// LIKE pattern matching `term` anywhere, with wildcards in `term` escaped.
fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Append `AND ...` clauses for every set filter. Expects `papers p` and the
/// `pat` patent join in scope.
fn push_paper_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PaperFilter) {
    if let Some(year) = filter.year {
        qb.push(" AND p.year = ").push_bind(year);
    }
    if let Some(start) = filter.start_year {
        qb.push(" AND p.year >= ").push_bind(start);
    }
    if let Some(end) = filter.end_year {
        qb.push(" AND p.year <= ").push_bind(end);
    }
    if let Some(field) = &filter.field {
        qb.push(
            " AND p.paperid IN (SELECT pf.paperid FROM paper_fields pf JOIN fields f ON f.fieldid = pf.fieldid WHERE f.display_name LIKE ",
        )
        .push_bind(contains_pattern(field))
        .push(" ESCAPE '\\')");
    }
    if !filter.fields.is_empty() {
        qb.push(
            " AND p.paperid IN (SELECT pf.paperid FROM paper_fields pf JOIN fields f ON f.fieldid = pf.fieldid WHERE f.display_name IN (",
        );
        let mut names = qb.separated(", ");
        for name in &filter.fields {
            names.push_bind(name.clone());
        }
        names.push_unseparated("))");
    }
    if let Some(min) = filter.min_citations {
        qb.push(" AND p.cited_by_count >= ").push_bind(min);
    }
    if let Some(max) = filter.max_citations {
        qb.push(" AND p.cited_by_count <= ").push_bind(max);
    }
    if let Some(min) = filter.min_patents {
        qb.push(" AND COALESCE(pat.n, 0) >= ").push_bind(min);
    }
    match filter.has_patents {
        Some(true) => {
            qb.push(" AND COALESCE(pat.n, 0) > 0");
        }
        Some(false) => {
            qb.push(" AND COALESCE(pat.n, 0) = 0");
        }
        None => {}
    }
    if let Some(author) = &filter.author_id {
        qb.push(" AND p.paperid IN (SELECT pa.paperid FROM paper_authors pa WHERE pa.authorid = ")
            .push_bind(author.clone())
            .push(")");
    }
}

fn filtered_papers<'a>(select: &str, filter: &PaperFilter) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" FROM papers p");
    qb.push(PATENT_JOIN);
    qb.push(" WHERE 1 = 1");
    push_paper_filters(&mut qb, filter);
    qb
}

impl SqliteQueryEngine {
    async fn count_papers(&self, filter: &PaperFilter) -> StorageResult<i64> {
        let mut qb = filtered_papers("SELECT COUNT(*)", filter);
        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total)
    }
}

#[async_trait]
impl QueryEngine for SqliteQueryEngine {
    async fn papers_by_field(
        &self,
        field_name: Option<String>,
        limit: Option<i64>,
    ) -> StorageResult<Vec<FieldCount>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT pf.fieldid AS fieldid, COALESCE(f.display_name, pf.fieldid) AS display_name, \
             COUNT(DISTINCT pf.paperid) AS paper_count \
             FROM paper_fields pf LEFT JOIN fields f ON f.fieldid = pf.fieldid WHERE 1 = 1",
        );
        if let Some(name) = field_name {
            qb.push(" AND f.display_name LIKE ")
                .push_bind(contains_pattern(&name))
                .push(" ESCAPE '\\'");
        }
        qb.push(" GROUP BY pf.fieldid ORDER BY paper_count DESC, MIN(pf.rowid) ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        debug!(sql = qb.sql(), "papers_by_field");
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn papers_by_year(&self, filter: &PaperFilter) -> StorageResult<Vec<YearCount>> {
        let mut qb = filtered_papers("SELECT p.year AS year, COUNT(*) AS count", filter);
        qb.push(" GROUP BY p.year ORDER BY p.year ASC");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn paper_stats(&self, filter: &PaperFilter) -> StorageResult<PaperStats> {
        let mut qb = filtered_papers(
            "SELECT COUNT(*) AS total, \
             ROUND(COALESCE(AVG(p.cited_by_count), 0), 2) AS avg_citations, \
             COALESCE(MAX(p.cited_by_count), 0) AS max_citations, \
             COALESCE(SUM(CASE WHEN COALESCE(pat.n, 0) > 0 THEN 1 ELSE 0 END), 0) AS papers_with_patents, \
             ROUND(COALESCE(AVG(COALESCE(pat.n, 0)), 0), 2) AS avg_patents",
            filter,
        );

        Ok(qb.build_query_as().fetch_one(&self.pool).await?)
    }

    async fn papers(&self, filter: &PaperFilter, limit: i64) -> StorageResult<Page<PaperRow>> {
        let total = self.count_papers(filter).await?;

        let mut qb = filtered_papers(
            "SELECT p.paperid AS paperid, p.year AS year, p.doctype AS doctype, \
             p.cited_by_count AS cited_by_count, p.patent_count AS patent_count, \
             (SELECT COUNT(*) FROM paper_fields x WHERE x.paperid = p.paperid) AS field_count",
            filter,
        );
        qb.push(" ORDER BY p.cited_by_count DESC, p.rowid ASC LIMIT ")
            .push_bind(limit);

        let rows = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(Page { rows, total })
    }

    async fn papers_with_patents(
        &self,
        filter: &PaperFilter,
        limit: i64,
    ) -> StorageResult<Page<PatentPaperRow>> {
        let total = self.count_papers(filter).await?;

        let mut qb = filtered_papers(
            "SELECT p.paperid AS paperid, p.year AS year, p.doctype AS doctype, \
             p.cited_by_count AS cited_by_count, COALESCE(pat.n, 0) AS actual_patent_count",
            filter,
        );
        qb.push(" ORDER BY actual_patent_count DESC, p.rowid ASC LIMIT ")
            .push_bind(limit);

        let rows = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(Page { rows, total })
    }

    async fn available_fields(&self) -> StorageResult<Vec<FieldCount>> {
        let rows = sqlx::query_as(
            r#"
            SELECT f.fieldid AS fieldid, f.display_name AS display_name,
                   COUNT(DISTINCT pf.paperid) AS paper_count
            FROM fields f
            JOIN paper_fields pf ON pf.fieldid = f.fieldid
            GROUP BY f.fieldid
            ORDER BY paper_count DESC, MIN(f.rowid) ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn available_years(&self) -> StorageResult<Vec<YearPaperCount>> {
        let rows = sqlx::query_as(
            r#"
            SELECT year, COUNT(*) AS paper_count
            FROM papers
            GROUP BY year
            ORDER BY year ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn top_authors(
        &self,
        filter: &PaperFilter,
        min_papers: Option<i64>,
        limit: i64,
    ) -> StorageResult<Vec<AuthorCount>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT pa.authorid AS authorid, COUNT(DISTINCT pa.paperid) AS paper_count \
             FROM paper_authors pa WHERE pa.paperid IN (SELECT p.paperid FROM papers p",
        );
        qb.push(PATENT_JOIN);
        qb.push(" WHERE 1 = 1");
        push_paper_filters(&mut qb, filter);
        qb.push(") GROUP BY pa.authorid");
        if let Some(min) = min_papers {
            qb.push(" HAVING COUNT(DISTINCT pa.paperid) >= ").push_bind(min);
        }
        qb.push(" ORDER BY paper_count DESC, MIN(pa.rowid) ASC LIMIT ")
            .push_bind(limit);

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn field_trend(
        &self,
        filter: &PaperFilter,
        metric: TrendMetric,
    ) -> StorageResult<Vec<TrendPoint>> {
        let value = match metric {
            TrendMetric::Count => "CAST(COUNT(*) AS REAL)",
            TrendMetric::Citations => "ROUND(AVG(p.cited_by_count), 2)",
            TrendMetric::Patents => "ROUND(AVG(COALESCE(pat.n, 0)), 2)",
        };
        let mut qb = filtered_papers(&format!("SELECT p.year AS year, {} AS value", value), filter);
        qb.push(" GROUP BY p.year ORDER BY p.year ASC");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn citation_buckets(&self, filter: &PaperFilter) -> StorageResult<Vec<CitationBucket>> {
        let mut qb = filtered_papers(
            "SELECT CASE \
               WHEN p.cited_by_count = 0 THEN '0' \
               WHEN p.cited_by_count <= 10 THEN '1-10' \
               WHEN p.cited_by_count <= 50 THEN '11-50' \
               WHEN p.cited_by_count <= 100 THEN '51-100' \
               ELSE '100+' END AS citation_range, \
             COUNT(*) AS paper_count",
            filter,
        );
        qb.push(" GROUP BY citation_range ORDER BY MIN(p.cited_by_count) ASC");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn patent_distribution(&self, filter: &PaperFilter) -> StorageResult<Vec<PatentBucket>> {
        let mut qb = filtered_papers(
            "SELECT COALESCE(pat.n, 0) AS patent_count, COUNT(*) AS paper_count",
            filter,
        );
        qb.push(" GROUP BY COALESCE(pat.n, 0) ORDER BY COALESCE(pat.n, 0) ASC");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }
}

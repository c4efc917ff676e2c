//! Read path: ranked and recency-sorted queries with highlighted fragments.
//!
//! Every call opens a fresh searcher, so results reflect the last commit. Any
//! engine failure is logged and yields an empty result; callers never see
//! query errors.

use super::manager::{IndexHandle, IndexManager};
use super::schema::{INDEXED_SEQ, IndexFields};
use crate::error::Result;
use crate::model::RecordKind;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, Occur, Query, QueryClone, QueryParser, RangeQuery, RegexQuery,
    TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::snippet::{Snippet, SnippetGenerator};
use tantivy::{DocAddress, DocId, Score, Searcher, SegmentReader, TantivyDocument, Term};

/// Query string that matches every document, newest first.
pub const WILDCARD: &str = "*";

/// One hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub doc_type: RecordKind,
    /// Relevance; constant for recency-sorted queries.
    pub score: f32,
    pub title: Option<String>,
    pub project_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Field name → fragment with `<b>…</b>` around matched terms.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub highlights: BTreeMap<String, String>,
}

/// Optional restrictions for [`QueryEngine::search_cross_project`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Record types to include; empty means all.
    pub doc_types: Vec<RecordKind>,
    /// Projects to include; empty means all.
    pub project_ids: Vec<String>,
    /// Only documents created within this many days.
    pub days_back: Option<u32>,
}

impl SearchFilters {
    pub fn with_types(mut self, doc_types: impl IntoIterator<Item = RecordKind>) -> Self {
        self.doc_types.extend(doc_types);
        self
    }

    pub fn with_projects<I, S>(mut self, project_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_ids.extend(project_ids.into_iter().map(Into::into));
        self
    }

    pub fn within_days(mut self, days: u32) -> Self {
        self.days_back = Some(days);
        self
    }
}

enum SortOrder {
    Relevance,
    Recency,
}

/// Search front-end over an [`IndexManager`].
#[derive(Clone)]
pub struct QueryEngine {
    manager: Arc<IndexManager>,
}

impl QueryEngine {
    pub fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    /// Free-text search over title, content, description and search text.
    ///
    /// Terms are OR-ed; results are ranked by score. Blank queries and
    /// `limit == 0` return nothing.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        doc_types: Option<&[RecordKind]>,
        highlight: bool,
    ) -> Vec<SearchResult> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }
        let filters = SearchFilters {
            doc_types: doc_types.map(<[RecordKind]>::to_vec).unwrap_or_default(),
            ..Default::default()
        };
        self.logged(self.run(Some(query), limit, &filters, highlight))
    }

    /// Search across every project, optionally restricted by type, project and
    /// age. [`WILDCARD`] matches all documents and sorts by recency.
    pub fn search_cross_project(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        highlight: bool,
    ) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        let text = (query != WILDCARD).then_some(query);
        self.logged(self.run(text, limit, filters, highlight))
    }

    /// Documents created within the last `days`, newest first.
    pub fn search_recent(
        &self,
        days: u32,
        limit: usize,
        doc_types: Option<&[RecordKind]>,
    ) -> Vec<SearchResult> {
        if limit == 0 {
            return Vec::new();
        }
        let filters = SearchFilters {
            doc_types: doc_types.map(<[RecordKind]>::to_vec).unwrap_or_default(),
            days_back: Some(days),
            ..Default::default()
        };
        self.logged(self.run(None, limit, &filters, false))
    }

    /// Distinct titles containing a word that starts with `prefix`, sorted.
    pub fn get_suggestions(&self, prefix: &str, limit: usize) -> Vec<String> {
        let Some(word) = prefix.split_whitespace().last() else {
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }
        self.logged(self.suggest(&word.to_lowercase(), limit))
    }

    fn logged<T: Default>(&self, result: Result<T>) -> T {
        result.unwrap_or_else(|e| {
            log::warn!("search failed: {}", e);
            T::default()
        })
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// `text: None` matches everything and switches to recency ordering.
    fn run(
        &self,
        text: Option<&str>,
        limit: usize,
        filters: &SearchFilters,
        highlight: bool,
    ) -> Result<Vec<SearchResult>> {
        let handle = self.manager.ensure_open()?;
        let searcher = handle.searcher()?;
        let f = handle.fields;

        let text_query: Box<dyn Query> = match text {
            Some(text) => parse_lenient(&handle, text),
            None => Box::new(AllQuery),
        };
        let ordering = if text.is_some() {
            SortOrder::Relevance
        } else {
            SortOrder::Recency
        };

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query.box_clone())];
        if let Some(q) = any_of(f.doc_type, filters.doc_types.iter().map(|k| k.as_ref())) {
            clauses.push((Occur::Must, q));
        }
        if let Some(q) = any_of(f.project_id, filters.project_ids.iter().map(String::as_str)) {
            clauses.push((Occur::Must, q));
        }
        if let Some(days) = filters.days_back {
            let cutoff = Utc::now() - TimeDelta::days(i64::from(days));
            clauses.push((
                Occur::Must,
                Box::new(RangeQuery::new(
                    Bound::Included(Term::from_field_i64(f.created_at, cutoff.timestamp())),
                    Bound::Unbounded,
                )),
            ));
        }
        let query: Box<dyn Query> = if clauses.len() == 1 {
            text_query.box_clone()
        } else {
            Box::new(BooleanQuery::new(clauses))
        };

        let hits = match ordering {
            SortOrder::Relevance => ranked(&searcher, &*query, limit)?,
            SortOrder::Recency => newest_first(&searcher, &*query, f, limit)?,
        };

        let generators = if highlight && text.is_some() {
            self.generators(&searcher, &*text_query, &f)
        } else {
            Vec::new()
        };

        let mut results = Vec::with_capacity(hits.len());
        for (score, doc) in hits {
            let Some(mut result) = to_result(&doc, &f, score) else {
                continue;
            };
            for (name, generator) in &generators {
                let snippet = generator.snippet_from_doc(&doc);
                if let Some(fragment) =
                    render_fragment(&snippet, self.manager.settings().fragment_surround_chars())
                {
                    result.highlights.insert(name.to_string(), fragment);
                }
            }
            results.push(result);
        }
        Ok(results)
    }

    /// One snippet generator per text field the query can match.
    fn generators(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
        f: &IndexFields,
    ) -> Vec<(&'static str, SnippetGenerator)> {
        let named = [
            ("title", f.title),
            ("content", f.content),
            ("description", f.description),
            ("search_text", f.search_text),
        ];
        let max_chars = self.manager.settings().fragment_max_chars();
        named
            .into_iter()
            .filter_map(|(name, field)| match SnippetGenerator::create(searcher, query, field) {
                Ok(mut generator) => {
                    generator.set_max_num_chars(max_chars);
                    Some((name, generator))
                }
                Err(e) => {
                    log::debug!("no snippets for {}: {}", name, e);
                    None
                }
            })
            .collect()
    }

    fn suggest(&self, word: &str, limit: usize) -> Result<Vec<String>> {
        let handle = self.manager.ensure_open()?;
        let searcher = handle.searcher()?;
        let pattern = format!("{}.*", regex::escape(word));
        let query = RegexQuery::from_pattern(&pattern, handle.fields.title)?;

        let mut titles = BTreeSet::new();
        for addr in searcher.search(&query, &DocSetCollector)? {
            let doc: TantivyDocument = searcher.doc(addr)?;
            if let Some(title) = text_value(&doc, handle.fields.title)
                && !title.is_empty()
            {
                titles.insert(title);
            }
        }
        Ok(titles.into_iter().take(limit).collect())
    }
}

fn parse_lenient(handle: &IndexHandle, text: &str) -> Box<dyn Query> {
    let parser = QueryParser::for_index(&handle.index, handle.fields.text_fields().to_vec());
    let (query, errors) = parser.parse_query_lenient(text);
    if !errors.is_empty() {
        log::debug!("query {:?} parsed leniently: {} issue(s)", text, errors.len());
    }
    query
}

/// `field ∈ values` as a disjunction of exact terms. `None` when `values` is
/// empty.
fn any_of<'a>(field: Field, values: impl Iterator<Item = &'a str>) -> Option<Box<dyn Query>> {
    let terms: Vec<(Occur, Box<dyn Query>)> = values
        .map(|value| {
            (
                Occur::Should,
                Box::new(TermQuery::new(
                    Term::from_field_text(field, value),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            )
        })
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(Box::new(BooleanQuery::new(terms)))
    }
}

/// Top `limit` by score; equal scores keep write order (`indexed_seq`).
fn ranked(searcher: &Searcher, query: &dyn Query, limit: usize) -> Result<Vec<(f32, TantivyDocument)>> {
    let collector = TopDocs::with_limit(limit).tweak_score(|segment: &SegmentReader| {
        let seq = segment.fast_fields().i64(INDEXED_SEQ).ok();
        move |doc: DocId, score: Score| {
            let stamp = seq.as_ref().and_then(|column| column.first(doc)).unwrap_or(i64::MAX);
            (score, Reverse(stamp))
        }
    });
    let top: Vec<((Score, Reverse<i64>), DocAddress)> = searcher.search(query, &collector)?;

    let mut docs = Vec::with_capacity(top.len());
    for ((score, _), addr) in top {
        let doc: TantivyDocument = searcher.doc(addr)?;
        docs.push((score, doc));
    }
    Ok(docs)
}

/// Every match, newest first with `doc_id` breaking ties, truncated to `limit`.
fn newest_first(
    searcher: &Searcher,
    query: &dyn Query,
    f: IndexFields,
    limit: usize,
) -> Result<Vec<(f32, TantivyDocument)>> {
    let mut docs: Vec<(i64, String, TantivyDocument)> = Vec::new();
    for addr in searcher.search(query, &DocSetCollector)? {
        let doc: TantivyDocument = searcher.doc(addr)?;
        let created = doc.get_first(f.created_at).and_then(|v| v.as_i64()).unwrap_or(i64::MIN);
        let id = text_value(&doc, f.doc_id).unwrap_or_default();
        docs.push((created, id, doc));
    }
    docs.sort_by(|(ca, ia, _), (cb, ib, _)| cb.cmp(ca).then_with(|| ia.cmp(ib)));
    docs.truncate(limit);
    Ok(docs.into_iter().map(|(_, _, doc)| (1.0, doc)).collect())
}

fn text_value(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string)
}

fn to_result(doc: &TantivyDocument, f: &IndexFields, score: f32) -> Option<SearchResult> {
    let doc_id = text_value(doc, f.doc_id)?;
    let doc_type = text_value(doc, f.doc_type)?.parse().ok()?;
    Some(SearchResult {
        doc_id,
        doc_type,
        score,
        title: text_value(doc, f.title).filter(|t| !t.is_empty()),
        project_id: text_value(doc, f.project_id),
        created_at: doc
            .get_first(f.created_at)
            .and_then(|v| v.as_i64())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        highlights: BTreeMap::new(),
    })
}

// ============================================================================
// Fragment rendering
// ============================================================================

/// Render a snippet with `<b>` markers, keeping about `surround` characters of
/// context around the matched span. `None` when nothing matched.
fn render_fragment(snippet: &Snippet, surround: usize) -> Option<String> {
    let fragment = snippet.fragment();
    let ranges = snippet.highlighted();
    let first = ranges.first()?;
    let last = ranges.last()?;

    let start = back_chars(fragment, first.start, surround);
    let end = forward_chars(fragment, last.end, surround);

    let mut out = String::with_capacity(end - start + 16);
    if start > 0 {
        out.push('…');
    }
    let mut cursor = start;
    for range in ranges {
        if range.start < cursor || range.end > end {
            continue;
        }
        out.push_str(&fragment[cursor..range.start]);
        out.push_str("<b>");
        out.push_str(&fragment[range.start..range.end]);
        out.push_str("</b>");
        cursor = range.end;
    }
    out.push_str(&fragment[cursor..end]);
    if end < fragment.len() {
        out.push('…');
    }
    Some(out)
}

/// Byte offset `n` characters before `from` (or 0).
fn back_chars(s: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    s[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte offset `n` characters after `from` (or the end).
fn forward_chars(s: &str, from: usize, n: usize) -> usize {
    s[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(s.len())
}

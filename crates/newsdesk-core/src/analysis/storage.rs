//! Persistence for analysis results
//!
//! The orchestrator talks to storage only through [`AnalysisStore`]; the
//! bundled backend keeps records in one JSON file. Read operations are
//! infallible lookups, write operations report failure so the caller can
//! downgrade it to a status warning.

use crate::analysis::types::{AnalysisPayload, AnalysisRecord, NewsArticle};
use crate::error::{NewsdeskError, NewsdeskResult};
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Storage consulted by the analysis orchestrator
#[cfg_attr(test, automock)]
pub trait AnalysisStore: Send + Sync {
    /// Persists one analysis and maps it to the given article ids.
    /// Returns the new record's id.
    fn add_analysis(
        &self,
        payload: &AnalysisPayload,
        article_ids: Option<Vec<i64>>,
    ) -> NewsdeskResult<i64>;

    fn get_analysis(&self, analysis_id: i64) -> Option<AnalysisRecord>;

    /// All analyses mapped to an article, newest first
    fn analyses_for_article(&self, article_id: i64) -> Vec<AnalysisRecord>;

    /// All analyses newest first, with optional pagination
    fn all_analyses(&self, limit: Option<usize>, offset: usize) -> Vec<AnalysisRecord>;

    /// Deletes one record. Deleting an id that does not exist is still a
    /// success.
    fn delete_analysis(&self, analysis_id: i64) -> bool;

    fn delete_all(&self) -> bool;

    /// Looks up a persisted article by its link, used to recover an
    /// article id when the in-memory article carries none
    fn article_by_link(&self, link: &str) -> Option<NewsArticle>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_id: i64,
    records: Vec<AnalysisRecord>,
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

/// File-backed [`AnalysisStore`] holding all records in one JSON document
pub struct JsonAnalysisStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonAnalysisStore {
    /// Opens the store at `path`, loading any existing records
    pub fn open(path: impl Into<PathBuf>) -> NewsdeskResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NewsdeskError::storage(format!("failed to create store directory: {e}")))?;
        }

        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| NewsdeskError::storage(format!("failed to read analysis store: {e}")))?;
            serde_json::from_str(&content)
                .map_err(|e| NewsdeskError::storage(format!("analysis store is corrupt: {e}")))?
        } else {
            StoreState::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Inserts or replaces an article, keyed by link
    pub fn put_article(&self, article: NewsArticle) -> NewsdeskResult<()> {
        let mut state = self.state.lock();
        state.articles.retain(|a| a.link != article.link);
        state.articles.push(article);
        self.persist(&state)
    }

    fn persist(&self, state: &StoreState) -> NewsdeskResult<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| NewsdeskError::storage(format!("failed to serialize analysis store: {e}")))?;
        std::fs::write(&self.path, json)
            .map_err(|e| NewsdeskError::storage(format!("failed to write analysis store: {e}")))
    }
}

fn newest_first(records: &mut [AnalysisRecord]) {
    records.sort_by(|a, b| {
        b.payload
            .analysis_timestamp
            .cmp(&a.payload.analysis_timestamp)
    });
}

impl AnalysisStore for JsonAnalysisStore {
    fn add_analysis(
        &self,
        payload: &AnalysisPayload,
        article_ids: Option<Vec<i64>>,
    ) -> NewsdeskResult<i64> {
        let mut state = self.state.lock();
        let id = state.next_id + 1;
        state.records.push(AnalysisRecord {
            id,
            article_ids: article_ids.unwrap_or_default(),
            payload: payload.clone(),
        });
        state.next_id = id;

        if let Err(e) = self.persist(&state) {
            state.records.pop();
            state.next_id = id - 1;
            return Err(e);
        }
        debug!(id, analysis_type = %payload.analysis_type, "analysis record saved");
        Ok(id)
    }

    fn get_analysis(&self, analysis_id: i64) -> Option<AnalysisRecord> {
        let state = self.state.lock();
        state.records.iter().find(|r| r.id == analysis_id).cloned()
    }

    fn analyses_for_article(&self, article_id: i64) -> Vec<AnalysisRecord> {
        let state = self.state.lock();
        let mut matches: Vec<AnalysisRecord> = state
            .records
            .iter()
            .filter(|r| r.article_ids.contains(&article_id))
            .cloned()
            .collect();
        newest_first(&mut matches);
        matches
    }

    fn all_analyses(&self, limit: Option<usize>, offset: usize) -> Vec<AnalysisRecord> {
        let state = self.state.lock();
        let mut records = state.records.clone();
        newest_first(&mut records);
        records
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    fn delete_analysis(&self, analysis_id: i64) -> bool {
        let mut state = self.state.lock();
        let before = state.records.len();
        state.records.retain(|r| r.id != analysis_id);
        if state.records.len() == before {
            debug!(analysis_id, "no analysis record found to delete");
        } else {
            info!(analysis_id, "analysis record deleted");
        }

        match self.persist(&state) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, analysis_id, "failed to persist analysis deletion");
                false
            }
        }
    }

    fn delete_all(&self) -> bool {
        let mut state = self.state.lock();
        let removed = state.records.len();
        state.records.clear();

        match self.persist(&state) {
            Ok(()) => {
                info!(removed, "all analysis records deleted");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to persist analysis wipe");
                false
            }
        }
    }

    fn article_by_link(&self, link: &str) -> Option<NewsArticle> {
        let state = self.state.lock();
        state.articles.iter().find(|a| a.link == link).cloned()
    }
}

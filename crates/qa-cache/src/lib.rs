//! Persistent question/answer memory.
//!
//! Questions asked during automated runs (security prompts, survey
//! fields, screener questions) are cached with their answers so later
//! runs answer them without a model round trip. Lookup is exact on the
//! normalized question first, then fuzzy by token-set similarity.

pub mod similarity;

pub use similarity::{jaccard, normalize};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Fuzzy matches at or above this similarity are returned as answers.
pub const ACCEPT_THRESHOLD: f64 = 0.7;
/// Matches between this floor and the accept threshold are logged as
/// near misses but never returned.
pub const CANDIDATE_FLOOR: f64 = 0.3;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache file is corrupt: {0}")]
    Corrupt(String),
    #[error("answer provider failed: {0}")]
    Provider(String),
}

/// One remembered question/answer pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    /// Normalized form the question is matched by.
    pub normalized: String,
    /// Free-form provenance or context (where the answer came from,
    /// which site asked). `Null` when the caller had nothing to add.
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub uses: u64,
}

/// Lookup counters.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct QaStats {
    pub queries: u64,
    pub hits: u64,
    pub misses: u64,
}

/// How a query was satisfied.
#[derive(Clone, Debug, PartialEq)]
pub enum QaMatch {
    Exact(String),
    /// Fuzzy hit with its similarity score.
    Similar(String, f64),
}

impl QaMatch {
    pub fn answer(&self) -> &str {
        match self {
            QaMatch::Exact(answer) | QaMatch::Similar(answer, _) => answer,
        }
    }
}

/// Source of answers for questions the cache has never seen.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    async fn answer(&self, question: &str) -> Result<String, QaError>;
}

struct CacheState {
    entries: Vec<QaEntry>,
    stats: QaStats,
}

/// Write-through JSON-file-backed cache.
pub struct QaCache {
    path: PathBuf,
    state: Mutex<CacheState>,
}

impl QaCache {
    /// Open the cache at `path`, creating an empty one if the file
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, QaError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| QaError::Corrupt(err.to_string()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), entries = entries.len(), "qa cache opened");
        Ok(Self {
            path,
            state: Mutex::new(CacheState {
                entries,
                stats: QaStats::default(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn stats(&self) -> QaStats {
        self.state.lock().stats
    }

    /// Snapshot of every stored entry, in insertion order.
    pub fn entries(&self) -> Vec<QaEntry> {
        self.state.lock().entries.clone()
    }

    /// Look the question up; exact normalized match first, then the
    /// best fuzzy match at or above the accept threshold.
    pub fn query(&self, question: &str) -> Option<QaMatch> {
        let normalized = normalize(question);
        let mut state = self.state.lock();
        state.stats.queries += 1;

        if let Some(idx) = state
            .entries
            .iter()
            .position(|e| e.normalized == normalized)
        {
            state.entries[idx].uses += 1;
            state.stats.hits += 1;
            return Some(QaMatch::Exact(state.entries[idx].answer.clone()));
        }

        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in state.entries.iter().enumerate() {
            let score = jaccard(&normalized, &entry.normalized);
            if best.map(|(_, s)| score > s).unwrap_or(score >= CANDIDATE_FLOOR) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, score)) if score >= ACCEPT_THRESHOLD => {
                state.entries[idx].uses += 1;
                state.stats.hits += 1;
                let answer = state.entries[idx].answer.clone();
                debug!(score, "fuzzy qa hit");
                Some(QaMatch::Similar(answer, score))
            }
            Some((idx, score)) => {
                debug!(
                    score,
                    candidate = %state.entries[idx].question,
                    "qa near miss below accept threshold"
                );
                state.stats.misses += 1;
                None
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Store an answer and write the whole file through to disk. A
    /// re-insert of the same normalized question replaces the answer
    /// and metadata in place.
    pub async fn insert(
        &self,
        question: &str,
        answer: &str,
        metadata: Value,
    ) -> Result<(), QaError> {
        let bytes = {
            let mut state = self.state.lock();
            let normalized = normalize(question);
            match state
                .entries
                .iter_mut()
                .find(|e| e.normalized == normalized)
            {
                Some(entry) => {
                    entry.answer = answer.to_string();
                    entry.metadata = metadata;
                }
                None => state.entries.push(QaEntry {
                    question: question.to_string(),
                    answer: answer.to_string(),
                    normalized,
                    metadata,
                    created_at: Utc::now(),
                    uses: 0,
                }),
            }
            serde_json::to_vec_pretty(&state.entries)
                .map_err(|err| QaError::Corrupt(err.to_string()))?
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    /// Answer from cache if possible, otherwise ask the provider and
    /// remember its answer.
    pub async fn query_with_fallback(
        &self,
        question: &str,
        provider: &dyn AnswerProvider,
    ) -> Result<String, QaError> {
        if let Some(hit) = self.query(question) {
            return Ok(hit.answer().to_string());
        }
        debug!(question, "qa cache miss; asking provider");
        let answer = provider.answer(question).await?;
        self.insert(question, &answer, json!({ "source": "provider" }))
            .await?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedProvider(String);

    #[async_trait]
    impl AnswerProvider for CannedProvider {
        async fn answer(&self, _question: &str) -> Result<String, QaError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl AnswerProvider for FailingProvider {
        async fn answer(&self, _question: &str) -> Result<String, QaError> {
            Err(QaError::Provider("model unavailable".into()))
        }
    }

    fn cache_in(dir: &tempfile::TempDir) -> QaCache {
        QaCache::open(dir.path().join("qa.json")).unwrap()
    }

    #[tokio::test]
    async fn exact_hit_ignores_case_and_punctuation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache
            .insert("What is your favorite color?", "blue", Value::Null)
            .await
            .unwrap();

        let hit = cache.query("what is your FAVORITE color").unwrap();
        assert_eq!(hit, QaMatch::Exact("blue".into()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn similar_question_above_threshold_matches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache
            .insert("What is the name of your first pet?", "Rex", Value::Null)
            .await
            .unwrap();

        // 7 of 9 union tokens shared, well above 0.7.
        let hit = cache
            .query("What is the name of your second pet?")
            .unwrap();
        match hit {
            QaMatch::Similar(answer, score) => {
                assert_eq!(answer, "Rex");
                assert!(score >= ACCEPT_THRESHOLD);
            }
            QaMatch::Exact(_) => panic!("expected fuzzy match"),
        }
    }

    #[tokio::test]
    async fn weak_overlap_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.insert("What is your name?", "Pat", Value::Null).await.unwrap();

        assert!(cache.query("Where is the nearest office?").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.json");
        {
            let cache = QaCache::open(&path).unwrap();
            cache
                .insert("Security question?", "42", Value::Null)
                .await
                .unwrap();
        }
        let reopened = QaCache::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.query("Security question?").is_some());
    }

    #[tokio::test]
    async fn fallback_asks_provider_once_then_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let provider = CannedProvider("pineapple".into());

        let first = cache
            .query_with_fallback("Favorite pizza topping?", &provider)
            .await
            .unwrap();
        assert_eq!(first, "pineapple");

        // Second query hits the cache even with a dead provider.
        let second = cache
            .query_with_fallback("Favorite pizza topping?", &FailingProvider)
            .await
            .unwrap();
        assert_eq!(second, "pineapple");

        // Provider-sourced entries are tagged as such.
        assert_eq!(
            cache.entries()[0].metadata,
            json!({ "source": "provider" })
        );
    }

    #[tokio::test]
    async fn metadata_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.json");
        {
            let cache = QaCache::open(&path).unwrap();
            cache
                .insert(
                    "Are you authorized to work here?",
                    "yes",
                    json!({ "site": "jobs.example.com" }),
                )
                .await
                .unwrap();
        }
        let reopened = QaCache::open(&path).unwrap();
        assert_eq!(
            reopened.entries()[0].metadata,
            json!({ "site": "jobs.example.com" })
        );
    }

    #[tokio::test]
    async fn provider_failure_propagates_on_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let err = cache
            .query_with_fallback("Unknown question?", &FailingProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::Provider(_)));
    }

    #[tokio::test]
    async fn reinsert_updates_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.insert("What city?", "Lyon", Value::Null).await.unwrap();
        cache.insert("what city", "Nantes", Value::Null).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.query("What city?").unwrap().answer(), "Nantes");
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(QaCache::open(&path), Err(QaError::Corrupt(_))));
    }
}

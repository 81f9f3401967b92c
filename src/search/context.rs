//! Session context tracking and per-term score boosts.
//!
//! Recent file accesses and queries feed a keyword set; query terms that
//! line up with what the session has been touching get a multiplicative
//! boost. Bonuses stack: a term matching both the current file and a recent
//! query is boosted by the product of both factors.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

/// Bounded history sizes.
const MAX_RECENT_FILES: usize = 20;
const MAX_RECENT_QUERIES: usize = 10;

/// Boost factors. A single match lands in the 1.2–1.5 range.
const CURRENT_FILE_BOOST: f32 = 1.5;
const RECENT_FILE_BOOST: f32 = 1.3;
const RECENT_QUERY_BOOST: f32 = 1.25;
const TECHNOLOGY_BOOST: f32 = 1.2;

/// Technology dictionary matched against path keywords.
const TECHNOLOGY_TERMS: &[&str] = &[
    "api", "async", "auth", "cache", "cli", "config", "db", "docker", "grpc", "http", "index",
    "json", "jwt", "kafka", "log", "oauth", "parser", "proto", "queue", "redis", "rest", "rpc",
    "schema", "sql", "test", "token", "websocket", "xml", "yaml",
];

/// Thread-safe recent-activity tracker.
pub struct SearchContext {
    recent_files: Mutex<VecDeque<String>>,
    recent_queries: Mutex<VecDeque<String>>,
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchContext {
    pub fn new() -> Self {
        Self {
            recent_files: Mutex::new(VecDeque::new()),
            recent_queries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record_file_access(&self, path: &str) {
        let mut files = self.recent_files.lock();
        files.retain(|p| p != path);
        files.push_front(path.to_string());
        files.truncate(MAX_RECENT_FILES);
    }

    pub fn record_query(&self, query: &str) {
        let mut queries = self.recent_queries.lock();
        queries.retain(|q| q != query);
        queries.push_front(query.to_string());
        queries.truncate(MAX_RECENT_QUERIES);
    }

    pub fn recent_files(&self) -> Vec<String> {
        self.recent_files.lock().iter().cloned().collect()
    }

    pub fn recent_queries(&self) -> Vec<String> {
        self.recent_queries.lock().iter().cloned().collect()
    }

    /// Multiplicative boost per term. Terms with no context affinity map to
    /// 1.0 (no boost).
    pub fn get_boosts(
        &self,
        current_file: Option<&str>,
        terms: &[String],
    ) -> HashMap<String, f32> {
        let current_keywords: HashSet<String> = current_file
            .map(|p| path_keywords(p))
            .unwrap_or_default();
        let recent_keywords: HashSet<String> = self
            .recent_files
            .lock()
            .iter()
            .flat_map(|p| path_keywords(p))
            .collect();
        let query_terms: HashSet<String> = self
            .recent_queries
            .lock()
            .iter()
            .flat_map(|q| {
                q.split_whitespace()
                    .map(|t| t.to_lowercase())
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut boosts = HashMap::with_capacity(terms.len());
        for term in terms {
            let lowered = term.to_lowercase();
            let mut boost = 1.0f32;
            if current_keywords.contains(&lowered) {
                boost *= CURRENT_FILE_BOOST;
            }
            if recent_keywords.contains(&lowered) {
                boost *= RECENT_FILE_BOOST;
            }
            if query_terms.contains(&lowered) {
                boost *= RECENT_QUERY_BOOST;
            }
            if TECHNOLOGY_TERMS.binary_search(&lowered.as_str()).is_ok() {
                boost *= TECHNOLOGY_BOOST;
            }
            boosts.insert(term.clone(), boost);
        }
        boosts
    }
}

/// Keywords from a path: segments split on separators and camel-case humps,
/// lowercased, extension dropped.
pub fn path_keywords(path: &str) -> HashSet<String> {
    let mut keywords = HashSet::new();
    for segment in path.split(['/', '\\', '.', '_', '-']) {
        if segment.is_empty() {
            continue;
        }
        for word in split_camel_case(segment) {
            // Two-letter fragments are mostly extensions and noise.
            if word.len() >= 3 {
                keywords.insert(word);
            }
        }
    }
    keywords
}

fn split_camel_case(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in word.chars() {
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::ParsedRow;

/// How to log into a source: where the form lives and which fields to fill.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoginForm {
    pub url: String,
    pub login_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
}

/// Vendor-specific knowledge of a catalog site.
///
/// The crawl engine owns the browser and the state machine; a source only
/// describes how to log in and how to read the pages it is handed. New vendors
/// add an implementation and register it in a [`SourceRegistry`].
pub trait CrawlSource: Send + Sync {
    /// Registry key, also used to key persisted session state.
    fn name(&self) -> &str;

    /// The authentication recipe executed by the engine.
    fn login_form(&self) -> LoginForm;

    /// Whether `html` was served to a logged-in session.
    fn is_authenticated(&self, html: &str) -> bool;

    /// Parse every usable listing block on a page.
    ///
    /// Blocks without an identifier or a parseable price are skipped, not
    /// reported as errors.
    fn extract_rows(&self, html: &str, page_url: &str) -> Result<Vec<ParsedRow>, AppError>;

    /// Absolute URLs of the pagination links on a page.
    fn pagination_links(&self, html: &str, page_url: &str) -> Vec<String>;

    /// URL to actually navigate to for a frontier entry.
    fn page_url(&self, url: &str) -> String {
        url.to_string()
    }
}

/// Name → source lookup, built once at startup.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn CrawlSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source, replacing any previous one with the same name.
    pub fn register(&mut self, source: Arc<dyn CrawlSource>) {
        let name = source.name().to_string();
        if self.sources.insert(name.clone(), source).is_some() {
            tracing::warn!(source = %name, "Replacing previously registered crawl source");
        }
    }

    pub fn with(mut self, source: Arc<dyn CrawlSource>) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn CrawlSource>, AppError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::ConfigError(format!("No crawl source registered as '{name}'")))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

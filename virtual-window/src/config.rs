use serde::Deserialize;

use crate::{
    recency::MIN_CACHED_PAGES, scheduler::DEFAULT_MAX_CONCURRENT_FETCHES,
    store::DEFAULT_TARGET_BACKING_PAGE,
};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_CACHED_PAGES: usize = 16;
/// Count deltas above this many items are reported as a single reset.
pub const DEFAULT_INDIVIDUAL_NOTIFICATION_LIMIT: usize = 100;

#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_cached_pages")]
    pub cached_pages: usize,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_notification_limit")]
    pub individual_notification_limit: usize,
    #[serde(default = "default_target_backing_page")]
    pub target_backing_page: usize,
}

fn default_label() -> String {
    "virtual-window".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_cached_pages() -> usize {
    DEFAULT_CACHED_PAGES
}

fn default_max_concurrent_fetches() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}

fn default_notification_limit() -> usize {
    DEFAULT_INDIVIDUAL_NOTIFICATION_LIMIT
}

fn default_target_backing_page() -> usize {
    DEFAULT_TARGET_BACKING_PAGE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl EngineConfig {
    /// Page size is validated by the engine, not here.
    pub fn new(page_size: usize) -> Self {
        Self {
            label: default_label(),
            page_size,
            cached_pages: DEFAULT_CACHED_PAGES,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            individual_notification_limit: DEFAULT_INDIVIDUAL_NOTIFICATION_LIMIT,
            target_backing_page: DEFAULT_TARGET_BACKING_PAGE,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_cached_pages(mut self, pages: usize) -> Self {
        self.cached_pages = pages.max(MIN_CACHED_PAGES);
        self
    }

    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    pub fn with_individual_notification_limit(mut self, limit: usize) -> Self {
        self.individual_notification_limit = limit;
        self
    }

    pub fn with_target_backing_page(mut self, slots: usize) -> Self {
        self.target_backing_page = slots.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_clamp_inputs() {
        let config = EngineConfig::new(10)
            .with_cached_pages(2)
            .with_max_concurrent_fetches(0)
            .with_target_backing_page(0);
        assert_eq!(config.cached_pages, MIN_CACHED_PAGES);
        assert_eq!(config.max_concurrent_fetches, 1);
        assert_eq!(config.target_backing_page, 1);
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"page_size": 25, "label": "orders"}"#).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.label, "orders");
        assert_eq!(config.cached_pages, DEFAULT_CACHED_PAGES);
        assert_eq!(config.max_concurrent_fetches, 3);
        assert_eq!(config.individual_notification_limit, 100);
    }
}

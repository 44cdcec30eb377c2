use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Runtime-mutable plugin-style settings. Clients never hold onto a value
/// from here across calls; they take a fresh [`SharedConfig::snapshot`] per
/// operation so that edits made by the host take effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Raw semicolon-delimited cookie string for the scraped provider.
    pub douban_cookies: String,
    /// Trade throughput for a lower chance of the scraped provider blocking us.
    pub enable_anti_block: bool,
    /// Optional image-proxy base; when set, image URLs handed to the host are
    /// rewritten through it.
    pub douban_image_proxy_base_url: String,
    pub enable_tmdb_match: bool,
    pub tmdb_api_key: String,
    pub tmdb_host: String,
    pub tvdb_api_key: String,
    pub tvdb_pin: String,
    pub tvdb_host: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            douban_cookies: String::new(),
            enable_anti_block: false,
            douban_image_proxy_base_url: String::new(),
            enable_tmdb_match: true,
            tmdb_api_key: String::new(),
            tmdb_host: String::new(),
            tvdb_api_key: String::new(),
            tvdb_pin: String::new(),
            tvdb_host: String::new(),
        }
    }
}

impl Settings {
    /// Rewrites an image URL through the configured proxy, if any.
    pub fn proxy_image(&self, url: &str) -> String {
        let base = self.douban_image_proxy_base_url.trim();
        if base.is_empty() || url.is_empty() {
            return url.to_string();
        }
        format!("{}{}", base, urlencoding::encode(url))
    }
}

/// Shared configuration handle. Writers install a whole new snapshot; readers
/// clone an `Arc` and never observe a half-updated value.
#[derive(Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<Settings>>>,
}

impl SharedConfig {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.inner.read().unwrap().clone()
    }

    pub fn update(&self, settings: Settings) {
        *self.inner.write().unwrap() = Arc::new(settings);
    }

    /// Convenience for tests and hosts that tweak a single field.
    pub fn modify(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.inner.write().unwrap();
        let mut settings = (**guard).clone();
        f(&mut settings);
        *guard = Arc::new(settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_isolated_from_later_updates() {
        let config = SharedConfig::new(Settings::default());
        let before = config.snapshot();
        config.modify(|s| s.enable_anti_block = true);
        assert!(!before.enable_anti_block);
        assert!(config.snapshot().enable_anti_block);
    }

    #[test]
    fn proxy_image_rewrites_only_when_configured() {
        let mut settings = Settings::default();
        assert_eq!(settings.proxy_image("https://img2.example/p1.jpg"), "https://img2.example/p1.jpg");

        settings.douban_image_proxy_base_url = "https://proxy.local/image?url=".to_string();
        let proxied = settings.proxy_image("https://img2.example/p1.jpg");
        assert!(proxied.starts_with("https://proxy.local/image?url="));
        assert!(proxied.contains("img2.example"));
    }
}

use std::time::Duration;

/// Hosts of the three backend services plus the two image hosts the wizard links to.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    pub port: u16,
    pub thumbnail_service_url: String,
    pub upload_service_url: String,
    pub generation_service_url: String,
    /// Serves template previews under `/mockups/<category>/<id>`.
    pub mockup_host: String,
    /// Object storage the generated mockups are written to.
    pub storage_base_url: String,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    /// Sessions with no request for this long are discarded.
    pub session_ttl: Duration,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            thumbnail_service_url: "http://localhost:8081".into(),
            upload_service_url: "http://localhost:8082".into(),
            generation_service_url: "http://localhost:8083".into(),
            mockup_host: "http://localhost:8081".into(),
            storage_base_url: "http://localhost:9000/designs".into(),
            request_timeout: Duration::from_secs(60),
            max_upload_bytes: 25 * 1024 * 1024,
            session_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl WizardConfig {
    /// Reads overrides from the environment (call `dotenv` first to pick up a `.env` file).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let url = |key: &str, fallback: String| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| trim_url(&v))
                .unwrap_or(fallback)
        };
        Self {
            port: lookup("PORT").and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
            thumbnail_service_url: url("THUMBNAIL_SERVICE_URL", defaults.thumbnail_service_url),
            upload_service_url: url("UPLOAD_SERVICE_URL", defaults.upload_service_url),
            generation_service_url: url("GENERATION_SERVICE_URL", defaults.generation_service_url),
            mockup_host: url("MOCKUP_HOST", defaults.mockup_host),
            storage_base_url: url("STORAGE_BASE_URL", defaults.storage_base_url),
            request_timeout: lookup("REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_upload_bytes: lookup("MAX_UPLOAD_MB")
                .and_then(|v| v.parse::<usize>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.max_upload_bytes),
            session_ttl: lookup("SESSION_TTL_MINS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(|mins| Duration::from_secs(mins * 60))
                .unwrap_or(defaults.session_ttl),
        }
    }

    pub fn thumbnail_url(&self, category: &str, thumbnail: &str) -> String {
        format!("{}/mockups/{}/{}", self.mockup_host, category, thumbnail)
    }

    pub fn mockup_image_url(&self, mockup_key: &str) -> String {
        format!("{}/{}", self.storage_base_url, mockup_key.trim_start_matches('/'))
    }
}

fn trim_url(raw: &str) -> String { raw.trim().trim_end_matches('/').to_string() }

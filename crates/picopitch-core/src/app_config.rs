use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Reddit API credentials. Only the `scrape` command needs them.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub fast_model: String,
    pub deep_model: String,
    pub llm_timeout_secs: u64,
    pub llm_max_attempts: u32,
    pub llm_backoff_base_secs: u64,
    pub max_concurrent_tasks: usize,
    pub min_leads_for_theme: usize,
    pub theme_batch_size: usize,
    pub max_domains: usize,
    pub use_evidence: bool,
    pub output_dir: PathBuf,
    pub reddit: Option<RedditCredentials>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("gemini_base_url", &self.gemini_base_url)
            .field("fast_model", &self.fast_model)
            .field("deep_model", &self.deep_model)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("llm_max_attempts", &self.llm_max_attempts)
            .field("llm_backoff_base_secs", &self.llm_backoff_base_secs)
            .field("max_concurrent_tasks", &self.max_concurrent_tasks)
            .field("min_leads_for_theme", &self.min_leads_for_theme)
            .field("theme_batch_size", &self.theme_batch_size)
            .field("max_domains", &self.max_domains)
            .field("use_evidence", &self.use_evidence)
            .field("output_dir", &self.output_dir)
            .field("reddit", &self.reddit)
            .finish()
    }
}

// Connection settings shared by the worker and the CLI

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    /// Read `REDIS_URL`, falling back to a local instance
    pub fn from_env() -> Self {
        Self::from_value(std::env::var("REDIS_URL").ok())
    }

    fn from_value(value: Option<String>) -> Self {
        let url = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
        Self { url }
    }

    pub async fn connect(&self) -> redis::RedisResult<redis::aio::ConnectionManager> {
        let client = redis::Client::open(self.url.as_str())?;
        redis::aio::ConnectionManager::new(client).await
    }
}

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8082";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TEST_DELAY: Duration = Duration::from_millis(1000);
// The backend proxies speedtests with a 60s timeout of its own
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub backend_url: Url,
    pub refresh_interval: Duration,
    pub test_delay: Duration,
    pub request_timeout: Duration,
    pub report_file: Option<PathBuf>,
}

impl OrchestratorConfig {
    pub fn new(backend_url: Url) -> Self {
        Self {
            backend_url,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            test_delay: DEFAULT_TEST_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            report_file: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval.is_zero() {
            anyhow::bail!("refresh interval must be greater than zero");
        }
        if self.request_timeout.is_zero() {
            anyhow::bail!("request timeout must be greater than zero");
        }
        if !matches!(self.backend_url.scheme(), "http" | "https") {
            anyhow::bail!(
                "backend url must use http or https, got {}",
                self.backend_url.scheme()
            );
        }
        Ok(())
    }
}

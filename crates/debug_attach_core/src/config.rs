use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DESCRIPTOR_FILE_NAME: &str = "server.env";
pub const BACKUP_SUFFIX: &str = ".bak";
pub const DEBUG_PORT_KEY: &str = "WLP_DEBUG_ADDRESS";

/// Test-only override for the attach timeout, in whole seconds.
pub const TIMEOUT_ENV_VAR: &str = "DEBUG_ATTACH_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachConfig {
    pub host: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub descriptor_file_name: String,
    pub backup_suffix: String,
    pub debug_port_key: String,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            descriptor_file_name: DESCRIPTOR_FILE_NAME.to_string(),
            backup_suffix: BACKUP_SUFFIX.to_string(),
            debug_port_key: DEBUG_PORT_KEY.to_string(),
        }
    }
}

impl AttachConfig {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let timeout = timeout_from_value(std::env::var(TIMEOUT_ENV_VAR).ok().as_deref());

        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Number of poll iterations the timeout budget buys, rounded down.
    ///
    /// The waiter counts iterations rather than measuring wall-clock time, so a slow
    /// machine gets the same number of attempts as a fast one.
    pub fn max_attempts(&self) -> u64 {
        let interval = self.poll_interval.as_millis();
        if interval == 0 {
            return 0;
        }
        (self.timeout.as_millis() / interval) as u64
    }
}

fn timeout_from_value(value: Option<&str>) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT)
}

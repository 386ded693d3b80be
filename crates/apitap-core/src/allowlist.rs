//! Host allow-list.
//!
//! An empty list allows every host. A non-empty list only lets through
//! exchanges whose host is a member.

/// Environment variable carrying the comma-separated allow-list.
pub const ALLOWED_DOMAINS_ENV: &str = "ALLOWED_DOMAINS";

/// Set of hostnames exchanges are recorded for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    hosts: Vec<String>,
}

impl AllowList {
    /// Creates an empty allow-list (allows all hosts).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma-separated list of hostnames.
    ///
    /// Whitespace around entries and empty entries are dropped.
    pub fn parse(raw: &str) -> Self {
        Self::from_hosts(raw.split(','))
    }

    /// Builds an allow-list from individual hostnames.
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for host in hosts {
            let host = normalize_host(host.as_ref());
            if !host.is_empty() && !list.hosts.contains(&host) {
                list.hosts.push(host);
            }
        }
        list
    }

    /// Reads the allow-list from the `ALLOWED_DOMAINS` environment variable.
    ///
    /// Returns `None` when the variable is unset.
    pub fn from_env() -> Option<Self> {
        std::env::var(ALLOWED_DOMAINS_ENV)
            .ok()
            .map(|raw| Self::parse(&raw))
    }

    /// Returns true when no hosts are configured.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Returns the configured hosts in insertion order.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Returns whether an exchange for `host` should be recorded.
    pub fn allows(&self, host: &str) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = normalize_host(host);
        self.hosts.iter().any(|h| *h == host)
    }

    /// Joins the hosts back into the comma-separated wire form.
    pub fn to_env_value(&self) -> String {
        self.hosts.join(",")
    }
}

/// Hostnames compare case-insensitively and without a trailing dot.
fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

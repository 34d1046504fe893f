use std::net::SocketAddr;
use std::path::PathBuf;

use crate::notify::DEFAULT_EMAILJS_ENDPOINT;

pub const DEFAULT_JUDGE0_URL: &str = "https://judge0-ce.p.rapidapi.com";
pub const DEFAULT_JUDGE0_HOST: &str = "judge0-ce.p.rapidapi.com";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Base URL embedded in invitation links (e.g., "https://codepad.example.com").
    /// Falls back to the bind address when unset.
    pub public_base_url: Option<String>,
    /// Email delivery. Notifications are only logged when unset.
    pub email: Option<EmailConfig>,
    /// Remote execution service. Running code is rejected when unset.
    pub execution: Option<ExecutionConfig>,
}

/// EmailJS credentials and template.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
    pub endpoint: String,
}

impl EmailConfig {
    #[must_use]
    pub fn new(service_id: String, template_id: String, public_key: String) -> Self {
        Self {
            service_id,
            template_id,
            public_key,
            endpoint: DEFAULT_EMAILJS_ENDPOINT.to_string(),
        }
    }
}

/// Judge0 endpoint and RapidAPI credentials.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_host: String,
}

impl ExecutionConfig {
    #[must_use]
    pub fn rapidapi(api_key: String) -> Self {
        Self {
            base_url: DEFAULT_JUDGE0_URL.to_string(),
            api_key,
            api_host: DEFAULT_JUDGE0_HOST.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("codepad.db")
    }

    /// Base URL for invitation links, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            email: None,
            execution: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let config = ServerConfig {
            public_base_url: Some("https://codepad.example.com/".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(config.base_url(), "https://codepad.example.com");
    }

    #[test]
    fn test_base_url_defaults_to_bind_address() {
        let config = ServerConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
        assert_eq!(config.db_path(), PathBuf::from("./data/codepad.db"));
    }
}

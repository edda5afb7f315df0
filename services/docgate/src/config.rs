//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credentials never live in the TOML: each provider names an env prefix and
//! its accounts are read from `{PREFIX}_{i}_ID` / `_SECRET` (or `_KEY`).

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docgate_auth::{AuthScheme, Credential, SELF_SIGNED_TTL};
use docgate_core::PollSettings;
use docgate_pool::{QuotaPolicy, RateLimitParams};
use provider::{RestSettings, Tool};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Keyed by tool name (`pdf-to-word`, ...)
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Listener for `/admin/*`, never the public one. Loopback by default.
    #[serde(default = "default_admin_listen_addr")]
    pub admin_listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

/// Orchestration knobs shared by every provider
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_safety_margin")]
    pub token_safety_margin_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_max_attempts: default_poll_max_attempts(),
            cooldown_secs: default_cooldown(),
            token_safety_margin_secs: default_safety_margin(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// One remote provider
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    /// Prefix of the indexed credential env entries, e.g. "ADOBE"
    pub env_prefix: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub api_key_header: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Statuses treated as quota exhaustion on top of 429/402
    #[serde(default)]
    pub quota_statuses: Vec<u16>,
    #[serde(default)]
    pub quota_phrases: Vec<String>,
    /// Tool name → remote operation name
    #[serde(default)]
    pub operations: BTreeMap<String, String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthConfig {
    ClientCredentials {
        token_url: String,
    },
    SelfSigned {
        #[serde(default)]
        issuer: Option<String>,
        #[serde(default)]
        ttl_secs: Option<u64>,
    },
    #[default]
    ApiKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_per_window: u32,
    #[serde(default = "default_window")]
    pub window_secs: u64,
    #[serde(default)]
    pub min_interval_secs: u64,
}

/// Per-tool routing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolConfig {
    /// Provider ids in priority order
    #[serde(default)]
    pub chain: Vec<String>,
    /// Default output format when the request does not name one
    #[serde(default)]
    pub target_format: Option<String>,
    /// Offline converter argv with `{input}` / `{output}` / `{outdir}` placeholders
    #[serde(default)]
    pub local_command: Option<Vec<String>>,
}

fn default_max_connections() -> usize {
    256
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_drain_timeout() -> u64 {
    30
}

fn default_admin_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_poll_interval() -> u64 {
    2
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_cooldown() -> u64 {
    docgate_pool::DEFAULT_COOLDOWN.as_secs()
}

fn default_safety_margin() -> u64 {
    docgate_auth::DEFAULT_SAFETY_MARGIN.as_secs()
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_timeout() -> u64 {
    60
}

fn default_window() -> u64 {
    60
}

fn config_err(msg: impl Into<String>) -> common::Error {
    common::Error::Config(msg.into())
}

fn check_url(field: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(config_err(format!(
            "{field} must start with http:// or https://, got: {url}"
        )))
    }
}

fn parse_tool(name: &str) -> common::Result<Tool> {
    name.parse::<Tool>()
        .map_err(|_| config_err(format!("unknown tool: {name}")))
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.server.max_connections == 0 {
            return Err(config_err("max_connections must be greater than 0"));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(config_err("max_upload_bytes must be greater than 0"));
        }
        if self.server.drain_timeout_secs == 0 {
            return Err(config_err("drain_timeout_secs must be greater than 0"));
        }
        if self.server.admin_listen_addr == self.server.listen_addr {
            return Err(config_err("admin_listen_addr must differ from listen_addr"));
        }

        let gateway = &self.gateway;
        for (field, value) in [
            ("poll_interval_secs", gateway.poll_interval_secs),
            ("poll_max_attempts", u64::from(gateway.poll_max_attempts)),
            ("cooldown_secs", gateway.cooldown_secs),
            ("sweep_interval_secs", gateway.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(config_err(format!("{field} must be greater than 0")));
            }
        }

        let mut seen = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(config_err("provider id must not be empty"));
            }
            if seen.contains(&provider.id.as_str()) {
                return Err(config_err(format!("duplicate provider id: {}", provider.id)));
            }
            seen.push(provider.id.as_str());
            provider.validate()?;
        }

        for (name, tool) in &self.tools {
            parse_tool(name)?;
            for id in &tool.chain {
                if !seen.contains(&id.as_str()) {
                    return Err(config_err(format!(
                        "tool {name} chain names unknown provider: {id}"
                    )));
                }
            }
            if let Some(argv) = &tool.local_command
                && argv.first().is_none_or(|program| program.trim().is_empty())
            {
                return Err(config_err(format!("tool {name} local_command is empty")));
            }
            if let Some(format) = &tool.target_format
                && !crate::local::is_valid_format(format)
            {
                return Err(config_err(format!(
                    "tool {name} target_format must be a short alphanumeric extension"
                )));
            }
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("docgate.toml")
    }

    /// Tool sections with their names parsed. Names were checked at load.
    pub fn tools(&self) -> common::Result<Vec<(Tool, &ToolConfig)>> {
        self.tools
            .iter()
            .map(|(name, tool)| Ok((parse_tool(name)?, tool)))
            .collect()
    }

    pub fn tool(&self, tool: Tool) -> Option<&ToolConfig> {
        self.tools
            .iter()
            .find(|(name, _)| name.parse::<Tool>().ok() == Some(tool))
            .map(|(_, config)| config)
    }

    /// Read every provider's credentials from the process environment.
    pub fn load_credentials(&self) -> common::Result<HashMap<String, Vec<Credential>>> {
        self.load_credentials_with(|key| std::env::var(key).ok())
    }

    pub fn load_credentials_with<F>(
        &self,
        lookup: F,
    ) -> common::Result<HashMap<String, Vec<Credential>>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = HashMap::with_capacity(self.providers.len());
        for provider in &self.providers {
            let credentials =
                docgate_auth::load_indexed_from(&provider.id, &provider.env_prefix, &lookup)?;
            out.insert(provider.id.clone(), credentials);
        }
        Ok(out)
    }
}

impl GatewayConfig {
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.poll_max_attempts,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn token_safety_margin(&self) -> Duration {
        Duration::from_secs(self.token_safety_margin_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ProviderConfig {
    fn validate(&self) -> common::Result<()> {
        check_url(&format!("providers.{}.base_url", self.id), &self.base_url)?;
        if let AuthConfig::ClientCredentials { token_url } = &self.auth {
            check_url(&format!("providers.{}.auth.token_url", self.id), token_url)?;
        }
        if self.env_prefix.trim().is_empty() {
            return Err(config_err(format!(
                "providers.{}.env_prefix must not be empty",
                self.id
            )));
        }
        if self.timeout_secs == 0 {
            return Err(config_err(format!(
                "providers.{}.timeout_secs must be greater than 0",
                self.id
            )));
        }
        if let Some(limit) = &self.rate_limit
            && (limit.max_per_window == 0 || limit.window_secs == 0)
        {
            return Err(config_err(format!(
                "providers.{}.rate_limit needs a non-zero max_per_window and window_secs",
                self.id
            )));
        }
        for name in self.operations.keys() {
            parse_tool(name)?;
        }
        Ok(())
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        match &self.auth {
            AuthConfig::ClientCredentials { token_url } => AuthScheme::ClientCredentials {
                token_url: token_url.clone(),
            },
            AuthConfig::SelfSigned { issuer, ttl_secs } => AuthScheme::SelfSigned {
                issuer: issuer.clone(),
                ttl: ttl_secs.map(Duration::from_secs).unwrap_or(SELF_SIGNED_TTL),
            },
            AuthConfig::ApiKey => AuthScheme::ApiKey,
        }
    }

    pub fn rest_settings(&self) -> common::Result<RestSettings> {
        let operations = self
            .operations
            .iter()
            .map(|(name, op)| Ok((parse_tool(name)?, op.clone())))
            .collect::<common::Result<HashMap<_, _>>>()?;
        Ok(RestSettings {
            id: self.id.clone(),
            base_url: self.base_url.clone(),
            api_key_header: self.api_key_header.clone(),
            operations,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    pub fn rate_limit_params(&self) -> Option<RateLimitParams> {
        self.rate_limit.as_ref().map(|limit| RateLimitParams {
            max_per_window: limit.max_per_window,
            window: Duration::from_secs(limit.window_secs),
            min_interval: Duration::from_secs(limit.min_interval_secs),
        })
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy::new(self.quota_statuses.clone(), self.quota_phrases.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    pub(crate) fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:8080"

[gateway]
poll_interval_secs = 1

[[providers]]
id = "adobe"
base_url = "https://pdf-services.example.com"
env_prefix = "ADOBE"
api_key_header = "x-api-key"
quota_statuses = [403]

[providers.auth]
scheme = "client_credentials"
token_url = "https://ims.example.com/token"

[providers.rate_limit]
max_per_window = 20
min_interval_secs = 3

[providers.operations]
pdf-to-word = "exportpdf"
compress-pdf = "compresspdf"

[[providers]]
id = "convertapi"
base_url = "https://v2.convertapi.example.com"
env_prefix = "CONVERTAPI"

[providers.operations]
pdf-to-word = "pdf/to/docx"

[tools.pdf-to-word]
chain = ["adobe", "convertapi"]
target_format = "docx"
local_command = ["soffice", "--headless", "--convert-to", "docx", "--outdir", "{outdir}", "{input}"]

[tools.compress-pdf]
chain = ["adobe"]
"#
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn load_str(contents: &str) -> common::Result<Config> {
        let file = write_config(contents);
        Config::load(file.path())
    }

    #[test]
    fn test_load_valid_config() {
        let config = load_str(valid_toml()).unwrap();

        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.server.max_connections, 256);
        assert_eq!(config.server.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(
            config.server.admin_listen_addr,
            "127.0.0.1:9090".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.gateway.poll_interval_secs, 1);
        assert_eq!(config.gateway.poll_max_attempts, 60);
        assert_eq!(config.gateway.cooldown(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.providers.len(), 2);

        let adobe = &config.providers[0];
        assert_eq!(
            adobe.auth_scheme(),
            AuthScheme::ClientCredentials {
                token_url: "https://ims.example.com/token".into()
            }
        );
        let limit = adobe.rate_limit_params().unwrap();
        assert_eq!(limit.max_per_window, 20);
        assert_eq!(limit.window, Duration::from_secs(60));
        assert_eq!(limit.min_interval, Duration::from_secs(3));
        assert_eq!(adobe.quota_policy().extra_statuses, vec![403]);

        let convertapi = &config.providers[1];
        assert_eq!(convertapi.auth_scheme(), AuthScheme::ApiKey);
        assert!(convertapi.rate_limit_params().is_none());
    }

    #[test]
    fn test_rest_settings_parse_operations() {
        let config = load_str(valid_toml()).unwrap();
        let settings = config.providers[0].rest_settings().unwrap();
        assert_eq!(settings.id, "adobe");
        assert_eq!(
            settings.operations.get(&Tool::PdfToWord).map(String::as_str),
            Some("exportpdf")
        );
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert_eq!(settings.api_key_header.as_deref(), Some("x-api-key"));
    }

    #[test]
    fn test_tools_are_parsed() {
        let config = load_str(valid_toml()).unwrap();
        let tools = config.tools().unwrap();
        assert_eq!(tools.len(), 2);

        let pdf = config.tool(Tool::PdfToWord).unwrap();
        assert_eq!(pdf.chain, vec!["adobe", "convertapi"]);
        assert_eq!(pdf.target_format.as_deref(), Some("docx"));
        assert!(config.tool(Tool::MergePdf).is_none());
    }

    #[test]
    fn test_self_signed_defaults_ttl() {
        let toml = r#"
[server]
listen_addr = "127.0.0.1:8080"

[[providers]]
id = "ilovepdf"
base_url = "https://api.ilovepdf.example.com"
env_prefix = "ILOVEPDF"

[providers.auth]
scheme = "self_signed"
"#;
        let config = load_str(toml).unwrap();
        assert_eq!(
            config.providers[0].auth_scheme(),
            AuthScheme::SelfSigned {
                issuer: None,
                ttl: SELF_SIGNED_TTL
            }
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/docgate.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = load_str("not valid {{{{ toml");
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let toml = valid_toml().replace(
            "https://pdf-services.example.com",
            "pdf-services.example.com",
        );
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("base_url"), "got: {err}");
    }

    #[test]
    fn test_invalid_token_url_rejected() {
        let toml = valid_toml().replace("https://ims.example.com/token", "ims/token");
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("token_url"), "got: {err}");
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let toml = valid_toml().replace("poll_interval_secs = 1", "poll_interval_secs = 0");
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("poll_interval_secs"), "got: {err}");

        let toml = valid_toml().replace(
            "poll_interval_secs = 1",
            "poll_interval_secs = 1\nsweep_interval_secs = 0",
        );
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("sweep_interval_secs"), "got: {err}");
    }

    #[test]
    fn test_admin_listener_sharing_public_port_rejected() {
        let toml = valid_toml().replace(
            r#"listen_addr = "127.0.0.1:8080""#,
            "listen_addr = \"127.0.0.1:8080\"\nadmin_listen_addr = \"127.0.0.1:8080\"",
        );
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("admin_listen_addr"), "got: {err}");
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let toml = valid_toml().replace("max_per_window = 20", "max_per_window = 0");
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("rate_limit"), "got: {err}");
    }

    #[test]
    fn test_chain_with_unknown_provider_rejected() {
        let toml = valid_toml().replace(r#"chain = ["adobe"]"#, r#"chain = ["smallpdf"]"#);
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("smallpdf"), "got: {err}");
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let toml = valid_toml().replace("[tools.compress-pdf]", "[tools.pdf-to-excel]");
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("pdf-to-excel"), "got: {err}");

        let toml = valid_toml().replace(
            r#"compress-pdf = "compresspdf""#,
            r#"ocr = "ocr""#,
        );
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("unknown tool: ocr"), "got: {err}");
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let toml = valid_toml().replace(r#"id = "convertapi""#, r#"id = "adobe""#);
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("duplicate provider id"), "got: {err}");
    }

    #[test]
    fn test_empty_local_command_rejected() {
        let toml = valid_toml().replace(
            r#"[tools.compress-pdf]
chain = ["adobe"]"#,
            r#"[tools.compress-pdf]
chain = ["adobe"]
local_command = []"#,
        );
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("local_command"), "got: {err}");
    }

    #[test]
    fn test_unsafe_target_format_rejected() {
        let toml = valid_toml().replace(r#"target_format = "docx""#, r#"target_format = "docx; id""#);
        let err = load_str(&toml).unwrap_err().to_string();
        assert!(err.contains("target_format"), "got: {err}");
    }

    #[test]
    fn test_load_credentials_per_provider() {
        let config = load_str(valid_toml()).unwrap();
        let env: HashMap<&str, &str> = [
            ("ADOBE_1_ID", "client-a"),
            ("ADOBE_1_SECRET", "secret-a"),
            ("ADOBE_2_ID", "client-b"),
            ("ADOBE_2_SECRET", "secret-b"),
            ("CONVERTAPI_1_KEY", "key-1"),
        ]
        .into_iter()
        .collect();

        let credentials = config
            .load_credentials_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(credentials["adobe"].len(), 2);
        assert_eq!(credentials["adobe"][1].public_id, "client-b");
        assert_eq!(credentials["convertapi"].len(), 1);
    }

    #[test]
    fn test_load_credentials_half_pair_is_an_error() {
        let config = load_str(valid_toml()).unwrap();
        let result = config.load_credentials_with(|key| {
            (key == "ADOBE_1_ID").then(|| String::from("client-a"))
        });
        assert!(matches!(result, Err(common::Error::Env { .. })));
    }

    #[test]
    fn test_load_credentials_reads_process_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let config = load_str(valid_toml()).unwrap();

        unsafe { set_env("CONVERTAPI_1_KEY", "from-env") };
        let credentials = config.load_credentials().unwrap();
        unsafe { remove_env("CONVERTAPI_1_KEY") };

        assert_eq!(credentials["convertapi"].len(), 1);
        assert_eq!(credentials["convertapi"][0].secret.expose(), "from-env");
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("docgate.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}

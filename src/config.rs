use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::history::TokenBudget;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_REFERENCE_COUNT: usize = 8;
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const BING_SEARCH_V7_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
pub const GOOGLE_SEARCH_ENDPOINT: &str = "https://customsearch.googleapis.com/customsearch/v1";
pub const SERPER_SEARCH_ENDPOINT: &str = "https://google.serper.dev/search";
pub const SEARCHAPI_SEARCH_ENDPOINT: &str = "https://www.searchapi.io/api/v1/search";
pub const SEARCHPRO_ENDPOINT: &str = "https://open.bigmodel.cn/api/paas/v4/tools";
pub const DDGS_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    MissingCredential(&'static str),

    #[error("unsupported search backend: {0}")]
    UnknownBackend(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    SearchPro,
    Bing,
    Google,
    Serper,
    SearchApi,
    Ddgs,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SEARCHPRO" => Ok(BackendKind::SearchPro),
            "BING" => Ok(BackendKind::Bing),
            "GOOGLE" => Ok(BackendKind::Google),
            "SERPER" => Ok(BackendKind::Serper),
            "SEARCHAPI" => Ok(BackendKind::SearchApi),
            "DDGS" => Ok(BackendKind::Ddgs),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::SearchPro => "SEARCHPRO",
            BackendKind::Bing => "BING",
            BackendKind::Google => "GOOGLE",
            BackendKind::Serper => "SERPER",
            BackendKind::SearchApi => "SEARCHAPI",
            BackendKind::Ddgs => "DDGS",
        })
    }
}

/// Credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai: Option<ApiKey>,
    pub zhipuai: Option<ApiKey>,
    pub bing: Option<ApiKey>,
    pub google: Option<ApiKey>,
    pub google_cx: Option<ApiKey>,
    pub serper: Option<ApiKey>,
    pub searchapi: Option<ApiKey>,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub openai: String,
    pub bing: String,
    pub google: String,
    pub serper: String,
    pub searchapi: String,
    pub searchpro: String,
    pub ddgs: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openai: OPENAI_BASE_URL.to_string(),
            bing: BING_SEARCH_V7_ENDPOINT.to_string(),
            google: GOOGLE_SEARCH_ENDPOINT.to_string(),
            serper: SERPER_SEARCH_ENDPOINT.to_string(),
            searchapi: SEARCHAPI_SEARCH_ENDPOINT.to_string(),
            searchpro: SEARCHPRO_ENDPOINT.to_string(),
            ddgs: DDGS_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,
    pub reference_count: usize,
    pub search_timeout: Duration,

    pub model: String,
    pub llm_timeout: Duration,
    pub token_budget: TokenBudget,

    pub enable_related_questions: bool,
    pub enable_rewrite_question: bool,
    pub enable_history: bool,

    pub credentials: Credentials,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            reference_count: DEFAULT_REFERENCE_COUNT,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            model: DEFAULT_MODEL.to_string(),
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            token_budget: TokenBudget::default(),
            enable_related_questions: true,
            enable_rewrite_question: false,
            enable_history: false,
            credentials: Credentials::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset variables
    /// keep their defaults; blank credentials count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(backend) = lookup("BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(model) = lookup("LLM_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model.trim().to_string();
        }

        config.enable_related_questions = flag(&lookup, "RELATED_QUESTIONS", true);
        config.enable_rewrite_question = flag(&lookup, "REWRITE_QUESTION", false);
        config.enable_history = flag(&lookup, "ENABLE_HISTORY", false);

        if let Some(n) = number(&lookup, "REFERENCE_COUNT")? {
            config.reference_count = n;
        }
        if let Some(secs) = number(&lookup, "SEARCH_TIMEOUT_SECS")? {
            config.search_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = number(&lookup, "LLM_TIMEOUT_SECS")? {
            config.llm_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = number(&lookup, "TOKEN_UPPER_LIMIT")? {
            config.token_budget.upper_limit = n;
        }
        if let Some(n) = number(&lookup, "TOKEN_TO_CHAR_RATIO")? {
            config.token_budget.chars_per_token = n;
        }
        if let Some(f) = number(&lookup, "REDUCE_TOKEN_FACTOR")? {
            config.token_budget.reduce_factor = f;
        }

        let secret = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(ApiKey)
        };
        config.credentials = Credentials {
            openai: secret("OPENAI_API_KEY"),
            zhipuai: secret("ZHIPUAI_API_KEY"),
            bing: secret("BING_SEARCH_V7_SUBSCRIPTION_KEY"),
            google: secret("GOOGLE_SEARCH_API_KEY"),
            google_cx: secret("GOOGLE_SEARCH_CX"),
            serper: secret("SERPER_SEARCH_API_KEY"),
            searchapi: secret("SEARCHAPI_API_KEY"),
        };

        if let Some(base) = lookup("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.endpoints.openai = base.trim().trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    /// Fails when the selected backend's credentials are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let creds = &self.credentials;
        match self.backend {
            BackendKind::SearchPro if creds.zhipuai.is_none() => {
                Err(ConfigError::MissingCredential("ZHIPUAI_API_KEY"))
            }
            BackendKind::Bing if creds.bing.is_none() => Err(ConfigError::MissingCredential(
                "BING_SEARCH_V7_SUBSCRIPTION_KEY",
            )),
            BackendKind::Google if creds.google.is_none() || creds.google_cx.is_none() => Err(
                ConfigError::MissingCredential("GOOGLE_SEARCH_API_KEY or GOOGLE_SEARCH_CX"),
            ),
            BackendKind::Serper if creds.serper.is_none() => {
                Err(ConfigError::MissingCredential("SERPER_SEARCH_API_KEY"))
            }
            BackendKind::SearchApi if creds.searchapi.is_none() => {
                Err(ConfigError::MissingCredential("SEARCHAPI_API_KEY"))
            }
            _ => Ok(()),
        }
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    lookup(name)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            var: name,
            value: raw,
        })
}

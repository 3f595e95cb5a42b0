use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpm::band::CpmRates;
use crate::cpm::flexibility::FlexibilityConfig;
use crate::cpm::reach::ReachReducerConfig;
use crate::domain::thread::Platform;
use crate::validation::GateConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub pricing: PricingConfig,
    pub reach: ReachReducerConfig,
    pub flexibility: FlexibilityConfig,
    pub validation: GateConfig,
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub round_cap: u32,
    pub confidence_threshold: f64,
    pub question_policy: QuestionPolicy,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub short_form_video: CpmRates,
    pub photo_feed: CpmRates,
    pub long_form_video: CpmRates,
}

impl PricingConfig {
    pub fn rates_for(&self, platform: Platform) -> &CpmRates {
        match platform {
            Platform::ShortFormVideo => &self.short_form_video,
            Platform::PhotoFeed => &self.photo_feed,
            Platform::LongFormVideo => &self.long_form_video,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Whether the engine may answer a counterpart question autonomously or must
/// always hand questions to a human.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPolicy {
    AnswerAutonomously,
    AlwaysEscalate,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub round_cap: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                round_cap: 5,
                confidence_threshold: 0.75,
                question_policy: QuestionPolicy::AlwaysEscalate,
            },
            pricing: PricingConfig {
                short_form_video: CpmRates {
                    floor: Decimal::from(20),
                    target: Decimal::from(25),
                    ceiling: Decimal::from(30),
                },
                photo_feed: CpmRates {
                    floor: Decimal::from(8),
                    target: Decimal::from(11),
                    ceiling: Decimal::from(14),
                },
                long_form_video: CpmRates {
                    floor: Decimal::from(16),
                    target: Decimal::from(22),
                    ceiling: Decimal::from(28),
                },
            },
            reach: ReachReducerConfig::default(),
            flexibility: FlexibilityConfig::default(),
            validation: GateConfig::default(),
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            database: DatabaseConfig {
                url: "sqlite://parley.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for QuestionPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "answer_autonomously" => Ok(Self::AnswerAutonomously),
            "always_escalate" => Ok(Self::AlwaysEscalate),
            other => Err(ConfigError::Validation(format!(
                "unsupported question policy `{other}` (expected answer_autonomously|always_escalate)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(engine) = patch.engine {
            if let Some(round_cap) = engine.round_cap {
                self.engine.round_cap = round_cap;
            }
            if let Some(confidence_threshold) = engine.confidence_threshold {
                self.engine.confidence_threshold = confidence_threshold;
            }
            if let Some(question_policy) = engine.question_policy {
                self.engine.question_policy = question_policy;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(rates) = pricing.short_form_video {
                self.pricing.short_form_video = rates;
            }
            if let Some(rates) = pricing.photo_feed {
                self.pricing.photo_feed = rates;
            }
            if let Some(rates) = pricing.long_form_video {
                self.pricing.long_form_video = rates;
            }
        }

        if let Some(reach) = patch.reach {
            if let Some(deviation_multiplier) = reach.deviation_multiplier {
                self.reach.deviation_multiplier = deviation_multiplier;
            }
            if let Some(min_surviving_samples) = reach.min_surviving_samples {
                self.reach.min_surviving_samples = min_surviving_samples;
            }
        }

        if let Some(flexibility) = patch.flexibility {
            if let Some(tiers) = flexibility.tiers {
                self.flexibility.tiers = tiers;
            }
            if let Some(hard_cap_ratio) = flexibility.hard_cap_ratio {
                self.flexibility.hard_cap_ratio = hard_cap_ratio;
            }
        }

        if let Some(validation) = patch.validation {
            if let Some(denied_commitments) = validation.denied_commitments {
                self.validation.denied_commitments = denied_commitments;
            }
            if let Some(forbidden_content) = validation.forbidden_content {
                self.validation.forbidden_content = forbidden_content;
            }
            if let Some(min_draft_chars) = validation.min_draft_chars {
                self.validation.min_draft_chars = min_draft_chars;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(llm_api_key_value.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARLEY_ENGINE_ROUND_CAP") {
            self.engine.round_cap = parse_u32("PARLEY_ENGINE_ROUND_CAP", &value)?;
        }
        if let Some(value) = read_env("PARLEY_ENGINE_CONFIDENCE_THRESHOLD") {
            self.engine.confidence_threshold =
                parse_f64("PARLEY_ENGINE_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("PARLEY_ENGINE_QUESTION_POLICY") {
            self.engine.question_policy = value.parse()?;
        }

        if let Some(value) = read_env("PARLEY_REACH_DEVIATION_MULTIPLIER") {
            self.reach.deviation_multiplier =
                parse_decimal("PARLEY_REACH_DEVIATION_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("PARLEY_FLEXIBILITY_HARD_CAP_RATIO") {
            self.flexibility.hard_cap_ratio =
                parse_decimal("PARLEY_FLEXIBILITY_HARD_CAP_RATIO", &value)?;
        }
        if let Some(value) = read_env("PARLEY_VALIDATION_MIN_DRAFT_CHARS") {
            self.validation.min_draft_chars =
                parse_u32("PARLEY_VALIDATION_MIN_DRAFT_CHARS", &value)? as usize;
        }

        if let Some(value) = read_env("PARLEY_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PARLEY_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("PARLEY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PARLEY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PARLEY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PARLEY_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("PARLEY_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PARLEY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PARLEY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PARLEY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PARLEY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(round_cap) = overrides.round_cap {
            self.engine.round_cap = round_cap;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine(&self.engine)?;
        validate_pricing(&self.pricing)?;
        validate_reach(&self.reach)?;
        validate_flexibility(&self.flexibility)?;
        validate_validation(&self.validation)?;
        validate_llm(&self.llm)?;
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.round_cap == 0 || engine.round_cap > 20 {
        return Err(ConfigError::Validation(
            "engine.round_cap must be in range 1..=20".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&engine.confidence_threshold) {
        return Err(ConfigError::Validation(
            "engine.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }
    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    for (channel, rates) in [
        ("short_form_video", &pricing.short_form_video),
        ("photo_feed", &pricing.photo_feed),
        ("long_form_video", &pricing.long_form_video),
    ] {
        rates.validate().map_err(|error| {
            ConfigError::Validation(format!("pricing.{channel}: {error}"))
        })?;
    }
    Ok(())
}

fn validate_reach(reach: &ReachReducerConfig) -> Result<(), ConfigError> {
    if reach.deviation_multiplier <= Decimal::ONE {
        return Err(ConfigError::Validation(
            "reach.deviation_multiplier must be greater than 1".to_string(),
        ));
    }
    if reach.min_surviving_samples == 0 {
        return Err(ConfigError::Validation(
            "reach.min_surviving_samples must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_flexibility(flexibility: &FlexibilityConfig) -> Result<(), ConfigError> {
    let tiers = &flexibility.tiers;
    if tiers.moderate_threshold > tiers.high_threshold {
        return Err(ConfigError::Validation(
            "flexibility.tiers thresholds must be ordered moderate <= high".to_string(),
        ));
    }
    if tiers.moderate_premium < Decimal::ZERO || tiers.high_premium < Decimal::ZERO {
        return Err(ConfigError::Validation(
            "flexibility.tiers premiums must be non-negative".to_string(),
        ));
    }
    if flexibility.hard_cap_ratio < Decimal::ONE {
        return Err(ConfigError::Validation(
            "flexibility.hard_cap_ratio must be at least 1.0".to_string(),
        ));
    }
    Ok(())
}

fn validate_validation(validation: &GateConfig) -> Result<(), ConfigError> {
    if validation.min_draft_chars == 0 || validation.min_draft_chars > 5_000 {
        return Err(ConfigError::Validation(
            "validation.min_draft_chars must be in range 1..=5000".to_string(),
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    engine: Option<EnginePatch>,
    pricing: Option<PricingPatch>,
    reach: Option<ReachPatch>,
    flexibility: Option<FlexibilityPatch>,
    validation: Option<ValidationPatch>,
    llm: Option<LlmPatch>,
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    round_cap: Option<u32>,
    confidence_threshold: Option<f64>,
    question_policy: Option<QuestionPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    short_form_video: Option<CpmRates>,
    photo_feed: Option<CpmRates>,
    long_form_video: Option<CpmRates>,
}

#[derive(Debug, Default, Deserialize)]
struct ReachPatch {
    deviation_multiplier: Option<Decimal>,
    min_surviving_samples: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct FlexibilityPatch {
    tiers: Option<crate::cpm::flexibility::EngagementTiers>,
    hard_cap_ratio: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationPatch {
    denied_commitments: Option<Vec<String>>,
    forbidden_content: Option<Vec<String>>,
    min_draft_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

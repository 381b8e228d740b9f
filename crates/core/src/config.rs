use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::search::SearchFilter;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub search: SearchFilter,
    pub telegram: TelegramConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SourceConfig {
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub api_base_url: String,
    pub username: String,
    pub token: SecretString,
    pub warning_token: SecretString,
    pub group_id: i64,
    pub commander_ids: Vec<i64>,
    pub timeout_secs: u64,
    pub long_poll_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub poll_interval_secs: u64,
    pub alert_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub login_refresh_secs: u64,
    pub login_settle_secs: u64,
    pub primary_tick_ms: u64,
    pub escalation_tick_ms: u64,
    pub command_tick_ms: u64,
    pub command_backlog_limit: usize,
    pub command_staleness_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub source_base_url: Option<String>,
    pub source_username: Option<String>,
    pub source_password: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_warning_token: Option<String>,
    pub telegram_group_id: Option<i64>,
    pub telegram_commander_ids: Option<Vec<i64>>,
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
            source: SourceConfig {
                base_url: "https://api.apelgamo.com".to_string(),
                username: String::new(),
                password: String::new().into(),
                timeout_secs: 30,
                user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36".to_string(),
            },
            search: SearchFilter::default(),
            telegram: TelegramConfig {
                api_base_url: "https://api.telegram.org".to_string(),
                username: String::new(),
                token: String::new().into(),
                warning_token: String::new().into(),
                group_id: 0,
                commander_ids: Vec::new(),
                timeout_secs: 15,
                long_poll_secs: 10,
            },
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            alert_interval_secs: 10,
            error_backoff_secs: 300,
            login_refresh_secs: 1800,
            login_settle_secs: 10,
            primary_tick_ms: 2_000,
            escalation_tick_ms: 3_000,
            command_tick_ms: 1_000,
            command_backlog_limit: 2,
            command_staleness_secs: 10,
        }
    }
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn login_refresh(&self) -> Duration {
        Duration::from_secs(self.login_refresh_secs)
    }

    pub fn login_settle(&self) -> Duration {
        Duration::from_secs(self.login_settle_secs)
    }

    pub fn primary_tick(&self) -> Duration {
        Duration::from_millis(self.primary_tick_ms)
    }

    pub fn escalation_tick(&self) -> Duration {
        Duration::from_millis(self.escalation_tick_ms)
    }

    pub fn command_tick(&self) -> Duration {
        Duration::from_millis(self.command_tick_ms)
    }

    pub fn command_staleness(&self) -> Duration {
        Duration::from_secs(self.command_staleness_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("slotwatch.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Multi-line summary with secrets reduced to set/unset markers.
    pub fn redacted_summary(&self) -> String {
        let secret_state = |secret: &SecretString| {
            if secret.expose_secret().is_empty() {
                "<unset>"
            } else {
                "<redacted>"
            }
        };

        [
            format!("source.base_url = {}", self.source.base_url),
            format!("source.username = {}", self.source.username),
            format!("source.password = {}", secret_state(&self.source.password)),
            format!(
                "search = brand:{} branch:{} hall:{} dates:{}..{} weekday:{} time:{}",
                self.search.brand,
                self.search.branch,
                self.search.hall,
                self.search.start_date,
                self.search.end_date,
                self.search.weekday,
                self.search.time
            ),
            format!("telegram.username = {}", self.telegram.username),
            format!("telegram.token = {}", secret_state(&self.telegram.token)),
            format!("telegram.warning_token = {}", secret_state(&self.telegram.warning_token)),
            format!("telegram.group_id = {}", self.telegram.group_id),
            format!("telegram.commander_ids = {:?}", self.telegram.commander_ids),
            format!("schedule = {:?}", self.schedule),
            format!("logging = {} ({:?})", self.logging.level, self.logging.format),
        ]
        .join("\n")
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(source) = patch.source {
            if let Some(base_url) = source.base_url {
                self.source.base_url = base_url;
            }
            if let Some(username) = source.username {
                self.source.username = username;
            }
            if let Some(password_value) = source.password {
                self.source.password = secret_value(password_value);
            }
            if let Some(timeout_secs) = source.timeout_secs {
                self.source.timeout_secs = timeout_secs;
            }
            if let Some(user_agent) = source.user_agent {
                self.source.user_agent = user_agent;
            }
        }

        if let Some(search) = patch.search {
            if let Some(brand) = search.brand {
                self.search.brand = brand;
            }
            if let Some(branch) = search.branch {
                self.search.branch = branch;
            }
            if let Some(hall) = search.hall {
                self.search.hall = hall;
            }
            if let Some(start_date) = search.start_date {
                self.search.start_date = start_date;
            }
            if let Some(end_date) = search.end_date {
                self.search.end_date = end_date;
            }
            if let Some(weekday) = search.weekday {
                self.search.weekday = weekday;
            }
            if let Some(time) = search.time {
                self.search.time = time;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(username) = telegram.username {
                self.telegram.username = username;
            }
            if let Some(token_value) = telegram.token {
                self.telegram.token = secret_value(token_value);
            }
            if let Some(warning_token_value) = telegram.warning_token {
                self.telegram.warning_token = secret_value(warning_token_value);
            }
            if let Some(group_id) = telegram.group_id {
                self.telegram.group_id = group_id;
            }
            if let Some(commander_ids) = telegram.commander_ids {
                self.telegram.commander_ids = commander_ids;
            }
            if let Some(timeout_secs) = telegram.timeout_secs {
                self.telegram.timeout_secs = timeout_secs;
            }
            if let Some(long_poll_secs) = telegram.long_poll_secs {
                self.telegram.long_poll_secs = long_poll_secs;
            }
        }

        if let Some(schedule) = patch.schedule {
            let target = &mut self.schedule;
            let pairs = [
                (schedule.poll_interval_secs, &mut target.poll_interval_secs),
                (schedule.alert_interval_secs, &mut target.alert_interval_secs),
                (schedule.error_backoff_secs, &mut target.error_backoff_secs),
                (schedule.login_refresh_secs, &mut target.login_refresh_secs),
                (schedule.login_settle_secs, &mut target.login_settle_secs),
                (schedule.primary_tick_ms, &mut target.primary_tick_ms),
                (schedule.escalation_tick_ms, &mut target.escalation_tick_ms),
                (schedule.command_tick_ms, &mut target.command_tick_ms),
                (schedule.command_staleness_secs, &mut target.command_staleness_secs),
            ];
            for (value, slot) in pairs {
                if let Some(value) = value {
                    *slot = value;
                }
            }
            if let Some(command_backlog_limit) = schedule.command_backlog_limit {
                target.command_backlog_limit = command_backlog_limit;
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
        if let Some(value) = read_env("SLOTWATCH_SOURCE_BASE_URL") {
            self.source.base_url = value;
        }
        if let Some(value) = read_env("SLOTWATCH_SOURCE_USERNAME") {
            self.source.username = value;
        }
        if let Some(value) = read_env("SLOTWATCH_SOURCE_PASSWORD") {
            self.source.password = secret_value(value);
        }
        if let Some(value) = read_env("SLOTWATCH_SOURCE_TIMEOUT_SECS") {
            self.source.timeout_secs = parse_u64("SLOTWATCH_SOURCE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SLOTWATCH_SEARCH_BRAND") {
            self.search.brand = value;
        }
        if let Some(value) = read_env("SLOTWATCH_SEARCH_BRANCH") {
            self.search.branch = value;
        }
        if let Some(value) = read_env("SLOTWATCH_SEARCH_HALL") {
            self.search.hall = value;
        }
        if let Some(value) = read_env("SLOTWATCH_SEARCH_START_DATE") {
            self.search.start_date = value;
        }
        if let Some(value) = read_env("SLOTWATCH_SEARCH_END_DATE") {
            self.search.end_date = value;
        }
        if let Some(value) = read_env("SLOTWATCH_SEARCH_WEEKDAY") {
            self.search.weekday = value;
        }
        if let Some(value) = read_env("SLOTWATCH_SEARCH_TIME") {
            self.search.time = value;
        }

        if let Some(value) = read_env("SLOTWATCH_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("SLOTWATCH_TELEGRAM_USERNAME") {
            self.telegram.username = value;
        }
        if let Some(value) = read_env("SLOTWATCH_TELEGRAM_TOKEN") {
            self.telegram.token = secret_value(value);
        }
        if let Some(value) = read_env("SLOTWATCH_TELEGRAM_WARNING_TOKEN") {
            self.telegram.warning_token = secret_value(value);
        }
        if let Some(value) = read_env("SLOTWATCH_TELEGRAM_GROUP_ID") {
            self.telegram.group_id = parse_i64("SLOTWATCH_TELEGRAM_GROUP_ID", &value)?;
        }
        if let Some(value) = read_env("SLOTWATCH_TELEGRAM_COMMANDER_IDS") {
            self.telegram.commander_ids =
                parse_id_list("SLOTWATCH_TELEGRAM_COMMANDER_IDS", &value)?;
        }

        if let Some(value) = read_env("SLOTWATCH_SCHEDULE_POLL_INTERVAL_SECS") {
            self.schedule.poll_interval_secs =
                parse_u64("SLOTWATCH_SCHEDULE_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("SLOTWATCH_SCHEDULE_ERROR_BACKOFF_SECS") {
            self.schedule.error_backoff_secs =
                parse_u64("SLOTWATCH_SCHEDULE_ERROR_BACKOFF_SECS", &value)?;
        }

        let log_level =
            read_env("SLOTWATCH_LOGGING_LEVEL").or_else(|| read_env("SLOTWATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SLOTWATCH_LOGGING_FORMAT").or_else(|| read_env("SLOTWATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(base_url) = overrides.source_base_url {
            self.source.base_url = base_url;
        }
        if let Some(username) = overrides.source_username {
            self.source.username = username;
        }
        if let Some(password) = overrides.source_password {
            self.source.password = secret_value(password);
        }
        if let Some(token) = overrides.telegram_token {
            self.telegram.token = secret_value(token);
        }
        if let Some(warning_token) = overrides.telegram_warning_token {
            self.telegram.warning_token = secret_value(warning_token);
        }
        if let Some(group_id) = overrides.telegram_group_id {
            self.telegram.group_id = group_id;
        }
        if let Some(commander_ids) = overrides.telegram_commander_ids {
            self.telegram.commander_ids = commander_ids;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_source(&self.source)?;
        validate_telegram(&self.telegram)?;
        validate_schedule(&self.schedule)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("slotwatch.toml"), PathBuf::from("config/slotwatch.toml")]
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

fn validate_source(source: &SourceConfig) -> Result<(), ConfigError> {
    if !source.base_url.starts_with("http://") && !source.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "source.base_url must start with http:// or https://".to_string(),
        ));
    }

    if source.username.trim().is_empty() || source.password.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "source.username and source.password are required".to_string(),
        ));
    }

    if source.timeout_secs == 0 || source.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "source.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    if telegram.token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.token is required. Create a bot with @BotFather and copy its HTTP API token"
                .to_string(),
        ));
    }
    if !telegram.token.expose_secret().contains(':') {
        return Err(ConfigError::Validation(
            "telegram.token must look like `<bot id>:<secret>`".to_string(),
        ));
    }

    if telegram.warning_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.warning_token is required for the escalation bot".to_string(),
        ));
    }

    if telegram.group_id == 0 {
        return Err(ConfigError::Validation(
            "telegram.group_id is required (send /whereami to the bot to find it)".to_string(),
        ));
    }

    if telegram.timeout_secs <= telegram.long_poll_secs {
        return Err(ConfigError::Validation(
            "telegram.timeout_secs must be greater than telegram.long_poll_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_schedule(schedule: &ScheduleConfig) -> Result<(), ConfigError> {
    let intervals = [
        ("schedule.poll_interval_secs", schedule.poll_interval_secs),
        ("schedule.alert_interval_secs", schedule.alert_interval_secs),
        ("schedule.error_backoff_secs", schedule.error_backoff_secs),
        ("schedule.login_refresh_secs", schedule.login_refresh_secs),
        ("schedule.primary_tick_ms", schedule.primary_tick_ms),
        ("schedule.escalation_tick_ms", schedule.escalation_tick_ms),
        ("schedule.command_tick_ms", schedule.command_tick_ms),
    ];
    if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
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

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_id_list(key: &str, value: &str) -> Result<Vec<i64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_i64(key, item))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    source: Option<SourcePatch>,
    search: Option<SearchPatch>,
    telegram: Option<TelegramPatch>,
    schedule: Option<SchedulePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SourcePatch {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    brand: Option<String>,
    branch: Option<String>,
    hall: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    weekday: Option<String>,
    time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    api_base_url: Option<String>,
    username: Option<String>,
    token: Option<String>,
    warning_token: Option<String>,
    group_id: Option<i64>,
    commander_ids: Option<Vec<i64>>,
    timeout_secs: Option<u64>,
    long_poll_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulePatch {
    poll_interval_secs: Option<u64>,
    alert_interval_secs: Option<u64>,
    error_backoff_secs: Option<u64>,
    login_refresh_secs: Option<u64>,
    login_settle_secs: Option<u64>,
    primary_tick_ms: Option<u64>,
    escalation_tick_ms: Option<u64>,
    command_tick_ms: Option<u64>,
    command_backlog_limit: Option<usize>,
    command_staleness_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

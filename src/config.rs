use crate::domain::{CurrencyPair, IdentType};
use crate::messaging::Recipients;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_FLIGHTAWARE_URL: &str = "https://aeroapi.flightaware.com/aeroapi";
pub const GEMINI_URL: &str = "https://api.gemini.com";
pub const GEMINI_SANDBOX_URL: &str = "https://api.sandbox.gemini.com";
pub const DEFAULT_KEY_PREFIX: &str = "lavamonster";
/// 8h30m.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(8 * 3600 + 30 * 60);
pub const DEFAULT_CACHE_MAX_ITEMS: usize = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    pub flights: Vec<FlightTarget>,
    pub flight_poll_interval: Duration,
    pub flight_notifications: FlightNotificationsConfig,
    pub flightaware: FlightAwareConfig,
    pub spot_pairs: Vec<CurrencyPair>,
    pub spot_poll_interval: Duration,
    pub gemini: GeminiConfig,
    pub cache: CacheConfig,
    pub messaging: MessagingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightTarget {
    pub ident: String,
    pub ident_type: IdentType,
}

/// Lead time and toggle for the "about to depart/arrive" reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreEventConfig {
    pub enabled: bool,
    pub offset: Duration,
}

/// Per-category toggles for flight notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightNotificationsConfig {
    pub pre_departure: PreEventConfig,
    pub pre_arrival: PreEventConfig,
    pub gate_departure: bool,
    pub takeoff: bool,
    pub landing: bool,
    pub gate_arrival: bool,
    pub baggage_claim: bool,
    /// Render times in the airport's zone instead of UTC.
    pub use_local_time: bool,
}

impl Default for FlightNotificationsConfig {
    fn default() -> Self {
        Self {
            pre_departure: PreEventConfig {
                enabled: false,
                offset: Duration::from_secs(3600),
            },
            pre_arrival: PreEventConfig {
                enabled: true,
                offset: Duration::from_secs(3600),
            },
            gate_departure: true,
            takeoff: true,
            landing: true,
            gate_arrival: true,
            baggage_claim: false,
            use_local_time: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlightAwareConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub credentials: Option<GeminiCredentials>,
}

#[derive(Clone)]
pub struct GeminiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for GeminiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub redis_url: Option<String>,
    pub default_ttl: Duration,
    pub key_prefix: String,
    pub max_items: usize,
    pub connect_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            redis_url: None,
            default_ttl: DEFAULT_CACHE_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_items: DEFAULT_CACHE_MAX_ITEMS,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub log_stdout: bool,
    pub twilio: Option<TwilioConfig>,
    pub slack: Option<SlackConfig>,
    pub recipients: Recipients,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    /// Resolve every setting as "explicit value, else built-in default".
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let flights = parse_flights(&env_map)?;
        let flight_poll_interval = parse_secs(&env_map, "FLIGHT_POLL_INTERVAL_SECS", 60)?;

        let defaults = FlightNotificationsConfig::default();
        let flight_notifications = FlightNotificationsConfig {
            pre_departure: PreEventConfig {
                enabled: parse_bool(
                    &env_map,
                    "NOTIFY_PRE_DEPARTURE",
                    defaults.pre_departure.enabled,
                )?,
                offset: parse_secs(
                    &env_map,
                    "PRE_DEPARTURE_OFFSET_SECS",
                    defaults.pre_departure.offset.as_secs(),
                )?,
            },
            pre_arrival: PreEventConfig {
                enabled: parse_bool(&env_map, "NOTIFY_PRE_ARRIVAL", defaults.pre_arrival.enabled)?,
                offset: parse_secs(
                    &env_map,
                    "PRE_ARRIVAL_OFFSET_SECS",
                    defaults.pre_arrival.offset.as_secs(),
                )?,
            },
            gate_departure: parse_bool(&env_map, "NOTIFY_GATE_DEPARTURE", defaults.gate_departure)?,
            takeoff: parse_bool(&env_map, "NOTIFY_TAKEOFF", defaults.takeoff)?,
            landing: parse_bool(&env_map, "NOTIFY_LANDING", defaults.landing)?,
            gate_arrival: parse_bool(&env_map, "NOTIFY_GATE_ARRIVAL", defaults.gate_arrival)?,
            baggage_claim: parse_bool(&env_map, "NOTIFY_BAGGAGE_CLAIM", defaults.baggage_claim)?,
            use_local_time: parse_bool(&env_map, "USE_LOCAL_TIME", defaults.use_local_time)?,
        };

        let flightaware = FlightAwareConfig {
            api_key: non_empty(&env_map, "FLIGHTAWARE_API_KEY"),
            base_url: non_empty(&env_map, "FLIGHTAWARE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_FLIGHTAWARE_URL.to_string()),
        };
        if !flights.is_empty() && flightaware.api_key.is_none() {
            return Err(ConfigError::MissingEnv("FLIGHTAWARE_API_KEY".to_string()));
        }

        let spot_pairs = parse_spot_pairs(&env_map)?;
        let spot_poll_interval = parse_secs(&env_map, "SPOT_POLL_INTERVAL_SECS", 30)?;
        let gemini = parse_gemini(&env_map)?;
        let cache = parse_cache(&env_map)?;
        let messaging = parse_messaging(&env_map)?;

        Ok(Config {
            flights,
            flight_poll_interval,
            flight_notifications,
            flightaware,
            spot_pairs,
            spot_poll_interval,
            gemini,
            cache,
            messaging,
        })
    }
}

fn non_empty(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_list(env_map: &HashMap<String, String>, key: &str) -> Vec<String> {
    env_map
        .get(key)
        .map(|s| {
            s.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_bool(
    env_map: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be a boolean, got {}", other),
            )),
        },
    }
}

fn parse_secs(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs = match env_map.get(key) {
        Some(v) => v.trim().parse::<f64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a number of seconds".to_string())
        })?,
        None => default as f64,
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be a positive number of seconds".to_string(),
        ));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn parse_flights(env_map: &HashMap<String, String>) -> Result<Vec<FlightTarget>, ConfigError> {
    parse_list(env_map, "FLIGHTS")
        .into_iter()
        .map(|entry| {
            let (ident, ident_type) = match entry.split_once(':') {
                Some((ident, kind)) => (
                    ident.trim().to_string(),
                    kind.parse::<IdentType>()
                        .map_err(|e| ConfigError::InvalidValue("FLIGHTS".to_string(), e))?,
                ),
                None => (entry.clone(), IdentType::Designator),
            };
            if ident.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "FLIGHTS".to_string(),
                    format!("empty identifier in {}", entry),
                ));
            }
            Ok(FlightTarget { ident, ident_type })
        })
        .collect()
}

fn parse_spot_pairs(env_map: &HashMap<String, String>) -> Result<Vec<CurrencyPair>, ConfigError> {
    parse_list(env_map, "SPOT_PAIRS")
        .into_iter()
        .map(|entry| {
            entry
                .parse::<CurrencyPair>()
                .map_err(|e| ConfigError::InvalidValue("SPOT_PAIRS".to_string(), e))
        })
        .collect()
}

fn parse_gemini(env_map: &HashMap<String, String>) -> Result<GeminiConfig, ConfigError> {
    let sandbox = parse_bool(env_map, "GEMINI_SANDBOX", false)?;
    let base_url = non_empty(env_map, "GEMINI_BASE_URL").unwrap_or_else(|| {
        if sandbox {
            GEMINI_SANDBOX_URL.to_string()
        } else {
            GEMINI_URL.to_string()
        }
    });
    let credentials = match (
        non_empty(env_map, "GEMINI_API_KEY"),
        non_empty(env_map, "GEMINI_API_SECRET"),
    ) {
        (Some(api_key), Some(api_secret)) => Some(GeminiCredentials {
            api_key,
            api_secret,
        }),
        (Some(_), None) => return Err(ConfigError::MissingEnv("GEMINI_API_SECRET".to_string())),
        (None, Some(_)) => return Err(ConfigError::MissingEnv("GEMINI_API_KEY".to_string())),
        (None, None) => None,
    };
    Ok(GeminiConfig {
        base_url,
        credentials,
    })
}

fn parse_cache(env_map: &HashMap<String, String>) -> Result<CacheConfig, ConfigError> {
    let defaults = CacheConfig::default();
    let backend = match env_map
        .get("CACHE_BACKEND")
        .map(|s| s.trim())
        .unwrap_or("memory")
    {
        "memory" => CacheBackendKind::Memory,
        "redis" => CacheBackendKind::Redis,
        other => {
            return Err(ConfigError::InvalidValue(
                "CACHE_BACKEND".to_string(),
                format!("must be memory or redis, got {}", other),
            ))
        }
    };
    let redis_url = non_empty(env_map, "REDIS_URL");
    if backend == CacheBackendKind::Redis && redis_url.is_none() {
        return Err(ConfigError::MissingEnv("REDIS_URL".to_string()));
    }
    let max_items = match env_map.get("CACHE_MAX_ITEMS") {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "CACHE_MAX_ITEMS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?,
        None => defaults.max_items,
    };
    Ok(CacheConfig {
        backend,
        redis_url,
        default_ttl: parse_secs(env_map, "CACHE_TTL_SECS", defaults.default_ttl.as_secs())?,
        key_prefix: non_empty(env_map, "CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        max_items,
        connect_timeout: parse_secs(
            env_map,
            "CACHE_CONNECT_TIMEOUT_SECS",
            defaults.connect_timeout.as_secs(),
        )?,
    })
}

fn parse_messaging(env_map: &HashMap<String, String>) -> Result<MessagingConfig, ConfigError> {
    let twilio = match (
        non_empty(env_map, "TWILIO_ACCOUNT_SID"),
        non_empty(env_map, "TWILIO_AUTH_TOKEN"),
        non_empty(env_map, "TWILIO_FROM_NUMBER"),
    ) {
        (None, None, None) => None,
        (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
            account_sid,
            auth_token,
            from_number,
        }),
        (None, _, _) => return Err(ConfigError::MissingEnv("TWILIO_ACCOUNT_SID".to_string())),
        (_, None, _) => return Err(ConfigError::MissingEnv("TWILIO_AUTH_TOKEN".to_string())),
        (_, _, None) => return Err(ConfigError::MissingEnv("TWILIO_FROM_NUMBER".to_string())),
    };

    let recipients = Recipients {
        sms_number: non_empty(env_map, "TWILIO_TO_NUMBER"),
        chat_channel_ids: parse_list(env_map, "SLACK_CHANNEL_IDS"),
        chat_user_ids: parse_list(env_map, "SLACK_USER_IDS"),
    };

    let slack = non_empty(env_map, "SLACK_BOT_TOKEN").map(|bot_token| SlackConfig { bot_token });
    if slack.is_none() && recipients.has_chat() {
        return Err(ConfigError::MissingEnv("SLACK_BOT_TOKEN".to_string()));
    }
    if twilio.is_some() && recipients.sms_number.is_none() {
        return Err(ConfigError::MissingEnv("TWILIO_TO_NUMBER".to_string()));
    }

    Ok(MessagingConfig {
        log_stdout: parse_bool(env_map, "LOG_STDOUT", true)?,
        twilio,
        slack,
        recipients,
    })
}

use chrono_tz::Tz;
use config::ConfigError;
use serde::Deserialize;
use std::env;
use std::time::Duration;

const DEV_JWT_SECRET: &str = "dev-secret-only-for-local-testing";
const MAX_LOOKBACK_DAYS: u32 = 365 * 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub source: SourceSettings,
    pub engines: EngineSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub attempts_collection: String,
    pub learners_collection: String,
    pub fetch_timeout_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "speech_practice".to_string(),
            attempts_collection: "drill_attempts".to_string(),
            learners_collection: "learners".to_string(),
            fetch_timeout_ms: 5_000,
        }
    }
}

impl SourceSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Tunables shared by the three engines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Age in days over which an attempt's weight is multiplied by `decay_factor`.
    pub half_life_days: f64,
    pub decay_factor: f64,
    pub trend_min_attempts: usize,
    pub trend_delta: f64,
    pub weak_phoneme_threshold: f64,
    pub weak_phoneme_min_support: usize,
    pub grace_days: u32,
    pub streak_min_attempts: u32,
    pub streak_min_duration_secs: Option<u32>,
    pub default_timezone: Tz,
    /// Upper bound on history read per request; `None` reads everything.
    pub lookback_days: Option<u32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            half_life_days: 14.0,
            decay_factor: 0.5,
            trend_min_attempts: 4,
            trend_delta: 0.05,
            weak_phoneme_threshold: 0.6,
            weak_phoneme_min_support: 3,
            grace_days: 1,
            streak_min_attempts: 1,
            streak_min_duration_secs: None,
            default_timezone: Tz::UTC,
            lookback_days: None,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Message(format!("engines: {}", msg)));

        if !(self.half_life_days.is_finite() && self.half_life_days > 0.0) {
            return fail("half_life_days must be a positive number");
        }
        if !(self.decay_factor > 0.0 && self.decay_factor < 1.0) {
            return fail("decay_factor must be within (0, 1)");
        }
        if !(0.0..=1.0).contains(&self.trend_delta) {
            return fail("trend_delta must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.weak_phoneme_threshold) {
            return fail("weak_phoneme_threshold must be within [0, 1]");
        }
        if self.trend_min_attempts < 2 {
            return fail("trend_min_attempts must be at least 2");
        }
        if self.weak_phoneme_min_support == 0 {
            return fail("weak_phoneme_min_support must be at least 1");
        }
        if self.streak_min_attempts == 0 {
            return fail("streak_min_attempts must be at least 1");
        }
        if matches!(self.lookback_days, Some(days) if days == 0 || days > MAX_LOOKBACK_DAYS) {
            return fail("lookback_days must be within [1, 36500]");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            source: SourceSettings::default(),
            engines: EngineSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml first, APP__SECTION__KEY overrides on top
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut source: SourceSettings = section_or_default(&settings, "source")?;
        if let Ok(uri) = env::var("MONGO_URI") {
            if settings.get_string("source.mongo_uri").is_err() {
                source.mongo_uri = uri;
            }
        }
        if let Ok(database) = env::var("MONGO_DATABASE") {
            if settings.get_string("source.mongo_database").is_err() {
                source.mongo_database = database;
            }
        }

        let engines: EngineSettings = section_or_default(&settings, "engines")?;
        engines.validate()?;

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!("Using default JWT secret (dev mode only)");
                DEV_JWT_SECRET.to_string()
            }
        };

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        Ok(Config {
            bind_addr,
            jwt_secret,
            source,
            engines,
        })
    }
}

fn section_or_default<T>(settings: &config::Config, key: &str) -> Result<T, ConfigError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match settings.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(T::default()),
        Err(err) => Err(err),
    }
}

use crate::{
    apps::{city_weather, room_weather},
    scheduler::Timing,
};
use serde::Deserialize;
use std::{path::Path, path::PathBuf, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not read the config file: {0}")]
    CouldNotRead(#[source] std::io::Error),
    #[error("could not parse the config file: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub apps: AppsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub tick_millis: u64,
    pub hold_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        let timing = Timing::default();
        SchedulerConfig {
            tick_millis: timing.tick_period.as_millis() as u64,
            hold_ticks: timing.hold_ticks,
        }
    }
}

impl SchedulerConfig {
    pub fn timing(&self) -> Timing {
        Timing {
            tick_period: Duration::from_millis(self.tick_millis),
            hold_ticks: self.hold_ticks,
        }
    }
}

/// Apps beyond the clock are only enabled when their section is present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppsConfig {
    pub room_weather: Option<RoomWeatherConfig>,
    pub city_weather: Option<CityWeatherConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomWeatherConfig {
    pub sensor_path: PathBuf,
    #[serde(default = "default_room_max_age")]
    pub max_cache_age_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CityWeatherConfig {
    pub api_key: String,
    pub city: String,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_city_max_age")]
    pub max_cache_age_minutes: i64,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "smart-display".to_owned()
}

fn default_topic_prefix() -> String {
    "smartDisplay/server".to_owned()
}

fn default_units() -> String {
    "metric".to_owned()
}

fn default_base_url() -> String {
    city_weather::DEFAULT_BASE_URL.to_owned()
}

fn default_room_max_age() -> i64 {
    room_weather::DEFAULT_MAX_CACHE_AGE_MINUTES
}

fn default_city_max_age() -> i64 {
    city_weather::DEFAULT_MAX_CACHE_AGE_MINUTES
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Config, Error> {
        let config: Config = toml::from_str(raw).map_err(Error::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let raw = std::fs::read_to_string(path).map_err(Error::CouldNotRead)?;
        Self::from_toml(&raw)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.scheduler.tick_millis == 0 {
            return Err(Error::Invalid("scheduler.tick_millis must be positive"));
        }
        if self.scheduler.hold_ticks == 0 {
            return Err(Error::Invalid("scheduler.hold_ticks must be positive"));
        }
        let max_ages = [
            self.apps.room_weather.as_ref().map(|app| app.max_cache_age_minutes),
            self.apps.city_weather.as_ref().map(|app| app.max_cache_age_minutes),
        ];
        if max_ages.into_iter().flatten().any(|age| age <= 0) {
            return Err(Error::Invalid("max_cache_age_minutes must be positive"));
        }
        Ok(())
    }
}

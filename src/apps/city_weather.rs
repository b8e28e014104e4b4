use crate::{
    apps::{render_pixel_progress, round_to_fixed, App, DataSource, Refresher},
    frame::{Position, Rgb, TextStyle},
    surface::Surface,
};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
pub const DEFAULT_MAX_CACHE_AGE_MINUTES: i64 = 30;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct CityWeather {
    pub temperature: f64,
    pub humidity: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not build the HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to openweathermap failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("openweathermap answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("could not decode the openweathermap response: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainReadings,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: Option<f64>,
}

/// Client for the OpenWeatherMap current-weather endpoint.
pub struct OpenWeatherMap {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    city: String,
    units: String,
}

impl OpenWeatherMap {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        city: impl Into<String>,
        units: impl Into<String>,
    ) -> Result<OpenWeatherMap, Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::Client)?;

        Ok(OpenWeatherMap {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            city: city.into(),
            units: units.into(),
        })
    }

    pub fn fetch(&self) -> Result<CityWeather, Error> {
        let url = format!("{}/data/2.5/weather", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[
                ("q", self.city.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
            ])
            .send()
            .map_err(Error::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let current: CurrentWeather = response.json().map_err(Error::Decode)?;
        Ok(CityWeather {
            temperature: current.main.temp,
            humidity: current.main.humidity,
        })
    }
}

impl DataSource for OpenWeatherMap {
    type Data = CityWeather;

    fn load(&self) -> anyhow::Result<CityWeather> {
        let weather = self.fetch()?;
        log::debug!("city weather for {}: {weather:?}", self.city);
        Ok(weather)
    }
}

/// Shows the outside temperature of a configured city together with how old
/// the reading is.
pub struct CityWeatherApp<S: DataSource<Data = CityWeather> = OpenWeatherMap> {
    refresher: Refresher<S>,
    max_cache_age_minutes: i64,
    was_rendered: bool,
}

impl<S: DataSource<Data = CityWeather>> CityWeatherApp<S> {
    const STYLE: TextStyle = TextStyle {
        color: Rgb(0x4c, 0xff, 0x00),
    };
    const POSITION: Position = Position::new(7, 1);

    pub fn new(source: S, max_cache_age_minutes: i64) -> CityWeatherApp<S> {
        CityWeatherApp {
            refresher: Refresher::new("city-weather", source),
            max_cache_age_minutes,
            was_rendered: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, weather: CityWeather, at: chrono::DateTime<chrono::Utc>) {
        self.refresher.cache().set_at(weather, at);
    }
}

impl<S: DataSource<Data = CityWeather>> App for CityWeatherApp<S> {
    fn name(&self) -> &'static str {
        "city-weather"
    }

    fn should_rerender(&self) -> bool {
        !self.was_rendered
    }

    fn is_ready(&self) -> bool {
        self.refresher.is_fresh(self.max_cache_age_minutes)
    }

    fn reset(&mut self) {
        self.was_rendered = false;

        if self.is_ready() {
            return;
        }

        self.refresher.spawn_refresh();
    }

    fn render(&mut self, surface: &mut dyn Surface) {
        let (temperature, age) = {
            let cache = self.refresher.cache();
            let temperature = cache.value().map(|weather| weather.temperature);
            (temperature, cache.age_in_minutes())
        };

        let text = format!("{}°", round_to_fixed(temperature, 1).unwrap_or_default());
        surface.draw_text(Self::STYLE, &text, Self::POSITION);
        render_pixel_progress(surface, age, self.max_cache_age_minutes);

        self.was_rendered = true;
    }
}

use crate::{
    apps::{render_pixel_progress, round_to_fixed, App, DataSource, Refresher},
    frame::{Position, Rgb, TextStyle},
    surface::Surface,
};
use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_MAX_CACHE_AGE_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomWeather {
    pub temperature: f64,
    #[serde(default)]
    pub humidity: Option<f64>,
}

/// Reads the latest indoor reading from a JSON file kept up to date by the
/// sensor daemon, e.g. `{"temperature": 21.3, "humidity": 45}`.
#[derive(Debug, Clone)]
pub struct SensorFile {
    path: PathBuf,
}

impl SensorFile {
    pub fn new(path: impl Into<PathBuf>) -> SensorFile {
        SensorFile { path: path.into() }
    }
}

impl DataSource for SensorFile {
    type Data = RoomWeather;

    fn load(&self) -> anyhow::Result<RoomWeather> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("could not read sensor file {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed sensor reading in {}", self.path.display()))
    }
}

/// Shows the indoor temperature, with the relative humidity as a bar.
pub struct RoomWeatherApp<S: DataSource<Data = RoomWeather> = SensorFile> {
    refresher: Refresher<S>,
    max_cache_age_minutes: i64,
    was_rendered: bool,
}

impl<S: DataSource<Data = RoomWeather>> RoomWeatherApp<S> {
    const STYLE: TextStyle = TextStyle {
        color: Rgb(0xff, 0xa5, 0x00),
    };
    const POSITION: Position = Position::new(7, 1);

    pub fn new(source: S, max_cache_age_minutes: i64) -> RoomWeatherApp<S> {
        RoomWeatherApp {
            refresher: Refresher::new("room-weather", source),
            max_cache_age_minutes,
            was_rendered: false,
        }
    }
}

impl<S: DataSource<Data = RoomWeather>> App for RoomWeatherApp<S> {
    fn name(&self) -> &'static str {
        "room-weather"
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
        let reading = self.refresher.cache().value().cloned();
        let temperature = reading.as_ref().map(|r| r.temperature);
        let humidity = reading
            .and_then(|r| r.humidity)
            .map(|h| h.round() as i64);

        let text = format!("{}°", round_to_fixed(temperature, 1).unwrap_or_default());
        surface.draw_text(Self::STYLE, &text, Self::POSITION);
        render_pixel_progress(surface, humidity, 100);

        self.was_rendered = true;
    }
}

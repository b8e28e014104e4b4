use crate::{cache::CachedValue, surface::Surface};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
};

pub mod city_weather;
pub mod room_weather;
mod time;

pub use city_weather::{CityWeatherApp, OpenWeatherMap};
pub use room_weather::{RoomWeatherApp, SensorFile};
pub use time::TimeApp;

/// One selectable unit of displayed content.
pub trait App: Send {
    /// Stable name, used for logging
    fn name(&self) -> &'static str;

    /// True until the app has rendered once since its last reset.
    fn should_rerender(&self) -> bool;

    /// Whether the app has data fresh enough to be shown. Must not have side effects.
    fn is_ready(&self) -> bool;

    /// Re-arms the app for display. If its data is stale this kicks off a
    /// background refresh and returns immediately.
    fn reset(&mut self);

    /// Draws the current state, falling back to placeholders for missing data.
    fn render(&mut self, surface: &mut dyn Surface);
}

/// Where a data-backed app gets its payload from. `load` may block (the
/// refresh runs on its own thread) but should give up eventually.
pub trait DataSource: Send + Sync + 'static {
    type Data: Send + 'static;

    fn load(&self) -> anyhow::Result<Self::Data>;
}

/// The cached payload of a data-backed app and the machinery to refresh it in
/// the background.
pub struct Refresher<S: DataSource> {
    name: &'static str,
    source: Arc<S>,
    cache: Arc<Mutex<CachedValue<S::Data>>>,
    in_flight: Arc<AtomicBool>,
}

impl<S: DataSource> Refresher<S> {
    pub fn new(name: &'static str, source: S) -> Refresher<S> {
        Refresher {
            name,
            source: Arc::new(source),
            cache: Arc::default(),
            in_flight: Arc::default(),
        }
    }

    pub fn cache(&self) -> MutexGuard<'_, CachedValue<S::Data>> {
        lock(&self.cache)
    }

    pub fn age_in_minutes(&self) -> Option<i64> {
        self.cache().age_in_minutes()
    }

    /// Fresh means an age strictly below `max_age_minutes`; an empty cache is never fresh.
    pub fn is_fresh(&self, max_age_minutes: i64) -> bool {
        self.age_in_minutes()
            .is_some_and(|age| age < max_age_minutes)
    }

    /// Loads new data on a detached thread. The result lands in the cache on
    /// success; failures are only logged. Does nothing while a previous refresh
    /// is still running.
    pub fn spawn_refresh(&self) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            log::debug!("{}: refresh already in flight", self.name);
            return;
        }

        let name = self.name;
        let source = self.source.clone();
        let cache = self.cache.clone();
        let in_flight = InFlight(self.in_flight.clone());
        let spawned = thread::Builder::new()
            .name(format!("refresh-{name}"))
            .spawn(move || {
                // Cleared on drop, so a panicking source does not block later refreshes
                let _in_flight = in_flight;
                match source.load() {
                    Ok(data) => {
                        log::info!("{name}: data refreshed");
                        lock(&cache).set(data);
                    }
                    Err(err) => log::error!("{name}: can't load data: {err:#}"),
                }
            });

        // On failure the closure, and the guard with it, has already been dropped
        if let Err(err) = spawned {
            log::error!("{name}: can't spawn refresh thread: {err}");
        }
    }
}

/// Marks a refresh as finished when dropped.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Rounds `value` to `fraction_digits` decimals with halves going up (towards
/// positive infinity). Results that round to zero print without a sign.
pub fn round_to_fixed(value: Option<f64>, fraction_digits: u32) -> Option<String> {
    let value = value?;
    let factor = 10f64.powi(fraction_digits as i32);
    // Adding 0.0 turns -0.0 into 0.0
    let rounded = ((value + f64::EPSILON) * factor + 0.5).floor() / factor + 0.0;
    Some(format!("{rounded:.prec$}", prec = fraction_digits as usize))
}

/// Draws how far `value` is towards `max`. Unknown values draw nothing.
pub fn render_pixel_progress(surface: &mut dyn Surface, value: Option<i64>, max: i64) {
    let Some(value) = value else {
        return;
    };
    let max = max.clamp(0, u32::MAX as i64);
    let value = value.clamp(0, max);
    surface.draw_pixel_progress(value as u32, max as u32);
}

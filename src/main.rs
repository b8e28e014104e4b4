mod apps;
mod cache;
mod config;
mod control;
mod frame;
mod scheduler;
mod surface;
mod ticker;

use crate::{
    apps::{App, CityWeatherApp, OpenWeatherMap, RoomWeatherApp, SensorFile, TimeApp},
    config::{AppsConfig, Config},
    control::ControlChannel,
    scheduler::{ConnectionFlag, Event, Scheduler},
    surface::{FrameSurface, Surface, TuiSurface},
};
use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, Sender},
    time::Duration,
};

const TERMINAL_RENDER_PERIOD: Duration = Duration::from_millis(50);

/// Cycles clock and weather apps on a smart display, switched on and off over MQTT
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Keep frames in memory instead of drawing the matrix in the terminal
    #[arg(long)]
    headless: bool,

    /// File that receives the log output
    #[arg(long, default_value = "smart-display.log")]
    log_file: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file, args.log_level)?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let apps = build_apps(&config.apps)?;
    log::info!(
        "apps: {}",
        apps.iter().map(|app| app.name()).collect::<Vec<_>>().join(", ")
    );

    let (events_tx, events_rx) = mpsc::channel();
    shut_down_on_signal(events_tx.clone())?;
    let control = ControlChannel::connect(&config.mqtt, events_tx.clone());
    let timing = config.scheduler.timing();

    if args.headless {
        let scheduler = Scheduler::new(
            apps,
            FrameSurface::new(),
            control.connection(),
            events_tx,
            timing,
        )?;
        serve(scheduler, &control, &events_rx);
    } else {
        let surface = TuiSurface::new(TERMINAL_RENDER_PERIOD, events_tx.clone())?;
        let scheduler = Scheduler::new(apps, surface, control.connection(), events_tx, timing)?;
        serve(scheduler, &control, &events_rx);
    }

    control.disconnect();
    Ok(())
}

fn serve<S: Surface>(
    mut scheduler: Scheduler<S, ConnectionFlag>,
    control: &ControlChannel,
    events: &Receiver<Event>,
) {
    control.publish_status("started");
    scheduler.run();
    scheduler.run_event_loop(events);
}

/// Ctrl+C and SIGTERM end the event loop like `q` does, so the display and
/// the broker connection are torn down properly.
fn shut_down_on_signal(events: Sender<Event>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        log::info!("termination signal received");
        // The event loop may already be gone
        let _ = events.send(Event::Shutdown);
    })
    .context("failed to set the termination signal handler")
}

/// The clock always comes first; the weather apps follow when configured.
fn build_apps(config: &AppsConfig) -> anyhow::Result<Vec<Box<dyn App>>> {
    let mut apps: Vec<Box<dyn App>> = vec![Box::new(TimeApp::new())];

    if let Some(room) = &config.room_weather {
        apps.push(Box::new(RoomWeatherApp::new(
            SensorFile::new(&room.sensor_path),
            room.max_cache_age_minutes,
        )));
    }

    if let Some(city) = &config.city_weather {
        let source = OpenWeatherMap::new(&city.base_url, &city.api_key, &city.city, &city.units)
            .context("setting up the city weather app")?;
        apps.push(Box::new(CityWeatherApp::new(
            source,
            city.max_cache_age_minutes,
        )));
    }

    Ok(apps)
}

fn init_logging(path: &Path, level: LevelFilter) -> anyhow::Result<()> {
    // The terminal belongs to the display, so logs go to a file
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l:<5} {T} {t} - {m}{n}",
        )))
        .build(path)
        .with_context(|| format!("could not open log file {}", path.display()))?;

    let config = log4rs::Config::builder()
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(Root::builder().appender("file").build(level))
        .context("invalid logging config")?;
    log4rs::init_config(config).context("could not initialise logging")?;
    Ok(())
}

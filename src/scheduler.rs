use crate::{apps::App, surface::Surface, ticker::Ticker};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
        Arc,
    },
    time::Duration,
};

/// Everything the event loop reacts to. Producers (ticker, control channel,
/// terminal) only ever send these; all scheduler state lives on the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Tick,
    Command { name: String, payload: String },
    Shutdown,
}

/// The commands understood on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Power(bool),
}

impl Command {
    /// Returns `None` for unknown commands and malformed payloads.
    pub fn parse(name: &str, payload: &str) -> Option<Command> {
        match (name, payload) {
            ("power", "on") => Some(Command::Power(true)),
            ("power", "off") => Some(Command::Power(false)),
            _ => None,
        }
    }
}

/// Connectivity of the control-channel transport.
pub trait Link {
    fn is_connected(&self) -> bool;
}

/// A [`Link`] whose state is set by whoever owns the connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFlag(Arc<AtomicBool>);

impl ConnectionFlag {
    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::Release);
    }
}

impl Link for ConnectionFlag {
    fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub tick_period: Duration,
    /// Ticks an app stays on screen before the scheduler moves on
    pub hold_ticks: u32,
}

impl Default for Timing {
    fn default() -> Timing {
        Timing {
            tick_period: Duration::from_secs(1),
            hold_ticks: 15,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("the scheduler needs at least one app")]
    NoApps,
}

/// Cycles through the apps, holding each on the display for a fixed number of
/// ticks and skipping the ones without fresh data.
pub struct Scheduler<S: Surface, L: Link> {
    apps: Vec<Box<dyn App>>,
    current_index: usize,
    iterations_since_advance: u32,
    ticker: Option<Ticker>,
    surface: S,
    link: L,
    events: Sender<Event>,
    timing: Timing,
    destroyed: bool,
}

impl<S: Surface, L: Link> Scheduler<S, L> {
    /// Creates a stopped scheduler. `events` is where the ticker posts its
    /// ticks once the scheduler runs.
    pub fn new(
        apps: Vec<Box<dyn App>>,
        surface: S,
        link: L,
        events: Sender<Event>,
        timing: Timing,
    ) -> Result<Scheduler<S, L>, Error> {
        if apps.is_empty() {
            return Err(Error::NoApps);
        }

        Ok(Scheduler {
            apps,
            current_index: 0,
            iterations_since_advance: 0,
            ticker: None,
            surface,
            link,
            events,
            timing,
            destroyed: false,
        })
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_app(&self) -> &dyn App {
        self.apps[self.current_index].as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    #[allow(dead_code)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn run(&mut self) {
        self.start();
    }

    /// Drains `events` until an [`Event::Shutdown`] arrives, then releases the
    /// display. The scheduler keeps a sender for its ticker, so the channel
    /// never runs dry on its own.
    pub fn run_event_loop(&mut self, events: &Receiver<Event>) {
        for event in events.iter() {
            if !self.handle_event(event) {
                break;
            }
        }
        self.shutdown();
    }

    /// Returns false once the loop should end.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Tick => self.tick(),
            Event::Command { name, payload } => self.handle_command(&name, &payload),
            Event::Shutdown => return false,
        }
        true
    }

    pub fn handle_command(&mut self, name: &str, payload: &str) {
        log::debug!("server cmd {name} {payload}");

        match Command::parse(name, payload) {
            Some(Command::Power(on)) => {
                log::debug!("switch power-status {on}");
                self.surface.set_power(on);
                if on {
                    self.start();
                } else {
                    self.stop();
                }
            }
            None => log::debug!("ignoring command {name:?} with payload {payload:?}"),
        }
    }

    pub fn tick(&mut self) {
        // Ticks queued before a stop can still arrive
        if !self.is_running() {
            return;
        }

        if !self.link.is_connected() {
            log::warn!("client not connected, skipping render");
            return;
        }

        self.render_app();
        self.iterations_since_advance += 1;

        if self.iterations_since_advance >= self.timing.hold_ticks {
            self.advance_app();
        }
    }

    fn start(&mut self) {
        if self.is_running() {
            return;
        }
        log::debug!("starting ticks every {:?}", self.timing.tick_period);

        self.iterations_since_advance = 0;
        // Re-arm the app we resume on so it draws again
        self.apps[self.current_index].reset();
        self.render_app();

        self.ticker = Some(Ticker::start(self.timing.tick_period, self.events.clone()));
    }

    fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            log::debug!("stopping ticks");
            ticker.stop();
        }
    }

    fn render_app(&mut self) {
        let app = &mut self.apps[self.current_index];

        if app.should_rerender() {
            self.surface.clear();
            app.render(&mut self.surface);
            self.surface.show();
        }
    }

    /// Moves to the next ready app, wrapping around. Visits every app at most
    /// once; if none is ready the scheduler settles where the cycle ended.
    fn advance_app(&mut self) {
        self.iterations_since_advance = 0;

        for _ in 0..self.apps.len() {
            self.current_index = (self.current_index + 1) % self.apps.len();

            let app = &mut self.apps[self.current_index];
            log::debug!("next app {}", app.name());
            app.reset();

            if app.is_ready() {
                return;
            }
        }

        log::warn!(
            "no app is ready, showing {} with what it has",
            self.current_app().name()
        );
    }

    /// Stops ticking and releases the display. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.stop();
        if !self.destroyed {
            log::debug!("shutdown");
            self.surface.destroy();
            self.destroyed = true;
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Command, ConnectionFlag, Error, Event, Link, Scheduler, Timing};
    use crate::{
        apps::{city_weather::CityWeather, test::ScriptedSource, App, CityWeatherApp, TimeApp},
        surface::{FrameSurface, Surface},
    };
    use chrono::{Duration as Minutes, Utc};
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            mpsc::{self, Receiver},
            Arc,
        },
        thread,
        time::Duration,
    };
    use test_case::test_case;

    #[derive(Clone, Default)]
    struct Tracker {
        ready: Arc<AtomicBool>,
        resets: Arc<AtomicUsize>,
        renders: Arc<AtomicUsize>,
    }

    impl Tracker {
        fn ready(ready: bool) -> Tracker {
            let tracker = Tracker::default();
            tracker.ready.store(ready, Ordering::SeqCst);
            tracker
        }

        fn resets(&self) -> usize {
            self.resets.load(Ordering::SeqCst)
        }

        fn renders(&self) -> usize {
            self.renders.load(Ordering::SeqCst)
        }
    }

    struct FakeApp {
        tracker: Tracker,
        was_rendered: bool,
    }

    impl App for FakeApp {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn should_rerender(&self) -> bool {
            !self.was_rendered
        }

        fn is_ready(&self) -> bool {
            self.tracker.ready.load(Ordering::SeqCst)
        }

        fn reset(&mut self) {
            self.was_rendered = false;
            self.tracker.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn render(&mut self, _surface: &mut dyn Surface) {
            self.tracker.renders.fetch_add(1, Ordering::SeqCst);
            self.was_rendered = true;
        }
    }

    // Long enough that the real ticker never fires during a test; ticks are
    // driven by hand.
    const TIMING: Timing = Timing {
        tick_period: Duration::from_secs(3600),
        hold_ticks: 15,
    };

    fn scheduler_with(
        apps: Vec<Box<dyn App>>,
    ) -> (Scheduler<FrameSurface, ConnectionFlag>, ConnectionFlag, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let link = ConnectionFlag::default();
        link.set(true);
        let scheduler =
            Scheduler::new(apps, FrameSurface::recording(), link.clone(), tx, TIMING).unwrap();
        (scheduler, link, rx)
    }

    fn fakes(readiness: &[bool]) -> (Vec<Box<dyn App>>, Vec<Tracker>) {
        let trackers: Vec<Tracker> = readiness.iter().map(|ready| Tracker::ready(*ready)).collect();
        let apps = trackers
            .iter()
            .map(|tracker| {
                Box::new(FakeApp {
                    tracker: tracker.clone(),
                    was_rendered: false,
                }) as Box<dyn App>
            })
            .collect();
        (apps, trackers)
    }

    fn tick_n(scheduler: &mut Scheduler<FrameSurface, ConnectionFlag>, n: usize) {
        for _ in 0..n {
            scheduler.tick();
        }
    }

    #[test_case("power", "on", Some(Command::Power(true)) ; "power on")]
    #[test_case("power", "off", Some(Command::Power(false)) ; "power off")]
    #[test_case("power", "ON", None ; "payload is case sensitive")]
    #[test_case("power", "", None ; "empty payload")]
    #[test_case("brightness", "on", None ; "unknown command")]
    fn parse_commands(name: &str, payload: &str, expected: Option<Command>) {
        assert_eq!(Command::parse(name, payload), expected);
    }

    #[test]
    fn rejects_empty_app_list() {
        let (tx, _rx) = mpsc::channel();
        let result = Scheduler::new(
            Vec::new(),
            FrameSurface::new(),
            ConnectionFlag::default(),
            tx,
            TIMING,
        );
        assert!(matches!(result, Err(Error::NoApps)));
    }

    #[test]
    fn advance_wraps_around() {
        let (apps, _trackers) = fakes(&[true, true, true]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        let mut visited = Vec::new();
        for _ in 0..4 {
            scheduler.advance_app();
            visited.push(scheduler.current_index());
        }
        assert_eq!(visited, vec![1, 2, 0, 1]);
    }

    #[test]
    fn advance_skips_apps_that_are_not_ready() {
        let (apps, trackers) = fakes(&[true, false, false, true]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        scheduler.advance_app();
        assert_eq!(scheduler.current_index(), 3);
        // Skipped apps still got a reset to kick off their refresh
        assert_eq!(trackers[1].resets(), 1);
        assert_eq!(trackers[2].resets(), 1);

        scheduler.advance_app();
        assert_eq!(scheduler.current_index(), 0);
    }

    #[test]
    fn advance_terminates_when_nothing_is_ready() {
        let (apps, trackers) = fakes(&[false, false, false, false]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        scheduler.advance_app();

        assert_eq!(scheduler.current_index(), 0);
        for tracker in &trackers {
            assert_eq!(tracker.resets(), 1);
        }
    }

    #[test]
    fn power_on_renders_immediately_and_power_off_keeps_position() {
        let (apps, trackers) = fakes(&[true, true]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        scheduler.handle_command("power", "on");
        assert!(scheduler.is_running());
        assert!(scheduler.surface().powered());
        assert_eq!(trackers[0].renders(), 1);
        assert_eq!(scheduler.surface().shown().len(), 1);

        tick_n(&mut scheduler, 15);
        assert_eq!(scheduler.current_index(), 1);

        scheduler.handle_command("power", "off");
        assert!(!scheduler.is_running());
        assert!(!scheduler.surface().powered());
        assert_eq!(scheduler.current_index(), 1);

        // Ticks still queued from before the stop change nothing
        tick_n(&mut scheduler, 30);
        assert_eq!(scheduler.current_index(), 1);
        assert_eq!(trackers[1].renders(), 0);

        scheduler.handle_command("power", "on");
        assert_eq!(scheduler.current_index(), 1);
        assert_eq!(trackers[1].renders(), 1);
    }

    #[test]
    fn resume_restarts_the_hold() {
        let (apps, _trackers) = fakes(&[true, true]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        scheduler.run();
        tick_n(&mut scheduler, 10);
        scheduler.handle_command("power", "off");
        scheduler.handle_command("power", "on");

        tick_n(&mut scheduler, 14);
        assert_eq!(scheduler.current_index(), 0);
        tick_n(&mut scheduler, 1);
        assert_eq!(scheduler.current_index(), 1);
    }

    #[test_case("power", "ON" ; "wrong case")]
    #[test_case("power", "toggle" ; "bad payload")]
    #[test_case("brightness", "10" ; "unknown command")]
    fn ignores_unknown_commands(name: &str, payload: &str) {
        let (apps, trackers) = fakes(&[true]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        scheduler.handle_command(name, payload);

        assert!(!scheduler.is_running());
        assert_eq!(trackers[0].renders(), 0);
        assert!(scheduler.surface().shown().is_empty());
    }

    #[test]
    fn holds_without_redrawing() {
        let (apps, trackers) = fakes(&[true, true]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        scheduler.run();
        tick_n(&mut scheduler, 14);
        assert_eq!(trackers[0].renders(), 1);
        assert_eq!(scheduler.surface().shown().len(), 1);

        // The 15th tick advances, the next one draws the new app
        tick_n(&mut scheduler, 1);
        assert_eq!(trackers[1].renders(), 0);
        tick_n(&mut scheduler, 1);
        assert_eq!(trackers[1].renders(), 1);
        assert_eq!(scheduler.surface().shown().len(), 2);
    }

    #[test]
    fn disconnected_link_pauses_rendering() {
        let (apps, trackers) = fakes(&[true, true]);
        let (mut scheduler, link, _rx) = scheduler_with(apps);

        scheduler.run();
        link.set(false);
        assert!(!link.is_connected());

        tick_n(&mut scheduler, 40);
        assert!(scheduler.is_running());
        assert_eq!(scheduler.current_index(), 0);
        assert_eq!(trackers[1].resets(), 0);

        link.set(true);
        tick_n(&mut scheduler, 15);
        assert_eq!(scheduler.current_index(), 1);
    }

    #[test]
    fn cycles_clock_and_weather_apps() {
        let fresh = CityWeatherApp::new(ScriptedSource::<CityWeather>::new(Vec::new()), 30);
        fresh.seed(
            CityWeather {
                temperature: 4.2,
                humidity: None,
            },
            Utc::now() - Minutes::minutes(5),
        );
        // Its refresh fails, so it stays stale
        let stale = CityWeatherApp::new(ScriptedSource::<CityWeather>::new(Vec::new()), 30);
        stale.seed(
            CityWeather {
                temperature: -1.0,
                humidity: None,
            },
            Utc::now() - Minutes::minutes(45),
        );

        let apps: Vec<Box<dyn App>> = vec![
            Box::new(TimeApp::new()),
            Box::new(fresh),
            Box::new(stale),
        ];
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        scheduler.run();
        assert_eq!(scheduler.current_app().name(), "time");

        tick_n(&mut scheduler, 15);
        assert_eq!(scheduler.current_index(), 1);

        tick_n(&mut scheduler, 15);
        assert_eq!(scheduler.current_index(), 0);

        let shown = scheduler.surface().shown();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].texts[0].text, "4.2°");
    }

    #[test]
    fn event_loop_dispatches_until_shutdown() {
        let (apps, trackers) = fakes(&[true]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);
        let (tx, rx) = mpsc::channel();

        tx.send(Event::Command {
            name: "power".to_owned(),
            payload: "on".to_owned(),
        })
        .unwrap();
        tx.send(Event::Tick).unwrap();
        tx.send(Event::Shutdown).unwrap();
        tx.send(Event::Tick).unwrap();

        scheduler.run_event_loop(&rx);

        assert_eq!(trackers[0].renders(), 1);
        assert!(!scheduler.is_running());
        assert!(scheduler.surface().destroyed());
        // The tick after the shutdown was never consumed
        assert_eq!(rx.try_recv().unwrap(), Event::Tick);
    }

    #[test]
    fn shutdown_from_another_thread_ends_event_loop() {
        let (apps, trackers) = fakes(&[true]);
        let (tx, rx) = mpsc::channel();
        let link = ConnectionFlag::default();
        link.set(true);
        let mut scheduler =
            Scheduler::new(apps, FrameSurface::recording(), link, tx.clone(), TIMING).unwrap();

        scheduler.run();
        let signal = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(Event::Shutdown).unwrap();
        });
        scheduler.run_event_loop(&rx);
        signal.join().unwrap();

        assert_eq!(trackers[0].renders(), 1);
        assert!(!scheduler.is_running());
        assert!(scheduler.surface().destroyed());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (apps, _trackers) = fakes(&[true]);
        let (mut scheduler, _link, _rx) = scheduler_with(apps);

        scheduler.run();
        scheduler.shutdown();
        scheduler.shutdown();

        assert!(!scheduler.is_running());
        assert!(scheduler.surface().destroyed());
    }
}

use crate::{
    apps::App,
    frame::{Position, Rgb, TextStyle},
    surface::Surface,
};
use chrono::{Local, NaiveTime, Timelike};

/// Shows the local wall-clock time. Has no data to fetch, so it is always ready.
pub struct TimeApp {
    clock: fn() -> NaiveTime,
    was_rendered: bool,
}

impl Default for TimeApp {
    fn default() -> TimeApp {
        TimeApp::new()
    }
}

impl TimeApp {
    const STYLE: TextStyle = TextStyle { color: Rgb::WHITE };
    const POSITION: Position = Position::new(6, 1);

    pub fn new() -> TimeApp {
        TimeApp::with_clock(|| Local::now().time())
    }

    pub fn with_clock(clock: fn() -> NaiveTime) -> TimeApp {
        TimeApp {
            clock,
            was_rendered: false,
        }
    }
}

impl App for TimeApp {
    fn name(&self) -> &'static str {
        "time"
    }

    fn should_rerender(&self) -> bool {
        !self.was_rendered
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.was_rendered = false;
    }

    fn render(&mut self, surface: &mut dyn Surface) {
        let now = (self.clock)();
        let text = format!("{:02}:{:02}", now.hour(), now.minute());
        surface.draw_text(Self::STYLE, &text, Self::POSITION);
        self.was_rendered = true;
    }
}

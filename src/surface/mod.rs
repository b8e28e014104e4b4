use crate::frame::{Frame, Position, TextStyle};

mod tui;

pub use tui::TuiSurface;

/// The drawing primitives of the physical display. Calls never fail from the
/// caller's point of view; implementations swallow and log their own errors.
pub trait Surface {
    fn clear(&mut self);

    fn draw_text(&mut self, style: TextStyle, text: &str, position: Position);

    /// Draws a `value` out of `max` progress indicator.
    fn draw_pixel_progress(&mut self, value: u32, max: u32);

    /// Flushes everything drawn since the last `clear` to the display.
    fn show(&mut self);

    fn set_power(&mut self, on: bool);

    /// Releases the display. Calling it more than once is harmless.
    fn destroy(&mut self);
}

/// A display that only keeps its frames in memory. Used for headless runs,
/// where every shown frame is logged at trace level.
#[derive(Debug, Clone, Default)]
pub struct FrameSurface {
    frame: Frame,
    shown: Vec<Frame>,
    powered: bool,
    destroyed: bool,
    keep_history: bool,
}

impl FrameSurface {
    pub fn new() -> FrameSurface {
        FrameSurface {
            powered: true,
            ..FrameSurface::default()
        }
    }

    /// Like [`FrameSurface::new`], but remembers every shown frame.
    #[allow(dead_code)]
    pub fn recording() -> FrameSurface {
        FrameSurface {
            keep_history: true,
            ..FrameSurface::new()
        }
    }

    #[allow(dead_code)]
    pub fn shown(&self) -> &[Frame] {
        &self.shown
    }

    #[allow(dead_code)]
    pub fn powered(&self) -> bool {
        self.powered
    }

    #[allow(dead_code)]
    pub fn destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Surface for FrameSurface {
    fn clear(&mut self) {
        self.frame.clear();
    }

    fn draw_text(&mut self, style: TextStyle, text: &str, position: Position) {
        self.frame.draw_text(style, text, position);
    }

    fn draw_pixel_progress(&mut self, value: u32, max: u32) {
        self.frame.draw_pixel_progress(value, max);
    }

    fn show(&mut self) {
        if self.destroyed {
            log::warn!("show() on a destroyed display ignored");
            return;
        }
        log::trace!("frame:\n{}", self.frame);
        if self.keep_history {
            self.shown.push(self.frame.clone());
        }
    }

    fn set_power(&mut self, on: bool) {
        log::info!("display power {}", if on { "on" } else { "off" });
        self.powered = on;
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }
}

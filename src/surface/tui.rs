use crate::{
    frame::{Frame, Position, Rgb, TextStyle, HEIGHT, WIDTH},
    scheduler::Event,
    surface::Surface,
};
use anyhow::Context;
use crossterm::{
    event::{self, Event as TermEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame as TermFrame, Terminal,
};
use spin_sleep::LoopHelper;
use std::{
    io::Stdout,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

type CrossTerminal = Terminal<CrosstermBackend<Stdout>>;

// Each matrix pixel is two terminal cells wide so the matrix keeps its aspect.
const CELLS_PER_PIXEL: usize = 2;

#[derive(Debug, Clone, Default)]
struct Screen {
    frame: Frame,
    powered: bool,
}

/// Emulates the LED matrix in the terminal. Pressing `q` asks the event loop
/// to shut down.
pub struct TuiSurface {
    terminal: Arc<Mutex<CrossTerminal>>,
    jh: Option<JoinHandle<anyhow::Result<()>>>,
    screen: Arc<Mutex<Screen>>,
    stop_tx: Sender<()>,
    pending: Frame,
}

impl TuiSurface {
    pub fn new(render_period: Duration, events: Sender<Event>) -> anyhow::Result<TuiSurface> {
        let mut stdout = std::io::stdout();
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("unable to enter alternate screen")?;

        // Setup panic handler to cleanup terminal
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic| {
            let _ = Self::reset_terminal();
            original_hook(panic);
        }));

        let terminal = Arc::new(Mutex::new(
            Terminal::new(CrosstermBackend::new(stdout)).context("creating terminal failed")?,
        ));
        let terminal_clone = terminal.clone();

        let (stop_tx, stop_rx) = mpsc::channel();

        let screen = Arc::new(Mutex::new(Screen {
            powered: true,
            ..Screen::default()
        }));
        let screen_clone = screen.clone();

        Ok(TuiSurface {
            terminal,
            jh: Some(thread::spawn(move || {
                Self::run_loop(terminal_clone, screen_clone, render_period, stop_rx, events)
            })),
            screen,
            stop_tx,
            pending: Frame::default(),
        })
    }

    fn run_loop(
        terminal: Arc<Mutex<CrossTerminal>>,
        screen: Arc<Mutex<Screen>>,
        render_period: Duration,
        stop_rx: Receiver<()>,
        events: Sender<Event>,
    ) -> anyhow::Result<()> {
        let result = Self::render_until_stopped(terminal, screen, render_period, stop_rx, &events);
        shut_down_on_error(result, &events)
    }

    fn render_until_stopped(
        terminal: Arc<Mutex<CrossTerminal>>,
        screen: Arc<Mutex<Screen>>,
        render_period: Duration,
        stop_rx: Receiver<()>,
        events: &Sender<Event>,
    ) -> anyhow::Result<()> {
        let poll_timeout = render_period / 4;
        let mut lh = LoopHelper::builder().build_with_target_rate(1. / render_period.as_secs_f32());
        loop {
            lh.loop_start();
            // If we got a message or the other side disconnected, stop the loop
            if matches!(stop_rx.try_recv(), Ok(_) | Err(TryRecvError::Disconnected)) {
                return Ok(());
            }
            {
                let screen = lock(&screen).clone();
                let mut terminal = lock(&terminal);
                terminal.draw(|f| Self::draw(f, &screen))?;
            }
            if Self::should_quit(poll_timeout)? {
                log::info!("quit requested from the terminal");
                // The event loop may already be gone, which is what we want anyway
                let _ = events.send(Event::Shutdown);
                return Ok(());
            }
            lh.loop_sleep();
        }
    }

    fn draw(f: &mut TermFrame<'_>, screen: &Screen) {
        let chunks = Layout::default()
            .constraints(
                [
                    Constraint::Min(1),
                    Constraint::Length(HEIGHT as u16 + 2),
                    Constraint::Min(1),
                ]
                .as_ref(),
            )
            .split(f.size());

        let (title, lines) = if screen.powered {
            ("Smart Display", frame_to_lines(&screen.frame))
        } else {
            ("Smart Display (off)", Vec::new())
        };
        let matrix = Paragraph::new(lines).block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(matrix, chunks[1]);
    }

    fn should_quit(timeout: Duration) -> anyhow::Result<bool> {
        if event::poll(timeout).context("event poll failed")? {
            if let TermEvent::Key(key) = event::read().context("event read failed")? {
                return Ok(KeyCode::Char('q') == key.code);
            }
        }
        Ok(false)
    }

    fn reset_terminal() -> anyhow::Result<()> {
        disable_raw_mode().context("failed to disable raw mode")?;
        execute!(std::io::stdout(), LeaveAlternateScreen)
            .context("unable to switch to main screen")?;
        Ok(())
    }
}

impl Surface for TuiSurface {
    fn clear(&mut self) {
        self.pending.clear();
    }

    fn draw_text(&mut self, style: TextStyle, text: &str, position: Position) {
        self.pending.draw_text(style, text, position);
    }

    fn draw_pixel_progress(&mut self, value: u32, max: u32) {
        self.pending.draw_pixel_progress(value, max);
    }

    fn show(&mut self) {
        lock(&self.screen).frame = self.pending.clone();
    }

    fn set_power(&mut self, on: bool) {
        lock(&self.screen).powered = on;
    }

    fn destroy(&mut self) {
        let Some(jh) = self.jh.take() else {
            return;
        };
        // We can ignore failures as the join below reports errors in the run loop
        let _ = self.stop_tx.send(());

        match jh.join() {
            // Render errors were logged when the thread gave up
            Ok(_) => {}
            Err(_) => log::error!("terminal render loop panicked"),
        }
        let mut terminal = lock(&self.terminal);
        if let Err(err) = Self::reset_terminal() {
            log::error!("{err:#}");
        }
        if let Err(err) = terminal.show_cursor().context("unable to show cursor") {
            log::error!("{err:#}");
        }
    }
}

impl Drop for TuiSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Without the render thread nobody listens for `q` any more, so a failed
/// terminal takes the whole display down.
fn shut_down_on_error(result: anyhow::Result<()>, events: &Sender<Event>) -> anyhow::Result<()> {
    if let Err(err) = &result {
        log::error!("terminal render loop failed: {err:#}");
        let _ = events.send(Event::Shutdown);
    }
    result
}

// A panicking render thread must not take the display down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

/// Lays the frame out as terminal cells: pixels first, text drawn over them
/// starting at its pixel position.
fn frame_to_lines(frame: &Frame) -> Vec<Line<'static>> {
    let columns = WIDTH * CELLS_PER_PIXEL;
    let mut cells: Vec<Vec<(char, Option<Rgb>)>> = (0..HEIGHT)
        .map(|y| {
            (0..columns)
                .map(|col| match frame.pixels[col / CELLS_PER_PIXEL][y] {
                    Some(color) => ('█', Some(color)),
                    None => (' ', None),
                })
                .collect()
        })
        .collect();

    for item in &frame.texts {
        let (Ok(x), Ok(y)) = (
            usize::try_from(item.position.x),
            usize::try_from(item.position.y),
        ) else {
            continue;
        };
        let Some(row) = cells.get_mut(y) else {
            continue;
        };
        for (offset, ch) in item.text.chars().enumerate() {
            if let Some(cell) = row.get_mut(x * CELLS_PER_PIXEL + offset) {
                *cell = (ch, Some(item.style.color));
            }
        }
    }

    cells
        .into_iter()
        .map(|row| {
            Line::from(
                row.into_iter()
                    .map(|(ch, color)| match color {
                        Some(color) => Span::styled(ch.to_string(), Style::default().fg(to_color(color))),
                        None => Span::raw(ch.to_string()),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::{frame_to_lines, shut_down_on_error};
    use crate::{
        frame::{Frame, Position, Rgb, TextStyle, HEIGHT, WIDTH},
        scheduler::Event,
    };
    use std::sync::mpsc;

    fn line_text(frame: &Frame, y: usize) -> String {
        frame_to_lines(frame)[y]
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect()
    }

    #[test]
    fn pixels_are_two_cells_wide() {
        let mut frame = Frame::default();
        frame.draw_pixel_progress(1, WIDTH as u32);

        let lines = frame_to_lines(&frame);
        assert_eq!(lines.len(), HEIGHT);
        assert!(line_text(&frame, HEIGHT - 1).starts_with("██ "));
    }

    #[test]
    fn text_is_overlaid_and_clipped() {
        let mut frame = Frame::default();
        let style = TextStyle { color: Rgb::WHITE };
        frame.draw_text(style, "12:34", Position::new(1, 1));
        frame.draw_text(style, "gone", Position::new(-1, 1));
        frame.draw_text(style, "gone", Position::new(1, HEIGHT as i32));
        frame.draw_text(style, "edge", Position::new(WIDTH as i32 - 1, 2));

        assert_eq!(line_text(&frame, 1).trim(), "12:34");
        assert!(line_text(&frame, 1).starts_with("  12:34"));
        assert!(line_text(&frame, 2).ends_with("ed"));
    }

    #[test]
    fn render_failure_requests_shutdown() {
        let (tx, rx) = mpsc::channel();

        assert!(shut_down_on_error(Ok(()), &tx).is_ok());
        assert!(rx.try_recv().is_err());

        let result = shut_down_on_error(Err(anyhow::anyhow!("terminal gone")), &tx);
        assert_eq!(result.unwrap_err().to_string(), "terminal gone");
        assert_eq!(rx.try_recv().unwrap(), Event::Shutdown);
    }
}

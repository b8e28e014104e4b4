use crate::scheduler::Event;
use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// A repeating timer that posts [`Event::Tick`] into the event loop. The
/// thread never touches scheduler state, it only sends events. Stops when
/// dropped.
pub struct Ticker {
    jh: Option<JoinHandle<()>>,
    stop_tx: Sender<()>,
}

impl Ticker {
    pub fn start(period: Duration, events: Sender<Event>) -> Ticker {
        let (stop_tx, stop_rx) = mpsc::channel();
        Ticker {
            jh: Some(thread::spawn(move || Self::run_loop(period, events, stop_rx))),
            stop_tx,
        }
    }

    fn run_loop(period: Duration, events: Sender<Event>, stop_rx: Receiver<()>) {
        let mut next = Instant::now() + period;
        loop {
            // Waiting on the stop channel instead of sleeping keeps `stop` prompt
            match stop_rx.recv_timeout(next.saturating_duration_since(Instant::now())) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
            if events.send(Event::Tick).is_err() {
                log::debug!("event loop gone, ticker exiting");
                return;
            }
            next = next_deadline(next, period, Instant::now());
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // The thread may already have exited on its own
        let _ = self.stop_tx.send(());
        if let Some(jh) = self.jh.take() {
            if jh.join().is_err() {
                log::error!("ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Keeps a steady schedule, but after a stall (suspend, overloaded host) starts
/// over from `now` instead of firing the missed ticks in a burst.
fn next_deadline(previous: Instant, period: Duration, now: Instant) -> Instant {
    let next = previous + period;
    if next <= now {
        now + period
    } else {
        next
    }
}

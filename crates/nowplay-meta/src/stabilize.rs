//! Title stabilization.
//!
//! Some encoders flap between the programme name and the track title every
//! few seconds, or replay the previous title around song boundaries. The
//! stabilizer therefore holds each candidate title for a quiet window and
//! only announces it once nothing different has been seen in the meantime.
//!
//! Timers are never cancelled; each candidate change bumps a generation
//! counter and a stale timer notices the mismatch when it fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Instant};

use crate::icy::clean_text;

#[derive(Debug, Default)]
struct StabilizerState {
    current: String,
    pending: String,
    first_seen: Option<Instant>,
    generation: u64,
}

/// Debounces raw title announcements into stable ones.
///
/// Feed every incoming title to [`offer`](TitleStabilizer::offer); confirmed
/// titles come out of the receiver returned by [`new`](TitleStabilizer::new).
#[derive(Debug, Clone)]
pub struct TitleStabilizer {
    window: Duration,
    inner: Arc<Mutex<StabilizerState>>,
    tx: mpsc::UnboundedSender<String>,
}

impl TitleStabilizer {
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                window,
                inner: Arc::new(Mutex::new(StabilizerState::default())),
                tx,
            },
            rx,
        )
    }

    /// Offers a raw title. Blank titles and repeats of the confirmed title
    /// are dropped; a new candidate starts a hold window, and a candidate
    /// re-seen past its window is confirmed on the spot.
    pub async fn offer(&self, raw: &str) {
        let title = clean_text(raw);
        if title.is_empty() {
            return;
        }

        let mut st = self.inner.lock().await;
        if title == st.current {
            return;
        }

        if title != st.pending {
            st.pending = title;
            st.first_seen = Some(Instant::now());
            st.generation += 1;
            let generation = st.generation;
            drop(st);

            let window = self.window;
            let inner = Arc::clone(&self.inner);
            let tx = self.tx.clone();
            tokio::spawn(async move {
                sleep(window).await;
                let mut st = inner.lock().await;
                if st.generation == generation && st.current != st.pending {
                    st.current = st.pending.clone();
                    let _ = tx.send(st.current.clone());
                }
            });
            return;
        }

        // same candidate again: confirm it if its window has already passed,
        // otherwise leave the running timer to do it
        let elapsed = match st.first_seen {
            Some(at) => at.elapsed(),
            None => return,
        };
        if elapsed >= self.window {
            st.current = st.pending.clone();
            let _ = self.tx.send(st.current.clone());
        }
    }

    /// Forgets everything, including candidates still in their window. Call
    /// on stream switches so a title from the old stream cannot surface.
    pub async fn reset(&self) {
        let mut st = self.inner.lock().await;
        st.current.clear();
        st.pending.clear();
        st.first_seen = None;
        st.generation += 1;
    }
}

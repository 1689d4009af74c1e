//! Typewriter caption.
//!
//! One process-wide effect that reveals the final layer's text a character
//! at a time. Every call to [`Typewriter::animate`] tears down the previous
//! run's pending reveal timer before starting over, whichever visualization
//! asked for it.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::config::CaptionConfig;
use crate::dom::SharedDocument;
use crate::timeline::{Scheduler, TimerHandle};

pub const FONT_SIZE_PROPERTY: &str = "font-size";

#[derive(Debug, Default)]
struct TypewriterState {
    text: Vec<char>,
    revealed: usize,
    interval_ms: f64,
    timer: Option<TimerHandle>,
    font_px: f64,
    runs: u64,
}

#[derive(Clone)]
pub struct Typewriter {
    state: Rc<RefCell<TypewriterState>>,
    document: SharedDocument,
    scheduler: Scheduler,
    config: CaptionConfig,
    container_id: String,
}

impl Typewriter {
    pub fn new(
        document: SharedDocument,
        scheduler: Scheduler,
        config: CaptionConfig,
        container_id: impl Into<String>,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(TypewriterState {
                font_px: config.base_font_px,
                ..Default::default()
            })),
            document,
            scheduler,
            config,
            container_id: container_id.into(),
        }
    }

    /// Starts revealing `text` over `duration`, cancelling any run in flight.
    pub fn animate(&self, text: &str, duration: Duration) {
        self.cancel();

        let chars: Vec<char> = text.chars().collect();
        let count = chars.len();
        let font_px = self.fit_font(count);
        {
            let mut state = self.state.borrow_mut();
            state.text = chars;
            state.revealed = 0;
            state.font_px = font_px;
            state.interval_ms = if count == 0 {
                0.0
            } else {
                duration.as_secs_f64() * 1_000.0 / count as f64
            };
            state.runs += 1;
        }

        {
            let mut document = self.document.borrow_mut();
            let Some(container) = document.get_element_by_id(&self.container_id) else {
                tracing::warn!(container = %self.container_id, "caption container missing");
                return;
            };
            document.set_text(container, "");
            document.set_style(container, FONT_SIZE_PROPERTY, format!("{font_px:.1}px"));
        }

        if count > 0 {
            self.schedule_next();
        }
    }

    /// Stops the current run, leaving whatever was revealed on screen.
    pub fn cancel(&self) {
        let timer = self.state.borrow_mut().timer.take();
        if let Some(timer) = timer {
            self.scheduler.clear_timeout(timer);
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().timer.is_some()
    }

    pub fn revealed_text(&self) -> String {
        let state = self.state.borrow();
        state.text[..state.revealed].iter().collect()
    }

    pub fn font_px(&self) -> f64 {
        self.state.borrow().font_px
    }

    /// Number of `animate` calls so far.
    pub fn runs(&self) -> u64 {
        self.state.borrow().runs
    }

    fn fit_font(&self, count: usize) -> f64 {
        let base = self.config.base_font_px;
        if count == 0 {
            return base;
        }
        let available = {
            let mut document = self.document.borrow_mut();
            document.flush_layout();
            document
                .get_element_by_id(&self.container_id)
                .map(|container| document.content_box(container).width)
                .filter(|width| *width > 0.0)
                .unwrap_or(self.config.width)
        };
        let needed = count as f64 * base * self.config.char_width_ratio;
        if needed <= available {
            base
        } else {
            (available / (count as f64 * self.config.char_width_ratio))
                .max(self.config.min_font_px)
        }
    }

    fn schedule_next(&self) {
        let interval = self.state.borrow().interval_ms;
        let this = self.clone();
        let timer = self.scheduler.set_timeout(interval, move || this.reveal_next());
        self.state.borrow_mut().timer = Some(timer);
    }

    fn reveal_next(&self) {
        let (shown, finished) = {
            let mut state = self.state.borrow_mut();
            state.timer = None;
            state.revealed = (state.revealed + 1).min(state.text.len());
            let shown: String = state.text[..state.revealed].iter().collect();
            (shown, state.revealed >= state.text.len())
        };

        {
            let mut document = self.document.borrow_mut();
            if let Some(container) = document.get_element_by_id(&self.container_id) {
                document.set_text(container, shown);
            }
        }

        if !finished {
            self.schedule_next();
        }
    }
}

impl std::fmt::Debug for Typewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Typewriter")
            .field("container_id", &self.container_id)
            .field("revealed", &state.revealed)
            .field("len", &state.text.len())
            .finish()
    }
}

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;

pub use crate::traits::Progress;

impl Progress for indicatif::ProgressBar {
    fn inc(&self, i: u64) {
        indicatif::ProgressBar::inc(self, i)
    }

    fn finish(&self) {
        indicatif::ProgressBar::finish(self)
    }
}

impl Progress for logbar::ProgressBar {
    fn inc(&self, i: u64) {
        logbar::ProgressBar::inc(self, i as usize)
    }

    fn finish(&self) {
        logbar::ProgressBar::finish(self)
    }
}

/// Dummy progress indicator
pub struct NoProgress {}
impl Progress for NoProgress {
    fn inc(&self, _i: u64) {}

    fn finish(&self) {}
}

/// Don't show any progress indicator
pub const NO_PROGRESS: NoProgress = NoProgress {};

const TEMPLATE: &str = "{bar:60.cyan/cyan} {msg} {pos}/{len} [{elapsed}]";

/// Switches logging off until dropped or restored
///
/// Log messages would otherwise tear up the bar. Messages that should
/// survive have to be emitted after the bar is finished.
struct LogSilencer {
    previous: LevelFilter,
    restored: AtomicBool,
}

impl LogSilencer {
    fn new() -> Self {
        let previous = log::max_level();
        log::set_max_level(LevelFilter::Off);
        Self {
            previous,
            restored: AtomicBool::new(false),
        }
    }

    fn restore(&self) {
        if !self.restored.swap(true, Ordering::SeqCst) {
            log::set_max_level(self.previous);
        }
    }
}

impl Drop for LogSilencer {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Progress bar for the analysis of an event batch
///
/// An interactive bar for terminals, a plain bar otherwise. No bar is
/// shown unless the log level is exactly `info`. While the bar is
/// active, logging is switched off. It is switched back on when the
/// bar is finished or dropped.
pub struct ProgressBar {
    bar: Box<dyn Progress + Send + Sync>,
    silencer: Option<LogSilencer>,
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self {
            bar: Box::new(NO_PROGRESS),
            silencer: None,
        }
    }
}

impl Progress for ProgressBar {
    fn inc(&self, i: u64) {
        self.bar.inc(i);
    }

    fn finish(&self) {
        self.bar.finish();
        if let Some(silencer) = &self.silencer {
            silencer.restore();
        }
    }
}

impl ProgressBar {
    /// A new progress bar with the given maximum progress and message
    pub fn new(len: u64, message: &str) -> Self {
        if log::max_level().to_level() != Some(log::Level::Info) || len == 0 {
            ProgressBar::default()
        } else if console::Term::stderr().features().is_attended() {
            ProgressBar::indicatif(len, message)
        } else {
            ProgressBar::logbar(len, message)
        }
    }

    /// Whether logging is switched off for this bar
    pub fn is_silencing(&self) -> bool {
        self.silencer
            .as_ref()
            .map_or(false, |s| !s.restored.load(Ordering::SeqCst))
    }

    fn indicatif(len: u64, message: &str) -> Self {
        let bar = indicatif::ProgressBar::new(len);
        match indicatif::ProgressStyle::default_bar().template(TEMPLATE) {
            Ok(style) => bar.set_style(style),
            Err(err) => log::debug!("Failed to set progress bar style: {err}"),
        }
        bar.set_message(message.to_owned());
        ProgressBar {
            bar: Box::new(bar),
            silencer: Some(LogSilencer::new()),
        }
    }

    fn logbar(len: u64, message: &str) -> Self {
        let style = logbar::Style::new().indicator('█');
        eprintln!("{}", message);
        let bar = logbar::ProgressBar::with_style(len as usize, style);
        ProgressBar {
            bar: Box::new(bar),
            silencer: Some(LogSilencer::new()),
        }
    }
}

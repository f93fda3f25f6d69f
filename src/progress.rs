//! Sweep progress reporting.
//!
//! With the `progress` feature, [`SweepProgress`] renders an `indicatif` bar over the
//! files of a batch sweep, with the last and smoothed time per file in its message.
//! Without the feature it compiles to a no-op with the same interface, so sweeps call it
//! unconditionally.
//!
//! The smoothed time is an exponential moving average updated at each tick:
//! `ema ← α·dt + (1–α)·ema`, initialized with the first sample.
use std::time::{Duration, Instant};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

/// Time spent per file, with an exponentially smoothed average.
pub(crate) struct FileClock {
    since: Instant,
    smoothing: f64,
    smoothed: Option<Duration>,
}

impl FileClock {
    pub(crate) fn new(smoothing: f64) -> Self {
        Self {
            since: Instant::now(),
            smoothing,
            smoothed: None,
        }
    }

    /// Close the current file and start timing the next one.
    pub(crate) fn lap(&mut self) -> Duration {
        let elapsed = self.since.elapsed();
        self.since = Instant::now();
        self.smoothed = Some(match self.smoothed {
            None => elapsed,
            Some(prev) => elapsed.mul_f64(self.smoothing) + prev.mul_f64(1.0 - self.smoothing),
        });
        elapsed
    }

    pub(crate) fn smoothed(&self) -> Duration {
        self.smoothed.unwrap_or(Duration::ZERO)
    }
}

pub(crate) fn fmt_dur(d: Duration) -> String {
    match d.as_micros() {
        us @ 0..1_000 => format!("{us}µs"),
        us @ 1_000..1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}

/// Progress of one file sweep.
pub(crate) struct SweepProgress {
    clock: FileClock,
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl SweepProgress {
    pub(crate) fn new(total: usize, label: &str) -> Self {
        #[cfg(feature = "progress")]
        let bar = {
            let bar = ProgressBar::new((total as u64).max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "{prefix} {bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | ETA {eta_precise} | {msg}",
            ) {
                bar.set_style(style);
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(200));
            bar
        };
        #[cfg(not(feature = "progress"))]
        let _ = (total, label);

        Self {
            clock: FileClock::new(0.2),
            #[cfg(feature = "progress")]
            bar,
        }
    }

    /// Mark one file as done and return a `last/avg` timing summary.
    pub(crate) fn tick(&mut self) -> String {
        let last = self.clock.lap();
        let msg = format!("last: {}, avg: {}", fmt_dur(last), fmt_dur(self.clock.smoothed()));
        #[cfg(feature = "progress")]
        {
            self.bar.set_message(msg.clone());
            self.bar.inc(1);
        }
        msg
    }

    pub(crate) fn finish(self) {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod progress_test {
    use super::*;

    #[test]
    fn test_fmt_dur_scales() {
        assert_eq!(fmt_dur(Duration::from_micros(253)), "253µs");
        assert_eq!(fmt_dur(Duration::from_millis(42)), "42ms");
        assert_eq!(fmt_dur(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_clock_average_starts_at_first_lap() {
        let mut clock = FileClock::new(0.5);
        assert_eq!(clock.smoothed(), Duration::ZERO);
        let first = clock.lap();
        assert_eq!(clock.smoothed(), first);
    }
}

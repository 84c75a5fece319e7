//! Timing and progress reporting for long passes.
//!
//! * [`fmt_dur`] – human-readable [`Duration`] (`"253µs"`, `"42ms"`, `"3.14s"`), used in logs.
//! * [`PassProgress`] – progress bar drawn by the KDE coordinator while it drains results, with
//!   the time between outcomes smoothed as `avg ← α·dt + (1–α)·avg`. It is a no-op unless the
//!   crate is compiled with the `progress` feature.
use std::time::Duration;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "progress")]
use std::time::Instant;

/// Weight of the latest interval in the running average.
#[cfg(feature = "progress")]
const ALPHA: f64 = 0.2;

pub fn fmt_dur(d: Duration) -> String {
    match d.as_micros() {
        us @ 0..=999 => format!("{us}µs"),
        1_000..=999_999 => format!("{}ms", d.as_millis()),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}

/// Progress of a pass over a known number of items.
pub struct PassProgress {
    #[cfg(feature = "progress")]
    pb: ProgressBar,
    #[cfg(feature = "progress")]
    last: Instant,
    /// Running average of the interval between items (seconds), `None` before the first item.
    #[cfg(feature = "progress")]
    avg: Option<f64>,
}

impl PassProgress {
    #[cfg(feature = "progress")]
    pub fn new(total: u64) -> Self {
        let pb = ProgressBar::new(total.max(1));
        if let Ok(style) = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | ETA {eta_precise} | {msg}",
        ) {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(200));
        PassProgress {
            pb,
            last: Instant::now(),
            avg: None,
        }
    }

    #[cfg(not(feature = "progress"))]
    pub fn new(_total: u64) -> Self {
        PassProgress {}
    }

    /// One more item done.
    #[inline]
    pub fn inc(&mut self) {
        #[cfg(feature = "progress")]
        {
            let now = Instant::now();
            let dt = now.duration_since(self.last).as_secs_f64();
            self.last = now;
            let avg = self.avg.map_or(dt, |a| ALPHA * dt + (1.0 - ALPHA) * a);
            self.avg = Some(avg);
            self.pb
                .set_message(format!("{} per stage", fmt_dur(Duration::from_secs_f64(avg))));
            self.pb.inc(1);
        }
    }

    pub fn finish(self) {
        #[cfg(feature = "progress")]
        self.pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_dur() {
        assert_eq!(fmt_dur(Duration::from_micros(253)), "253µs");
        assert_eq!(fmt_dur(Duration::from_millis(42)), "42ms");
        assert_eq!(fmt_dur(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_pass_progress_runs() {
        let mut p = PassProgress::new(2);
        p.inc();
        p.inc();
        p.finish();
    }
}

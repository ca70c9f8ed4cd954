use cairn::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::time::Duration;

const TICK_INTERVAL_MS: u64 = 100;

/// Renders engine progress events as a terminal spinner and bar.
///
/// An [`indicatif`] bar is internally synchronized and cheap to clone, so the
/// display hands the engine a callback holding its own handle to the same
/// bar. Phases without a known task count show a spinner; once a task with a
/// length starts, the spinner is swapped for a counting bar.
#[derive(Clone)]
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0)
            .with_style(Self::indeterminate_style())
            .with_message("Idle");
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.finish_and_clear();
        Self { bar }
    }

    /// Builds the callback handed to the engine's progress reporter.
    pub fn callback(&self) -> ProgressCallback<'static> {
        let bar = self.bar.clone();
        Box::new(move |event: Progress| match event {
            Progress::PhaseStart { name } => {
                bar.reset();
                bar.set_length(0);
                bar.set_style(Self::indeterminate_style());
                bar.enable_steady_tick(Duration::from_millis(TICK_INTERVAL_MS));
                bar.set_message(name);
            }
            Progress::PhaseFinish => {
                bar.disable_steady_tick();
                bar.finish_with_message("✓ Complete");
            }
            Progress::TaskStart { total } => {
                bar.disable_steady_tick();
                bar.reset();
                bar.set_length(total);
                bar.set_style(Self::counting_style());
            }
            Progress::TaskAdvance => bar.inc(1),
            Progress::TaskFinish => {
                if let Some(total) = bar.length() {
                    bar.set_position(total);
                }
                bar.finish();
            }
            Progress::Message(msg) => {
                if bar.is_finished() {
                    bar.set_message(msg);
                } else {
                    bar.println(format!("  {}", msg));
                }
            }
        })
    }

    fn indeterminate_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("spinner template is a valid literal")
    }

    fn counting_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<24} [{bar:36.cyan/blue}] {pos}/{len} ({eta})")
            .expect("bar template is a valid literal")
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    write!(w, "{:.0}s", state.eta().as_secs_f64()).unwrap()
                },
            )
            .progress_chars("=>-")
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

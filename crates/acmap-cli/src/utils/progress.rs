use acmap::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 100;

/// Drives one indicatif bar from library progress events: a spinner while a
/// phase runs, a bar once the phase announces its number of tasks.
#[derive(Clone)]
pub struct CliProgressHandler {
    bar: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(0), target).with_style(spinner_style());
        bar.finish_and_clear();
        Self {
            bar: Arc::new(Mutex::new(bar)),
        }
    }

    pub fn callback(&self) -> ProgressCallback<'static> {
        let bar = Arc::clone(&self.bar);
        Box::new(move |progress: Progress| {
            let Ok(bar) = bar.lock() else {
                warn!("Progress bar lock poisoned; progress event dropped.");
                return;
            };
            match progress {
                Progress::PhaseStart { name } => {
                    bar.reset();
                    bar.set_length(0);
                    bar.set_style(spinner_style());
                    bar.set_message(name);
                    bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                }
                Progress::TaskStart { total_steps } => {
                    bar.disable_steady_tick();
                    bar.set_style(bar_style());
                    bar.set_length(total_steps);
                    bar.set_position(0);
                }
                Progress::TaskIncrement => bar.inc(1),
                Progress::TaskFinish => {
                    if let Some(length) = bar.length() {
                        bar.set_position(length);
                    }
                }
                Progress::PhaseFinish => {
                    bar.disable_steady_tick();
                    let message = format!("✓ {}", bar.message());
                    bar.finish_with_message(message);
                }
                Progress::Message(text) => bar.println(format!("  {}", text)),
            }
        })
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:<20} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        })
        .progress_chars("##-")
}

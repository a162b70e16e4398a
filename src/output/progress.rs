use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright_green, bright_yellow};

const TICK_EVERY: u64 = 10_000;

/// Spinner on stderr while observations are streamed in.
pub struct ReadProgress {
    pb: ProgressBar,
    source: String,
}

impl ReadProgress {
    pub fn start(source: &str) -> Self {
        let pb = create_spinner(bright_yellow(format!("Reading observations from {source}")).to_string());
        Self {
            pb,
            source: source.to_owned(),
        }
    }

    /// Updates the message every few thousand observations.
    pub fn observed(&self, count: u64) {
        if count % TICK_EVERY == 0 {
            self.pb.set_message(
                bright_yellow(format!("Reading observations from {}: {count}", self.source))
                    .to_string(),
            );
        }
    }

    pub fn finish(self, count: u64) {
        self.pb.finish_with_message(
            bright_green(format!("Read {count} observations from {} ✓", self.source)).to_string(),
        );
    }

    pub fn abandon(self) {
        self.pb.abandon();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

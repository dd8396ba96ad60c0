//! Console presentation of update events.

use crate::constants::NO_PROGRESS_ENV;
use crate::updater::{Reporter, UpdateEvent, UpdateOutcome};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// Prints update events to the terminal.
pub struct ConsoleReporter {
    show_progress: bool,
    print_failures: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    /// Reporter with progress bars unless `no_progress` or the
    /// `BINKEEPER_NO_PROGRESS` variable is set.
    #[must_use]
    pub fn new(no_progress: bool) -> Self {
        Self {
            show_progress: !no_progress && std::env::var_os(NO_PROGRESS_ENV).is_none(),
            print_failures: true,
            bar: Mutex::new(None),
        }
    }

    /// Leave failed outcomes to the caller.
    #[must_use]
    pub const fn without_failure_output(mut self) -> Self {
        self.print_failures = false;
        self
    }

    fn progress(&self, percentage: u8) {
        if !self.show_progress {
            return;
        }
        let Ok(mut bar) = self.bar.lock() else {
            return;
        };
        bar.get_or_insert_with(download_bar).set_position(u64::from(percentage));
    }

    fn finish_progress(&self) {
        if let Ok(mut bar) = self.bar.lock()
            && let Some(bar) = bar.take()
        {
            bar.finish_and_clear();
        }
    }
}

fn download_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}%")
    {
        bar.set_style(style.progress_chars("━╸━"));
    }
    bar.set_prefix("Downloading");
    bar
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: UpdateEvent) {
        match event {
            UpdateEvent::NotInstalled => {
                println!("{}", "No working binary found, installing...".yellow());
            }
            UpdateEvent::UpdateAvailable {
                current,
                remote,
            } => {
                println!("{} {} → {}", "Update available:".cyan(), current, remote.to_string().green());
            }
            UpdateEvent::NoUpdate {
                current,
            } => {
                println!("{} ({} is the latest version)", "No update found".green(), current);
            }
            UpdateEvent::Progress(percentage) => self.progress(percentage),
            UpdateEvent::Finished(outcome) => {
                self.finish_progress();
                if self.print_failures || outcome.is_success() {
                    print_outcome(&outcome);
                }
            }
        }
    }
}

fn print_outcome(outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::NoUpdateAvailable {
            ..
        } => {}
        UpdateOutcome::UpdateInstalled {
            release_page,
            path_warning,
            ..
        } => {
            println!("{} {}", "✓".green().bold(), outcome.to_string().green());
            if let Some(page) = release_page {
                println!("  What's new: {page}");
            }
            if let Some(warning) = path_warning {
                println!("  {} {}", "Warning:".yellow(), warning);
            }
        }
        UpdateOutcome::SkippedOffline => println!("{}", outcome.to_string().yellow()),
        UpdateOutcome::Failed(error) if !error.is_user_facing() => {
            println!("{}", outcome.to_string().yellow());
        }
        UpdateOutcome::Failed(_) => eprintln!("{} {}", "✗".red().bold(), outcome.to_string().red()),
    }
}

//! Output formatting utilities

use std::time::Duration;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use stratum_core::{Direction, MigrationEvent, MigrationObserver};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "Applying",
        Direction::Down => "Reverting",
    }
}

/// Spinner showing the migration currently running
///
/// Prints one line per finished migration. Hidden for `--json` runs so
/// stdout stays machine readable.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl MigrationObserver for ProgressObserver {
    fn on_event(&self, event: &MigrationEvent<'_>) {
        match event {
            MigrationEvent::Started { id, direction } => {
                self.bar.set_message(format!("{} {}", verb(*direction), id));
            }
            MigrationEvent::Completed { id, direction, duration } => {
                let mark = match direction {
                    Direction::Up => "+".green(),
                    Direction::Down => "-".yellow(),
                };
                self.bar.println(format!(
                    "  {} {} {}",
                    mark,
                    id,
                    format!("({} ms)", duration.as_millis()).dimmed()
                ));
            }
            MigrationEvent::Failed { id, .. } => {
                self.bar.println(format!("  {} {}", "x".red(), id));
            }
        }
    }
}

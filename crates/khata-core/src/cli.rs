use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::engine::WeekStart;
use crate::format::Verbosity;
use crate::sequence::DEFAULT_PERIOD_COUNT;
use crate::system::CalendarSystem;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "khata",
    version,
    about = "Khata: Gregorian and Bikram Sambat reporting periods",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Calendar system; overrides the config file and $KHATA_CALENDAR.
    #[arg(short = 'c', long = "calendar", value_enum, global = true)]
    pub calendar: Option<CalendarSystem>,

    #[arg(long = "week-start", value_enum, global = true)]
    pub week_start: Option<WeekStart>,

    /// Reference instant used in place of the clock.
    #[arg(long = "now", global = true)]
    pub now: Option<String>,

    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Render an instant.
    Format {
        #[arg(default_value = "now")]
        instant: String,

        #[arg(long, value_enum, default_value_t = Verbosity::Long)]
        verbosity: Verbosity,
    },
    /// "Month, Year" of the period containing an instant.
    Label {
        #[arg(default_value = "now")]
        instant: String,
    },
    /// Bounds of the calendar month containing an instant.
    Month {
        #[arg(default_value = "now")]
        instant: String,
    },
    /// Month bounds widened to whole weeks for a calendar grid.
    Page {
        #[arg(default_value = "now")]
        instant: String,
    },
    /// Bounds of a named range: this-month, last-month, this-year, 3m, 6m, 1y, <N>m, <N>y.
    Range {
        /// Defaults to this-month when omitted.
        token: Option<String>,
    },
    /// The last N month starts, most recent first.
    Periods {
        #[arg(short = 'n', long = "count", default_value_t = DEFAULT_PERIOD_COUNT)]
        count: usize,
    },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = GlobalCli::try_parse_from([
            "khata",
            "month",
            "2024-01-15",
            "--calendar",
            "bs",
            "--json",
        ])
        .expect("parse args");
        assert_eq!(cli.calendar, Some(CalendarSystem::Nepali));
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Month { ref instant } if instant == "2024-01-15"));
    }

    #[test]
    fn range_token_is_optional() {
        let cli = GlobalCli::try_parse_from(["khata", "range"]).expect("parse args");
        assert!(matches!(cli.command, Command::Range { token: None }));
    }

    #[test]
    fn periods_defaults_to_twelve() {
        let cli = GlobalCli::try_parse_from(["khata", "-vv", "periods"]).expect("parse args");
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Periods { count: 12 }));
    }
}

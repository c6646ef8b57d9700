pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod instant;
pub mod oracle;
pub mod period;
pub mod sequence;
pub mod system;

use std::ffi::OsString;
use std::io::Write;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use crate::engine::{
  PeriodEngine,
  WeekStart
};
pub use crate::error::{
  CalendarError,
  OracleError
};
pub use crate::format::Verbosity;
pub use crate::oracle::{
  BsTable,
  NepaliDate,
  NepaliOracle
};
pub use crate::period::{
  PeriodRange,
  RangeToken
};
pub use crate::sequence::{
  DEFAULT_PERIOD_COUNT,
  PeriodOption,
  PeriodSequence
};
pub use crate::system::{
  CalendarDate,
  CalendarSystem,
  Resolved
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting khata CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref(),
    |key| std::env::var(key).ok()
  )?;
  if let Some(system) = cli.calendar {
    cfg.calendar.system = system;
  }
  if let Some(week_start) =
    cli.week_start
  {
    cfg.calendar.week_start =
      week_start;
  }
  debug!(?cfg, "effective config");

  let engine =
    cfg.build_engine().context(
      "failed to build period engine"
    )?;

  let clock = Utc::now();
  let now = match cli.now.as_deref() {
    | Some(raw) => {
      instant::parse_instant(raw, clock)
        .with_context(|| {
          format!(
            "invalid --now value: {raw}"
          )
        })?
    }
    | None => clock
  };

  let mut out =
    std::io::stdout().lock();
  commands::dispatch(
    &engine,
    cli.command,
    commands::OutputOptions {
      system: cfg.calendar.system,
      json:   cli.json
    },
    now,
    &mut out
  )?;
  out.flush()?;

  info!("done");
  Ok(())
}

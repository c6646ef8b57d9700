use std::io::Write;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cli::Command;
use crate::engine::PeriodEngine;
use crate::instant::parse_instant;
use crate::period::{PeriodRange, RangeToken};
use crate::system::{CalendarSystem, Resolved};

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub system: CalendarSystem,
    pub json: bool,
}

#[derive(Serialize)]
struct TextReport<'a> {
    system: CalendarSystem,
    value: &'a str,
    fallback: Option<String>,
}

#[derive(Serialize)]
struct RangeReport<'a> {
    system: CalendarSystem,
    #[serde(flatten)]
    range: &'a PeriodRange,
    label: &'a str,
    fallback: Option<String>,
}

fn iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[instrument(skip(engine, out))]
pub fn dispatch(
    engine: &PeriodEngine,
    command: Command,
    opts: OutputOptions,
    now: DateTime<Utc>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let system = opts.system;
    debug!(%system, %now, "dispatching command");

    match command {
        Command::Format { instant, verbosity } => {
            let instant = parse_instant(&instant, now)?;
            let text = engine.format_date(instant, system, verbosity);
            write_text(out, opts, &text)
        }
        Command::Label { instant } => {
            let instant = parse_instant(&instant, now)?;
            let text = engine.format_period_label(instant, system);
            write_text(out, opts, &text)
        }
        Command::Month { instant } => {
            let instant = parse_instant(&instant, now)?;
            let range = engine.month_range(instant, system)?;
            write_range(engine, out, opts, &range)
        }
        Command::Page { instant } => {
            let instant = parse_instant(&instant, now)?;
            let range = engine.calendar_page_range(instant, system)?;
            write_range(engine, out, opts, &range)
        }
        Command::Range { token } => {
            let range = match token {
                Some(raw) => engine
                    .named_range(&raw, system, now)
                    .with_context(|| format!("cannot resolve range {raw:?}"))?,
                None => {
                    debug!("no range token given; using this-month");
                    engine.token_range(RangeToken::default(), system, now)?
                }
            };
            write_range(engine, out, opts, &range)
        }
        Command::Periods { count } => {
            let options = engine.period_options(system, now, count);
            if opts.json {
                serde_json::to_writer_pretty(&mut *out, &options)?;
                writeln!(out)?;
                return Ok(());
            }
            for option in &options {
                let marker = if option.fallback { " (gregorian fallback)" } else { "" };
                writeln!(out, "{}  {}{marker}", iso(option.start), option.label)?;
            }
            Ok(())
        }
    }
}

fn fallback_note<T>(resolved: &Resolved<T>) -> Option<String> {
    let cause = resolved.cause()?;
    warn!(error = %cause, "output is degraded");
    Some(cause.to_string())
}

fn write_text(out: &mut impl Write, opts: OutputOptions, text: &Resolved<String>) -> anyhow::Result<()> {
    let fallback = fallback_note(text);
    if opts.json {
        let report = TextReport {
            system: opts.system,
            value: text.value(),
            fallback,
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", text.value())?;
        if let Some(note) = fallback {
            writeln!(out, "note: {note}")?;
        }
    }
    Ok(())
}

fn write_range(
    engine: &PeriodEngine,
    out: &mut impl Write,
    opts: OutputOptions,
    range: &Resolved<PeriodRange>,
) -> anyhow::Result<()> {
    let label = engine.format_range(range.value(), opts.system);
    let fallback = fallback_note(range).or_else(|| fallback_note(&label));
    if opts.json {
        let report = RangeReport {
            system: opts.system,
            range: range.value(),
            label: label.value(),
            fallback,
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
    } else {
        writeln!(out, "start  {}", iso(range.value().start))?;
        writeln!(out, "end    {}", iso(range.value().end))?;
        writeln!(out, "days   {}", range.value().days())?;
        writeln!(out, "label  {}", label.value())?;
        if let Some(note) = fallback {
            writeln!(out, "note   {note}")?;
        }
    }
    Ok(())
}

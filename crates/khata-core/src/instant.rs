use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  NaiveDate,
  NaiveDateTime,
  Utc
};
use regex::Regex;

use crate::engine::start_of_day;

fn utc_midnight(
  date: NaiveDate
) -> anyhow::Result<DateTime<Utc>> {
  start_of_day(date).map_err(|err| {
    anyhow!(
      "failed to construct midnight: \
       {err}"
    )
  })
}

/// Parses a caller-supplied instant.
/// Every form is read as UTC; no local
/// timezone is consulted.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_instant(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return utc_midnight(
        now.date_naive()
      );
    }
    | "tomorrow" => {
      let today =
        parse_instant("today", now)?;
      return Ok(
        today + Duration::days(1)
      );
    }
    | "yesterday" => {
      let today =
        parse_instant("today", now)?;
      return Ok(
        today - Duration::days(1)
      );
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dh])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let num: i64 = caps["num"]
      .parse()
      .context(
        "invalid relative number"
      )?;
    let duration = match &caps["unit"]
    {
      | "d" => Duration::try_days(num),
      | _ => Duration::try_hours(num)
    }
    .ok_or_else(|| {
      anyhow!(
        "relative offset too large: \
         {token}"
      )
    })?;

    let shifted = if &caps["sign"] == "-"
    {
      now.checked_sub_signed(duration)
    } else {
      now.checked_add_signed(duration)
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative offset out of \
         range: {token}"
      )
    });
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y%m%dT%H%M%SZ"
    )
  {
    return Ok(ndt.and_utc());
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return utc_midnight(date);
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(ndt.and_utc());
    }
  }

  Err(anyhow!(
    "unrecognized instant: {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     +Nd/-Nd/+Nh/-Nh, RFC3339, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM, YYYYMMDDTHHMMSSZ"
  })
}

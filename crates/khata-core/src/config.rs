use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::Arc;

use anyhow::{
  Context,
  anyhow
};
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::engine::{
  PeriodEngine,
  WeekStart
};
use crate::oracle::BsTable;
use crate::system::CalendarSystem;

const CONFIG_FILE: &str = "khata.toml";
const CONFIG_DIR: &str = "khata";
pub const CONFIG_ENV_VAR: &str =
  "KHATA_CONFIG";
pub const CALENDAR_ENV_VAR: &str =
  "KHATA_CALENDAR";

#[derive(
  Debug, Clone, Default, Deserialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub calendar: CalendarSection,

  #[serde(skip)]
  pub loaded_file: Option<PathBuf>
}

#[derive(
  Debug, Clone, Default, Deserialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarSection {
  pub system:       CalendarSystem,
  pub week_start:   WeekStart,
  /// Replacement Bikram Sambat table;
  /// relative paths resolve against
  /// the config file's directory.
  pub nepali_table: Option<PathBuf>
}

impl Config {
  /// Loads from `override_path`, then
  /// `$KHATA_CONFIG`, then
  /// `<config_dir>/khata/khata.toml`.
  /// Missing default file means
  /// defaults; a missing explicit file
  /// is an error.
  #[tracing::instrument(skip(env))]
  pub fn load(
    override_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>
  ) -> anyhow::Result<Self> {
    let Some(path) =
      resolve_config_path(
        override_path,
        &env
      )
    else {
      info!(
        "no config file found; using \
         defaults"
      );
      let mut cfg = Self::default();
      cfg.apply_env_overrides(&env);
      return Ok(cfg);
    };

    let raw =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    let mut cfg =
      Self::from_toml_str(&raw)
        .with_context(|| {
          format!(
            "failed to parse {}",
            path.display()
          )
        })?;
    info!(file = %path.display(), "loaded config");
    cfg.loaded_file = Some(path);
    cfg.apply_env_overrides(&env);
    Ok(cfg)
  }

  pub fn from_toml_str(
    raw: &str
  ) -> anyhow::Result<Self> {
    toml::from_str(raw).map_err(|err| {
      anyhow!(
        "invalid config: {err}"
      )
    })
  }

  pub fn apply_env_overrides(
    &mut self,
    env: impl Fn(&str) -> Option<String>
  ) {
    let Some(raw) =
      env(CALENDAR_ENV_VAR)
    else {
      return;
    };
    match raw.parse::<CalendarSystem>()
    {
      | Ok(system) => {
        debug!(
          source = CALENDAR_ENV_VAR,
          %system,
          "calendar system override"
        );
        self.calendar.system = system;
      }
      | Err(err) => {
        warn!(
          source = CALENDAR_ENV_VAR,
          value = %raw,
          error = %err,
          "ignoring invalid calendar override"
        );
      }
    }
  }

  fn table_path(
    &self
  ) -> Option<PathBuf> {
    let path =
      self.calendar.nepali_table.as_ref()?;
    if path.is_absolute() {
      return Some(path.clone());
    }
    let base = self
      .loaded_file
      .as_deref()
      .and_then(Path::parent)
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });
    Some(base.join(path))
  }

  #[tracing::instrument(skip(self))]
  pub fn build_engine(
    &self
  ) -> anyhow::Result<PeriodEngine> {
    let table = match self.table_path()
    {
      | Some(path) => {
        BsTable::load(&path)
          .context(
            "failed to load nepali \
             month table"
          )?
      }
      | None => BsTable::bundled()
    };
    debug!(
      first_year = table.first_year(),
      last_year = table.last_year(),
      week_start = ?self.calendar.week_start,
      "building period engine"
    );
    Ok(
      PeriodEngine::new(Arc::new(table))
        .with_week_start(
          self.calendar.week_start
        )
    )
  }
}

fn resolve_config_path(
  override_path: Option<&Path>,
  env: &impl Fn(&str) -> Option<String>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Some(raw) = env(CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  let candidate = dirs::config_dir()?
    .join(CONFIG_DIR)
    .join(CONFIG_FILE);
  if candidate.exists() {
    Some(candidate)
  } else {
    debug!(
      file = %candidate.display(),
      "default config file not found"
    );
    None
  }
}

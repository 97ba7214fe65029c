use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration as StdDuration;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Duration,
  Weekday
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::calendar::JalaliDate;
use crate::slot::SlotTime;

const API_KEY_PLACEHOLDER: &str =
  "YOUR_API_KEY_HERE";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    nbatrc_override
  ))]
  pub fn load(
    nbatrc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();

    let nbatrc = resolve_nbatrc_path(
      nbatrc_override
    )?;
    if let Some(path) = nbatrc {
      info!(nbatrc = %path.display(), "loading nbatrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no nbatrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    for (key, value) in [
      ("data.location", "~/.nbat"),
      ("default.command", "calendar"),
      ("color", "on"),
      ("calendar.hours.start", "09:00"),
      ("calendar.hours.end", "20:30"),
      ("calendar.hours.interval", "30"),
      (
        "calendar.working_days",
        "0,1,2,3,4,5"
      ),
      ("holiday.timeout", "10"),
      ("booking.recent_minutes", "5")
    ] {
      cfg.map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    cfg
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Clinic-level settings derived from the flat key map.
#[derive(Debug, Clone)]
pub struct ClinicSettings {
  pub hours_start:    SlotTime,
  pub hours_end:      SlotTime,
  pub hours_interval: u32,
  pub working_days:   Vec<Weekday>,
  pub holidays:       Vec<JalaliDate>,
  pub recent_window:  Duration,
  pub holiday_feed:   Option<HolidayFeedSettings>
}

#[derive(Debug, Clone)]
pub struct HolidayFeedSettings {
  pub api_url: String,
  pub api_key: String,
  pub timeout: StdDuration
}

impl ClinicSettings {
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let hours_start = parse_time_key(
      cfg,
      "calendar.hours.start"
    )?;
    let hours_end = parse_time_key(
      cfg,
      "calendar.hours.end"
    )?;
    if hours_end < hours_start {
      return Err(anyhow!(
        "calendar.hours.end \
         ({hours_end}) is before \
         calendar.hours.start \
         ({hours_start})"
      ));
    }
    let hours_interval = parse_u32_key(
      cfg,
      "calendar.hours.interval"
    )?
    .max(1);

    let working_days = cfg
      .get("calendar.working_days")
      .map(|raw| {
        parse_weekday_list(&raw)
      })
      .transpose()?
      .unwrap_or_default();

    let holidays = cfg
      .get("calendar.holidays")
      .map(|raw| parse_holiday_list(&raw))
      .transpose()?
      .unwrap_or_default();

    let recent_window =
      Duration::minutes(i64::from(
        parse_u32_key(
          cfg,
          "booking.recent_minutes"
        )?
      ));

    let holiday_feed =
      match (
        cfg.get("holiday.api_url"),
        cfg.get("holiday.api_key")
      ) {
        | (Some(url), Some(key))
          if !url.trim().is_empty()
            && !key.trim().is_empty()
            && key.trim()
              != API_KEY_PLACEHOLDER =>
        {
          Some(HolidayFeedSettings {
            api_url: url
              .trim()
              .to_string(),
            api_key: key
              .trim()
              .to_string(),
            timeout:
              StdDuration::from_secs(
                u64::from(
                  parse_u32_key(
                    cfg,
                    "holiday.timeout"
                  )?
                )
              )
          })
        }
        | _ => None
      };

    Ok(Self {
      hours_start,
      hours_end,
      hours_interval,
      working_days,
      holidays,
      recent_window,
      holiday_feed
    })
  }

  /// The selectable times of a clinic day.
  pub fn time_grid(
    &self
  ) -> Vec<SlotTime> {
    SlotTime::working_hours(
      self.hours_start,
      self.hours_end,
      self.hours_interval
    )
  }
}

fn parse_time_key(
  cfg: &Config,
  key: &str
) -> anyhow::Result<SlotTime> {
  let raw = cfg.get(key).ok_or_else(
    || anyhow!("missing config key {key}")
  )?;
  raw.parse().with_context(|| {
    format!("invalid {key}")
  })
}

fn parse_u32_key(
  cfg: &Config,
  key: &str
) -> anyhow::Result<u32> {
  let raw = cfg.get(key).ok_or_else(
    || anyhow!("missing config key {key}")
  )?;
  raw.trim().parse().with_context(|| {
    format!(
      "invalid {key}: expected a \
       non-negative integer, got \
       {raw:?}"
    )
  })
}

fn parse_weekday_list(
  raw: &str
) -> anyhow::Result<Vec<Weekday>> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|item| !item.is_empty())
    .map(|item| {
      let n: u8 =
        item.parse().with_context(
          || {
            format!(
              "invalid weekday \
               number {item:?}"
            )
          }
        )?;
      match n {
        | 0 => Ok(Weekday::Sun),
        | 1 => Ok(Weekday::Mon),
        | 2 => Ok(Weekday::Tue),
        | 3 => Ok(Weekday::Wed),
        | 4 => Ok(Weekday::Thu),
        | 5 => Ok(Weekday::Fri),
        | 6 => Ok(Weekday::Sat),
        | other => {
          Err(anyhow!(
            "weekday number out of \
             range (0-6): {other}"
          ))
        }
      }
    })
    .collect()
}

fn parse_holiday_list(
  raw: &str
) -> anyhow::Result<Vec<JalaliDate>> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|item| !item.is_empty())
    .map(|item| {
      item.parse::<JalaliDate>().with_context(
        || {
          format!(
            "invalid calendar.holidays \
             entry {item:?}"
          )
        }
      )
    })
    .collect()
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_nbatrc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(nbatrc_env) =
    std::env::var("NBATRC")
  {
    if nbatrc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      nbatrc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping ~/.nbatrc"
    );
    return Ok(None);
  };
  let candidate = home.join(".nbatrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".nbat"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use chrono::Weekday;
  use tempfile::tempdir;

  use super::{
    ClinicSettings,
    Config
  };

  #[test]
  fn defaults_describe_clinic_day() {
    let settings =
      ClinicSettings::from_config(
        &Config::defaults()
      )
      .expect("defaults parse");
    let grid = settings.time_grid();
    assert_eq!(grid.len(), 24);
    assert_eq!(
      settings.working_days.len(),
      6
    );
    assert!(
      !settings
        .working_days
        .contains(&Weekday::Sat)
    );
    assert_eq!(
      settings.recent_window,
      chrono::Duration::minutes(5)
    );
    assert!(
      settings.holiday_feed.is_none()
    );
  }

  #[test]
  fn file_includes_and_overrides_apply_in_order()
   {
    let dir = tempdir().expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "calendar.hours.interval = 15\n"
    )
    .expect("write include");
    let main = dir.path().join("nbatrc");
    fs::write(
      &main,
      "# clinic\ncalendar.hours.start = \
       10:00 # opening\ninclude \
       extra.rc\ncalendar.holidays = \
       1404/01/01, 1404/01/13\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(
      main.as_path()
    ))
    .expect("load");
    cfg.apply_overrides([(
      "rc.calendar.hours.end"
        .to_string(),
      "11:00".to_string()
    )]);

    let settings =
      ClinicSettings::from_config(&cfg)
        .expect("settings");
    let grid: Vec<String> = settings
      .time_grid()
      .iter()
      .map(ToString::to_string)
      .collect();
    assert_eq!(
      grid,
      [
        "10:00", "10:15", "10:30",
        "10:45", "11:00"
      ]
    );
    assert_eq!(
      settings.holidays.len(),
      2
    );
    assert_eq!(
      cfg.loaded_files.len(),
      2
    );
  }

  #[test]
  fn placeholder_api_key_disables_feed() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides([
      (
        "holiday.api_url".to_string(),
        "https://example.invalid/events"
          .to_string()
      ),
      (
        "holiday.api_key".to_string(),
        "YOUR_API_KEY_HERE".to_string()
      )
    ]);
    let settings =
      ClinicSettings::from_config(&cfg)
        .expect("settings");
    assert!(
      settings.holiday_feed.is_none()
    );

    cfg.apply_overrides([(
      "holiday.api_key".to_string(),
      "real-key".to_string()
    )]);
    let settings =
      ClinicSettings::from_config(&cfg)
        .expect("settings");
    assert!(
      settings.holiday_feed.is_some()
    );
  }

  #[test]
  fn rejects_inverted_hours_and_bad_weekday()
   {
    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "calendar.hours.end".to_string(),
      "08:00".to_string()
    )]);
    assert!(
      ClinicSettings::from_config(&cfg)
        .is_err()
    );

    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "calendar.working_days"
        .to_string(),
      "0,7".to_string()
    )]);
    assert!(
      ClinicSettings::from_config(&cfg)
        .is_err()
    );
  }
}

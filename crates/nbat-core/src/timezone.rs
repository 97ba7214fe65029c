use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  DateTime,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "nbat-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "NBAT_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "NBAT_TIME_CONFIG";
const DEFAULT_CLINIC_TIMEZONE: &str =
  "Asia/Tehran";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn clinic_timezone() -> &'static Tz {
  static CLINIC_TZ: OnceLock<Tz> =
    OnceLock::new();
  CLINIC_TZ.get_or_init(
    resolve_clinic_timezone
  )
}

/// The clinic's calendar day at `now`.
#[must_use]
pub fn clinic_today(
  now: DateTime<Utc>
) -> NaiveDate {
  now.with_timezone(clinic_timezone())
    .date_naive()
}

#[must_use]
pub fn format_clinic_datetime(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(clinic_timezone())
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

/// Midnight of the 1st of `month` up to midnight of the 1st of the next
/// month, both in `tz`.
pub fn month_bounds(
  tz: &Tz,
  year: i32,
  month: u32
) -> anyhow::Result<(
  DateTime<Utc>,
  DateTime<Utc>
)> {
  let first =
    NaiveDate::from_ymd_opt(
      year, month, 1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month: \
         {year}-{month:02}"
      )
    })?;
  let (next_year, next_month) =
    if month == 12 {
      (year + 1, 1)
    } else {
      (year, month + 1)
    };
  let next_first =
    NaiveDate::from_ymd_opt(
      next_year, next_month, 1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month: \
         {next_year}-{next_month:02}"
      )
    })?;

  let start = to_utc_from_local(
    tz,
    first.and_time(
      chrono::NaiveTime::MIN
    ),
    "month start"
  )?;
  let end = to_utc_from_local(
    tz,
    next_first.and_time(
      chrono::NaiveTime::MIN
    ),
    "month end"
  )?;
  Ok((start, end))
}

fn resolve_clinic_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_CLINIC_TIMEZONE,
    "DEFAULT_CLINIC_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  timezone_from_toml(
    &raw,
    &format!("file:{}", path.display())
  )
}

fn timezone_from_toml(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let parsed = match toml::from_str::<
    TimezoneConfig
  >(raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        source,
        error = %err,
        "failed parsing timezone config"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      source,
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(timezone.as_str(), source)
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured clinic timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn to_utc_from_local(
  tz: &Tz,
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz.from_local_datetime(
    &local_naive
  ) {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in clinic timezone: \
         {context}"
      ))
    }
  }
}

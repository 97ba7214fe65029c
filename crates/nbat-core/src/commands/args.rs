use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  NaiveDate
};
use tracing::{
  instrument,
  warn
};
use uuid::Uuid;

use crate::booking::PatientInfo;
use crate::calendar::{
  JalaliDate,
  normalize_digits
};

/// Splits `key:value` modifiers from plain words. A plain word directly
/// after a modifier continues that modifier's value, so
/// `notes:first visit` keeps both words. Words before the first modifier
/// are returned as positionals.
#[instrument(skip(args))]
pub(crate) fn split_modifiers(
  args: &[String],
  known_keys: &[&str]
) -> (Vec<String>, Vec<(String, String)>) {
  let mut positionals = Vec::new();
  let mut mods: Vec<(String, String)> =
    Vec::new();

  for arg in args {
    if let Some((key, value)) =
      arg.split_once(':')
    {
      let key = key.to_ascii_lowercase();
      if known_keys.contains(&key.as_str())
      {
        mods.push((key, value.to_string()));
        continue;
      }
    }

    match mods.last_mut() {
      | Some((_, value)) => {
        if !value.is_empty() {
          value.push(' ');
        }
        value.push_str(arg);
      }
      | None => {
        positionals.push(arg.clone())
      }
    }
  }

  (positionals, mods)
}

pub(crate) const PATIENT_KEYS: [&str; 8] = [
  "first",
  "last",
  "gender",
  "service",
  "insurance",
  "age",
  "phone",
  "notes"
];

/// Builds the patient record from `book` modifiers. Field-level checks
/// happen in `PatientInfo::validate`.
pub(crate) fn patient_from_mods(
  mods: &[(String, String)]
) -> anyhow::Result<PatientInfo> {
  let mut patient = PatientInfo::default();
  for (key, value) in mods {
    match key.as_str() {
      | "first" => {
        patient.first_name = value.clone()
      }
      | "last" => {
        patient.last_name = value.clone()
      }
      | "gender" => {
        patient.gender = value.clone()
      }
      | "service" => {
        patient.service = value.clone()
      }
      | "insurance" => {
        patient.insurance =
          Some(value.clone())
      }
      | "notes" => {
        patient.notes = Some(value.clone())
      }
      | "phone" => {
        patient.phone = value.clone()
      }
      | "age" => {
        patient.age =
          normalize_digits(value)
            .trim()
            .parse()
            .with_context(|| {
              format!(
                "invalid age {value:?}: \
                 expected a whole number"
              )
            })?;
      }
      | other => {
        warn!(key = %other, "unrecognized patient field ignored");
      }
    }
  }
  Ok(patient)
}

/// Resolves a full UUID or any unique prefix of its hex digits (dashes
/// optional) against `ids`.
pub(crate) fn resolve_id(
  token: &str,
  ids: impl IntoIterator<Item = Uuid>,
  what: &str
) -> anyhow::Result<Uuid> {
  if let Ok(id) = Uuid::parse_str(token) {
    return Ok(id);
  }

  let needle: String = token
    .chars()
    .filter(|ch| *ch != '-')
    .collect::<String>()
    .to_ascii_lowercase();
  if needle.is_empty()
    || !needle
      .chars()
      .all(|ch| ch.is_ascii_hexdigit())
  {
    return Err(anyhow!(
      "invalid {what} id: {token}"
    ));
  }

  let mut matches = ids.into_iter().filter(
    |id| {
      id.simple()
        .to_string()
        .starts_with(&needle)
    }
  );
  let first =
    matches.next().ok_or_else(|| {
      anyhow!("no {what} matches id {token}")
    })?;
  if matches.next().is_some() {
    return Err(anyhow!(
      "{what} id prefix {token} is \
       ambiguous"
    ));
  }
  Ok(first)
}

fn checked_month(
  year: i32,
  month: u32
) -> Option<(i32, u32)> {
  NaiveDate::from_ymd_opt(year, month, 1)
    .map(|_| (year, month))
}

/// `YYYY-MM` names a Gregorian month; `+N`/`-N` shift from `today`.
pub(crate) fn parse_month_arg(
  token: &str,
  today: NaiveDate
) -> anyhow::Result<(i32, u32)> {
  let token = normalize_digits(token);
  let token = token.trim();

  if token.starts_with('+')
    || token.starts_with('-')
  {
    let delta: i32 =
      token.parse().with_context(|| {
        format!(
          "invalid month offset {token:?}"
        )
      })?;
    let index = i64::from(today.year()) * 12
      + i64::from(today.month0())
      + i64::from(delta);
    let year = i32::try_from(
      index.div_euclid(12)
    )
    .map_err(|_| {
      anyhow!(
        "month offset out of range: {token}"
      )
    })?;
    let month =
      index.rem_euclid(12) as u32 + 1;
    return checked_month(year, month)
      .ok_or_else(|| {
        anyhow!(
          "month offset out of range: {token}"
        )
      });
  }

  let (year, month) =
    token.split_once('-').ok_or_else(
      || {
        anyhow!(
          "invalid month {token:?}; \
           expected YYYY-MM, +N or -N"
        )
      }
    )?;
  let year: i32 =
    year.parse().with_context(|| {
      format!("invalid year in {token:?}")
    })?;
  let month: u32 =
    month.parse().with_context(|| {
      format!(
        "invalid month in {token:?}"
      )
    })?;
  if !(1..=12).contains(&month) {
    return Err(anyhow!(
      "month out of range (1-12): \
       {month}"
    ));
  }
  checked_month(year, month).ok_or_else(
    || anyhow!("year out of range: {year}")
  )
}

/// A Gregorian `YYYY-MM-DD` or Jalali `YYYY/MM/DD` date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateArg {
  Gregorian(NaiveDate),
  Jalali(JalaliDate)
}

pub(crate) fn parse_date_arg(
  token: &str
) -> anyhow::Result<DateArg> {
  let normalized =
    normalize_digits(token);
  let trimmed = normalized.trim();
  if trimmed.contains('-') {
    let date = NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
    .with_context(|| {
      format!(
        "invalid Gregorian date \
         {token:?}; expected YYYY-MM-DD"
      )
    })?;
    return Ok(DateArg::Gregorian(date));
  }
  Ok(DateArg::Jalali(
    trimmed.parse::<JalaliDate>()?
  ))
}

pub(crate) fn require_jalali(
  args: &[String],
  command: &str
) -> anyhow::Result<JalaliDate> {
  let raw = args.first().ok_or_else(
    || {
      anyhow!(
        "{command}: a date is required \
         (YYYY/MM/DD)"
      )
    }
  )?;
  Ok(raw.parse::<JalaliDate>()?)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn words(
    args: &[&str]
  ) -> Vec<String> {
    args
      .iter()
      .map(|s| s.to_string())
      .collect()
  }

  #[test]
  fn modifiers_absorb_following_words()
   {
    let (pos, mods) = split_modifiers(
      &words(&[
        "1404/06/10",
        "09:00",
        "first:Sara",
        "notes:first",
        "visit"
      ]),
      &PATIENT_KEYS
    );
    // 09:00 splits on ':' but "09" is not a known key.
    assert_eq!(
      pos,
      words(&["1404/06/10", "09:00"])
    );
    assert_eq!(
      mods,
      vec![
        (
          "first".to_string(),
          "Sara".to_string()
        ),
        (
          "notes".to_string(),
          "first visit".to_string()
        )
      ]
    );
  }

  #[test]
  fn patient_fields_fill_from_mods() {
    let (_, mods) = split_modifiers(
      &words(&[
        "first:Sara",
        "last:Ahmadi",
        "gender:female",
        "service:checkup",
        "age:۳۴",
        "phone:09123456789"
      ]),
      &PATIENT_KEYS
    );
    let patient =
      patient_from_mods(&mods)
        .expect("patient");
    assert_eq!(patient.age, 34);
    assert_eq!(
      patient.full_name(),
      "Sara Ahmadi"
    );
    assert!(patient.validate().is_ok());

    assert!(
      patient_from_mods(&[(
        "age".to_string(),
        "old".to_string()
      )])
      .is_err()
    );
  }

  #[test]
  fn id_prefixes_resolve_uniquely() {
    let a = Uuid::parse_str(
      "0f8fad5b-d9cb-469f-a165-70867728950e"
    )
    .expect("uuid");
    let b = Uuid::parse_str(
      "0f8f1111-d9cb-469f-a165-70867728950e"
    )
    .expect("uuid");

    assert_eq!(
      resolve_id("0f8fa", [a, b], "slot")
        .expect("unique"),
      a
    );
    assert!(
      resolve_id("0f8f", [a, b], "slot")
        .is_err()
    );
    assert!(
      resolve_id("zz", [a, b], "slot")
        .is_err()
    );
    assert!(
      resolve_id("1234", [a, b], "slot")
        .is_err()
    );
  }

  #[test]
  fn month_args_absolute_and_relative() {
    let today =
      NaiveDate::from_ymd_opt(2025, 1, 15)
        .expect("date");
    assert_eq!(
      parse_month_arg("-1", today)
        .expect("prev"),
      (2024, 12)
    );
    assert_eq!(
      parse_month_arg("+12", today)
        .expect("next"),
      (2026, 1)
    );
    assert_eq!(
      parse_month_arg("2025-09", today)
        .expect("abs"),
      (2025, 9)
    );
    assert!(
      parse_month_arg("2025-13", today)
        .is_err()
    );
  }

  #[test]
  fn month_offsets_beyond_calendar_fail() {
    let today =
      NaiveDate::from_ymd_opt(2025, 9, 1)
        .expect("date");
    for token in [
      "+2147483647",
      "-2147483648",
      "+4000000",
      "999999-01"
    ] {
      assert!(
        parse_month_arg(token, today)
          .is_err(),
        "{token}"
      );
    }
  }

  #[test]
  fn date_args_pick_calendar_by_separator()
   {
    assert_eq!(
      parse_date_arg("2024-03-20")
        .expect("greg"),
      DateArg::Gregorian(
        NaiveDate::from_ymd_opt(
          2024, 3, 20
        )
        .expect("date")
      )
    );
    assert_eq!(
      parse_date_arg("۱۴۰۳/۰۱/۰۱")
        .expect("jalali"),
      DateArg::Jalali(JalaliDate::new(
        1403, 1, 1
      ))
    );
    assert!(
      parse_date_arg("2024/13/01").is_err()
    );
  }
}

//! Gregorian <-> Jalali (Persian solar) civil calendar arithmetic.
//!
//! Conversions count days from a fixed epoch and peel the count apart into
//! 33-year grand cycles, 4-year cycles and remainder years/months. Two
//! epochs are used: one anchored at 1600 CE / 979 AP for modern dates and
//! one exactly 400 Gregorian years (146097 days) earlier for older dates.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ScheduleError, ScheduleResult};

const GREGORIAN_DAYS_BEFORE_MONTH: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

const DAYS_PER_GRAND_CYCLE: i64 = 12053;
const DAYS_PER_FOUR_YEARS: i64 = 1461;
const DAYS_PER_400_GREGORIAN_YEARS: i64 = 146097;
const DAYS_PER_100_GREGORIAN_YEARS: i64 = 36524;

const MODERN_GREGORIAN_EPOCH: i64 = 1600;
const MODERN_JALALI_EPOCH: i64 = 979;
const EARLY_GREGORIAN_EPOCH: i64 = 1200;
const EARLY_JALALI_EPOCH: i64 = 579;

const PERSIAN_MONTHS: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

/// A Jalali civil date. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JalaliDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl JalaliDate {
    pub const fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    pub fn from_gregorian(date: NaiveDate) -> Self {
        gregorian_to_jalali(date.year(), date.month(), date.day())
    }

    /// `None` when the date does not land on a real Gregorian day, which
    /// can only happen for inputs outside the Jalali month lengths.
    pub fn to_gregorian(&self) -> Option<NaiveDate> {
        let (year, month, day) = jalali_to_gregorian(*self);
        NaiveDate::from_ymd_opt(year, month, day)
    }

    pub fn month_name(&self) -> &'static str {
        persian_month_name(self.month)
    }
}

impl fmt::Display for JalaliDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_jalali_date(self.year, self.month, self.day))
    }
}

impl FromStr for JalaliDate {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_and_validate_jalali_date(s)
    }
}

impl Serialize for JalaliDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JalaliDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub fn gregorian_to_jalali(year: i32, month: u32, day: u32) -> JalaliDate {
    let (gy, mut jy) = if i64::from(year) <= MODERN_GREGORIAN_EPOCH {
        (i64::from(year) - EARLY_GREGORIAN_EPOCH, EARLY_JALALI_EPOCH)
    } else {
        (i64::from(year) - MODERN_GREGORIAN_EPOCH, MODERN_JALALI_EPOCH)
    };
    let month_index = (month.clamp(1, 12) - 1) as usize;
    let gy2 = if month > 2 { gy + 1 } else { gy };

    let mut days = 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400 - 80
        + i64::from(day)
        + GREGORIAN_DAYS_BEFORE_MONTH[month_index];

    jy += 33 * (days / DAYS_PER_GRAND_CYCLE);
    days %= DAYS_PER_GRAND_CYCLE;
    jy += 4 * (days / DAYS_PER_FOUR_YEARS);
    days %= DAYS_PER_FOUR_YEARS;
    jy += (days - 1) / 365;
    if days > 365 {
        days = (days - 1) % 365;
    }

    let (jm, jd) = if days < 186 {
        (1 + days / 31, 1 + days % 31)
    } else {
        (7 + (days - 186) / 30, 1 + (days - 186) % 30)
    };

    JalaliDate::new(jy as i32, jm as u32, jd as u32)
}

pub fn jalali_to_gregorian(date: JalaliDate) -> (i32, u32, u32) {
    let (mut gy, jy) = if i64::from(date.year) <= MODERN_JALALI_EPOCH {
        (EARLY_GREGORIAN_EPOCH, i64::from(date.year) - EARLY_JALALI_EPOCH)
    } else {
        (MODERN_GREGORIAN_EPOCH, i64::from(date.year) - MODERN_JALALI_EPOCH)
    };
    let jm = i64::from(date.month);
    let month_offset = if jm < 7 { (jm - 1) * 31 } else { (jm - 7) * 30 + 186 };

    let mut days = 365 * jy + (jy / 33) * 8 + ((jy % 33) + 3) / 4 + 78 + i64::from(date.day) + month_offset;

    gy += 400 * (days / DAYS_PER_400_GREGORIAN_YEARS);
    days %= DAYS_PER_400_GREGORIAN_YEARS;
    if days > DAYS_PER_100_GREGORIAN_YEARS {
        days -= 1;
        gy += 100 * (days / DAYS_PER_100_GREGORIAN_YEARS);
        days %= DAYS_PER_100_GREGORIAN_YEARS;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / DAYS_PER_FOUR_YEARS);
    days %= DAYS_PER_FOUR_YEARS;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let mut gd = days + 1;
    let february = if is_gregorian_leap_year(gy) { 29 } else { 28 };
    let month_lengths = [0, 31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut gm = 0;
    while gm < 13 && gd > month_lengths[gm] {
        gd -= month_lengths[gm];
        gm += 1;
    }

    (gy as i32, gm as u32, gd as u32)
}

fn is_gregorian_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Canonical `YYYY/MM/DD` form.
pub fn format_jalali_date(year: i32, month: u32, day: u32) -> String {
    format!("{year:04}/{month:02}/{day:02}")
}

/// Maps Persian (U+06F0..U+06F9) and Arabic-indic (U+0660..U+0669) digits
/// to ASCII. Everything else passes through.
pub fn normalize_digits(input: &str) -> String {
    input
        .chars()
        .map(|ch| match ch {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (ch as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (ch as u32 - 0x0660) as u8),
            other => other,
        })
        .collect()
}

fn jalali_date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(?P<year>(?:13|14)[0-9]{2})/(?P<month>0[1-9]|1[0-2])/(?P<day>0[1-9]|[12][0-9]|3[01])$",
            )
            .ok()
        })
        .as_ref()
}

fn time_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(?P<hour>[01][0-9]|2[0-3]):(?P<minute>[0-5][0-9])$").ok())
        .as_ref()
}

/// Accepts `13xx`/`14xx` years with any day 01..31 in any month; day 31 of
/// a 30-day month passes.
pub fn parse_and_validate_jalali_date(input: &str) -> ScheduleResult<JalaliDate> {
    let normalized = normalize_digits(input);
    let trimmed = normalized.trim();
    let invalid = || ScheduleError::InvalidDateFormat(input.to_string());

    let captures = jalali_date_pattern()
        .and_then(|re| re.captures(trimmed))
        .ok_or_else(invalid)?;
    let field = |name: &str| captures.name(name).map(|m| m.as_str());

    let year = field("year").and_then(|v| v.parse::<i32>().ok()).ok_or_else(invalid)?;
    let month = field("month").and_then(|v| v.parse::<u32>().ok()).ok_or_else(invalid)?;
    let day = field("day").and_then(|v| v.parse::<u32>().ok()).ok_or_else(invalid)?;

    Ok(JalaliDate::new(year, month, day))
}

pub fn is_valid_time_hhmm(input: &str) -> bool {
    parse_time_hhmm(input).is_some()
}

pub(crate) fn parse_time_hhmm(input: &str) -> Option<(u8, u8)> {
    let normalized = normalize_digits(input);
    let captures = time_pattern()?.captures(normalized.trim())?;
    let hour = captures.name("hour")?.as_str().parse().ok()?;
    let minute = captures.name("minute")?.as_str().parse().ok()?;
    Some((hour, minute))
}

pub fn persian_month_name(month: u32) -> &'static str {
    PERSIAN_MONTHS[(month.clamp(1, 12) - 1) as usize]
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn nowruz_1403_both_directions() {
        assert_eq!(gregorian_to_jalali(2024, 3, 20), JalaliDate::new(1403, 1, 1));
        assert_eq!(jalali_to_gregorian(JalaliDate::new(1403, 1, 1)), (2024, 3, 20));
    }

    #[test]
    fn known_dates_convert() {
        assert_eq!(gregorian_to_jalali(2025, 3, 21), JalaliDate::new(1404, 1, 1));
        assert_eq!(gregorian_to_jalali(2025, 3, 20), JalaliDate::new(1403, 12, 30));
        assert_eq!(gregorian_to_jalali(2024, 3, 19), JalaliDate::new(1402, 12, 29));
        assert_eq!(gregorian_to_jalali(2025, 8, 31), JalaliDate::new(1404, 6, 9));
        assert_eq!(jalali_to_gregorian(JalaliDate::new(1404, 6, 10)), (2025, 9, 1));
    }

    #[test]
    fn round_trip_holds_from_1500_through_2100() {
        let mut day = ymd(1500, 1, 1);
        let last = ymd(2100, 12, 31);
        while day <= last {
            let jalali = JalaliDate::from_gregorian(day);
            assert_eq!(jalali.to_gregorian(), Some(day), "round trip failed for {day} via {jalali}");
            day += Duration::days(1);
        }
    }

    #[test]
    fn epoch_boundary_is_continuous() {
        // 1600-03-01 sits in the early branch and used to come back as Feb 29.
        let march_first = ymd(1600, 3, 1);
        assert_eq!(JalaliDate::from_gregorian(march_first).to_gregorian(), Some(march_first));

        let end_of_1600 = JalaliDate::from_gregorian(ymd(1600, 12, 31));
        let start_of_1601 = JalaliDate::from_gregorian(ymd(1601, 1, 1));
        assert_eq!(end_of_1600, JalaliDate::new(979, 10, 11));
        assert_eq!(start_of_1601, JalaliDate::new(979, 10, 12));
    }

    #[test]
    fn format_is_fixed_width() {
        assert_eq!(format_jalali_date(1404, 6, 1), "1404/06/01");
        assert_eq!(format_jalali_date(879, 12, 9), "0879/12/09");
        assert_eq!(JalaliDate::new(1403, 11, 30).to_string(), "1403/11/30");
    }

    #[test]
    fn parses_ascii_and_persian_digits() {
        assert_eq!(
            parse_and_validate_jalali_date("1404/06/10").expect("ascii"),
            JalaliDate::new(1404, 6, 10)
        );
        assert_eq!(
            parse_and_validate_jalali_date(" ۱۴۰۴/۰۶/۱۰ ").expect("persian"),
            JalaliDate::new(1404, 6, 10)
        );
        assert_eq!(
            parse_and_validate_jalali_date("١٤٠٤/٠٦/١٠").expect("arabic-indic"),
            JalaliDate::new(1404, 6, 10)
        );
    }

    #[test]
    fn rejects_malformed_dates() {
        for bad in ["1404-06-10", "1204/06/10", "1404/13/01", "1404/00/10", "1404/06/32", "1404/6/10", "", "1404/06/1"] {
            assert!(
                matches!(parse_and_validate_jalali_date(bad), Err(ScheduleError::InvalidDateFormat(_))),
                "{bad:?} should be rejected"
            );
        }
        // Devanagari digits are still digits to Unicode-aware classes.
        assert!(parse_and_validate_jalali_date("१४०४/०६/१०").is_err());
    }

    #[test]
    fn day_31_is_accepted_in_any_month() {
        assert_eq!(
            parse_and_validate_jalali_date("1404/07/31").expect("permissive day"),
            JalaliDate::new(1404, 7, 31)
        );
        assert!(parse_and_validate_jalali_date("1404/12/31").is_ok());
    }

    #[test]
    fn validates_times() {
        assert!(is_valid_time_hhmm("09:00"));
        assert!(is_valid_time_hhmm("23:59"));
        assert!(is_valid_time_hhmm("۰۹:۳۰"));
        assert!(!is_valid_time_hhmm("24:00"));
        assert!(!is_valid_time_hhmm("9:00"));
        assert!(!is_valid_time_hhmm("09:60"));
        assert!(!is_valid_time_hhmm("09:00:00"));
    }

    #[test]
    fn month_names_follow_the_solar_year() {
        assert_eq!(persian_month_name(1), "فروردین");
        assert_eq!(persian_month_name(12), "اسفند");
        assert_eq!(JalaliDate::new(1404, 6, 10).month_name(), "شهریور");
    }
}

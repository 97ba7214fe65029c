use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, SecondsFormat};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::calendar::JalaliDate;
use crate::config::{ClinicSettings, HolidayFeedSettings};
use crate::timezone::{clinic_timezone, month_bounds};

/// A non-working day annotation. Display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holiday {
    pub date: NaiveDate,
    pub summary: String,
}

/// Source of holidays for a Gregorian month. Implementations swallow
/// their own failures and return what they have, possibly nothing.
pub trait HolidayFeed {
    fn holidays(&self, year: i32, month: u32) -> Vec<Holiday>;
}

/// Static Jalali dates from `calendar.holidays`.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredHolidays {
    dates: Vec<JalaliDate>,
}

impl ConfiguredHolidays {
    pub fn new(dates: Vec<JalaliDate>) -> Self {
        Self { dates }
    }
}

impl HolidayFeed for ConfiguredHolidays {
    fn holidays(&self, year: i32, month: u32) -> Vec<Holiday> {
        self.dates
            .iter()
            .filter_map(|date| date.to_gregorian())
            .filter(|date| date.year() == year && date.month() == month)
            .map(|date| Holiday {
                date,
                summary: "holiday".to_string(),
            })
            .collect()
    }
}

/// Events endpoint in the Google Calendar v3 shape.
#[derive(Debug, Clone)]
pub struct GoogleCalendarFeed {
    settings: HolidayFeedSettings,
    tz: Tz,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start: Option<EventStart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventStart {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    date_time: Option<DateTime<FixedOffset>>,
}

impl GoogleCalendarFeed {
    pub fn new(settings: HolidayFeedSettings, tz: Tz) -> Self {
        Self { settings, tz }
    }

    fn request_url(&self, year: i32, month: u32) -> anyhow::Result<reqwest::Url> {
        let (start, end) = month_bounds(&self.tz, year, month)?;
        let time_min = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        reqwest::Url::parse_with_params(
            &self.settings.api_url,
            &[
                ("key", self.settings.api_key.as_str()),
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ],
        )
        .with_context(|| format!("invalid holiday.api_url {:?}", self.settings.api_url))
    }

    fn fetch(&self, year: i32, month: u32) -> anyhow::Result<Vec<Holiday>> {
        let url = self.request_url(year, month)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(self.settings.timeout)
            .build()
            .context("failed building HTTP client for holiday feed")?;

        let response = client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .context("failed requesting holiday feed")?;
        let status = response.status();
        let body = response
            .text()
            .context("failed reading holiday feed response body")?;
        if !status.is_success() {
            anyhow::bail!("holiday feed returned HTTP {status}");
        }

        parse_holiday_events(&body, &self.tz)
    }
}

impl HolidayFeed for GoogleCalendarFeed {
    #[tracing::instrument(skip(self))]
    fn holidays(&self, year: i32, month: u32) -> Vec<Holiday> {
        match self.fetch(year, month) {
            Ok(holidays) => {
                info!(count = holidays.len(), "fetched holidays");
                holidays
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "holiday feed unavailable; continuing without it");
                Vec::new()
            }
        }
    }
}

/// Events without a usable start are dropped.
pub fn parse_holiday_events(body: &str, tz: &Tz) -> anyhow::Result<Vec<Holiday>> {
    let parsed: EventsResponse =
        serde_json::from_str(body).context("holiday feed response is not valid JSON")?;

    let holidays = parsed
        .items
        .into_iter()
        .filter_map(|item| {
            let start = item.start?;
            let date = start
                .date
                .or_else(|| start.date_time.map(|dt| dt.with_timezone(tz).date_naive()))?;
            Some(Holiday {
                date,
                summary: item.summary.unwrap_or_default(),
            })
        })
        .collect::<Vec<_>>();
    debug!(count = holidays.len(), "parsed holiday events");
    Ok(holidays)
}

/// Merges several feeds; the first feed to name a date wins.
#[derive(Default)]
pub struct CombinedFeed {
    feeds: Vec<Box<dyn HolidayFeed>>,
}

impl CombinedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, feed: impl HolidayFeed + 'static) -> Self {
        self.feeds.push(Box::new(feed));
        self
    }

    pub fn from_settings(settings: &ClinicSettings) -> Self {
        let mut combined = Self::new().with(ConfiguredHolidays::new(settings.holidays.clone()));
        if let Some(feed) = &settings.holiday_feed {
            combined = combined.with(GoogleCalendarFeed::new(feed.clone(), *clinic_timezone()));
        }
        combined
    }
}

impl HolidayFeed for CombinedFeed {
    fn holidays(&self, year: i32, month: u32) -> Vec<Holiday> {
        let mut by_date: BTreeMap<NaiveDate, Holiday> = BTreeMap::new();
        for feed in &self.feeds {
            for holiday in feed.holidays(year, month) {
                by_date.entry(holiday.date).or_insert(holiday);
            }
        }
        by_date.into_values().collect()
    }
}

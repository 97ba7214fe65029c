use std::path::PathBuf;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::args::{DateArg, parse_date_arg, parse_month_arg, require_jalali};
use crate::booking::Booking;
use crate::calendar::JalaliDate;
use crate::config::ClinicSettings;
use crate::export::{DEFAULT_EXPORT_FILE, ExportDocument};
use crate::holidays::{CombinedFeed, HolidayFeed};
use crate::render::Renderer;
use crate::slot::Slot;
use crate::store::{Collection, KeyValueStore, read_collection};
use crate::timezone::clinic_today;
use crate::view::{CalendarViewState, ViewContext, derive_day_times, derive_month_view, month_title};

fn view_context(settings: &ClinicSettings, now: DateTime<Utc>) -> ViewContext {
    ViewContext {
        today: clinic_today(now),
        now,
        recent_window: settings.recent_window,
        working_days: settings.working_days.clone(),
    }
}

#[instrument(skip(store, settings, renderer, args, now))]
pub(super) fn cmd_calendar<S: KeyValueStore + ?Sized>(
    store: &mut S,
    settings: &ClinicSettings,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let ctx = view_context(settings, now);

    let mut month = None;
    let mut selected: Option<JalaliDate> = None;
    for arg in args {
        if let Some(raw) = arg.strip_prefix("select:") {
            selected = Some(raw.parse()?);
        } else {
            month = Some(parse_month_arg(arg, ctx.today)?);
        }
    }

    let state = match (month, selected) {
        (Some((year, month)), _) => {
            CalendarViewState::for_month(year, month).ok_or_else(|| anyhow!("invalid month {year}-{month:02}"))?
        }
        (None, Some(date)) => CalendarViewState::containing(
            date.to_gregorian()
                .ok_or_else(|| anyhow!("{date} is not a real calendar day"))?,
        ),
        (None, None) => CalendarViewState::containing(ctx.today),
    };
    let state = match selected {
        Some(date) => state.select_date(date),
        None => state,
    };
    debug!(year = state.year(), month = state.month(), ?selected, "rendering calendar");

    let slots: Vec<Slot> = read_collection(&*store, Collection::Slots);
    let bookings: Vec<Booking> = read_collection(&*store, Collection::Bookings);
    let holidays = CombinedFeed::from_settings(settings).holidays(state.year(), state.month());

    let cells = derive_month_view(&state, &slots, &bookings, &holidays, &ctx);
    let title = month_title(state.year(), state.month()).unwrap_or_default();
    renderer.print_month(&title, &cells)?;

    if let Some(date) = state.selected_date {
        println!();
        let times = derive_day_times(&state, date, &settings.time_grid(), &slots, &bookings, &ctx);
        renderer.print_day_times(date, &times)?;
    }
    Ok(())
}

#[instrument(skip(store, settings, renderer, args, now))]
pub(super) fn cmd_times<S: KeyValueStore + ?Sized>(
    store: &mut S,
    settings: &ClinicSettings,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let date = require_jalali(args, "times")?;
    let ctx = view_context(settings, now);
    let state = CalendarViewState::containing(ctx.today).select_date(date);

    let slots: Vec<Slot> = read_collection(&*store, Collection::Slots);
    let bookings: Vec<Booking> = read_collection(&*store, Collection::Bookings);
    let times = derive_day_times(&state, date, &settings.time_grid(), &slots, &bookings, &ctx);
    renderer.print_day_times(date, &times)
}

pub(super) fn cmd_convert(renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    let raw = args
        .first()
        .ok_or_else(|| anyhow!("convert: a date is required (YYYY-MM-DD or YYYY/MM/DD)"))?;

    match parse_date_arg(raw)? {
        DateArg::Gregorian(date) => renderer.print_conversion(date, JalaliDate::from_gregorian(date)),
        DateArg::Jalali(date) => {
            let gregorian = date
                .to_gregorian()
                .ok_or_else(|| anyhow!("{date} has no Gregorian equivalent"))?;
            renderer.print_conversion(gregorian, date)
        }
    }
}

#[instrument(skip(settings, renderer, args, now))]
pub(super) fn cmd_holidays(
    settings: &ClinicSettings,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let today = clinic_today(now);
    let (year, month) = match args.first() {
        Some(arg) => parse_month_arg(arg, today)?,
        None => parse_month_arg("+0", today)?,
    };

    let holidays = CombinedFeed::from_settings(settings).holidays(year, month);
    if holidays.is_empty() {
        println!("No holidays known for {year}-{month:02}.");
        return Ok(());
    }
    renderer.print_holidays(&holidays)
}

/// `-` writes to stdout; no argument writes the default file in the
/// working directory.
#[instrument(skip(store, args, now))]
pub(super) fn cmd_export<S: KeyValueStore + ?Sized>(
    store: &mut S,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let doc = ExportDocument::snapshot(&*store, now);

    match args.first().map(String::as_str) {
        Some("-") => {
            println!("{}", doc.to_pretty_json()?);
        }
        target => {
            let path = PathBuf::from(target.unwrap_or(DEFAULT_EXPORT_FILE));
            doc.write_to(&path)?;
            println!("Exported data to {}.", path.display());
        }
    }
    Ok(())
}

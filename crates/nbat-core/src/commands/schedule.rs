use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::args::{PATIENT_KEYS, patient_from_mods, require_jalali, resolve_id, split_modifiers};
use crate::booking::{Booking, BookingFilter, BookingStore};
use crate::calendar::JalaliDate;
use crate::config::ClinicSettings;
use crate::render::{Renderer, short_id};
use crate::slot::{SlotStore, SlotTime};
use crate::store::KeyValueStore;

#[instrument(skip(store, renderer, args))]
pub(super) fn cmd_slots<S: KeyValueStore + ?Sized>(
    store: &mut S,
    renderer: &mut Renderer,
    args: &[String],
    available_only: bool,
) -> anyhow::Result<()> {
    let date = require_jalali(args, if available_only { "available" } else { "slots" })?;
    let slots = SlotStore::new(store);
    let listed = if available_only {
        slots.list_available_for_date(date)
    } else {
        slots.list_for_date(date)
    };

    if listed.is_empty() {
        println!("No {} slots on {date}.", if available_only { "free" } else { "defined" });
        return Ok(());
    }
    renderer.print_slot_table(&listed)
}

#[instrument(skip(store, settings, args))]
pub(super) fn cmd_open<S: KeyValueStore + ?Sized>(
    store: &mut S,
    settings: &ClinicSettings,
    args: &[String],
) -> anyhow::Result<()> {
    let date = require_jalali(args, "open")?;

    let mut times: Vec<SlotTime> = Vec::new();
    for token in &args[1..] {
        if token.eq_ignore_ascii_case("hours") {
            times.extend(settings.time_grid());
        } else {
            times.push(token.parse()?);
        }
    }
    if times.is_empty() {
        return Err(anyhow!("open: at least one HH:MM time (or `hours`) is required"));
    }

    let requested = times.len();
    let created = SlotStore::new(store).create_slots(date, times)?;
    info!(%date, created, requested, "command open");
    if created < requested {
        println!(
            "Created {created} slot(s) on {date}; {} already existed.",
            requested - created
        );
    } else {
        println!("Created {created} slot(s) on {date}.");
    }
    Ok(())
}

#[instrument(skip(store, args))]
pub(super) fn cmd_close<S: KeyValueStore + ?Sized>(store: &mut S, args: &[String]) -> anyhow::Result<()> {
    let mut slots = SlotStore::new(store);
    let token = args.first().ok_or_else(|| anyhow!("close: slot id is required"))?;
    let id = resolve_id(token, slots.all().into_iter().map(|slot| slot.id), "slot")?;

    let removed = slots.delete_slot(id)?;
    println!("Deleted slot {} {}.", removed.date, removed.time);
    Ok(())
}

#[instrument(skip(store, args))]
pub(super) fn cmd_unbook<S: KeyValueStore + ?Sized>(store: &mut S, args: &[String]) -> anyhow::Result<()> {
    let token = args.first().ok_or_else(|| anyhow!("unbook: slot id is required"))?;
    let slot = {
        let slots = SlotStore::new(&mut *store);
        let id = resolve_id(token, slots.all().into_iter().map(|slot| slot.id), "slot")?;
        slots.get(id).ok_or_else(|| anyhow!("slot not found: {id}"))?
    };

    match BookingStore::new(store).cancel_by_slot(slot.id)? {
        Some(booking) => println!(
            "Cancelled booking of {} on {} {}.",
            booking.patient.full_name(),
            slot.date,
            slot.time
        ),
        None => println!("Slot {} {} is free.", slot.date, slot.time),
    }
    Ok(())
}

#[instrument(skip(store, renderer, args, now))]
pub(super) fn cmd_book<S: KeyValueStore + ?Sized>(
    store: &mut S,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let (target, mods) = split_modifiers(args, &PATIENT_KEYS);
    let patient = patient_from_mods(&mods)?;
    let booking = match target.as_slice() {
        [date, time] => {
            let date: JalaliDate = date.parse()?;
            let time: SlotTime = time.parse()?;
            BookingStore::new(store).reserve_at(date, time, patient, now)?
        }
        [slot] => {
            let known = SlotStore::new(&mut *store).all();
            let id = resolve_id(slot, known.iter().map(|slot| slot.id), "slot")?;
            BookingStore::new(store).reserve(id, patient, now)?
        }
        _ => {
            return Err(anyhow!(
                "book: expected a slot id or DATE HH:MM before the patient fields"
            ));
        }
    };

    println!(
        "Booked {} on {} {} (booking {}).",
        booking.patient.full_name(),
        booking.date,
        booking.time,
        short_id(booking.id)
    );
    renderer.print_booking_info(&booking)
}

#[instrument(skip(store, args))]
pub(super) fn cmd_cancel<S: KeyValueStore + ?Sized>(store: &mut S, args: &[String]) -> anyhow::Result<()> {
    let token = args.first().ok_or_else(|| anyhow!("cancel: booking id is required"))?;
    let mut bookings = BookingStore::new(store);
    let id = resolve_id(token, bookings.all().into_iter().map(|b| b.id), "booking")?;

    let cancelled: Booking = bookings.cancel(id)?;
    println!(
        "Cancelled booking of {} on {} {}.",
        cancelled.patient.full_name(),
        cancelled.date,
        cancelled.time
    );
    Ok(())
}

#[instrument(skip(store, settings, renderer, args, now))]
pub(super) fn cmd_bookings<S: KeyValueStore + ?Sized>(
    store: &mut S,
    settings: &ClinicSettings,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut filter = BookingFilter::default();
    let mut words = Vec::new();
    for arg in args {
        match arg.strip_prefix("date:") {
            Some(raw) => filter.date = Some(raw.parse()?),
            None => words.push(arg.as_str()),
        }
    }
    if !words.is_empty() {
        filter.query = Some(words.join(" "));
    }

    let listed = BookingStore::new(store).list_bookings(&filter);
    if listed.is_empty() {
        println!("No bookings.");
        return Ok(());
    }
    renderer.print_booking_table(&listed, now, settings.recent_window)
}

#[instrument(skip(store, renderer))]
pub(super) fn cmd_check<S: KeyValueStore + ?Sized>(store: &mut S, renderer: &mut Renderer) -> anyhow::Result<()> {
    let problems = BookingStore::new(store).audit();
    renderer.print_audit(&problems)?;
    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} inconsistencies found", problems.len()))
    }
}

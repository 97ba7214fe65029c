use std::ffi::OsString;

use nbat_core::booking::BookingStore;
use nbat_core::calendar::JalaliDate;
use nbat_core::cli::Invocation;
use nbat_core::commands::dispatch;
use nbat_core::config::Config;
use nbat_core::render::{Renderer, short_id};
use nbat_core::slot::SlotStore;
use nbat_core::store::MemoryStore;

fn run(store: &mut MemoryStore, cfg: &Config, words: &[&str]) -> anyhow::Result<()> {
    let mut renderer = Renderer::new(cfg)?;
    let inv = Invocation::parse(cfg, words.iter().map(|word| OsString::from(*word)).collect())?;
    dispatch(store, cfg, &mut renderer, inv)
}

#[test]
fn open_book_unbook_close_through_commands() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides([("rc.color".to_string(), "off".to_string())]);
    let mut store = MemoryStore::new();
    let date = JalaliDate::new(1404, 6, 10);

    run(&mut store, &cfg, &["open", "1404/06/10", "hours"]).expect("open");
    assert_eq!(SlotStore::new(&mut store).list_for_date(date).len(), 24);

    run(
        &mut store,
        &cfg,
        &[
            "book", "1404/06/10", "09:00", "first:Sara", "last:Karimi", "gender:female", "service:checkup",
            "age:34", "phone:09123456789", "notes:first", "visit",
        ],
    )
    .expect("book");
    let bookings = BookingStore::new(&mut store).all();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].patient.notes.as_deref(), Some("first visit"));

    let slot_prefix = short_id(bookings[0].slot_id);
    assert!(run(&mut store, &cfg, &["close", &slot_prefix]).is_err());

    run(&mut store, &cfg, &["unb", &slot_prefix]).expect("unbook");
    assert!(BookingStore::new(&mut store).all().is_empty());
    run(&mut store, &cfg, &["close", &slot_prefix]).expect("close");
    assert_eq!(SlotStore::new(&mut store).list_for_date(date).len(), 23);

    run(&mut store, &cfg, &["check"]).expect("consistent");
    run(&mut store, &cfg, &["calendar", "2025-09", "select:1404/06/10"]).expect("calendar");
    run(&mut store, &cfg, &["times", "1404/06/10"]).expect("times");
    run(&mut store, &cfg, &["conv", "2025-03-21"]).expect("convert");
}

#[test]
fn invalid_patient_is_rejected_before_any_write() {
    let cfg = Config::defaults();
    let mut store = MemoryStore::new();
    run(&mut store, &cfg, &["open", "1404/06/10", "10:00"]).expect("open");

    let err = run(
        &mut store,
        &cfg,
        &[
            "book", "1404/06/10", "10:00", "first:Sara", "last:Karimi", "gender:female", "service:checkup",
            "age:34", "phone:12345",
        ],
    )
    .expect_err("short phone");
    assert!(format!("{err:#}").contains("11 digits"));
    assert!(SlotStore::new(&mut store).list_for_date(JalaliDate::new(1404, 6, 10))[0].is_free());
}

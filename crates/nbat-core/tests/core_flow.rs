use std::fs;

use chrono::{Duration, Utc};
use nbat_core::ScheduleError;
use nbat_core::booking::{BookingFilter, BookingStore, PatientInfo};
use nbat_core::calendar::JalaliDate;
use nbat_core::export::ExportDocument;
use nbat_core::slot::{SlotStore, SlotTime};
use nbat_core::store::{Collection, JsonFileStore};
use tempfile::tempdir;

fn patient(first: &str) -> PatientInfo {
    PatientInfo {
        first_name: first.to_string(),
        last_name: "Karimi".to_string(),
        gender: "female".to_string(),
        service: "checkup".to_string(),
        insurance: Some("Tamin".to_string()),
        age: 34,
        phone: "۰۹۱۲۳۴۵۶۷۸۹".to_string(),
        notes: None,
    }
}

fn time(raw: &str) -> SlotTime {
    raw.parse().expect("valid time")
}

#[test]
fn reserve_and_cancel_survive_reopen() {
    let temp = tempdir().expect("tempdir");
    let date = JalaliDate::new(1404, 6, 10);
    let now = Utc::now();

    let booking = {
        let mut store = JsonFileStore::open(temp.path()).expect("open store");
        let created = SlotStore::new(&mut store)
            .create_slots(date, [time("09:00"), time("09:30"), time("09:00")])
            .expect("create slots");
        assert_eq!(created, 2);

        BookingStore::new(&mut store)
            .reserve_at(date, time("09:00"), patient("Sara"), now)
            .expect("reserve")
    };
    assert_eq!(booking.patient.phone, "09123456789");

    let mut store = JsonFileStore::open(temp.path()).expect("reopen store");
    let available = SlotStore::new(&mut store).list_available_for_date(date);
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].time, time("09:30"));

    let err = BookingStore::new(&mut store)
        .reserve_at(date, time("09:00"), patient("Mina"), now)
        .expect_err("double booking");
    assert!(matches!(err, ScheduleError::SlotAlreadyBooked(_)));

    let mut bookings = BookingStore::new(&mut store);
    let found = bookings.list_bookings(&BookingFilter {
        date: Some(date),
        query: Some("sara karimi".to_string()),
    });
    assert_eq!(found, vec![booking.clone()]);

    bookings.cancel(booking.id).expect("cancel");
    assert!(bookings.audit().is_empty());
    assert_eq!(SlotStore::new(&mut store).list_available_for_date(date).len(), 2);
}

#[test]
fn corrupt_collection_reads_as_empty_and_is_rewritten() {
    let temp = tempdir().expect("tempdir");
    let mut store = JsonFileStore::open(temp.path()).expect("open store");
    let slots_file = store.path_for(Collection::Slots.key());
    fs::write(&slots_file, "{not json").expect("corrupt file");

    let date = JalaliDate::new(1404, 1, 1);
    assert!(SlotStore::new(&mut store).list_for_date(date).is_empty());

    SlotStore::new(&mut store)
        .create_slots(date, [time("10:00")])
        .expect("create after corruption");
    let raw = fs::read_to_string(&slots_file).expect("read back");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json again");
    assert_eq!(parsed[0]["date"], "1404/01/01");
}

#[test]
fn export_snapshot_includes_recent_booking() {
    let temp = tempdir().expect("tempdir");
    let mut store = JsonFileStore::open(temp.path()).expect("open store");
    let date = JalaliDate::new(1404, 6, 10);
    let now = Utc::now();

    SlotStore::new(&mut store)
        .create_slots(date, [time("11:00")])
        .expect("create");
    let booking = BookingStore::new(&mut store)
        .reserve_at(date, time("11:00"), patient("Sara"), now)
        .expect("reserve");
    assert!(nbat_core::booking::is_recent(&booking, now + Duration::minutes(4), Duration::minutes(5)));
    assert!(!nbat_core::booking::is_recent(&booking, now + Duration::minutes(6), Duration::minutes(5)));

    let out = temp.path().join("export.json");
    ExportDocument::snapshot(&store, now).write_to(&out).expect("export");
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).expect("read")).expect("json");
    assert_eq!(doc["bookings"][0]["firstName"], "Sara");
    assert_eq!(doc["slots"][0]["booked"], true);
    assert!(doc["posts"].as_array().is_some_and(Vec::is_empty));
}

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calendar::{JalaliDate, normalize_digits};
use crate::error::{ScheduleError, ScheduleResult};
use crate::slot::{Slot, SlotStore, SlotTime};
use crate::store::{Collection, KeyValueStore, read_collection, write_collection};

pub const PHONE_DIGITS: usize = 11;
pub const MAX_PATIENT_AGE: u32 = 150;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
    pub age: u32,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PatientInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Trims fields, normalises phone digits and checks the required
    /// fields.
    pub fn validate(mut self) -> ScheduleResult<Self> {
        let required: [(&'static str, &mut String); 5] = [
            ("first name", &mut self.first_name),
            ("last name", &mut self.last_name),
            ("gender", &mut self.gender),
            ("service", &mut self.service),
            ("phone", &mut self.phone),
        ];
        for (name, value) in required {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                return Err(ScheduleError::MissingPatientField(name));
            }
            *value = trimmed;
        }

        let phone = normalize_digits(&self.phone);
        if phone.len() != PHONE_DIGITS || !phone.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(ScheduleError::InvalidPhone(self.phone));
        }
        self.phone = phone;

        if self.age == 0 || self.age > MAX_PATIENT_AGE {
            return Err(ScheduleError::InvalidAge(self.age));
        }

        self.insurance = self.insurance.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        self.notes = self.notes.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(self)
    }
}

/// A patient's reservation of exactly one slot. `date` and `time` are
/// copied from the slot at reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub date: JalaliDate,
    pub time: SlotTime,
    #[serde(flatten)]
    pub patient: PatientInfo,
    pub created_at: DateTime<Utc>,
}

/// Advisory "new booking" highlight; plays no part in consistency.
pub fn is_recent(booking: &Booking, now: DateTime<Utc>, window: Duration) -> bool {
    now.signed_duration_since(booking.created_at) < window
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub date: Option<JalaliDate>,
    pub query: Option<String>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        if self.date.is_some_and(|date| booking.date != date) {
            return false;
        }
        let Some(query) = self.query.as_deref() else {
            return true;
        };
        let needle = normalize_digits(query).to_lowercase();
        let full_name = booking.patient.full_name();
        [
            &full_name,
            &booking.patient.first_name,
            &booking.patient.last_name,
            &booking.patient.phone,
            &booking.patient.service,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// A broken link between the slot and booking collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    BookedSlotWithoutBooking { slot_id: Uuid },
    BookingForMissingSlot { booking_id: Uuid, slot_id: Uuid },
    BookingNotLinkedBySlot { booking_id: Uuid, slot_id: Uuid },
    SlotClaimedTwice { slot_id: Uuid, booking_ids: Vec<Uuid> },
    DuplicateSlotTime { date: JalaliDate, time: SlotTime, slot_ids: Vec<Uuid> },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::BookedSlotWithoutBooking { slot_id } => {
                write!(f, "slot {slot_id} is marked booked but no booking references it")
            }
            Inconsistency::BookingForMissingSlot { booking_id, slot_id } => {
                write!(f, "booking {booking_id} references missing slot {slot_id}")
            }
            Inconsistency::BookingNotLinkedBySlot { booking_id, slot_id } => {
                write!(f, "booking {booking_id} is not the booking recorded on slot {slot_id}")
            }
            Inconsistency::SlotClaimedTwice { slot_id, booking_ids } => {
                write!(f, "slot {slot_id} is referenced by {} bookings", booking_ids.len())
            }
            Inconsistency::DuplicateSlotTime { date, time, slot_ids } => {
                write!(f, "{} slots share {date} {time}", slot_ids.len())
            }
        }
    }
}

/// Owner of the booking collection. Every change to a slot's availability
/// goes through [`SlotStore`].
pub struct BookingStore<'a, S: KeyValueStore + ?Sized> {
    kv: &'a mut S,
}

impl<'a, S: KeyValueStore + ?Sized> BookingStore<'a, S> {
    pub fn new(kv: &'a mut S) -> Self {
        Self { kv }
    }

    fn slots(&mut self) -> SlotStore<'_, S> {
        SlotStore::new(&mut *self.kv)
    }

    pub fn all(&self) -> Vec<Booking> {
        read_collection(&*self.kv, Collection::Bookings)
    }

    pub fn get(&self, id: Uuid) -> Option<Booking> {
        self.all().into_iter().find(|booking| booking.id == id)
    }

    #[tracing::instrument(skip(self, patient, now), fields(slot_id = %slot_id))]
    pub fn reserve(&mut self, slot_id: Uuid, patient: PatientInfo, now: DateTime<Utc>) -> ScheduleResult<Booking> {
        let patient = patient.validate()?;
        let slot = self.slots().get(slot_id).ok_or(ScheduleError::SlotNotFound(slot_id))?;
        let mut bookings = self.all();

        if slot.booked || bookings.iter().any(|booking| booking.slot_id == slot_id) {
            warn!("slot already booked");
            return Err(ScheduleError::SlotAlreadyBooked(slot_id));
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            slot_id,
            date: slot.date,
            time: slot.time,
            patient,
            created_at: now,
        };

        self.slots().mark_booked(slot_id, booking.id)?;
        bookings.push(booking.clone());
        if let Err(err) = write_collection(&mut *self.kv, Collection::Bookings, &bookings) {
            error!(error = %err, "failed to store booking; releasing slot");
            self.slots().mark_free(slot_id)?;
            return Err(err);
        }

        info!(booking_id = %booking.id, date = %booking.date, time = %booking.time, "reserved slot");
        Ok(booking)
    }

    /// Reserves the slot defined at `date` `time`.
    pub fn reserve_at(
        &mut self,
        date: JalaliDate,
        time: SlotTime,
        patient: PatientInfo,
        now: DateTime<Utc>,
    ) -> ScheduleResult<Booking> {
        let slot = self
            .slots()
            .find_at(date, time)
            .ok_or(ScheduleError::NoSlotAt { date, time })?;
        self.reserve(slot.id, patient, now)
    }

    /// Removes a booking and frees its slot. A booking whose slot is gone
    /// is still removed.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub fn cancel(&mut self, booking_id: Uuid) -> ScheduleResult<Booking> {
        let mut bookings = self.all();
        let idx = bookings
            .iter()
            .position(|booking| booking.id == booking_id)
            .ok_or(ScheduleError::BookingNotFound(booking_id))?;
        let booking = bookings.remove(idx);
        write_collection(&mut *self.kv, Collection::Bookings, &bookings)?;

        let slot = self.slots().get(booking.slot_id);
        match slot {
            Some(slot) if slot.booking_id.is_none_or(|id| id == booking_id) => {
                if let Err(err) = self.slots().mark_free(slot.id) {
                    error!(error = %err, "failed to free slot; restoring booking");
                    bookings.insert(idx, booking);
                    write_collection(&mut *self.kv, Collection::Bookings, &bookings)?;
                    return Err(err);
                }
            }
            Some(slot) => {
                warn!(slot_id = %slot.id, owner = ?slot.booking_id, "slot belongs to another booking; left as is");
            }
            None => {
                warn!(slot_id = %booking.slot_id, "cancelling orphaned booking");
            }
        }

        info!(date = %booking.date, time = %booking.time, "cancelled booking");
        Ok(booking)
    }

    /// Cancels whatever booking holds `slot_id`. With no such booking the
    /// slot's booked flag is still cleared.
    #[tracing::instrument(skip(self), fields(slot_id = %slot_id))]
    pub fn cancel_by_slot(&mut self, slot_id: Uuid) -> ScheduleResult<Option<Booking>> {
        let holder = self.all().into_iter().find(|booking| booking.slot_id == slot_id);
        if let Some(booking) = holder {
            return self.cancel(booking.id).map(Some);
        }

        if self.slots().get(slot_id).is_some_and(|slot| slot.booked) {
            warn!("slot flagged booked without a booking; freeing it");
            self.slots().mark_free(slot_id)?;
        }
        Ok(None)
    }

    /// Bookings matching `filter`, ordered by date then time.
    pub fn list_bookings(&self, filter: &BookingFilter) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self
            .all()
            .into_iter()
            .filter(|booking| filter.matches(booking))
            .collect();
        bookings.sort_by(|a, b| {
            (a.date, a.time, a.created_at).cmp(&(b.date, b.time, b.created_at))
        });
        bookings
    }

    pub fn audit(&self) -> Vec<Inconsistency> {
        let slots: Vec<Slot> = read_collection(&*self.kv, Collection::Slots);
        audit_collections(&slots, &self.all())
    }
}

pub fn audit_collections(slots: &[Slot], bookings: &[Booking]) -> Vec<Inconsistency> {
    let mut found = Vec::new();

    let mut by_time: BTreeMap<(JalaliDate, SlotTime), Vec<Uuid>> = BTreeMap::new();
    for slot in slots {
        by_time.entry((slot.date, slot.time)).or_default().push(slot.id);
    }
    for ((date, time), slot_ids) in by_time {
        if slot_ids.len() > 1 {
            found.push(Inconsistency::DuplicateSlotTime { date, time, slot_ids });
        }
    }

    let mut by_slot: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for booking in bookings {
        by_slot.entry(booking.slot_id).or_default().push(booking.id);

        match slots.iter().find(|slot| slot.id == booking.slot_id) {
            None => found.push(Inconsistency::BookingForMissingSlot {
                booking_id: booking.id,
                slot_id: booking.slot_id,
            }),
            Some(slot) if !slot.booked || slot.booking_id != Some(booking.id) => {
                found.push(Inconsistency::BookingNotLinkedBySlot {
                    booking_id: booking.id,
                    slot_id: slot.id,
                });
            }
            Some(_) => {}
        }
    }

    for (slot_id, booking_ids) in &by_slot {
        if booking_ids.len() > 1 {
            found.push(Inconsistency::SlotClaimedTwice {
                slot_id: *slot_id,
                booking_ids: booking_ids.clone(),
            });
        }
    }

    for slot in slots.iter().filter(|slot| slot.booked) {
        if !by_slot.contains_key(&slot.id) {
            found.push(Inconsistency::BookedSlotWithoutBooking { slot_id: slot.id });
        }
    }

    found
}

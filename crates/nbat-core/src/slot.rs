use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::calendar::{JalaliDate, parse_time_hhmm};
use crate::error::{ScheduleError, ScheduleResult};
use crate::store::{Collection, KeyValueStore, read_collection, write_collection};

/// Wall-clock time of a slot, `HH:MM` on the 24-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime {
    hour: u8,
    minute: u8,
}

impl SlotTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn minutes_since_midnight(self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }

    fn from_minutes(total: u32) -> Option<Self> {
        let hour = u8::try_from(total / 60).ok()?;
        let minute = u8::try_from(total % 60).ok()?;
        Self::new(hour, minute)
    }

    /// Every `interval_minutes` step from `start` up to and including `end`.
    pub fn working_hours(start: SlotTime, end: SlotTime, interval_minutes: u32) -> Vec<SlotTime> {
        if interval_minutes == 0 {
            return vec![start];
        }
        let last = end.minutes_since_midnight();
        (start.minutes_since_midnight()..=last)
            .step_by(interval_minutes as usize)
            .filter_map(Self::from_minutes)
            .collect()
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for SlotTime {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time_hhmm(s)
            .map(|(hour, minute)| Self { hour, minute })
            .ok_or_else(|| ScheduleError::InvalidTimeFormat(s.to_string()))
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One bookable (date, time) unit of clinic capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: Uuid,
    pub date: JalaliDate,
    pub time: SlotTime,
    #[serde(default)]
    pub booked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
}

impl Slot {
    pub fn new_free(date: JalaliDate, time: SlotTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            time,
            booked: false,
            booking_id: None,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.booked
    }
}

/// Owner of the slot collection. Availability flips only through
/// [`SlotStore::mark_booked`] and [`SlotStore::mark_free`], which the
/// booking store drives.
pub struct SlotStore<'a, S: KeyValueStore + ?Sized> {
    kv: &'a mut S,
}

impl<'a, S: KeyValueStore + ?Sized> SlotStore<'a, S> {
    pub fn new(kv: &'a mut S) -> Self {
        Self { kv }
    }

    pub fn all(&self) -> Vec<Slot> {
        read_collection(&*self.kv, Collection::Slots)
    }

    pub fn get(&self, id: Uuid) -> Option<Slot> {
        self.all().into_iter().find(|slot| slot.id == id)
    }

    pub fn find_at(&self, date: JalaliDate, time: SlotTime) -> Option<Slot> {
        self.all()
            .into_iter()
            .find(|slot| slot.date == date && slot.time == time)
    }

    /// Adds a free slot for each requested time that has no slot yet.
    /// Returns how many were created.
    #[tracing::instrument(skip(self, times), fields(date = %date))]
    pub fn create_slots<I>(&mut self, date: JalaliDate, times: I) -> ScheduleResult<usize>
    where
        I: IntoIterator<Item = SlotTime>,
    {
        let mut slots = self.all();
        let mut created = 0_usize;

        for time in times {
            if slots.iter().any(|slot| slot.date == date && slot.time == time) {
                debug!(%time, "slot already exists; skipping");
                continue;
            }
            slots.push(Slot::new_free(date, time));
            created += 1;
        }

        if created > 0 {
            write_collection(&mut *self.kv, Collection::Slots, &slots)?;
        }
        info!(created, "created slots");
        Ok(created)
    }

    /// All slots on `date`, earliest first.
    pub fn list_for_date(&self, date: JalaliDate) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self
            .all()
            .into_iter()
            .filter(|slot| slot.date == date)
            .collect();
        slots.sort_by_key(|slot| slot.time);
        slots
    }

    pub fn list_available_for_date(&self, date: JalaliDate) -> Vec<Slot> {
        self.list_for_date(date)
            .into_iter()
            .filter(Slot::is_free)
            .collect()
    }

    /// Removes a free slot. A booked slot is refused until its booking is
    /// cancelled.
    #[tracing::instrument(skip(self), fields(slot_id = %id))]
    pub fn delete_slot(&mut self, id: Uuid) -> ScheduleResult<Slot> {
        let mut slots = self.all();
        let idx = slots
            .iter()
            .position(|slot| slot.id == id)
            .ok_or(ScheduleError::SlotNotFound(id))?;

        if slots[idx].booked {
            warn!("refusing to delete booked slot");
            return Err(ScheduleError::SlotCurrentlyBooked(id));
        }

        let removed = slots.remove(idx);
        write_collection(&mut *self.kv, Collection::Slots, &slots)?;
        info!(date = %removed.date, time = %removed.time, "deleted slot");
        Ok(removed)
    }

    #[tracing::instrument(skip(self), fields(slot_id = %id, booking_id = %booking_id))]
    pub(crate) fn mark_booked(&mut self, id: Uuid, booking_id: Uuid) -> ScheduleResult<()> {
        let mut slots = self.all();
        let slot = slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .ok_or(ScheduleError::SlotNotFound(id))?;
        if slot.booked {
            return Err(ScheduleError::SlotAlreadyBooked(id));
        }

        slot.booked = true;
        slot.booking_id = Some(booking_id);
        write_collection(&mut *self.kv, Collection::Slots, &slots)?;
        debug!("slot marked booked");
        Ok(())
    }

    /// Clears the booked flag. `Ok(None)` when the slot no longer exists.
    #[tracing::instrument(skip(self), fields(slot_id = %id))]
    pub(crate) fn mark_free(&mut self, id: Uuid) -> ScheduleResult<Option<Slot>> {
        let mut slots = self.all();
        let Some(slot) = slots.iter_mut().find(|slot| slot.id == id) else {
            debug!("slot to free does not exist");
            return Ok(None);
        };

        slot.booked = false;
        slot.booking_id = None;
        let freed = slot.clone();
        write_collection(&mut *self.kv, Collection::Slots, &slots)?;
        debug!("slot marked free");
        Ok(Some(freed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn time(raw: &str) -> SlotTime {
        raw.parse().expect("valid time")
    }

    fn date() -> JalaliDate {
        JalaliDate::new(1404, 6, 10)
    }

    #[test]
    fn duplicate_times_collapse_to_one_slot() {
        let mut kv = MemoryStore::new();
        let mut slots = SlotStore::new(&mut kv);

        let created = slots
            .create_slots(date(), [time("09:00"), time("09:00")])
            .expect("create");
        assert_eq!(created, 1);

        let again = slots.create_slots(date(), [time("09:00")]).expect("create again");
        assert_eq!(again, 0);
        assert_eq!(slots.all().len(), 1);
    }

    #[test]
    fn same_time_on_other_day_is_distinct() {
        let mut kv = MemoryStore::new();
        let mut slots = SlotStore::new(&mut kv);
        slots.create_slots(date(), [time("09:00")]).expect("create");
        let created = slots
            .create_slots(JalaliDate::new(1404, 6, 11), [time("09:00")])
            .expect("create");
        assert_eq!(created, 1);
    }

    #[test]
    fn lists_are_chronological_and_filter_booked() {
        let mut kv = MemoryStore::new();
        let mut slots = SlotStore::new(&mut kv);
        slots
            .create_slots(date(), [time("14:30"), time("09:00"), time("11:00")])
            .expect("create");

        let listed: Vec<String> = slots
            .list_for_date(date())
            .iter()
            .map(|slot| slot.time.to_string())
            .collect();
        assert_eq!(listed, ["09:00", "11:00", "14:30"]);

        let morning = slots.find_at(date(), time("09:00")).expect("slot exists");
        slots.mark_booked(morning.id, Uuid::new_v4()).expect("mark booked");

        let free: Vec<String> = slots
            .list_available_for_date(date())
            .iter()
            .map(|slot| slot.time.to_string())
            .collect();
        assert_eq!(free, ["11:00", "14:30"]);
    }

    #[test]
    fn booked_slot_cannot_be_deleted() {
        let mut kv = MemoryStore::new();
        let mut slots = SlotStore::new(&mut kv);
        slots.create_slots(date(), [time("10:00")]).expect("create");
        let slot = slots.find_at(date(), time("10:00")).expect("slot");
        let booking_id = Uuid::new_v4();
        slots.mark_booked(slot.id, booking_id).expect("book");

        let err = slots.delete_slot(slot.id).expect_err("must refuse");
        assert!(matches!(err, ScheduleError::SlotCurrentlyBooked(id) if id == slot.id));

        let unchanged = slots.get(slot.id).expect("still there");
        assert!(unchanged.booked);
        assert_eq!(unchanged.booking_id, Some(booking_id));
    }

    #[test]
    fn free_slot_deletes_and_missing_slot_errors() {
        let mut kv = MemoryStore::new();
        let mut slots = SlotStore::new(&mut kv);
        slots.create_slots(date(), [time("10:00")]).expect("create");
        let slot = slots.find_at(date(), time("10:00")).expect("slot");

        slots.delete_slot(slot.id).expect("delete");
        assert!(slots.all().is_empty());
        assert!(matches!(
            slots.delete_slot(slot.id),
            Err(ScheduleError::SlotNotFound(_))
        ));
    }

    #[test]
    fn working_hours_grid_is_inclusive() {
        let grid = SlotTime::working_hours(time("09:00"), time("20:30"), 30);
        assert_eq!(grid.len(), 24);
        assert_eq!(grid.first().map(ToString::to_string).as_deref(), Some("09:00"));
        assert_eq!(grid.last().map(ToString::to_string).as_deref(), Some("20:30"));
    }

    #[test]
    fn records_without_uuid_ids_read_as_empty() {
        let mut kv = MemoryStore::new();
        let raw = r#"[{"id":"id_abc123","date":"1404/06/10","time":"09:00","booked":false}]"#;
        kv.write_raw(Collection::Slots.key(), raw).expect("write");
        assert!(SlotStore::new(&mut kv).all().is_empty());
    }
}

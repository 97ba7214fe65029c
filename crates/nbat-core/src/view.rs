//! Display state for the month calendar and the day's time panel.
//!
//! Everything here is a pure function of a [`CalendarViewState`] and the
//! slot/booking collections. Interaction handlers take the state by value
//! and hand back the next one.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc, Weekday};

use crate::booking::{Booking, is_recent};
use crate::calendar::{JalaliDate, persian_month_name};
use crate::holidays::Holiday;
use crate::slot::{Slot, SlotTime};

/// Six weeks of seven days.
pub const GRID_CELLS: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarViewState {
    /// Gregorian month on screen; always the 1st of that month.
    month_start: NaiveDate,
    pub selected_date: Option<JalaliDate>,
    pub selected_times: BTreeSet<SlotTime>,
}

impl CalendarViewState {
    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|month_start| Self {
            month_start,
            selected_date: None,
            selected_times: BTreeSet::new(),
        })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            month_start: date.with_day(1).unwrap_or(date),
            selected_date: None,
            selected_times: BTreeSet::new(),
        }
    }

    pub fn year(&self) -> i32 {
        self.month_start.year()
    }

    pub fn month(&self) -> u32 {
        self.month_start.month()
    }

    pub fn next_month(self) -> Self {
        self.shift_months(1)
    }

    pub fn prev_month(self) -> Self {
        self.shift_months(-1)
    }

    pub fn shift_months(mut self, delta: i32) -> Self {
        let months = Months::new(delta.unsigned_abs());
        let shifted = if delta >= 0 {
            self.month_start.checked_add_months(months)
        } else {
            self.month_start.checked_sub_months(months)
        };
        if let Some(start) = shifted {
            self.month_start = start;
        }
        self
    }

    /// Choosing a day drops any half-made time selection.
    pub fn select_date(mut self, date: JalaliDate) -> Self {
        self.selected_date = Some(date);
        self.selected_times.clear();
        self
    }

    /// Flips `time` in the selection. Times already booked on the selected
    /// date cannot be picked.
    pub fn toggle_time(mut self, time: SlotTime, slots: &[Slot]) -> Self {
        let Some(date) = self.selected_date else {
            return self;
        };
        let booked = slots
            .iter()
            .any(|slot| slot.date == date && slot.time == time && slot.booked);
        if booked {
            return self;
        }
        if !self.selected_times.remove(&time) {
            self.selected_times.insert(time);
        }
        self
    }

    pub fn clear_times(mut self) -> Self {
        self.selected_times.clear();
        self
    }
}

/// What the calendar needs to know about "now" and the clinic.
#[derive(Debug, Clone)]
pub struct ViewContext {
    pub today: NaiveDate,
    pub now: DateTime<Utc>,
    pub recent_window: Duration,
    pub working_days: Vec<Weekday>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell {
    pub gregorian: NaiveDate,
    pub jalali: JalaliDate,
    pub jalali_day: u32,
    pub in_month: bool,
    pub today: bool,
    pub working_day: bool,
    pub has_available_slots: bool,
    pub has_bookings: bool,
    pub recent_booking: bool,
    pub selected: bool,
    pub holiday: Option<String>,
}

/// Header text: Persian month name and Jalali year of the month's 1st.
pub fn month_title(year: i32, month: u32) -> Option<String> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let jalali = JalaliDate::from_gregorian(first);
    Some(format!("{} {}", persian_month_name(jalali.month), jalali.year))
}

/// Sunday on or before the 1st of the shown month.
pub fn grid_start(state: &CalendarViewState) -> NaiveDate {
    let offset = state.month_start.weekday().num_days_from_sunday();
    state.month_start - Duration::days(i64::from(offset))
}

pub fn derive_month_view(
    state: &CalendarViewState,
    slots: &[Slot],
    bookings: &[Booking],
    holidays: &[Holiday],
    ctx: &ViewContext,
) -> Vec<DayCell> {
    let start = grid_start(state);

    start
        .iter_days()
        .take(GRID_CELLS)
        .map(|gregorian| {
            let jalali = JalaliDate::from_gregorian(gregorian);
            let mut day_bookings = bookings.iter().filter(|booking| booking.date == jalali).peekable();
            let has_bookings = day_bookings.peek().is_some();
            let recent_booking = day_bookings.any(|booking| is_recent(booking, ctx.now, ctx.recent_window));

            DayCell {
                gregorian,
                jalali,
                jalali_day: jalali.day,
                in_month: gregorian.month() == state.month() && gregorian.year() == state.year(),
                today: gregorian == ctx.today,
                working_day: ctx.working_days.contains(&gregorian.weekday()),
                has_available_slots: slots.iter().any(|slot| slot.date == jalali && slot.is_free()),
                has_bookings,
                recent_booking,
                selected: state.selected_date == Some(jalali),
                holiday: holidays
                    .iter()
                    .find(|holiday| holiday.date == gregorian)
                    .map(|holiday| holiday.summary.clone()),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStatus {
    /// No slot defined at this time.
    Unset,
    /// A free slot exists.
    Open,
    Booked { recent: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCell {
    pub time: SlotTime,
    pub status: TimeStatus,
    pub selected: bool,
}

/// Status of each working-hours time on `date`. Slots defined outside the
/// grid are appended in order.
pub fn derive_day_times(
    state: &CalendarViewState,
    date: JalaliDate,
    grid: &[SlotTime],
    slots: &[Slot],
    bookings: &[Booking],
    ctx: &ViewContext,
) -> Vec<TimeCell> {
    let mut times: BTreeSet<SlotTime> = grid.iter().copied().collect();
    times.extend(slots.iter().filter(|slot| slot.date == date).map(|slot| slot.time));

    times
        .into_iter()
        .map(|time| {
            let status = match slots.iter().find(|slot| slot.date == date && slot.time == time) {
                None => TimeStatus::Unset,
                Some(slot) if !slot.booked => TimeStatus::Open,
                Some(slot) => TimeStatus::Booked {
                    recent: bookings
                        .iter()
                        .filter(|booking| booking.slot_id == slot.id)
                        .any(|booking| is_recent(booking, ctx.now, ctx.recent_window)),
                },
            };
            TimeCell {
                time,
                status,
                selected: state.selected_date == Some(date) && state.selected_times.contains(&time),
            }
        })
        .collect()
}

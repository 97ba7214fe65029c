use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use unicode_width::UnicodeWidthStr;
use uuid::Uuid;

use crate::booking::{Booking, Inconsistency, is_recent};
use crate::calendar::JalaliDate;
use crate::config::Config;
use crate::holidays::Holiday;
use crate::posting::{Discount, Offer, Post};
use crate::slot::Slot;
use crate::timezone::format_clinic_datetime;
use crate::view::{DayCell, TimeCell, TimeStatus};

const WEEKDAY_HEADERS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Ids are shown as their first eight hex digits; any unique prefix is
/// accepted back on the command line.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, cells))]
    pub fn print_month(&mut self, title: &str, cells: &[DayCell]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for line in self.month_lines(title, cells) {
            writeln!(out, "{line}")?;
        }

        let holidays: Vec<&DayCell> = cells
            .iter()
            .filter(|cell| cell.in_month && cell.holiday.is_some())
            .collect();
        for cell in holidays {
            writeln!(
                out,
                "  {} {}",
                self.paint(&cell.jalali.to_string(), "31"),
                cell.holiday.as_deref().unwrap_or_default()
            )?;
        }
        writeln!(out, "  * open slots   # booked   ! new booking   h holiday")?;
        Ok(())
    }

    /// Title row, weekday header, then six rows of seven cells. Each cell is
    /// the Jalali day number followed by up to two markers.
    fn month_lines(&self, title: &str, cells: &[DayCell]) -> Vec<String> {
        let mut lines = vec![title.to_string(), WEEKDAY_HEADERS.map(|h| format!("{h:<5}")).join("")];

        for week in cells.chunks(7) {
            let mut line = String::new();
            for cell in week {
                let text = if cell.in_month {
                    format!("{:>2}{}", cell.jalali_day, day_markers(cell))
                } else {
                    format!("{:>2}", cell.jalali_day)
                };
                let text = format!("{text:<4}");
                let code = if !cell.in_month {
                    Some("2")
                } else if cell.selected {
                    Some("1;4")
                } else if cell.today {
                    Some("7")
                } else if cell.holiday.is_some() || !cell.working_day {
                    Some("31")
                } else {
                    None
                };
                match code {
                    Some(code) => line.push_str(&self.paint(&text, code)),
                    None => line.push_str(&text),
                }
                line.push(' ');
            }
            lines.push(line.trim_end().to_string());
        }
        lines
    }

    #[tracing::instrument(skip(self, slots))]
    pub fn print_slot_table(&mut self, slots: &[Slot]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Date".to_string(),
            "Time".to_string(),
            "Status".to_string(),
        ];

        let rows = slots
            .iter()
            .map(|slot| {
                let status = if slot.booked {
                    self.paint("booked", "31")
                } else {
                    self.paint("free", "32")
                };
                vec![
                    self.paint(&short_id(slot.id), "33"),
                    slot.date.to_string(),
                    slot.time.to_string(),
                    status,
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, cells))]
    pub fn print_day_times(&mut self, date: JalaliDate, cells: &[TimeCell]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{date} ({})", date.month_name())?;

        let headers = vec!["Time".to_string(), "Status".to_string()];
        let rows = cells
            .iter()
            .map(|cell| {
                let status = match cell.status {
                    TimeStatus::Unset => "-".to_string(),
                    TimeStatus::Open => self.paint("open", "32"),
                    TimeStatus::Booked { recent: true } => self.paint("booked (new)", "1;35"),
                    TimeStatus::Booked { recent: false } => self.paint("booked", "31"),
                };
                let time = if cell.selected {
                    self.paint(&cell.time.to_string(), "1;4")
                } else {
                    cell.time.to_string()
                };
                vec![time, status]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, bookings, now))]
    pub fn print_booking_table(
        &mut self,
        bookings: &[Booking],
        now: DateTime<Utc>,
        recent_window: Duration,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Date".to_string(),
            "Time".to_string(),
            "Patient".to_string(),
            "Phone".to_string(),
            "Service".to_string(),
            "Insurance".to_string(),
        ];

        let rows = bookings
            .iter()
            .map(|booking| {
                let name = booking.patient.full_name();
                let name = if is_recent(booking, now, recent_window) {
                    self.paint(&format!("{name} (new)"), "1;35")
                } else {
                    name
                };
                vec![
                    self.paint(&short_id(booking.id), "33"),
                    booking.date.to_string(),
                    booking.time.to_string(),
                    name,
                    booking.patient.phone.clone(),
                    booking.patient.service.clone(),
                    booking.patient.insurance.clone().unwrap_or_default(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, booking))]
    pub fn print_booking_info(&mut self, booking: &Booking) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let patient = &booking.patient;

        writeln!(out, "id        {}", booking.id)?;
        writeln!(out, "slot      {}", booking.slot_id)?;
        writeln!(out, "when      {} {}", booking.date, booking.time)?;
        writeln!(out, "patient   {}", patient.full_name())?;
        writeln!(out, "gender    {}", patient.gender)?;
        writeln!(out, "age       {}", patient.age)?;
        writeln!(out, "phone     {}", patient.phone)?;
        writeln!(out, "service   {}", patient.service)?;
        if let Some(insurance) = &patient.insurance {
            writeln!(out, "insurance {insurance}")?;
        }
        if let Some(notes) = &patient.notes {
            writeln!(out, "notes     {notes}")?;
        }
        writeln!(out, "created   {}", format_clinic_datetime(booking.created_at))?;
        Ok(())
    }

    pub fn print_posts(&mut self, posts: &[Post]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["ID".to_string(), "Created".to_string(), "Title".to_string(), "Body".to_string()];
        let rows = posts
            .iter()
            .map(|post| {
                vec![
                    self.paint(&short_id(post.id), "33"),
                    format_clinic_datetime(post.created_at),
                    post.title.clone(),
                    post.body.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_discounts(&mut self, discounts: &[Discount]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["ID".to_string(), "Percent".to_string(), "Title".to_string(), "Description".to_string()];
        let rows = discounts
            .iter()
            .map(|discount| {
                vec![
                    self.paint(&short_id(discount.id), "33"),
                    discount.percent.map(|p| format!("{p}%")).unwrap_or_default(),
                    discount.title.clone(),
                    discount.desc.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_offers(&mut self, offers: &[Offer]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["ID".to_string(), "Title".to_string(), "Description".to_string()];
        let rows = offers
            .iter()
            .map(|offer| {
                vec![
                    self.paint(&short_id(offer.id), "33"),
                    offer.title.clone(),
                    offer.desc.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_holidays(&mut self, holidays: &[Holiday]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["Date".to_string(), "Jalali".to_string(), "Summary".to_string()];
        let rows = holidays
            .iter()
            .map(|holiday| {
                vec![
                    holiday.date.format("%Y-%m-%d").to_string(),
                    JalaliDate::from_gregorian(holiday.date).to_string(),
                    holiday.summary.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_audit(&mut self, problems: &[Inconsistency]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if problems.is_empty() {
            writeln!(out, "{}", self.paint("slots and bookings are consistent", "32"))?;
            return Ok(());
        }
        for problem in problems {
            writeln!(out, "{} {problem}", self.paint("!", "31"))?;
        }
        Ok(())
    }

    pub fn print_conversion(&mut self, gregorian: NaiveDate, jalali: JalaliDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{}  =  {}  ({} {})",
            gregorian.format("%Y-%m-%d"),
            jalali,
            jalali.day,
            jalali.month_name()
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn day_markers(cell: &DayCell) -> String {
    let mut markers = String::new();
    if cell.recent_booking {
        markers.push('!');
    } else if cell.has_bookings {
        markers.push('#');
    }
    if cell.has_available_slots {
        markers.push('*');
    }
    if cell.holiday.is_some() && markers.len() < 2 {
        markers.push('h');
    }
    markers
}

fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

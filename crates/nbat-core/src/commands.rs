mod args;
mod postings;
mod schedule;
mod views;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::cli::Invocation;
use crate::config::{ClinicSettings, Config};
use crate::posting::{Discount, Offer, Post};
use crate::render::Renderer;
use crate::store::KeyValueStore;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "calendar",
        "convert",
        "slots",
        "available",
        "times",
        "open",
        "close",
        "unbook",
        "book",
        "cancel",
        "bookings",
        "post",
        "discount",
        "offer",
        "holidays",
        "export",
        "check",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch<S: KeyValueStore + ?Sized>(
    store: &mut S,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let settings = ClinicSettings::from_config(cfg)?;
    let command = inv.command.as_str();
    let args = inv.command_args.as_slice();

    debug!(command, args = ?inv.command_args, "dispatching command");

    match command {
        "calendar" => views::cmd_calendar(store, &settings, renderer, args, now),
        "convert" => views::cmd_convert(renderer, args),
        "times" => views::cmd_times(store, &settings, renderer, args, now),
        "holidays" => views::cmd_holidays(&settings, renderer, args, now),
        "export" => views::cmd_export(store, args, now),
        "slots" => schedule::cmd_slots(store, renderer, args, false),
        "available" => schedule::cmd_slots(store, renderer, args, true),
        "open" => schedule::cmd_open(store, &settings, args),
        "close" => schedule::cmd_close(store, args),
        "unbook" => schedule::cmd_unbook(store, args),
        "book" => schedule::cmd_book(store, renderer, args, now),
        "cancel" => schedule::cmd_cancel(store, args),
        "bookings" => schedule::cmd_bookings(store, &settings, renderer, args, now),
        "check" => schedule::cmd_check(store, renderer),
        "post" => postings::cmd_posting::<Post, S>(store, renderer, args, now),
        "discount" => postings::cmd_posting::<Discount, S>(store, renderer, args, now),
        "offer" => postings::cmd_posting::<Offer, S>(store, renderer, args, now),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "\
usage: nbat [-v|-q] [--nbatrc FILE] [--data DIR] [--rc KEY=VALUE] <command> [args]

calendar [YYYY-MM|+N|-N] [select:DATE]   month grid with slot markers
convert DATE                             Gregorian YYYY-MM-DD <-> Jalali YYYY/MM/DD
slots DATE | available DATE              all / free slots of a day
times DATE                               working-hours grid with status per time
open DATE (HH:MM|hours)...               create slots
close SLOT | unbook SLOT                 delete a free slot / free a booked one
book (SLOT | DATE HH:MM) first: last: gender: service: age: phone: [insurance:] [notes:]
cancel BOOKING                           cancel a booking and free its slot
bookings [date:DATE] [TEXT]              list bookings; new ones are highlighted
post|discount|offer add|remove|list      announcements
holidays [YYYY-MM]                       configured and fetched holidays
export [FILE|-]                          write every collection as JSON
check                                    report slot/booking inconsistencies

Commands may be abbreviated. Ids accept any unique prefix."
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("cal", &known), Some("calendar"));
        assert_eq!(expand_command_abbrev("book", &known), Some("book"));
        assert_eq!(expand_command_abbrev("booki", &known), Some("bookings"));
        assert_eq!(expand_command_abbrev("o", &known), None);
        assert_eq!(expand_command_abbrev("of", &known), Some("offer"));
    }
}

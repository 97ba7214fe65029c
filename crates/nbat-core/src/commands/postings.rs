use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::instrument;

use super::args::{resolve_id, split_modifiers};
use crate::posting::{self, Discount, Offer, Post, Posting};
use crate::render::{Renderer, short_id};
use crate::store::KeyValueStore;

/// Command-line form for one posting kind.
pub(super) trait PostingForm: Posting + Sized {
    const NAME: &'static str;
    const KEYS: &'static [&'static str];

    fn from_form(title: String, mods: &[(String, String)], now: DateTime<Utc>) -> anyhow::Result<Self>;
    fn print(renderer: &mut Renderer, items: &[Self]) -> anyhow::Result<()>;
}

fn field(mods: &[(String, String)], key: &str) -> Option<String> {
    mods.iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PostingForm for Post {
    const NAME: &'static str = "post";
    const KEYS: &'static [&'static str] = &["body", "color", "image"];

    fn from_form(title: String, mods: &[(String, String)], now: DateTime<Utc>) -> anyhow::Result<Self> {
        let mut post = Post::new(title, field(mods, "body"), field(mods, "color").as_deref(), now);
        post.image = field(mods, "image");
        Ok(post)
    }

    fn print(renderer: &mut Renderer, items: &[Self]) -> anyhow::Result<()> {
        renderer.print_posts(items)
    }
}

impl PostingForm for Discount {
    const NAME: &'static str = "discount";
    const KEYS: &'static [&'static str] = &["percent", "desc", "color", "image"];

    fn from_form(title: String, mods: &[(String, String)], _now: DateTime<Utc>) -> anyhow::Result<Self> {
        let percent = field(mods, "percent")
            .map(|raw| {
                raw.trim_end_matches('%')
                    .parse::<f64>()
                    .with_context(|| format!("invalid discount percent {raw:?}"))
            })
            .transpose()?;
        let mut discount = Discount::new(title, percent, field(mods, "desc"), field(mods, "color").as_deref());
        discount.image = field(mods, "image");
        Ok(discount)
    }

    fn print(renderer: &mut Renderer, items: &[Self]) -> anyhow::Result<()> {
        renderer.print_discounts(items)
    }
}

impl PostingForm for Offer {
    const NAME: &'static str = "offer";
    const KEYS: &'static [&'static str] = &["desc", "color", "image"];

    fn from_form(title: String, mods: &[(String, String)], _now: DateTime<Utc>) -> anyhow::Result<Self> {
        let mut offer = Offer::new(title, field(mods, "desc"), field(mods, "color").as_deref());
        offer.image = field(mods, "image");
        Ok(offer)
    }

    fn print(renderer: &mut Renderer, items: &[Self]) -> anyhow::Result<()> {
        renderer.print_offers(items)
    }
}

#[instrument(skip(store, renderer, args, now), fields(kind = P::NAME))]
pub(super) fn cmd_posting<P: PostingForm, S: KeyValueStore + ?Sized>(
    store: &mut S,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let action = args.first().map(String::as_str).unwrap_or("list");
    let rest = args.get(1..).unwrap_or_default();

    match action {
        "list" => {
            let items: Vec<P> = posting::list(store);
            if items.is_empty() {
                println!("No {}s.", P::NAME);
                return Ok(());
            }
            P::print(renderer, &items)
        }
        "add" => {
            let (title, mods) = split_modifiers(rest, P::KEYS);
            let title = title.join(" ").trim().to_string();
            if title.is_empty() {
                return Err(anyhow!("{} add: a title is required", P::NAME));
            }
            let added = posting::add(store, P::from_form(title, &mods, now)?)?;
            println!("Added {} {} ({}).", P::NAME, short_id(added.id()), added.title());
            Ok(())
        }
        "remove" | "delete" => {
            let token = rest
                .first()
                .ok_or_else(|| anyhow!("{} remove: id is required", P::NAME))?;
            let items: Vec<P> = posting::list(store);
            let id = resolve_id(token, items.iter().map(Posting::id), P::NAME)?;
            if posting::remove::<P, S>(store, id)? {
                println!("Removed {} {}.", P::NAME, short_id(id));
            }
            Ok(())
        }
        other => Err(anyhow!("{}: unknown action {other:?}; use add, remove or list", P::NAME)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn words(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn discount_form_reads_percent_and_drops_default_swatch() {
        let (title, mods) = split_modifiers(
            &words(&["Summer", "sale", "percent:15%", "color:#FECACA", "desc:all", "services"]),
            Discount::KEYS,
        );
        let discount = Discount::from_form(title.join(" "), &mods, Utc::now()).expect("form");
        assert_eq!(discount.title, "Summer sale");
        assert_eq!(discount.percent, Some(15.0));
        assert_eq!(discount.color, None);
        assert_eq!(discount.desc.as_deref(), Some("all services"));
    }

    #[test]
    fn add_list_remove_by_prefix() {
        let mut kv = MemoryStore::new();
        let mut renderer = Renderer::new(&crate::config::Config::defaults()).expect("renderer");
        let now = Utc::now();

        cmd_posting::<Offer, _>(&mut kv, &mut renderer, &words(&["add", "Free", "consult"]), now).expect("add");
        let offers: Vec<Offer> = posting::list(&kv);
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].title, "Free consult");

        let prefix = short_id(offers[0].id);
        cmd_posting::<Offer, _>(&mut kv, &mut renderer, &words(&["remove", &prefix]), now).expect("remove");
        assert!(posting::list::<Offer, _>(&kv).is_empty());

        assert!(cmd_posting::<Offer, _>(&mut kv, &mut renderer, &words(&["add"]), now).is_err());
        assert!(cmd_posting::<Offer, _>(&mut kv, &mut renderer, &words(&["publish"]), now).is_err());
    }
}

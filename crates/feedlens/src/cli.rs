//! CLI commands for the Feedlens binary.
//!
//! The binary exists for poking at the engine without a live host: the
//! `demo` command drives a full session against the simulated feed, and
//! the smaller commands exercise the classifier and the price-history
//! store directly.

use crate::classify::{classify, display_title};
use crate::history::PriceHistory;
use crate::session::{spawn_observer, spawn_settings_watcher, FeedSession, SessionConfig};
use crate::sim::SimFeed;
use crate::store::{MemoryStore, StateStore};
use anyhow::{Context, Result};
use clap::Args;
use feedlens_protocol::{ListingSnapshot, Notice, Reply, Request};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Backlog size of the simulated feed.
    #[arg(long, default_value_t = 60)]
    pub entries: usize,
    /// Mark every Nth entry sold (0 disables).
    #[arg(long, default_value_t = 4)]
    pub sold_every: usize,
    /// Mark every Nth entry pending (0 disables).
    #[arg(long, default_value_t = 7)]
    pub pending_every: usize,
    /// Hide pending entries too.
    #[arg(long)]
    pub hide_pending: bool,
    /// Search query to run after the initial pass.
    #[arg(long, default_value = "bike")]
    pub query: String,
    /// Materialize the full backlog before searching.
    #[arg(long)]
    pub load_all: bool,
}

/// Drive a complete session against the simulated feed and print what the
/// trigger UI would see.
pub async fn run_demo(args: DemoArgs) -> Result<()> {
    let feed = build_demo_feed(&args);
    let store = Arc::new(MemoryStore::new());
    store
        .save_settings(&feedlens_protocol::FilterSettings {
            hide_sold: true,
            hide_pending: args.hide_pending,
        })
        .await
        .context("seeding demo settings")?;

    // The simulated host renders instantly; a short settle keeps the demo
    // snappy without changing the loop's behavior.
    let mut config = SessionConfig::primary();
    config.materialize.settle = std::time::Duration::from_millis(150);

    let session = Arc::new(FeedSession::new(
        feed,
        store.clone() as Arc<dyn StateStore>,
        config,
    ));
    let events = session.surface().take_events();
    let observer = spawn_observer(session.clone(), events);
    let watcher = spawn_settings_watcher(session.clone());

    session.start().await;
    println!(
        "session up: {} entries rendered, {} known",
        session.surface().rendered_ids().len(),
        session.stats().total_loaded
    );

    if args.load_all {
        let mut notices = session.notice_stream();
        let progress = tokio::spawn(async move {
            while let Some(Notice::LoadProgress { count }) = notices.recv().await {
                println!("  loading... {count} entries");
            }
        });
        let reply = session.handle(Request::LoadAll).await;
        progress.abort();
        if let Reply::Load { total, stopped } = reply {
            println!("load-all finished: {total} entries (stopped: {stopped})");
        }
    }

    let reply = session
        .handle(Request::Search {
            query: args.query.clone(),
        })
        .await;
    if let Reply::Search {
        matches,
        total,
        current_index,
    } = reply
    {
        println!(
            "search '{}': {matches} matches of {total} known, cursor at {current_index}",
            args.query
        );
        for _ in 0..matches.min(3) {
            if let Reply::Nav { current_index, total } = session.handle(Request::NextMatch).await {
                println!("  next -> {}/{total}", current_index + 1);
            }
        }
    }

    // Feed what the session learned into the price tracker.
    let history = PriceHistory::open_in_memory().context("opening in-memory history")?;
    for id in session.surface().rendered_ids() {
        let text = session
            .surface()
            .rendered_text_of(&id)
            .unwrap_or_default();
        history.save_item(&ListingSnapshot {
            id: id.clone(),
            title: display_title(&text),
            price: crate::classify::first_price(&text).unwrap_or_default(),
            url: format!("/feed/item/{id}"),
            image_url: None,
            location: None,
            seller: None,
        })?;
    }
    let stats = history.stats()?;
    println!(
        "price tracker: {} items ({} drops, {} increases)",
        stats.total_items, stats.price_drops, stats.price_increases
    );

    let stats = session.stats();
    println!(
        "final stats: loaded={} query='{}' cursor={} matches={}",
        stats.total_loaded, stats.current_query, stats.current_index, stats.total_matches
    );

    session.teardown();
    observer.abort();
    watcher.abort();
    Ok(())
}

fn build_demo_feed(args: &DemoArgs) -> SimFeed {
    let mut builder = SimFeed::builder();
    for i in 0..args.entries {
        let id = format!("{}", 1000 + i);
        let title = if i % 3 == 0 {
            format!("Bike #{i}")
        } else {
            format!("Lamp #{i}")
        };
        let price = 10 + (i as u32 % 90);
        builder = if args.sold_every != 0 && i % args.sold_every == 0 && i != 0 {
            builder.sold_listing(&id, &title, price)
        } else if args.pending_every != 0 && i % args.pending_every == 0 && i != 0 {
            builder.pending_listing(&id, &title, price)
        } else {
            builder.listing(&id, &title, price)
        };
    }
    builder.windowed(600.0, 200.0).incremental(12, 8).build()
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Entry text to classify.
    pub text: String,
    /// Raw markup to classify alongside the text.
    #[arg(long, default_value = "")]
    pub markup: String,
}

/// Classify a text snippet the way the visibility engine would.
pub fn run_classify(args: ClassifyArgs) -> Result<()> {
    let classification = classify(&args.text, &args.markup);
    println!("title:   {}", display_title(&args.text));
    println!("sold:    {}", classification.is_sold);
    println!("pending: {}", classification.is_pending);
    Ok(())
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Path to the price-history database.
    #[arg(long)]
    pub db: PathBuf,
    #[command(subcommand)]
    pub action: HistoryAction,
}

#[derive(Debug, clap::Subcommand)]
pub enum HistoryAction {
    /// Aggregate counts over tracked listings.
    Stats,
    /// Listings whose price dropped below the first recorded price.
    Drops,
    /// Listings whose price rose above the first recorded price.
    Increases,
}

/// Query a price-history database.
pub fn run_history(args: HistoryArgs) -> Result<()> {
    let history = PriceHistory::open(&args.db)
        .with_context(|| format!("opening history db at {}", args.db.display()))?;
    match args.action {
        HistoryAction::Stats => {
            let stats = history.stats()?;
            println!(
                "{} items tracked: {} drops, {} increases, {} unchanged",
                stats.total_items, stats.price_drops, stats.price_increases, stats.unchanged
            );
        }
        HistoryAction::Drops => print_items(history.price_drops()?),
        HistoryAction::Increases => print_items(history.price_increases()?),
    }
    Ok(())
}

fn print_items(items: Vec<crate::history::TrackedItem>) {
    if items.is_empty() {
        println!("no matching items");
        return;
    }
    for item in items {
        let first = item
            .history
            .first()
            .map(|p| p.price)
            .unwrap_or(item.current_price);
        println!(
            "{}  {}  {} -> {}",
            item.id, item.title, first, item.current_price
        );
    }
}

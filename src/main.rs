mod cli;

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;

use cli::{Cli, Commands};
use hotel_rates_cli::config::Config;
use hotel_rates_cli::fetch::{
    CollectOptions, CollectOutcome, Collector, HttpPriceSource, PriceSource, QuotaTracker,
};
use hotel_rates_cli::records::SnapshotCache;
use hotel_rates_cli::services;
use hotel_rates_cli::utils::text::{format_money, format_percent};
use hotel_rates_cli::utils::time::format_timestamp;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path).context("Failed to load configuration")?,
        None => Config::load_or_default("config.json")?,
    };

    match cli.command {
        Commands::Collect {
            full,
            concurrency,
            delay_ms,
            no_stop_on_limit,
        } => {
            let options = CollectOptions {
                full_fetch: full,
                stop_on_limit: !no_stop_on_limit,
                concurrency,
                inter_call_delay: Duration::from_millis(delay_ms),
            };
            run_collect(&config, options).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Stats { ref date } => {
            show_stats(&config, parse_date(date)?)?;
        }
        Commands::Rank { ref date } => {
            show_rank(&config, parse_date(date)?)?;
        }
        Commands::Changes { ref from, ref to } => {
            show_changes(&config, parse_date(from)?, parse_date(to)?)?;
        }
        Commands::Alerts { window } => {
            show_alerts(&config, window)?;
        }
        Commands::Demand => {
            show_demand(&config)?;
        }
        Commands::Dates => {
            show_dates(&config)?;
        }
        Commands::Export { ref file } => {
            export_csv(&config, file)?;
        }
        Commands::Reset { yes } => {
            reset_cache(&config, yes)?;
        }
    }

    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'; expected YYYY-MM-DD", raw))
}

fn open_cache(config: &Config) -> Result<SnapshotCache> {
    SnapshotCache::open(&config.store_path)
        .with_context(|| format!("Failed to open snapshot store {}", config.store_path))
}

fn build_source(config: &Config) -> Result<HttpPriceSource> {
    let api_key = config.resolved_api_key()?;
    Ok(HttpPriceSource::new(config.provider.clone(), api_key)?)
}

async fn run_collect(config: &Config, options: CollectOptions) -> Result<()> {
    let dates = config.window.dates()?;
    let source = build_source(config)?;

    let mut quota = QuotaTracker::new();
    match source.account_status().await {
        Ok(status) => quota.apply_status(&status),
        Err(err) => log::warn!("Account status check failed ({}); budget unknown", err),
    }

    println!(
        "Collecting rates for {} dates starting {} ...",
        dates.len(),
        dates.first().map(|d| d.to_string()).unwrap_or_default()
    );

    let collector = Collector::new(source, config.clone(), options);
    let outcome = collector.collect(&dates, &mut quota).await;

    let mut cache = open_cache(config)?;
    cache.merge_all(outcome.accepted.clone());
    cache.save()?;

    report_outcome(&outcome, dates.len(), &quota);
    Ok(())
}

fn report_outcome(outcome: &CollectOutcome, requested: usize, quota: &QuotaTracker) {
    println!();
    println!(
        "{} of {} requested dates collected ({} calls used).",
        outcome.dates_completed, requested, outcome.calls_used
    );

    if !outcome.empty_dates.is_empty() {
        println!(
            "{} dates returned an empty market and were not persisted.",
            outcome.empty_dates.len()
        );
    }

    if !outcome.errors.is_empty() {
        println!("Errors:");
        for error in &outcome.errors {
            println!("  {}: {}", error.date, error.reason);
        }
    }

    if outcome.quota_halted {
        println!(
            "Collection halted on the credit budget; {} dates were skipped.",
            outcome.dates_skipped
        );
    }
    if let Some(remaining) = quota.remaining() {
        println!("Remaining credits: {}", remaining);
    }
}

async fn show_status(config: &Config) -> Result<()> {
    let source = build_source(config)?;
    let status = source.account_status().await?;

    render_table(
        &["Plan limit", "Used", "Remaining"],
        &[vec![
            status.plan_limit.to_string(),
            status.used.to_string(),
            status.remaining.to_string(),
        ]],
    );
    Ok(())
}

fn show_stats(config: &Config, date: NaiveDate) -> Result<()> {
    let cache = open_cache(config)?;
    let Some(stats) = services::date_stats(&cache, date) else {
        println!("No data cached for {}.", date);
        return Ok(());
    };

    render_table(
        &["Date", "Hotels", "Lowest", "Median", "Average", "Highest", "Spread"],
        &[vec![
            date.to_string(),
            stats.count.to_string(),
            format_money(stats.lowest),
            format_money(stats.median),
            format_money(stats.average),
            format_money(stats.highest),
            format_money(stats.spread),
        ]],
    );
    println!("Cheapest: {}   Priciest: {}", stats.cheapest, stats.priciest);
    Ok(())
}

fn show_rank(config: &Config, date: NaiveDate) -> Result<()> {
    let cache = open_cache(config)?;
    if cache.get(date).is_none() {
        println!("No data cached for {}.", date);
        return Ok(());
    }

    match services::market_position(&cache, date, &config.own_property) {
        Some(rank) => {
            let total = cache.get(date).map(|s| s.quotes.len()).unwrap_or(0);
            println!(
                "{} ranks #{} of {} by price on {}.",
                config.own_property.name, rank, total, date
            );
        }
        None => println!(
            "{} has no quote on {}.",
            config.own_property.name, date
        ),
    }
    Ok(())
}

fn show_changes(config: &Config, from: NaiveDate, to: NaiveDate) -> Result<()> {
    let cache = open_cache(config)?;
    let changes = services::rate_changes(&cache, from, to);
    if changes.is_empty() {
        println!("No price changes between {} and {}.", from, to);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = changes
        .iter()
        .map(|change| {
            vec![
                change.name.clone(),
                format_money(change.old_price),
                format_money(change.new_price),
                format_percent(change.percent_change),
            ]
        })
        .collect();
    render_table(&["Hotel", "Old", "New", "Change"], &rows);
    Ok(())
}

fn show_alerts(config: &Config, window: usize) -> Result<()> {
    let cache = open_cache(config)?;
    let alerts = services::price_alerts(&cache, window);
    if alerts.is_empty() {
        println!(
            "No day-over-day moves of {:.0}% or more in the last {} cached dates.",
            services::analytics::RATE_ALERT_THRESHOLD_PCT,
            window
        );
        return Ok(());
    }

    let rows: Vec<Vec<String>> = alerts
        .iter()
        .map(|alert| {
            vec![
                alert.date_from.to_string(),
                alert.date_to.to_string(),
                alert.change.name.clone(),
                format_money(alert.change.old_price),
                format_money(alert.change.new_price),
                format_percent(alert.change.percent_change),
            ]
        })
        .collect();
    render_table(&["From", "To", "Hotel", "Old", "New", "Change"], &rows);
    Ok(())
}

fn show_demand(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    let flagged = services::high_demand_dates(&cache);
    if flagged.is_empty() {
        println!("No high-demand dates in the cache.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = flagged
        .iter()
        .map(|entry| vec![entry.date.to_string(), format_money(entry.average)])
        .collect();
    render_table(&["Date", "Average price"], &rows);
    Ok(())
}

fn show_dates(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    if cache.is_empty() {
        println!("The cache is empty. Run `collect` first.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = cache
        .list_dates()
        .into_iter()
        .filter_map(|date| cache.get(date))
        .map(|snapshot| {
            vec![
                snapshot.date.to_string(),
                snapshot.quotes.len().to_string(),
                if snapshot.partial { "partial" } else { "full" }.to_string(),
                format_timestamp(snapshot.fetched_at),
            ]
        })
        .collect();
    render_table(&["Date", "Hotels", "Coverage", "Fetched at"], &rows);

    if let Some(last) = cache.last_collected_at() {
        println!("Last collection: {}", format_timestamp(last));
    }
    Ok(())
}

fn export_csv(config: &Config, file: &str) -> Result<()> {
    let cache = open_cache(config)?;
    let mut writer = csv::Writer::from_path(file).context("Failed to create CSV writer")?;

    writer.write_record([
        "date", "name", "price", "vendor", "category", "rating", "reviewCount", "partial",
    ])?;

    let mut rows = 0usize;
    for date in cache.list_dates() {
        let Some(snapshot) = cache.get(date) else {
            continue;
        };
        for quote in &snapshot.quotes {
            writer.write_record([
                snapshot.date.to_string(),
                quote.name.clone(),
                quote.price.to_string(),
                quote.vendor.clone().unwrap_or_default(),
                serde_json::to_value(quote.category)?
                    .as_str()
                    .unwrap_or("market")
                    .to_string(),
                quote.rating.map(|r| r.to_string()).unwrap_or_default(),
                quote
                    .review_count
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                snapshot.partial.to_string(),
            ])?;
            rows += 1;
        }
    }

    writer.flush()?;
    println!("Exported {} quotes to {}.", rows, file);
    Ok(())
}

fn reset_cache(config: &Config, yes: bool) -> Result<()> {
    let mut cache = open_cache(config)?;
    if cache.is_empty() {
        println!("The cache is already empty.");
        return Ok(());
    }

    if !yes {
        print!(
            "Drop all {} cached snapshots? (y/n): ",
            cache.len()
        );
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "y" {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    cache.reset()?;
    println!("Cache cleared.");
    Ok(())
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) {
    use unicode_width::UnicodeWidthStr;

    let all_rows: Vec<Vec<String>> =
        std::iter::once(headers.iter().map(|h| h.to_string()).collect())
            .chain(rows.iter().cloned())
            .collect();

    let col_count = all_rows[0].len();
    let mut col_widths = vec![0; col_count];
    for row in &all_rows {
        for (i, cell) in row.iter().enumerate() {
            let width = cell.width();
            if width > col_widths[i] {
                col_widths[i] = width;
            }
        }
    }

    let border = format!(
        "+{}+",
        col_widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    println!("{}", border);
    for (row_idx, row) in all_rows.iter().enumerate() {
        let formatted_row = row
            .iter()
            .zip(&col_widths)
            .map(|(cell, width)| {
                let padding = width - cell.width();
                format!(" {}{} ", cell, " ".repeat(padding))
            })
            .collect::<Vec<_>>()
            .join("|");

        println!("|{}|", formatted_row);
        if row_idx == 0 {
            println!("{}", border);
        }
    }
    println!("{}", border);
}

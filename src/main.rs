use std::str::FromStr;

use crate::comparison::ComparisonSet;
use crate::market::{Asset, SortKey};
use crate::store::Store;

use clap::{arg, Command};
use colored::Colorize;
use serde::Deserialize;
use serde::Serialize;

mod comparison;
mod error;
mod market;
mod store;
mod tui;

#[derive(Serialize, Deserialize)]
struct Config {
    database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "cryptodash_db".to_string(),
        }
    }
}

fn cli() -> Command {
    Command::new("cryptodash_rs")
        .about("A simple crypto market dashboard")
        .arg_required_else_help(true)
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(
            Command::new("list")
                .about("Fetch the top 50 cryptocurrencies and print them as a table")
                .arg(
                    arg!(<SORT> "Sort key: market_cap, name, price or change")
                        .required(false)
                        .default_value(""),
                ),
        )
        .subcommand(
            Command::new("compare")
                .about("Show the saved comparison set side by side")
                .subcommand(Command::new("clear").about("Empty the saved comparison set")),
        )
        .subcommand(Command::new("tui").about("Open the interactive dashboard"))
}

// parses a sort key argument, falling back to fetch order on anything unknown
fn parse_sort_arg(raw: Option<&String>) -> Option<SortKey> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }
    match SortKey::from_str(raw) {
        Ok(key) => Some(key),
        Err(err) => {
            eprintln!("{} {err}, using fetch order", "Warning:".yellow());
            None
        }
    }
}

fn print_listing(assets: &[Asset]) {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement,
        Table,
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Symbol").add_attribute(Attribute::Bold),
        Cell::new("Price").add_attribute(Attribute::Bold),
        Cell::new("24h %").add_attribute(Attribute::Bold),
        Cell::new("Market Cap").add_attribute(Attribute::Bold),
    ]);

    for (i, asset) in assets.iter().enumerate() {
        let change = asset.price_change_percentage_24h;
        let change_cell = match change {
            Some(value) => {
                let c = if value >= 0.0 {
                    TColor::Green
                } else {
                    TColor::Red
                };
                Cell::new(market::format_change(change))
                    .set_alignment(CellAlignment::Right)
                    .fg(c)
            }
            None => Cell::new("-").set_alignment(CellAlignment::Right),
        };

        table.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(&asset.name),
            Cell::new(asset.symbol.to_uppercase()),
            Cell::new(market::format_usd(asset.current_price)).set_alignment(CellAlignment::Right),
            change_cell,
            Cell::new(market::format_market_cap(asset.market_cap))
                .set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");
}

fn print_comparison(cards: &[&Asset]) {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement,
        Table,
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Price").add_attribute(Attribute::Bold),
        Cell::new("24h Change").add_attribute(Attribute::Bold),
        Cell::new("Market Cap").add_attribute(Attribute::Bold),
    ]);

    for asset in cards {
        let change = asset.price_change_percentage_24h;
        let change_cell = match change {
            Some(value) => {
                let c = if value >= 0.0 {
                    TColor::Green
                } else {
                    TColor::Red
                };
                Cell::new(market::format_change(change))
                    .set_alignment(CellAlignment::Right)
                    .fg(c)
            }
            None => Cell::new("-").set_alignment(CellAlignment::Right),
        };

        table.add_row(vec![
            Cell::new(&asset.name),
            Cell::new(market::format_usd(asset.current_price)).set_alignment(CellAlignment::Right),
            change_cell,
            Cell::new(market::format_market_cap(asset.market_cap))
                .set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg: Config = confy::load("cryptodash", "config")?;

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("config", _)) => {
            println!(
                "Your config file is located here: \n{}",
                confy::get_configuration_file_path("cryptodash", "config")?.display()
            );
        }
        Some(("list", sub_matches)) => {
            let sort = parse_sort_arg(sub_matches.try_get_one::<String>("SORT").ok().flatten());
            match market::fetch_markets().await {
                Ok(snapshot) => {
                    // cache the raw snapshot for the next startup
                    if let Ok(store) = Store::open(&cfg.database_path) {
                        store.save_snapshot(&snapshot).ok();
                    }
                    print_listing(&market::sorted(&snapshot, sort));
                }
                Err(e) => eprintln!("{} {e}", "Error fetching market data:".red()),
            }
        }
        Some(("compare", sub_matches)) => {
            let store = Store::open(&cfg.database_path)?;

            if sub_matches.subcommand_matches("clear").is_some() {
                if store.selection_persisted() {
                    store.clear_selection()?;
                    println!("Comparison set cleared.");
                } else {
                    println!("No comparison set saved.");
                }
                return Ok(());
            }

            let set = ComparisonSet::from_ids(store.load_selection());
            if set.is_empty() {
                println!("No cryptocurrencies selected for comparison.");
                return Ok(());
            }

            // a failed fetch falls back to the cached snapshot, if any
            let snapshot = match market::fetch_markets().await {
                Ok(snapshot) => {
                    store.save_snapshot(&snapshot).ok();
                    snapshot
                }
                Err(e) => {
                    eprintln!("{} {e}", "Error fetching market data:".red());
                    store.load_snapshot().unwrap_or_default()
                }
            };

            let cards = set.resolve(&snapshot);
            if cards.is_empty() {
                println!("None of the selected cryptocurrencies are in the current snapshot.");
            } else {
                print_comparison(&cards);
            }
        }
        Some(("tui", _)) => {
            let store = Store::open(&cfg.database_path)?;
            tui::run_tui(store).await?;
        }
        _ => (),
    }

    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use client::{HttpFeed, HttpRemote};
use store::{Money, PurchaseRecord, SyncStore};

use crate::error::Result;

mod config;
mod error;
mod prompt;

#[derive(Parser, Debug)]
#[command(name = "emplette_cli")]
#[command(about = "Track household purchases from the terminal")]
struct Cli {
    /// Optional config file path (TOML).
    #[arg(long)]
    config: Option<String>,
    /// Override base URL (e.g. http://127.0.0.1:3000).
    #[arg(long)]
    base_url: Option<String>,
    /// Override username (password is never read from CLI).
    #[arg(long)]
    username: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every purchase, newest first.
    List,
    /// Record a purchase.
    Add(AddArgs),
    /// Delete a purchase by id.
    Delete(DeleteArgs),
    /// Show totals and the favorite product.
    Stats,
    /// Keep the list on screen, refreshed on every remote change.
    Watch,
}

#[derive(clap::Args, Debug)]
struct AddArgs {
    /// Product name.
    name: String,
    /// Price in euro, e.g. `3.50`.
    price: String,
    /// Purchase date (`YYYY-MM-DD`); today when absent.
    #[arg(long)]
    date: Option<String>,
}

#[derive(clap::Args, Debug)]
struct DeleteArgs {
    id: Uuid,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "emplette_cli=warn,store=warn,client=warn".to_string()),
        )
        .init();

    let mut settings = config::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }
    if let Some(username) = cli.username {
        settings.username = username;
    }

    let password = if settings.password.is_empty() {
        prompt::password("Password: ")?
    } else {
        settings.password.clone()
    };

    let remote = HttpRemote::new(&settings.base_url, &settings.username, &password)?;
    let owner = remote.identity().await?.id;

    match cli.command {
        Command::List => {
            let synced = bind(remote, None, owner).await?;
            print_purchases(&synced.snapshot());
        }
        Command::Add(args) => {
            let price: Money = args.price.parse()?;
            let date = match args.date {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")?,
                None => chrono::Local::now().date_naive(),
            };

            let synced = bind(remote, None, owner).await?;
            let created = synced.insert(&args.name, price, date).await?;
            println!(
                "recorded {} ({}) on {} [{}]",
                created.name, created.price, created.date, created.id
            );
        }
        Command::Delete(args) => {
            let synced = bind(remote, None, owner).await?;
            synced.delete(args.id).await?;
            println!("deleted {}", args.id);
        }
        Command::Stats => {
            let synced = bind(remote, None, owner).await?;
            let totals = synced.totals();
            println!("Purchases:     {}", totals.count);
            println!("Total spent:   {}", totals.total_spent);
            println!("Average price: {:.2}", totals.average_price / 100.0);

            match synced.favorite_product() {
                Some(favorite) => println!(
                    "Favorite:      {} ({} times, {}% of purchases, avg {:.2})",
                    favorite.name,
                    favorite.times_bought,
                    favorite.share_percent,
                    favorite.average_price / 100.0
                ),
                None => println!("Favorite:      -"),
            }
        }
        Command::Watch => {
            let feed = HttpFeed::new(&settings.base_url, &settings.username, &password)?;
            let synced = bind(remote, Some(feed), owner).await?;

            let mut last = synced.snapshot();
            print_purchases(&last);
            loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let current = synced.snapshot();
                if !Arc::ptr_eq(&current, &last) {
                    println!();
                    print_purchases(&current);
                    last = current;
                }
            }
        }
    }

    Ok(())
}

async fn bind(remote: HttpRemote, feed: Option<HttpFeed>, owner: Uuid) -> Result<Arc<SyncStore>> {
    let mut builder = SyncStore::builder().remote(Arc::new(remote));
    if let Some(feed) = feed {
        builder = builder.feed(Arc::new(feed));
    }

    let synced = builder.build()?;
    synced.bind(owner).await?;
    Ok(synced)
}

fn print_purchases(purchases: &[PurchaseRecord]) {
    if purchases.is_empty() {
        println!("no purchases");
        return;
    }

    for purchase in purchases {
        println!(
            "{}  {:>9}  {}  [{}]",
            purchase.date, purchase.price, purchase.name, purchase.id
        );
    }
}

//! akil: browse opportunities and manage bookmarks from the terminal.
//!
//! Usage:
//!   akil opportunities
//!   akil opportunity 65509e9353a7667de6ef5a60
//!   akil verify-email --email me@example.com --otp 1234
//!   akil bookmarks --email me@example.com --password ...
//!   akil toggle ID [ID ...]          # credentials from AKIL_EMAIL / AKIL_PASSWORD

use akil_client::{AkilClient, AkilConfig};
use anyhow::{anyhow, Context};
use bookmark_api::{Opportunity, Session};
use bookmark_store::BookmarkStore;
use chrono::Utc;
use std::sync::Arc;

const FLAGS_WITH_VALUES: &[&str] = &["--email", "--password", "--otp"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "akil=info,bookmark_store=info,akil_client=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or_default();
    let positional = positional_args(&args);

    let config = AkilConfig::from_env();
    tracing::debug!("Using backend {}", config.base_url);
    let client = Arc::new(AkilClient::new(config)?);

    match command {
        "opportunities" => list_opportunities(&client).await,
        "opportunity" => {
            let id = positional
                .first()
                .ok_or_else(|| anyhow!("opportunity needs an id"))?;
            show_opportunity(&client, id).await
        }
        "verify-email" => {
            let email = flag_value(&args, "--email").unwrap_or_default();
            let otp = flag_value(&args, "--otp").unwrap_or_default();
            client.verify_email(&email, &otp).await?;
            println!("E-mail verified, you can sign in now.");
            Ok(())
        }
        "bookmarks" => {
            let session = sign_in(&client, &args).await?;
            list_bookmarks(&client, &session).await
        }
        "toggle" => {
            if positional.is_empty() {
                return Err(anyhow!("toggle needs at least one opportunity id"));
            }
            let session = sign_in(&client, &args).await?;
            let store = Arc::new(BookmarkStore::new(client.clone()));
            store.start_session(session).await;
            toggle_all(&store, positional).await;
            store.end_session();
            Ok(())
        }
        _ => {
            eprintln!("Usage:");
            eprintln!("  akil opportunities                     List published opportunities");
            eprintln!("  akil opportunity ID                    Show one opportunity");
            eprintln!("  akil verify-email --email E --otp CODE Confirm a new account");
            eprintln!("  akil bookmarks                         List your bookmarks");
            eprintln!("  akil toggle ID [ID ...]                Bookmark / un-bookmark");
            eprintln!("");
            eprintln!("Options:");
            eprintln!("  --email E       Sign-in e-mail (default: $AKIL_EMAIL)");
            eprintln!("  --password P    Sign-in password (default: $AKIL_PASSWORD)");
            eprintln!("");
            eprintln!("Backend: $AKIL_BASE_URL (default: {})", akil_client::DEFAULT_BASE_URL);
            std::process::exit(1);
        }
    }
}

async fn sign_in(client: &AkilClient, args: &[String]) -> anyhow::Result<Session> {
    let email = flag_value(args, "--email")
        .or_else(|| std::env::var("AKIL_EMAIL").ok())
        .unwrap_or_default();
    let password = flag_value(args, "--password")
        .or_else(|| std::env::var("AKIL_PASSWORD").ok())
        .unwrap_or_default();

    client
        .login(&email, &password)
        .await
        .context("sign-in failed")
}

async fn list_opportunities(client: &AkilClient) -> anyhow::Result<()> {
    let opportunities = client.list_opportunities().await?;
    let now = Utc::now();

    for opp in &opportunities {
        let closed = if opp.is_closed(now) { " (closed)" } else { "" };
        println!("{}  {} - {}{}", opp.id, opp.title, opp.org_name, closed);
    }
    tracing::info!("{} opportunities", opportunities.len());
    Ok(())
}

async fn show_opportunity(client: &AkilClient, id: &str) -> anyhow::Result<()> {
    match client.get_opportunity(id).await? {
        Some(opp) => print_opportunity(&opp),
        None => println!("Opportunity {} not found", id),
    }
    Ok(())
}

fn print_opportunity(opp: &Opportunity) {
    println!("{}", opp.title);
    println!("{} ({})", opp.org_name, opp.op_type);
    if !opp.locations.is_empty() {
        println!("Location: {}", opp.locations.join(", "));
    }
    if opp.is_rolling {
        println!("Deadline: rolling");
    } else if !opp.deadline.is_empty() {
        println!("Deadline: {}", opp.deadline);
    }
    if !opp.categories.is_empty() {
        println!("Categories: {}", opp.categories.join(", "));
    }
    println!();
    println!("{}", opp.description);
    if !opp.responsibilities.is_empty() {
        println!();
        println!("Responsibilities:");
        for line in &opp.responsibilities {
            println!("  - {}", line);
        }
    }
    if !opp.required_skills.is_empty() {
        println!();
        println!("Skills: {}", opp.required_skills.join(", "));
    }
}

async fn list_bookmarks(client: &AkilClient, session: &Session) -> anyhow::Result<()> {
    let records = client.list_bookmarks(session).await?;
    for record in &records {
        let when = record
            .bookmarked_at()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{}  {} - {}  {}",
            record.opportunity_id, record.title, record.org_name, when
        );
    }
    tracing::info!("{} bookmarks", records.len());
    Ok(())
}

async fn toggle_all(store: &Arc<BookmarkStore>, ids: Vec<String>) {
    let mut handles = Vec::with_capacity(ids.len());

    for id in ids {
        let store = Arc::clone(store);
        let handle = tokio::spawn(async move {
            let result = store.toggle_bookmark(&id).await;
            (id, result)
        });
        handles.push(handle);
    }

    for handle in handles {
        match handle.await {
            Ok((id, Ok(true))) => println!("{}  bookmarked", id),
            Ok((id, Ok(false))) => println!("{}  removed", id),
            Ok((id, Err(e))) => eprintln!("{}  failed: {}", id, e),
            Err(e) => tracing::warn!("Toggle task panicked: {}", e),
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Arguments after the command that are neither flags nor flag values.
fn positional_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if FLAGS_WITH_VALUES.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(arg.clone());
        }
    }
    out
}

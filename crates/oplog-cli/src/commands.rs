use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::Value;

use oplog_core::{fetch_all, Entry, FetchOptions, Log, Rejection};
use oplog_types::BlockId;

use crate::cli::*;
use crate::workspace::Workspace;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let ws = Workspace::open(&cli.root, cli.concurrency)?;
    match cli.command {
        Command::Identity(args) => cmd_identity(&ws, args),
        Command::Append(args) => cmd_append(&ws, args).await,
        Command::Join(args) => cmd_join(&ws, args).await,
        Command::Show(args) => cmd_show(&ws, args).await,
        Command::Fetch(args) => cmd_fetch(&ws, args).await,
    }
}

fn cmd_identity(ws: &Workspace, args: IdentityArgs) -> anyhow::Result<()> {
    match args.action {
        IdentityAction::New { id, force } => {
            let identity = ws.create_identity(&id, force)?;
            println!("{} Created identity {}", "✓".green().bold(), id.yellow());
            println!("  Public key: {}", identity.public_key.to_hex().cyan());
        }
        IdentityAction::Show { id } => {
            let identity = ws.identity(&id)?;
            println!("{}  {}", id.yellow().bold(), identity.public_key.to_hex().cyan());
        }
    }
    Ok(())
}

async fn cmd_append(ws: &Workspace, args: AppendArgs) -> anyhow::Result<()> {
    let ctx = ws.context(&args.identity)?;
    let mut log = match (&args.from, &args.log) {
        (Some(reference), expected) => {
            let log = Log::from_reference(ctx, parse_hash(reference)?, None).await?;
            if let Some(expected) = expected {
                if log.id() != expected {
                    bail!("reference points at log '{}', not '{expected}'", log.id());
                }
            }
            report_rejections(log.rejected());
            log
        }
        (None, Some(id)) => Log::new(ctx, id.clone()),
        (None, None) => bail!("either --log or --from is required"),
    };

    for raw in &args.payloads {
        let entry = log.append(parse_payload(raw)).await?;
        println!("  {} {}", "appended".green(), describe(&entry));
    }

    let reference = log.to_reference().await?;
    println!(
        "{} Log {} now has {} entries",
        "✓".green().bold(),
        log.id().yellow(),
        log.len()
    );
    println!("  Reference: {}", reference.to_hex().cyan());
    Ok(())
}

async fn cmd_join(ws: &Workspace, args: JoinArgs) -> anyhow::Result<()> {
    let ctx = ws.context(&args.identity)?;
    let mut hashes = args.references.iter().map(|r| parse_hash(r));
    let first = hashes.next().context("no references given")??;

    let mut log = Log::from_reference(ctx.clone(), first, None).await?;
    report_rejections(log.rejected());
    for hash in hashes {
        let other = Log::from_reference(ctx.clone(), hash?, None).await?;
        let report = log.join(&other)?;
        println!(
            "  {} {} entries ({} new)",
            "joined".green(),
            other.len().to_string().bold(),
            report.added
        );
        report_rejections(&report.rejected);
    }

    let reference = log.to_reference().await?;
    println!(
        "{} Log {}: {} entries, {} heads",
        "✓".green().bold(),
        log.id().yellow(),
        log.len(),
        log.heads().len()
    );
    println!("  Reference: {}", reference.to_hex().cyan());
    Ok(())
}

async fn cmd_show(ws: &Workspace, args: ShowArgs) -> anyhow::Result<()> {
    let ctx = ws.reader_context()?;
    let log = Log::from_reference(ctx, parse_hash(&args.reference)?, args.limit).await?;

    println!(
        "Log {}  ({} entries, {} heads)",
        log.id().yellow().bold(),
        log.len(),
        log.heads().len()
    );
    if args.tree {
        print!("{}", log.render());
    } else {
        for entry in log.iter() {
            println!("  {}", describe(entry));
        }
    }
    if !log.tail_hashes().is_empty() && args.limit.is_some() {
        let more: Vec<String> = log.tail_hashes().iter().map(|h| h.short_hex()).collect();
        println!("  {} {}", "more before:".dimmed(), more.join(" ").dimmed());
    }
    report_rejections(log.rejected());
    Ok(())
}

async fn cmd_fetch(ws: &Workspace, args: FetchArgs) -> anyhow::Result<()> {
    let roots = args
        .hashes
        .iter()
        .map(|h| parse_hash(h))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut options = FetchOptions::new()
        .with_concurrency(ws.config().fetch_concurrency)
        .with_allow_partial(args.partial);
    if let Some(limit) = args.limit {
        options = options.with_max_length(limit);
    }

    let mut outcome = fetch_all(ws.store(), &roots, &options).await?;
    outcome.entries.sort();
    for entry in &outcome.entries {
        println!("  {}", describe(entry));
    }
    println!("{} Fetched {} entries", "✓".green().bold(), outcome.entries.len());
    for hash in &outcome.missing {
        println!("  {} {}", "missing:".yellow(), hash.to_hex());
    }
    report_rejections(&outcome.rejected);
    Ok(())
}

fn report_rejections(rejected: &[Rejection]) {
    for r in rejected {
        println!("  {} {}", "rejected:".red().bold(), r);
    }
}

fn describe(entry: &Entry) -> String {
    format!(
        "{} {} {} {}",
        entry.hash().short_hex().yellow(),
        entry.clock().to_string().dimmed(),
        entry.identity().id.to_string().blue(),
        entry.payload()
    )
}

/// Interpret a payload argument: JSON when it parses, otherwise a plain string.
fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_hash(raw: &str) -> anyhow::Result<BlockId> {
    BlockId::from_hex(raw.trim()).with_context(|| format!("'{raw}' is not a block hash"))
}

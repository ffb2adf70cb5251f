use anyhow::Result;
use byki_migrate::{
    cli::{init_logging, ConnectionArgs},
    migrate::{check_batch_limit, DEFAULT_BATCH_LIMIT},
    rollback::{rollback_owner, RollbackOutcome},
    throttle::Throttle,
    CollectionName, OwnerId,
};
use clap::Parser;
use console::style;
use std::process::ExitCode;

/// Delete migrated data under users/{OWNER_ID}/.
///
/// Only the owner's scoped collections are removed; the global collections
/// are never touched.
#[derive(Parser, Debug)]
#[command(version, long_version = byki_migrate::build::CLAP_LONG_VERSION, about)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Owner whose migrated collections are removed
    owner_id: String,

    /// Deletes per atomic batch, at most 500
    #[arg(long, default_value_t = DEFAULT_BATCH_LIMIT)]
    batch_limit: usize,

    /// Pause between collections
    #[arg(long, default_value = "100ms")]
    delay: humantime::Duration,

    /// Only these collections (repeatable)
    #[arg(long = "collection", value_enum)]
    collections: Vec<CollectionName>,
}

async fn run(args: &Cli) -> Result<(OwnerId, Vec<(CollectionName, RollbackOutcome)>)> {
    check_batch_limit(args.batch_limit)?;
    let connection = args.connection.connect()?;
    let owner = connection.owner(Some(&args.owner_id)).await?;
    let collections = if args.collections.is_empty() {
        CollectionName::ALL.to_vec()
    } else {
        args.collections.clone()
    };
    tracing::info!("Rolling back {} collection(s) of {}", collections.len(), owner);
    let results = rollback_owner(
        &connection.store,
        &owner,
        &collections,
        args.batch_limit,
        Throttle::fixed(*args.delay),
    )
    .await;
    Ok((owner, results))
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = Cli::parse();

    let (owner, results) = match run(&args).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Rollback failed: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Owner: {}", owner);
    println!("{:<16}{:>10}", "Collection", "Deleted");
    let mut ok = true;
    for (collection, outcome) in &results {
        println!("{:<16}{:>10}", collection.as_str(), outcome.deleted_count);
        for error in &outcome.errors {
            ok = false;
            println!("    {}", error);
        }
    }
    let total: usize = results.iter().map(|(_, o)| o.deleted_count).sum();
    println!("{:<16}{:>10}", "Total", total);
    if ok {
        println!("{}", style("Rollback completed").green().bold());
        ExitCode::SUCCESS
    } else {
        println!("{}", style("Rollback completed with errors").red().bold());
        ExitCode::FAILURE
    }
}

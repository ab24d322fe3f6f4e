//! dataset-rs: walk a windowed page cache over an in-memory record source.

use clap::Parser;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use dataset_rs::{Args, Dataset, DatasetConfig, DatasetError, MemorySource, StoreSummary};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Parse command-line arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => DatasetConfig::from_json_file(path).map_err(report)?,
        None => DatasetConfig::from(&args),
    };

    let records: Vec<String> = (0..args.total_records)
        .map(|i| format!("record-{}", i))
        .collect();
    let source = MemorySource::new(records)
        .with_latency(Duration::from_millis(args.latency_ms))
        .with_stats(!args.known_total);
    for &page in &args.fail_pages {
        source.fail_page(page);
    }

    let mut builder = Dataset::builder().config(config).source(source);
    if let Some(keep_every) = args.keep_every.filter(|&n| n > 0) {
        builder = builder.filter(move |record: &String| {
            record
                .rsplit('-')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .is_some_and(|n| n % keep_every == 0)
        });
    }
    let dataset = builder.build().map_err(report)?;

    for &offset in &args.offsets {
        info!("Moving read offset to {}", offset);
        dataset.set_read_offset(offset);
        dataset.idle().await;

        let snapshot = dataset.snapshot();
        let summary = snapshot.summary();
        print_summary(&summary, args.json)?;

        if let Some(record) = snapshot.get_record(offset) {
            info!(
                "Record {} -> {}",
                offset,
                record.content().map(String::as_str).unwrap_or("<not loaded>")
            );
        }
    }

    info!(
        "Done: {} fetches, {} pages still leased",
        dataset.source().fetch_count(),
        dataset.source().total_leases()
    );

    Ok(())
}

/// Logs a setup error, pointing configuration mistakes at the flags.
fn report(err: DatasetError) -> DatasetError {
    if err.code.is_fatal() {
        error!(code = err.code.as_str(), "Invalid dataset configuration: {}", err.message);
    } else {
        error!(code = err.code.as_str(), "Failed to set up dataset: {}", err.message);
    }
    err
}

fn print_summary(
    summary: &StoreSummary,
    json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
    } else {
        println!(
            "offset={:?} length={} pages={} (first {:?}) unrequested={} pending={} resolved={} rejected={}",
            summary.read_offset,
            summary.length,
            summary.page_count,
            summary.first_page,
            summary.unrequested,
            summary.pending,
            summary.resolved,
            summary.rejected
        );
    }
    Ok(())
}

//! Command-line entry point: list or extract one entry of a remote ZIP.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;

use zipfetch::archive::ProgressSender;
use zipfetch::cli::OutputTarget;
use zipfetch::{ArchiveEntry, Cli, EntryExtractor, ReadAt, RemoteRangeSource};

const PROGRESS_CAPACITY: usize = 16;

const PB_STYLE: &str =
    "[{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let source = RemoteRangeSource::connect(cli.remote_config())
        .await
        .with_context(|| format!("Unable to create reader for url: {}", cli.url))?;
    let source = Arc::new(source);
    let extractor = EntryExtractor::new(source.clone());

    if cli.list {
        for entry in extractor.list_entries().await? {
            println!("{}", entry.name);
        }
        return Ok(());
    }

    let name = cli
        .remote_file
        .as_deref()
        .context("You must specify a remote filename")?;
    let entry = extractor.find_entry(name).await?;
    let target = cli.output_target(name)?;
    info!(
        "extracting {} ({} compressed, {} uncompressed)",
        entry.name, entry.compressed_size, entry.uncompressed_size
    );

    let written = if cli.verbose {
        extract_with_progress(&extractor, &entry, &target).await?
    } else {
        extract(&extractor, &entry, &target, None).await?
    };

    if cli.verbose {
        eprintln!(
            "Wrote {}; transferred {} from {} in {} requests",
            HumanBytes(written),
            HumanBytes(source.transferred_bytes()),
            source.url(),
            source.request_count()
        );
    }

    Ok(())
}

async fn extract<R: ReadAt>(
    extractor: &EntryExtractor<R>,
    entry: &ArchiveEntry,
    target: &OutputTarget,
    progress: Option<&ProgressSender>,
) -> Result<u64> {
    match target {
        OutputTarget::Stdout => extractor.extract_to_stdout(entry, progress).await,
        OutputTarget::File(path) => extractor.extract_to_file(entry, path, progress).await,
    }
}

/// Run the extraction while a separate task renders its progress.
async fn extract_with_progress<R: ReadAt>(
    extractor: &EntryExtractor<R>,
    entry: &ArchiveEntry,
    target: &OutputTarget,
) -> Result<u64> {
    let (tx, rx) = mpsc::channel(PROGRESS_CAPACITY);
    let reporter = tokio::spawn(report_progress(rx, entry.uncompressed_size));

    let result = extract(extractor, entry, target, Some(&tx)).await;

    // closing the channel ends the reporter
    drop(tx);
    reporter.await?;

    result
}

async fn report_progress(mut rx: mpsc::Receiver<u64>, total: u64) {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(PB_STYLE) {
        bar.set_style(style.progress_chars("=> "));
    }

    while let Some(done) = rx.recv().await {
        bar.set_position(done);
    }

    bar.finish();
}

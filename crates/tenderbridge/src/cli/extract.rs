use std::path::Path;

use anyhow::{bail, Context, Result};

use tenderbridge_core::{
    ExtractionConfig, ExtractionStats, NoticePipeline, NormalizedRecord, StaticSuggestions,
    Storage, UpsertOutcome,
};

use super::ExtractArgs;

pub async fn run(config: &ExtractionConfig, args: &ExtractArgs) -> Result<()> {
    if args.url.is_some() && args.paths.len() > 1 {
        bail!("--url only applies to a single file");
    }

    let mut pipeline = NoticePipeline::from_config(config)?;
    if let Some(path) = &args.suggestions {
        let provider = StaticSuggestions::from_file(path)
            .with_context(|| format!("loading suggestions {}", path.display()))?;
        tracing::debug!("Loaded {} canned suggestions", provider.len());
        pipeline = pipeline.with_provider(Box::new(provider));
    }

    let storage = match &args.db {
        Some(path) => Some(
            Storage::open(&path.to_string_lossy())
                .await
                .with_context(|| format!("opening database {}", path.display()))?,
        ),
        None => None,
    };

    let mut stats = ExtractionStats::new();
    let mut emitted = 0usize;

    for path in &args.paths {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let source_url = source_url_for(path, args)?;

        let record = match pipeline.process(&source_url, &html, &mut stats).await {
            Ok(record) => record,
            Err(e) => {
                eprintln!("Skipped {}: {e}", path.display());
                continue;
            }
        };

        if !record.has_parties() {
            tracing::warn!("No buyer or winner in {}, not storing", record.notice_id);
            stats.skipped += 1;
            continue;
        }

        print_record(&record, args.pretty)?;
        emitted += 1;

        if let Some(storage) = &storage {
            match storage.upsert_award(&record).await? {
                UpsertOutcome::Inserted | UpsertOutcome::Updated => stats.saved += 1,
                UpsertOutcome::Unchanged => stats.unchanged += 1,
            }
        }
    }

    print_summary(&stats);

    if emitted == 0 && stats.errors() > 0 {
        bail!("no records extracted");
    }
    Ok(())
}

fn source_url_for(path: &Path, args: &ExtractArgs) -> Result<String> {
    if let Some(url) = &args.url {
        return Ok(url.clone());
    }

    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        bail!("cannot derive a notice URL from {}", path.display());
    };
    Ok(format!("{}{stem}", args.base_url))
}

fn print_record(record: &NormalizedRecord, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(record)?
    } else {
        serde_json::to_string(record)?
    };
    println!("{json}");
    Ok(())
}

fn print_summary(stats: &ExtractionStats) {
    eprintln!("Parsed: {}", stats.parsed);
    eprintln!("  Missing id: {}", stats.identity_missing);
    eprintln!("  Skipped (no parties): {}", stats.skipped);
    eprintln!(
        "  Roles: {} promoted, {} swapped, {} winner discarded",
        stats.promoted, stats.swapped, stats.winner_discarded
    );
    eprintln!(
        "  Suggestions: {} unavailable, {} rejected",
        stats.suggestion_unavailable, stats.suggestion_rejected
    );
    eprintln!(
        "  Issues: {} sections widened, {} malformed values",
        stats.sections_widened, stats.malformed_values
    );
    if stats.saved > 0 || stats.unchanged > 0 {
        eprintln!("  Stored: {} saved, {} unchanged", stats.saved, stats.unchanged);
    }
}

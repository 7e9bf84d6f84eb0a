use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ai::{build_providers, CredentialManager};
use crate::categorize::{CategoryCache, CategoryNormalizer, CategoryVocabulary, ProviderChain};
use crate::cli::RunArgs;
use crate::config::{parse_provider_list, Settings};
use crate::jobs::{CategorizeRun, RunReport};
use crate::mover::DirectoryMover;

/// `plugsort run`
pub async fn run(config: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut settings = super::load_settings(config)?;
    apply_overrides(&mut settings, &args);
    settings.validate()?;

    let vocabulary = CategoryVocabulary::load_or_builtin(settings.vocabulary_path().as_deref())?;
    let credentials = CredentialManager::from_env(&settings.api_keys);
    let providers = build_providers(&settings, &credentials, &vocabulary)?;
    if providers.is_empty() {
        warn!("No providers available, items will be placed by keyword or the default category");
    }

    let normalizer = Arc::new(CategoryNormalizer::new(
        Arc::new(vocabulary),
        settings.confidence_threshold,
        settings.max_total_categories,
    ));
    let mut chain = ProviderChain::new(providers, normalizer, settings.default_label()?);

    let cache_path = if settings.use_cache { settings.cache_path() } else { None };
    if let Some(path) = &cache_path {
        let cache = CategoryCache::load(path)?;
        info!(path = %path.display(), entries = cache.len(), "Loaded category cache");
        chain = chain.with_cache(Arc::new(cache));
    }
    let chain = Arc::new(chain);

    let mover = DirectoryMover::new(settings.conflict_policy).dry_run(args.dry_run);
    let job = CategorizeRun::new(&settings, Arc::clone(&chain), Arc::new(mover))?
        .skip_existing(args.skip_existing)
        .with_progress(Box::new(|done, total| {
            eprint!("\rSorted {}/{}", done, total);
            let _ = std::io::stderr().flush();
        }));

    let cancel = job.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, letting in-flight items finish");
            cancel.cancel();
        }
    });

    let report = job.execute().await?;
    eprintln!();

    if let (Some(cache), Some(path)) = (chain.cache(), &cache_path) {
        if !args.dry_run {
            cache.save(path)?;
        }
    }
    if let Some(path) = &args.export {
        report
            .export_json(path)
            .with_context(|| format!("Failed to export report to {}", path.display()))?;
    }

    print_summary(&report);
    Ok(())
}

/// Command-line flags win over file and environment
fn apply_overrides(settings: &mut Settings, args: &RunArgs) {
    if let Some(source) = &args.source {
        settings.source_dir = Some(source.clone());
    }
    if let Some(dest) = &args.dest {
        settings.dest_dir = Some(dest.clone());
    }
    if let Some(list) = &args.providers {
        settings.providers_enabled = parse_provider_list(list);
    }
    if let Some(size) = args.batch_size {
        settings.batch_size = size;
    }
    for (id, rpm) in &args.rpm {
        settings.requests_per_minute.insert(id.clone(), *rpm);
    }
    if let Some(category) = &args.default_category {
        settings.default_category = category.clone();
    }
    if let Some(threshold) = args.threshold {
        settings.confidence_threshold = threshold;
    }
    if let Some(max) = args.max_categories {
        settings.max_total_categories = max;
    }
    if args.no_cache {
        settings.use_cache = false;
    }
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    println!(
        "{} {} -> {}",
        if report.dry_run { "Dry run" } else { "Sorted" },
        report.source_dir.display(),
        report.dest_dir.display()
    );
    println!("  processed       {}", summary.processed);
    println!("  moved           {}", summary.moved);
    println!("  skipped         {}", summary.skipped);
    println!("  failed          {}", summary.failed);
    println!("  duplicate risk  {}", summary.duplicate_risk);
    println!("  default         {}", summary.defaulted);
    if summary.cancelled > 0 {
        println!("  cancelled       {}", summary.cancelled);
    }

    for record in report.records.iter().filter(|r| r.error_detail().is_some() && !report.dry_run) {
        println!(
            "  ! {} ({:?}): {}",
            record.source_path().display(),
            record.outcome(),
            record.error_detail().unwrap_or_default()
        );
    }

    for entry in &report.provider_stats {
        println!(
            "  {:<12} attempts {:>4}  ok {:>4}  failed {:>4}  unmatched {:>4}{}",
            entry.provider_id,
            entry.stats.attempts,
            entry.stats.successes,
            entry.stats.failures,
            entry.stats.misses,
            if entry.stats.disabled { "  (disabled)" } else { "" }
        );
    }
}

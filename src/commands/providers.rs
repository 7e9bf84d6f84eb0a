use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::ai::{build_providers, mask_key, CredentialManager, KeyStore, KeychainStore, ProviderId};
use crate::categorize::{CategoryNormalizer, CategoryVocabulary};
use crate::cli::ProviderAction;
use crate::config::Settings;

/// Name sent by `providers test`
const SAMPLE_NAME: &str = "contact-form-7";

/// `plugsort providers ...`
pub async fn run(config: Option<&Path>, action: ProviderAction) -> Result<()> {
    match action {
        ProviderAction::SetKey { id } => set_key(&KeychainStore, &id, &mut io::stdin().lock()),
        ProviderAction::RemoveKey { id } => remove_key(&KeychainStore, &id),
        ProviderAction::List => {
            let settings = super::load_settings(config)?;
            list(&settings, &CredentialManager::from_env(&settings.api_keys))
        }
        ProviderAction::Test { id } => {
            let settings = super::load_settings(config)?;
            let credentials = CredentialManager::from_env(&settings.api_keys);
            test(settings, &credentials, id).await
        }
    }
}

fn keyed_provider(id: &str) -> Result<ProviderId> {
    let id: ProviderId = id.parse()?;
    if !id.requires_key() {
        bail!("{} does not use an API key", id);
    }
    Ok(id)
}

/// Read one line from `input` and store it as the key for `id`
fn set_key(store: &dyn KeyStore, id: &str, input: &mut impl BufRead) -> Result<()> {
    let id = keyed_provider(id)?;

    eprint!("API key for {}: ", id);
    io::stderr().flush().ok();
    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read API key")?;
    let key = line.trim();
    if key.is_empty() {
        bail!("No API key given");
    }

    store.store_api_key(id, key)?;
    println!("Stored {} key {} in the keychain", id, mask_key(key));
    if let Some(var) = id.env_var().filter(|var| std::env::var_os(var).is_some()) {
        println!("Note: {} is set and takes precedence", var);
    }
    Ok(())
}

fn remove_key(store: &dyn KeyStore, id: &str) -> Result<()> {
    let id = keyed_provider(id)?;
    if store.delete_api_key(id)? {
        println!("Removed {} key from the keychain", id);
    } else {
        println!("No {} key in the keychain", id);
    }
    Ok(())
}

fn list(settings: &Settings, credentials: &CredentialManager) -> Result<()> {
    let enabled: Vec<ProviderId> = settings
        .providers_enabled
        .iter()
        .filter_map(|id| id.parse().ok())
        .collect();

    println!("{:<12} {:<8} {:<6} {:<14} model", "provider", "enabled", "rpm", "key");
    for id in ProviderId::all() {
        let model = settings
            .models
            .get(&id.to_string())
            .or_else(|| settings.models.get(id.model_key()))
            .map(String::as_str)
            .or(id.default_model())
            .unwrap_or("-");
        let position = enabled
            .iter()
            .position(|e| *e == id)
            .map(|p| format!("#{}", p + 1))
            .unwrap_or_else(|| "no".to_string());
        println!(
            "{:<12} {:<8} {:<6} {:<14} {}",
            id.to_string(),
            position,
            settings.rate_limit_for(id),
            credentials.source(id).to_string(),
            model
        );
    }
    Ok(())
}

/// One real request per provider, reporting the raw answer and its label
async fn test(mut settings: Settings, credentials: &CredentialManager, id: Option<String>) -> Result<()> {
    if let Some(id) = id {
        let id: ProviderId = id.parse()?;
        settings.providers_enabled = vec![id.to_string()];
    }
    settings.validate()?;

    let vocabulary = CategoryVocabulary::load_or_builtin(settings.vocabulary_path().as_deref())?;
    let providers = build_providers(&settings, credentials, &vocabulary)?;
    if providers.is_empty() {
        bail!("No provider could be built; check API keys with `plugsort providers list`");
    }
    let normalizer = CategoryNormalizer::new(
        Arc::new(vocabulary),
        settings.confidence_threshold,
        settings.max_total_categories,
    );

    for provider in providers {
        debug!(provider = %provider.id(), name = SAMPLE_NAME, "Testing provider");
        match provider.categorize(SAMPLE_NAME).await {
            Ok(result) => {
                let label = normalizer
                    .normalize(&result.raw_text, SAMPLE_NAME)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "(no match)".to_string());
                println!("{:<12} ok      {:?} -> {}", provider.id(), result.raw_text, label);
            }
            Err(failure) => {
                println!("{:<12} failed  {}", provider.id(), failure);
            }
        }
    }
    Ok(())
}

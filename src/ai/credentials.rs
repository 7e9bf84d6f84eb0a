//! API key lookup
//!
//! Keys are resolved in this order: environment variable, OS keychain, then
//! the `api_keys` map in settings. Nothing is compiled in.

use keyring::Entry;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use super::providers::ProviderId;
use crate::error::{Result, SorterError};

const SERVICE_NAME: &str = "plugsort";

/// Where an API key was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    Keychain,
    SettingsFile,
    NotRequired,
    Missing,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CredentialSource::Environment => "environment",
            CredentialSource::Keychain => "keychain",
            CredentialSource::SettingsFile => "settings file",
            CredentialSource::NotRequired => "not required",
            CredentialSource::Missing => "missing",
        };
        f.write_str(text)
    }
}

/// Persistent per-provider key storage
pub trait KeyStore: Send + Sync {
    fn get_api_key(&self, id: ProviderId) -> Option<String>;

    fn store_api_key(&self, id: ProviderId, api_key: &str) -> Result<()>;

    /// Returns false when there was nothing to delete
    fn delete_api_key(&self, id: ProviderId) -> Result<bool>;
}

/// The platform credential store, one entry per provider id
#[derive(Debug, Clone, Copy, Default)]
pub struct KeychainStore;

impl KeychainStore {
    fn entry(id: ProviderId) -> Result<Entry> {
        let account = id.to_string();
        Entry::new(SERVICE_NAME, &account).map_err(|e| SorterError::keychain(account, e))
    }
}

impl KeyStore for KeychainStore {
    fn get_api_key(&self, id: ProviderId) -> Option<String> {
        let entry = Self::entry(id).ok()?;
        match entry.get_password() {
            Ok(key) => Some(key),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(provider = %id, error = %e, "Keychain unavailable");
                None
            }
        }
    }

    fn store_api_key(&self, id: ProviderId, api_key: &str) -> Result<()> {
        Self::entry(id)?
            .set_password(api_key)
            .map_err(|e| SorterError::keychain(id.to_string(), e))?;
        info!(provider = %id, "Stored API key in keychain");
        Ok(())
    }

    fn delete_api_key(&self, id: ProviderId) -> Result<bool> {
        match Self::entry(id)?.delete_credential() {
            Ok(()) => {
                info!(provider = %id, "Deleted API key from keychain");
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(SorterError::keychain(id.to_string(), e)),
        }
    }
}

/// Credential lookup: environment, then keychain, then the settings map
///
/// Keys are resolved once at construction and injected into providers; nothing
/// reads the environment or the keychain after start-up.
#[derive(Debug, Clone, Default)]
pub struct CredentialManager {
    env_keys: HashMap<ProviderId, String>,
    keychain_keys: HashMap<ProviderId, String>,
    file_keys: HashMap<ProviderId, String>,
}

impl CredentialManager {
    /// Capture keys from the process environment, the OS keychain and the settings map
    pub fn from_env(file_keys: &HashMap<String, String>) -> Self {
        Self::load(|var| std::env::var(var).ok(), &KeychainStore, file_keys)
    }

    /// The keychain is only asked for providers the environment does not cover
    pub fn load(
        env: impl Fn(&str) -> Option<String>,
        store: &dyn KeyStore,
        file_keys: &HashMap<String, String>,
    ) -> Self {
        let mut env_keys = HashMap::new();
        let mut keychain_keys = HashMap::new();
        for id in ProviderId::all().into_iter().filter(ProviderId::requires_key) {
            match id.env_var().and_then(|var| env(&var)).filter(|v| !v.trim().is_empty()) {
                Some(key) => {
                    env_keys.insert(id, key);
                }
                None => {
                    if let Some(key) = store.get_api_key(id) {
                        keychain_keys.insert(id, key);
                    }
                }
            }
        }
        Self::from_maps(env_keys, keychain_keys, parse_file_keys(file_keys))
    }

    pub fn from_maps(
        env_keys: HashMap<ProviderId, String>,
        keychain_keys: HashMap<ProviderId, String>,
        file_keys: HashMap<ProviderId, String>,
    ) -> Self {
        let clean = |map: HashMap<ProviderId, String>| {
            map.into_iter()
                .map(|(id, key)| (id, key.trim().to_string()))
                .filter(|(_, key)| !key.is_empty())
                .collect()
        };
        Self {
            env_keys: clean(env_keys),
            keychain_keys: clean(keychain_keys),
            file_keys: clean(file_keys),
        }
    }

    /// Get the API key for a provider, if one is configured
    pub fn get_api_key(&self, id: ProviderId) -> Option<&str> {
        self.env_keys
            .get(&id)
            .or_else(|| self.keychain_keys.get(&id))
            .or_else(|| self.file_keys.get(&id))
            .map(String::as_str)
    }

    pub fn has_api_key(&self, id: ProviderId) -> bool {
        !id.requires_key() || self.get_api_key(id).is_some()
    }

    pub fn source(&self, id: ProviderId) -> CredentialSource {
        if !id.requires_key() {
            CredentialSource::NotRequired
        } else if self.env_keys.contains_key(&id) {
            CredentialSource::Environment
        } else if self.keychain_keys.contains_key(&id) {
            CredentialSource::Keychain
        } else if self.file_keys.contains_key(&id) {
            CredentialSource::SettingsFile
        } else {
            CredentialSource::Missing
        }
    }
}

/// Settings keys that do not name a provider are ignored
fn parse_file_keys(file_keys: &HashMap<String, String>) -> HashMap<ProviderId, String> {
    file_keys
        .iter()
        .filter_map(|(name, key)| name.parse::<ProviderId>().ok().map(|id| (id, key.clone())))
        .collect()
}

/// Show only the last four characters of a key
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory stand-in for the OS keychain
    #[derive(Default)]
    struct MemoryStore(Mutex<HashMap<ProviderId, String>>);

    impl KeyStore for MemoryStore {
        fn get_api_key(&self, id: ProviderId) -> Option<String> {
            self.0.lock().unwrap().get(&id).cloned()
        }

        fn store_api_key(&self, id: ProviderId, api_key: &str) -> Result<()> {
            self.0.lock().unwrap().insert(id, api_key.to_string());
            Ok(())
        }

        fn delete_api_key(&self, id: ProviderId) -> Result<bool> {
            Ok(self.0.lock().unwrap().remove(&id).is_some())
        }
    }

    #[test]
    fn test_environment_wins_over_file() {
        let creds = CredentialManager::from_maps(
            HashMap::from([(ProviderId::Anthropic, "env-key".to_string())]),
            HashMap::new(),
            HashMap::from([
                (ProviderId::Anthropic, "file-key".to_string()),
                (ProviderId::Cohere, "cohere-file".to_string()),
            ]),
        );
        assert_eq!(creds.get_api_key(ProviderId::Anthropic), Some("env-key"));
        assert_eq!(creds.source(ProviderId::Anthropic), CredentialSource::Environment);
        assert_eq!(creds.get_api_key(ProviderId::Cohere), Some("cohere-file"));
        assert_eq!(creds.source(ProviderId::Cohere), CredentialSource::SettingsFile);
        assert_eq!(creds.get_api_key(ProviderId::OpenAi), None);
    }

    #[test]
    fn test_blank_keys_are_missing() {
        let creds = CredentialManager::from_maps(
            HashMap::from([(ProviderId::OpenAi, "   ".to_string())]),
            HashMap::new(),
            HashMap::new(),
        );
        assert!(!creds.has_api_key(ProviderId::OpenAi));
        assert_eq!(creds.source(ProviderId::OpenAi), CredentialSource::Missing);
    }

    #[test]
    fn test_keyless_provider_is_always_available() {
        let creds = CredentialManager::default();
        assert!(creds.has_api_key(ProviderId::DuckDuckGo));
        assert_eq!(creds.source(ProviderId::DuckDuckGo), CredentialSource::NotRequired);
    }

    #[test]
    fn test_file_keys_with_unknown_names_are_ignored() {
        let file = HashMap::from([
            ("gemini_2".to_string(), "g2".to_string()),
            ("bogus".to_string(), "x".to_string()),
        ]);
        let parsed = parse_file_keys(&file);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get(&ProviderId::Gemini(2)).map(String::as_str), Some("g2"));
    }

    #[test]
    fn test_keychain_sits_between_environment_and_file() {
        let store = MemoryStore::default();
        store.store_api_key(ProviderId::Anthropic, "keychain-anthropic").unwrap();
        store.store_api_key(ProviderId::Cohere, "keychain-cohere").unwrap();
        let file = HashMap::from([
            ("cohere".to_string(), "file-cohere".to_string()),
            ("openai".to_string(), "file-openai".to_string()),
        ]);
        let env = |var: &str| (var == "ANTHROPIC_API_KEY").then(|| "env-anthropic".to_string());

        let creds = CredentialManager::load(env, &store, &file);

        assert_eq!(creds.get_api_key(ProviderId::Anthropic), Some("env-anthropic"));
        assert_eq!(creds.source(ProviderId::Anthropic), CredentialSource::Environment);
        assert_eq!(creds.get_api_key(ProviderId::Cohere), Some("keychain-cohere"));
        assert_eq!(creds.source(ProviderId::Cohere), CredentialSource::Keychain);
        assert_eq!(creds.get_api_key(ProviderId::OpenAi), Some("file-openai"));
        assert_eq!(creds.source(ProviderId::OpenAi), CredentialSource::SettingsFile);
        assert_eq!(creds.source(ProviderId::Gemini(3)), CredentialSource::Missing);
    }

    #[test]
    fn test_deleted_keychain_key_is_no_longer_found() {
        let store = MemoryStore::default();
        store.store_api_key(ProviderId::Gemini(2), "g2").unwrap();
        assert!(store.delete_api_key(ProviderId::Gemini(2)).unwrap());
        assert!(!store.delete_api_key(ProviderId::Gemini(2)).unwrap());

        let creds = CredentialManager::load(|_| None, &store, &HashMap::new());
        assert!(!creds.has_api_key(ProviderId::Gemini(2)));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdef1234"), "****1234");
        assert_eq!(mask_key("abc"), "****");
    }
}

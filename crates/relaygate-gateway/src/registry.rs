//! Adapter registry — the single source of truth for installed adapters.
//!
//! Manifests are written by the external install tool as one TOML file
//! per adapter under the configured directory. The registry loads them at
//! startup and serves concurrent lookups; mutations go through explicit
//! register/remove calls and are serialized. The manager never caches a
//! resolution beyond one request.

use crate::error::{GatewayError, GatewayResult};
use relaygate_codec::ServiceKind;
use relaygate_proto::ProtocolKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// How to start an adapter process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Executable to run.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, `NAME=value`.
    #[serde(default)]
    pub env: Vec<String>,
}

/// An installed adapter's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterManifest {
    /// Platform name, e.g. "gmail".
    pub name: String,
    /// Single-byte shortcode used in envelopes to target this platform.
    pub shortcode: char,
    /// Semantic shape this platform delivers.
    pub service: ServiceKind,
    /// Capability family the adapter implements.
    pub protocol: ProtocolKind,
    /// Launch command for the adapter process.
    pub launch: LaunchSpec,
    /// Declared capability strings, informational.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Manifest schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    1
}

/// Thread-safe registry of installed adapters.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: Arc<RwLock<HashMap<String, AdapterManifest>>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manifest. Idempotent for an identical manifest;
    /// conflicting manifests under the same name are rejected — callers
    /// wanting an update must remove-then-register.
    pub fn register(&self, manifest: AdapterManifest) -> GatewayResult<()> {
        let mut adapters = self.adapters.write().unwrap_or_else(|e| e.into_inner());
        match adapters.get(&manifest.name) {
            Some(existing) if *existing == manifest => {
                debug!(adapter = %manifest.name, "Manifest already registered, no-op");
                Ok(())
            }
            Some(_) => Err(GatewayError::AlreadyExists(manifest.name.clone())),
            None => {
                info!(adapter = %manifest.name, protocol = %manifest.protocol, "Registered adapter");
                adapters.insert(manifest.name.clone(), manifest);
                Ok(())
            }
        }
    }

    /// Look a manifest up by platform name.
    pub fn lookup(&self, name: &str) -> GatewayResult<AdapterManifest> {
        let adapters = self.adapters.read().unwrap_or_else(|e| e.into_inner());
        adapters
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))
    }

    /// Look a manifest up by envelope shortcode. The error lists the
    /// installed shortcodes to aid diagnosis.
    pub fn lookup_shortcode(&self, shortcode: u8) -> GatewayResult<AdapterManifest> {
        let adapters = self.adapters.read().unwrap_or_else(|e| e.into_inner());
        if let Some(manifest) = adapters
            .values()
            .find(|m| m.shortcode as u32 == shortcode as u32)
        {
            return Ok(manifest.clone());
        }
        let mut available: Vec<String> = adapters
            .values()
            .map(|m| format!("'{}' for {}", m.shortcode, m.name))
            .collect();
        available.sort();
        Err(GatewayError::UnknownPlatform(format!(
            "no platform found for shortcode '{}'; available shortcodes: {}",
            shortcode as char,
            available.join(", ")
        )))
    }

    /// Remove an adapter.
    pub fn remove(&self, name: &str) -> GatewayResult<AdapterManifest> {
        let mut adapters = self.adapters.write().unwrap_or_else(|e| e.into_inner());
        adapters
            .remove(name)
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))
    }

    /// Snapshot of all manifests, sorted by name.
    pub fn list(&self) -> Vec<AdapterManifest> {
        let adapters = self.adapters.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = adapters.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn count(&self) -> usize {
        let adapters = self.adapters.read().unwrap_or_else(|e| e.into_inner());
        adapters.len()
    }

    /// Load every `*.toml` manifest from a directory. Unparseable files
    /// are skipped with a warning. Returns the number loaded.
    pub fn load_dir(&self, dir: &Path) -> GatewayResult<usize> {
        if !dir.exists() {
            info!(dir = %dir.display(), "Adapters directory not found, starting empty");
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            match toml::from_str::<AdapterManifest>(&contents) {
                Ok(manifest) => match self.register(manifest) {
                    Ok(()) => loaded += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping conflicting manifest"),
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse adapter manifest");
                }
            }
        }
        info!(count = loaded, dir = %dir.display(), "Loaded adapter manifest(s)");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str, shortcode: char, protocol: ProtocolKind) -> AdapterManifest {
        AdapterManifest {
            name: name.to_string(),
            shortcode,
            service: ServiceKind::Text,
            protocol,
            launch: LaunchSpec {
                command: format!("{name}-adapter"),
                args: vec![],
                env: vec![],
            },
            capabilities: BTreeSet::new(),
            schema_version: 1,
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = AdapterRegistry::new();
        registry
            .register(manifest("twitter", 't', ProtocolKind::Event))
            .unwrap();
        let found = registry.lookup("twitter").unwrap();
        assert_eq!(found.shortcode, 't');
        assert!(matches!(
            registry.lookup("gmail"),
            Err(GatewayError::NotFound(_))
        ));
    }

    #[test]
    fn identical_reregistration_is_noop() {
        let registry = AdapterRegistry::new();
        let m = manifest("twitter", 't', ProtocolKind::Event);
        registry.register(m.clone()).unwrap();
        registry.register(m).unwrap();
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn conflicting_reregistration_is_rejected() {
        let registry = AdapterRegistry::new();
        registry
            .register(manifest("twitter", 't', ProtocolKind::Event))
            .unwrap();
        let err = registry
            .register(manifest("twitter", 'x', ProtocolKind::Event))
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists(_)));
        // Remove-then-register is the update path.
        registry.remove("twitter").unwrap();
        registry
            .register(manifest("twitter", 'x', ProtocolKind::Event))
            .unwrap();
        assert_eq!(registry.lookup("twitter").unwrap().shortcode, 'x');
    }

    #[test]
    fn shortcode_lookup_lists_available_on_miss() {
        let registry = AdapterRegistry::new();
        registry
            .register(manifest("gmail", 'g', ProtocolKind::OAuth2))
            .unwrap();
        let found = registry.lookup_shortcode(b'g').unwrap();
        assert_eq!(found.name, "gmail");
        let err = registry.lookup_shortcode(b'z').unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'z'"));
        assert!(text.contains("'g' for gmail"));
    }

    #[test]
    fn manifest_toml_roundtrip() {
        let m = AdapterManifest {
            name: "telegram".into(),
            shortcode: 'T',
            service: ServiceKind::Message,
            protocol: ProtocolKind::Pnba,
            launch: LaunchSpec {
                command: "telegram-adapter".into(),
                args: vec!["--stdio".into()],
                env: vec!["TG_API_ID=1".into()],
            },
            capabilities: ["send_message".to_string()].into_iter().collect(),
            schema_version: 2,
        };
        let text = toml::to_string_pretty(&m).unwrap();
        let back: AdapterManifest = toml::from_str(&text).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn load_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let m = manifest("mastodon", 'm', ProtocolKind::OAuth2);
        std::fs::write(
            dir.path().join("mastodon.toml"),
            toml::to_string_pretty(&m).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not a manifest").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = AdapterRegistry::new();
        let loaded = registry.load_dir(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(registry.lookup("mastodon").unwrap(), m);
    }

    #[test]
    fn list_is_sorted() {
        let registry = AdapterRegistry::new();
        registry
            .register(manifest("twitter", 't', ProtocolKind::Event))
            .unwrap();
        registry
            .register(manifest("gmail", 'g', ProtocolKind::OAuth2))
            .unwrap();
        let names: Vec<_> = registry.list().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["gmail", "twitter"]);
    }
}

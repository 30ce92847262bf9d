//! Provider and capability catalog.
//!
//! The catalog is produced once by an ingestion step and is read-only for the
//! rest of a session. Providers keep their file order (which is also their share
//! code index); capabilities are indexed in ascending key order.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hasher;
use thiserror::Error;
use twox_hash::XxHash64;

/// Stable string key of a provider.
pub type ProviderKey = String;
/// Stable string key of a capability.
pub type CapabilityKey = String;

/// An atomic production unit a provider can offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub key: CapabilityKey,
    #[serde(default)]
    pub name: String,
    /// Display grouping only; never consulted by coverage logic.
    #[serde(default)]
    pub group: Option<String>,
}

/// A prestige good a provider unlocks for one of its capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrestigeGood {
    pub name: String,
    pub capability: CapabilityKey,
}

/// A selectable entity offering base capabilities plus an exclusive charter menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub key: ProviderKey,
    #[serde(default)]
    pub name: String,
    /// Capabilities always contributed when selected.
    #[serde(default)]
    pub base: BTreeSet<CapabilityKey>,
    /// Optional capabilities; at most one may be active per selection.
    #[serde(default)]
    pub charters: BTreeSet<CapabilityKey>,
    /// Free providers never consume budget.
    #[serde(default)]
    pub free: bool,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub prestige_goods: Vec<PrestigeGood>,
}

impl Provider {
    /// Whether `capability` is on this provider's charter menu.
    #[must_use]
    pub fn has_charter(&self, capability: &str) -> bool {
        self.charters.contains(capability)
    }

    /// Whether this provider can contribute `capability` in any way.
    #[must_use]
    pub fn offers(&self, capability: &str) -> bool {
        self.base.contains(capability) || self.charters.contains(capability)
    }

    /// Prestige good attached to `capability`, if any.
    #[must_use]
    pub fn prestige_good_for(&self, capability: &str) -> Option<&PrestigeGood> {
        self.prestige_goods
            .iter()
            .find(|good| good.capability == capability)
    }

    fn referenced_capabilities(&self) -> impl Iterator<Item = &CapabilityKey> {
        self.base
            .iter()
            .chain(self.charters.iter())
            .chain(self.prestige_goods.iter().map(|good| &good.capability))
    }
}

/// Errors raised while building a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate provider key: {0}")]
    DuplicateProvider(ProviderKey),
    #[error("duplicate capability key: {0}")]
    DuplicateCapability(CapabilityKey),
    #[error("empty {kind} key")]
    EmptyKey { kind: &'static str },
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    capabilities: Vec<Capability>,
    #[serde(default)]
    providers: Vec<Provider>,
}

/// Read-only table of providers and the capabilities they can offer.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    providers: Vec<Provider>,
    provider_index: HashMap<ProviderKey, usize>,
    capabilities: Vec<Capability>,
    capability_index: HashMap<CapabilityKey, usize>,
}

impl Catalog {
    /// Build a catalog from providers and declared capabilities.
    ///
    /// Capabilities referenced by a provider but not declared are added with
    /// their key as display name.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate or empty keys.
    pub fn new(
        providers: Vec<Provider>,
        capabilities: Vec<Capability>,
    ) -> Result<Self, CatalogError> {
        let mut declared: BTreeMap<CapabilityKey, Capability> = BTreeMap::new();
        for mut capability in capabilities {
            if capability.key.is_empty() {
                return Err(CatalogError::EmptyKey { kind: "capability" });
            }
            if capability.name.is_empty() {
                capability.name.clone_from(&capability.key);
            }
            if declared.contains_key(&capability.key) {
                return Err(CatalogError::DuplicateCapability(capability.key));
            }
            declared.insert(capability.key.clone(), capability);
        }

        let mut provider_index = HashMap::with_capacity(providers.len());
        let mut normalized = Vec::with_capacity(providers.len());
        for (idx, mut provider) in providers.into_iter().enumerate() {
            if provider.key.is_empty() {
                return Err(CatalogError::EmptyKey { kind: "provider" });
            }
            if provider.name.is_empty() {
                provider.name.clone_from(&provider.key);
            }
            if provider_index.insert(provider.key.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateProvider(provider.key));
            }
            for key in provider.referenced_capabilities() {
                if key.is_empty() {
                    return Err(CatalogError::EmptyKey { kind: "capability" });
                }
                declared.entry(key.clone()).or_insert_with(|| Capability {
                    key: key.clone(),
                    name: key.clone(),
                    group: None,
                });
            }
            normalized.push(provider);
        }

        let capabilities: Vec<Capability> = declared.into_values().collect();
        let capability_index = capabilities
            .iter()
            .enumerate()
            .map(|(idx, capability)| (capability.key.clone(), idx))
            .collect();

        Ok(Self {
            providers: normalized,
            provider_index,
            capabilities,
            capability_index,
        })
    }

    /// Load a catalog from its JSON ingestion format.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or keys are duplicated.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.providers, file.capabilities)
    }

    /// All providers in catalog order.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// All capabilities in ascending key order.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    #[must_use]
    pub fn provider(&self, key: &str) -> Option<&Provider> {
        self.provider_index
            .get(key)
            .and_then(|idx| self.providers.get(*idx))
    }

    #[must_use]
    pub fn capability(&self, key: &str) -> Option<&Capability> {
        self.capability_index
            .get(key)
            .and_then(|idx| self.capabilities.get(*idx))
    }

    #[must_use]
    pub fn contains_provider(&self, key: &str) -> bool {
        self.provider_index.contains_key(key)
    }

    #[must_use]
    pub fn contains_capability(&self, key: &str) -> bool {
        self.capability_index.contains_key(key)
    }

    /// Position of a provider in catalog order.
    #[must_use]
    pub fn provider_index(&self, key: &str) -> Option<usize> {
        self.provider_index.get(key).copied()
    }

    #[must_use]
    pub fn provider_at(&self, index: usize) -> Option<&Provider> {
        self.providers.get(index)
    }

    /// Position of a capability in ascending key order.
    #[must_use]
    pub fn capability_index(&self, key: &str) -> Option<usize> {
        self.capability_index.get(key).copied()
    }

    #[must_use]
    pub fn capability_at(&self, index: usize) -> Option<&Capability> {
        self.capabilities.get(index)
    }

    /// Capability keys belonging to a display group.
    #[must_use]
    pub fn capabilities_in_group(&self, group: &str) -> Vec<&CapabilityKey> {
        self.capabilities
            .iter()
            .filter(|capability| capability.group.as_deref() == Some(group))
            .map(|capability| &capability.key)
            .collect()
    }

    /// Provider keys belonging to a display group.
    #[must_use]
    pub fn providers_in_group(&self, group: &str) -> Vec<&ProviderKey> {
        self.providers
            .iter()
            .filter(|provider| provider.group.as_deref() == Some(group))
            .map(|provider| &provider.key)
            .collect()
    }

    /// Whether any provider has a prestige good attached to `capability`.
    #[must_use]
    pub fn offers_prestige(&self, capability: &str) -> bool {
        self.providers
            .iter()
            .any(|provider| provider.prestige_good_for(capability).is_some())
    }

    /// Capabilities that at least one prestige good is attached to.
    #[must_use]
    pub fn prestige_capabilities(&self) -> BTreeSet<&CapabilityKey> {
        self.providers
            .iter()
            .flat_map(|provider| provider.prestige_goods.iter())
            .map(|good| &good.capability)
            .collect()
    }

    /// Case-insensitive substring search over provider key, name, group, and
    /// offered capabilities. An empty query matches every provider.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Provider> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.providers.iter().collect();
        }
        let hit = |text: &str| text.to_lowercase().contains(&needle);
        self.providers
            .iter()
            .filter(|provider| {
                hit(&provider.key)
                    || hit(&provider.name)
                    || provider.group.as_deref().is_some_and(hit)
                    || provider.base.iter().any(|key| hit(key))
                    || provider.charters.iter().any(|key| hit(key))
            })
            .collect()
    }

    /// Stable 64-bit fingerprint over provider and capability keys in index order.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        for provider in &self.providers {
            hasher.write(provider.key.as_bytes());
            hasher.write_u8(0x1F);
        }
        hasher.write_u8(0x1E);
        for capability in &self.capabilities {
            hasher.write(capability.key.as_bytes());
            hasher.write_u8(0x1F);
        }
        hasher.finish()
    }
}

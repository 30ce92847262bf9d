//! Enabled targets, enabled providers, priority marks, and required prestige goods.
//!
//! Anything outside the enabled sets is invisible to coverage and optimization.
//! Filtering is a view concern: it never touches the selection.
use std::collections::BTreeSet;

use crate::catalog::{CapabilityKey, Catalog, ProviderKey};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    capabilities: BTreeSet<CapabilityKey>,
    providers: BTreeSet<ProviderKey>,
    priority: BTreeSet<CapabilityKey>,
    required_prestige: BTreeSet<CapabilityKey>,
}

impl FilterState {
    /// Every capability and provider in the catalog enabled, no priorities.
    #[must_use]
    pub fn all(catalog: &Catalog) -> Self {
        Self {
            capabilities: catalog
                .capabilities()
                .iter()
                .map(|c| c.key.clone())
                .collect(),
            providers: catalog.providers().iter().map(|p| p.key.clone()).collect(),
            priority: BTreeSet::new(),
            required_prestige: BTreeSet::new(),
        }
    }

    /// Build from explicit sets, keeping only priority marks on enabled targets.
    #[must_use]
    pub fn from_parts(
        capabilities: BTreeSet<CapabilityKey>,
        providers: BTreeSet<ProviderKey>,
        priority: BTreeSet<CapabilityKey>,
    ) -> Self {
        let priority = priority
            .into_iter()
            .filter(|key| capabilities.contains(key))
            .collect();
        Self {
            capabilities,
            providers,
            priority,
            required_prestige: BTreeSet::new(),
        }
    }

    /// Enabled capability keys (the target set).
    #[must_use]
    pub const fn targets(&self) -> &BTreeSet<CapabilityKey> {
        &self.capabilities
    }

    #[must_use]
    pub const fn enabled_providers(&self) -> &BTreeSet<ProviderKey> {
        &self.providers
    }

    #[must_use]
    pub const fn priority(&self) -> &BTreeSet<CapabilityKey> {
        &self.priority
    }

    /// Capabilities whose prestige good the selection must supply.
    #[must_use]
    pub const fn required_prestige(&self) -> &BTreeSet<CapabilityKey> {
        &self.required_prestige
    }

    #[must_use]
    pub fn is_target(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    #[must_use]
    pub fn is_provider_enabled(&self, provider: &str) -> bool {
        self.providers.contains(provider)
    }

    #[must_use]
    pub fn is_priority(&self, capability: &str) -> bool {
        self.priority.contains(capability)
    }

    /// Enable or disable a capability. Unknown keys are ignored.
    /// Returns whether the filter changed.
    pub fn set_capability(&mut self, catalog: &Catalog, capability: &str, enabled: bool) -> bool {
        if !catalog.contains_capability(capability) {
            return false;
        }
        if enabled {
            self.capabilities.insert(capability.to_string())
        } else {
            self.priority.remove(capability);
            self.capabilities.remove(capability)
        }
    }

    /// Flip a capability; returns the new enabled state.
    pub fn toggle_capability(&mut self, catalog: &Catalog, capability: &str) -> bool {
        let enabled = !self.is_target(capability);
        self.set_capability(catalog, capability, enabled);
        self.is_target(capability)
    }

    /// Enable or disable a provider. Unknown keys are ignored.
    pub fn set_provider(&mut self, catalog: &Catalog, provider: &str, enabled: bool) -> bool {
        if !catalog.contains_provider(provider) {
            return false;
        }
        if enabled {
            self.providers.insert(provider.to_string())
        } else {
            self.providers.remove(provider)
        }
    }

    /// Flip a provider; returns the new enabled state.
    pub fn toggle_provider(&mut self, catalog: &Catalog, provider: &str) -> bool {
        let enabled = !self.is_provider_enabled(provider);
        self.set_provider(catalog, provider, enabled);
        self.is_provider_enabled(provider)
    }

    /// Flip the priority mark on an enabled target.
    /// Returns `false` (and leaves the mark unset) when the capability is not enabled.
    pub fn toggle_priority(&mut self, capability: &str) -> bool {
        if self.priority.remove(capability) {
            return false;
        }
        if !self.is_target(capability) {
            return false;
        }
        self.priority.insert(capability.to_string());
        true
    }

    /// Require the prestige good attached to `capability`. Capabilities no
    /// provider has a prestige good for are ignored.
    pub fn require_prestige(&mut self, catalog: &Catalog, capability: &str) -> bool {
        catalog.offers_prestige(capability)
            && self.required_prestige.insert(capability.to_string())
    }

    /// Flip the requirement on a prestige good; returns whether it is now required.
    pub fn toggle_prestige(&mut self, catalog: &Catalog, capability: &str) -> bool {
        if self.required_prestige.remove(capability) {
            return false;
        }
        self.require_prestige(catalog, capability)
    }

    /// Require every prestige good in the catalog; returns how many were added.
    pub fn require_all_prestige(&mut self, catalog: &Catalog) -> usize {
        catalog
            .prestige_capabilities()
            .into_iter()
            .filter(|key| self.required_prestige.insert((*key).clone()))
            .count()
    }

    pub fn clear_prestige(&mut self) {
        self.required_prestige.clear();
    }

    /// Enable or disable every capability in a display group.
    /// Returns how many capabilities changed state.
    pub fn set_capability_group(&mut self, catalog: &Catalog, group: &str, enabled: bool) -> usize {
        catalog
            .capabilities_in_group(group)
            .into_iter()
            .filter(|key| self.set_capability(catalog, key, enabled))
            .count()
    }

    /// Enable or disable every provider in a display group.
    pub fn set_provider_group(&mut self, catalog: &Catalog, group: &str, enabled: bool) -> usize {
        catalog
            .providers_in_group(group)
            .into_iter()
            .filter(|key| self.set_provider(catalog, key, enabled))
            .count()
    }

    /// Disable every capability (and with them every priority mark).
    pub fn clear_capabilities(&mut self) {
        self.capabilities.clear();
        self.priority.clear();
    }

    /// Back to everything enabled, no priorities, no prestige requirements.
    pub fn reset(&mut self, catalog: &Catalog) {
        *self = Self::all(catalog);
    }
}

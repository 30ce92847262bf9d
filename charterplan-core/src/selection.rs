//! Selected providers and their charter choices.
//!
//! Per provider the selection moves through `Unselected -> Selected ->
//! Selected+Charter`. References the catalog does not know are ignored; the
//! filter state is never consulted here.
use std::collections::BTreeMap;

use crate::catalog::{CapabilityKey, Catalog, ProviderKey};

/// Per-provider state relative to a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderState<'a> {
    Unselected,
    Selected,
    SelectedWithCharter(&'a str),
}

/// Outcome of a charter transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharterChange {
    /// The charter became active on a provider that had none.
    Chosen,
    /// The charter replaced a different active charter.
    Replaced { previous: CapabilityKey },
    /// Re-issuing the active charter turned it off.
    Cleared,
    /// The transition was not applicable; nothing changed.
    Ignored(CharterRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharterRejection {
    UnknownProvider,
    NotSelected,
    NotOffered,
}

/// Explicit caller confirmation for destructive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    Yes,
    No,
}

/// Ordered selected providers plus at most one charter per selected provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    providers: Vec<ProviderKey>,
    charters: BTreeMap<ProviderKey, CapabilityKey>,
}

impl Selection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected providers in display order.
    #[must_use]
    pub fn providers(&self) -> &[ProviderKey] {
        &self.providers
    }

    /// Active charter per provider.
    #[must_use]
    pub const fn charters(&self) -> &BTreeMap<ProviderKey, CapabilityKey> {
        &self.charters
    }

    #[must_use]
    pub fn contains(&self, provider: &str) -> bool {
        self.providers.iter().any(|key| key == provider)
    }

    #[must_use]
    pub fn charter_of(&self, provider: &str) -> Option<&CapabilityKey> {
        self.charters.get(provider)
    }

    #[must_use]
    pub fn state_of(&self, provider: &str) -> ProviderState<'_> {
        if !self.contains(provider) {
            return ProviderState::Unselected;
        }
        self.charter_of(provider)
            .map_or(ProviderState::Selected, |charter| {
                ProviderState::SelectedWithCharter(charter)
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Number of selected providers that consume budget.
    #[must_use]
    pub fn paid_count(&self, catalog: &Catalog) -> usize {
        self.providers
            .iter()
            .filter(|key| catalog.provider(key).is_some_and(|p| !p.free))
            .count()
    }

    /// `Unselected -> Selected`. Returns whether the selection changed.
    pub fn select(&mut self, catalog: &Catalog, provider: &str) -> bool {
        if !catalog.contains_provider(provider) || self.contains(provider) {
            return false;
        }
        self.providers.push(provider.to_string());
        true
    }

    /// `Selected | Selected+Charter -> Unselected`, dropping any charter with it.
    pub fn deselect(&mut self, provider: &str) -> bool {
        let before = self.providers.len();
        self.providers.retain(|key| key != provider);
        self.charters.remove(provider);
        self.providers.len() != before
    }

    /// Flip a provider between selected and unselected; returns the new state.
    pub fn toggle(&mut self, catalog: &Catalog, provider: &str) -> bool {
        if self.contains(provider) {
            self.deselect(provider);
            false
        } else {
            self.select(catalog, provider)
        }
    }

    /// Activate `charter` on a selected provider. Re-issuing the active charter
    /// turns it off; a different active charter is replaced.
    pub fn choose_charter(
        &mut self,
        catalog: &Catalog,
        provider: &str,
        charter: &str,
    ) -> CharterChange {
        let Some(entry) = catalog.provider(provider) else {
            return CharterChange::Ignored(CharterRejection::UnknownProvider);
        };
        if !self.contains(provider) {
            return CharterChange::Ignored(CharterRejection::NotSelected);
        }
        if !entry.has_charter(charter) {
            return CharterChange::Ignored(CharterRejection::NotOffered);
        }
        match self.charters.insert(provider.to_string(), charter.to_string()) {
            None => CharterChange::Chosen,
            Some(previous) if previous == charter => {
                self.charters.remove(provider);
                CharterChange::Cleared
            }
            Some(previous) => CharterChange::Replaced { previous },
        }
    }

    /// Drop the active charter of a provider, if any.
    pub fn clear_charter(&mut self, provider: &str) -> Option<CapabilityKey> {
        self.charters.remove(provider)
    }

    /// Move the provider at `from` to position `to`. Out-of-range indices are a no-op.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.providers.len() || to >= self.providers.len() {
            return false;
        }
        if from != to {
            let key = self.providers.remove(from);
            self.providers.insert(to, key);
        }
        true
    }

    /// Empty the selection. Requires `Confirm::Yes`; returns how many providers were removed.
    pub fn clear(&mut self, confirm: Confirm) -> usize {
        if confirm == Confirm::No {
            return 0;
        }
        let removed = self.providers.len();
        self.providers.clear();
        self.charters.clear();
        removed
    }
}

//! Coverage engine: covered set, marginal gains, and overlaps.
//!
//! Every function here is a pure read over catalog, filter, and selection.
//! Providers outside the enabled-provider set and capabilities outside the
//! target set do not participate.
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{CapabilityKey, Catalog, Provider, ProviderKey};
use crate::filter::FilterState;
use crate::selection::Selection;

/// How a provider contributes to a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionKind {
    Base,
    Charter,
}

/// Result of looking up one (provider, capability) pair for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "capability")]
pub enum CapabilitySource {
    None,
    Base,
    /// The capability is the provider's active charter.
    Charter,
    /// Only a prestige good links the provider to this capability.
    SpecialBonus(CapabilityKey),
}

/// Classify how `provider` relates to `capability` under the current selection.
#[must_use]
pub fn source_for(
    provider: &Provider,
    selection: &Selection,
    capability: &str,
) -> CapabilitySource {
    if provider.base.contains(capability) {
        return CapabilitySource::Base;
    }
    if selection
        .charter_of(&provider.key)
        .is_some_and(|charter| charter == capability)
    {
        return CapabilitySource::Charter;
    }
    provider
        .prestige_good_for(capability)
        .map_or(CapabilitySource::None, |good| {
            CapabilitySource::SpecialBonus(good.capability.clone())
        })
}

/// Capabilities a provider contributes with the given charter, restricted to targets.
#[must_use]
pub fn contribution(
    provider: &Provider,
    charter: Option<&str>,
    filter: &FilterState,
) -> BTreeSet<CapabilityKey> {
    let mut set: BTreeSet<CapabilityKey> = provider
        .base
        .iter()
        .filter(|key| filter.is_target(key))
        .cloned()
        .collect();
    if let Some(charter) = charter.filter(|c| provider.has_charter(c) && filter.is_target(c)) {
        set.insert(charter.to_string());
    }
    set
}

fn visible_selected<'a>(
    catalog: &'a Catalog,
    filter: &'a FilterState,
    selection: &'a Selection,
) -> impl Iterator<Item = &'a Provider> + 'a {
    selection
        .providers()
        .iter()
        .filter(|key| filter.is_provider_enabled(key))
        .filter_map(|key| catalog.provider(key))
}

/// Union of every visible selected provider's base capabilities and active
/// charter, restricted to the target set.
#[must_use]
pub fn covered_set(
    catalog: &Catalog,
    filter: &FilterState,
    selection: &Selection,
) -> BTreeSet<CapabilityKey> {
    let mut covered = BTreeSet::new();
    for provider in visible_selected(catalog, filter, selection) {
        let charter = selection.charter_of(&provider.key).map(String::as_str);
        covered.extend(contribution(provider, charter, filter));
    }
    covered
}

/// Capabilities whose prestige good some visible selected provider supplies.
#[must_use]
pub fn prestige_supplied(
    catalog: &Catalog,
    filter: &FilterState,
    selection: &Selection,
) -> BTreeSet<CapabilityKey> {
    visible_selected(catalog, filter, selection)
        .flat_map(|provider| provider.prestige_goods.iter())
        .map(|good| good.capability.clone())
        .collect()
}

/// New coverage a candidate would add.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarginalGain {
    pub base: usize,
    pub charter: usize,
    /// Lowest-keyed charter achieving `charter`, when it is non-zero.
    pub best_charter: Option<CapabilityKey>,
}

impl MarginalGain {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.base + self.charter
    }
}

/// Marginal gain of `provider` against `covered`.
///
/// Base capabilities always count. At most one charter contributes, and none
/// does when `charter_granted` says the provider already used its pick.
#[must_use]
pub fn marginal_gain(
    provider: &Provider,
    filter: &FilterState,
    covered: &BTreeSet<CapabilityKey>,
    charter_granted: bool,
) -> MarginalGain {
    let base = provider
        .base
        .iter()
        .filter(|key| filter.is_target(key) && !covered.contains(*key))
        .count();
    let best_charter = if charter_granted {
        None
    } else {
        provider
            .charters
            .iter()
            .find(|key| {
                filter.is_target(key) && !covered.contains(*key) && !provider.base.contains(*key)
            })
            .cloned()
    };
    MarginalGain {
        base,
        charter: usize::from(best_charter.is_some()),
        best_charter,
    }
}

/// Marginal gain row for one unselected provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderGain {
    pub provider: ProviderKey,
    pub free: bool,
    pub gain: MarginalGain,
}

/// Marginal gains for every enabled, unselected provider in catalog order.
#[must_use]
pub fn marginal_gains(
    catalog: &Catalog,
    filter: &FilterState,
    selection: &Selection,
) -> Vec<ProviderGain> {
    let covered = covered_set(catalog, filter, selection);
    catalog
        .providers()
        .iter()
        .filter(|p| filter.is_provider_enabled(&p.key) && !selection.contains(&p.key))
        .map(|p| ProviderGain {
            provider: p.key.clone(),
            free: p.free,
            gain: marginal_gain(p, filter, &covered, false),
        })
        .collect()
}

/// Value of one entry on a provider's charter menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharterOption {
    pub charter: CapabilityKey,
    pub new_coverage: usize,
    pub active: bool,
}

/// New coverage each charter of `provider` would add, given everything else
/// covered, including the provider's own base capabilities but not its
/// currently active charter.
#[must_use]
pub fn charter_options(
    catalog: &Catalog,
    filter: &FilterState,
    selection: &Selection,
    provider: &str,
) -> Vec<CharterOption> {
    let Some(entry) = catalog.provider(provider) else {
        return Vec::new();
    };
    let mut without = selection.clone();
    let active = without.clear_charter(provider);
    let mut covered = covered_set(catalog, filter, &without);
    covered.extend(contribution(entry, None, filter));
    entry
        .charters
        .iter()
        .map(|charter| CharterOption {
            charter: charter.clone(),
            new_coverage: usize::from(filter.is_target(charter) && !covered.contains(charter)),
            active: active.as_deref() == Some(charter.as_str()),
        })
        .collect()
}

/// One (provider, contribution type) pair behind a covered capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contributor {
    pub provider: ProviderKey,
    pub kind: ContributionKind,
}

/// A capability contributed more than once by the current selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overlap {
    pub capability: CapabilityKey,
    pub contributors: SmallVec<[Contributor; 2]>,
}

impl Overlap {
    #[must_use]
    pub fn degree(&self) -> usize {
        self.contributors.len()
    }
}

/// Capabilities covered by more than one contribution, highest degree first.
#[must_use]
pub fn overlap_report(
    catalog: &Catalog,
    filter: &FilterState,
    selection: &Selection,
) -> Vec<Overlap> {
    let mut by_capability: BTreeMap<&str, SmallVec<[Contributor; 2]>> = BTreeMap::new();
    for provider in visible_selected(catalog, filter, selection) {
        for key in provider.base.iter().filter(|key| filter.is_target(key)) {
            by_capability.entry(key).or_default().push(Contributor {
                provider: provider.key.clone(),
                kind: ContributionKind::Base,
            });
        }
        if let Some(charter) = selection
            .charter_of(&provider.key)
            .filter(|c| provider.has_charter(c) && filter.is_target(c))
        {
            by_capability.entry(charter).or_default().push(Contributor {
                provider: provider.key.clone(),
                kind: ContributionKind::Charter,
            });
        }
    }
    let mut overlaps: Vec<Overlap> = by_capability
        .into_iter()
        .filter(|(_, contributors)| contributors.len() > 1)
        .map(|(capability, contributors)| Overlap {
            capability: capability.to_string(),
            contributors,
        })
        .collect();
    overlaps.sort_by(|a, b| {
        b.degree()
            .cmp(&a.degree())
            .then_with(|| a.capability.cmp(&b.capability))
    });
    overlaps
}

/// Aggregate coverage numbers for a covered set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageStats {
    pub covered: usize,
    pub targets: usize,
    pub priority_covered: usize,
    pub priority_targets: usize,
    pub uncovered: Vec<CapabilityKey>,
    /// Required prestige goods no visible selected provider supplies.
    pub missing_prestige: Vec<CapabilityKey>,
}

impl CoverageStats {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.covered == self.targets
    }

    #[must_use]
    pub fn requirements_met(&self) -> bool {
        self.missing_prestige.is_empty()
    }
}

/// Coverage numbers for a covered set and the prestige goods supplied alongside it.
#[must_use]
pub fn coverage_stats(
    filter: &FilterState,
    covered: &BTreeSet<CapabilityKey>,
    prestige: &BTreeSet<CapabilityKey>,
) -> CoverageStats {
    let targets = filter.targets();
    let priority = filter.priority();
    CoverageStats {
        covered: targets.iter().filter(|key| covered.contains(*key)).count(),
        targets: targets.len(),
        priority_covered: priority.iter().filter(|key| covered.contains(*key)).count(),
        priority_targets: priority.len(),
        uncovered: targets
            .iter()
            .filter(|key| !covered.contains(*key))
            .cloned()
            .collect(),
        missing_prestige: filter
            .required_prestige()
            .iter()
            .filter(|key| !prestige.contains(*key))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_json(
            r#"{
                "providers": [
                    { "key": "a", "base": ["x", "y"], "charters": ["z"] },
                    { "key": "b", "base": ["y"] },
                    { "key": "c", "base": ["z", "w"], "free": true,
                      "prestige_goods": [{ "name": "canal tolls", "capability": "x" }] },
                    { "key": "d", "base": ["v"], "charters": ["v", "w"] }
                ]
            }"#,
        )
        .unwrap()
    }

    fn select(catalog: &Catalog, keys: &[&str]) -> Selection {
        let mut selection = Selection::new();
        for key in keys {
            selection.select(catalog, key);
        }
        selection
    }

    #[test]
    fn covered_set_unions_without_double_counting() {
        let catalog = catalog();
        let filter = FilterState::all(&catalog);
        let mut selection = select(&catalog, &["a", "b"]);
        selection.choose_charter(&catalog, "a", "z");
        let covered = covered_set(&catalog, &filter, &selection);
        assert_eq!(covered.len(), 3);
        let individual: usize = selection
            .providers()
            .iter()
            .map(|key| {
                let provider = catalog.provider(key).unwrap();
                contribution(provider, selection.charter_of(key).map(String::as_str), &filter).len()
            })
            .sum();
        assert!(covered.len() < individual);
    }

    #[test]
    fn filtered_providers_and_targets_are_invisible() {
        let catalog = catalog();
        let mut filter = FilterState::all(&catalog);
        let selection = select(&catalog, &["a", "c"]);
        filter.set_provider(&catalog, "c", false);
        filter.set_capability(&catalog, "y", false);
        let covered = covered_set(&catalog, &filter, &selection);
        assert_eq!(covered, BTreeSet::from(["x".to_string()]));
    }

    #[test]
    fn marginal_gain_matches_worked_example() {
        let catalog = catalog();
        let filter = FilterState::all(&catalog);
        let mut selection = select(&catalog, &["a"]);
        selection.choose_charter(&catalog, "a", "z");

        let gains = marginal_gains(&catalog, &filter, &selection);
        let gain_of = |key: &str| {
            gains
                .iter()
                .find(|row| row.provider == key)
                .map(|row| row.gain.total())
        };
        assert_eq!(gain_of("a"), None);
        assert_eq!(gain_of("b"), Some(0));
        assert_eq!(gain_of("c"), Some(1));
        assert!(gains.iter().find(|row| row.provider == "c").unwrap().free);
    }

    #[test]
    fn charter_gain_is_single_and_skips_base_duplicates() {
        let catalog = catalog();
        let filter = FilterState::all(&catalog);
        let d = catalog.provider("d").unwrap();
        let gain = marginal_gain(d, &filter, &BTreeSet::new(), false);
        assert_eq!(gain.base, 1);
        assert_eq!(gain.charter, 1);
        assert_eq!(gain.best_charter.as_deref(), Some("w"));

        let granted = marginal_gain(d, &filter, &BTreeSet::new(), true);
        assert_eq!(granted.total(), 1);
        assert!(granted.best_charter.is_none());
    }

    #[test]
    fn charter_options_ignore_own_active_charter() {
        let catalog = catalog();
        let filter = FilterState::all(&catalog);
        let mut selection = select(&catalog, &["a", "d"]);
        selection.choose_charter(&catalog, "d", "w");
        let options = charter_options(&catalog, &filter, &selection, "d");
        assert_eq!(options.len(), 2);
        let v = options.iter().find(|o| o.charter == "v").unwrap();
        let w = options.iter().find(|o| o.charter == "w").unwrap();
        assert_eq!(v.new_coverage, 0);
        assert_eq!(w.new_coverage, 1);
        assert!(w.active);
        assert!(charter_options(&catalog, &filter, &selection, "ghost").is_empty());
    }

    #[test]
    fn overlap_counts_base_and_charter_contributions() {
        let catalog = catalog();
        let filter = FilterState::all(&catalog);
        let mut selection = select(&catalog, &["a", "b", "c"]);
        selection.choose_charter(&catalog, "a", "z");
        let overlaps = overlap_report(&catalog, &filter, &selection);
        assert_eq!(overlaps.len(), 2);
        assert_eq!(overlaps[0].capability, "y");
        assert_eq!(overlaps[0].degree(), 2);
        let z = &overlaps[1];
        assert_eq!(z.capability, "z");
        assert!(z.contributors.contains(&Contributor {
            provider: "a".to_string(),
            kind: ContributionKind::Charter,
        }));
        assert!(z.contributors.contains(&Contributor {
            provider: "c".to_string(),
            kind: ContributionKind::Base,
        }));
    }

    #[test]
    fn source_lookup_is_tagged() {
        let catalog = catalog();
        let mut selection = select(&catalog, &["a", "c"]);
        selection.choose_charter(&catalog, "a", "z");
        let a = catalog.provider("a").unwrap();
        let c = catalog.provider("c").unwrap();
        assert_eq!(source_for(a, &selection, "x"), CapabilitySource::Base);
        assert_eq!(source_for(a, &selection, "z"), CapabilitySource::Charter);
        assert_eq!(source_for(a, &selection, "w"), CapabilitySource::None);
        assert_eq!(
            source_for(c, &selection, "x"),
            CapabilitySource::SpecialBonus("x".to_string())
        );
    }

    #[test]
    fn stats_report_uncovered_and_priority() {
        let catalog = catalog();
        let mut filter = FilterState::all(&catalog);
        filter.toggle_priority("w");
        let selection = select(&catalog, &["a"]);
        let stats = coverage_stats(
            &filter,
            &covered_set(&catalog, &filter, &selection),
            &prestige_supplied(&catalog, &filter, &selection),
        );
        assert_eq!(stats.covered, 2);
        assert_eq!(stats.targets, 5);
        assert_eq!(stats.priority_targets, 1);
        assert_eq!(stats.priority_covered, 0);
        assert_eq!(stats.uncovered, ["v", "w", "z"]);
        assert!(!stats.is_complete());
        assert!(stats.requirements_met());
    }

    #[test]
    fn required_prestige_needs_a_visible_supplier() {
        let catalog = catalog();
        let mut filter = FilterState::all(&catalog);
        assert!(filter.toggle_prestige(&catalog, "x"));
        let mut selection = select(&catalog, &["a"]);
        let stats = |filter: &FilterState, selection: &Selection| {
            coverage_stats(
                filter,
                &covered_set(&catalog, filter, selection),
                &prestige_supplied(&catalog, filter, selection),
            )
        };
        assert_eq!(stats(&filter, &selection).missing_prestige, ["x"]);

        selection.select(&catalog, "c");
        assert!(stats(&filter, &selection).requirements_met());

        filter.set_provider(&catalog, "c", false);
        assert!(!stats(&filter, &selection).requirements_met());
    }
}

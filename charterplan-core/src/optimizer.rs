//! Bounded-budget greedy maximum coverage.
//!
//! This is the classic greedy approximation for maximum coverage, not an exact
//! solver: each round takes the candidate adding the most still-uncovered
//! targets. Results are deterministic for identical inputs. Ties break on
//! priority targets gained, then ascending provider key, then "no charter"
//! before charters in ascending key order.
//!
//! Required prestige goods are handled first: each unmet requirement goes to
//! a free supplier if there is one, otherwise to the lowest-keyed paid supplier
//! while slots remain. Free providers never occupy a budget slot; they are
//! evaluated after the budgeted rounds and kept when they still add coverage.
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::catalog::{CapabilityKey, Catalog, ProviderKey};
use crate::coverage::{CoverageStats, coverage_stats, covered_set, prestige_supplied};
use crate::filter::FilterState;
use crate::selection::Selection;

/// Budget used when the caller does not configure one.
pub const DEFAULT_BUDGET: usize = 7;

/// One proposed addition to the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pick {
    pub provider: ProviderKey,
    pub charter: Option<CapabilityKey>,
    pub free: bool,
    /// Targets this pick newly covers, in ascending key order.
    pub gained: Vec<CapabilityKey>,
    /// Required prestige good this pick was made to supply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prestige: Option<CapabilityKey>,
}

/// Picks to append plus before/after coverage numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub picks: Vec<Pick>,
    pub before: CoverageStats,
    pub after: CoverageStats,
    pub slots_used: usize,
    pub slots_available: usize,
}

impl Proposal {
    /// Number of targets the proposal adds.
    #[must_use]
    pub const fn gained(&self) -> usize {
        self.after.covered - self.before.covered
    }
}

/// Why no proposal was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum NoProposal {
    BudgetExhausted { budget: usize, used: usize },
    FullyCovered,
    NoCandidates,
}

impl std::fmt::Display for NoProposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted { budget, used } => {
                write!(f, "budget exhausted ({used} of {budget} slots used)")
            }
            Self::FullyCovered => write!(f, "already fully covered"),
            Self::NoCandidates => write!(f, "no candidates add coverage"),
        }
    }
}

/// Optimizer result: either a proposal or the reason there is none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Optimization {
    Proposed(Proposal),
    Unchanged {
        reason: NoProposal,
        stats: CoverageStats,
    },
}

impl Optimization {
    #[must_use]
    pub const fn proposal(&self) -> Option<&Proposal> {
        match self {
            Self::Proposed(proposal) => Some(proposal),
            Self::Unchanged { .. } => None,
        }
    }

    #[must_use]
    pub fn into_proposal(self) -> Option<Proposal> {
        match self {
            Self::Proposed(proposal) => Some(proposal),
            Self::Unchanged { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    provider: &'a str,
    charter: Option<&'a str>,
    free: bool,
    coverage: BTreeSet<&'a str>,
}

struct Scored {
    index: usize,
    gain: usize,
    priority: usize,
}

fn enumerate_candidates<'a>(
    catalog: &'a Catalog,
    filter: &FilterState,
    selection: &Selection,
    uncovered: &BTreeSet<CapabilityKey>,
) -> Vec<Candidate<'a>> {
    let mut candidates = Vec::new();
    let providers = catalog
        .providers()
        .iter()
        .filter(|p| filter.is_provider_enabled(&p.key) && !selection.contains(&p.key));
    for provider in providers {
        let base: BTreeSet<&str> = provider
            .base
            .iter()
            .filter(|key| uncovered.contains(*key))
            .map(String::as_str)
            .collect();
        for charter in provider
            .charters
            .iter()
            .filter(|c| uncovered.contains(*c) && !base.contains(c.as_str()))
        {
            let mut coverage = base.clone();
            coverage.insert(charter.as_str());
            candidates.push(Candidate {
                provider: &provider.key,
                charter: Some(charter.as_str()),
                free: provider.free,
                coverage,
            });
        }
        if !base.is_empty() {
            candidates.push(Candidate {
                provider: &provider.key,
                charter: None,
                free: provider.free,
                coverage: base,
            });
        }
    }
    candidates
}

fn compare(a: &Scored, b: &Scored, candidates: &[Candidate<'_>]) -> Ordering {
    let (ca, cb) = (&candidates[a.index], &candidates[b.index]);
    a.gain
        .cmp(&b.gain)
        .then(a.priority.cmp(&b.priority))
        .then_with(|| cb.provider.cmp(ca.provider))
        .then_with(|| cb.charter.cmp(&ca.charter))
}

fn best_scored(
    pool: &[Candidate<'_>],
    uncovered: &BTreeSet<CapabilityKey>,
    filter: &FilterState,
    eligible: impl Fn(&Candidate<'_>) -> bool,
) -> Option<Scored> {
    pool.iter()
        .enumerate()
        .filter(|(_, candidate)| eligible(*candidate))
        .map(|(index, candidate)| {
            let fresh = candidate
                .coverage
                .iter()
                .filter(|key| uncovered.contains(**key));
            let (gain, priority) = fresh.fold((0, 0), |(gain, priority), key| {
                (gain + 1, priority + usize::from(filter.is_priority(key)))
            });
            Scored {
                index,
                gain,
                priority,
            }
        })
        .max_by(|a, b| compare(a, b, pool))
}

/// Turn a candidate into a pick, moving what it newly covers out of `uncovered`.
fn commit(chosen: &Candidate<'_>, uncovered: &mut BTreeSet<CapabilityKey>) -> Pick {
    let gained: Vec<CapabilityKey> = chosen
        .coverage
        .iter()
        .filter(|key| uncovered.contains(**key))
        .map(ToString::to_string)
        .collect();
    for key in &gained {
        uncovered.remove(key);
    }
    Pick {
        provider: chosen.provider.to_string(),
        charter: chosen.charter.map(ToString::to_string),
        free: chosen.free,
        gained,
        prestige: None,
    }
}

/// Pick a supplier for every required prestige good the selection lacks.
/// Returns the number of budget slots spent.
#[allow(clippy::too_many_arguments)]
fn satisfy_prestige(
    catalog: &Catalog,
    filter: &FilterState,
    selection: &Selection,
    supplied: &BTreeSet<CapabilityKey>,
    candidates: &mut Vec<Candidate<'_>>,
    uncovered: &mut BTreeSet<CapabilityKey>,
    slots: usize,
    picks: &mut Vec<Pick>,
) -> usize {
    let mut supplied = supplied.clone();
    let mut slots_used = 0;
    for capability in filter.required_prestige() {
        if supplied.contains(capability) {
            continue;
        }
        let supplier = catalog
            .providers()
            .iter()
            .filter(|p| {
                filter.is_provider_enabled(&p.key)
                    && !selection.contains(&p.key)
                    && !picks.iter().any(|pick| pick.provider == p.key)
                    && p.prestige_good_for(capability).is_some()
                    && (p.free || slots_used < slots)
            })
            .min_by(|a, b| b.free.cmp(&a.free).then_with(|| a.key.cmp(&b.key)));
        let Some(supplier) = supplier else {
            debug!("no supplier left for the required prestige good on {capability}");
            continue;
        };

        let best = best_scored(candidates, uncovered, filter, |candidate| {
            candidate.provider == supplier.key
        });
        let mut pick = match best {
            Some(best) if best.gain > 0 => commit(&candidates[best.index], uncovered),
            _ => Pick {
                provider: supplier.key.clone(),
                charter: None,
                free: supplier.free,
                gained: Vec::new(),
                prestige: None,
            },
        };
        pick.prestige = Some(capability.clone());
        debug!(
            "prestige {capability}: {} charter={:?} gains {}",
            pick.provider,
            pick.charter,
            pick.gained.len()
        );
        candidates.retain(|candidate| candidate.provider != supplier.key);
        supplied.extend(
            supplier
                .prestige_goods
                .iter()
                .map(|good| good.capability.clone()),
        );
        if !supplier.free {
            slots_used += 1;
        }
        picks.push(pick);
    }
    slots_used
}

/// Run greedy rounds over `candidates`, consuming at most `limit` picks.
fn greedy_rounds(
    candidates: &mut Vec<Candidate<'_>>,
    uncovered: &mut BTreeSet<CapabilityKey>,
    filter: &FilterState,
    limit: usize,
    picks: &mut Vec<Pick>,
) {
    for round in 0..limit {
        let best = best_scored(candidates, uncovered, filter, |_| true);
        let Some(best) = best.filter(|scored| scored.gain > 0) else {
            debug!("greedy round {round}: no candidate adds coverage, stopping");
            break;
        };
        let pick = commit(&candidates[best.index], uncovered);
        debug!(
            "greedy round {round}: {} charter={:?} gains {} (priority {})",
            pick.provider, pick.charter, best.gain, best.priority
        );
        candidates.retain(|candidate| candidate.provider != pick.provider);
        picks.push(pick);
    }
}

/// Propose additional picks that maximize new coverage within `budget`.
///
/// `budget` is the maximum number of non-free providers allowed in the whole
/// selection. The selection itself is never modified.
#[must_use]
pub fn optimize(
    catalog: &Catalog,
    filter: &FilterState,
    selection: &Selection,
    budget: usize,
) -> Optimization {
    let covered = covered_set(catalog, filter, selection);
    let supplied = prestige_supplied(catalog, filter, selection);
    let before = coverage_stats(filter, &covered, &supplied);
    let used = selection.paid_count(catalog);
    let slots_available = budget.saturating_sub(used);
    if slots_available == 0 {
        return Optimization::Unchanged {
            reason: NoProposal::BudgetExhausted { budget, used },
            stats: before,
        };
    }

    let mut uncovered: BTreeSet<CapabilityKey> =
        filter.targets().difference(&covered).cloned().collect();
    if uncovered.is_empty() && before.requirements_met() {
        return Optimization::Unchanged {
            reason: NoProposal::FullyCovered,
            stats: before,
        };
    }

    let mut candidates = enumerate_candidates(catalog, filter, selection, &uncovered);
    let mut picks = Vec::new();
    let prestige_slots = satisfy_prestige(
        catalog,
        filter,
        selection,
        &supplied,
        &mut candidates,
        &mut uncovered,
        slots_available,
        &mut picks,
    );

    let (mut paid, mut free): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|candidate| !candidate.free);
    debug!(
        "optimizing {} uncovered targets with {} paid and {} free candidates, {slots_available} slots",
        uncovered.len(),
        paid.len(),
        free.len()
    );

    greedy_rounds(
        &mut paid,
        &mut uncovered,
        filter,
        slots_available - prestige_slots,
        &mut picks,
    );
    let slots_used = picks.iter().filter(|pick| !pick.free).count();
    let free_limit = free.len();
    greedy_rounds(&mut free, &mut uncovered, filter, free_limit, &mut picks);

    if picks.is_empty() {
        return Optimization::Unchanged {
            reason: NoProposal::NoCandidates,
            stats: before,
        };
    }

    let mut after_covered = covered;
    after_covered.extend(picks.iter().flat_map(|pick| pick.gained.iter().cloned()));
    let mut after_supplied = supplied;
    after_supplied.extend(
        picks
            .iter()
            .filter_map(|pick| catalog.provider(&pick.provider))
            .flat_map(|provider| provider.prestige_goods.iter())
            .map(|good| good.capability.clone()),
    );
    let after = coverage_stats(filter, &after_covered, &after_supplied);
    Optimization::Proposed(Proposal {
        picks,
        before,
        after,
        slots_used,
        slots_available,
    })
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
                    { "key": "c", "base": ["z", "w"], "free": true }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn worked_example_uses_one_slot_and_one_free_pick() {
        let catalog = catalog();
        let filter = FilterState::all(&catalog);
        let result = optimize(&catalog, &filter, &Selection::new(), 1);
        let proposal = result.proposal().expect("proposal");
        assert_eq!(proposal.picks.len(), 2);

        let first = &proposal.picks[0];
        assert_eq!(first.provider, "a");
        assert_eq!(first.charter.as_deref(), Some("z"));
        assert_eq!(first.gained, ["x", "y", "z"]);
        assert!(!first.free);

        let second = &proposal.picks[1];
        assert_eq!(second.provider, "c");
        assert!(second.free);
        assert_eq!(second.gained, ["w"]);

        assert_eq!(proposal.slots_used, 1);
        assert_eq!(proposal.before.covered, 0);
        assert_eq!(proposal.after.covered, 4);
        assert!(proposal.after.is_complete());
        assert_eq!(proposal.gained(), 4);
    }

    #[test]
    fn exhausted_budget_is_a_status() {
        let catalog = catalog();
        let filter = FilterState::all(&catalog);
        let mut selection = Selection::new();
        selection.select(&catalog, "b");
        selection.select(&catalog, "c");
        let result = optimize(&catalog, &filter, &selection, 1);
        assert_eq!(
            result,
            Optimization::Unchanged {
                reason: NoProposal::BudgetExhausted { budget: 1, used: 1 },
                stats: coverage_stats(
                    &filter,
                    &covered_set(&catalog, &filter, &selection),
                    &prestige_supplied(&catalog, &filter, &selection),
                ),
            }
        );
    }

    #[test]
    fn fully_covered_is_a_status() {
        let catalog = catalog();
        let mut filter = FilterState::all(&catalog);
        filter.set_capability(&catalog, "z", false);
        filter.set_capability(&catalog, "w", false);
        let mut selection = Selection::new();
        selection.select(&catalog, "a");
        let result = optimize(&catalog, &filter, &selection, 3);
        assert!(matches!(
            result,
            Optimization::Unchanged {
                reason: NoProposal::FullyCovered,
                ..
            }
        ));
    }

    #[test]
    fn no_candidates_when_providers_filtered_out() {
        let catalog = catalog();
        let mut filter = FilterState::all(&catalog);
        for key in ["a", "b", "c"] {
            filter.set_provider(&catalog, key, false);
        }
        let result = optimize(&catalog, &filter, &Selection::new(), 3);
        assert!(matches!(
            result,
            Optimization::Unchanged {
                reason: NoProposal::NoCandidates,
                ..
            }
        ));
    }

    #[test]
    fn ties_break_on_priority_then_provider_key() {
        let catalog = Catalog::from_json(
            r#"{
                "providers": [
                    { "key": "m", "base": ["p"] },
                    { "key": "k", "base": ["q"] },
                    { "key": "j", "base": ["r"] }
                ]
            }"#,
        )
        .unwrap();
        let mut filter = FilterState::all(&catalog);
        let plain = optimize(&catalog, &filter, &Selection::new(), 1);
        assert_eq!(plain.proposal().unwrap().picks[0].provider, "j");

        filter.toggle_priority("p");
        let prioritized = optimize(&catalog, &filter, &Selection::new(), 1);
        assert_eq!(prioritized.proposal().unwrap().picks[0].provider, "m");
    }

    #[test]
    fn no_charter_preferred_when_charter_adds_nothing() {
        let catalog = Catalog::from_json(
            r#"{
                "providers": [
                    { "key": "a", "base": ["x"], "charters": ["y"] },
                    { "key": "b", "base": ["y", "z", "v"] }
                ]
            }"#,
        )
        .unwrap();
        let filter = FilterState::all(&catalog);
        let proposal = optimize(&catalog, &filter, &Selection::new(), 2)
            .into_proposal()
            .unwrap();
        assert_eq!(proposal.picks[0].provider, "b");
        assert_eq!(proposal.picks[1].provider, "a");
        assert_eq!(proposal.picks[1].charter, None);
    }

    #[test]
    fn picks_are_unique_per_provider() {
        let catalog = Catalog::from_json(
            r#"{
                "providers": [
                    { "key": "a", "base": ["x"], "charters": ["y", "z"] },
                    { "key": "b", "base": ["w"] }
                ]
            }"#,
        )
        .unwrap();
        let filter = FilterState::all(&catalog);
        let proposal = optimize(&catalog, &filter, &Selection::new(), 3)
            .into_proposal()
            .unwrap();
        let providers: BTreeSet<&str> = proposal
            .picks
            .iter()
            .map(|pick| pick.provider.as_str())
            .collect();
        assert_eq!(providers.len(), proposal.picks.len());
        assert_eq!(proposal.after.uncovered, ["z"]);
    }

    fn prestige_catalog(e_free: bool) -> Catalog {
        Catalog::from_json(&format!(
            r#"{{
                "providers": [
                    {{ "key": "a", "base": ["x", "y", "z"] }},
                    {{ "key": "d", "base": ["w"],
                      "prestige_goods": [{{ "name": "Fine Cloth", "capability": "w" }}] }},
                    {{ "key": "e", "base": ["v"], "free": {e_free},
                      "prestige_goods": [{{ "name": "Silk", "capability": "{cap}" }}] }}
                ]
            }}"#,
            cap = if e_free { "w" } else { "v" },
        ))
        .unwrap()
    }

    #[test]
    fn required_prestige_is_supplied_before_greedy_rounds() {
        let catalog = prestige_catalog(false);
        let mut filter = FilterState::all(&catalog);
        assert!(filter.toggle_prestige(&catalog, "w"));

        let proposal = optimize(&catalog, &filter, &Selection::new(), 1)
            .into_proposal()
            .unwrap();
        assert_eq!(proposal.picks.len(), 1);
        assert_eq!(proposal.picks[0].provider, "d");
        assert_eq!(proposal.picks[0].prestige.as_deref(), Some("w"));
        assert_eq!(proposal.slots_used, 1);
        assert_eq!(proposal.before.missing_prestige, ["w"]);
        assert!(proposal.after.requirements_met());

        let plain = optimize(&catalog, &FilterState::all(&catalog), &Selection::new(), 1);
        assert_eq!(plain.proposal().unwrap().picks[0].provider, "a");
    }

    #[test]
    fn requirements_without_a_slot_stay_missing() {
        let catalog = prestige_catalog(false);
        let mut filter = FilterState::all(&catalog);
        filter.toggle_prestige(&catalog, "w");
        filter.toggle_prestige(&catalog, "v");

        let proposal = optimize(&catalog, &filter, &Selection::new(), 1)
            .into_proposal()
            .unwrap();
        assert_eq!(proposal.picks.len(), 1);
        assert_eq!(proposal.picks[0].prestige.as_deref(), Some("v"));
        assert_eq!(proposal.picks[0].provider, "e");
        assert_eq!(proposal.after.missing_prestige, ["w"]);
        assert!(!proposal.after.requirements_met());
    }

    #[test]
    fn free_supplier_preferred_for_required_prestige() {
        let catalog = prestige_catalog(true);
        let mut filter = FilterState::all(&catalog);
        filter.toggle_prestige(&catalog, "w");

        let proposal = optimize(&catalog, &filter, &Selection::new(), 1)
            .into_proposal()
            .unwrap();
        let first = &proposal.picks[0];
        assert_eq!(first.provider, "e");
        assert!(first.free);
        assert_eq!(first.prestige.as_deref(), Some("w"));
        assert_eq!(proposal.picks[1].provider, "a");
        assert_eq!(proposal.slots_used, 1);
        assert!(proposal.after.requirements_met());
    }
}

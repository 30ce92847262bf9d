//! Session state: one user's filter and selection over a shared read-only catalog.
use log::info;
use std::collections::BTreeSet;

use crate::catalog::{CapabilityKey, Catalog};
use crate::coverage::{
    CharterOption, CoverageStats, Overlap, ProviderGain, charter_options, coverage_stats,
    covered_set, marginal_gains, overlap_report, prestige_supplied,
};
use crate::filter::FilterState;
use crate::optimizer::{Optimization, Proposal, optimize};
use crate::persist::{
    FilterRecord, ImportError, ImportReport, SelectionRecord, SessionRecord, restore_filter,
    restore_selection,
};
use crate::selection::{CharterChange, Confirm, Selection};
use crate::share::{self, DecodedShare, ShareCodeError};

/// One user's planning session: filter plus selection, with no hidden globals.
///
/// The catalog is passed into each call rather than owned, so one read-only
/// catalog can back any number of sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    filter: FilterState,
    selection: Selection,
}

impl SessionState {
    /// Fresh session with everything enabled and nothing selected.
    #[must_use]
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            filter: FilterState::all(catalog),
            selection: Selection::new(),
        }
    }

    #[must_use]
    pub const fn from_parts(filter: FilterState, selection: Selection) -> Self {
        Self { filter, selection }
    }

    #[must_use]
    pub const fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub const fn filter_mut(&mut self) -> &mut FilterState {
        &mut self.filter
    }

    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    pub const fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    /// Run a closure against the selection and return its result.
    pub fn with_selection_mut<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Selection) -> R,
    {
        f(&mut self.selection)
    }

    pub fn select(&mut self, catalog: &Catalog, provider: &str) -> bool {
        self.selection.select(catalog, provider)
    }

    pub fn deselect(&mut self, provider: &str) -> bool {
        self.selection.deselect(provider)
    }

    pub fn choose_charter(
        &mut self,
        catalog: &Catalog,
        provider: &str,
        charter: &str,
    ) -> CharterChange {
        self.selection.choose_charter(catalog, provider, charter)
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        self.selection.reorder(from, to)
    }

    pub fn clear(&mut self, confirm: Confirm) -> usize {
        self.selection.clear(confirm)
    }

    #[must_use]
    pub fn covered(&self, catalog: &Catalog) -> BTreeSet<CapabilityKey> {
        covered_set(catalog, &self.filter, &self.selection)
    }

    #[must_use]
    pub fn stats(&self, catalog: &Catalog) -> CoverageStats {
        let prestige = prestige_supplied(catalog, &self.filter, &self.selection);
        coverage_stats(&self.filter, &self.covered(catalog), &prestige)
    }

    #[must_use]
    pub fn gains(&self, catalog: &Catalog) -> Vec<ProviderGain> {
        marginal_gains(catalog, &self.filter, &self.selection)
    }

    #[must_use]
    pub fn overlaps(&self, catalog: &Catalog) -> Vec<Overlap> {
        overlap_report(catalog, &self.filter, &self.selection)
    }

    #[must_use]
    pub fn charter_options(&self, catalog: &Catalog, provider: &str) -> Vec<CharterOption> {
        charter_options(catalog, &self.filter, &self.selection, provider)
    }

    #[must_use]
    pub fn optimize(&self, catalog: &Catalog, budget: usize) -> Optimization {
        optimize(catalog, &self.filter, &self.selection, budget)
    }

    /// Commit a proposal's picks; returns how many providers were added.
    pub fn apply_proposal(&mut self, catalog: &Catalog, proposal: &Proposal) -> usize {
        let mut applied = 0;
        for pick in &proposal.picks {
            if !self.selection.select(catalog, &pick.provider) {
                continue;
            }
            applied += 1;
            if let Some(charter) = pick.charter.as_deref() {
                self.selection.choose_charter(catalog, &pick.provider, charter);
            }
        }
        info!("applied {applied} of {} proposed picks", proposal.picks.len());
        applied
    }

    #[must_use]
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            selection: SelectionRecord::capture(&self.selection),
            filter: Some(FilterRecord::capture(&self.filter)),
        }
    }

    /// Rebuild a session from a record. A record without a filter enables everything.
    #[must_use]
    pub fn restore(catalog: &Catalog, record: &SessionRecord) -> (Self, ImportReport) {
        let (selection, mut report) = restore_selection(catalog, &record.selection);
        let filter = match &record.filter {
            Some(filter_record) => {
                let (filter, filter_report) = restore_filter(catalog, filter_record);
                report.merge(filter_report);
                filter
            }
            None => FilterState::all(catalog),
        };
        (Self { filter, selection }, report)
    }

    /// Replace this session wholesale from a JSON payload. On error nothing changes.
    ///
    /// Entries that are unknown or of the wrong type are dropped and counted
    /// in the report rather than failing the import.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not JSON or not a session object.
    pub fn import_json(
        &mut self,
        catalog: &Catalog,
        json: &str,
    ) -> Result<ImportReport, ImportError> {
        let record = SessionRecord::from_json(json)?;
        let (restored, report) = Self::restore(catalog, &record);
        *self = restored;
        info!("imported session: {report}");
        Ok(report)
    }

    /// Export this session as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        self.to_record().to_json()
    }

    #[must_use]
    pub fn share_code(&self, catalog: &Catalog) -> String {
        share::encode(catalog, &self.selection)
    }

    /// Replace the selection from a share code, keeping the filter.
    ///
    /// # Errors
    ///
    /// Returns an error when the code is not structurally a share code.
    pub fn import_share_code(
        &mut self,
        catalog: &Catalog,
        code: &str,
    ) -> Result<ImportReport, ShareCodeError> {
        let DecodedShare {
            selection, report, ..
        } = share::decode(catalog, code)?;
        self.selection = selection;
        Ok(report)
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
                    { "key": "c", "base": ["z", "w"], "free": true }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn optimize_then_apply_reaches_full_coverage() {
        let catalog = catalog();
        let mut session = SessionState::new(&catalog);
        let proposal = session.optimize(&catalog, 1).into_proposal().unwrap();
        assert_eq!(session.apply_proposal(&catalog, &proposal), 2);
        assert_eq!(session.selection().providers(), ["a", "c"]);
        assert_eq!(
            session.selection().charter_of("a").map(String::as_str),
            Some("z")
        );
        assert!(session.stats(&catalog).is_complete());
        assert!(matches!(
            session.optimize(&catalog, 1),
            Optimization::Unchanged { .. }
        ));
    }

    #[test]
    fn failed_import_leaves_session_untouched() {
        let catalog = catalog();
        let mut session = SessionState::new(&catalog);
        session.select(&catalog, "b");
        let before = session.clone();
        assert!(session.import_json(&catalog, "[1, 2").is_err());
        assert_eq!(session, before);
        assert!(session.import_share_code(&catalog, "nonsense").is_err());
        assert_eq!(session, before);
    }

    #[test]
    fn export_import_roundtrip_keeps_filter_and_selection() {
        let catalog = catalog();
        let mut session = SessionState::new(&catalog);
        session.select(&catalog, "a");
        session.choose_charter(&catalog, "a", "z");
        session.filter_mut().set_provider(&catalog, "b", false);
        session.filter_mut().toggle_priority("w");

        let json = session.export_json().unwrap();
        let mut other = SessionState::new(&catalog);
        let report = other.import_json(&catalog, &json).unwrap();
        assert!(report.is_complete());
        assert_eq!(other, session);
    }

    #[test]
    fn record_without_filter_enables_everything() {
        let catalog = catalog();
        let mut session = SessionState::new(&catalog);
        session.filter_mut().clear_capabilities();
        let report = session
            .import_json(&catalog, r#"{ "version": 1, "providers": ["c"] }"#)
            .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(session.filter(), &FilterState::all(&catalog));
    }

    #[test]
    fn share_code_replaces_selection_only() {
        let catalog = catalog();
        let mut source = SessionState::new(&catalog);
        source.select(&catalog, "b");
        source.select(&catalog, "a");
        let code = source.share_code(&catalog);

        let mut target = SessionState::new(&catalog);
        target.filter_mut().set_capability(&catalog, "w", false);
        target.select(&catalog, "c");
        let report = target.import_share_code(&catalog, &code).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(target.selection(), source.selection());
        assert!(!target.filter().is_target("w"));
    }

    #[test]
    fn clear_and_reorder_pass_through() {
        let catalog = catalog();
        let mut session = SessionState::new(&catalog);
        session.select(&catalog, "a");
        session.select(&catalog, "b");
        assert!(session.reorder(1, 0));
        assert_eq!(session.selection().providers(), ["b", "a"]);
        assert!(session.deselect("b"));
        assert_eq!(session.clear(Confirm::Yes), 1);
        assert!(session.gains(&catalog).iter().all(|row| row.gain.total() > 0));
        assert!(session.overlaps(&catalog).is_empty());
        assert_eq!(session.charter_options(&catalog, "a").len(), 1);
    }

    #[test]
    fn badly_typed_entries_do_not_abort_the_import() {
        let catalog = catalog();
        let mut session = SessionState::new(&catalog);
        let report = session
            .import_json(&catalog, r#"{ "version": 1, "providers": ["a", 42, "b"] }"#)
            .unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.total, 3);
        assert_eq!(report.to_string(), "2 of 3 entries applied (dropped: provider 42)");
        assert_eq!(session.selection().providers(), ["a", "b"]);
    }

    #[test]
    fn charter_chosen_while_disabled_counts_once_re_enabled() {
        let catalog = catalog();
        let mut session = SessionState::new(&catalog);
        session.select(&catalog, "a");
        session.filter_mut().set_provider(&catalog, "a", false);
        assert!(session.covered(&catalog).is_empty());

        assert_eq!(session.choose_charter(&catalog, "a", "z"), CharterChange::Chosen);
        assert_eq!(
            session.selection().charter_of("a").map(String::as_str),
            Some("z")
        );
        assert!(session.covered(&catalog).is_empty());

        session.filter_mut().set_provider(&catalog, "a", true);
        let covered = session.covered(&catalog);
        assert_eq!(covered.into_iter().collect::<Vec<_>>(), ["x", "y", "z"]);
    }

    #[test]
    fn stats_report_missing_prestige() {
        let catalog = Catalog::from_json(
            r#"{
                "providers": [
                    { "key": "a", "base": ["x"] },
                    { "key": "d", "base": ["w"],
                      "prestige_goods": [{ "name": "Fine Cloth", "capability": "w" }] }
                ]
            }"#,
        )
        .unwrap();
        let mut session = SessionState::new(&catalog);
        assert!(session.filter_mut().toggle_prestige(&catalog, "w"));
        assert_eq!(session.stats(&catalog).missing_prestige, ["w"]);

        let proposal = session.optimize(&catalog, 1).into_proposal().unwrap();
        assert_eq!(proposal.picks[0].provider, "d");
        session.apply_proposal(&catalog, &proposal);
        assert!(session.stats(&catalog).requirements_met());
    }
}

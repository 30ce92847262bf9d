//! Charterplan Core
//!
//! Provider coverage planning: pick a small set of providers (each optionally
//! granted one charter capability) so that a filtered set of target
//! capabilities is covered. This crate holds the catalog, filter, selection,
//! coverage and optimizer logic plus persistence, without any I/O of its own.

pub mod catalog;
pub mod coverage;
pub mod filter;
pub mod optimizer;
pub mod persist;
pub mod selection;
pub mod session;
pub mod share;

// Re-export commonly used types
pub use catalog::{
    Capability, CapabilityKey, Catalog, CatalogError, PrestigeGood, Provider, ProviderKey,
};
pub use coverage::{
    CapabilitySource, CharterOption, ContributionKind, Contributor, CoverageStats, MarginalGain,
    Overlap, ProviderGain, charter_options, contribution, coverage_stats, covered_set,
    marginal_gain, marginal_gains, overlap_report, prestige_supplied, source_for,
};
pub use filter::FilterState;
pub use optimizer::{DEFAULT_BUDGET, NoProposal, Optimization, Pick, Proposal, optimize};
pub use persist::{
    FilterRecord, ImportError, ImportReport, RecordEntry, SCHEMA_VERSION, SelectionRecord,
    SessionRecord, restore_filter, restore_selection,
};
pub use selection::{CharterChange, CharterRejection, Confirm, ProviderState, Selection};
pub use session::SessionState;
pub use share::{DecodedShare, ShareCodeError};

use log::info;

/// Trait for abstracting catalog loading.
/// Platform-specific implementations should provide this
pub trait CatalogLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the provider catalog from the platform-specific source
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or parsed.
    fn load_catalog(&self) -> Result<Catalog, Self::Error>;
}

/// Trait for abstracting save/load of sessions.
/// Platform-specific implementations should provide this
pub trait SessionStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save a session record
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be saved.
    fn save_session(&self, name: &str, record: &SessionRecord) -> Result<(), Self::Error>;

    /// Load a session record
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    fn load_session(&self, name: &str) -> Result<Option<SessionRecord>, Self::Error>;

    /// Delete a saved session
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be deleted.
    fn delete_session(&self, name: &str) -> Result<(), Self::Error>;
}

/// A session restored from storage, with the catalog it was checked against.
#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub catalog: Catalog,
    pub session: SessionState,
    /// `None` when no saved session existed and a fresh one was created.
    pub report: Option<ImportReport>,
}

/// Planning engine tying a catalog source to session storage
pub struct Planner<L, S>
where
    L: CatalogLoader,
    S: SessionStorage,
{
    catalog_loader: L,
    storage: S,
}

impl<L, S> Planner<L, S>
where
    L: CatalogLoader,
    S: SessionStorage,
{
    /// Create a new planner with the provided catalog loader and storage
    pub const fn new(catalog_loader: L, storage: S) -> Self {
        Self {
            catalog_loader,
            storage,
        }
    }

    /// Load the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    pub fn load_catalog(&self) -> Result<Catalog, L::Error> {
        self.catalog_loader.load_catalog()
    }

    /// Load the catalog and start an empty session over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    pub fn create_session(&self) -> Result<(Catalog, SessionState), L::Error> {
        let catalog = self.catalog_loader.load_catalog()?;
        let session = SessionState::new(&catalog);
        Ok((catalog, session))
    }

    /// Save a session
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be saved.
    pub fn save_session(&self, name: &str, session: &SessionState) -> Result<(), S::Error> {
        self.storage.save_session(name, &session.to_record())
    }

    /// Delete a saved session
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be deleted.
    pub fn delete_session(&self, name: &str) -> Result<(), S::Error> {
        self.storage.delete_session(name)
    }

    /// Load a saved session, restoring it against `catalog`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record cannot be read.
    pub fn load_session(
        &self,
        name: &str,
        catalog: &Catalog,
    ) -> Result<Option<(SessionState, ImportReport)>, anyhow::Error>
    where
        S::Error: Into<anyhow::Error>,
    {
        let Some(record) = self.storage.load_session(name).map_err(Into::into)? else {
            return Ok(None);
        };
        let (session, report) = SessionState::restore(catalog, &record);
        info!("restored session {name}: {report}");
        Ok(Some((session, report)))
    }

    /// Load the catalog and the named session, or start fresh if none is saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or the stored record cannot be read.
    pub fn open(&self, name: &str) -> Result<OpenedSession, anyhow::Error>
    where
        L::Error: Into<anyhow::Error>,
        S::Error: Into<anyhow::Error>,
    {
        let catalog = self.catalog_loader.load_catalog().map_err(Into::into)?;
        match self.load_session(name, &catalog)? {
            Some((session, report)) => Ok(OpenedSession {
                catalog,
                session,
                report: Some(report),
            }),
            None => {
                let session = SessionState::new(&catalog);
                Ok(OpenedSession {
                    catalog,
                    session,
                    report: None,
                })
            }
        }
    }
}

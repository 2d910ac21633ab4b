//! Game facade
//!
//! Bundles a store with the settings, chapter catalog and notifier the
//! engines need, and hands out borrowed engines on demand.

use tracing::info;

use crate::chapters::{Catalog, ChapterEngine};
use crate::config::GameSettings;
use crate::election::LeaderElection;
use crate::error::Result;
use crate::ledger::ScoreLedger;
use crate::notify::{NoopNotifier, Notifier};
use crate::rooms::RoomManager;
use crate::storage::Storage;

pub struct Game<S> {
    store: S,
    settings: GameSettings,
    catalog: Catalog,
    notifier: Box<dyn Notifier>,
}

impl<S: Storage> Game<S> {
    /// Build a game over `store`, loading the catalog the settings name
    pub fn new(store: S, settings: GameSettings) -> Result<Self> {
        settings.validate()?;
        let catalog = settings.catalog()?;
        info!(
            chapters = catalog.len(),
            reward = %settings.reward(),
            ballot = ?settings.leader_ballot,
            "Game configured"
        );

        Ok(Self {
            store,
            settings,
            catalog,
            notifier: Box::new(NoopNotifier),
        })
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rooms(&self) -> RoomManager<'_, S> {
        RoomManager::new(&self.store, self.notifier.as_ref())
    }

    pub fn chapters(&self) -> ChapterEngine<'_, S> {
        ChapterEngine::new(
            &self.store,
            self.notifier.as_ref(),
            &self.catalog,
            self.settings.reward(),
        )
    }

    pub fn election(&self) -> LeaderElection<'_, S> {
        LeaderElection::new(
            &self.store,
            self.notifier.as_ref(),
            self.settings.leader_ballot,
        )
    }

    pub fn ledger(&self) -> ScoreLedger<'_, S> {
        ScoreLedger::new(&self.store)
    }
}

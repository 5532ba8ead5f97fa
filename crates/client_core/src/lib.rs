//! Client core for the feed app: an interaction state store, an async action
//! processor guarding duplicate submissions, and the handlers that combine
//! them with the backend's resource clients.

use std::sync::Arc;

use anyhow::Result;
use shared::domain::ChallengeKind;

pub mod api;
pub mod config;
pub mod error;
pub mod interactions;
pub mod processor;
pub mod profile;
pub mod store;
pub mod verification;

pub use api::{FeedApi, HttpFeedApi};
pub use config::{load_settings, normalize_server_url, ClientSettings};
pub use error::{ClientError, ClientResult, Outcome, SkipReason};
pub use interactions::{AlwaysConfirm, ArticleInteractions, CommentDraft, Confirm};
pub use processor::{OperationKind, PendingKey, Processor};
pub use profile::{ProfileEditor, ProfileForm};
pub use store::{Action, AppState, Store};
pub use verification::VerificationSession;

const PROCESSOR_SCOPE: &str = "feed";

/// Wires one store, one processor and one resource client together and
/// hands out the handlers that share them.
pub struct FeedClient {
    store: Arc<Store>,
    api: Arc<dyn FeedApi>,
    processor: Arc<Processor>,
    confirm: Arc<dyn Confirm>,
    rollback_on_failure: bool,
}

impl FeedClient {
    pub fn new(api: Arc<dyn FeedApi>, confirm: Arc<dyn Confirm>) -> Self {
        let store = Arc::new(Store::default());
        let processor = Arc::new(Processor::new(PROCESSOR_SCOPE, Arc::clone(&store)));
        Self {
            store,
            api,
            processor,
            confirm,
            rollback_on_failure: false,
        }
    }

    pub fn from_settings(settings: &ClientSettings, confirm: Arc<dyn Confirm>) -> Result<Self> {
        let server_url = normalize_server_url(&settings.server_url)?;
        let api = HttpFeedApi::new(server_url).with_access_token(settings.access_token.clone());
        Ok(Self::new(Arc::new(api), confirm).with_rollback_on_failure(settings.rollback_on_failure))
    }

    pub fn with_rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn processor(&self) -> &Arc<Processor> {
        &self.processor
    }

    /// Opens or closes the user menu. Logged-out users have no menu.
    pub fn toggle_user_menu(&self) -> ClientResult<Outcome<bool>> {
        if !self.store.is_logged_in() {
            return Ok(Outcome::Skipped(SkipReason::NotLoggedIn));
        }
        self.store.dispatch(Action::ToggleUserPopover)?;
        Ok(Outcome::Applied(
            self.store.read(|state| state.header.user_popover_visible),
        ))
    }

    /// Shows or hides the new-article panel.
    pub fn toggle_create_article(&self) -> ClientResult<Outcome<bool>> {
        if !self.store.is_logged_in() {
            return Ok(Outcome::Skipped(SkipReason::NotLoggedIn));
        }
        self.store.dispatch(Action::ToggleCreateArticle)?;
        Ok(Outcome::Applied(
            self.store.read(|state| state.header.create_article_visible),
        ))
    }

    pub fn articles(&self) -> ArticleInteractions {
        ArticleInteractions::new(
            Arc::clone(&self.store),
            Arc::clone(&self.api),
            Arc::clone(&self.processor),
            Arc::clone(&self.confirm),
        )
        .with_rollback_on_failure(self.rollback_on_failure)
    }

    pub fn profile(&self) -> ProfileEditor {
        ProfileEditor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.api),
            Arc::clone(&self.processor),
        )
    }

    pub fn verification(&self, email: impl Into<String>, kind: ChallengeKind) -> VerificationSession {
        VerificationSession::new(
            email,
            kind,
            Arc::clone(&self.store),
            Arc::clone(&self.api),
            Arc::clone(&self.processor),
        )
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

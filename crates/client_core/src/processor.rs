//! Async action processor: runs one request per [`PendingKey`] at a time and
//! publishes failures through the store's notification slot.

use std::{
    collections::HashSet,
    fmt,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use shared::{domain::ArticleId, protocol::Notification};
use tracing::{debug, warn};

use crate::{
    error::{ClientError, ClientResult},
    store::{Action, Store},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    LoadFeed,
    Like,
    Bookmark,
    CreateComment,
    RemoveArticle,
    PatchUser,
    ResendSecret,
    VerifyKey,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::LoadFeed => "load_feed",
            OperationKind::Like => "like",
            OperationKind::Bookmark => "bookmark",
            OperationKind::CreateComment => "create_comment",
            OperationKind::RemoveArticle => "remove_article",
            OperationKind::PatchUser => "patch_user",
            OperationKind::ResendSecret => "resend_secret",
            OperationKind::VerifyKey => "verify_key",
        }
    }
}

/// Identifies one (operation, entity) pair; at most one request per key is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub kind: OperationKind,
    pub article_id: Option<ArticleId>,
}

impl PendingKey {
    pub fn article(kind: OperationKind, article_id: ArticleId) -> Self {
        Self {
            kind,
            article_id: Some(article_id),
        }
    }

    pub fn global(kind: OperationKind) -> Self {
        Self {
            kind,
            article_id: None,
        }
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.article_id {
            Some(article_id) => write!(f, "{}#{}", self.kind.name(), article_id),
            None => f.write_str(self.kind.name()),
        }
    }
}

pub struct Processor {
    scope: &'static str,
    store: Arc<Store>,
    in_flight: Mutex<HashSet<PendingKey>>,
}

/// Clears the key when dropped, so a settled or cancelled operation never
/// leaves its key loading.
struct InFlightGuard<'a> {
    processor: &'a Processor,
    key: PendingKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.processor
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl Processor {
    pub fn new(scope: &'static str, store: Arc<Store>) -> Self {
        Self {
            scope,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn is_loading(&self, key: PendingKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }

    fn begin(&self, key: PendingKey) -> Option<InFlightGuard<'_>> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        // Only the caller that inserted the key may own a guard for it.
        inserted.then(|| InFlightGuard {
            processor: self,
            key,
        })
    }

    /// Marks `key` loading, then runs `op` to completion.
    ///
    /// `op` is only invoked once the key is claimed, so anything it does before
    /// its first await (an optimistic dispatch, say) happens at most once per
    /// in-flight request. A second call for a busy key returns
    /// [`ClientError::InFlight`] without invoking `op`. Failures are published
    /// as an error notification and returned; there is no retry.
    pub async fn process<T, F, Fut>(&self, key: PendingKey, op: F) -> ClientResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let Some(_guard) = self.begin(key) else {
            debug!(scope = self.scope, %key, "processor: rejected duplicate trigger");
            return Err(ClientError::InFlight { key });
        };

        debug!(scope = self.scope, %key, "processor: started");
        match op().await {
            Ok(value) => {
                debug!(scope = self.scope, %key, "processor: settled");
                Ok(value)
            }
            Err(err) => {
                warn!(scope = self.scope, %key, "processor: failed: {err}");
                let _ = self
                    .store
                    .dispatch(Action::SetMessage(Notification::error(err.user_message())));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/processor_tests.rs"]
mod tests;

//! Per-article handlers: like, bookmark, comment, remove, edit.
//!
//! Toggles are optimistic: the store flips before the request goes out. Comment
//! creation and removal wait for the server and apply its answer. A failed
//! toggle is not reverted unless rollback was enabled on the handler.

use std::sync::Arc;

use shared::{
    domain::ArticleId,
    protocol::{Comment, CreateCommentRequest, EditArticleDraft, FeedEntry, Notification},
};
use tracing::{debug, info, warn};

use crate::{
    api::FeedApi,
    error::{ClientError, ClientResult, Outcome, SkipReason},
    processor::{OperationKind, PendingKey, Processor},
    store::{Action, Store},
};

pub const REMOVE_ARTICLE_PROMPT: &str = "Delete this article?";
pub const ARTICLE_REMOVED_MESSAGE: &str = "Deleted.";

/// Blocking yes/no prompt shown before destructive actions.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Comment editor state under one article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentDraft {
    pub content: String,
    pub expanded: bool,
}

impl CommentDraft {
    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    fn clear(&mut self) {
        self.content.clear();
        self.expanded = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Like,
    Bookmark,
}

impl Toggle {
    fn kind(self) -> OperationKind {
        match self {
            Toggle::Like => OperationKind::Like,
            Toggle::Bookmark => OperationKind::Bookmark,
        }
    }

    fn is_on(self, entry: &FeedEntry) -> bool {
        match self {
            Toggle::Like => entry.is_liked,
            Toggle::Bookmark => entry.is_bookmarked,
        }
    }

    fn action(self, index: usize, on: bool) -> Action {
        match (self, on) {
            (Toggle::Like, true) => Action::CreateLike(index),
            (Toggle::Like, false) => Action::RemoveLike(index),
            (Toggle::Bookmark, true) => Action::CreateBookmark(index),
            (Toggle::Bookmark, false) => Action::RemoveBookmark(index),
        }
    }

    fn operation(self, on: bool) -> &'static str {
        match (self, on) {
            (Toggle::Like, true) => "like.create",
            (Toggle::Like, false) => "like.remove",
            (Toggle::Bookmark, true) => "bookmark.create",
            (Toggle::Bookmark, false) => "bookmark.remove",
        }
    }
}

#[derive(Clone)]
pub struct ArticleInteractions {
    store: Arc<Store>,
    api: Arc<dyn FeedApi>,
    processor: Arc<Processor>,
    confirm: Arc<dyn Confirm>,
    rollback_on_failure: bool,
}

impl ArticleInteractions {
    pub fn new(
        store: Arc<Store>,
        api: Arc<dyn FeedApi>,
        processor: Arc<Processor>,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        Self {
            store,
            api,
            processor,
            confirm,
            rollback_on_failure: false,
        }
    }

    /// Revert an optimistic toggle when its request fails.
    pub fn with_rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    pub fn is_loading(&self, kind: OperationKind, article_id: ArticleId) -> bool {
        self.processor
            .is_loading(PendingKey::article(kind, article_id))
    }

    /// Replaces the feed with the server's latest articles.
    pub async fn refresh(&self) -> ClientResult<Outcome<usize>> {
        let key = PendingKey::global(OperationKind::LoadFeed);
        let result = self
            .processor
            .process(key, || async {
                self.api
                    .list_articles()
                    .await
                    .map_err(|err| ClientError::from_request("article.list", err))
            })
            .await;

        let articles = match result {
            Ok(articles) => articles,
            Err(ClientError::InFlight { .. }) => return Ok(Outcome::Skipped(SkipReason::InFlight)),
            Err(err) => return Err(err),
        };
        let count = articles.len();
        self.store.dispatch(Action::SetArticles(articles))?;
        info!(count, "feed: loaded articles");
        Ok(Outcome::Applied(count))
    }

    pub async fn toggle_like(&self, index: usize) -> ClientResult<Outcome> {
        self.toggle(index, Toggle::Like).await
    }

    pub async fn toggle_bookmark(&self, index: usize) -> ClientResult<Outcome> {
        self.toggle(index, Toggle::Bookmark).await
    }

    async fn toggle(&self, index: usize, toggle: Toggle) -> ClientResult<Outcome> {
        let entry = self.store.article(index)?;
        if !self.store.is_logged_in() {
            debug!(index, operation = toggle.kind().name(), "feed: skipped, not logged in");
            return Ok(Outcome::Skipped(SkipReason::NotLoggedIn));
        }

        let article_id = entry.id;
        let was_on = toggle.is_on(&entry);
        let key = PendingKey::article(toggle.kind(), article_id);
        let generation = self.store.read(|state| state.feed_generation);
        let result = self
            .processor
            .process(key, || async move {
                self.store
                    .dispatch_for_article(article_id, |index| toggle.action(index, !was_on))?;
                let response = match (toggle, was_on) {
                    (Toggle::Like, false) => self.api.create_like(article_id).await,
                    (Toggle::Like, true) => self.api.remove_like(article_id).await,
                    (Toggle::Bookmark, false) => self.api.create_bookmark(article_id).await,
                    (Toggle::Bookmark, true) => self.api.remove_bookmark(article_id).await,
                };
                response.map_err(|err| ClientError::from_request(toggle.operation(!was_on), err))
            })
            .await;

        match result {
            Ok(()) => {
                info!(%article_id, operation = toggle.operation(!was_on), "feed: toggled");
                Ok(Outcome::Applied(()))
            }
            Err(ClientError::InFlight { .. }) => Ok(Outcome::Skipped(SkipReason::InFlight)),
            Err(err) => {
                if self.rollback_on_failure {
                    self.roll_back(article_id, toggle, was_on, generation);
                }
                Err(err)
            }
        }
    }

    /// Reverts the optimistic value, unless the feed was reloaded while the
    /// request was out: the entry then holds server data, not our guess.
    fn roll_back(&self, article_id: ArticleId, toggle: Toggle, was_on: bool, generation: u64) {
        let still_optimistic = self.store.read(|state| {
            if state.feed_generation != generation {
                debug!(%article_id, "feed: feed reloaded, rollback skipped");
                return false;
            }
            state
                .index_of(article_id)
                .and_then(|index| state.articles.get(index))
                .is_some_and(|entry| toggle.is_on(entry) != was_on)
        });
        if !still_optimistic {
            return;
        }
        match self
            .store
            .dispatch_for_article(article_id, |index| toggle.action(index, was_on))
        {
            Ok(_) => info!(%article_id, operation = toggle.kind().name(), "feed: rolled back"),
            Err(err) => warn!(%article_id, "feed: rollback failed: {err}"),
        }
    }

    /// Posts `draft` as a comment. The draft is cleared and collapsed, and the
    /// comment added to the store, only once the server has answered.
    pub async fn create_comment(
        &self,
        index: usize,
        draft: &mut CommentDraft,
    ) -> ClientResult<Outcome<Comment>> {
        let entry = self.store.article(index)?;
        if !self.store.is_logged_in() {
            debug!(index, "feed: comment skipped, not logged in");
            return Ok(Outcome::Skipped(SkipReason::NotLoggedIn));
        }
        if draft.content.trim().is_empty() {
            return Ok(Outcome::Skipped(SkipReason::EmptyInput));
        }

        let article_id = entry.id;
        let request = CreateCommentRequest {
            article_id,
            content: draft.content.clone(),
        };
        let key = PendingKey::article(OperationKind::CreateComment, article_id);
        let result = self
            .processor
            .process(key, || async move {
                self.api
                    .create_comment(request)
                    .await
                    .map_err(|err| ClientError::from_request("comment.create", err))
            })
            .await;

        let comment = match result {
            Ok(comment) => comment,
            Err(ClientError::InFlight { .. }) => return Ok(Outcome::Skipped(SkipReason::InFlight)),
            Err(err) => return Err(err),
        };

        draft.clear();
        let applied = self.store.dispatch_for_article(article_id, |index| Action::CreateComment {
            index,
            comment: comment.clone(),
        })?;
        if !applied {
            warn!(%article_id, "feed: article left the feed before its comment was confirmed");
        }
        info!(%article_id, comment_id = %comment.id, "feed: comment created");
        Ok(Outcome::Applied(comment))
    }

    /// Deletes the article after the owner confirms.
    pub async fn remove_article(&self, index: usize) -> ClientResult<Outcome> {
        let entry = self.store.article(index)?;
        if let Some(reason) = self.owner_precondition(&entry) {
            debug!(index, ?reason, "feed: remove skipped");
            return Ok(Outcome::Skipped(reason));
        }

        let article_id = entry.id;
        let key = PendingKey::article(OperationKind::RemoveArticle, article_id);
        if self.processor.is_loading(key) {
            return Ok(Outcome::Skipped(SkipReason::InFlight));
        }
        if !self.confirm.confirm(REMOVE_ARTICLE_PROMPT) {
            debug!(%article_id, "feed: remove declined");
            return Ok(Outcome::Skipped(SkipReason::Declined));
        }

        let result = self
            .processor
            .process(key, || async move {
                self.api
                    .remove_article(article_id)
                    .await
                    .map_err(|err| ClientError::from_request("article.remove", err))
            })
            .await;
        match result {
            Ok(()) => {}
            Err(ClientError::InFlight { .. }) => return Ok(Outcome::Skipped(SkipReason::InFlight)),
            Err(err) => return Err(err),
        }

        self.store
            .dispatch_for_article(article_id, Action::RemoveArticle)?;
        self.store.dispatch(Action::SetMessage(Notification::success(
            ARTICLE_REMOVED_MESSAGE,
        )))?;
        info!(%article_id, "feed: article removed");
        Ok(Outcome::Applied(()))
    }

    /// Hands the article to the editor. Owner only.
    pub fn begin_edit(&self, index: usize) -> ClientResult<Outcome<EditArticleDraft>> {
        let entry = self.store.article(index)?;
        if let Some(reason) = self.owner_precondition(&entry) {
            debug!(index, ?reason, "feed: edit skipped");
            return Ok(Outcome::Skipped(reason));
        }

        let draft = EditArticleDraft {
            id: entry.id,
            content: entry.content,
            photos: entry.photos,
        };
        self.store.dispatch(Action::SetEditArticle(draft.clone()))?;
        Ok(Outcome::Applied(draft))
    }

    fn owner_precondition(&self, entry: &FeedEntry) -> Option<SkipReason> {
        self.store.read(|state| {
            if !state.is_logged_in() {
                Some(SkipReason::NotLoggedIn)
            } else if !state.is_owner(entry) {
                Some(SkipReason::NotOwner)
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/interactions_tests.rs"]
mod tests;

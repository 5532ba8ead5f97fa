//! Interaction state store: a pure reducer over [`AppState`] plus a
//! [`Store`] that serializes dispatches and broadcasts every applied action.
//!
//! Feed entries are addressed by position. An index past the end of the feed
//! is a programming error: the reducer returns
//! [`ClientError::IndexOutOfRange`] and the state is left untouched.

use std::sync::{PoisonError, RwLock};

use shared::{
    domain::ArticleId,
    protocol::{Comment, EditArticleDraft, FeedEntry, Notification, UserProfile},
};
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::error::{ClientError, ClientResult};

const STORE_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderState {
    pub user_popover_visible: bool,
    pub create_article_visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    /// Feed in display order.
    pub articles: Vec<FeedEntry>,
    /// `None` while logged out.
    pub user: Option<UserProfile>,
    pub edit_article: Option<EditArticleDraft>,
    pub notification: Option<Notification>,
    pub header: HeaderState,
    /// Bumped each time the feed is replaced wholesale.
    pub feed_generation: u64,
}

impl AppState {
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn article(&self, index: usize) -> ClientResult<&FeedEntry> {
        self.articles
            .get(index)
            .ok_or(ClientError::IndexOutOfRange {
                index,
                len: self.articles.len(),
            })
    }

    pub fn index_of(&self, article_id: ArticleId) -> Option<usize> {
        self.articles.iter().position(|entry| entry.id == article_id)
    }

    /// True when the logged-in user created `entry`.
    pub fn is_owner(&self, entry: &FeedEntry) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.id == entry.creator.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetArticles(Vec<FeedEntry>),
    CreateComment { index: usize, comment: Comment },
    CreateLike(usize),
    RemoveLike(usize),
    CreateBookmark(usize),
    RemoveBookmark(usize),
    RemoveArticle(usize),
    SetEditArticle(EditArticleDraft),
    SetUser(UserProfile),
    PatchUser { name: String, introduce: String },
    LogOut,
    SetMessage(Notification),
    ClearMessage,
    ToggleUserPopover,
    HideUserPopover,
    ToggleCreateArticle,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetArticles(_) => "set_articles",
            Action::CreateComment { .. } => "create_comment",
            Action::CreateLike(_) => "create_like",
            Action::RemoveLike(_) => "remove_like",
            Action::CreateBookmark(_) => "create_bookmark",
            Action::RemoveBookmark(_) => "remove_bookmark",
            Action::RemoveArticle(_) => "remove_article",
            Action::SetEditArticle(_) => "set_edit_article",
            Action::SetUser(_) => "set_user",
            Action::PatchUser { .. } => "patch_user",
            Action::LogOut => "log_out",
            Action::SetMessage(_) => "set_message",
            Action::ClearMessage => "clear_message",
            Action::ToggleUserPopover => "toggle_user_popover",
            Action::HideUserPopover => "hide_user_popover",
            Action::ToggleCreateArticle => "toggle_create_article",
        }
    }

    /// Feed index the action targets, if any.
    pub fn target_index(&self) -> Option<usize> {
        match self {
            Action::CreateComment { index, .. }
            | Action::CreateLike(index)
            | Action::RemoveLike(index)
            | Action::CreateBookmark(index)
            | Action::RemoveBookmark(index)
            | Action::RemoveArticle(index) => Some(*index),
            _ => None,
        }
    }
}

/// Computes the state that results from applying `action` to `state`.
pub fn reduce(state: &AppState, action: &Action) -> ClientResult<AppState> {
    if let Some(index) = action.target_index() {
        state.article(index)?;
    }

    let mut next = state.clone();
    match action {
        Action::SetArticles(articles) => {
            next.articles = articles.clone();
            next.feed_generation += 1;
        }
        Action::CreateComment { index, comment } => {
            let entry = &mut next.articles[*index];
            entry.comments.push(comment.clone());
            entry.comment_number += 1;
        }
        Action::CreateLike(index) => {
            let entry = &mut next.articles[*index];
            entry.is_liked = true;
            entry.like_number += 1;
        }
        Action::RemoveLike(index) => {
            let entry = &mut next.articles[*index];
            entry.is_liked = false;
            entry.like_number -= 1;
        }
        Action::CreateBookmark(index) => next.articles[*index].is_bookmarked = true,
        Action::RemoveBookmark(index) => next.articles[*index].is_bookmarked = false,
        Action::RemoveArticle(index) => {
            next.articles.remove(*index);
        }
        Action::SetEditArticle(draft) => next.edit_article = Some(draft.clone()),
        Action::SetUser(user) => next.user = Some(user.clone()),
        Action::PatchUser { name, introduce } => {
            if let Some(user) = next.user.as_mut() {
                user.name = name.clone();
                user.introduce = Some(introduce.clone());
            }
        }
        Action::LogOut => {
            next.user = None;
            next.edit_article = None;
            next.header = HeaderState::default();
        }
        Action::SetMessage(notification) => next.notification = Some(notification.clone()),
        Action::ClearMessage => next.notification = None,
        Action::ToggleUserPopover => {
            next.header.user_popover_visible = !next.header.user_popover_visible
        }
        Action::HideUserPopover => next.header.user_popover_visible = false,
        Action::ToggleCreateArticle => {
            next.header.create_article_visible = !next.header.create_article_visible
        }
    }
    Ok(next)
}

/// Owns the [`AppState`]; every mutation goes through [`Store::dispatch`].
pub struct Store {
    state: RwLock<AppState>,
    events: broadcast::Sender<Action>,
}

impl Store {
    pub fn new(initial: AppState) -> Self {
        let (events, _) = broadcast::channel(STORE_EVENT_CAPACITY);
        Self {
            state: RwLock::new(initial),
            events,
        }
    }

    pub fn dispatch(&self, action: Action) -> ClientResult<()> {
        {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match reduce(&guard, &action) {
                Ok(next) => *guard = next,
                Err(err) => {
                    error!(action = action.name(), "store: rejected dispatch: {err}");
                    return Err(err);
                }
            }
        }
        debug!(action = action.name(), "store: applied");
        let _ = self.events.send(action);
        Ok(())
    }

    /// Resolves the current index of `article_id` and dispatches the action
    /// built for it, under one lock. Returns `false` if the article has left
    /// the feed.
    pub fn dispatch_for_article(
        &self,
        article_id: ArticleId,
        build: impl FnOnce(usize) -> Action,
    ) -> ClientResult<bool> {
        let action = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let Some(index) = guard.index_of(article_id) else {
                debug!(%article_id, "store: article no longer in feed");
                return Ok(false);
            };
            let action = build(index);
            *guard = reduce(&guard, &action)?;
            action
        };
        debug!(action = action.name(), %article_id, "store: applied");
        let _ = self.events.send(action);
        Ok(true)
    }

    /// Runs `f` against the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn snapshot(&self) -> AppState {
        self.read(Clone::clone)
    }

    pub fn article(&self, index: usize) -> ClientResult<FeedEntry> {
        self.read(|state| state.article(index).cloned())
            .inspect_err(|err| error!("store: {err}"))
    }

    pub fn index_of(&self, article_id: ArticleId) -> Option<usize> {
        self.read(|state| state.index_of(article_id))
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.read(|state| state.user.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        self.read(AppState::is_logged_in)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.events.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;

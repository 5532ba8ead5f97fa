//! In-memory resource client and fixtures shared by the unit tests.

use std::sync::{
    atomic::{AtomicBool, AtomicI64, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shared::{
    domain::{ArticleId, ChallengeKind, CommentId, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        Comment, CreateCommentRequest, Creator, FeedEntry, PatchUserRequest, UserProfile,
        VerifyKeyRequest, VerifyKeyResponse,
    },
};
use tokio::sync::Notify;

use crate::{
    api::FeedApi,
    interactions::{ArticleInteractions, Confirm},
    processor::Processor,
    store::{AppState, Store},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiCall {
    ListArticles,
    RemoveArticle(ArticleId),
    CreateComment { article_id: ArticleId, content: String },
    CreateLike(ArticleId),
    RemoveLike(ArticleId),
    CreateBookmark(ArticleId),
    RemoveBookmark(ArticleId),
    PatchUser { name: String, introduce: String },
    SendSecret { kind: ChallengeKind, email: String },
    VerifyKey { email: String, secret_key: String },
}

#[derive(Default)]
pub(crate) struct FakeFeedApi {
    calls: Mutex<Vec<ApiCall>>,
    failure: Mutex<Option<String>>,
    rejection: Mutex<Option<ApiError>>,
    hold: AtomicBool,
    entered: Notify,
    released: Notify,
    articles: Mutex<Vec<FeedEntry>>,
    next_comment_id: AtomicI64,
    session_cleared: AtomicBool,
}

impl FakeFeedApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call blocks until [`FakeFeedApi::release`] is called.
    pub(crate) fn holding() -> Arc<Self> {
        let api = Self::default();
        api.hold.store(true, Ordering::SeqCst);
        Arc::new(api)
    }

    pub(crate) fn with_articles(articles: Vec<FeedEntry>) -> Arc<Self> {
        let api = Self::default();
        *api.articles.lock().expect("articles") = articles;
        Arc::new(api)
    }

    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock().expect("failure") = Some(message.to_string());
    }

    pub(crate) fn reject_with(&self, code: ErrorCode, message: &str) {
        *self.rejection.lock().expect("rejection") = Some(ApiError::new(code, message));
    }

    pub(crate) fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub(crate) fn session_cleared(&self) -> bool {
        self.session_cleared.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.released.notify_one();
    }

    async fn record(&self, call: ApiCall) -> Result<()> {
        self.calls.lock().expect("calls").push(call);
        if self.hold.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        if let Some(api_error) = self.rejection.lock().expect("rejection").clone() {
            return Err(ApiException::from(api_error).into());
        }
        if let Some(message) = self.failure.lock().expect("failure").clone() {
            return Err(anyhow!(message));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedApi for FakeFeedApi {
    async fn list_articles(&self) -> Result<Vec<FeedEntry>> {
        self.record(ApiCall::ListArticles).await?;
        Ok(self.articles.lock().expect("articles").clone())
    }

    async fn remove_article(&self, article_id: ArticleId) -> Result<()> {
        self.record(ApiCall::RemoveArticle(article_id)).await
    }

    async fn create_comment(&self, request: CreateCommentRequest) -> Result<Comment> {
        self.record(ApiCall::CreateComment {
            article_id: request.article_id,
            content: request.content.clone(),
        })
        .await?;
        let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst) + 100;
        Ok(Comment {
            id: CommentId(id),
            content: request.content,
            created_at: fixed_time(),
            creator: creator(1),
        })
    }

    async fn create_like(&self, article_id: ArticleId) -> Result<()> {
        self.record(ApiCall::CreateLike(article_id)).await
    }

    async fn remove_like(&self, article_id: ArticleId) -> Result<()> {
        self.record(ApiCall::RemoveLike(article_id)).await
    }

    async fn create_bookmark(&self, article_id: ArticleId) -> Result<()> {
        self.record(ApiCall::CreateBookmark(article_id)).await
    }

    async fn remove_bookmark(&self, article_id: ArticleId) -> Result<()> {
        self.record(ApiCall::RemoveBookmark(article_id)).await
    }

    async fn patch_user(&self, request: PatchUserRequest) -> Result<()> {
        self.record(ApiCall::PatchUser {
            name: request.name,
            introduce: request.introduce,
        })
        .await
    }

    async fn send_secret(&self, kind: ChallengeKind, email: &str) -> Result<()> {
        self.record(ApiCall::SendSecret {
            kind,
            email: email.to_string(),
        })
        .await
    }

    async fn verify_key(&self, request: VerifyKeyRequest) -> Result<VerifyKeyResponse> {
        self.record(ApiCall::VerifyKey {
            email: request.email.clone(),
            secret_key: request.secret_key,
        })
        .await?;
        Ok(VerifyKeyResponse {
            token: format!("token-for-{}", request.email),
            user: user(1),
        })
    }

    fn clear_session(&self) {
        self.session_cleared.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(crate) fn creator(id: i64) -> Creator {
    Creator {
        id: UserId(id),
        name: format!("user-{id}"),
        avatar: None,
    }
}

pub(crate) fn user(id: i64) -> UserProfile {
    UserProfile {
        id: UserId(id),
        name: format!("user-{id}"),
        avatar: None,
        introduce: None,
    }
}

pub(crate) fn entry(id: i64, creator_id: i64) -> FeedEntry {
    FeedEntry {
        id: ArticleId(id),
        creator: creator(creator_id),
        content: format!("article {id}"),
        photos: vec![format!("https://cdn.example/{id}.png")],
        created_at: fixed_time(),
        is_liked: false,
        like_number: 0,
        is_bookmarked: false,
        comment_number: 0,
        comments: Vec::new(),
    }
}

/// Feed of three articles (ids 10, 11, 12) by users 1, 2 and 2.
pub(crate) fn sample_feed() -> Vec<FeedEntry> {
    let mut third = entry(12, 2);
    third.like_number = 10;
    vec![entry(10, 1), entry(11, 2), third]
}

pub(crate) fn store_with(user: Option<UserProfile>, articles: Vec<FeedEntry>) -> Arc<Store> {
    Arc::new(Store::new(AppState {
        articles,
        user,
        ..AppState::default()
    }))
}

pub(crate) fn processor_for(store: &Arc<Store>) -> Arc<Processor> {
    Arc::new(Processor::new("test", Arc::clone(store)))
}

pub(crate) fn interactions(
    store: &Arc<Store>,
    api: &Arc<FakeFeedApi>,
    confirm: impl Confirm + 'static,
) -> ArticleInteractions {
    let api: Arc<dyn FeedApi> = api.clone();
    ArticleInteractions::new(
        Arc::clone(store),
        api,
        processor_for(store),
        Arc::new(confirm),
    )
}

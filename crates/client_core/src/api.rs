//! Resource clients for the feed backend.

use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ArticleId, ChallengeKind},
    error::{ApiError, ApiException},
    protocol::{
        ArticleRef, Comment, CreateCommentRequest, FeedEntry, PatchUserRequest,
        SendSecretRequest, VerifyKeyRequest, VerifyKeyResponse,
    },
};
use tracing::debug;
use url::Url;

#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn list_articles(&self) -> Result<Vec<FeedEntry>>;
    async fn remove_article(&self, article_id: ArticleId) -> Result<()>;
    async fn create_comment(&self, request: CreateCommentRequest) -> Result<Comment>;
    async fn create_like(&self, article_id: ArticleId) -> Result<()>;
    async fn remove_like(&self, article_id: ArticleId) -> Result<()>;
    async fn create_bookmark(&self, article_id: ArticleId) -> Result<()>;
    async fn remove_bookmark(&self, article_id: ArticleId) -> Result<()>;
    async fn patch_user(&self, request: PatchUserRequest) -> Result<()>;
    async fn send_secret(&self, kind: ChallengeKind, email: &str) -> Result<()>;
    async fn verify_key(&self, request: VerifyKeyRequest) -> Result<VerifyKeyResponse>;
    /// Forgets any credentials held for the logged-in user.
    fn clear_session(&self);
}

pub struct HttpFeedApi {
    http: Client,
    base_url: Url,
    access_token: RwLock<Option<String>>,
}

impl HttpFeedApi {
    pub fn new(server_url: Url) -> Self {
        let mut base_url = server_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http: Client::new(),
            base_url,
            access_token: RwLock::new(None),
        }
    }

    pub fn with_access_token(self, token: Option<String>) -> Self {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
        self
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path: {path}"))?;
        let builder = self.http.request(method, url);
        Ok(match self.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let res = builder.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.unwrap_or_default();
        debug!(%status, "api: request failed body={body}");
        match serde_json::from_str::<ApiError>(&body) {
            Ok(api_error) => Err(ApiException::from(api_error).into()),
            Err(_) => Err(anyhow!("server responded with {status}")),
        }
    }

    async fn send_article_ref(&self, method: Method, path: &str, article_id: ArticleId) -> Result<()> {
        let builder = self.request(method, path)?.json(&ArticleRef { article_id });
        self.execute(builder).await?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T> {
        res.json()
            .await
            .context("failed to decode server response")
    }
}

#[async_trait]
impl FeedApi for HttpFeedApi {
    async fn list_articles(&self) -> Result<Vec<FeedEntry>> {
        let res = self.execute(self.request(Method::GET, "article")?).await?;
        Self::read_json(res).await
    }

    async fn remove_article(&self, article_id: ArticleId) -> Result<()> {
        let path = format!("article/{article_id}");
        self.execute(self.request(Method::DELETE, &path)?).await?;
        Ok(())
    }

    async fn create_comment(&self, request: CreateCommentRequest) -> Result<Comment> {
        let builder = self.request(Method::POST, "comment")?.json(&request);
        let res = self.execute(builder).await?;
        Self::read_json(res).await
    }

    async fn create_like(&self, article_id: ArticleId) -> Result<()> {
        self.send_article_ref(Method::POST, "like", article_id).await
    }

    async fn remove_like(&self, article_id: ArticleId) -> Result<()> {
        self.send_article_ref(Method::DELETE, "like", article_id).await
    }

    async fn create_bookmark(&self, article_id: ArticleId) -> Result<()> {
        self.send_article_ref(Method::POST, "bookmark", article_id).await
    }

    async fn remove_bookmark(&self, article_id: ArticleId) -> Result<()> {
        self.send_article_ref(Method::DELETE, "bookmark", article_id)
            .await
    }

    async fn patch_user(&self, request: PatchUserRequest) -> Result<()> {
        let builder = self.request(Method::PATCH, "user")?.json(&request);
        self.execute(builder).await?;
        Ok(())
    }

    async fn send_secret(&self, kind: ChallengeKind, email: &str) -> Result<()> {
        let path = format!("auth/secret/{}", kind.path_segment());
        let builder = self.request(Method::POST, &path)?.json(&SendSecretRequest {
            email: email.to_string(),
        });
        self.execute(builder).await?;
        Ok(())
    }

    async fn verify_key(&self, request: VerifyKeyRequest) -> Result<VerifyKeyResponse> {
        let builder = self.request(Method::POST, "auth/verify")?.json(&request);
        let res = self.execute(builder).await?;
        let body: VerifyKeyResponse = Self::read_json(res).await?;
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(body.token.clone());
        Ok(body)
    }

    fn clear_session(&self) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;

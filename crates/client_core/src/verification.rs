//! Email one-time-code verification for log-in and registration.

use std::sync::{Arc, Mutex, PoisonError};

use shared::{
    domain::ChallengeKind,
    protocol::{UserProfile, VerifyKeyRequest},
};
use tracing::{debug, info};

use crate::{
    api::FeedApi,
    error::{ClientError, ClientResult, Outcome, SkipReason},
    processor::{OperationKind, PendingKey, Processor},
    store::{Action, Store},
};

#[derive(Debug, Default)]
struct SessionFields {
    is_sent: bool,
    secret_key: String,
    completed: bool,
}

/// One pending identity challenge for `email`.
pub struct VerificationSession {
    email: String,
    kind: ChallengeKind,
    fields: Mutex<SessionFields>,
    store: Arc<Store>,
    api: Arc<dyn FeedApi>,
    processor: Arc<Processor>,
}

impl VerificationSession {
    pub fn new(
        email: impl Into<String>,
        kind: ChallengeKind,
        store: Arc<Store>,
        api: Arc<dyn FeedApi>,
        processor: Arc<Processor>,
    ) -> Self {
        Self {
            email: email.into(),
            kind,
            fields: Mutex::new(SessionFields::default()),
            store,
            api,
            processor,
        }
    }

    fn with_fields<R>(&self, f: impl FnOnce(&mut SessionFields) -> R) -> R {
        let mut guard = self.fields.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn kind(&self) -> ChallengeKind {
        self.kind
    }

    /// True once a code has been sent during this session.
    pub fn is_sent(&self) -> bool {
        self.with_fields(|fields| fields.is_sent)
    }

    pub fn secret_key(&self) -> String {
        self.with_fields(|fields| fields.secret_key.clone())
    }

    pub fn set_secret_key(&self, value: impl Into<String>) {
        let value = value.into();
        self.with_fields(|fields| fields.secret_key = value);
    }

    pub fn is_completed(&self) -> bool {
        self.with_fields(|fields| fields.completed)
    }

    pub fn resend_loading(&self) -> bool {
        self.processor
            .is_loading(PendingKey::global(OperationKind::ResendSecret))
    }

    pub fn verify_loading(&self) -> bool {
        self.processor
            .is_loading(PendingKey::global(OperationKind::VerifyKey))
    }

    pub fn can_resend(&self) -> bool {
        !self.is_completed() && !self.resend_loading()
    }

    pub fn can_verify(&self) -> bool {
        !self.is_completed()
            && !self.secret_key().is_empty()
            && !self.resend_loading()
            && !self.verify_loading()
    }

    pub async fn resend_secret(&self) -> ClientResult<Outcome> {
        if self.is_completed() {
            return Ok(Outcome::Skipped(SkipReason::Completed));
        }

        let key = PendingKey::global(OperationKind::ResendSecret);
        let result = self
            .processor
            .process(key, || async {
                self.api
                    .send_secret(self.kind, &self.email)
                    .await
                    .map_err(|err| ClientError::from_request("auth.secret", err))
            })
            .await;
        match result {
            Ok(()) => {
                self.with_fields(|fields| fields.is_sent = true);
                info!(kind = ?self.kind, "verification: code sent");
                Ok(Outcome::Applied(()))
            }
            Err(ClientError::InFlight { .. }) => {
                debug!("verification: resend already in flight");
                Ok(Outcome::Skipped(SkipReason::InFlight))
            }
            Err(err) => Err(err),
        }
    }

    /// Checks the entered code. On success the user is logged in and the
    /// session is finished.
    pub async fn verify_key(&self) -> ClientResult<Outcome<UserProfile>> {
        if self.is_completed() {
            return Ok(Outcome::Skipped(SkipReason::Completed));
        }
        let secret_key = self.secret_key();
        if secret_key.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::EmptyInput));
        }
        if self.resend_loading() {
            return Ok(Outcome::Skipped(SkipReason::InFlight));
        }

        let request = VerifyKeyRequest {
            email: self.email.clone(),
            secret_key,
        };
        let key = PendingKey::global(OperationKind::VerifyKey);
        let result = self
            .processor
            .process(key, || async move {
                self.api
                    .verify_key(request)
                    .await
                    .map_err(|err| ClientError::from_request("auth.verify", err))
            })
            .await;
        let response = match result {
            Ok(response) => response,
            Err(ClientError::InFlight { .. }) => return Ok(Outcome::Skipped(SkipReason::InFlight)),
            Err(err) => return Err(err),
        };

        self.store.dispatch(Action::SetUser(response.user.clone()))?;
        self.with_fields(|fields| fields.completed = true);
        info!(user_id = %response.user.id, kind = ?self.kind, "verification: completed");
        Ok(Outcome::Applied(response.user))
    }
}

#[cfg(test)]
#[path = "tests/verification_tests.rs"]
mod tests;

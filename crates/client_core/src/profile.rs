use std::sync::Arc;

use shared::protocol::{Notification, PatchUserRequest, UserProfile};
use tracing::{debug, info};

use crate::{
    api::FeedApi,
    error::{ClientError, ClientResult, Outcome, SkipReason},
    processor::{OperationKind, PendingKey, Processor},
    store::{Action, Store},
};

pub const PROFILE_SAVED_MESSAGE: &str = "Saved.";

/// Editable copy of the logged-in user's profile fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileForm {
    pub name: String,
    pub introduce: String,
}

impl ProfileForm {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            name: profile.name.clone(),
            introduce: profile.introduce.clone().unwrap_or_default(),
        }
    }

    /// Reason the submit button stays disabled, if any.
    pub fn blocked_by(&self, current: &UserProfile) -> Option<SkipReason> {
        if self.name.is_empty() {
            return Some(SkipReason::EmptyInput);
        }
        let current_introduce = current.introduce.as_deref().unwrap_or_default();
        if self.name == current.name && self.introduce == current_introduce {
            return Some(SkipReason::Unchanged);
        }
        None
    }
}

#[derive(Clone)]
pub struct ProfileEditor {
    store: Arc<Store>,
    api: Arc<dyn FeedApi>,
    processor: Arc<Processor>,
}

impl ProfileEditor {
    pub fn new(store: Arc<Store>, api: Arc<dyn FeedApi>, processor: Arc<Processor>) -> Self {
        Self {
            store,
            api,
            processor,
        }
    }

    /// Form seeded from the current profile; `None` while logged out.
    pub fn form(&self) -> Option<ProfileForm> {
        self.store
            .current_user()
            .map(|profile| ProfileForm::from_profile(&profile))
    }

    pub fn is_loading(&self) -> bool {
        self.processor
            .is_loading(PendingKey::global(OperationKind::PatchUser))
    }

    /// Sends the form, and updates the stored profile only after the server
    /// acknowledges it.
    pub async fn submit(&self, form: &ProfileForm) -> ClientResult<Outcome> {
        let Some(current) = self.store.current_user() else {
            return Ok(Outcome::Skipped(SkipReason::NotLoggedIn));
        };
        if let Some(reason) = form.blocked_by(&current) {
            debug!(?reason, "profile: submit skipped");
            return Ok(Outcome::Skipped(reason));
        }

        let request = PatchUserRequest {
            name: form.name.clone(),
            introduce: form.introduce.clone(),
        };
        let key = PendingKey::global(OperationKind::PatchUser);
        let result = self
            .processor
            .process(key, || async move {
                self.api
                    .patch_user(request)
                    .await
                    .map_err(|err| ClientError::from_request("user.patch", err))
            })
            .await;
        match result {
            Ok(()) => {}
            Err(ClientError::InFlight { .. }) => return Ok(Outcome::Skipped(SkipReason::InFlight)),
            Err(err) => return Err(err),
        }

        self.store.dispatch(Action::PatchUser {
            name: form.name.clone(),
            introduce: form.introduce.clone(),
        })?;
        self.store
            .dispatch(Action::SetMessage(Notification::success(PROFILE_SAVED_MESSAGE)))?;
        info!(user_id = %current.id, "profile: updated");
        Ok(Outcome::Applied(()))
    }

    pub fn log_out(&self) -> ClientResult<()> {
        self.store.dispatch(Action::HideUserPopover)?;
        self.store.dispatch(Action::LogOut)?;
        self.api.clear_session();
        info!("profile: logged out");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/profile_tests.rs"]
mod tests;

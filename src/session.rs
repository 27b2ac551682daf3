use std::sync::Arc;

use log::debug;
use tokio::sync::watch;

use crate::auth;

/// Explicit holder of the signed-in user for one chat scope,
/// set on sign-in and cleared on sign-out.
#[derive(Clone)]
pub struct Session {
    user: Arc<watch::Sender<Option<auth::User>>>,
}

impl Session {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { user: Arc::new(tx) }
    }

    pub fn signed_in(user: auth::User) -> Self {
        let s = Self::new();
        s.sign_in(user);
        s
    }

    /// Returns `true` when the signed-in user actually changed.
    pub fn sign_in(&self, user: auth::User) -> bool {
        self.user.send_if_modified(|current| {
            if current.as_ref() == Some(&user) {
                return false;
            }
            debug!("Session signed in as {:?}", user.id());
            *current = Some(user);
            true
        })
    }

    pub fn sign_out(&self) -> Option<auth::User> {
        let previous = self.user.send_replace(None);
        if let Some(u) = &previous {
            debug!("Session of {:?} signed out", u.id());
        }
        previous
    }

    pub fn current(&self) -> Option<auth::User> {
        self.user.borrow().clone()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

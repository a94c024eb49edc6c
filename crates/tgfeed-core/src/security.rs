use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::{
    domain::{User, UserId},
    store::UserStore,
};

// ============== Authorization ==============

/// Static allow-list check.
pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if allowed_users.is_empty() {
        return false;
    }
    allowed_users.contains(&user_id.0)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// Granted, and the user was just registered as the first administrator.
    Bootstrapped,
    Denied,
}

impl Access {
    pub fn is_granted(&self) -> bool {
        !matches!(self, Access::Denied)
    }
}

/// Decides who may issue commands.
///
/// With a configured allow-list only its members get in. Without one the user
/// store is the allow-list, and the first user to interact with an empty store
/// becomes its administrator.
#[derive(Clone)]
pub struct Authorizer {
    allowed_users: Arc<Vec<i64>>,
    users: Arc<dyn UserStore>,
    bootstrap: Arc<Mutex<()>>,
}

impl Authorizer {
    pub fn new(allowed_users: Vec<i64>, users: Arc<dyn UserStore>) -> Self {
        Self {
            allowed_users: Arc::new(allowed_users),
            users,
            bootstrap: Arc::new(Mutex::new(())),
        }
    }

    pub async fn check(&self, user_id: UserId, handle: &str) -> Access {
        if !self.allowed_users.is_empty() {
            return if is_authorized(Some(user_id), &self.allowed_users) {
                Access::Granted
            } else {
                Access::Denied
            };
        }

        match self.users.get(user_id).await {
            Ok(_) => return Access::Granted,
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!(user_id = %user_id, error = %e, "failed to look up user");
                return Access::Denied;
            }
        }

        // Serialize first-user registration so two strangers can't both become admin.
        let _guard = self.bootstrap.lock().await;
        match self.users.list_all().await {
            Ok(users) if users.is_empty() => {}
            Ok(users) if users.iter().any(|u| u.id == user_id) => return Access::Granted,
            Ok(_) => return Access::Denied,
            Err(e) => {
                error!(error = %e, "failed to list users");
                return Access::Denied;
            }
        }

        let user = User {
            id: user_id,
            handle: handle.to_string(),
            added_at: Utc::now(),
            is_admin: true,
        };
        match self.users.save(&user).await {
            Ok(()) => {
                info!(user_id = %user_id, "first user registered as admin");
                Access::Bootstrapped
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "failed to save first user");
                Access::Denied
            }
        }
    }
}

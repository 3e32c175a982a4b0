use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// The external authentication provider, reduced to the one question the
/// core asks of it.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;
}

/// Fixed identity for the lifetime of the process; the session service
/// runs on behalf of one signed-in rider.
pub struct SessionAuth {
    user: AuthUser,
}

impl SessionAuth {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            user: AuthUser {
                id: id.into(),
                email,
            },
        })
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<AuthUser> {
        Some(self.user.clone())
    }
}

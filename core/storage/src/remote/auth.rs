//! Signed-in user and the authorization headers sent with API calls.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::fmt;

use fragments_common::{Error, OwnerId, Result};

/// An authenticated user of the fragments API.
#[derive(Clone)]
pub struct User {
    /// Display name.
    pub username: String,
    /// Partition key for the local store.
    pub owner_id: OwnerId,
    id_token: String,
}

impl User {
    /// Create a user from an already obtained identity token.
    ///
    /// # Errors
    /// - Token is empty
    pub fn new(
        username: impl Into<String>,
        owner_id: OwnerId,
        id_token: impl Into<String>,
    ) -> Result<Self> {
        let id_token = id_token.into();
        if id_token.trim().is_empty() {
            return Err(Error::InvalidInput("Identity token cannot be empty".to_string()));
        }
        Ok(Self {
            username: username.into(),
            owner_id,
            id_token,
        })
    }

    /// Headers authenticating a request as this user.
    ///
    /// Adds `Content-Type` when one is given.
    pub fn authorization_headers(&self, content_type: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.id_token))
            .map_err(|e| Error::InvalidInput(format!("Invalid identity token: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);

        if let Some(content_type) = content_type {
            let value = HeaderValue::from_str(content_type)
                .map_err(|e| Error::InvalidInput(format!("Invalid content type: {}", e)))?;
            headers.insert(CONTENT_TYPE, value);
        }

        Ok(headers)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("owner_id", &self.owner_id)
            .field("id_token", &"[REDACTED]")
            .finish()
    }
}

/// Source of the signed-in user.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current user, if signed in.
    async fn get_user(&self) -> Result<Option<User>>;

    /// Start a sign-in and return the user once it completes.
    async fn sign_in(&self) -> Result<Option<User>>;
}

/// Auth provider serving a user whose token was obtained out of band.
pub struct StaticTokenAuth {
    user: Option<User>,
}

impl StaticTokenAuth {
    pub fn new(user: User) -> Self {
        Self { user: Some(user) }
    }

    /// Provider with nobody signed in; every remote call is unauthenticated.
    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn get_user(&self) -> Result<Option<User>> {
        Ok(self.user.clone())
    }

    async fn sign_in(&self) -> Result<Option<User>> {
        Ok(self.user.clone())
    }
}

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::{app_state::AppState, error::AppError, models::User};

/// Cookie the external auth layer sets once a login completes. Its value is
/// the username of the signed-in account.
pub const SESSION_COOKIE: &str = "session_user";

/// Request identity: the resolved current user, or anonymous. Also keeps
/// the request path so gated handlers can build the login `next` target.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user: Option<User>,
    path: String,
}

impl Viewer {
    /// The signed-in user, or the Unauthorized redirect back through login.
    pub fn require(&self) -> Result<&User, AppError> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized(self.path.clone()))
    }

}

fn session_username(parts: &Parts) -> Option<String> {
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let mut it = pair.trim().splitn(2, '=');
        if it.next() == Some(SESSION_COOKIE) {
            return it.next().map(str::to_string).filter(|v| !v.is_empty());
        }
    }
    None
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();

        let user = match session_username(parts) {
            Some(username) => state.storage.get_user_by_username(&username).await?,
            None => None,
        };

        Ok(Viewer { user, path })
    }
}

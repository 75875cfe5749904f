use std::{result, str::FromStr, sync::Arc};

use log::{debug, error, info, trace};
use warp::http;

use crate::auth::{AuthAttempt, SessionId};
use crate::backend::{Backend, FindError, InsertError};
use crate::config::Config;
use crate::feed::FeedClient;
use crate::field::{FeedRecord, FieldReading};
use crate::password;
use crate::time::Timestamp;
use crate::user::UserId;

// how far back the details page looks
const DETAILS_RESULTS: u32 = 100;

pub struct Dashboard {
    backend: Backend,
    feeds: FeedClient,
    config: Config,
}

pub struct DashboardAuthed {
    dash: Arc<Dashboard>,
    session_id: SessionId,
    user_id: UserId,
    username: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    InvalidInput,
    DuplicateUsername,
    AuthFailure,
    Unauthorized,
    UnknownField,
    Internal,
}

pub type Result<T> = result::Result<T, Error>;

impl Into<http::StatusCode> for Error {
    fn into(self) -> http::StatusCode {
        match self {
            Self::InvalidInput => http::StatusCode::BAD_REQUEST,
            Self::DuplicateUsername => http::StatusCode::CONFLICT,
            Self::AuthFailure | Self::Unauthorized => http::StatusCode::UNAUTHORIZED,
            Self::UnknownField => http::StatusCode::NOT_FOUND,
            Self::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl warp::reject::Reject for Error {}

impl Dashboard {
    pub fn new(backend: Backend, feeds: FeedClient, config: Config) -> Self {
        Self {
            backend,
            feeds,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<UserId> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(Error::InvalidInput);
        }

        let existing = self.backend.user_count(username).await.map_err(|()| Error::Internal)?;
        if existing > 0 {
            info!("signup: username {username} already taken");
            return Err(Error::DuplicateUsername);
        }

        let pwhash = hash_blocking(password).await?;

        // a concurrent signup can still beat us to the row
        let id = self
            .backend
            .insert_user(username, &pwhash)
            .await
            .map_err(|e| match e {
                InsertError::Duplicate => {
                    info!("signup: username {username} already taken");
                    Error::DuplicateUsername
                }
                InsertError::Internal => Error::Internal,
            })?;

        info!("{username} signed up as user {id}");
        Ok(id)
    }

    /// `None` for both an unknown username and a wrong password.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> Result<Option<UserId>> {
        let username = username.trim();

        let user = match self.backend.find_user(username).await {
            Ok(user) => user,
            Err(FindError::NotFound) => {
                error!("rejecting non-existant user {username}");
                return Ok(None);
            }
            Err(FindError::Internal) => return Err(Error::Internal),
        };

        let pwhash = user.pwhash;
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || password::verify(&password, &pwhash))
            .await
            .map_err(|e| {
                error!("password verification task failed: {e:?}");
                Error::Internal
            })?;

        if verified {
            Ok(Some(user.id))
        } else {
            error!("wrong password for user {username}");
            Ok(None)
        }
    }

    pub async fn login(self: &Arc<Self>, auth_attempt: &AuthAttempt) -> Result<DashboardAuthed> {
        let username = auth_attempt.user();

        let user_id = self
            .verify_credentials(username, auth_attempt.pass())
            .await?
            .ok_or(Error::AuthFailure)?;

        let session_id = SessionId::new();
        let now = Timestamp::now().map_err(|()| Error::Internal)?;

        self.backend
            .insert_session(&session_id.to_string(), user_id, now)
            .await
            .map_err(|()| {
                error!("couldn't login user {username}");
                Error::Internal
            })?;

        info!("{username} login: new session created at {now}");
        Ok(DashboardAuthed {
            dash: Arc::clone(self),
            session_id,
            user_id,
            username: username.to_string(),
        })
    }

    pub async fn authenticate(self: &Arc<Self>, session_id: SessionId) -> Result<DashboardAuthed> {
        let session_str = session_id.to_string();

        let user = self
            .backend
            .user_with_session(&session_str)
            .await
            .map_err(|()| Error::Internal)?;

        let Some(user) = user else {
            debug!("no user found for session {session_id}");
            return Err(Error::Unauthorized);
        };

        trace!("found user {} by session", user.username);
        Ok(DashboardAuthed {
            dash: Arc::clone(self),
            session_id,
            user_id: user.user_id,
            username: user.username,
        })
    }

    /// Authenticates a raw cookie value, treating anything unparseable as no session.
    pub async fn authenticate_cookie(self: &Arc<Self>, cookie: Option<&str>) -> Result<DashboardAuthed> {
        let session_id = cookie
            .ok_or(Error::Unauthorized)
            .and_then(|c| SessionId::from_str(c).map_err(|()| Error::Unauthorized))?;

        self.authenticate(session_id).await
    }
}

impl DashboardAuthed {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn logout(&self) -> Result<()> {
        let username = &self.username;
        info!("{username} logout");

        self.dash
            .backend
            .delete_session(&self.session_id.to_string())
            .await
            .map_err(|()| Error::Internal)
    }

    /// The most recent upstream record, if the upstream has one for us.
    pub async fn latest(&self) -> Option<FeedRecord> {
        trace!("{} requesting latest feed", self.username);

        self.dash.feeds.fetch_latest(1).await.pop()
    }

    /// Display name and recent history of a configured field.
    pub async fn field_history(&self, field: u32) -> Result<(&str, Vec<FieldReading>)> {
        let Some(title) = self.dash.config.fields.name(field) else {
            info!("{} asked for unknown field {field}", self.username);
            return Err(Error::UnknownField);
        };

        let history = self.dash.feeds.fetch_field(field, DETAILS_RESULTS).await;
        Ok((title, history))
    }

    pub async fn field_series(&self, field: u32, limit: u32) -> Vec<FieldReading> {
        trace!("{} requesting {limit} readings of field {field}", self.username);

        self.dash.feeds.fetch_field(field, limit).await
    }
}

async fn hash_blocking(password: &str) -> Result<String> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || password::hash(&password))
        .await
        .map_err(|e| {
            error!("password hashing task failed: {e:?}");
            Error::Internal
        })?
        .map_err(|e| {
            error!("couldn't hash password: {e}");
            Error::Internal
        })
}

use std::{fmt, str::FromStr};

use serde::Deserialize;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for SessionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self).map_err(|_| ())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0.as_hyphenated())
    }
}

/// Username and password as posted by the login and signup forms.
#[derive(Debug, Deserialize)]
pub struct AuthAttempt {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl AuthAttempt {
    #[cfg(test)]
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        self.username.trim()
    }

    pub fn pass(&self) -> &str {
        &self.password
    }
}

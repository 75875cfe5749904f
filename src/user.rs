use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(i64);

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

#[derive(Debug)]
#[derive(sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub pwhash: String,
}

/// What a valid session resolves to.
#[derive(Debug)]
#[derive(sqlx::FromRow)]
pub struct SessionUser {
    pub user_id: UserId,
    pub username: String,
}

use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{error, info};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{query, query_as, Pool, Sqlite};

use crate::time::Timestamp;
use crate::user::{SessionUser, User, UserId};

type Result<T> = std::result::Result<T, ()>;

#[derive(Debug)]
pub enum FindError {
    NotFound,
    Internal,
}

#[derive(Debug)]
pub enum InsertError {
    Duplicate,
    Internal,
}

pub struct Backend(pub Pool<Sqlite>);

fn into_sql(path: &Path) -> PathBuf {
    path.join("sensordash.sql")
}

// SQLITE_CONSTRAINT_UNIQUE, SQLITE_CONSTRAINT_PRIMARYKEY
fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("2067") | Some("1555"))
                || db_err.message().starts_with("UNIQUE constraint failed")
        }
        _ => false,
    }
}

impl Backend {
    pub async fn new(data_dir: &Path) -> std::result::Result<Self, sqlx::Error> {
        let db_path = into_sql(data_dir);
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        info!("Using {}", db_path.display());

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self(pool))
    }
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> std::result::Result<User, FindError> {
        query_as::<_, User>(
            "
            SELECT id, pwhash
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_one(&self.0)
        .await
        .map_err(|e| {
            if matches!(e, sqlx::Error::RowNotFound) {
                FindError::NotFound
            } else {
                error!("couldn't query for user {username}: {e:?}");
                FindError::Internal
            }
        })
    }

    pub async fn insert_user(
        &self,
        username: &str,
        pwhash: &str,
    ) -> std::result::Result<UserId, InsertError> {
        query(
            "
            INSERT INTO users
            (username, pwhash)
            VALUES
            (?, ?)
            ",
        )
        .bind(username)
        .bind(pwhash)
        .execute(&self.0)
        .await
        .map(|done| done.last_insert_rowid().into())
        .map_err(|e| {
            if is_unique_violation(&e) {
                InsertError::Duplicate
            } else {
                error!("error inserting user {username}: {e:?}");
                InsertError::Internal
            }
        })
    }

    pub async fn user_count(&self, username: &str) -> Result<i64> {
        query_as::<_, (i64,)>("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.0)
            .await
            .map(|(n,)| n)
            .map_err(|e| {
                error!("couldn't count users named {username}: {e:?}");
            })
    }
}

impl Backend {
    pub async fn insert_session(
        &self,
        session_id: &str,
        user_id: UserId,
        created: Timestamp,
    ) -> Result<()> {
        query(
            "
            INSERT INTO sessions
            (session_id, user_id, created)
            VALUES
            (?, ?, ?)
            ",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(created)
        .execute(&self.0)
        .await
        .map(|_| ())
        .map_err(|e| {
            error!("error inserting session for user {user_id}: {e:?}");
        })
    }

    /// session_id is the primary key, so there's at most one owner.
    pub async fn user_with_session(&self, session_id: &str) -> Result<Option<SessionUser>> {
        query_as::<_, SessionUser>(
            "
            SELECT users.id as user_id, users.username
            FROM sessions
            INNER JOIN users
                ON users.id = sessions.user_id
            WHERE sessions.session_id = ?
            ",
        )
        .bind(session_id)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't query for session {session_id}: {e:?}");
        })
    }

    /// Removing a session that doesn't exist isn't an error.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.0)
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("error deleting session {session_id}: {e:?}");
            })
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    pub async fn create_db() -> Pool<Sqlite> {
        // one connection that never idles out, or the in-memory database
        // vanishes between queries
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::migrate!("./migrations").run(&db).await.unwrap();

        db
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_by_the_table() {
        let backend = Backend(create_db().await);

        let id = backend.insert_user("alice", "hash1").await.unwrap();
        let dup = backend.insert_user("alice", "hash2").await;

        assert!(matches!(dup, Err(InsertError::Duplicate)));
        assert_eq!(backend.user_count("alice").await.unwrap(), 1);

        let user = backend.find_user("alice").await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.pwhash, "hash1");
    }

    #[tokio::test]
    async fn reusing_a_session_id_fails() {
        let backend = Backend(create_db().await);
        let alice = backend.insert_user("alice", "hash").await.unwrap();
        let bob = backend.insert_user("bob", "hash").await.unwrap();
        let now = Timestamp::from_i64(1);

        backend.insert_session("s1", alice, now).await.unwrap();
        assert!(backend.insert_session("s1", bob, now).await.is_err());

        let owner = backend.user_with_session("s1").await.unwrap().expect("session owner");
        assert_eq!(owner.user_id, alice);
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let backend = Backend(create_db().await);

        assert!(matches!(
            backend.find_user("nobody").await,
            Err(FindError::NotFound)
        ));
    }

    #[tokio::test]
    async fn sessions_resolve_until_deleted() {
        let backend = Backend(create_db().await);
        let id = backend.insert_user("bob", "hash").await.unwrap();
        let now = Timestamp::from_i64(1);

        backend.insert_session("s1", id, now).await.unwrap();
        backend.insert_session("s2", id, now).await.unwrap();

        let user = backend.user_with_session("s1").await.unwrap().expect("session owner");
        assert_eq!(user.user_id, id);
        assert_eq!(user.username, "bob");

        backend.delete_session("s1").await.unwrap();
        assert!(backend.user_with_session("s1").await.unwrap().is_none());
        assert!(backend.user_with_session("s2").await.unwrap().is_some());

        // already gone
        backend.delete_session("s1").await.unwrap();
    }
}

//! User and message stores. SQLite access and password hashing are blocking,
//! so every call runs on the blocking pool and is awaited before returning.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use messagely_db::{Database, StoreError};
use messagely_types::models::{
    Message, MessageDetail, NewUser, ReadReceipt, ReceivedMessage, SentMessage, User,
    UserSummary,
};

use crate::credentials::Credentials;
use crate::error::{ApiError, ApiResult};

async fn blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}

#[derive(Clone)]
pub struct UserStore {
    db: Arc<Database>,
    credentials: Credentials,
}

impl UserStore {
    pub fn new(db: Arc<Database>, credentials: Credentials) -> Self {
        Self { db, credentials }
    }

    /// Create a user. The password is hashed before it reaches the database.
    /// A taken username is rejected before paying for the hash; `create_user`
    /// repeats the check under its lock for a concurrent registration.
    pub async fn register(&self, new_user: NewUser) -> ApiResult<User> {
        let store = self.clone();
        let user = blocking(move || {
            if store.db.user_exists(&new_user.username)? {
                return Err(StoreError::DuplicateUser(new_user.username).into());
            }
            let hash = store.credentials.hash(&new_user.password)?;
            Ok(store.db.create_user(&new_user, &hash, Utc::now())?)
        })
        .await?;

        info!("Registered user {}", user.username);
        Ok(user)
    }

    /// False for an unknown user or a wrong password.
    pub async fn authenticate(&self, username: &str, password: &str) -> ApiResult<bool> {
        let store = self.clone();
        let username = username.to_string();
        let password = password.to_string();
        blocking(move || {
            let Some(row) = store.db.get_user(&username)? else {
                return Ok(false);
            };
            Ok(store.credentials.verify(&password, &row.password))
        })
        .await
    }

    pub async fn touch_login(&self, username: &str) -> ApiResult<()> {
        let db = self.db.clone();
        let username = username.to_string();
        blocking(move || Ok(db.touch_login(&username, Utc::now())?)).await
    }

    pub async fn get(&self, username: &str) -> ApiResult<User> {
        let db = self.db.clone();
        let username = username.to_string();
        blocking(move || {
            db.get_user(&username)?
                .map(|row| row.into_user())
                .ok_or_else(|| {
                    ApiError::NotFound(format!("User '{}' cannot be found.", username))
                })
        })
        .await
    }

    pub async fn list(&self) -> ApiResult<Vec<UserSummary>> {
        let db = self.db.clone();
        blocking(move || Ok(db.list_users()?)).await
    }

    pub async fn messages_from(&self, username: &str) -> ApiResult<Vec<SentMessage>> {
        let db = self.db.clone();
        let username = username.to_string();
        blocking(move || Ok(db.messages_from(&username)?)).await
    }

    pub async fn messages_to(&self, username: &str) -> ApiResult<Vec<ReceivedMessage>> {
        let db = self.db.clone();
        let username = username.to_string();
        blocking(move || Ok(db.messages_to(&username)?)).await
    }
}

#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
}

impl MessageStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        from_username: &str,
        to_username: &str,
        body: &str,
    ) -> ApiResult<Message> {
        let db = self.db.clone();
        let from = from_username.to_string();
        let to = to_username.to_string();
        let body = body.to_string();
        blocking(move || Ok(db.insert_message(&from, &to, &body, Utc::now())?)).await
    }

    pub async fn get(&self, id: i64) -> ApiResult<MessageDetail> {
        let db = self.db.clone();
        blocking(move || Ok(db.get_message(id)?)).await
    }

    /// Idempotent: only the first call records a timestamp.
    pub async fn mark_read(&self, id: i64) -> ApiResult<ReadReceipt> {
        let db = self.db.clone();
        blocking(move || Ok(db.mark_read(id, Utc::now())?)).await
    }
}

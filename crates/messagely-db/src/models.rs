//! Database row types. `UserRow` is the only type that carries the password
//! hash; everything handed upward goes through `into_user`.

use chrono::{DateTime, Utc};
use messagely_types::models::{User, UserSummary};

pub struct UserRow {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub join_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            join_at: self.join_at,
            last_login_at: self.last_login_at,
        }
    }
}

/// A message joined against one counterpart user. `counterpart` is `None`
/// when the LEFT JOIN found no matching user row.
pub(crate) struct ExpandedRow {
    pub id: i64,
    pub counterpart_username: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub counterpart: Option<UserSummary>,
}

//! SQLite implementation of the user directory.

use async_trait::async_trait;
use sea_query::SqliteQueryBuilder;
use sea_query_binder::SqlxBinder;
use sqlx::{Row, SqlitePool};

use super::schema::{insert_user, select_by_ids, CREATE_USERS_TABLE};
use super::{Result, User, UserDirectory};

pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the users table if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_USERS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert or update a user row.
    pub async fn insert(&self, user: &User) -> Result<()> {
        let (sql, values) =
            insert_user(user.user_id, &user.name, &user.email).build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn get_users_by_ids(&self, ids: &[i32]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (sql, values) = select_by_ids(ids).build_sqlx(SqliteQueryBuilder);
        let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(User {
                    user_id: row.try_get("user_id")?,
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                })
            })
            .collect()
    }
}

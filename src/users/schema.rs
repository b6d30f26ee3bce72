//! Users table schema using sea-query.

use sea_query::{Expr, Iden, Query, SelectStatement};

/// Users table schema.
#[derive(Iden)]
pub enum Users {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "name"]
    Name,
    #[iden = "email"]
    Email,
}

/// SQL for creating the users table.
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL
)
"#;

/// `SELECT user_id, name, email FROM users WHERE user_id IN (...)`.
pub fn select_by_ids(ids: &[i32]) -> SelectStatement {
    Query::select()
        .columns([Users::UserId, Users::Name, Users::Email])
        .from(Users::Table)
        .and_where(Expr::col(Users::UserId).is_in(ids.iter().copied()))
        .to_owned()
}

/// Upsert one user row.
pub fn insert_user(user_id: i32, name: &str, email: &str) -> sea_query::InsertStatement {
    Query::insert()
        .into_table(Users::Table)
        .columns([Users::UserId, Users::Name, Users::Email])
        .values_panic([user_id.into(), name.into(), email.into()])
        .on_conflict(
            sea_query::OnConflict::column(Users::UserId)
                .update_columns([Users::Name, Users::Email])
                .to_owned(),
        )
        .to_owned()
}

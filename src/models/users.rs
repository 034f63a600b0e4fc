use crate::models::schema::users;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UserError {
    #[error("User not found")]
    UserNotFound,
    #[error("Email already registered")]
    EmailExists,
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

/// Account role stored as text in the `role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::User => "USER",
        }
    }

    pub fn from_db(value: &str) -> UserRole {
        match value {
            "ADMIN" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

#[derive(Queryable, Identifiable, AsChangeset, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = users)]
#[diesel(primary_key(uuid))]
pub struct User {
    pub uuid: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> UserRole {
        UserRole::from_db(&self.role)
    }

    pub fn get_by_uuid(conn: &mut PgConnection, lookup_uuid: Uuid) -> Result<User, UserError> {
        users::table
            .filter(users::uuid.eq(lookup_uuid))
            .first::<User>(conn)
            .optional()?
            .ok_or(UserError::UserNotFound)
    }

    pub fn get_by_email(
        conn: &mut PgConnection,
        lookup_email: &str,
    ) -> Result<Option<User>, UserError> {
        users::table
            .filter(users::email.eq(lookup_email))
            .first::<User>(conn)
            .optional()
            .map_err(UserError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub uuid: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub role: String,
}

impl NewUser {
    pub fn new(email: String, password_hash: String, name: Option<String>) -> Self {
        NewUser {
            uuid: Uuid::new_v4(),
            email,
            password_hash,
            name,
            role: UserRole::User.as_str().to_string(),
        }
    }

    pub fn insert(&self, conn: &mut PgConnection) -> Result<User, UserError> {
        diesel::insert_into(users::table)
            .values(self)
            .get_result::<User>(conn)
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => UserError::EmailExists,
                other => UserError::DatabaseError(other),
            })
    }
}

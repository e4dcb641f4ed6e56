//! # pgdb
//!
//! A thin synchronous layer over PostgreSQL.
//!
//! ## Features
//!
//! - **One connection, explicit ownership**: open a [`Connection`] once and pass it around
//! - **Named parameters**: write `:name` placeholders, bind by name
//! - **Type inference on bind**: booleans, integers, text, JSON lists/mappings and
//!   date/times are bound by their runtime shape; anything else is rejected
//! - **Associative rows**: results come back as [`Record`]s (column name → [`Value`])
//! - **Insert ids**: read the generated id right after an INSERT
//!
//! ## Example
//!
//! ```ignore
//! use pgdb::{Connection, DbConfig, params};
//!
//! let conn = Connection::open(&DbConfig::from_env()?)?;
//!
//! let id = conn
//!     .query(
//!         "INSERT INTO users (name, tags, active) VALUES (:name, :tags, :active)",
//!         &params! {
//!             "name" => "alice",
//!             "tags" => serde_json::json!(["admin"]),
//!             "active" => true,
//!         },
//!     )?
//!     .insert_id()?
//!     .to_string();
//!
//! let mut stmt = conn.query("SELECT name FROM users WHERE id = :id", &params! { "id" => id.parse::<i64>()? })?;
//! assert_eq!(stmt.get(Some("name"))?, Some("alice".into()));
//! ```

pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod kind;
pub mod named;
pub mod param;
pub mod statement;
pub mod value;

pub use config::DbConfig;
pub use connection::Connection;
pub use error::{DbError, DbResult};
pub use kind::StatementKind;
pub use param::{ParamType, TypedValue};
pub use statement::Statement;
pub use value::{Record, Value};

/// Build a named parameter list for [`Connection::query`] and [`Statement::bind`].
///
/// ```ignore
/// let values = pgdb::params! { "id" => 7, "name" => "bob", "deleted_at" => None::<i64> };
/// conn.query("UPDATE users SET name = :name, deleted_at = :deleted_at WHERE id = :id", &values)?;
/// ```
#[macro_export]
macro_rules! params {
    () => {{
        let empty: [(&str, $crate::Value); 0] = [];
        empty
    }};
    ($($name:expr => $value:expr),+ $(,)?) => {
        [$(($name, $crate::Value::from($value))),+]
    };
}

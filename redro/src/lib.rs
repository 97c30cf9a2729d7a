//! Synchronous Redshift Driver
//!
//! The connection engine for a columnar analytic database speaking a
//! PostgreSQL-derived wire protocol with vendor extensions: extended
//! result metadata, a binary transfer protocol, digest and SASL
//! authentication variants, and identity-provider token passthrough.
//!
//! # Examples
//!
//! ```no_run
//! use redro::{Config, Connection, Cursor, ParamStyle};
//!
//! # fn app() -> redro::Result<()> {
//! let mut config = Config::new("awsuser", "secret", "dev");
//! config.host = "cluster.example.redshift.amazonaws.com".into();
//!
//! let mut conn = Connection::connect(config)?;
//!
//! let mut cursor = Cursor::with_paramstyle(ParamStyle::Qmark);
//! conn.execute(&mut cursor, "SELECT id, name FROM users WHERE id > ?", [42i32])?;
//!
//! for row in cursor.rows() {
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;

// Protocol
pub mod protocol;
mod stream;

// Conversion
pub mod types;
mod paramstyle;

// Component
mod auth;
mod statement;
pub mod row;
mod cursor;

// Connection
pub mod connection;
mod tpc;

mod error;

pub use connection::{Config, Connection, ServerVersion, TlsMode};
pub use cursor::{CopyStream, Cursor};
pub use error::{Error, ErrorKind, Result};
pub use paramstyle::{ParamStyle, Params};
pub use protocol::ClientProtocolVersion;
pub use statement::PreparedStatement;
pub use tpc::Xid;
pub use types::Value;

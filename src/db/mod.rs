//! Credential storage for the ClipStream server.
//!
//! The session core talks to storage only through the `CredentialStore`
//! trait; Postgres backs production, the in-memory store backs tests.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use models::{Profile, ProfileUpdate, PublicUser, User};
pub use postgres::PgStore;
pub use store::CredentialStore;

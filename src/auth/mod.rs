//! Authentication for the ClipStream server.
//!
//! Password verification, dual-token issuance, refresh-token rotation and
//! logout-time revocation, plus the request guard for protected routes.

pub mod gate;
pub mod handlers;
pub mod password;
pub mod session;
pub mod token;

pub use gate::AuthenticatedUser;
pub use password::PasswordHasher;
pub use session::{LoginOutcome, NewAccount, SessionManager, TokenPair};
pub use token::{Claims, KeyLookup, StaticKeys, TokenClass, TokenSigner};

pub mod credentials;
pub mod session;

pub use credentials::{hash_password, CredentialStore, UserRecord};
pub use session::{SessionClaims, SessionSigner, SessionToken};

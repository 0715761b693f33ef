//! Allow-list of users permitted to log in.
//!
//! Layout:
//!
//! ```yaml
//! credentials:
//!   usernames:
//!     jsmith:
//!       name: John Smith
//!       email: jsmith@example.com
//!       password: $2b$12$...
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

use crate::errors::{TierError, TierResult};

#[derive(Debug, Deserialize)]
struct AllowListFile {
    credentials: CredentialsSection,
}

#[derive(Debug, Deserialize)]
struct CredentialsSection {
    usernames: BTreeMap<String, UserEntry>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    name: String,
    password: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, UserRecord>,
}

impl CredentialStore {
    pub fn load(path: impl AsRef<Path>) -> TierResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TierError::io(format!("reading credentials {}", path.display()), e))?;
        let store = Self::from_yaml_str(&content)?;
        info!(users = store.len(), path = %path.display(), "credential store loaded");
        Ok(store)
    }

    pub fn from_yaml_str(content: &str) -> TierResult<Self> {
        let file: AllowListFile = serde_yaml::from_str(content)
            .map_err(|e| TierError::config(format!("invalid credentials file: {e}")))?;

        let mut users = HashMap::with_capacity(file.credentials.usernames.len());
        for (username, entry) in file.credentials.usernames {
            let key = username.trim().to_lowercase();
            if !entry.password.starts_with("$2") {
                return Err(TierError::config(format!(
                    "password for '{key}' is not a bcrypt hash; generate one with `story_tier hash-password`"
                )));
            }
            let record = UserRecord {
                username: key.clone(),
                display_name: entry.name,
                email: entry.email,
                password_hash: entry.password,
            };
            if users.insert(key.clone(), record).is_some() {
                return Err(TierError::config(format!("user '{key}' listed twice")));
            }
        }
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(&username.trim().to_lowercase())
    }

    /// The user record when the password matches its stored hash.
    pub fn verify(&self, username: &str, password: &str) -> Option<&UserRecord> {
        let user = self.get(username)?;
        match bcrypt::verify(password, &user.password_hash) {
            Ok(true) => Some(user),
            Ok(false) => None,
            Err(e) => {
                warn!(username = %user.username, error = %e, "stored password hash is unusable");
                None
            }
        }
    }
}

/// bcrypt hash suitable for the allow-list.
pub fn hash_password(password: &str, cost: u32) -> TierResult<String> {
    bcrypt::hash(password, cost).map_err(|e| TierError::auth(format!("hashing failed: {e}")))
}

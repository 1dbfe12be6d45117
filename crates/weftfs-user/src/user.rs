//! User records and authentication classification.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The well-known UUID of the admin account, which carries global
/// privileges.
pub const ADMIN_USER_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Base64 transport encoding for raw byte-string fields.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// A user of the fabric.
///
/// `id`, `name`, and `email` are each unique across the directory.
/// `salt` and `password` hold raw bytes (base64 on the wire); `password`
/// is the scrypt hash, never the plaintext — except transiently inside
/// [`crate::store::UserStore::new_admin`], which hashes in place.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// UUID assigned at creation.
    #[serde(rename = "Id")]
    pub id: String,
    /// Unique login name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Unique email address.
    #[serde(rename = "Email")]
    pub email: String,
    /// Per-user random salt.
    #[serde(rename = "Salt", with = "base64_bytes")]
    pub salt: Vec<u8>,
    /// scrypt hash of the password.
    #[serde(rename = "Password", with = "base64_bytes")]
    pub password: Vec<u8>,
    /// Base-32 encoded API key.
    #[serde(rename = "ApiKey")]
    pub api_key: String,
    /// Free-form labels, matched by selectors.
    #[serde(rename = "Metadata", default)]
    pub metadata: HashMap<String, String>,
}

// The API key is a bearer credential: it never appears in formatted
// output, including logs.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("salt", &self.salt)
            .field("password", &self.password)
            .field("api_key", &"****")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Id={}, Name={}, Email={}, ApiKey=****",
            self.id, self.name, self.email
        )
    }
}

/// How a request proved its identity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthenticationType {
    /// No successful authentication.
    #[default]
    None,
    /// Password authentication.
    Password,
    /// API-key authentication.
    ApiKey,
}

impl AuthenticationType {
    /// True for authentication strong enough to allow privileged API
    /// actions. API keys are long-lived bearer tokens and do not qualify.
    pub fn privileged(&self) -> bool {
        matches!(self, AuthenticationType::Password)
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthenticationType::None => "none",
            AuthenticationType::Password => "password",
            AuthenticationType::ApiKey => "apikey",
        };
        f.write_str(name)
    }
}

/// A lookup query: a direct reference (UUID, name, or email) or a label
/// selector over user metadata.
#[derive(Clone, Debug, Default)]
pub struct Query {
    /// UUID, name, or email of the user.
    pub reference: String,
    /// Label selector; when non-empty it takes precedence over
    /// `reference`.
    pub selector: String,
}

impl Query {
    /// Query by direct reference.
    pub fn by_ref(reference: &str) -> Self {
        Self {
            reference: reference.to_string(),
            selector: String::new(),
        }
    }

    /// Query by label selector.
    pub fn by_selector(selector: &str) -> Self {
        Self {
            reference: String::new(),
            selector: selector.to_string(),
        }
    }
}

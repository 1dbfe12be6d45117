//! The user directory: records in the coordination store with a by-name
//! index and scrypt-backed authentication.
//!
//! Records live under `{root}/users/{uuid}`. The by-name index lives
//! under the sibling prefix `{root}/index/usernames/{name}` so that user
//! enumeration never sees index entries.

use std::sync::Arc;

use uuid::Uuid;

use weftfs_store::kv::KvPair;
use weftfs_store::{KvClient, StoreConfig};

use crate::error::{Result, UserError};
use crate::secrets::{generate_api_key, generate_salt, hash_password, secrets_equal};
use crate::selector::Selector;
use crate::user::{AuthenticationType, Query, User, ADMIN_USER_UUID};

/// The user directory.
pub struct UserStore {
    kv: Arc<dyn KvClient>,
    root: String,
}

impl UserStore {
    /// A directory over the given client, rooted at the config's prefix.
    pub fn new(kv: Arc<dyn KvClient>, config: &StoreConfig) -> Self {
        Self {
            kv,
            root: config.root_prefix.clone(),
        }
    }

    fn users_prefix(&self) -> String {
        format!("{}/users/", self.root)
    }

    fn user_key(&self, id: &str) -> String {
        format!("{}{}", self.users_prefix(), id)
    }

    fn name_index_key(&self, name: &str) -> String {
        format!("{}/index/usernames/{}", self.root, name)
    }

    fn decode_user(pair: &KvPair) -> Result<User> {
        serde_json::from_slice(&pair.value).map_err(|e| UserError::Codec {
            key: pair.key.clone(),
            reason: e.to_string(),
        })
    }

    fn encode_user(user: &User) -> Result<Vec<u8>> {
        serde_json::to_vec(user).map_err(|e| UserError::Codec {
            key: user.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Initializes the admin account under its well-known UUID.
    ///
    /// The supplied record carries the plaintext password in its
    /// `password` field; it is replaced with the scrypt hash before
    /// anything is written. An API key is generated when none is given.
    pub async fn new_admin(&self, mut user: User) -> Result<User> {
        user.id = ADMIN_USER_UUID.to_string();

        tracing::info!(id = %user.id, name = %user.name, "creating admin account");

        let salt = generate_salt();
        user.password = hash_password(&user.password, &salt)?;
        user.salt = salt;
        if user.api_key.is_empty() {
            user.api_key = generate_api_key();
        }

        self.create_with_index(&user).await?;
        Ok(user)
    }

    /// Creates a new user. Name and email must both be free.
    pub async fn new(&self, name: &str, email: &str, password: &str) -> Result<User> {
        if name.is_empty() {
            return Err(UserError::InvalidArgument("name must not be empty".to_string()));
        }
        if self.get(&Query::by_ref(name)).await.is_ok() {
            return Err(UserError::AlreadyExists("username".to_string()));
        }
        if self.get_by_email(email).await.is_ok() {
            return Err(UserError::AlreadyExists("email".to_string()));
        }

        let salt = generate_salt();
        let hashed = hash_password(password.as_bytes(), &salt)?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            salt,
            password: hashed,
            api_key: generate_api_key(),
            metadata: Default::default(),
        };

        self.create_with_index(&user).await?;
        Ok(user)
    }

    async fn create_with_index(&self, user: &User) -> Result<()> {
        let bytes = Self::encode_user(user)?;
        self.kv.create(&self.user_key(&user.id), bytes).await?;
        self.kv
            .set(&self.name_index_key(&user.name), user.id.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    /// Resolves a user.
    ///
    /// Resolution order: label selector when one is given; email when the
    /// reference looks like one; direct UUID key; the by-name index; and
    /// finally a full scan by name, which backfills the index on a hit.
    pub async fn get(&self, query: &Query) -> Result<User> {
        if !query.selector.is_empty() {
            return self.get_by_selector(&query.selector).await;
        }
        if looks_like_email(&query.reference) {
            return self.get_by_email(&query.reference).await;
        }

        match self.kv.get(&self.user_key(&query.reference)).await {
            Ok(pair) => return Self::decode_user(&pair),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        match self.kv.get(&self.name_index_key(&query.reference)).await {
            Ok(pair) => {
                let id = String::from_utf8(pair.value).map_err(|_| UserError::Codec {
                    key: pair.key.clone(),
                    reason: "index entry is not UTF-8".to_string(),
                })?;
                let pair = self.kv.get(&self.user_key(&id)).await?;
                return Self::decode_user(&pair);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        self.full_search(&query.reference).await
    }

    async fn full_search(&self, reference: &str) -> Result<User> {
        let users = self.list("").await?;
        for user in users {
            if user.name == reference {
                // Index the name so the next lookup is direct.
                if let Err(e) = self
                    .kv
                    .set(&self.name_index_key(&user.name), user.id.as_bytes().to_vec())
                    .await
                {
                    tracing::error!(name = %user.name, id = %user.id, error = %e,
                        "failed to backfill username index");
                }
                return Ok(user);
            }
        }
        Err(UserError::NotFound(reference.to_string()))
    }

    async fn get_by_email(&self, email: &str) -> Result<User> {
        let users = self.list("").await?;
        users
            .into_iter()
            .find(|u| u.email == email)
            .ok_or_else(|| UserError::NotFound(email.to_string()))
    }

    async fn get_by_selector(&self, selector: &str) -> Result<User> {
        let mut users = self.list(selector).await?;
        match users.len() {
            0 => Err(UserError::NotFound(format!("selector={}", selector))),
            1 => Ok(users.remove(0)),
            _ => Err(UserError::InvalidArgument(format!(
                "more than one match for selector={}, use list instead",
                selector
            ))),
        }
    }

    /// All users matching a label selector. Undecodable records are
    /// logged and skipped.
    pub async fn list(&self, selector: &str) -> Result<Vec<User>> {
        let selector = Selector::parse(selector)?;
        let pairs = self.kv.enumerate(&self.users_prefix()).await?;
        let mut users = Vec::new();
        for pair in &pairs {
            match Self::decode_user(pair) {
                Ok(user) => {
                    if selector.matches(&user.metadata) {
                        users.push(user);
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %pair.key, error = %e, "skipping undecodable user record");
                }
            }
        }
        Ok(users)
    }

    /// Writes a full user record.
    pub async fn update(&self, user: &User) -> Result<User> {
        let bytes = Self::encode_user(user)?;
        self.kv.set(&self.user_key(&user.id), bytes).await?;
        Ok(user.clone())
    }

    /// Re-derives salt and hash for a new password.
    pub async fn update_password(&self, reference: &str, password: &str) -> Result<User> {
        let mut user = self.get(&Query::by_ref(reference)).await?;
        let salt = generate_salt();
        user.password = hash_password(password.as_bytes(), &salt)?;
        user.salt = salt;
        self.update(&user).await
    }

    /// Replaces the API key with a fresh one.
    pub async fn reset_api_key(&self, reference: &str) -> Result<User> {
        let mut user = self.get(&Query::by_ref(reference)).await?;
        user.api_key = generate_api_key();
        self.update(&user).await
    }

    /// Deletes a user by UUID. The by-name index entry is removed best
    /// effort before the primary record.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if Uuid::parse_str(id).is_err() {
            return Err(UserError::InvalidArgument(format!(
                "'{}' is not a valid user id",
                id
            )));
        }

        let user = self.get(&Query::by_ref(id)).await?;

        if let Err(e) = self.kv.delete(&self.name_index_key(&user.name)).await {
            tracing::warn!(name = %user.name, error = %e, "failed to remove username index entry");
        }

        self.kv.delete(&self.user_key(&user.id)).await?;
        Ok(())
    }

    /// Authenticates a user by API key or password.
    ///
    /// Both the API-key comparison and the scrypt derivation run on every
    /// call with an existing user, so timing does not depend on which
    /// secret (if either) matched.
    pub async fn authenticate(
        &self,
        reference: &str,
        credential: &str,
    ) -> Result<(User, AuthenticationType)> {
        let user = self.get(&Query::by_ref(reference)).await?;

        let api_key_match = secrets_equal(user.api_key.as_bytes(), credential.as_bytes());
        let derived = hash_password(credential.as_bytes(), &user.salt)?;
        let password_match = secrets_equal(&user.password, &derived);

        if api_key_match {
            return Ok((user, AuthenticationType::ApiKey));
        }
        if password_match {
            return Ok((user, AuthenticationType::Password));
        }
        Err(UserError::InvalidCredentials)
    }
}

fn looks_like_email(reference: &str) -> bool {
    match reference.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

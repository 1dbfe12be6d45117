#![warn(missing_docs)]

//! WeftFS user directory: user records in the coordination store, scrypt
//! password hashing, base-32 API keys, constant-time authentication.

pub mod error;
pub mod secrets;
pub mod selector;
pub mod store;
pub mod user;

pub use error::{Result, UserError};
pub use selector::Selector;
pub use store::UserStore;
pub use user::{AuthenticationType, Query, User, ADMIN_USER_UUID};

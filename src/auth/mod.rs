//! Credential persistence and the authentication endpoints.

pub mod backend;
pub mod error;
pub mod store;
pub mod token;

pub use backend::AuthApi;
pub use error::AuthError;
pub use store::{
    CredentialStore, CredentialStoreConfig, FileCredentialStore, MemoryCredentialStore, StoreKey,
};
pub use token::{decode_expiry, Credentials, TokenPair};

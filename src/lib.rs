//! Cellar: client-side session and request authorization for the winery ERP.
//!
//! Authenticates against the token-issuing backend, attaches the bearer token
//! and the active winery to every request, and recovers from expired access
//! tokens with a single shared refresh no matter how many requests notice the
//! expiry at once.
//!
//! # Quick Start
//!
//! ```no_run
//! use cellar::prelude::*;
//!
//! # async fn example() -> cellar::Result<()> {
//! let cellar = Cellar::from_env()?;
//! match cellar.initialize().await {
//!     SessionState::Authenticated(user) => println!("signed in as {}", user.email),
//!     _ => {
//!         cellar
//!             .login(&LoginCredentials::new("ana@bodega.test", "secret"))
//!             .await?;
//!     }
//! }
//! let decision = cellar.guard("/production/batches").await;
//! assert!(decision.is_allowed());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod prelude;
pub mod service;
pub mod session;
pub mod tenant;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{CellarError, Result};
pub use service::Cellar;

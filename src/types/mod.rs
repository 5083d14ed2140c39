//! Backend payload types used by the session layer.

pub mod user;
pub mod winery;

pub use user::*;
pub use winery::*;

use serde::{Deserialize, Serialize};

/// Page-number paginated list envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

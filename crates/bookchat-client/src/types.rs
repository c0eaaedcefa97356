//! API response types for the backend client.

use serde::{Deserialize, Serialize};

/// An uploaded manuscript as listed by `GET /books`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub id: String,
    /// Title extracted from the manuscript.
    #[serde(default)]
    pub title: String,
    /// Author name, if detected.
    #[serde(default)]
    pub author: Option<String>,
    /// Upload timestamp as sent by the backend.
    #[serde(default, alias = "uploadDate")]
    pub upload_date: Option<String>,
    /// Analysis progress, 0-100.
    #[serde(default)]
    pub progress: Option<f64>,
}

/// The logged-in account as returned by `GET /auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Account ID.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Public username.
    pub username: String,
    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,
}

//! Database row types.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use serde::{Deserialize, Serialize};

/// Chat message record in the messages table.
/// Serialized in the shape clients already consume (`_id`, camelCase fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    /// Reference to an externally hosted image (URL).
    pub image: Option<String>,
    /// RFC 3339 timestamp set by the server at insert time
    pub created_at: String,
}

impl ChatMessage {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            text: row.get(3)?,
            image: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

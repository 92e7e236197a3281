//! Identity types for RELAY ledger records

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Record identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, so IDs created later sort later.
pub type RecordId = Uuid;

/// Identifier of a handoff record.
pub type HandoffId = RecordId;

/// Identifier of a conflict record.
pub type ConflictId = RecordId;

/// Identifier of a work claim record.
pub type ClaimId = RecordId;

/// Opaque reference to a project owned by the surrounding system.
pub type ProjectId = String;

/// Name of a logical agent role (`developer`, `tester`, ...).
pub type AgentName = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds, used for statistics.
pub type DurationMs = i64;

/// Generate a new UUIDv7 RecordId (timestamp-sortable).
pub fn new_record_id() -> RecordId {
    Uuid::now_v7()
}

/// Well-known agent role names.
pub mod roles {
    pub const PRODUCT_OWNER: &str = "product-owner";
    pub const DEVELOPER: &str = "developer";
    pub const TESTER: &str = "tester";
    pub const SECURITY: &str = "security";
    pub const DOCUMENTATION: &str = "documentation";
    pub const DEVOPS: &str = "devops";

    /// All built-in roles.
    pub const ALL: [&str; 6] = [PRODUCT_OWNER, DEVELOPER, TESTER, SECURITY, DOCUMENTATION, DEVOPS];
}

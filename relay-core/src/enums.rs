//! Enum types for coordination records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ============================================================================
// WORK ITEMS
// ============================================================================

/// Kind of work item moving through a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum ItemType {
    Story,
    Task,
    TestCase,
    CodeReview,
    Roadmap,
}

impl ItemType {
    /// All item types in declaration order.
    pub const ALL: [ItemType; 5] = [
        ItemType::Story,
        ItemType::Task,
        ItemType::TestCase,
        ItemType::CodeReview,
        ItemType::Roadmap,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ItemType::Story => "story",
            ItemType::Task => "task",
            ItemType::TestCase => "test-case",
            ItemType::CodeReview => "code-review",
            ItemType::Roadmap => "roadmap",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "story" => Ok(ItemType::Story),
            "task" => Ok(ItemType::Task),
            "testcase" | "test" => Ok(ItemType::TestCase),
            "codereview" | "review" => Ok(ItemType::CodeReview),
            "roadmap" => Ok(ItemType::Roadmap),
            _ => Err(format!("Invalid ItemType: {}", s)),
        }
    }
}

// ============================================================================
// HANDOFF KIND
// ============================================================================

/// How the receiving agent of a handoff was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HandoffKind {
    /// Target agent supplied explicitly by the caller
    Manual,
    /// Target agent derived from the item's pipeline
    Auto,
}

impl HandoffKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            HandoffKind::Manual => "manual",
            HandoffKind::Auto => "auto",
        }
    }
}

impl fmt::Display for HandoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for HandoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "manual" => Ok(HandoffKind::Manual),
            "auto" | "automatic" => Ok(HandoffKind::Auto),
            _ => Err(format!("Invalid HandoffKind: {}", s)),
        }
    }
}

// ============================================================================
// CONFLICTS
// ============================================================================

/// Classification of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    /// Agents disagree on whether to go ahead
    Recommendation,
    /// Agents disagree on what to do
    Action,
    /// Agents disagree on urgency
    Priority,
}

impl ConflictType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ConflictType::Recommendation => "recommendation",
            ConflictType::Action => "action",
            ConflictType::Priority => "priority",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "recommendation" => Ok(ConflictType::Recommendation),
            "action" => Ok(ConflictType::Action),
            "priority" => Ok(ConflictType::Priority),
            _ => Err(format!("Invalid ConflictType: {}", s)),
        }
    }
}

/// Status of a conflict record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Pending,
    Resolved,
}

impl ConflictStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::Resolved => "resolved",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ConflictStatusParseError> {
        match s.to_lowercase().as_str() {
            "pending" | "open" => Ok(ConflictStatus::Pending),
            "resolved" => Ok(ConflictStatus::Resolved),
            _ => Err(ConflictStatusParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConflictStatus::Resolved)
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ConflictStatus {
    type Err = ConflictStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid conflict status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictStatusParseError(pub String);

impl fmt::Display for ConflictStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid conflict status: {}", self.0)
    }
}

impl std::error::Error for ConflictStatusParseError {}

/// Who settled a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum DecidedBy {
    User,
    Auto,
}

impl DecidedBy {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DecidedBy::User => "user",
            DecidedBy::Auto => "auto",
        }
    }
}

impl fmt::Display for DecidedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for DecidedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "user" | "human" => Ok(DecidedBy::User),
            "auto" | "automatic" => Ok(DecidedBy::Auto),
            _ => Err(format!("Invalid DecidedBy: {}", s)),
        }
    }
}

// ============================================================================
// WORK CLAIMS
// ============================================================================

/// Status of a work claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    InProgress,
    Completed,
}

impl ClaimStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ClaimStatus::InProgress => "in_progress",
            ClaimStatus::Completed => "completed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ClaimStatusParseError> {
        match s.to_lowercase().as_str() {
            "in_progress" | "in-progress" | "active" => Ok(ClaimStatus::InProgress),
            "completed" | "complete" | "done" => Ok(ClaimStatus::Completed),
            _ => Err(ClaimStatusParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Completed)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = ClaimStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid claim status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimStatusParseError(pub String);

impl fmt::Display for ClaimStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid claim status: {}", self.0)
    }
}

impl std::error::Error for ClaimStatusParseError {}

// ============================================================================
// RECORD KIND DISCRIMINATOR
// ============================================================================

/// Discriminator for the three record kinds held by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Handoff,
    Conflict,
    WorkClaim,
}

impl RecordKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RecordKind::Handoff => "handoff",
            RecordKind::Conflict => "conflict",
            RecordKind::WorkClaim => "work_claim",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "handoff" => Ok(RecordKind::Handoff),
            "conflict" => Ok(RecordKind::Conflict),
            "workclaim" | "claim" => Ok(RecordKind::WorkClaim),
            _ => Err(format!("Invalid RecordKind: {}", s)),
        }
    }
}

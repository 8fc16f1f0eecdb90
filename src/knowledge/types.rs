//! Core type definitions shared across the knowledge engine.
//!
//! Defines [`DocType`] (the four document categories), [`SearchMode`],
//! [`Origin`] (provenance), and the status enums for traces, decisions, and
//! forum threads. All enums serialize to the lowercase strings stored in the
//! database and used on the wire.

use serde::{Deserialize, Serialize};

/// The four document types in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// A durable rule of thumb from the resonance corpus.
    Principle,
    /// A freshly captured observation.
    Learning,
    /// A named recurring technique.
    Pattern,
    /// A session-level retrospective record.
    Retro,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Principle => "principle",
            Self::Learning => "learning",
            Self::Pattern => "pattern",
            Self::Retro => "retro",
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "principle" => Ok(Self::Principle),
            "learning" => Ok(Self::Learning),
            "pattern" => Ok(Self::Pattern),
            "retro" => Ok(Self::Retro),
            _ => Err(format!("unknown document type: {s}")),
        }
    }
}

/// Parse a user-supplied type filter. `"all"`, empty, or absent mean no
/// filter; anything else must be a valid [`DocType`].
pub fn parse_type_filter(value: Option<&str>) -> Result<Option<DocType>, String> {
    match value {
        None => Ok(None),
        Some("") | Some("all") => Ok(None),
        Some(other) => other.parse().map(Some),
    }
}

/// Which backends a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Hybrid,
    Fts,
    Vector,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Fts => "fts",
            Self::Vector => "vector",
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "hybrid" => Ok(Self::Hybrid),
            "fts" => Ok(Self::Fts),
            "vector" => Ok(Self::Vector),
            _ => Err(format!("unknown search mode: {s}")),
        }
    }
}

/// Where a document came from. Never rewritten once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Mother,
    Arthur,
    Volt,
    Human,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mother => "mother",
            Self::Arthur => "arthur",
            Self::Volt => "volt",
            Self::Human => "human",
        }
    }
}

impl std::str::FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mother" => Ok(Self::Mother),
            "arthur" => Ok(Self::Arthur),
            "volt" => Ok(Self::Volt),
            "human" => Ok(Self::Human),
            _ => Err(format!("unknown origin: {s}")),
        }
    }
}

/// Trace lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Raw,
    Reviewed,
    Distilling,
    Distilled,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Reviewed => "reviewed",
            Self::Distilling => "distilling",
            Self::Distilled => "distilled",
        }
    }
}

impl std::str::FromStr for TraceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "reviewed" => Ok(Self::Reviewed),
            "distilling" => Ok(Self::Distilling),
            "distilled" => Ok(Self::Distilled),
            _ => Err(format!("unknown trace status: {s}")),
        }
    }
}

/// Decision lifecycle. Legal transitions are checked in
/// [`crate::knowledge::decisions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Parked,
    Researching,
    Decided,
    Implemented,
    Closed,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Parked => "parked",
            Self::Researching => "researching",
            Self::Decided => "decided",
            Self::Implemented => "implemented",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "parked" => Ok(Self::Parked),
            "researching" => Ok(Self::Researching),
            "decided" => Ok(Self::Decided),
            "implemented" => Ok(Self::Implemented),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("unknown decision status: {s}")),
        }
    }
}

/// Forum thread state. Any state may transition to any other; the dashboard
/// uses these only as filter tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Active,
    Answered,
    Pending,
    Closed,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Answered => "answered",
            Self::Pending => "pending",
            Self::Closed => "closed",
        }
    }
}

impl std::str::FromStr for ThreadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "answered" => Ok(Self::Answered),
            "pending" => Ok(Self::Pending),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("unknown thread status: {s}")),
        }
    }
}

/// Author role of a forum message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Human,
    Oracle,
    Claude,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Oracle => "oracle",
            Self::Claude => "claude",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "oracle" => Ok(Self::Oracle),
            "claude" => Ok(Self::Claude),
            _ => Err(format!("unknown message role: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_roundtrip() {
        for t in ["principle", "learning", "pattern", "retro"] {
            let parsed: DocType = t.parse().unwrap();
            assert_eq!(parsed.as_str(), t);
        }
        assert!("memo".parse::<DocType>().is_err());
    }

    #[test]
    fn type_filter_treats_all_as_none() {
        assert_eq!(parse_type_filter(None).unwrap(), None);
        assert_eq!(parse_type_filter(Some("all")).unwrap(), None);
        assert_eq!(
            parse_type_filter(Some("retro")).unwrap(),
            Some(DocType::Retro)
        );
        assert!(parse_type_filter(Some("bogus")).is_err());
    }

    #[test]
    fn search_mode_defaults_to_hybrid() {
        assert_eq!("".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert_eq!("vector".parse::<SearchMode>().unwrap(), SearchMode::Vector);
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }
}

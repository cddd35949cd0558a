//! Message protocol between page contexts and the background service.
//!
//! Requests and broadcasts are tagged unions (`type` field on the wire);
//! replies are flat `{ok, ...}` objects. The JSON shapes are stable so a
//! page embedded in another runtime can speak the same protocol.

use serde::{Deserialize, Serialize};

use crate::lookup::cache::CacheEntry;

/// Request a page sends to the background service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageRequest {
    /// Liveness probe; answered immediately.
    #[serde(rename = "PING")]
    Ping,
    /// Resolve a selected term, optionally within its surrounding sentence.
    #[serde(rename = "FETCH_JARGON")]
    FetchJargon {
        term: String,
        #[serde(default)]
        context: String,
    },
}

/// Payload carried by a successful interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretPayload {
    pub meaning_line: String,
}

/// Reply to a [`PageRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageResponse {
    Fetched {
        ok: bool,
        data: InterpretPayload,
        #[serde(rename = "fromCache")]
        from_cache: bool,
    },
    Pong {
        ok: bool,
        pong: bool,
    },
    Failed {
        ok: bool,
        error: String,
    },
}

impl PageResponse {
    pub fn pong() -> Self {
        PageResponse::Pong {
            ok: true,
            pong: true,
        }
    }

    pub fn fetched(meaning_line: String, from_cache: bool) -> Self {
        PageResponse::Fetched {
            ok: true,
            data: InterpretPayload { meaning_line },
            from_cache,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        PageResponse::Failed {
            ok: false,
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            PageResponse::Fetched { ok, .. } | PageResponse::Pong { ok, .. } => *ok,
            PageResponse::Failed { .. } => false,
        }
    }
}

/// One-way fan-out from the background service to page contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Broadcast {
    /// A cache write landed; pages showing `key` should refresh in place.
    #[serde(rename = "JARGON_CACHE_UPDATED")]
    CacheUpdated { key: String, entry: CacheEntry },
    /// Navigation committed in the receiving tab; dismiss any tooltip.
    #[serde(rename = "CLEAR_TIP")]
    ClearTip,
    /// The activation flag flipped.
    #[serde(rename = "TOGGLE")]
    Toggle {
        #[serde(rename = "isActive")]
        is_active: bool,
    },
}

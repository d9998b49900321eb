//! player identity and connection handle types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable player identifier, handed to the core by the external auth layer.
///
/// The same id survives reconnects; the core never mints or mutates one.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct PlayerId(String,);

impl PlayerId {
    /// Wraps an externally issued player id.
    #[must_use]
    pub fn new(id: impl Into<String,>,) -> Self {
        Self(id.into(),)
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self,) -> &str {
        &self.0
    }

    /// Whether the id is usable at all.
    #[must_use]
    pub fn is_empty(&self,) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A player identity as supplied by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    /// Stable identifier.
    pub id:           PlayerId,
    /// Name shown to other players.
    pub display_name: String,
}

/// Transport-level identifier for one physical connection.
///
/// Minted on connect, invalidated on disconnect, never reused. Many handles
/// may map to one [`PlayerId`] over time (refresh, network drop, tab switch).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct ConnId(u64,);

impl ConnId {
    fn get_random_u64() -> Result<u64, getrandom::Error,> {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf,)?;
        Ok(u64::from_ne_bytes(buf,),)
    }

    /// Creates a new unique (with high probability) connection handle.
    ///
    /// # Panics
    /// Panics if the system randomness source is unavailable.
    #[must_use]
    pub fn new_id() -> Self {
        Self(Self::get_random_u64().expect("system rng",),)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

use std::{fmt, str::FromStr};

use uuid::Uuid;

// -----------------------------------------------------------------------------
// ----- SessionId -------------------------------------------------------------

/// Opaque key a relay hands out on `create` and expects back on every
/// `read` / `write` / `close` for that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

// -----------------------------------------------------------------------------
// ----- SessionId: Static -----------------------------------------------------

impl SessionId {
    pub fn random() -> Self {
        SessionId(Uuid::new_v4())
    }
}

// -----------------------------------------------------------------------------
// ----- SessionId: Traits -----------------------------------------------------

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(SessionId)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------

//! Core types shared across the gateway.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a panel session (one per TCP connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Per-session traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames successfully decoded from the panel.
    pub frames_in: u64,
    /// Frames emitted to the panel.
    pub frames_out: u64,
    /// Packets dropped for framing, CRC, crypto, or codec errors.
    pub packets_dropped: u64,
    /// Transactions that ended in abort (timeout included).
    pub transactions_aborted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_short_display() {
        let id = SessionId::generate();
        assert_eq!(id.to_string().len(), 8);
    }
}

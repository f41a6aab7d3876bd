//! Signal action and identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// Direction a provider publishes for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Long,
    Short,
}

impl SignalAction {
    pub const ALL: [SignalAction; 4] = [Self::Buy, Self::Sell, Self::Long, Self::Short];

    /// BUY and LONG profit when price rises; SELL and SHORT when it falls.
    pub fn is_long(&self) -> bool {
        matches!(self, Self::Buy | Self::Long)
    }

    /// Open actions that a new signal with this action closes when paired.
    ///
    /// SELL exits a BUY/LONG, SHORT exits a LONG, BUY covers a SHORT/SELL,
    /// LONG covers a SHORT.
    pub fn closes(&self) -> &'static [SignalAction] {
        match self {
            Self::Sell => &[Self::Buy, Self::Long],
            Self::Short => &[Self::Long],
            Self::Buy => &[Self::Short, Self::Sell],
            Self::Long => &[Self::Short],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "LONG" => Ok(Self::Long),
            "SHORT" => Ok(Self::Short),
            other => Err(CoreError::InvalidAction(other.to_string())),
        }
    }
}

/// Unique signal identifier.
///
/// Format: `sig_{timestamp_ms}_{uuid_short}`, sortable by creation time
/// at millisecond resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    /// Create a new unique signal ID.
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..12];
        Self(format!("sig_{ts}_{uuid_short}"))
    }

    /// Create from an existing string (path parameters, journal replay).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SignalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_long() {
        assert!(SignalAction::Buy.is_long());
        assert!(SignalAction::Long.is_long());
        assert!(!SignalAction::Sell.is_long());
        assert!(!SignalAction::Short.is_long());
    }

    #[test]
    fn test_closes_opposite_side_only() {
        for action in SignalAction::ALL {
            for closed in action.closes() {
                assert_ne!(action.is_long(), closed.is_long(), "{action} -> {closed}");
            }
        }
        assert!(SignalAction::Sell.closes().contains(&SignalAction::Long));
        assert!(!SignalAction::Short.closes().contains(&SignalAction::Buy));
    }

    #[test]
    fn test_parse_action() {
        assert_eq!("buy".parse::<SignalAction>().unwrap(), SignalAction::Buy);
        assert_eq!(" SHORT ".parse::<SignalAction>().unwrap(), SignalAction::Short);
        assert!("hold".parse::<SignalAction>().is_err());
    }

    #[test]
    fn test_action_serde_uppercase() {
        let json = serde_json::to_string(&SignalAction::Long).unwrap();
        assert_eq!(json, "\"LONG\"");
    }

    #[test]
    fn test_signal_id_unique() {
        let a = SignalId::new();
        let b = SignalId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("sig_"));
    }
}

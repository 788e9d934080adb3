//! Non-monetary metadata attached to an output by the ordinal/token indexer
//!
//! The indexer hands back untyped JSON. It is parsed once, at categorization
//! time, into [`Decoration`] so the rest of the engine can match on it
//! exhaustively instead of probing fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Outpoint;

/// Tagged decoration payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decoration {
    /// Ordinal inscription
    Inscription {
        origin: Option<Outpoint>,
        content_type: Option<String>,
        #[serde(default)]
        payload: Value,
    },
    /// Fungible token, type A (tick-based deploy/mint/transfer)
    TokenA {
        origin: Option<Outpoint>,
        tick: Option<String>,
        amount: Option<String>,
        #[serde(default)]
        payload: Value,
    },
    /// Fungible token, type B (contract-id based)
    TokenB {
        origin: Option<Outpoint>,
        id: Option<String>,
        amount: Option<String>,
        #[serde(default)]
        payload: Value,
    },
    /// Ordinal with a known origin but no recognised payload
    Origin { origin: Outpoint },
    /// Metadata present but not understood; does not mark the output as an asset
    Unknown {
        #[serde(default)]
        payload: Value,
    },
}

impl Decoration {
    /// Whether the decoration makes the output a non-fungible or token asset
    pub fn is_asset(&self) -> bool {
        !matches!(self, Decoration::Unknown { .. })
    }

    pub fn origin(&self) -> Option<&Outpoint> {
        match self {
            Decoration::Inscription { origin, .. }
            | Decoration::TokenA { origin, .. }
            | Decoration::TokenB { origin, .. } => origin.as_ref(),
            Decoration::Origin { origin } => Some(origin),
            Decoration::Unknown { .. } => None,
        }
    }

    /// Short label used in logs and the CLI
    pub fn kind(&self) -> &'static str {
        match self {
            Decoration::Inscription { .. } => "inscription",
            Decoration::TokenA { .. } => "token_a",
            Decoration::TokenB { .. } => "token_b",
            Decoration::Origin { .. } => "ordinal",
            Decoration::Unknown { .. } => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoration_json_shape() {
        let decoration = Decoration::TokenB {
            origin: None,
            id: Some("abc_0".into()),
            amount: Some("100".into()),
            payload: Value::Null,
        };
        let json = serde_json::to_value(&decoration).unwrap();
        assert_eq!(json["kind"], "token_b");
        let back: Decoration = serde_json::from_value(json).unwrap();
        assert_eq!(back, decoration);
    }

    #[test]
    fn test_unknown_is_not_an_asset() {
        assert!(!Decoration::Unknown { payload: Value::Null }.is_asset());
        let origin = Outpoint::new("11".repeat(32), 0);
        assert!(Decoration::Origin { origin: origin.clone() }.is_asset());
        assert_eq!(
            Decoration::Origin { origin: origin.clone() }.origin(),
            Some(&origin)
        );
    }
}

//! Partition indexer outputs into ordinals, token A, token B and funding
//!
//! Indexer markers are advisory and can overlap. One output lands in exactly
//! one bucket; the first matching rule wins:
//!
//! 1. token B marker
//! 2. token A marker
//! 3. inscription marker, or a non-empty origin outpoint
//! 4. funding

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

use crate::{
    chain::{DecoratedUtxo, OriginData},
    data_structures::{Decoration, Outpoint, WalletOutput},
    errors::WalletResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    Ordinal,
    TokenA,
    TokenB,
    Funding,
}

/// Disjoint buckets; their lengths sum to the input length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedOutputs {
    pub ordinals: Vec<DecoratedUtxo>,
    pub token_a: Vec<DecoratedUtxo>,
    pub token_b: Vec<DecoratedUtxo>,
    pub funding: Vec<DecoratedUtxo>,
}

impl CategorizedOutputs {
    pub fn len(&self) -> usize {
        self.ordinals.len() + self.token_a.len() + self.token_b.len() + self.funding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything except funding
    pub fn decorated(&self) -> impl Iterator<Item = &DecoratedUtxo> {
        self.ordinals
            .iter()
            .chain(self.token_a.iter())
            .chain(self.token_b.iter())
    }

    fn push(&mut self, category: OutputCategory, utxo: DecoratedUtxo) {
        match category {
            OutputCategory::Ordinal => self.ordinals.push(utxo),
            OutputCategory::TokenA => self.token_a.push(utxo),
            OutputCategory::TokenB => self.token_b.push(utxo),
            OutputCategory::Funding => self.funding.push(utxo),
        }
    }
}

fn is_marker(value: &Option<Value>) -> bool {
    value.as_ref().is_some_and(|v| !v.is_null())
}

/// Category of a single output under the priority rule
pub fn classify(utxo: &DecoratedUtxo) -> OutputCategory {
    let data = utxo.origin_data();
    if data.is_some_and(|d| is_marker(&d.token_b)) {
        OutputCategory::TokenB
    } else if data.is_some_and(|d| is_marker(&d.token_a)) {
        OutputCategory::TokenA
    } else if data.is_some_and(|d| is_marker(&d.inscription)) || utxo.origin_outpoint().is_some() {
        OutputCategory::Ordinal
    } else {
        OutputCategory::Funding
    }
}

pub fn categorize(utxos: &[DecoratedUtxo]) -> CategorizedOutputs {
    let mut out = CategorizedOutputs::default();
    for utxo in utxos {
        out.push(classify(utxo), utxo.clone());
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(
        ordinals = out.ordinals.len(),
        token_a = out.token_a.len(),
        token_b = out.token_b.len(),
        funding = out.funding.len(),
        "Categorized indexer outputs"
    );
    out
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Typed decoration for an output; `None` for plain funding outputs
pub fn decoration_for(utxo: &DecoratedUtxo) -> Option<Decoration> {
    let raw_origin = utxo.origin_outpoint();
    let origin = raw_origin.and_then(|s| Outpoint::from_str(s).ok());
    let empty = OriginData::default();
    let data = utxo.origin_data().unwrap_or(&empty);

    match classify(utxo) {
        OutputCategory::TokenB => {
            let payload = data.token_b.clone().unwrap_or(Value::Null);
            Some(Decoration::TokenB {
                origin,
                id: str_field(&payload, "id"),
                amount: str_field(&payload, "amt"),
                payload,
            })
        }
        OutputCategory::TokenA => {
            let payload = data.token_a.clone().unwrap_or(Value::Null);
            Some(Decoration::TokenA {
                origin,
                tick: str_field(&payload, "tick"),
                amount: str_field(&payload, "amt"),
                payload,
            })
        }
        OutputCategory::Ordinal => match (&data.inscription, origin) {
            (Some(insc), origin) if !insc.is_null() => Some(Decoration::Inscription {
                origin,
                content_type: insc
                    .get("file")
                    .and_then(|f| str_field(f, "type")),
                payload: insc.clone(),
            }),
            (_, Some(origin)) => Some(Decoration::Origin { origin }),
            // Origin string the indexer set but we cannot parse; still an asset
            (_, None) => Some(Decoration::Inscription {
                origin: None,
                content_type: None,
                payload: json!({ "origin": raw_origin }),
            }),
        },
        OutputCategory::Funding if !data.other.is_empty() => Some(Decoration::Unknown {
            payload: Value::Object(data.other.clone()),
        }),
        OutputCategory::Funding => None,
    }
}

/// Store record for an indexer output, non-spendable when it carries an asset
pub fn to_wallet_output(utxo: &DecoratedUtxo) -> WalletResult<WalletOutput> {
    let outpoint = Outpoint::new(utxo.txid.clone(), utxo.vout);
    let script = hex::decode(&utxo.locking_script_hex)?;
    let output = WalletOutput::new(outpoint, utxo.satoshis, script).with_block_height(utxo.block_height);
    Ok(match decoration_for(utxo) {
        Some(decoration) => output.with_decoration(decoration),
        None => output,
    })
}

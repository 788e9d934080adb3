//! P2PKH input signing with the BIP143 digest and SIGHASH_ALL|FORKID
//!
//! Preimage = version || hashPrevouts || hashSequence || outpoint ||
//! scriptCode || value || nSequence || hashOutputs || locktime || sighashType

use secp256k1::{ecdsa::Signature, PublicKey, Secp256k1};

use super::tx::{write_varint, Transaction};
use crate::{
    crypto::{hash160, sha256d},
    errors::{WalletError, WalletResult},
    keys::{p2pkh_pubkey_hash, WalletKey},
};

pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Amount and locking script of the output an input spends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevOut {
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
}

/// Digest signed for input `input_index`
pub fn sighash_digest(
    tx: &Transaction,
    input_index: usize,
    prev_out: &PrevOut,
) -> WalletResult<[u8; 32]> {
    sighash_digest_with_type(tx, input_index, prev_out, SIGHASH_ALL_FORKID)
}

/// BIP143 digest for an explicit `sighash_type`; only the ALL variants are covered
pub fn sighash_digest_with_type(
    tx: &Transaction,
    input_index: usize,
    prev_out: &PrevOut,
    sighash_type: u32,
) -> WalletResult<[u8; 32]> {
    let input = tx.inputs.get(input_index).ok_or_else(|| {
        WalletError::InvalidArgument(format!(
            "Input index {input_index} out of range ({} inputs)",
            tx.inputs.len()
        ))
    })?;

    let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
    let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
    for i in &tx.inputs {
        prevouts.extend_from_slice(&i.outpoint.txid_wire_bytes()?);
        prevouts.extend_from_slice(&i.outpoint.vout.to_le_bytes());
        sequences.extend_from_slice(&i.sequence.to_le_bytes());
    }

    let mut preimage = Vec::new();
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&prevouts));
    preimage.extend_from_slice(&sha256d(&sequences));
    preimage.extend_from_slice(&input.outpoint.txid_wire_bytes()?);
    preimage.extend_from_slice(&input.outpoint.vout.to_le_bytes());
    write_varint(&mut preimage, prev_out.locking_script.len() as u64);
    preimage.extend_from_slice(&prev_out.locking_script);
    preimage.extend_from_slice(&prev_out.satoshis.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&tx.serialize_outputs()));
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&sighash_type.to_le_bytes());

    Ok(sha256d(&preimage))
}

/// `<sig+hashtype> <pubkey>`
fn p2pkh_unlocking_script(signature: &Signature, pubkey: &[u8; 33]) -> Vec<u8> {
    let der = signature.serialize_der();
    let mut script = Vec::with_capacity(der.len() + 36);
    script.push((der.len() + 1) as u8);
    script.extend_from_slice(&der);
    script.push(SIGHASH_ALL_FORKID as u8);
    script.push(33);
    script.extend_from_slice(pubkey);
    script
}

/// Sign every input of `tx` with `key`; `prev_outs` is index-aligned with the inputs
///
/// Outputs and input order must be final: all digests commit to them.
pub fn sign_p2pkh_inputs(
    tx: &mut Transaction,
    prev_outs: &[PrevOut],
    key: &WalletKey,
) -> WalletResult<()> {
    if prev_outs.len() != tx.inputs.len() {
        return Err(WalletError::InvalidArgument(format!(
            "{} previous outputs for {} inputs",
            prev_outs.len(),
            tx.inputs.len()
        )));
    }

    let own_hash = key.pubkey_hash();
    let pubkey = key.public_key_bytes();
    let mut scripts = Vec::with_capacity(prev_outs.len());
    for (index, prev_out) in prev_outs.iter().enumerate() {
        if p2pkh_pubkey_hash(&prev_out.locking_script) != Some(own_hash) {
            return Err(WalletError::KeyError(format!(
                "Input {} ({}) is not locked to the wallet key",
                index, tx.inputs[index].outpoint
            )));
        }
        let digest = sighash_digest(tx, index, prev_out)?;
        scripts.push(p2pkh_unlocking_script(&key.sign_digest(digest), &pubkey));
    }

    for (input, script) in tx.inputs.iter_mut().zip(scripts) {
        input.script_sig = script;
    }
    Ok(())
}

/// Check a signed P2PKH input against the output it spends
pub fn verify_p2pkh_input(
    tx: &Transaction,
    input_index: usize,
    prev_out: &PrevOut,
) -> WalletResult<bool> {
    let Some(input) = tx.inputs.get(input_index) else {
        return Ok(false);
    };
    let script = &input.script_sig;
    let Some(&sig_len) = script.first() else {
        return Ok(false);
    };
    let sig_len = sig_len as usize;
    if sig_len < 2 || script.len() != 1 + sig_len + 1 + 33 || script[1 + sig_len] != 33 {
        return Ok(false);
    }
    if script[sig_len] != SIGHASH_ALL_FORKID as u8 {
        return Ok(false);
    }

    let der = &script[1..sig_len];
    let pubkey_bytes = &script[2 + sig_len..];
    if p2pkh_pubkey_hash(&prev_out.locking_script) != Some(hash160(pubkey_bytes)) {
        return Ok(false);
    }

    let signature = Signature::from_der(der)?;
    let pubkey = PublicKey::from_slice(pubkey_bytes)?;
    let digest = sighash_digest(tx, input_index, prev_out)?;
    let msg = secp256k1::Message::from_digest(digest);
    Ok(Secp256k1::verification_only()
        .verify_ecdsa(&msg, &signature, &pubkey)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Network,
        data_structures::Outpoint,
        signing::tx::{TxIn, TxOut},
    };

    fn unsigned(key: &WalletKey) -> (Transaction, Vec<PrevOut>) {
        let mut tx = Transaction::new();
        tx.inputs.push(TxIn::unsigned(Outpoint::new("aa".repeat(32), 0)));
        tx.inputs.push(TxIn::unsigned(Outpoint::new("bb".repeat(32), 2)));
        tx.outputs.push(TxOut::new(900, key.locking_script()));
        let prev_outs = vec![
            PrevOut {
                satoshis: 600,
                locking_script: key.locking_script(),
            },
            PrevOut {
                satoshis: 400,
                locking_script: key.locking_script(),
            },
        ];
        (tx, prev_outs)
    }

    #[test]
    fn test_signed_inputs_verify() {
        let key = WalletKey::generate(Network::Mainnet);
        let (mut tx, prev_outs) = unsigned(&key);
        let unsigned_txid = tx.txid().unwrap();
        sign_p2pkh_inputs(&mut tx, &prev_outs, &key).unwrap();

        assert!(tx.is_signed());
        assert_ne!(tx.txid().unwrap(), unsigned_txid);
        for (i, prev_out) in prev_outs.iter().enumerate() {
            assert!(verify_p2pkh_input(&tx, i, prev_out).unwrap());
        }
    }

    #[test]
    fn test_digest_commits_to_amount_and_outputs() {
        let key = WalletKey::generate(Network::Mainnet);
        let (mut tx, prev_outs) = unsigned(&key);
        sign_p2pkh_inputs(&mut tx, &prev_outs, &key).unwrap();

        let wrong_amount = PrevOut {
            satoshis: 601,
            ..prev_outs[0].clone()
        };
        assert!(!verify_p2pkh_input(&tx, 0, &wrong_amount).unwrap());

        tx.outputs[0].satoshis = 901;
        assert!(!verify_p2pkh_input(&tx, 0, &prev_outs[0]).unwrap());
    }

    #[test]
    fn test_refuses_foreign_inputs() {
        let key = WalletKey::generate(Network::Mainnet);
        let other = WalletKey::generate(Network::Mainnet);
        let (mut tx, mut prev_outs) = unsigned(&key);
        prev_outs[1].locking_script = other.locking_script();
        assert!(matches!(
            sign_p2pkh_inputs(&mut tx, &prev_outs, &key),
            Err(WalletError::KeyError(_))
        ));
        assert!(!tx.is_signed());
    }

    /// Native P2WPKH example of BIP143, second input. The preimage layout is
    /// shared with FORKID signing, only the type byte differs.
    #[test]
    fn test_digest_matches_bip143_vector() {
        let tx = Transaction::from_hex(
            "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f\
             0000000000eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b9\
             0ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a\
             783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167f\
             aa815988ac11000000",
        )
        .unwrap();
        assert_eq!(tx.inputs[0].sequence, 0xffff_ffee);
        assert_eq!(tx.lock_time, 0x11);

        let prev_out = PrevOut {
            satoshis: 600_000_000,
            locking_script: hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac")
                .unwrap(),
        };
        let digest = sighash_digest_with_type(&tx, 1, &prev_out, 0x01).unwrap();
        assert_eq!(
            hex::encode(digest),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );

        // FORKID changes only the type field
        assert_ne!(sighash_digest(&tx, 1, &prev_out).unwrap(), digest);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let key = WalletKey::generate(Network::Mainnet);
        let (tx, prev_outs) = unsigned(&key);
        assert_eq!(
            sighash_digest(&tx, 1, &prev_outs[1]).unwrap(),
            sighash_digest(&tx, 1, &prev_outs[1]).unwrap()
        );
        assert_ne!(
            sighash_digest(&tx, 0, &prev_outs[0]).unwrap(),
            sighash_digest(&tx, 1, &prev_outs[1]).unwrap()
        );
        assert!(sighash_digest(&tx, 2, &prev_outs[0]).is_err());
    }
}

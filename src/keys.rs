//! Single-key wallet identity: secp256k1 key, P2PKH address and script
//!
//! Key derivation and seed handling happen outside this crate; the engine is
//! handed one signing key per session.

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use std::fmt::{Debug, Formatter};
use zeroize::Zeroize;

use crate::{
    config::Network,
    crypto::hash160,
    errors::{WalletError, WalletResult},
};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

/// Build a P2PKH locking script: OP_DUP OP_HASH160 <20-byte-hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_locking_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Extract the pubkey hash from a standard P2PKH locking script
pub fn p2pkh_pubkey_hash(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        let mut pkh = [0u8; 20];
        pkh.copy_from_slice(&script[3..23]);
        Some(pkh)
    } else {
        None
    }
}

/// Base58Check P2PKH address for a pubkey hash
pub fn address_from_pubkey_hash(pubkey_hash: &[u8; 20], network: Network) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(network.p2pkh_prefix());
    payload.extend_from_slice(pubkey_hash);
    bs58::encode(payload).with_check().into_string()
}

/// Decode a P2PKH address for `network` into its locking script
pub fn locking_script_for_address(address: &str, network: Network) -> WalletResult<Vec<u8>> {
    let decoded = bs58::decode(address.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| WalletError::InvalidArgument(format!("Invalid address {address}: {e}")))?;
    if decoded.len() != 21 {
        return Err(WalletError::InvalidArgument(format!(
            "Invalid address length: {}",
            decoded.len()
        )));
    }
    if decoded[0] != network.p2pkh_prefix() {
        return Err(WalletError::InvalidArgument(format!(
            "Address {address} is not a {network} P2PKH address (prefix 0x{:02x})",
            decoded[0]
        )));
    }
    let mut pkh = [0u8; 20];
    pkh.copy_from_slice(&decoded[1..21]);
    Ok(p2pkh_locking_script(&pkh))
}

/// The wallet's signing key
pub struct WalletKey {
    secp: Secp256k1<secp256k1::All>,
    secret: SecretKey,
    public: PublicKey,
    network: Network,
}

impl WalletKey {
    pub fn from_secret_bytes(bytes: &[u8; 32], network: Network) -> WalletResult<Self> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| WalletError::KeyError(format!("Invalid private key: {e}")))?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self {
            secp,
            secret,
            public,
            network,
        })
    }

    /// Fresh random key
    pub fn generate(network: Network) -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Self {
            secp,
            secret,
            public,
            network,
        }
    }

    /// Import a WIF key; the network is taken from the WIF prefix
    pub fn from_wif(wif: &str) -> WalletResult<Self> {
        let mut decoded = bs58::decode(wif.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| WalletError::KeyError(format!("Invalid WIF: {e}")))?;

        let network = match decoded.first() {
            Some(&p) if p == Network::Mainnet.wif_prefix() => Network::Mainnet,
            Some(&p) if p == Network::Testnet.wif_prefix() => Network::Testnet,
            _ => {
                decoded.zeroize();
                return Err(WalletError::KeyError("Invalid WIF prefix".to_string()));
            }
        };

        let compressed = decoded.len() == 34 && decoded[33] == 0x01;
        if !compressed && decoded.len() != 33 {
            let len = decoded.len();
            decoded.zeroize();
            return Err(WalletError::KeyError(format!("Invalid WIF length: {len}")));
        }

        let mut secret_bytes = [0u8; 32];
        secret_bytes.copy_from_slice(&decoded[1..33]);
        decoded.zeroize();
        let key = Self::from_secret_bytes(&secret_bytes, network);
        secret_bytes.zeroize();
        key
    }

    /// Compressed WIF encoding
    pub fn to_wif(&self) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(self.network.wif_prefix());
        payload.extend_from_slice(&self.secret.secret_bytes());
        payload.push(0x01);
        let wif = bs58::encode(&payload).with_check().into_string();
        payload.zeroize();
        wif
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Compressed SEC1 public key
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public.serialize()
    }

    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.public_key_bytes())
    }

    pub fn address(&self) -> String {
        address_from_pubkey_hash(&self.pubkey_hash(), self.network)
    }

    /// The wallet's own P2PKH script, also used for change
    pub fn locking_script(&self) -> Vec<u8> {
        p2pkh_locking_script(&self.pubkey_hash())
    }

    /// ECDSA-sign a 32-byte digest (low-S, RFC6979 nonce)
    pub fn sign_digest(&self, digest: [u8; 32]) -> Signature {
        let msg = Message::from_digest(digest);
        self.secp.sign_ecdsa(&msg, &self.secret)
    }

    pub fn verify_digest(&self, digest: [u8; 32], signature: &Signature) -> bool {
        let msg = Message::from_digest(digest);
        self.secp
            .verify_ecdsa(&msg, signature, &self.public)
            .is_ok()
    }
}

impl Drop for WalletKey {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl Debug for WalletKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKey")
            .field("address", &self.address())
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

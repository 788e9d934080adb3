//! Raw transaction codec
//!
//! Legacy version-1 serialization:
//! `version | varint(n_in) | inputs | varint(n_out) | outputs | locktime`

use serde::{Deserialize, Serialize};

use crate::{
    crypto::sha256d,
    data_structures::Outpoint,
    errors::{WalletError, WalletResult},
};

pub const TX_VERSION: u32 = 1;
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Encode a u64 as a Bitcoin varint
pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub outpoint: Outpoint,
    /// Empty until signed
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn unsigned(outpoint: Outpoint) -> Self {
        Self {
            outpoint,
            script_sig: Vec::new(),
            sequence: DEFAULT_SEQUENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
}

impl TxOut {
    pub fn new(satoshis: u64, locking_script: Vec<u8>) -> Self {
        Self {
            satoshis,
            locking_script,
        }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.satoshis.to_le_bytes());
        write_varint(buf, self.locking_script.len() as u64);
        buf.extend_from_slice(&self.locking_script);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.satoshis).sum()
    }

    pub fn is_signed(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(|i| !i.script_sig.is_empty())
    }

    /// Serialized outputs only, as hashed into the sighash
    pub fn serialize_outputs(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for out in &self.outputs {
            out.write(&mut buf);
        }
        buf
    }

    pub fn serialize(&self) -> WalletResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());

        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(&input.outpoint.txid_wire_bytes()?);
            buf.extend_from_slice(&input.outpoint.vout.to_le_bytes());
            write_varint(&mut buf, input.script_sig.len() as u64);
            buf.extend_from_slice(&input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_varint(&mut buf, self.outputs.len() as u64);
        for out in &self.outputs {
            out.write(&mut buf);
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        Ok(buf)
    }

    pub fn to_hex(&self) -> WalletResult<String> {
        Ok(hex::encode(self.serialize()?))
    }

    /// Txid in display (reversed) hex
    pub fn txid(&self) -> WalletResult<String> {
        Ok(txid_of(&self.serialize()?))
    }

    pub fn deserialize(bytes: &[u8]) -> WalletResult<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_u32()?;

        let input_count = reader.read_varint()?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let mut txid = reader.read_bytes(32)?.to_vec();
            txid.reverse();
            let vout = reader.read_u32()?;
            let script_len = reader.read_varint()? as usize;
            let script_sig = reader.read_bytes(script_len)?.to_vec();
            let sequence = reader.read_u32()?;
            inputs.push(TxIn {
                outpoint: Outpoint::new(hex::encode(txid), vout),
                script_sig,
                sequence,
            });
        }

        let output_count = reader.read_varint()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let satoshis = reader.read_u64()?;
            let script_len = reader.read_varint()? as usize;
            outputs.push(TxOut::new(satoshis, reader.read_bytes(script_len)?.to_vec()));
        }

        let lock_time = reader.read_u32()?;
        if !reader.is_empty() {
            return Err(WalletError::SerializationError(format!(
                "{} trailing bytes after transaction",
                reader.remaining()
            )));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn from_hex(raw: &str) -> WalletResult<Self> {
        Self::deserialize(&hex::decode(raw.trim())?)
    }
}

/// Display txid of raw transaction bytes
pub fn txid_of(raw_tx: &[u8]) -> String {
    let mut hash = sha256d(raw_tx);
    hash.reverse();
    hex::encode(hash)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn read_bytes(&mut self, len: usize) -> WalletResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(WalletError::SerializationError(format!(
                "Unexpected end of transaction at byte {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> WalletResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u16(&mut self) -> WalletResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> WalletResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> WalletResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_varint(&mut self) -> WalletResult<u64> {
        let first = self.read_bytes(1)?[0];
        Ok(match first {
            0xfd => self.read_u16()? as u64,
            0xfe => self.read_u32()? as u64,
            0xff => self.read_u64()?,
            n => n as u64,
        })
    }
}

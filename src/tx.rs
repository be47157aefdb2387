//! Transaction encoding and signing
//!
//! RLP encoding for legacy (EIP-155) and EIP-1559 (type 2) transactions. The
//! signing hash is keccak256 over the unsigned encoding; the transaction hash
//! is keccak256 over the signed raw bytes.

use ethereum_types::{H160, H256, U256};
use rlp::RlpStream;

use crate::abi::keccak256;
use crate::crypto::{RecoverableSignature, VaultSigner};
use crate::error::RelayError;
use crate::gas::{FeeParams, GasPlan};

const EIP1559_TX_TYPE: u8 = 0x02;

/// nonce, gasPrice, gasLimit, to, value, data
const LEGACY_FIELDS: usize = 6;
/// chainId, nonce, maxPriorityFee, maxFee, gasLimit, to, value, data, accessList
const EIP1559_FIELDS: usize = 9;

/// A transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: H160,
    pub value: U256,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub fees: FeeParams,
}

/// Signed raw bytes plus the hash nodes will report for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: H256,
    pub nonce: u64,
}

impl UnsignedTransaction {
    pub fn from_plan(chain_id: u64, plan: &GasPlan, to: H160, value: U256, data: Vec<u8>) -> Self {
        Self { chain_id, nonce: plan.nonce, to, value, data, gas_limit: plan.gas_limit, fees: plan.fees }
    }

    /// Opens a list of `trailer` extra items after the shared fields and appends those fields.
    fn stream_with(&self, trailer: usize) -> RlpStream {
        match self.fees {
            FeeParams::Legacy { gas_price } => {
                let mut stream = RlpStream::new_list(LEGACY_FIELDS + trailer);
                stream
                    .append(&self.nonce)
                    .append(&gas_price)
                    .append(&self.gas_limit)
                    .append(&self.to)
                    .append(&self.value)
                    .append(&self.data);
                stream
            }
            FeeParams::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas } => {
                let mut stream = RlpStream::new_list(EIP1559_FIELDS + trailer);
                stream
                    .append(&self.chain_id)
                    .append(&self.nonce)
                    .append(&max_priority_fee_per_gas)
                    .append(&max_fee_per_gas)
                    .append(&self.gas_limit)
                    .append(&self.to)
                    .append(&self.value)
                    .append(&self.data);
                // empty access list
                stream.begin_list(0);
                stream
            }
        }
    }

    /// Adds the type byte for typed envelopes.
    fn finish(&self, stream: RlpStream) -> Vec<u8> {
        let body = stream.out().to_vec();
        match self.fees {
            FeeParams::Legacy { .. } => body,
            FeeParams::Eip1559 { .. } => {
                let mut out = Vec::with_capacity(body.len() + 1);
                out.push(EIP1559_TX_TYPE);
                out.extend_from_slice(&body);
                out
            }
        }
    }

    /// Bytes whose keccak256 is signed.
    pub fn signing_payload(&self) -> Vec<u8> {
        let stream = match self.fees {
            FeeParams::Legacy { .. } => {
                // EIP-155: chainId, 0, 0
                let mut stream = self.stream_with(3);
                stream.append(&self.chain_id).append(&0u8).append(&0u8);
                stream
            }
            FeeParams::Eip1559 { .. } => self.stream_with(0),
        };
        self.finish(stream)
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.signing_payload())
    }

    /// Raw signed encoding for `eth_sendRawTransaction`.
    pub fn encode_signed(&self, signature: &RecoverableSignature) -> Vec<u8> {
        let v = match self.fees {
            FeeParams::Legacy { .. } => signature.recovery_id as u64 + self.chain_id * 2 + 35,
            FeeParams::Eip1559 { .. } => signature.recovery_id as u64,
        };
        let mut stream = self.stream_with(3);
        stream
            .append(&v)
            .append(&U256::from_big_endian(&signature.r))
            .append(&U256::from_big_endian(&signature.s));
        self.finish(stream)
    }

    pub fn sign(&self, signer: &VaultSigner) -> Result<SignedTransaction, RelayError> {
        let signature = signer.sign_prehash(&self.signing_hash())?;
        let raw = self.encode_signed(&signature);
        let hash = H256(keccak256(&raw));
        Ok(SignedTransaction { raw, hash, nonce: self.nonce })
    }
}

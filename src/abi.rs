//! Minimal Solidity ABI encoding and decoding
//!
//! Covers the static/dynamic parameter kinds used by the deposit and fill
//! contracts: `address`, `uint256`, `bytes32`, `bool` and `bytes`. Decoding is
//! strict: out-of-range offsets, truncated data and dirty address padding are
//! rejected instead of being silently accepted.

use ethereum_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Size of one ABI word in bytes.
pub const WORD: usize = 32;

/// Errors raised while decoding ABI data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("calldata too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("parameter {index}: offset {offset} out of bounds")]
    OffsetOutOfBounds { index: usize, offset: usize },
    #[error("parameter {index}: length {length} out of bounds")]
    LengthOutOfBounds { index: usize, length: usize },
    #[error("parameter {index}: address word has non-zero high bytes")]
    DirtyAddress { index: usize },
    #[error("parameter {index}: invalid bool word")]
    InvalidBool { index: usize },
    #[error("parameter {index}: value does not fit in 64 bits")]
    ValueOutOfRange { index: usize },
    #[error("invalid hex input: {0}")]
    InvalidHex(String),
}

/// Parameter kinds understood by [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint,
    FixedBytes32,
    Bool,
    Bytes,
}

/// A single ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(H160),
    Uint(U256),
    FixedBytes32(H256),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::Bytes(_))
    }
}

// ============================================================================
// HASHING / SELECTORS
// ============================================================================

/// Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First four bytes of the Keccak-256 hash of a canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

// ============================================================================
// ENCODING
// ============================================================================

/// Left-pads an address into a 32-byte word.
pub fn address_word(address: H160) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Big-endian 32-byte word for a uint256.
pub fn uint_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// ABI-encodes a parameter tuple (head/tail layout).
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word(U256::from(head_len + tail.len())));
        }
        match token {
            Token::Address(address) => head.extend_from_slice(&address_word(*address)),
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::FixedBytes32(value) => head.extend_from_slice(value.as_bytes()),
            Token::Bool(value) => head.extend_from_slice(&uint_word(U256::from(*value as u8))),
            Token::Bytes(bytes) => {
                tail.extend_from_slice(&uint_word(U256::from(bytes.len())));
                tail.extend_from_slice(bytes);
                tail.resize(tail.len() + padded_len(bytes.len()) - bytes.len(), 0);
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Selector followed by the ABI-encoded arguments.
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(tokens));
    data
}

// ============================================================================
// DECODING
// ============================================================================

fn word_at(data: &[u8], offset: usize, index: usize) -> Result<&[u8], DecodeError> {
    data.get(offset..offset + WORD)
        .ok_or(DecodeError::OffsetOutOfBounds { index, offset })
}

fn word_to_usize(word: &[u8], index: usize, data_len: usize) -> Result<usize, DecodeError> {
    let value = U256::from_big_endian(word);
    if value > U256::from(data_len) {
        return Err(DecodeError::OffsetOutOfBounds { index, offset: data_len });
    }
    Ok(value.as_usize())
}

/// Decodes `data` (without selector) as a tuple of `types`.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, DecodeError> {
    let head_len = types.len() * WORD;
    if data.len() < head_len {
        return Err(DecodeError::TooShort { expected: head_len, actual: data.len() });
    }

    let mut tokens = Vec::with_capacity(types.len());
    for (index, kind) in types.iter().enumerate() {
        let word = word_at(data, index * WORD, index)?;
        let token = match kind {
            ParamType::Address => {
                if word[..12].iter().any(|b| *b != 0) {
                    return Err(DecodeError::DirtyAddress { index });
                }
                Token::Address(H160::from_slice(&word[12..]))
            }
            ParamType::Uint => Token::Uint(U256::from_big_endian(word)),
            ParamType::FixedBytes32 => Token::FixedBytes32(H256::from_slice(word)),
            ParamType::Bool => {
                let value = U256::from_big_endian(word);
                if value.is_zero() {
                    Token::Bool(false)
                } else if value == U256::one() {
                    Token::Bool(true)
                } else {
                    return Err(DecodeError::InvalidBool { index });
                }
            }
            ParamType::Bytes => {
                let offset = word_to_usize(word, index, data.len())?;
                let length_word = word_at(data, offset, index)?;
                let length = U256::from_big_endian(length_word);
                if length > U256::from(data.len()) {
                    return Err(DecodeError::LengthOutOfBounds { index, length: data.len() });
                }
                let length = length.as_usize();
                let start = offset + WORD;
                let bytes = data
                    .get(start..start + length)
                    .ok_or(DecodeError::LengthOutOfBounds { index, length })?;
                Token::Bytes(bytes.to_vec())
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Narrows a uint256 to u64, failing for values that do not fit.
pub fn uint_to_u64(value: U256, index: usize) -> Result<u64, DecodeError> {
    if value > U256::from(u64::MAX) {
        return Err(DecodeError::ValueOutOfRange { index });
    }
    Ok(value.low_u64())
}

/// Parses a `0x`-prefixed (or bare) hex string into bytes.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, DecodeError> {
    let clean = input.trim().trim_start_matches("0x");
    hex::decode(clean).map_err(|e| DecodeError::InvalidHex(e.to_string()))
}

// ============================================================================
// CUSTOM ERRORS
// ============================================================================

/// Custom errors the relay contracts and their token dependencies can revert with.
pub const KNOWN_CONTRACT_ERRORS: &[&str] = &[
    "RelayAlreadyFilled()",
    "NotAuthorized()",
    "InsufficientBalance()",
    "InvalidAmount()",
    "InvalidRecipient()",
    "TransferFailed()",
    "SafeERC20FailedOperation(address)",
];

const ERROR_STRING_SIGNATURE: &str = "Error(string)";
const PANIC_SIGNATURE: &str = "Panic(uint256)";

/// A revert payload mapped to a human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRevert {
    /// Error name without parameters, e.g. `RelayAlreadyFilled`
    pub name: String,
    /// Extra context: the revert reason string, panic code or raw selector
    pub detail: String,
}

/// Maps revert data to a named error via its 4-byte selector.
///
/// Returns `None` when the payload is too short to carry a selector.
pub fn decode_revert(data: &[u8]) -> Option<ContractRevert> {
    if data.len() < 4 {
        return None;
    }
    let (head, args) = data.split_at(4);

    if head == selector(ERROR_STRING_SIGNATURE) {
        let reason = match decode(&[ParamType::Bytes], args) {
            Ok(tokens) => match tokens.first() {
                Some(Token::Bytes(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
                _ => String::new(),
            },
            Err(_) => String::new(),
        };
        return Some(ContractRevert { name: "Error".to_string(), detail: reason });
    }

    if head == selector(PANIC_SIGNATURE) {
        let code = args.get(..WORD).map(U256::from_big_endian).unwrap_or_default();
        return Some(ContractRevert { name: "Panic".to_string(), detail: format!("{:#x}", code) });
    }

    for signature in KNOWN_CONTRACT_ERRORS {
        if head == selector(signature) {
            let name = signature.split('(').next().unwrap_or(signature).to_string();
            return Some(ContractRevert { name, detail: format!("0x{}", hex::encode(args)) });
        }
    }

    Some(ContractRevert {
        name: format!("unknown(0x{})", hex::encode(head)),
        detail: format!("0x{}", hex::encode(args)),
    })
}

//! Calldata codec for the deposit and fill-relay contracts
//!
//! Dispatches on the 4-byte selector and decodes into typed records. Unknown
//! selectors decode to `None`; malformed arguments are a [`DecodeError`].

use ethereum_types::{H160, H256, U256};

use crate::abi::{self, uint_to_u64, DecodeError, ParamType, Token};

pub const DEPOSIT_SIGNATURE: &str = "deposit(address,bytes32,address,uint256,uint256,bytes)";
pub const FILL_RELAY_SIGNATURE: &str = "fillRelay(address,address,uint256,uint256,bytes32,bytes)";
pub const IS_RELAY_FILLED_SIGNATURE: &str = "isRelayFilled(uint256,bytes32,address,address)";
pub const ERC20_TRANSFER_SIGNATURE: &str = "transfer(address,uint256)";
pub const ERC20_APPROVE_SIGNATURE: &str = "approve(address,uint256)";

const DEPOSIT_PARAMS: [ParamType; 6] = [
    ParamType::Address,
    ParamType::FixedBytes32,
    ParamType::Address,
    ParamType::Uint,
    ParamType::Uint,
    ParamType::Bytes,
];

const FILL_RELAY_PARAMS: [ParamType; 6] = [
    ParamType::Address,
    ParamType::Address,
    ParamType::Uint,
    ParamType::Uint,
    ParamType::FixedBytes32,
    ParamType::Bytes,
];

/// A decoded `deposit(...)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRecord {
    pub vault: H160,
    /// Raw 32-byte recipient; see [`DepositRecord::recipient_address`]
    pub recipient: H256,
    /// Zero address means the chain's native coin
    pub input_token: H160,
    pub input_amount: U256,
    pub destination_chain_id: u64,
    pub message: Vec<u8>,
    /// Original calldata, kept for audit
    pub calldata: Vec<u8>,
}

impl DepositRecord {
    /// The recipient as an EVM address, or `None` if the high 12 bytes are set.
    pub fn recipient_address(&self) -> Option<H160> {
        recipient_from_word(self.recipient)
    }

    pub fn is_native_input(&self) -> bool {
        self.input_token.is_zero()
    }
}

/// A decoded `fillRelay(...)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillRecord {
    pub recipient: H160,
    /// Zero address means the chain's native coin
    pub output_token: H160,
    pub output_amount: U256,
    pub origin_chain_id: u64,
    pub deposit_hash: H256,
    pub message: Vec<u8>,
}

impl FillRecord {
    pub fn is_native_output(&self) -> bool {
        self.output_token.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCall {
    Deposit(DepositRecord),
    Fill(FillRecord),
}

// ============================================================================
// DECODING
// ============================================================================

/// Decodes deposit or fill-relay calldata.
///
/// # Returns
///
/// * `Ok(Some(_))` - Recognised selector, arguments decoded
/// * `Ok(None)` - Unknown selector (or calldata shorter than a selector)
/// * `Err(DecodeError)` - Recognised selector with malformed arguments
pub fn decode(calldata: &[u8]) -> Result<Option<DecodedCall>, DecodeError> {
    if calldata.len() < 4 {
        return Ok(None);
    }
    let (head, args) = calldata.split_at(4);

    if head == abi::selector(DEPOSIT_SIGNATURE) {
        let tokens = abi::decode(&DEPOSIT_PARAMS, args)?;
        return Ok(Some(DecodedCall::Deposit(deposit_from_tokens(tokens, calldata)?)));
    }
    if head == abi::selector(FILL_RELAY_SIGNATURE) {
        let tokens = abi::decode(&FILL_RELAY_PARAMS, args)?;
        return Ok(Some(DecodedCall::Fill(fill_from_tokens(tokens)?)));
    }
    Ok(None)
}

/// [`decode`] for hex-encoded input, as delivered by webhooks and explorers.
pub fn decode_hex(calldata: &str) -> Result<Option<DecodedCall>, DecodeError> {
    decode(&abi::decode_hex(calldata)?)
}

fn deposit_from_tokens(tokens: Vec<Token>, calldata: &[u8]) -> Result<DepositRecord, DecodeError> {
    match tokens.as_slice() {
        [Token::Address(vault), Token::FixedBytes32(recipient), Token::Address(input_token), Token::Uint(input_amount), Token::Uint(destination), Token::Bytes(message)] => {
            Ok(DepositRecord {
                vault: *vault,
                recipient: *recipient,
                input_token: *input_token,
                input_amount: *input_amount,
                destination_chain_id: uint_to_u64(*destination, 4)?,
                message: message.clone(),
                calldata: calldata.to_vec(),
            })
        }
        _ => unreachable!("abi::decode returns tokens matching DEPOSIT_PARAMS"),
    }
}

fn fill_from_tokens(tokens: Vec<Token>) -> Result<FillRecord, DecodeError> {
    match tokens.as_slice() {
        [Token::Address(recipient), Token::Address(output_token), Token::Uint(output_amount), Token::Uint(origin), Token::FixedBytes32(deposit_hash), Token::Bytes(message)] => {
            Ok(FillRecord {
                recipient: *recipient,
                output_token: *output_token,
                output_amount: *output_amount,
                origin_chain_id: uint_to_u64(*origin, 3)?,
                deposit_hash: *deposit_hash,
                message: message.clone(),
            })
        }
        _ => unreachable!("abi::decode returns tokens matching FILL_RELAY_PARAMS"),
    }
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encodes `deposit(...)` calldata. The record's `calldata` field is ignored.
pub fn encode_deposit(record: &DepositRecord) -> Vec<u8> {
    abi::encode_call(
        DEPOSIT_SIGNATURE,
        &[
            Token::Address(record.vault),
            Token::FixedBytes32(record.recipient),
            Token::Address(record.input_token),
            Token::Uint(record.input_amount),
            Token::Uint(U256::from(record.destination_chain_id)),
            Token::Bytes(record.message.clone()),
        ],
    )
}

pub fn encode_fill_relay(record: &FillRecord) -> Vec<u8> {
    abi::encode_call(
        FILL_RELAY_SIGNATURE,
        &[
            Token::Address(record.recipient),
            Token::Address(record.output_token),
            Token::Uint(record.output_amount),
            Token::Uint(U256::from(record.origin_chain_id)),
            Token::FixedBytes32(record.deposit_hash),
            Token::Bytes(record.message.clone()),
        ],
    )
}

/// Calldata for the `isRelayFilled` view on the fill contract.
pub fn encode_is_relay_filled(
    origin_chain_id: u64,
    deposit_hash: H256,
    recipient: H160,
    output_token: H160,
) -> Vec<u8> {
    abi::encode_call(
        IS_RELAY_FILLED_SIGNATURE,
        &[
            Token::Uint(U256::from(origin_chain_id)),
            Token::FixedBytes32(deposit_hash),
            Token::Address(recipient),
            Token::Address(output_token),
        ],
    )
}

/// Decodes a single ABI `bool` return value.
pub fn decode_bool_return(data: &[u8]) -> Result<bool, DecodeError> {
    match abi::decode(&[ParamType::Bool], data)?.as_slice() {
        [Token::Bool(value)] => Ok(*value),
        _ => unreachable!("abi::decode returns one bool token"),
    }
}

pub fn encode_erc20_transfer(to: H160, amount: U256) -> Vec<u8> {
    abi::encode_call(ERC20_TRANSFER_SIGNATURE, &[Token::Address(to), Token::Uint(amount)])
}

pub fn encode_erc20_approve(spender: H160, amount: U256) -> Vec<u8> {
    abi::encode_call(ERC20_APPROVE_SIGNATURE, &[Token::Address(spender), Token::Uint(amount)])
}

// ============================================================================
// ADDRESS / HASH HELPERS
// ============================================================================

/// Extracts an EVM address from a 32-byte word; `None` unless the high 12 bytes are zero.
pub fn recipient_from_word(word: H256) -> Option<H160> {
    let bytes = word.as_bytes();
    if bytes[..12].iter().any(|b| *b != 0) {
        return None;
    }
    Some(H160::from_slice(&bytes[12..]))
}

/// Left-pads an address into a bytes32 recipient word.
pub fn address_to_word(address: H160) -> H256 {
    H256(abi::address_word(address))
}

/// Deposit identifier: the source transaction hash, left-padded to 32 bytes.
pub fn deposit_hash_from_tx(tx_hash: &str) -> Result<H256, DecodeError> {
    let bytes = abi::decode_hex(tx_hash)?;
    if bytes.len() > 32 {
        return Err(DecodeError::InvalidHex(format!("transaction hash longer than 32 bytes: {}", tx_hash)));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(H256(word))
}

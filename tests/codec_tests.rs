//! Unit tests for the deposit / fill-relay calldata codec

use ethereum_types::{H160, H256, U256};
use fill_relayer::abi::DecodeError;
use fill_relayer::codec::{self, DecodedCall, FillRecord};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    addr, build_deposit, deposit_calldata_hex, deposit_hash, DEST_CHAIN_ID, DUMMY_DEST_TOKEN_ADDR,
    DUMMY_RECIPIENT_ADDR, DUMMY_VAULT_ADDR, ONE_TOKEN_18, ORIGIN_CHAIN_ID,
};

// ============================================================================
// DEPOSIT DECODING
// ============================================================================

/// What is tested: deposit calldata decodes back into the record it was built from
/// Why: Every fill starts from these fields; a shifted word would pay the wrong amount
#[test]
fn test_deposit_round_trip() {
    let record = build_deposit(DUMMY_VAULT_ADDR, U256::from(ONE_TOKEN_18), DEST_CHAIN_ID);
    let calldata = codec::encode_deposit(&record);

    let decoded = codec::decode(&calldata).unwrap();
    let Some(DecodedCall::Deposit(decoded)) = decoded else {
        panic!("expected a deposit, got {:?}", decoded);
    };

    assert_eq!(decoded.vault, addr(DUMMY_VAULT_ADDR));
    assert_eq!(decoded.recipient_address(), Some(addr(DUMMY_RECIPIENT_ADDR)));
    assert_eq!(decoded.input_amount, U256::from(ONE_TOKEN_18));
    assert_eq!(decoded.destination_chain_id, DEST_CHAIN_ID);
    assert_eq!(decoded.message, b"hello".to_vec());
    assert_eq!(decoded.calldata, calldata);
}

/// What is tested: hex input with and without the 0x prefix decodes the same
/// Why: Webhook providers and explorers disagree on the prefix
#[test]
fn test_deposit_decodes_from_hex() {
    let record = build_deposit(DUMMY_VAULT_ADDR, U256::from(42u64), DEST_CHAIN_ID);
    let prefixed = deposit_calldata_hex(&record);
    let bare = prefixed.trim_start_matches("0x").to_string();

    assert_eq!(codec::decode_hex(&prefixed).unwrap(), codec::decode_hex(&bare).unwrap());
}

/// What is tested: zero input token marks a native-coin deposit
/// Why: Native deposits are filled with msg.value instead of a token transfer
#[test]
fn test_zero_address_is_native_sentinel() {
    let mut record = build_deposit(DUMMY_VAULT_ADDR, U256::from(1u64), DEST_CHAIN_ID);
    record.input_token = H160::zero();

    let Some(DecodedCall::Deposit(decoded)) = codec::decode(&codec::encode_deposit(&record)).unwrap() else {
        panic!("expected a deposit");
    };
    assert!(decoded.is_native_input());
}

/// What is tested: a recipient word with high bytes set is not an EVM address
/// Why: Such deposits target non-EVM chains and must be rejected, not truncated
#[test]
fn test_recipient_with_high_bytes_is_invalid() {
    let mut record = build_deposit(DUMMY_VAULT_ADDR, U256::from(1u64), DEST_CHAIN_ID);
    let mut word = [0u8; 32];
    word[0] = 0xff;
    word[31] = 0x03;
    record.recipient = H256(word);

    let Some(DecodedCall::Deposit(decoded)) = codec::decode(&codec::encode_deposit(&record)).unwrap() else {
        panic!("expected a deposit");
    };
    assert_eq!(decoded.recipient_address(), None);
}

// ============================================================================
// FILL DECODING
// ============================================================================

/// What is tested: fillRelay calldata round trip, including a native output token
/// Why: The relayer encodes this call; the contract decodes it with the same layout
#[test]
fn test_fill_round_trip_with_native_output() {
    let fill = FillRecord {
        recipient: addr(DUMMY_RECIPIENT_ADDR),
        output_token: H160::zero(),
        output_amount: U256::from(900_000u64),
        origin_chain_id: ORIGIN_CHAIN_ID,
        deposit_hash: deposit_hash(),
        message: Vec::new(),
    };

    let decoded = codec::decode(&codec::encode_fill_relay(&fill)).unwrap();
    assert_eq!(decoded, Some(DecodedCall::Fill(fill.clone())));
    assert!(fill.is_native_output());

    let token_fill = FillRecord { output_token: addr(DUMMY_DEST_TOKEN_ADDR), ..fill };
    assert!(!token_fill.is_native_output());
}

// ============================================================================
// MALFORMED INPUT
// ============================================================================

/// What is tested: unknown selectors and too-short input decode to None
/// Why: Other calls to the watched contract are not errors, just not deposits
#[test]
fn test_unknown_selector_is_none() {
    let mut calldata = vec![0xde, 0xad, 0xbe, 0xef];
    calldata.extend_from_slice(&[0u8; 64]);
    assert_eq!(codec::decode(&calldata).unwrap(), None);
    assert_eq!(codec::decode(&[0x01, 0x02]).unwrap(), None);
}

/// What is tested: a deposit selector with truncated arguments is an error
/// Why: Partial calldata must never be filled with zero-defaulted fields
#[test]
fn test_truncated_deposit_is_error() {
    let record = build_deposit(DUMMY_VAULT_ADDR, U256::from(1u64), DEST_CHAIN_ID);
    let calldata = codec::encode_deposit(&record);
    let truncated = &calldata[..4 + 64];

    let err = codec::decode(truncated).unwrap_err();
    assert!(matches!(err, DecodeError::TooShort { .. }), "got {:?}", err);
}

/// What is tested: non-hex input is reported as invalid hex
/// Why: Garbage webhook payloads must fail cleanly at admission
#[test]
fn test_invalid_hex_is_error() {
    let err = codec::decode_hex("0xnothex").unwrap_err();
    assert!(matches!(err, DecodeError::InvalidHex(_)));
}

// ============================================================================
// DEPOSIT HASH
// ============================================================================

/// What is tested: short transaction hashes are left-padded to 32 bytes
/// Why: The deposit hash is the relay identifier on the fill contract
#[test]
fn test_deposit_hash_left_pads() {
    assert_eq!(codec::deposit_hash_from_tx("0x1234").unwrap(), H256::from_low_u64_be(0x1234));
    assert_eq!(deposit_hash(), H256::from_low_u64_be(0xdd));

    let too_long = format!("0x{}", "11".repeat(33));
    assert!(codec::deposit_hash_from_tx(&too_long).is_err());
}

//! Vault key management
//!
//! Loads the vault's secp256k1 key, derives its EVM address and signs
//! transaction hashes with a recovery id.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: Private keys must never be exposed or logged. `VaultSigner`
//! deliberately implements `Debug` by printing only the address.

use ethereum_types::H160;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::abi::keccak256;
use crate::config::VaultConfig;
use crate::error::RelayError;

/// ECDSA signature split into EVM transaction fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// 32-byte big-endian
    pub r: [u8; 32],
    /// 32-byte big-endian, low-s normalized
    pub s: [u8; 32],
    /// 0 or 1
    pub recovery_id: u8,
}

/// The vault's signing key for one relayer instance.
pub struct VaultSigner {
    signing_key: SigningKey,
    address: H160,
}

impl std::fmt::Debug for VaultSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSigner").field("address", &self.address).finish()
    }
}

impl VaultSigner {
    /// Creates a signer from a hex private key (with or without `0x`).
    pub fn from_hex(private_key_hex: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(private_key_hex.trim().trim_start_matches("0x"))
            .map_err(|e| anyhow::anyhow!("Invalid private key hex: {}", e))?;
        if bytes.len() != 32 {
            return Err(anyhow::anyhow!(
                "Invalid private key length: expected 32 bytes, got {}",
                bytes.len()
            ));
        }
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("Invalid secp256k1 private key: {}", e))?;
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self { signing_key, address })
    }

    /// Creates a signer from the environment variable named in the vault config.
    pub fn from_config(vault: &VaultConfig) -> anyhow::Result<Self> {
        Self::from_hex(&vault.get_private_key()?)
    }

    pub fn address(&self) -> H160 {
        self.address
    }

    /// Signs a 32-byte prehash (no message prefix).
    ///
    /// The caller passes the keccak256 of an encoded transaction.
    pub fn sign_prehash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, RelayError> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(hash)
            .map_err(|e| RelayError::Signing(format!("failed to sign transaction hash: {}", e)))?;

        let sig_bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig_bytes[..32]);
        s.copy_from_slice(&sig_bytes[32..64]);

        // The recovery id is whichever parity recovers our own key.
        let expected = self.signing_key.verifying_key();
        let recovery_id = [false, true]
            .into_iter()
            .map(|is_y_odd| RecoveryId::new(is_y_odd, false))
            .find(|id| {
                VerifyingKey::recover_from_prehash(hash, &signature, *id)
                    .map(|recovered| &recovered == expected)
                    .unwrap_or(false)
            })
            .ok_or_else(|| RelayError::Signing("could not determine recovery id".to_string()))?;

        Ok(RecoverableSignature { r, s, recovery_id: recovery_id.to_byte() })
    }
}

/// EVM address: last 20 bytes of keccak256 over the uncompressed public key coordinates.
pub fn address_from_verifying_key(key: &VerifyingKey) -> H160 {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    H160::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test key from the web3 documentation; never funded.
    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_address_derivation() {
        let signer = VaultSigner::from_hex(TEST_KEY).unwrap();
        assert_eq!(
            format!("{:?}", signer.address()),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_signature_recovers_signer() {
        let signer = VaultSigner::from_hex(TEST_KEY).unwrap();
        let hash = keccak256(b"fill");
        let sig = signer.sign_prehash(&hash).unwrap();

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&sig.r);
        bytes[32..].copy_from_slice(&sig.s);
        let signature = Signature::from_slice(&bytes).unwrap();
        let id = RecoveryId::from_byte(sig.recovery_id).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&hash, &signature, id).unwrap();
        assert_eq!(address_from_verifying_key(&recovered), signer.address());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = VaultSigner::from_hex(TEST_KEY).unwrap();
        let rendered = format!("{:?}", signer);
        assert!(!rendered.contains("4c0883a6"));
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(VaultSigner::from_hex("0x1234").is_err());
    }
}

//! Unit tests for configuration loading and validation

use fill_relayer::config::{Config, CONFIG_PATH_ENV};
use fill_relayer::crypto::VaultSigner;
use fill_relayer::dedup::DEFAULT_DEDUP_TTL;
use fill_relayer::gas::Priority;

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{addr, build_test_config, DUMMY_VAULT_ADDR, TEST_VAULT_KEY, TEST_VAULT_SIGNER_ADDR};

const MINIMAL_TOML: &str = r#"
[service]
authorized_vaults = ["0x0000000000000000000000000000000000000001"]

[[chain]]
name = "Base Sepolia"
chain_id = 84532
network = "BASE_SEPOLIA"
rpc_url = "https://sepolia.base.org"
deposit_contract = "0x0000000000000000000000000000000000000004"
fill_relay_contract = "0x0000000000000000000000000000000000000005"
is_mainnet = false

[[token]]
chain_id = 84532
symbol = "MBT"
group = "MBT"
address = "0x000000000000000000000000000000000000000b"
decimals = 6
"#;

// ============================================================================
// PARSING
// ============================================================================

/// What is tested: omitted sections take their defaults
/// Why: A minimal config must be enough to start the relayer
#[test]
fn test_minimal_config_defaults() {
    let config = Config::from_toml_str(MINIMAL_TOML).unwrap();

    assert_eq!(config.service.host, "127.0.0.1");
    assert_eq!(config.service.port, 3335);
    assert_eq!(config.service.fill_rate, "0.9");
    assert_eq!(config.service.priority, Priority::Standard);
    assert_eq!(config.service.authorized_vaults, vec![addr(DUMMY_VAULT_ADDR)]);
    assert_eq!(config.timeouts.pending_wait_secs, 60);
    assert_eq!(config.store.dedup_ttl_secs, DEFAULT_DEDUP_TTL.as_secs());
    assert!(config.store.redis_url.is_none());
    assert_eq!(config.vault.private_key_env, "VAULT_PRIVATE_KEY");
    assert_eq!(config.chains.len(), 1);
    assert_eq!(config.chains[0].fill_relay_contract, Some(addr("0x0000000000000000000000000000000000000005")));
}

/// What is tested: the shipped template parses and validates
/// Why: Operators start from the template
#[test]
fn test_template_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/fill-relayer.template.toml");
    let config = Config::load_from(path).unwrap();
    assert!(!config.chains.is_empty());
    assert!(!config.tokens.is_empty());
}

/// What is tested: a missing file names the template to copy
/// Why: First-run failures should tell the operator what to do
#[test]
fn test_missing_file_mentions_template() {
    let err = Config::load_from("/nonexistent/fill-relayer.toml").unwrap_err();
    assert!(err.to_string().contains("fill-relayer.template.toml"));
    assert_eq!(CONFIG_PATH_ENV, "FILL_RELAYER_CONFIG_PATH");
}

// ============================================================================
// VALIDATION
// ============================================================================

/// What is tested: the test configuration passes validation
/// Why: Every other test builds on it
#[test]
fn test_test_config_is_valid() {
    build_test_config().validate().unwrap();
}

/// What is tested: an empty vault allow-list is rejected
/// Why: Filling unauthorized vaults pays out relayer funds
#[test]
fn test_rejects_empty_vault_list() {
    let mut config = build_test_config();
    config.service.authorized_vaults.clear();
    assert!(config.validate().unwrap_err().to_string().contains("authorized_vaults"));
}

/// What is tested: fill rates outside (0, 1] are rejected
/// Why: A rate above 1 pays out more than was deposited
#[test]
fn test_rejects_bad_fill_rate() {
    let mut config = build_test_config();
    config.service.fill_rate = "1.5".to_string();
    assert!(config.validate().is_err());
}

/// What is tested: duplicate chain IDs and duplicate group entries are rejected
/// Why: Lookups by chain ID and (chain, group) must be unambiguous
#[test]
fn test_rejects_duplicates() {
    let mut config = build_test_config();
    let mut duplicate = config.chains[0].clone();
    duplicate.network = "OTHER".to_string();
    config.chains.push(duplicate);
    assert!(config.validate().unwrap_err().to_string().contains("more than once"));

    let mut config = build_test_config();
    let duplicate = config.tokens[0].clone();
    config.tokens.push(duplicate);
    assert!(config.validate().unwrap_err().to_string().contains("Exactly one token"));
}

/// What is tested: distributed nonce allocation requires a store URL
/// Why: Without a shared store the allocator cannot coordinate anything
#[test]
fn test_distributed_nonce_requires_redis() {
    let mut config = build_test_config();
    config.store.distributed_nonce = true;
    assert!(config.validate().is_err());
    config.store.redis_url = Some("redis://127.0.0.1:6379".to_string());
    config.validate().unwrap();
}

// ============================================================================
// VAULT KEY
// ============================================================================

/// What is tested: the signer reads its key from the variable the config names
/// Why: The key lives only in the environment; a wrong variable must fail with its name
#[test]
fn test_vault_signer_reads_configured_env_var() {
    let mut config = build_test_config();
    config.vault.private_key_env = "FILL_RELAYER_TEST_VAULT_KEY".to_string();

    std::env::remove_var("FILL_RELAYER_TEST_VAULT_KEY");
    let err = VaultSigner::from_config(&config.vault).unwrap_err();
    assert!(err.to_string().contains("FILL_RELAYER_TEST_VAULT_KEY"));

    std::env::set_var("FILL_RELAYER_TEST_VAULT_KEY", TEST_VAULT_KEY);
    assert_eq!(config.vault.get_private_key().unwrap(), TEST_VAULT_KEY);
    let signer = VaultSigner::from_config(&config.vault).unwrap();
    assert_eq!(signer.address(), addr(TEST_VAULT_SIGNER_ADDR));
    std::env::remove_var("FILL_RELAYER_TEST_VAULT_KEY");
}

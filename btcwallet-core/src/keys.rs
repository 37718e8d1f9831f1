//! Key generation, import, derivation and signing
//!
//! # Security Model
//!
//! This module is the only place private key material is created or parsed.
//! - Fresh keys come from the operating system RNG
//! - Mnemonics are BIP39 (12 words, empty passphrase) and derive the first BIP44
//!   receive key: `m/44'/coin'/0'/0/0`, coin 0 on mainnet and 1 elsewhere
//! - Errors describe the input format, never the input itself
//!
//! Wallets are single-key legacy P2PKH. Signing covers every input with
//! `SIGHASH_ALL`; partial authorization modes are not supported.

use bdk::keys::bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, ExtendedPrivKey};
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Address, Network, PrivateKey, PublicKey, ScriptBuf, Transaction};
use log::{debug, info};
use once_cell::sync::Lazy;
use rand::TryRngCore;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{
    invalid_input, invalid_input_with_source, signing_failure_with_source, BtcWalletError, WalletResult,
};
use crate::logging::{log_security, LogLevel};
use crate::types::SensitiveString;
use crate::wallet_store::Wallet;

/// Shared signing and verification context
pub static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Prefix of ids given to freshly generated wallets
pub const GENERATED_ID_PREFIX: &str = "WALLET-";

/// Prefix of ids given to imported wallets
pub const IMPORTED_ID_PREFIX: &str = "IMPORTED-";

/// Entropy size for a 12 word mnemonic
const MNEMONIC_ENTROPY_BYTES: usize = 16;

fn wallet_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, uuid[..8].to_uppercase())
}

fn random_bytes<const N: usize>() -> WalletResult<[u8; N]> {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        log_security(LogLevel::Error, "Failed to gather entropy", None);
        BtcWalletError::Io {
            context: format!("Random generation failed: {}", e),
            source: std::io::Error::other(e.to_string()),
        }
    })?;
    Ok(bytes)
}

/// Generate a wallet from a random secp256k1 key
pub fn generate_wallet(network: Network) -> WalletResult<Wallet> {
    let secret = loop {
        let bytes = random_bytes::<32>()?;
        // Out-of-range scalars are astronomically rare; draw again
        if let Ok(secret) = SecretKey::from_slice(&bytes) {
            break secret;
        }
    };

    let wallet = Wallet::from_private_key(wallet_id(GENERATED_ID_PREFIX), PrivateKey::new(secret, network));
    log_security(LogLevel::Info, "Generated new wallet", None);
    info!("Generated wallet {}", wallet.wallet_id());
    Ok(wallet)
}

/// Generate a wallet backed by a fresh 12 word mnemonic
///
/// The mnemonic is handed back once; the wallet itself keeps only the derived key.
pub fn generate_wallet_with_mnemonic(network: Network) -> WalletResult<(Wallet, SensitiveString)> {
    let entropy = random_bytes::<MNEMONIC_ENTROPY_BYTES>()?;
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| invalid_input_with_source("Mnemonic generation failed", e))?;

    let key = derive_bip44_key(&mnemonic.to_seed(""), network)?;
    let wallet = Wallet::from_private_key(wallet_id(GENERATED_ID_PREFIX), key);
    log_security(LogLevel::Info, "Generated new mnemonic wallet", None);
    Ok((wallet, SensitiveString::new(mnemonic.to_string())))
}

/// Import a 32 byte private key encoded as 64 hex characters
pub fn import_from_hex(private_key_hex: &str, network: Network) -> WalletResult<Wallet> {
    let trimmed = private_key_hex.trim();
    if trimmed.is_empty() {
        return Err(invalid_input("Private key cannot be empty"));
    }

    let bytes = hex::decode(trimmed)
        .map_err(|e| invalid_input_with_source("Invalid private key format: not hexadecimal", e))?;
    let secret = SecretKey::from_slice(&bytes)
        .map_err(|e| invalid_input_with_source("Invalid private key format: not a valid secp256k1 scalar", e))?;

    let wallet = Wallet::from_private_key(wallet_id(IMPORTED_ID_PREFIX), PrivateKey::new(secret, network));
    log_security(LogLevel::Info, "Imported wallet from hex private key", None);
    Ok(wallet)
}

/// Import a WIF encoded private key
///
/// A key encoded for another network is accepted and re-targeted at `network`.
pub fn import_from_wif(wif: &str, network: Network) -> WalletResult<Wallet> {
    let trimmed = wif.trim();
    if trimmed.is_empty() {
        return Err(invalid_input("WIF private key cannot be empty"));
    }

    let parsed = PrivateKey::from_wif(trimmed)
        .map_err(|e| invalid_input_with_source("Invalid WIF private key format", e))?;

    if parsed.network != network {
        debug!("Re-encoding WIF key from {} for {}", parsed.network, network);
    }

    let key = PrivateKey {
        compressed: parsed.compressed,
        network,
        inner: parsed.inner,
    };

    let wallet = Wallet::from_private_key(wallet_id(IMPORTED_ID_PREFIX), key);
    log_security(LogLevel::Info, "Imported wallet from WIF", None);
    Ok(wallet)
}

/// Import the first BIP44 receive key of a BIP39 mnemonic (empty passphrase)
pub fn import_from_mnemonic(phrase: &str, network: Network) -> WalletResult<Wallet> {
    let mnemonic = parse_mnemonic(phrase)?;
    let key = derive_bip44_key(&mnemonic.to_seed(""), network)?;
    let wallet = Wallet::from_private_key(wallet_id(IMPORTED_ID_PREFIX), key);
    log_security(LogLevel::Info, "Imported wallet from mnemonic", None);
    Ok(wallet)
}

/// Import whatever format `input` is in: hex, then WIF, then mnemonic
pub fn import_auto(input: &str, network: Network) -> WalletResult<Wallet> {
    let trimmed = input.trim();
    if is_valid_hex_private_key(trimmed) {
        import_from_hex(trimmed, network)
    } else if is_valid_wif(trimmed) {
        import_from_wif(trimmed, network)
    } else if trimmed.split_whitespace().count() > 1 {
        import_from_mnemonic(trimmed, network)
    } else {
        Err(invalid_input(
            "Unrecognized private key format: expected hex, WIF or a mnemonic seed phrase",
        ))
    }
}

fn parse_mnemonic(phrase: &str) -> WalletResult<Mnemonic> {
    let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if normalized.is_empty() {
        return Err(invalid_input("Mnemonic seed phrase cannot be empty"));
    }
    Mnemonic::parse_normalized(&normalized)
        .map_err(|e| invalid_input_with_source(format!("Invalid mnemonic seed phrase: {}", e), e))
}

pub fn is_valid_hex_private_key(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.len() == 64
        && hex::decode(trimmed)
            .ok()
            .map(|bytes| SecretKey::from_slice(&bytes).is_ok())
            .unwrap_or(false)
}

pub fn is_valid_wif(input: &str) -> bool {
    PrivateKey::from_wif(input.trim()).is_ok()
}

pub fn is_valid_mnemonic(input: &str) -> bool {
    parse_mnemonic(input).is_ok()
}

/// BIP44 coin type: 0 on mainnet, 1 on every test network
pub fn coin_type(network: Network) -> u32 {
    match network {
        Network::Bitcoin => 0,
        _ => 1,
    }
}

/// Derive `m/44'/coin'/0'/0/0` from a BIP39 seed
pub fn derive_bip44_key(seed: &[u8], network: Network) -> WalletResult<PrivateKey> {
    let master = ExtendedPrivKey::new_master(network, seed)
        .map_err(|e| invalid_input_with_source("Master key derivation from seed failed", e))?;

    let path = DerivationPath::from_str(&format!("m/44'/{}'/0'/0/0", coin_type(network)))
        .map_err(|e| invalid_input_with_source("Invalid derivation path", e))?;

    let child = master
        .derive_priv(&SECP, &path)
        .map_err(|e| invalid_input_with_source("Child key derivation failed", e))?;

    Ok(PrivateKey::new(child.private_key, network))
}

/// Legacy P2PKH address of a public key
pub fn address_of(public_key: &PublicKey, network: Network) -> Address {
    Address::p2pkh(public_key, network)
}

/// Sign every input as a P2PKH spend of `key`'s own address with `SIGHASH_ALL`
///
/// The resulting scriptSig is `<DER signature || 0x01> <public key>`.
pub fn sign_p2pkh_inputs(tx: &mut Transaction, key: &PrivateKey) -> WalletResult<()> {
    let public_key = key.public_key(&SECP);
    let script_pubkey = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());

    let mut script_sigs = Vec::with_capacity(tx.input.len());
    {
        let cache = SighashCache::new(&*tx);
        for index in 0..tx.input.len() {
            let sighash = cache
                .legacy_signature_hash(index, &script_pubkey, EcdsaSighashType::All.to_u32())
                .map_err(|e| signing_failure_with_source(format!("Sighash for input {} failed", index), e))?;

            let message = Message::from_slice(sighash.as_byte_array())
                .map_err(|e| signing_failure_with_source("Invalid sighash digest", e))?;
            let signature = SECP.sign_ecdsa(&message, &key.inner);

            let mut sig_bytes = signature.serialize_der().to_vec();
            sig_bytes.push(EcdsaSighashType::All as u8);
            let sig_push = PushBytesBuf::try_from(sig_bytes)
                .map_err(|e| signing_failure_with_source("Signature does not fit a script push", e))?;

            script_sigs.push(Builder::new().push_slice(sig_push).push_key(&public_key).into_script());
        }
    }

    for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
        input.script_sig = script_sig;
    }

    debug!("Signed {} inputs", tx.input.len());
    Ok(())
}

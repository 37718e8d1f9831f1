//! In-memory wallet store
//!
//! The store is an explicitly owned instance. Services receive it as an
//! `Arc<WalletStore>` and there is no process-wide singleton. Nothing is
//! persisted beyond the lifetime of the process.

use bitcoin::{Address, Network, PrivateKey, PublicKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::bitcoin_utils;
use crate::error::WalletResult;
use crate::keys::{self, SECP};
use crate::logging::{log_core, log_params, LogLevel, SafeLog};
use crate::types::SensitiveString;

/// A single-key P2PKH wallet
#[derive(Clone)]
pub struct Wallet {
    wallet_id: String,
    private_key: PrivateKey,
    public_key: PublicKey,
    address: Address,
    created_at: DateTime<Utc>,
}

impl Wallet {
    /// Build a wallet around an existing key; the address follows the key's network
    pub fn from_private_key(wallet_id: impl Into<String>, private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key(&SECP);
        let address = keys::address_of(&public_key, private_key.network);
        Self {
            wallet_id: wallet_id.into(),
            private_key,
            public_key,
            address,
            created_at: Utc::now(),
        }
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn network(&self) -> Network {
        self.private_key.network
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Signing handle for the key collaborator
    pub(crate) fn signing_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// WIF export of the private key
    pub fn private_key_wif(&self) -> SensitiveString {
        SensitiveString::new(self.private_key.to_wif())
    }

    /// Public view of the wallet, safe to serialize
    pub fn summary(&self) -> WalletSummary {
        WalletSummary {
            wallet_id: self.wallet_id.clone(),
            address: self.address.to_string(),
            public_key: self.public_key.to_string(),
            network: self.network().to_string(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("wallet_id", &self.wallet_id)
            .field("address", &self.address.to_string())
            .field("network", &self.network())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Serializable wallet view without key material
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletSummary {
    pub wallet_id: String,
    pub address: String,
    pub public_key: String,
    pub network: String,
    pub created_at: DateTime<Utc>,
}

/// Wallets of one network, keyed by id
#[derive(Debug)]
pub struct WalletStore {
    network: Network,
    wallets: RwLock<BTreeMap<String, Arc<Wallet>>>,
}

impl WalletStore {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            wallets: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Store a wallet, replacing any wallet with the same id
    pub fn insert(&self, wallet: Wallet) -> Arc<Wallet> {
        let wallet = Arc::new(wallet);
        // A poisoned lock still holds a consistent map; recover it
        let mut wallets = self.wallets.write().unwrap_or_else(|e| e.into_inner());
        wallets.insert(wallet.wallet_id().to_string(), Arc::clone(&wallet));
        wallet
    }

    pub fn get(&self, wallet_id: &str) -> Option<Arc<Wallet>> {
        let wallets = self.wallets.read().unwrap_or_else(|e| e.into_inner());
        wallets.get(wallet_id).cloned()
    }

    pub fn contains(&self, wallet_id: &str) -> bool {
        self.get(wallet_id).is_some()
    }

    /// Ids of every stored wallet, sorted
    pub fn wallet_ids(&self) -> Vec<String> {
        let wallets = self.wallets.read().unwrap_or_else(|e| e.into_inner());
        wallets.keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<Wallet>> {
        let wallets = self.wallets.read().unwrap_or_else(|e| e.into_inner());
        wallets.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.wallets.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Parse an address and require it to belong to this store's network
    pub fn parse_address(&self, address: &str) -> WalletResult<Address> {
        bitcoin_utils::parse_address(address, self.network)
    }

    pub fn is_valid_address(&self, address: &str) -> bool {
        self.parse_address(address).is_ok()
    }
}

/// Generate or import wallets and register them in the store
#[derive(Debug, Clone)]
pub struct WalletService {
    store: Arc<WalletStore>,
}

impl WalletService {
    pub fn new(store: Arc<WalletStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<WalletStore> {
        &self.store
    }

    fn register(&self, wallet: Wallet) -> Arc<Wallet> {
        log_core(
            LogLevel::Info,
            "Registered wallet",
            Some(log_params(vec![
                ("wallet_id", wallet.wallet_id().to_string()),
                ("address", wallet.address().safe_log_format()),
            ])),
        );
        self.store.insert(wallet)
    }

    pub fn generate_wallet(&self) -> WalletResult<Arc<Wallet>> {
        let wallet = keys::generate_wallet(self.store.network())?;
        Ok(self.register(wallet))
    }

    /// Generate a mnemonic-backed wallet; the mnemonic is returned once and not stored
    pub fn generate_wallet_with_mnemonic(&self) -> WalletResult<(Arc<Wallet>, SensitiveString)> {
        let (wallet, mnemonic) = keys::generate_wallet_with_mnemonic(self.store.network())?;
        Ok((self.register(wallet), mnemonic))
    }

    pub fn import_from_hex(&self, private_key_hex: &str) -> WalletResult<Arc<Wallet>> {
        let wallet = keys::import_from_hex(private_key_hex, self.store.network())?;
        Ok(self.register(wallet))
    }

    pub fn import_from_wif(&self, wif: &str) -> WalletResult<Arc<Wallet>> {
        let wallet = keys::import_from_wif(wif, self.store.network())?;
        Ok(self.register(wallet))
    }

    pub fn import_from_mnemonic(&self, phrase: &str) -> WalletResult<Arc<Wallet>> {
        let wallet = keys::import_from_mnemonic(phrase, self.store.network())?;
        Ok(self.register(wallet))
    }

    /// Import a key in any supported format
    pub fn import_wallet(&self, input: &str) -> WalletResult<Arc<Wallet>> {
        let wallet = keys::import_auto(input, self.store.network())?;
        Ok(self.register(wallet))
    }

    pub fn get_wallet(&self, wallet_id: &str) -> Option<Arc<Wallet>> {
        self.store.get(wallet_id)
    }

    pub fn list_wallets(&self) -> Vec<WalletSummary> {
        self.store.all().iter().map(|w| w.summary()).collect()
    }

    pub fn validate_address(&self, address: &str) -> bool {
        self.store.is_valid_address(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let wallet = keys::import_from_hex(&"11".repeat(32), Network::Testnet).unwrap();
        let rendered = format!("{:?}", wallet);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(&wallet.private_key_wif().expose_secret().to_string()));
    }

    #[test]
    fn test_store_roundtrip() {
        let store = Arc::new(WalletStore::new(Network::Testnet));
        let service = WalletService::new(Arc::clone(&store));
        let wallet = service.generate_wallet().unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(wallet.wallet_id()).unwrap().address(), wallet.address());
        assert_eq!(store.wallet_ids(), vec![wallet.wallet_id().to_string()]);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_address_network_check() {
        let store = WalletStore::new(Network::Bitcoin);
        assert!(store.is_valid_address("1BoatSLRHtKNngkdXEeobR76b53LETtpyT"));
        assert!(!store.is_valid_address("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn"));
        assert!(!store.is_valid_address("not-an-address"));
    }
}

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::{ecdsa::Signature, Message};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use std::sync::Arc;

use btcwallet_core::keys::{self, GENERATED_ID_PREFIX, IMPORTED_ID_PREFIX, SECP};
use btcwallet_core::{ErrorCategory, WalletService, WalletStore};

mod test_utils;
use test_utils::{init_test_environment, txid};

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

#[test]
fn test_mnemonic_wallet_can_be_restored() {
    init_test_environment();

    let (wallet, mnemonic) = keys::generate_wallet_with_mnemonic(Network::Testnet).unwrap();
    assert_eq!(mnemonic.expose_secret().split_whitespace().count(), 12);
    assert!(keys::is_valid_mnemonic(mnemonic.expose_secret()));

    let restored = keys::import_from_mnemonic(mnemonic.expose_secret(), Network::Testnet).unwrap();
    assert_eq!(restored.address(), wallet.address());
    assert!(restored.wallet_id().starts_with(IMPORTED_ID_PREFIX));
    assert_ne!(restored.wallet_id(), wallet.wallet_id());
}

#[test]
fn test_mnemonic_derivation_depends_on_network() {
    init_test_environment();

    let mainnet = keys::import_from_mnemonic(ABANDON, Network::Bitcoin).unwrap();
    let testnet = keys::import_from_mnemonic(ABANDON, Network::Testnet).unwrap();
    assert_eq!(mainnet.address().to_string(), "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
    // Different coin type, different key
    assert_ne!(mainnet.public_key(), testnet.public_key());
}

#[test]
fn test_wif_round_trip() {
    init_test_environment();

    let wallet = keys::generate_wallet(Network::Regtest).unwrap();
    let wif = wallet.private_key_wif();
    assert!(keys::is_valid_wif(wif.expose_secret()));

    let imported = keys::import_from_wif(wif.expose_secret(), Network::Regtest).unwrap();
    assert_eq!(imported.address(), wallet.address());
    assert_eq!(imported.public_key(), wallet.public_key());
}

#[test]
fn test_wif_is_retargeted_to_store_network() {
    init_test_environment();

    let mainnet = keys::import_from_hex(&"33".repeat(32), Network::Bitcoin).unwrap();
    let wif = mainnet.private_key_wif();

    let testnet = keys::import_from_wif(wif.expose_secret(), Network::Testnet).unwrap();
    assert_eq!(testnet.network(), Network::Testnet);
    assert_eq!(testnet.public_key(), mainnet.public_key());
    assert_ne!(testnet.address(), mainnet.address());
}

#[test]
fn test_hex_import_rejects_bad_input() {
    init_test_environment();

    let zero = "00".repeat(32);
    let above_order = "ff".repeat(32);
    for input in ["", "xyz", zero.as_str(), above_order.as_str()] {
        let err = keys::import_from_hex(input, Network::Bitcoin).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidInput);
        // The rejected input never appears in the message
        if !input.is_empty() {
            assert!(!err.user_message().contains(input));
        }
    }
}

#[test]
fn test_auto_import_detects_format() {
    init_test_environment();

    let hex_wallet = keys::import_auto(&"44".repeat(32), Network::Bitcoin).unwrap();
    let wif = hex_wallet.private_key_wif();
    let wif_wallet = keys::import_auto(wif.expose_secret(), Network::Bitcoin).unwrap();
    assert_eq!(hex_wallet.address(), wif_wallet.address());

    let mnemonic_wallet = keys::import_auto(&format!(" {} ", ABANDON), Network::Bitcoin).unwrap();
    assert_eq!(mnemonic_wallet.address().to_string(), "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");

    let err = keys::import_auto("abandon abandon nonsense", Network::Bitcoin).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidInput);
    assert!(err.user_message().contains("seed phrase"));
}

#[test]
fn test_wallet_service_registers_wallets() {
    init_test_environment();

    let store = Arc::new(WalletStore::new(Network::Testnet));
    let service = WalletService::new(Arc::clone(&store));

    let generated = service.generate_wallet().unwrap();
    let (with_mnemonic, _) = service.generate_wallet_with_mnemonic().unwrap();
    let imported = service.import_from_hex(&"55".repeat(32)).unwrap();

    assert!(generated.wallet_id().starts_with(GENERATED_ID_PREFIX));
    assert!(with_mnemonic.wallet_id().starts_with(GENERATED_ID_PREFIX));
    assert!(imported.wallet_id().starts_with(IMPORTED_ID_PREFIX));

    assert_eq!(store.len(), 3);
    let summaries = service.list_wallets();
    assert_eq!(summaries.len(), 3);
    assert!(summaries.iter().all(|s| s.network == Network::Testnet.to_string()));

    let found = service.get_wallet(imported.wallet_id()).unwrap();
    assert_eq!(found.address(), imported.address());
    assert!(service.validate_address(&generated.address().to_string()));
}

#[test]
fn test_signatures_verify_against_sighash() {
    init_test_environment();

    let wallet = keys::import_from_hex(&"66".repeat(32), Network::Regtest).unwrap();
    let key = bitcoin::PrivateKey::from_wif(wallet.private_key_wif().expose_secret()).unwrap();

    let mut tx = Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input: (0..2)
            .map(|vout| TxIn {
                previous_output: OutPoint::new(txid(9), vout),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: 10_000,
            script_pubkey: wallet.address().script_pubkey(),
        }],
    };

    keys::sign_p2pkh_inputs(&mut tx, &key).unwrap();

    let script_pubkey = wallet.address().script_pubkey();
    let cache = SighashCache::new(&tx);
    for (index, input) in tx.input.iter().enumerate() {
        let pushes: Vec<Vec<u8>> = input
            .script_sig
            .instructions()
            .map(|i| match i.unwrap() {
                Instruction::PushBytes(bytes) => bytes.as_bytes().to_vec(),
                Instruction::Op(op) => panic!("unexpected opcode {:?}", op),
            })
            .collect();
        assert_eq!(pushes.len(), 2);

        let (sighash_byte, der) = pushes[0].split_last().unwrap();
        assert_eq!(*sighash_byte, EcdsaSighashType::All as u8);
        assert_eq!(pushes[1], wallet.public_key().to_bytes());

        let sighash = cache
            .legacy_signature_hash(index, &script_pubkey, EcdsaSighashType::All.to_u32())
            .unwrap();
        let message = Message::from_slice(sighash.as_byte_array()).unwrap();
        let signature = Signature::from_der(der).unwrap();
        SECP.verify_ecdsa(&message, &signature, &wallet.public_key().inner)
            .unwrap();
    }
}

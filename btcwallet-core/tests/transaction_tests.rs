use std::time::Duration;

use btcwallet_core::transaction::empty_transaction;
use btcwallet_core::{ErrorCategory, FeePriority, TransactionStatus, DUST_THRESHOLD};

mod test_utils;
use test_utils::{Harness, HarnessOptions};

#[tokio::test]
async fn test_simulated_payment_with_change() {
    let h = Harness::new();
    let wallet = h.funded_wallet(&[200_000]);
    let recipient = h.recipient();

    let record = h
        .transactions
        .create_transaction(wallet.wallet_id(), &recipient, 100_000, true)
        .await
        .unwrap();

    assert_eq!(record.status(), TransactionStatus::Simulated);
    assert!(record.is_simulation());
    assert_eq!(record.wallet_id(), wallet.wallet_id());
    assert_eq!(record.recipient_address(), recipient);
    assert_eq!(record.amount(), 100_000);

    let placeholder_fee = h.fees.calculate_fee(&empty_transaction(), FeePriority::Medium);
    let tx = record.raw_transaction();
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[0].value, 100_000);
    assert_eq!(tx.output[0].script_pubkey, h.store.parse_address(&recipient).unwrap().script_pubkey());
    assert_eq!(tx.output[1].value, 200_000 - 100_000 - placeholder_fee);
    assert_eq!(tx.output[1].script_pubkey, wallet.address().script_pubkey());

    // The recorded fee is sized from the real transaction, not the placeholder
    assert!(record.fee() > placeholder_fee);
    assert_eq!(record.transaction_id(), tx.txid().to_string());
    assert!(!tx.input[0].script_sig.is_empty());

    // Simulation never reaches the network
    assert_eq!(h.node.broadcast_count(), 0);
}

#[tokio::test]
async fn test_simulation_ignores_network_outage() {
    let h = Harness::new();
    let wallet = h.funded_wallet(&[200_000]);
    let recipient = h.recipient();
    h.monitor.set_available(false);

    let record = h
        .transactions
        .create_transaction(wallet.wallet_id(), &recipient, 50_000, true)
        .await
        .unwrap();
    assert_eq!(record.status(), TransactionStatus::Simulated);
    assert_eq!(h.node.broadcast_count(), 0);
}

#[tokio::test]
async fn test_non_positive_amount_rejected_before_lookup() {
    let h = Harness::new();

    for amount in [0, -100] {
        let err = h
            .transactions
            .create_transaction("WALLET-DOES-NOT-EXIST", "not-an-address", amount, true)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidTransaction);
        assert!(err.context().contains("Amount must be positive"));
    }
    assert_eq!(h.node.scan_count(), 0);
}

#[tokio::test]
async fn test_unknown_wallet_and_bad_recipient() {
    let h = Harness::new();
    let wallet = h.funded_wallet(&[200_000]);

    let err = h
        .transactions
        .create_transaction("WALLET-DOES-NOT-EXIST", &h.recipient(), 1_000, true)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidTransaction);
    assert!(err.context().contains("Wallet not found"));

    let err = h
        .transactions
        .create_transaction(wallet.wallet_id(), "definitely-not-an-address", 1_000, true)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidTransaction);

    // Mainnet address against a regtest store
    let err = h
        .transactions
        .create_transaction(wallet.wallet_id(), "1BoatSLRHtKNngkdXEeobR76b53LETtpyT", 1_000, true)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidTransaction);
    assert_eq!(h.node.scan_count(), 0);
}

#[tokio::test]
async fn test_insufficient_funds() {
    let h = Harness::new();
    let wallet = h.funded_wallet(&[20_000, 30_000]);

    let err = h
        .transactions
        .create_transaction(wallet.wallet_id(), &h.recipient(), 100_000, true)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidTransaction);
    assert!(err.is_insufficient_funds());
}

#[tokio::test]
async fn test_dust_surplus_creates_single_output() {
    let h = Harness::new();
    let placeholder_fee = h.fees.calculate_fee(&empty_transaction(), FeePriority::Medium);
    let wallet = h.funded_wallet(&[100_000 + placeholder_fee + DUST_THRESHOLD]);

    let record = h
        .transactions
        .create_transaction(wallet.wallet_id(), &h.recipient(), 100_000, true)
        .await
        .unwrap();
    assert_eq!(record.raw_transaction().output.len(), 1);
}

#[tokio::test]
async fn test_broadcast_updates_ledger_and_invalidates_cache() {
    let h = Harness::new();
    let wallet = h.funded_wallet(&[200_000]);
    let recipient = h.recipient();

    h.balances.get_wallet_balance(wallet.wallet_id()).await.unwrap();

    let record = h
        .transactions
        .create_transaction(wallet.wallet_id(), &recipient, 100_000, false)
        .await
        .unwrap();

    assert_eq!(record.status(), TransactionStatus::Broadcasted);
    assert!(!record.is_simulation());
    assert_eq!(h.node.broadcast_count(), 1);
    assert_eq!(h.node.broadcasts()[0].txid().to_string(), record.transaction_id());
    assert!(h.balances.cache().get(wallet.wallet_id()).is_none());

    // The spent output is gone and the change is pending
    let balance = h.balances.get_wallet_balance(wallet.wallet_id()).await.unwrap();
    assert_eq!(balance.confirmed(), 0);
    assert_eq!(balance.unconfirmed(), record.raw_transaction().output[1].value);
}

#[tokio::test]
async fn test_broadcast_refused_under_congestion() {
    let h = Harness::with_options(HarnessOptions {
        mempool_size: 12_000,
        ..HarnessOptions::default()
    });
    let wallet = h.funded_wallet(&[500_000]);

    let err = h
        .transactions
        .create_transaction(wallet.wallet_id(), &h.recipient(), 100_000, false)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Network);
    assert!(err.context().to_lowercase().contains("congestion"));
    assert_eq!(h.node.broadcast_count(), 1);
    assert!(h.node.broadcasts().is_empty());
}

#[tokio::test]
async fn test_broadcast_refused_when_unavailable() {
    let h = Harness::new();
    let wallet = h.funded_wallet(&[500_000]);
    h.monitor.set_available(false);

    let err = h
        .transactions
        .create_transaction(wallet.wallet_id(), &h.recipient(), 100_000, false)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Network);
    // The snapshot is still cached; nothing was spent
    assert!(h.balances.cache().get(wallet.wallet_id()).is_some());
}

#[tokio::test]
async fn test_balance_timeout_fails_transaction() {
    let h = Harness::with_options(HarnessOptions {
        node_latency: Some(Duration::from_millis(200)),
        timeout: Duration::from_millis(20),
        ..HarnessOptions::default()
    });
    let wallet = h.funded_wallet(&[500_000]);

    let err = h
        .transactions
        .create_transaction(wallet.wallet_id(), &h.recipient(), 100_000, true)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Network);
}

#[tokio::test]
async fn test_wallet_locks_serialize_spends() {
    let h = Harness::with_options(HarnessOptions {
        wallet_locks: true,
        ..HarnessOptions::default()
    });
    let wallet = h.funded_wallet(&[200_000]);
    let recipient = h.recipient();

    let (first, second) = tokio::join!(
        h.transactions
            .create_transaction(wallet.wallet_id(), &recipient, 100_000, false),
        h.transactions
            .create_transaction(wallet.wallet_id(), &recipient, 100_000, false),
    );

    // The second spend sees only the first one's change, which is too small
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes.into_iter().find_map(|r| r.err()).unwrap();
    assert!(err.is_insufficient_funds());
    assert_eq!(h.node.broadcasts().len(), 1);
}

#[tokio::test]
async fn test_fee_estimate_report_and_placeholders() {
    let h = Harness::with_options(HarnessOptions {
        mempool_size: 12_000,
        ..HarnessOptions::default()
    });

    let report = h.transactions.fee_estimate_report();
    assert_eq!(report.medium, 226 * 14);
    assert_eq!(report.recommended_priority, FeePriority::High);
    assert_eq!(report.network.mempool_size, 12_000);
    assert!(!report.network.healthy);

    assert_eq!(
        h.transactions.get_transaction_status("anything"),
        TransactionStatus::Confirming
    );
    assert!(h.transactions.list_transactions("WALLET-X").is_empty());
    assert_eq!(h.transactions.fee_priority(), FeePriority::Medium);
}

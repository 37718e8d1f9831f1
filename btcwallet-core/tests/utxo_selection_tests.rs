use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

use btcwallet_core::utxo_selection::select_inputs;
use btcwallet_core::{CoinSelector, SelectionResult, Utxo, DUST_THRESHOLD};

mod test_utils;
use test_utils::{init_test_environment, utxo};

fn utxos(values: &[u64]) -> Vec<Utxo> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| utxo(i as u8 + 1, *v))
        .collect()
}

#[test]
fn test_single_input_with_change() {
    init_test_environment();

    let result = select_inputs(&utxos(&[200_000]), 100_000, 5_000);
    match result {
        SelectionResult::Success {
            selected,
            fee_amount,
            change_amount,
        } => {
            assert_eq!(selected.len(), 1);
            assert_eq!(fee_amount, 5_000);
            assert_eq!(change_amount, 95_000);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn test_shortfall_reports_available_and_required() {
    init_test_environment();

    let result = select_inputs(&utxos(&[20_000, 30_000]), 100_000, 1_000);
    assert_eq!(
        result,
        SelectionResult::InsufficientFunds {
            available: 50_000,
            required: 101_000
        }
    );

    let err = result.into_inputs().unwrap_err();
    assert!(err.is_insufficient_funds());
    assert_eq!(err.category(), btcwallet_core::ErrorCategory::InvalidTransaction);
}

#[test]
fn test_selection_follows_snapshot_order() {
    init_test_environment();

    // The large output comes last, so both small ones are taken first
    let set = utxos(&[10_000, 15_000, 500_000]);
    let result = select_inputs(&set, 20_000, 1_000);
    let (selected, change) = result.into_inputs().unwrap();
    assert_eq!(selected, set[..2].to_vec());
    assert_eq!(change, 25_000 - 21_000);

    // Stops as soon as the running total covers the target
    let result = select_inputs(&set, 5_000, 1_000);
    let (selected, _) = result.into_inputs().unwrap();
    assert_eq!(selected, set[..1].to_vec());
}

#[test]
fn test_dust_surplus_goes_to_fee() {
    init_test_environment();

    // Surplus of exactly the threshold is still dust
    let result = select_inputs(&utxos(&[101_000 + DUST_THRESHOLD]), 100_000, 1_000);
    assert!(!result.has_change());
    match result {
        SelectionResult::Success {
            fee_amount,
            change_amount,
            ..
        } => {
            assert_eq!(change_amount, 0);
            assert_eq!(fee_amount, 1_000 + DUST_THRESHOLD);
        }
        other => panic!("expected success, got {:?}", other),
    }

    let result = select_inputs(&utxos(&[101_000 + DUST_THRESHOLD + 1]), 100_000, 1_000);
    assert!(result.has_change());
}

#[test]
fn test_custom_dust_threshold() {
    init_test_environment();

    let selector = CoinSelector::with_dust_threshold(10_000);
    assert_eq!(selector.dust_threshold(), 10_000);

    let result = selector.select_inputs(&utxos(&[110_000]), 100_000, 1_000);
    assert!(!result.has_change());
    assert_eq!(result.selected_total(), 110_000);
}

#[test]
fn test_exact_match_and_empty_set() {
    init_test_environment();

    let result = select_inputs(&utxos(&[50_000, 51_000]), 100_000, 1_000);
    assert!(result.is_success());
    assert!(!result.has_change());
    assert_eq!(result.selected_total(), 101_000);

    let result = select_inputs(&[], 1, 0);
    assert_eq!(
        result,
        SelectionResult::InsufficientFunds {
            available: 0,
            required: 1
        }
    );
}

#[quickcheck]
fn prop_success_covers_amount_and_fee(values: Vec<u32>, amount: u32, fee: u16) -> TestResult {
    if values.is_empty() || values.len() > 50 {
        return TestResult::discard();
    }
    let set: Vec<Utxo> = values
        .iter()
        .enumerate()
        .map(|(i, v)| utxo(i as u8, u64::from(*v)))
        .collect();
    let amount = u64::from(amount);
    let fee = u64::from(fee);
    let available: u64 = set.iter().map(|u| u.value).sum();

    match select_inputs(&set, amount, fee) {
        SelectionResult::Success {
            selected,
            fee_amount,
            change_amount,
        } => {
            let total: u64 = selected.iter().map(|u| u.value).sum();
            let balanced = total == amount + fee_amount + change_amount;
            let change_ok = change_amount == 0 || change_amount > DUST_THRESHOLD;
            let prefix = selected[..] == set[..selected.len()];
            TestResult::from_bool(balanced && change_ok && prefix && fee_amount >= fee)
        }
        SelectionResult::InsufficientFunds {
            available: reported,
            required,
        } => TestResult::from_bool(reported == available && available < required && required == amount + fee),
    }
}

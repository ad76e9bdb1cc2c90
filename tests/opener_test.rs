mod common;

use common::{d, minutes, test_config, Harness, T0};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use whirlpool_rebalancer::engine::MAX_SHRINK_ITERATIONS;
use whirlpool_rebalancer::gateway::Instruction;
use whirlpool_rebalancer::{
    Decimal, FixedFeeEstimator, GatewayError, RebalanceError, Rebalancer,
};

#[tokio::test]
async fn test_cycle_opens_one_position_from_empty_wallet_state() {
    let h = Harness::new().await;

    let report = h.rebalancer.run_cycle(T0).await.unwrap();
    let opened = report.opened.expect("no position opened");
    assert_eq!(report.live, 0);
    assert_eq!(report.active, 0);
    assert_eq!(h.gateway.position_addresses(), vec![opened.clone()]);

    let ledger = h.repo.list_positions().await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].address, opened);
    assert_eq!(ledger[0].remaining_spent.a, d("0.015"));
    assert_eq!(ledger[0].created_at, T0);

    let history = h.repo.list_history(None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_open());
    assert_eq!(history[0].total_spent, ledger[0].remaining_spent);
    assert!(history[0].entered_price_usdc.is_positive());

    assert!(h
        .notifier
        .messages()
        .iter()
        .any(|m| m.starts_with("Opened position")));

    // Already holding a position: the next cycle only monitors it.
    let report = h.rebalancer.run_cycle(minutes(1)).await.unwrap();
    assert!(report.opened.is_none());
    assert_eq!(report.active, 1);
    assert_eq!(h.gateway.position_addresses().len(), 1);
}

#[tokio::test]
async fn test_open_fits_balances_and_keeps_gas_reserve() {
    let h = Harness::new().await;
    let outcome = assert_ok!(h.rebalancer.open_position(T0).await);

    assert!(outcome.opened);
    assert!(outcome.quote.liquidity > 0);
    assert!(h.gateway.balance(&h.sol()) >= h.config.gas_to_save);
    assert!(!h.gateway.balance(&h.usdc()).is_negative());

    let position = h.position(&outcome.position).await;
    assert!(!position.is_out_of_range());
    assert!(position.stake_value() > d("1500"));
}

#[tokio::test]
async fn test_swap_fee_added_to_spend() {
    let h = Harness::new().await;
    // Wallet entirely in USDC forces a swap into SOL.
    h.gateway.set_balance(&h.sol(), d("0.01"));

    let outcome = h.rebalancer.open_position(T0).await.unwrap();
    assert!(outcome.swap_spent.b.is_positive());
    assert!(h
        .gateway
        .submissions()
        .iter()
        .any(|s| s.iter().any(|i| matches!(i, Instruction::Swap { .. }))));

    let entry = h
        .repo
        .find_position(&outcome.position)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.remaining_spent.a, d("0.015"));
    assert_eq!(entry.remaining_spent.b, outcome.swap_spent.b);
}

#[tokio::test]
async fn test_holdings_are_not_deposited() {
    let h = Harness::new().await;
    h.repo
        .increment_token_holdings(&h.config.token_b(), d("900"), T0)
        .await
        .unwrap();

    h.rebalancer.open_position(T0).await.unwrap();
    assert!(h.gateway.balance(&h.usdc()) >= d("900"));
}

#[tokio::test]
async fn test_open_below_minimum_deposit() {
    let h = Harness::new().await;
    h.gateway.set_balance(&h.sol(), d("0.01"));
    h.gateway.set_balance(&h.usdc(), d("2"));

    let result = h.rebalancer.open_position(T0).await;
    let err = assert_err!(result);
    assert!(matches!(err, RebalanceError::InsufficientFunds(_)));
    assert!(h.gateway.submissions().is_empty());
    assert!(h.repo.list_positions().await.unwrap().is_empty());

    // A failed open does not fail the cycle.
    let report = h.rebalancer.run_cycle(T0).await.unwrap();
    assert!(report.opened.is_none());
}

#[tokio::test]
async fn test_increase_retries_failed_submission() {
    let h = Harness::new().await;
    let address = h.tracked_position("100", T0).await;
    let before = h.gateway.position_liquidity(&address).unwrap();

    // Above the range only USDC is taken, and with no SOL spendable the
    // deposit needs no swap: the increase is the only submission.
    h.gateway.set_tick(h.centered().upper + 200);
    h.gateway.set_balance(&h.sol(), d("0.01"));
    let position = h.position(&address).await;

    h.gateway.fail_next_submits(2);
    let outcome = h
        .rebalancer
        .increase_position(&position, minutes(1))
        .await
        .unwrap();
    assert!(!outcome.opened);
    assert_eq!(outcome.position, address);
    assert!(h.gateway.position_liquidity(&address).unwrap() > before);
    assert_eq!(h.gateway.submissions().len(), 1);
}

#[tokio::test]
async fn test_unconfirmed_increase_is_not_resubmitted() {
    let h = Harness::new().await;
    let address = h.tracked_position("100", T0).await;
    let before = h.gateway.position_liquidity(&address).unwrap();
    let ledger_before = h.repo.find_position(&address).await.unwrap().unwrap();

    h.gateway.set_tick(h.centered().upper + 200);
    h.gateway.set_balance(&h.sol(), d("0.01"));
    let position = h.position(&address).await;

    h.gateway.fail_next_confirms(1);
    let err = assert_err!(h.rebalancer.increase_position(&position, minutes(1)).await);
    assert!(matches!(
        err,
        RebalanceError::Gateway(GatewayError::Unconfirmed(_))
    ));

    // The transaction landed once and was not sent again.
    let submitted = h.gateway.submissions();
    assert_eq!(submitted.len(), 1);
    let added = match submitted[0].as_slice() {
        [Instruction::IncreaseLiquidity { quote, .. }] => quote.liquidity,
        other => panic!("unexpected submission {other:?}"),
    };
    assert_eq!(h.gateway.position_liquidity(&address).unwrap(), before + added);

    let ledger_after = h.repo.find_position(&address).await.unwrap().unwrap();
    assert_eq!(ledger_after.remaining_spent, ledger_before.remaining_spent);
}

#[tokio::test]
async fn test_shrink_loop_fits_overshooting_quote() {
    let h = Harness::new().await;
    // The sizing quote is honest; the first candidate asks for 20% more SOL.
    h.gateway.skew_increase_quotes_a([Decimal::one(), d("1.2")]);

    let outcome = assert_ok!(h.rebalancer.open_position(T0).await);

    let quotes = h.gateway.increase_quote_count();
    assert!(quotes >= 3, "shrink loop never re-quoted: {quotes}");
    assert!(quotes <= 1 + MAX_SHRINK_ITERATIONS, "too many quotes: {quotes}");

    // Balances before the deposit were what is left plus what went in.
    let available_a = h.gateway.balance(&h.sol()) + outcome.quote.est.a - h.config.gas_to_save;
    let available_b = h.gateway.balance(&h.usdc()) + outcome.quote.est.b;
    assert!(outcome.quote.max.a <= available_a);
    assert!(outcome.quote.max.b <= available_b);
}

#[tokio::test]
async fn test_shrink_loop_gives_up_without_opening() {
    let h = Harness::new().await;
    // Every re-quote overshoots further than the last shrink corrected.
    let mut factor = Decimal::one();
    let mut skews = vec![Decimal::one()];
    for _ in 0..MAX_SHRINK_ITERATIONS {
        factor = factor * d("1.2");
        skews.push(factor);
    }
    h.gateway.skew_increase_quotes_a(skews);

    let err = assert_err!(h.rebalancer.open_position(T0).await);
    assert!(matches!(
        err,
        RebalanceError::QuoteDidNotConverge(n) if n == MAX_SHRINK_ITERATIONS
    ));
    assert_eq!(h.gateway.increase_quote_count(), 1 + MAX_SHRINK_ITERATIONS);
    assert!(h.gateway.position_addresses().is_empty());
    assert!(!h.gateway.submissions().iter().flatten().any(|i| matches!(
        i,
        Instruction::OpenPositionWithMetadata { .. }
    )));
    assert!(h.repo.list_positions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_production_prepends_priority_fee() {
    let mut h = Harness::with_config(test_config(&[("IS_PRODUCTION", "true")])).await;
    h.rebalancer = Rebalancer::new(
        Arc::new(h.gateway.clone()),
        h.repo.clone(),
        h.notifier.clone(),
        h.config.clone(),
    )
    .with_fee_estimator(Arc::new(FixedFeeEstimator(5_000)));

    h.rebalancer.open_position(T0).await.unwrap();
    for submission in h.gateway.submissions() {
        assert!(matches!(
            submission.first(),
            Some(Instruction::SetComputeUnitPrice {
                micro_lamports: 5_000
            })
        ));
    }
}

#[tokio::test]
async fn test_devnet_skips_priority_fee() {
    let mut h = Harness::new().await;
    h.rebalancer = Rebalancer::new(
        Arc::new(h.gateway.clone()),
        h.repo.clone(),
        h.notifier.clone(),
        h.config.clone(),
    )
    .with_fee_estimator(Arc::new(FixedFeeEstimator(5_000)));

    h.rebalancer.open_position(T0).await.unwrap();
    assert!(h.gateway.submissions().iter().all(|s| !s
        .iter()
        .any(|i| matches!(i, Instruction::SetComputeUnitPrice { .. }))));
}

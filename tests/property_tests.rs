//! Property-based tests for pricing, idempotency keys and request fingerprints.

use std::sync::Arc;

use powerpet_api::{
    models::{money, Identity},
    services::{
        catalog::StaticCatalog,
        checkout::{derive_idempotency_key, request_fingerprint},
        pricing::{merge_lines, LineRequest, PricingResolver},
    },
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Prices with up to four decimals so rounding is exercised.
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..5_000_000).prop_map(|ten_thousandths| Decimal::new(ten_thousandths, 4))
}

fn catalog_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(price_strategy(), 1..8)
}

fn lines_strategy(products: usize) -> impl Strategy<Value = Vec<LineRequest>> {
    prop::collection::vec(
        (1..=products as i32, 1i32..50).prop_map(|(product_id, quantity)| LineRequest {
            product_id,
            quantity,
        }),
        1..12,
    )
}

fn resolver(prices: &[Decimal]) -> PricingResolver {
    let catalog = prices
        .iter()
        .enumerate()
        .fold(StaticCatalog::new(), |catalog, (i, price)| {
            catalog.with_product(i as i32 + 1, "item", *price)
        });
    PricingResolver::new(Arc::new(catalog))
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn catalog_and_lines() -> impl Strategy<Value = (Vec<Decimal>, Vec<LineRequest>)> {
    catalog_strategy().prop_flat_map(|prices| {
        let n = prices.len();
        (Just(prices), lines_strategy(n))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn total_is_the_sum_of_stored_line_amounts((prices, lines) in catalog_and_lines()) {
        let priced = block_on(resolver(&prices).resolve(&lines)).unwrap();

        let from_items: i64 = priced
            .lines
            .iter()
            .map(|l| l.unit_price_minor().unwrap() * i64::from(l.quantity))
            .sum();
        prop_assert_eq!(priced.total_minor, from_items);
        prop_assert_eq!(money::from_minor_units(priced.total_minor), priced.total);
        prop_assert!(priced.lines.iter().all(|l| l.unit_price.scale() <= 2));
    }

    #[test]
    fn line_order_does_not_change_the_total((prices, lines) in catalog_and_lines()) {
        let mut reversed = lines.clone();
        reversed.reverse();

        let forward = block_on(resolver(&prices).resolve(&lines)).unwrap();
        let backward = block_on(resolver(&prices).resolve(&reversed)).unwrap();
        prop_assert_eq!(forward.total_minor, backward.total_minor);
    }

    #[test]
    fn merged_lines_are_unique_and_keep_quantities(lines in lines_strategy(5)) {
        let merged = merge_lines(&lines).unwrap();

        let mut ids: Vec<i32> = merged.iter().map(|l| l.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), merged.len());

        let before: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
        let after: i64 = merged.iter().map(|l| i64::from(l.quantity)).sum();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn keys_are_stable_under_line_permutation(
        lines in lines_strategy(5),
        user_id in 1i32..10_000,
    ) {
        let identity = Identity::registered(user_id);
        let merged = merge_lines(&lines).unwrap();
        let mut shuffled = merged.clone();
        shuffled.reverse();

        prop_assert_eq!(
            derive_idempotency_key(&identity, "tok", &merged, &[]),
            derive_idempotency_key(&identity, "tok", &shuffled, &[])
        );
        prop_assert_eq!(
            request_fingerprint(Some(&identity), "a@x.com", &merged),
            request_fingerprint(Some(&identity), "a@x.com", &shuffled)
        );
    }
}

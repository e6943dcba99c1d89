mod common;

use assert_matches::assert_matches;
use chrono::{Duration as ChronoDuration, Utc};
use common::TestApp;
use powerpet_api::{errors::ServiceError, events::Event, models::Identity};
use rust_decimal_macros::dec;

#[tokio::test]
async fn adding_the_same_product_twice_merges_into_one_line() {
    let app = TestApp::new().await;
    let cart = &app.state.services.cart;
    let food = app.seed_product("Kibble", dec!(12.50)).await;
    let user = Identity::registered(1);

    cart.add(&user, food.id, 1).await.unwrap();
    cart.add(&user, food.id, 2).await.unwrap();

    let lines = cart.list(&user).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);
    assert_eq!(lines[0].unit_price(), dec!(12.50));
}

#[tokio::test]
async fn guest_and_registered_carts_are_disjoint() {
    let app = TestApp::new().await;
    let cart = &app.state.services.cart;
    let toy = app.seed_product("Ball", dec!(3.00)).await;
    let guest = Identity::guest("session-abc");
    let user = Identity::registered(42);

    cart.add(&guest, toy.id, 1).await.unwrap();
    cart.add(&user, toy.id, 5).await.unwrap();

    assert_eq!(cart.list(&guest).await.unwrap()[0].quantity, 1);
    assert_eq!(cart.list(&user).await.unwrap()[0].quantity, 5);
    assert_eq!(
        cart.list(&guest).await.unwrap()[0].identity(),
        Some(guest.clone())
    );
}

#[tokio::test]
async fn list_keeps_insertion_order() {
    let app = TestApp::new().await;
    let cart = &app.state.services.cart;
    let a = app.seed_product("A", dec!(1.00)).await;
    let b = app.seed_product("B", dec!(2.00)).await;
    let user = Identity::registered(7);

    cart.add(&user, b.id, 1).await.unwrap();
    cart.add(&user, a.id, 1).await.unwrap();
    cart.add(&user, b.id, 1).await.unwrap();

    let ids: Vec<i32> = cart
        .list(&user)
        .await
        .unwrap()
        .iter()
        .map(|l| l.product_id)
        .collect();
    assert_eq!(ids, vec![b.id, a.id]);
}

#[tokio::test]
async fn non_positive_quantities_are_rejected() {
    let app = TestApp::new().await;
    let cart = &app.state.services.cart;
    let p = app.seed_product("Leash", dec!(9.99)).await;
    let user = Identity::registered(1);

    assert_matches!(
        cart.add(&user, p.id, 0).await,
        Err(ServiceError::InvalidQuantity(0))
    );
    cart.add(&user, p.id, 1).await.unwrap();
    assert_matches!(
        cart.set_quantity(&user, p.id, -1).await,
        Err(ServiceError::InvalidQuantity(-1))
    );
    assert_eq!(cart.list(&user).await.unwrap()[0].quantity, 1);
}

#[tokio::test]
async fn unknown_product_cannot_be_added() {
    let app = TestApp::new().await;
    let user = Identity::registered(1);
    assert_matches!(
        app.state.services.cart.add(&user, 999, 1).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn set_quantity_and_remove_require_an_existing_line() {
    let app = TestApp::new().await;
    let cart = &app.state.services.cart;
    let p = app.seed_product("Bowl", dec!(4.00)).await;
    let user = Identity::registered(3);

    assert_matches!(
        cart.set_quantity(&user, p.id, 2).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(cart.remove(&user, p.id).await, Err(ServiceError::NotFound(_)));

    cart.add(&user, p.id, 1).await.unwrap();
    let line = cart.set_quantity(&user, p.id, 4).await.unwrap();
    assert_eq!(line.quantity, 4);

    cart.remove(&user, p.id).await.unwrap();
    assert!(cart.list(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_removes_only_that_identitys_lines() {
    let app = TestApp::new().await;
    let cart = &app.state.services.cart;
    let a = app.seed_product("A", dec!(1.00)).await;
    let b = app.seed_product("B", dec!(2.00)).await;
    let user = Identity::registered(1);
    let other = Identity::registered(2);

    cart.add(&user, a.id, 1).await.unwrap();
    cart.add(&user, b.id, 1).await.unwrap();
    cart.add(&other, a.id, 1).await.unwrap();

    assert_eq!(cart.clear(&user).await.unwrap(), 2);
    assert!(cart.list(&user).await.unwrap().is_empty());
    assert_eq!(cart.list(&other).await.unwrap().len(), 1);

    let events = app.drain_events().await;
    assert!(events.iter().any(|e| matches!(
        e,
        Event::CartCleared { lines_removed: 2, owner_key } if owner_key == "user:1"
    )));
}

#[tokio::test]
async fn concurrent_adds_for_one_identity_sum_up() {
    let app = TestApp::new().await;
    let p = app.seed_product("Treats", dec!(2.25)).await;
    let user = Identity::registered(11);
    let product_id = p.id;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cart = app.state.services.cart.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move { cart.add(&user, product_id, 1).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let lines = app.state.services.cart.list(&user).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 8);
}

#[tokio::test]
async fn purge_stale_deletes_untouched_lines() {
    let app = TestApp::new().await;
    let cart = &app.state.services.cart;
    let p = app.seed_product("Collar", dec!(15.00)).await;
    cart.add(&Identity::guest("old"), p.id, 1).await.unwrap();

    let removed = cart
        .purge_stale(Utc::now() - ChronoDuration::days(30))
        .await
        .unwrap();
    assert_eq!(removed, 0);

    let removed = cart
        .purge_stale(Utc::now() + ChronoDuration::seconds(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(cart.list(&Identity::guest("old")).await.unwrap().is_empty());
}

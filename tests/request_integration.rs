// SPDX-License-Identifier: Apache-2.0

use requester::engine::config::ENV_MAXDEPTH;
use requester::engine::drivers::MemoryDriver;
use requester::engine::{
    Context, Driver, DriverExt, EngineError, RouteOptions, RouterConfig, TransactionState,
};
use requester::federation::CompositeDriver;
use requester::query::{field, Create, Crud, Delete, Element, Read, Update, Value};
use requester::Request;
use std::sync::Arc;

struct Fixture {
    inventory: Arc<MemoryDriver>,
    billing: Arc<MemoryDriver>,
    router: Arc<dyn Driver>,
}

fn fixture() -> Fixture {
    let inventory = Arc::new(MemoryDriver::new(
        "inventory",
        vec![
            Value::record([("sku", Value::Int(1)), ("qty", Value::Int(5))]),
            Value::record([("sku", Value::Int(2)), ("qty", Value::Int(0))]),
        ],
    ));
    let billing = Arc::new(MemoryDriver::new(
        "billing",
        vec![
            Value::record([("id", Value::Int(1)), ("amount", Value::Int(20))]),
            Value::record([("id", Value::Int(2)), ("amount", Value::Int(5))]),
        ],
    ));
    let router: Arc<dyn Driver> = Arc::new(CompositeDriver::from_drivers(
        "shop",
        [
            ("inventory", inventory.clone() as Arc<dyn Driver>),
            ("billing", billing.clone() as Arc<dyn Driver>),
        ],
        None,
    ));
    Fixture {
        inventory,
        billing,
        router,
    }
}

#[tokio::test]
async fn test_request_reads_through_router() {
    let fx = fixture();
    let mut request = Request::on(fx.router.clone())
        .and(field("billing.id").eq(1))
        .read(Read::new().select(field("billing.amount")));
    let read = request.operations()[0].clone();

    request.commit(&RouteOptions::default()).await.unwrap();
    assert_eq!(
        request.get(&read),
        vec![Value::record([("amount", Value::Int(20))])]
    );
    // An owned operation is one round-trip; its filter is not routed alone.
    assert_eq!(request.ctx().len(), 1);
}

#[tokio::test]
async fn test_request_mutations_reach_their_driver() {
    let fx = fixture();
    let options = RouteOptions::default();

    Request::on(fx.router.clone())
        .create(Create::new("inventory").value("sku", 3).value("qty", 7))
        .commit(&options)
        .await
        .unwrap();
    assert_eq!(fx.inventory.records().len(), 3);
    assert!(fx
        .inventory
        .records()
        .contains(&Value::record([("sku", Value::Int(3)), ("qty", Value::Int(7))])));

    Request::on(fx.router.clone())
        .and(field("billing.id").eq(2))
        .update(Update::new("billing").value("amount", 0))
        .commit(&options)
        .await
        .unwrap();
    assert_eq!(
        fx.billing.records()[1],
        Value::record([("id", Value::Int(2)), ("amount", Value::Int(0))])
    );

    Request::on(fx.router.clone())
        .and(field("inventory.qty").eq(0))
        .delete(Delete::new())
        .commit(&options)
        .await
        .unwrap();
    let skus: Vec<Value> = fx
        .inventory
        .records()
        .iter()
        .filter_map(|r| r.get_path("sku").cloned())
        .collect();
    assert_eq!(skus, vec![Value::Int(1), Value::Int(3)]);
    assert_eq!(fx.billing.records().len(), 2);
}

#[tokio::test]
async fn test_mixed_filter_routes_parts_then_broadcasts() {
    let fx = fixture();
    let read = Crud::from(Read::new())
        .with_query(field("inventory.sku").eq(1).and(field("billing.id").eq(1)));
    let mut tx = fx.router.open(Context::new(), true, vec![read.clone()]);
    let ctx = tx.commit(&RouteOptions::default()).await.unwrap();

    let left: Element = field("inventory.sku").eq(1).into();
    let right: Element = field("billing.id").eq(1).into();
    assert_eq!(ctx.get(&left).unwrap().len(), 1);
    assert_eq!(ctx.get(&right).unwrap().len(), 1);
    // No single record carries both fields.
    assert!(ctx.get(&read).unwrap().is_empty());
    assert_eq!(tx.state(), TransactionState::Committed);
}

#[tokio::test]
async fn test_failed_route_fails_the_transaction() {
    let fx = fixture();
    let read = Crud::read_of(field("ledger.total").gt(0));
    let mut tx = fx.router.open(Context::new(), false, vec![]);
    tx.add(read).unwrap();
    assert_eq!(tx.state(), TransactionState::Open);

    let err = tx.commit(&RouteOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::DriverNotFound { .. }));
    assert_eq!(tx.state(), TransactionState::Failed);
    assert_eq!(tx.failure(), Some(&err));
    assert_eq!(tx.commit(&RouteOptions::default()).await.unwrap_err(), err);
}

#[tokio::test]
async fn test_process_leaves_open_transactions_alone() {
    let fx = fixture();
    let tx = fx
        .router
        .open(Context::new(), false, vec![Crud::read_of(field("billing.id").eq(1))]);
    let tx = fx
        .router
        .process(tx, &RouteOptions::default(), None)
        .await
        .wait()
        .await
        .unwrap();
    assert_eq!(tx.state(), TransactionState::Open);
    assert!(tx.ctx().is_empty());
}

#[tokio::test]
async fn test_router_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("router.json");
    std::fs::write(
        &path,
        r#"{ "name": "edge", "options": { "discovery": true, "asynchronous": false } }"#,
    )
    .unwrap();

    let mut config = RouterConfig::load_file(&path).unwrap();
    config.apply_overrides(|key| (key == ENV_MAXDEPTH).then(|| "4".to_string()));
    assert!(config.options.discovery);
    assert!(!config.options.asynchronous);
    assert_eq!(config.options.maxdepth, 4);

    let fx = fixture();
    let router = CompositeDriver::from_config(
        &config,
        [
            ("inventory", fx.inventory.clone() as Arc<dyn Driver>),
            ("billing", fx.billing.clone() as Arc<dyn Driver>),
        ],
        None,
    );
    assert_eq!(router.name(), "edge");

    let mut request = Request::on(Arc::new(router)).and(field("amount").lt(10));
    let ctx = request.commit(&config.options).await.unwrap();
    let read = Crud::read_of(field("amount").lt(10));
    assert_eq!(
        ctx.get(&read).unwrap(),
        &[Value::record([("id", Value::Int(2)), ("amount", Value::Int(5))])]
    );
}

mod common;

use common::*;
use tracksync::{
    AsyncSessionExt, EntityRef, InMemorySession, KeyComparison, KeyValue, ModelCatalog,
    SessionExt, SyncOptions, TrackingState,
};

fn seed_products(session: &mut InMemorySession, ids: impl IntoIterator<Item = i64>) {
    for product_id in ids {
        session.insert_row(Product {
            product_id,
            product_name: format!("Product {product_id}"),
            ..Default::default()
        });
    }
}

fn seed_customer(session: &mut InMemorySession, customer_id: &str) {
    session.insert_row(Customer {
        customer_id: customer_id.to_string(),
        company_name: format!("Company {customer_id}"),
        ..Default::default()
    });
}

fn product_of(detail: &EntityRef<OrderDetail>) -> Option<EntityRef<Product>> {
    detail.read().unwrap().product.clone()
}

#[test]
fn fifty_items_three_keys_issue_one_lookup() {
    let mut session = northwind_session();
    seed_products(&mut session, 1..=3);

    let order = order(1, None, TrackingState::Added);
    let details = (0..50)
        .map(|i| order_detail(100 + i, Some(i % 3 + 1), TrackingState::Added))
        .collect::<Vec<_>>();
    attach_details(&order, &details);

    session.load_related(&order).unwrap();

    assert_eq!(session.lookup_count(), 1);
    let lookup = &session.lookups()[0];
    assert_eq!(lookup.target_type, "Product");
    assert_eq!(lookup.key_name, "ProductId");
    assert_eq!(lookup.keys.len(), 3);

    for (i, detail) in details.iter().enumerate() {
        let product = product_of(detail).expect("product wired");
        assert_eq!(product.read().unwrap().product_id, i as i64 % 3 + 1);
        let same_key = product_of(&details[i % 3]).unwrap();
        assert!(product.ptr_eq(&same_key));
    }
}

#[test]
fn instance_already_in_graph_is_reused() {
    let mut session = northwind_session();
    seed_products(&mut session, [1]);

    let existing = product(1, TrackingState::Unchanged);
    let order = order(1, None, TrackingState::Added);
    let with_product = order_detail(10, Some(1), TrackingState::Added);
    with_product.write().unwrap().product = Some(existing.clone());
    let without_product = order_detail(11, Some(1), TrackingState::Added);
    attach_details(&order, &[with_product, without_product.clone()]);

    session.load_related(&order).unwrap();

    assert_eq!(session.lookup_count(), 1);
    assert!(product_of(&without_product).unwrap().ptr_eq(&existing));
}

#[test]
fn only_added_items_are_loaded_by_default() {
    let mut session = northwind_session();
    seed_products(&mut session, [1]);

    let order = order(1, None, TrackingState::Unchanged);
    let detail = order_detail(10, Some(1), TrackingState::Unchanged);
    attach_details(&order, &[detail.clone()]);

    session.load_related(&order).unwrap();
    assert_eq!(session.lookup_count(), 0);
    assert!(product_of(&detail).is_none());

    session.load_related_all(&order, true).unwrap();
    assert_eq!(session.lookup_count(), 1);
    assert!(product_of(&detail).is_some());
}

#[test]
fn added_item_under_unchanged_parent_is_loaded() {
    let mut session = northwind_session();
    seed_products(&mut session, [1, 2]);

    let order = order(1, None, TrackingState::Unchanged);
    let unchanged = order_detail(10, Some(1), TrackingState::Unchanged);
    let added = order_detail(11, Some(2), TrackingState::Added);
    attach_details(&order, &[unchanged.clone(), added.clone()]);

    session.load_related(&order).unwrap();

    assert_eq!(session.lookup_count(), 1);
    assert_eq!(session.lookups()[0].keys, vec![KeyValue::Integer(2)]);
    assert!(product_of(&unchanged).is_none());
    assert_eq!(product_of(&added).unwrap().read().unwrap().product_id, 2);
}

#[test]
fn missing_metadata_skips_the_property() {
    let catalog = ModelCatalog::new()
        .primary_key("Order", "OrderId")
        .foreign_key("OrderDetail", "Order", "OrderId");
    let mut session = InMemorySession::new(catalog);
    seed_products(&mut session, [1]);
    session.insert_row(Order {
        order_id: 1,
        ..Default::default()
    });

    // No foreign key name for OrderDetail.Product or Order.Customer.
    let order = order(1, Some("ALFKI"), TrackingState::Added);
    let detail = order_detail(10, Some(1), TrackingState::Added);
    detail.write().unwrap().order_id = 1;
    order.write().unwrap().order_details.push(detail.clone());

    session.load_related(&order).unwrap();

    assert!(product_of(&detail).is_none());
    assert!(order.read().unwrap().customer.is_none());
    // The back reference resolves to the order already in the graph.
    assert_eq!(session.lookup_count(), 1);
    assert_eq!(session.lookups()[0].target_type, "Order");
    assert!(order.ptr_eq(detail.read().unwrap().order.as_ref().unwrap()));
}

#[test]
fn null_foreign_key_is_not_looked_up() {
    let mut session = northwind_session();
    let order = order(1, None, TrackingState::Added);
    attach_details(&order, &[order_detail(10, None, TrackingState::Added)]);

    session.load_related(&order).unwrap();

    assert_eq!(session.lookup_count(), 0);
}

#[test]
fn unmatched_keys_leave_reference_empty() {
    let mut session = northwind_session();
    seed_products(&mut session, [1]);
    let order = order(1, None, TrackingState::Added);
    let detail = order_detail(10, Some(99), TrackingState::Added);
    attach_details(&order, &[detail.clone()]);

    session.load_related(&order).unwrap();

    assert_eq!(session.lookup_count(), 1);
    assert!(product_of(&detail).is_none());
}

#[test]
fn string_keys_match_after_normalization() {
    let mut session = northwind_session();
    seed_customer(&mut session, "ALFKI");

    let lower = order(1, Some("alfki"), TrackingState::Added);
    let full_width = order(2, Some("ＡＬＦＫＩ"), TrackingState::Added);

    session
        .load_related(&vec![lower.clone(), full_width.clone()])
        .unwrap();

    assert_eq!(session.lookup_count(), 1);
    assert_eq!(session.lookups()[0].keys.len(), 1);
    let first = lower.read().unwrap().customer.clone().unwrap();
    let second = full_width.read().unwrap().customer.clone().unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first.read().unwrap().customer_id, "ALFKI");
}

#[test]
fn exact_comparison_does_not_fold_string_keys() {
    let mut session = northwind_session();
    seed_customer(&mut session, "ALFKI");
    let lower = order(1, Some("alfki"), TrackingState::Added);

    let options = SyncOptions::new().key_comparison(KeyComparison::Exact);
    session.load_related_with(&lower, &options).unwrap();

    assert!(lower.read().unwrap().customer.is_none());
}

#[test]
fn lookups_grow_with_depth_not_with_node_count() {
    let mut session = northwind_session();
    seed_customer(&mut session, "ALFKI");
    seed_customer(&mut session, "BONAP");
    seed_products(&mut session, 1..=5);

    let orders = (1..=3)
        .map(|order_id| {
            let customer = if order_id % 2 == 0 { "BONAP" } else { "ALFKI" };
            let order = order(order_id, Some(customer), TrackingState::Added);
            let details = (0..10)
                .map(|i| order_detail(order_id * 100 + i, Some(i % 5 + 1), TrackingState::Added))
                .collect::<Vec<_>>();
            attach_details(&order, &details);
            order
        })
        .collect::<Vec<_>>();

    session.load_related(&orders).unwrap();

    let targets = session
        .lookups()
        .iter()
        .map(|lookup| lookup.target_type.as_str())
        .collect::<Vec<_>>();
    assert_eq!(targets, vec!["Customer", "Product"]);

    let first = orders[0].read().unwrap().customer.clone().unwrap();
    let third = orders[2].read().unwrap().customer.clone().unwrap();
    assert!(first.ptr_eq(&third));
}

#[test]
fn max_batch_keys_splits_lookups() {
    let mut session = northwind_session();
    seed_products(&mut session, 1..=10);

    let order = order(1, None, TrackingState::Added);
    let details = (0..50)
        .map(|i| order_detail(100 + i, Some(i % 10 + 1), TrackingState::Added))
        .collect::<Vec<_>>();
    attach_details(&order, &details);

    let options = SyncOptions::new().max_batch_keys(4);
    session.load_related_with(&order, &options).unwrap();

    let sizes = session
        .lookups()
        .iter()
        .map(|lookup| lookup.keys.len())
        .collect::<Vec<_>>();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert!(details.iter().all(|detail| product_of(detail).is_some()));
}

#[test]
fn cyclic_graph_terminates() {
    let mut session = northwind_session();
    let employee = employee(1, TrackingState::Added);
    let t1 = territory("01581", TrackingState::Added);
    assign_territories(&employee, &[t1.clone()]);
    t1.write().unwrap().employees.push(employee.clone());

    session.load_related_all(&employee, true).unwrap();

    assert_eq!(session.lookup_count(), 0);
}

#[test]
fn wired_references_are_not_reloaded() {
    let mut session = northwind_session();
    seed_products(&mut session, [1]);
    let order = order(1, None, TrackingState::Added);
    let detail = order_detail(10, Some(1), TrackingState::Added);
    detail.write().unwrap().product = Some(product(1, TrackingState::Unchanged));
    attach_details(&order, &[detail]);

    session.load_related_all(&order, true).unwrap();

    assert_eq!(session.lookup_count(), 0);
}

#[tokio::test]
async fn async_load_batches_like_sync() {
    let mut session = northwind_session();
    seed_products(&mut session, 1..=3);
    seed_customer(&mut session, "ALFKI");

    let order = order(1, Some("ALFKI"), TrackingState::Added);
    let details = (0..12)
        .map(|i| order_detail(100 + i, Some(i % 3 + 1), TrackingState::Added))
        .collect::<Vec<_>>();
    attach_details(&order, &details);

    session
        .load_related_async(&order, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(session.lookup_count(), 2);
    assert!(order.read().unwrap().customer.is_some());
    assert!(details.iter().all(|detail| product_of(detail).is_some()));
}

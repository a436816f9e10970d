#![allow(dead_code)]

use tracksync::{
    CorrelationKey, EntityRef, InMemorySession, ModelCatalog, ModifiedProperties, Trackable,
    TrackingState,
};

#[derive(Trackable, Clone, Default)]
pub struct Customer {
    #[tracking(key, name = "CustomerId")]
    pub customer_id: String,
    pub company_name: String,
    pub tracking_state: TrackingState,
    pub modified_properties: ModifiedProperties,
    #[tracking(correlation)]
    pub correlation: Option<CorrelationKey>,
}

#[derive(Trackable, Clone, Default)]
pub struct Product {
    #[tracking(key, name = "ProductId")]
    pub product_id: i64,
    pub product_name: String,
    pub tracking_state: TrackingState,
    pub modified_properties: ModifiedProperties,
}

#[derive(Trackable, Clone, Default)]
pub struct OrderDetail {
    #[tracking(key, name = "OrderDetailId")]
    pub order_detail_id: i64,
    #[tracking(key, name = "OrderId")]
    pub order_id: i64,
    #[tracking(key, name = "ProductId")]
    pub product_id: Option<i64>,
    pub quantity: i32,
    #[tracking(name = "Product")]
    pub product: Option<EntityRef<Product>>,
    #[tracking(name = "Order")]
    pub order: Option<EntityRef<Order>>,
    pub tracking_state: TrackingState,
    pub modified_properties: ModifiedProperties,
    #[tracking(correlation)]
    pub correlation: Option<CorrelationKey>,
}

#[derive(Trackable, Clone, Default)]
pub struct Order {
    #[tracking(key, name = "OrderId")]
    pub order_id: i64,
    #[tracking(key, name = "CustomerId")]
    pub customer_id: Option<String>,
    #[tracking(name = "Customer")]
    pub customer: Option<EntityRef<Customer>>,
    #[tracking(name = "OrderDetails")]
    pub order_details: Vec<EntityRef<OrderDetail>>,
    pub tracking_state: TrackingState,
    pub modified_properties: ModifiedProperties,
    #[tracking(correlation)]
    pub correlation: Option<CorrelationKey>,
}

#[derive(Trackable, Clone, Default)]
pub struct Territory {
    #[tracking(key, name = "TerritoryId")]
    pub territory_id: String,
    pub description: String,
    #[tracking(name = "Employees")]
    pub employees: Vec<EntityRef<Employee>>,
    pub tracking_state: TrackingState,
    pub modified_properties: ModifiedProperties,
}

#[derive(Trackable, Clone, Default)]
pub struct Employee {
    #[tracking(key, name = "EmployeeId")]
    pub employee_id: i64,
    pub last_name: String,
    #[tracking(name = "Territories")]
    pub territories: Vec<EntityRef<Territory>>,
    pub tracking_state: TrackingState,
    pub modified_properties: ModifiedProperties,
}

pub fn northwind_catalog() -> ModelCatalog {
    ModelCatalog::new()
        .primary_key("Customer", "CustomerId")
        .primary_key("Product", "ProductId")
        .primary_key("Order", "OrderId")
        .primary_key("OrderDetail", "OrderDetailId")
        .primary_key("Employee", "EmployeeId")
        .primary_key("Territory", "TerritoryId")
        .many_to_one("Order", "Customer", "CustomerId")
        .one_to_many("Order", "OrderDetails")
        .many_to_one("OrderDetail", "Product", "ProductId")
        .many_to_one("OrderDetail", "Order", "OrderId")
        .many_to_many("Employee", "Territories")
        .many_to_many("Territory", "Employees")
}

pub fn northwind_session() -> InMemorySession {
    InMemorySession::new(northwind_catalog())
}

pub fn customer(customer_id: &str, state: TrackingState) -> EntityRef<Customer> {
    EntityRef::new(Customer {
        customer_id: customer_id.to_string(),
        company_name: format!("Company {customer_id}"),
        tracking_state: state,
        ..Default::default()
    })
}

pub fn product(product_id: i64, state: TrackingState) -> EntityRef<Product> {
    EntityRef::new(Product {
        product_id,
        product_name: format!("Product {product_id}"),
        tracking_state: state,
        ..Default::default()
    })
}

pub fn order(order_id: i64, customer_id: Option<&str>, state: TrackingState) -> EntityRef<Order> {
    EntityRef::new(Order {
        order_id,
        customer_id: customer_id.map(str::to_string),
        tracking_state: state,
        ..Default::default()
    })
}

pub fn order_detail(
    order_detail_id: i64,
    product_id: Option<i64>,
    state: TrackingState,
) -> EntityRef<OrderDetail> {
    EntityRef::new(OrderDetail {
        order_detail_id,
        product_id,
        quantity: 1,
        tracking_state: state,
        ..Default::default()
    })
}

pub fn employee(employee_id: i64, state: TrackingState) -> EntityRef<Employee> {
    EntityRef::new(Employee {
        employee_id,
        last_name: format!("Employee {employee_id}"),
        tracking_state: state,
        ..Default::default()
    })
}

pub fn territory(territory_id: &str, state: TrackingState) -> EntityRef<Territory> {
    EntityRef::new(Territory {
        territory_id: territory_id.to_string(),
        description: format!("Territory {territory_id}"),
        tracking_state: state,
        ..Default::default()
    })
}

/// Appends `details` to the order's collection, pointing each back at the order.
pub fn attach_details(order: &EntityRef<Order>, details: &[EntityRef<OrderDetail>]) {
    let order_id = order.read().unwrap().order_id;
    for detail in details {
        let mut row = detail.write().unwrap();
        row.order_id = order_id;
        row.order = Some(order.clone());
    }
    order
        .write()
        .unwrap()
        .order_details
        .extend(details.iter().cloned());
}

pub fn assign_territories(employee: &EntityRef<Employee>, territories: &[EntityRef<Territory>]) {
    employee
        .write()
        .unwrap()
        .territories
        .extend(territories.iter().cloned());
}

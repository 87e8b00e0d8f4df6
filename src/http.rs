//! HTTP transport for the engine contracts

use axum::{extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Address, Order, OrderStatus};
use crate::services::{CreateOrder, JoinResult, OrderLine, PaymentReceipt, TransitionContext};
use crate::{CommerceEngine, EngineError, ErrorKind};

#[derive(Clone)]
pub struct AppState { pub engine: Arc<CommerceEngine> }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-commerce-engine"})) }))
        .route("/api/v1/orders", post(create_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/transition", post(transition_order))
        .route("/api/v1/orders/:id/pay", post(pay_order))
        .route("/api/v1/flash-sales/:id/purchase", post(purchase_flash_sale))
        .route("/api/v1/group-buys/:id/join", post(join_group_buy))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody { pub kind: ErrorKind, pub message: String }

pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self { Self(e) }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self { Self(EngineError::Validation(e.to_string())) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::InvariantViolated => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InsufficientStock | ErrorKind::QuotaExceeded | ErrorKind::InvalidTransition | ErrorKind::InvalidState
            | ErrorKind::AlreadyJoined | ErrorKind::GroupFull => StatusCode::CONFLICT,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(ErrorBody { kind: self.0.kind(), message: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    #[validate]
    pub items: Vec<OrderItemRequest>,
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: Option<String>,
    pub delivery_address: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
}

async fn create_order(State(s): State<AppState>, Json(r): Json<CreateOrderRequest>) -> ApiResult<(StatusCode, Json<Order>)> {
    r.validate()?;
    let req = CreateOrder {
        user_id: r.user_id,
        items: r.items.into_iter().map(|i| OrderLine { product_id: i.product_id, quantity: i.quantity }).collect(),
        coupon_code: r.coupon_code, delivery_address: r.delivery_address,
    };
    Ok((StatusCode::CREATED, Json(s.engine.create_order(req).await?)))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.engine.get_order(id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    pub target_status: OrderStatus,
    pub actor_id: Uuid,
    #[validate(length(equal = 6))]
    pub verification_code: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub payment_method: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

async fn transition_order(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<TransitionRequest>) -> ApiResult<Json<Order>> {
    r.validate()?;
    let ctx = TransitionContext { actor_id: r.actor_id, verification_code: r.verification_code, payment_method: r.payment_method, note: r.note };
    Ok(Json(s.engine.transition_order(id, r.target_status, ctx).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayRequest {
    #[validate(length(min = 1, max = 32))]
    pub payment_method: String,
}

async fn pay_order(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<PayRequest>) -> ApiResult<Json<PaymentReceipt>> {
    r.validate()?;
    Ok(Json(s.engine.pay_order(id, &r.payment_method).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseRequest {
    pub user_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
}

async fn purchase_flash_sale(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<PurchaseRequest>) -> ApiResult<(StatusCode, Json<Order>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.engine.purchase_flash_sale(id, r.user_id, r.quantity).await?)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct JoinRequest {
    pub user_id: Uuid,
    pub group_id: Option<Uuid>,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
}

async fn join_group_buy(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<JoinRequest>) -> ApiResult<Json<JoinResult>> {
    r.validate()?;
    Ok(Json(s.engine.join_group_buy(id, r.user_id, r.group_id, r.quantity).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Product, Role, User};
    use crate::domain::value_objects::Money;
    use crate::notify::MemorySink;
    use crate::{EngineConfig, SystemClock};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<CommerceEngine>) {
        let engine = Arc::new(CommerceEngine::new(&EngineConfig::default(), Arc::new(MemorySink::new()), Arc::new(SystemClock)));
        (router(AppState { engine: engine.clone() }), engine)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri).header("content-type", "application/json").body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(res: Response) -> serde_json::Value {
        serde_json::from_slice(&to_bytes(res.into_body(), usize::MAX).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_pay_over_http() {
        let (app, engine) = app();
        let product = engine.add_product(Product::create("Widget", Money::from_major(20), 3, 0)).id;
        let user = engine.register_user(User::register("bob", Role::Customer, None)).id;

        let res = app.clone().oneshot(post_json("/api/v1/orders", serde_json::json!({
            "user_id": user, "items": [{"product_id": product, "quantity": 2}]
        }))).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let order = body_json(res).await;
        assert_eq!(order["status"], "pending");
        let total: rust_decimal::Decimal = order["amount"]["total"].as_str().unwrap().parse().unwrap();
        assert_eq!(total, rust_decimal::Decimal::from(40));

        let id = order["id"].as_str().unwrap().to_string();
        let res = app.oneshot(post_json(&format!("/api/v1/orders/{id}/pay"), serde_json::json!({"payment_method": "card"}))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["order"]["payment_status"], "paid");
    }

    #[tokio::test]
    async fn test_errors_carry_kind() {
        let (app, engine) = app();
        let product = engine.add_product(Product::create("Widget", Money::from_major(20), 1, 0)).id;
        let user = engine.register_user(User::register("bob", Role::Customer, None)).id;

        let res = app.clone().oneshot(post_json("/api/v1/orders", serde_json::json!({
            "user_id": user, "items": [{"product_id": product, "quantity": 5}]
        }))).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(res).await["kind"], "insufficient_stock");

        let res = app.clone().oneshot(post_json("/api/v1/orders", serde_json::json!({"user_id": user, "items": []}))).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app.clone().oneshot(post_json("/api/v1/orders", serde_json::json!({
            "user_id": user, "items": [{"product_id": product, "quantity": 0}]
        }))).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["kind"], "validation");

        let res = app.oneshot(Request::get(format!("/api/v1/orders/{}", Uuid::now_v7())).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["kind"], "not_found");
    }
}

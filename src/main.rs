//! OpenSASE Commerce Engine - order and promotions service

use anyhow::Result;
use chrono::{Duration, Utc};
use opensase_commerce_engine::domain::aggregates::{Coupon, FlashSale, GroupBuyingActivity, Product, Role, User};
use opensase_commerce_engine::domain::value_objects::Money;
use opensase_commerce_engine::http::{router, AppState};
use opensase_commerce_engine::notify::{NatsSink, NotificationSink, TracingSink};
use opensase_commerce_engine::{CommerceEngine, EngineConfig, SystemClock};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = EngineConfig::from_env()?;

    let sink: Arc<dyn NotificationSink> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsSink::new(client, config.nats_subject_prefix.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, logging events instead");
                Arc::new(TracingSink)
            }
        },
        None => Arc::new(TracingSink),
    };
    let engine = Arc::new(CommerceEngine::new(&config, sink, Arc::new(SystemClock)));
    if config.seed_demo { seed_demo(&engine)?; }

    let sweeper = engine.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tick.tick().await;
            let report = sweeper.sweep_expired().await;
            if !report.ended_sales.is_empty() || !report.expired_groups.is_empty() {
                tracing::info!(ended_sales = report.ended_sales.len(), expired_groups = report.expired_groups.len(), "promotion sweep");
            }
        }
    });

    let app = router(AppState { engine });
    tracing::info!("🚀 OpenSASE Commerce Engine listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

fn seed_demo(engine: &CommerceEngine) -> Result<()> {
    let now = Utc::now();
    let admin = engine.register_user(User::register("admin", Role::Admin, None));
    let alice = engine.register_user(User::register("alice", Role::Customer, None));
    let bob = engine.register_user(User::register("bob", Role::Customer, Some(alice.id)));
    let phone = engine.add_product(Product::create("Phone", Money::from_major(1000), 50, 5));
    let case = engine.add_product(Product::create("Phone Case", Money::from_major(25), 200, 20));
    engine.add_coupon(Coupon::percentage("WELCOME10", Decimal::from(10), Some(Money::from_major(50)), now, now + Duration::days(30)).with_min_amount(Money::from_major(100)))?;
    let sale = engine.create_flash_sale(FlashSale::schedule(phone.id, Money::from_major(799), 10, 1, now, now + Duration::hours(2))?)?;
    let activity = engine.create_group_activity(GroupBuyingActivity::create(case.id, 3, Money::from_major(25), Money::from_major(15), now, now + Duration::days(7), 100)?)?;
    tracing::info!(
        admin = %admin.id, alice = %alice.id, bob = %bob.id, phone = %phone.id, case = %case.id,
        flash_sale = %sale.id, group_activity = %activity.id, "seeded demo data"
    );
    Ok(())
}

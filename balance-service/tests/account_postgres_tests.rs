use std::sync::Arc;

use balance_service::{
    AccountRepository, BalanceService, BalanceServiceConfig, InMemoryAuditSink, PostgresAccountRepository,
};
use common::error::{Error, StoreError};
use common::model::account::{BalanceOperation, NewAccount};
use dotenv::dotenv;
use tokio::test;
use uuid::Uuid;

// PostgreSQL integration tests for the balance service
// These tests require a running PostgreSQL database
// Run with: cargo test --test account_postgres_tests -- --ignored

async fn create_test_repo() -> Arc<PostgresAccountRepository> {
    dotenv().ok(); // Load .env.test if it exists

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run PostgreSQL tests");

    let repo = PostgresAccountRepository::new(&database_url)
        .await
        .expect("Failed to connect to test database");
    repo.migrate().await.expect("Failed to run migrations");
    Arc::new(repo)
}

fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[test]
#[ignore = "Requires test database"]
async fn test_postgres_get_is_scoped_by_owner() {
    let repo = create_test_repo().await;
    let id = unique_id("acct");

    repo.create_account(NewAccount::new(&id, 10, "Checking", "USD", 1000)).await.unwrap();

    let found = repo.get_account(10, &id).await.unwrap().unwrap();
    assert_eq!(found.balance, 1000);
    assert_eq!(found.version, 0);
    assert!(repo.get_account(11, &id).await.unwrap().is_none());
}

#[test]
#[ignore = "Requires test database"]
async fn test_postgres_compare_and_set_detects_stale_version() {
    let repo = create_test_repo().await;
    let id = unique_id("acct");

    repo.create_account(NewAccount::new(&id, 10, "Checking", "USD", 1000)).await.unwrap();

    let updated = repo.compare_and_set_balance(10, &id, 0, 700).await.unwrap();
    assert_eq!(updated.balance, 700);
    assert_eq!(updated.version, 1);

    let stale = repo.compare_and_set_balance(10, &id, 0, 1).await;
    assert!(matches!(stale, Err(StoreError::Conflict { .. })));
}

#[test]
#[ignore = "Requires test database"]
async fn test_postgres_single_and_batch_modification() {
    let repo = create_test_repo().await;
    let service = BalanceService::new(repo.clone(), Arc::new(InMemoryAuditSink::new()));
    let a1 = unique_id("A1");
    let a2 = unique_id("A2");

    service.create_account(NewAccount::new(&a1, 20, "Main", "USD", 1000)).await.unwrap();
    service.create_account(NewAccount::new(&a2, 21, "Foreign", "USD", 1000)).await.unwrap();

    let single = service.modify_single_account_balance(20, &a1, 500).await.unwrap();
    assert_eq!(single.balance, 500);
    assert_eq!(single.currency, "USD");

    let batch = service
        .modify_multiple_account_balances(20, &[a1.clone(), a2.clone()], BalanceOperation::Subtract, 100)
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, a1);
    assert_eq!(batch[0].balance, 400);

    let err = service
        .modify_multiple_account_balances(20, &[a2.clone()], BalanceOperation::Add, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccountNotFound(_)));
    assert_eq!(repo.get_account(21, &a2).await.unwrap().unwrap().balance, 1000);
}

#[test]
#[ignore = "Requires test database"]
async fn test_postgres_create_rejects_existing_id() {
    let repo = create_test_repo().await;
    let id = unique_id("acct");

    repo.create_account(NewAccount::new(&id, 10, "Checking", "USD", 1000)).await.unwrap();
    let duplicate = repo.create_account(NewAccount::new(&id, 11, "Other", "EUR", 5)).await;

    assert!(matches!(duplicate, Err(StoreError::Duplicate { .. })));
    assert_eq!(repo.get_account(10, &id).await.unwrap().unwrap().balance, 1000);
}

#[test]
#[ignore = "Requires test database"]
async fn test_postgres_service_from_config_drains_audit_queue() {
    dotenv().ok();
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run PostgreSQL tests");
    let config = BalanceServiceConfig::new(database_url, 2, true);

    let (service, forwarder) = BalanceService::with_config(&config).await.unwrap();
    let id = unique_id("cfg");
    service.create_account(NewAccount::new(&id, 30, "Main", "USD", 0)).await.unwrap();
    let updated = service.modify_single_account_balance(30, &id, 25).await.unwrap();
    assert_eq!(updated.balance, 25);

    let forwarder = forwarder.expect("audit logging enabled");
    drop(service);
    forwarder.await.unwrap();
}

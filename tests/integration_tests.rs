// End-to-end flows through the gateway, service and in-memory store

use std::sync::Arc;

use balance_service::{
    BalanceService, BatchModifyBalanceRequest, ChannelAuditSink, InMemoryAccountRepository,
    InMemoryAuditSink, ModifyBalanceRequest, MutationGateway,
};
use common::model::account::{AccountInfoResponse, BalanceOperation, NewAccount};
use common::model::audit::MutationKind;

fn info(id: &str, name: &str, balance: i64, currency: &str) -> AccountInfoResponse {
    AccountInfoResponse {
        id: id.to_string(),
        name: name.to_string(),
        balance,
        currency: currency.to_string(),
    }
}

#[tokio::test]
async fn test_set_then_batch_subtract_scenario() {
    let audit = Arc::new(InMemoryAuditSink::new());
    let (sink, forwarder) = ChannelAuditSink::spawn(16, audit.clone());

    let service = BalanceService::new(Arc::new(InMemoryAccountRepository::new()), Arc::new(sink));
    service
        .create_account(NewAccount::new("A1", 1, "Everyday", "USD", 1000))
        .await
        .unwrap();
    service
        .create_account(NewAccount::new("A2", 99, "Not yours", "USD", 1000))
        .await
        .unwrap();
    let gateway = MutationGateway::new(Arc::new(service));

    let single = gateway
        .modify_single(1, ModifyBalanceRequest { id: "A1".to_string(), balance: 500 })
        .await
        .unwrap();
    assert_eq!(single, info("A1", "Everyday", 500, "USD"));

    let batch = gateway
        .modify_batch(
            1,
            BatchModifyBalanceRequest {
                account_ids: vec!["A1".to_string(), "A2".to_string()],
                operation: BalanceOperation::Subtract,
                amount: 100,
            },
        )
        .await
        .unwrap();
    assert_eq!(batch, vec![info("A1", "Everyday", 400, "USD")]);

    // Dropping the gateway closes the audit queue so the forwarder finishes
    drop(gateway);
    forwarder.await.unwrap();

    let records = audit.records().await;
    let trail: Vec<(MutationKind, i64, i64)> = records
        .iter()
        .map(|r| (r.kind, r.old_balance, r.new_balance))
        .collect();
    assert_eq!(
        trail,
        vec![(MutationKind::Set, 1000, 500), (MutationKind::Subtract, 500, 400)]
    );
}

#[tokio::test]
async fn test_batch_add_then_subtract_round_trips_balance() {
    let service = BalanceService::new(
        Arc::new(InMemoryAccountRepository::new()),
        Arc::new(InMemoryAuditSink::new()),
    );
    for (id, balance) in [("C1", -500), ("C2", 0), ("C3", 250)] {
        service
            .create_account(NewAccount::new(id, 3, id, "EUR", balance))
            .await
            .unwrap();
    }
    let gateway = MutationGateway::new(Arc::new(service));
    let ids = vec!["C3".to_string(), "C1".to_string(), "C2".to_string()];

    let added = gateway
        .modify_batch(
            3,
            BatchModifyBalanceRequest {
                account_ids: ids.clone(),
                operation: BalanceOperation::Add,
                amount: 75,
            },
        )
        .await
        .unwrap();
    let balances: Vec<i64> = added.iter().map(|a| a.balance).collect();
    assert_eq!(balances, vec![325, -425, 75]);

    let restored = gateway
        .modify_batch(
            3,
            BatchModifyBalanceRequest {
                account_ids: ids,
                operation: BalanceOperation::Subtract,
                amount: 75,
            },
        )
        .await
        .unwrap();
    let balances: Vec<i64> = restored.iter().map(|a| a.balance).collect();
    assert_eq!(balances, vec![250, -500, 0]);
    assert!(restored.iter().all(|a| a.currency == "EUR"));
}

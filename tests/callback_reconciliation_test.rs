//! Callback reconciliation: resolution, fallback, retries, dedup and partial
//! failures

mod common;

use common::{amount_at, at, reconciler, seeded_store, FaultyStore};
use driver_commission_relay::database::memory::MemoryStore;
use driver_commission_relay::database::SharedStore;
use driver_commission_relay::services::CallbackPayload;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const SUMMARY: &str = "driver_commissions/drv_abcdef12/commission_summary";
const HISTORY: &str = "commission_payment/drv_abcdef12";

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn payload(fields: &[(&str, &str)]) -> CallbackPayload {
    CallbackPayload::from_pairs(
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        vec![],
    )
}

async fn with_mapping(store: &Arc<MemoryStore>) {
    use driver_commission_relay::database::DocumentStore;
    store
        .put(
            "bill_mappings/rp123",
            &json!({"driverId": "drv_abcdef12", "amount": 25.5, "reference": "REF"}),
        )
        .await
        .unwrap();
}

fn payment_count(snapshot: &JsonValue) -> usize {
    at(snapshot, HISTORY)
        .and_then(JsonValue::as_object)
        .map(|m| m.len())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_paid_callback_with_mapping_settles() {
    let store = seeded_store();
    with_mapping(&store).await;
    let (reconciler, sleeper) = reconciler(store.clone(), true);

    let ack = reconciler
        .handle(&payload(&[
            ("billcode", "rp123"),
            ("status_id", "1"),
            ("billpaymentInvoiceNo", "TP123456"),
        ]))
        .await;

    assert!(ack.received);
    assert_eq!(ack.success, Some(true));
    assert_eq!(ack.payment_recorded, Some(true));
    assert_eq!(ack.commission_updated, Some(true));
    assert!(sleeper.delays().is_empty());

    let snapshot = store.snapshot().await;
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("74.5")));
    assert_eq!(amount_at(&snapshot, &format!("{}/paid_commission", SUMMARY)), Some(dec("25.5")));
    assert_eq!(payment_count(&snapshot), 1);

    let records = at(&snapshot, HISTORY).and_then(JsonValue::as_object).unwrap();
    let record = records.values().next().unwrap();
    assert_eq!(record["billCode"], json!("rp123"));
    assert_eq!(record["reference"], json!("REF"));
    assert_eq!(record["invoiceNo"], json!("TP123456"));
    assert_eq!(record["paymentMethod"], json!("ToyyibPay"));
}

#[tokio::test]
async fn test_missing_mapping_falls_back_to_external_reference() {
    let store = seeded_store();
    let (reconciler, sleeper) = reconciler(store.clone(), true);

    let ack = reconciler
        .handle(&payload(&[
            ("billcode", "rp999"),
            ("status_id", "1"),
            ("order_id", "REF_drv_abcd_25.5_1700000000000"),
        ]))
        .await;

    assert_eq!(ack.success, Some(true));
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );

    let snapshot = store.snapshot().await;
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("74.5")));
    assert_eq!(payment_count(&snapshot), 1);
}

#[tokio::test]
async fn test_callback_without_status_is_treated_as_paid() {
    // Policy: gateways configured to call back only on success omit the status
    let store = seeded_store();
    with_mapping(&store).await;
    let (reconciler, _) = reconciler(store.clone(), true);

    let ack = reconciler.handle(&payload(&[("BillCode", "rp123")])).await;

    assert_eq!(ack.success, Some(true));
    let snapshot = store.snapshot().await;
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("74.5")));
}

#[tokio::test]
async fn test_failed_payment_is_acknowledged_without_writes() {
    let store = seeded_store();
    with_mapping(&store).await;
    let (reconciler, _) = reconciler(store.clone(), true);

    let ack = reconciler
        .handle(&payload(&[("billcode", "rp123"), ("status_id", "3")]))
        .await;

    assert_eq!(ack.paid, Some(false));
    assert_eq!(ack.status.as_deref(), Some("3"));
    let snapshot = store.snapshot().await;
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("100")));
    assert_eq!(payment_count(&snapshot), 0);
}

#[tokio::test]
async fn test_callback_without_bill_code() {
    let store = seeded_store();
    let (reconciler, _) = reconciler(store, true);

    let ack = reconciler.handle(&payload(&[("status_id", "1")])).await;

    assert!(ack.received);
    assert_eq!(ack.error.as_deref(), Some("NoBillCode"));
}

#[tokio::test]
async fn test_bill_code_that_is_not_a_store_key_is_rejected() {
    let store = seeded_store();
    let (reconciler, sleeper) = reconciler(store.clone(), true);
    let before = store.snapshot().await;

    for code in ["a/../../drivers/drv_new", "rp#1", "rp.1", "rp[0]"] {
        let ack = reconciler
            .handle(&payload(&[("billcode", code), ("status_id", "1")]))
            .await;
        assert_eq!(ack.error.as_deref(), Some("NoBillCode"), "bill code {:?}", code);
    }

    assert!(sleeper.delays().is_empty());
    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn test_partial_mapping_is_completed_from_its_external_reference() {
    use driver_commission_relay::database::DocumentStore;
    let store = seeded_store();
    store
        .put(
            "bill_mappings/rpP",
            &json!({
                "reference": "REF",
                "billExternalReferenceNo": "REF_drv_abcd_25.5_1700000000000"
            }),
        )
        .await
        .unwrap();
    let (reconciler, sleeper) = reconciler(store.clone(), true);

    let ack = reconciler
        .handle(&payload(&[("billcode", "rpP"), ("status_id", "1")]))
        .await;

    assert_eq!(ack.success, Some(true));
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    let snapshot = store.snapshot().await;
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("74.5")));
    let records = at(&snapshot, HISTORY).and_then(JsonValue::as_object).unwrap();
    assert_eq!(records.len(), 1);
    let record = records.values().next().unwrap();
    assert_eq!(record["billCode"], json!("rpP"));
    assert_eq!(record["reference"], json!("REF"));
}

#[tokio::test]
async fn test_unresolvable_bill_is_a_reconciliation_gap() {
    let store = seeded_store();
    let (reconciler, sleeper) = reconciler(store.clone(), true);

    let ack = reconciler
        .handle(&payload(&[("billcode", "rp404"), ("status_id", "1")]))
        .await;

    assert_eq!(ack.error.as_deref(), Some("MissingDriverOrAmount"));
    assert_eq!(ack.bill_code.as_deref(), Some("rp404"));
    assert_eq!(sleeper.delays().len(), 2);
    assert_eq!(payment_count(&store.snapshot().await), 0);
}

#[tokio::test]
async fn test_replayed_callback_is_applied_once() {
    let store = seeded_store();
    with_mapping(&store).await;
    let (reconciler, _) = reconciler(store.clone(), true);
    let callback = payload(&[("billcode", "rp123"), ("status_id", "1")]);

    let first = reconciler.handle(&callback).await;
    let second = reconciler.handle(&callback).await;

    assert_eq!(first.success, Some(true));
    assert_eq!(second.duplicate, Some(true));
    let snapshot = store.snapshot().await;
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("74.5")));
    assert_eq!(payment_count(&snapshot), 1);
    assert!(at(&snapshot, "processed_callbacks/rp123").is_some());
}

#[tokio::test]
async fn test_replay_without_dedup_decrements_twice() {
    let store = seeded_store();
    with_mapping(&store).await;
    let (reconciler, _) = reconciler(store.clone(), false);
    let callback = payload(&[("billcode", "rp123"), ("status_id", "1")]);

    reconciler.handle(&callback).await;
    let second = reconciler.handle(&callback).await;

    assert_eq!(second.success, Some(true));
    let snapshot = store.snapshot().await;
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("49")));
    assert_eq!(amount_at(&snapshot, &format!("{}/paid_commission", SUMMARY)), Some(dec("51")));
    assert_eq!(payment_count(&snapshot), 2);
}

#[tokio::test]
async fn test_payment_record_failure_leaves_ledger_untouched() {
    let memory = seeded_store();
    with_mapping(&memory).await;
    let faulty = Arc::new(FaultyStore::new(memory.clone()));
    faulty.fail_push.store(true, Ordering::SeqCst);
    let (reconciler, _) = reconciler(faulty.clone() as SharedStore, true);
    let callback = payload(&[("billcode", "rp123"), ("status_id", "1")]);

    let ack = reconciler.handle(&callback).await;

    assert_eq!(ack.error.as_deref(), Some("PaymentRecordFailed"));
    assert_eq!(ack.processed, Some(false));
    let snapshot = memory.snapshot().await;
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("100")));
    // The claim is released so the gateway's retry can settle
    assert!(at(&snapshot, "processed_callbacks/rp123").is_none());

    faulty.fail_push.store(false, Ordering::SeqCst);
    let retry = reconciler.handle(&callback).await;
    assert_eq!(retry.success, Some(true));
}

#[tokio::test]
async fn test_ledger_failure_keeps_payment_record() {
    let memory = seeded_store();
    with_mapping(&memory).await;
    let faulty = Arc::new(FaultyStore::new(memory.clone()));
    faulty.fail_ledger_writes.store(true, Ordering::SeqCst);
    let (reconciler, _) = reconciler(faulty as SharedStore, true);

    let ack = reconciler
        .handle(&payload(&[("billcode", "rp123"), ("status_id", "1")]))
        .await;

    assert!(ack.received);
    assert_eq!(ack.warning.as_deref(), Some("CommissionUpdateFailed"));
    assert_eq!(ack.payment_recorded, Some(true));
    assert_eq!(ack.commission_updated, Some(false));
    let snapshot = memory.snapshot().await;
    assert_eq!(payment_count(&snapshot), 1);
    assert_eq!(amount_at(&snapshot, &format!("{}/unpaid_commission", SUMMARY)), Some(dec("100")));
}

#[tokio::test]
async fn test_transient_mapping_reads_are_retried() {
    let memory = seeded_store();
    with_mapping(&memory).await;
    let faulty = Arc::new(FaultyStore::new(memory.clone()));
    faulty.transient_mapping_reads.store(2, Ordering::SeqCst);
    let (reconciler, sleeper) = reconciler(faulty as SharedStore, true);

    let ack = reconciler
        .handle(&payload(&[("billcode", "rp123"), ("status_id", "1")]))
        .await;

    assert_eq!(ack.success, Some(true));
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn test_legacy_ledger_is_used_when_primary_is_absent() {
    let store = Arc::new(MemoryStore::with_data(json!({
        "bill_mappings": {"rp555": {"driverId": "drv_legacy01", "amount": 10, "reference": "OLD"}},
        "commissions": {"drv_legacy01": {"unpaid_commission": 30, "paid_commission": 0, "total_commission": 30}}
    })));
    let (reconciler, _) = reconciler(store.clone(), true);

    let ack = reconciler
        .handle(&payload(&[("billcode", "rp555"), ("status_id", "1")]))
        .await;

    assert_eq!(ack.success, Some(true));
    let snapshot = store.snapshot().await;
    assert_eq!(amount_at(&snapshot, "commissions/drv_legacy01/unpaid_commission"), Some(dec("20")));
    assert!(at(&snapshot, "driver_commissions/drv_legacy01").is_none());
}

//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use driver_commission_relay::api::AppState;
use driver_commission_relay::config::{
    BillDefaults, GatewayConfig, GatewayEnvironment, ReconciliationConfig,
};
use driver_commission_relay::database::error::{DatabaseError, DatabaseResult};
use driver_commission_relay::database::memory::MemoryStore;
use driver_commission_relay::database::{DocumentStore, SharedStore};
use driver_commission_relay::payments::utils::payment_url;
use driver_commission_relay::payments::{
    BillForm, BillGateway, CreatedBill, PaymentError, PaymentResult,
};
use driver_commission_relay::services::{CallbackReconciler, RecordingSleeper};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SANDBOX_BASE: &str = "https://dev.toyyibpay.com";

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        environment: GatewayEnvironment::Sandbox,
        user_secret_key: "test-secret-key-123".to_string(),
        category_code: "cat-001".to_string(),
        base_url: SANDBOX_BASE.to_string(),
        timeout_secs: 30,
        default_return_url: Some("https://app.example.com/return".to_string()),
        default_callback_url: Some("https://relay.example.com/api/toyyibpay/callback".to_string()),
        bill_defaults: BillDefaults::default(),
    }
}

pub fn reconciliation_config(dedup_enabled: bool) -> ReconciliationConfig {
    ReconciliationConfig {
        mapping_max_attempts: 3,
        mapping_backoff: Duration::from_millis(1000),
        dedup_enabled,
    }
}

/// Gateway double that records every form and answers with a scripted result
pub struct ScriptedGateway {
    pub forms: Mutex<Vec<BillForm>>,
    pub reply: Mutex<PaymentResult<String>>,
}

impl ScriptedGateway {
    pub fn returning(bill_code: &str) -> Self {
        Self {
            forms: Mutex::new(Vec::new()),
            reply: Mutex::new(Ok(bill_code.to_string())),
        }
    }

    pub fn failing(error: PaymentError) -> Self {
        Self {
            forms: Mutex::new(Vec::new()),
            reply: Mutex::new(Err(error)),
        }
    }

    pub fn calls(&self) -> usize {
        self.forms.lock().unwrap().len()
    }

    pub fn last_form(&self) -> Option<BillForm> {
        self.forms.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl BillGateway for ScriptedGateway {
    async fn create_bill(&self, form: &BillForm) -> PaymentResult<CreatedBill> {
        self.forms.lock().unwrap().push(form.clone());
        let reply = self.reply.lock().unwrap().clone();
        reply.map(|bill_code| CreatedBill {
            payment_url: self.payment_url(&bill_code),
            bill_code,
        })
    }

    fn payment_url(&self, bill_code: &str) -> String {
        payment_url(SANDBOX_BASE, bill_code)
    }

    fn environment(&self) -> &'static str {
        "sandbox"
    }
}

/// Memory store with switchable faults
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    pub fail_push: AtomicBool,
    pub fail_ledger_writes: AtomicBool,
    pub deny_reads: AtomicBool,
    /// Number of upcoming mapping reads that fail transiently
    pub transient_mapping_reads: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_push: AtomicBool::new(false),
            fail_ledger_writes: AtomicBool::new(false),
            deny_reads: AtomicBool::new(false),
            transient_mapping_reads: AtomicU32::new(0),
        }
    }

    fn is_ledger(path: &str) -> bool {
        path.starts_with("driver_commissions") || path.starts_with("commissions")
    }

    fn ledger_fault(&self, path: &str) -> DatabaseResult<()> {
        if self.fail_ledger_writes.load(Ordering::SeqCst) && Self::is_ledger(path) {
            return Err(DatabaseError::PermissionDenied {
                path: path.to_string(),
                message: "Permission denied".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, path: &str) -> DatabaseResult<Option<JsonValue>> {
        if self.deny_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::PermissionDenied {
                path: path.to_string(),
                message: "Permission denied".to_string(),
            });
        }
        if path.starts_with("bill_mappings")
            && self
                .transient_mapping_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(DatabaseError::Transient {
                message: "HTTP 503: unavailable".to_string(),
            });
        }
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, value: &JsonValue) -> DatabaseResult<()> {
        self.ledger_fault(path)?;
        self.inner.put(path, value).await
    }

    async fn patch(&self, path: &str, fields: &JsonValue) -> DatabaseResult<()> {
        self.ledger_fault(path)?;
        self.inner.patch(path, fields).await
    }

    async fn push(&self, path: &str, value: &JsonValue) -> DatabaseResult<String> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(DatabaseError::Transient {
                message: "HTTP 500: write failed".to_string(),
            });
        }
        self.inner.push(path, value).await
    }

    async fn delete(&self, path: &str) -> DatabaseResult<()> {
        self.inner.delete(path).await
    }

    async fn child_keys(&self, path: &str) -> DatabaseResult<Vec<String>> {
        self.inner.child_keys(path).await
    }

    async fn put_if_absent(&self, path: &str, value: &JsonValue) -> DatabaseResult<bool> {
        self.inner.put_if_absent(path, value).await
    }
}

/// Driver with 100.00 of unpaid commission and nothing paid yet
pub fn seeded_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_data(serde_json::json!({
        "drivers": {
            "drv_abcdef12": {"name": "Aminah"},
            "drv_zzz00001": {"name": "Zul"}
        },
        "driver_commissions": {
            "drv_abcdef12": {
                "commission_summary": {
                    "unpaid_commission": 100,
                    "paid_commission": 0,
                    "total_commission": 100,
                    "total_rides": 12
                }
            }
        }
    })))
}

pub fn reconciler(
    store: SharedStore,
    dedup_enabled: bool,
) -> (CallbackReconciler, RecordingSleeper) {
    let sleeper = RecordingSleeper::new();
    let reconciler = CallbackReconciler::new(
        store,
        &reconciliation_config(dedup_enabled),
        Arc::new(sleeper.clone()),
    );
    (reconciler, sleeper)
}

pub fn app_state(store: SharedStore, gateway: Arc<ScriptedGateway>) -> AppState {
    AppState::new(
        store,
        gateway,
        gateway_config(),
        &reconciliation_config(true),
        Arc::new(RecordingSleeper::new()),
    )
}

/// Value at a slash path inside a JSON snapshot
pub fn at<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .try_fold(doc, |node, key| node.get(key))
}

pub fn amount_at(doc: &JsonValue, path: &str) -> Option<rust_decimal::Decimal> {
    at(doc, path).and_then(driver_commission_relay::payments::types::parse_amount)
}

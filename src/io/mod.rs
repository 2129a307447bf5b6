//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `store` - Transaction store port and in-memory adapter
//! - `sqlite` - SQLite transaction store
//! - `payment` - M-Pesa push-payment client
//! - `operator_fees` - Operator B fee lookup
//! - `whatsapp` - Infobip WhatsApp notifier
//! - `twiml` - IVR reply rendering
//! - `http` - Channel webhook server
//! - `prometheus` - Prometheus text exposition

pub mod http;
pub mod operator_fees;
pub mod payment;
pub mod prometheus;
pub mod sqlite;
pub mod store;
pub mod twiml;
pub mod whatsapp;

// Re-export commonly used types
pub use http::{start_http_server, AppState};
pub use operator_fees::{HttpFeeLookup, OperatorFeeLookup};
pub use payment::{MpesaPushClient, PaymentGateway, PushOutcome};
pub use sqlite::SqliteStore;
pub use store::{open_store, InMemoryStore, StoreError, TransactionStore};
pub use twiml::TwimlRenderer;
pub use whatsapp::{DisabledNotifier, InfobipNotifier, Notifier, PaymentPrompt};

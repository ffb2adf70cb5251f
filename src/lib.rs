// Shared part with the migrate, rollback and status binaries
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub mod cli;
pub mod error;
pub mod export;
pub mod identity;
pub mod migrate;
pub mod orchestrator;
pub mod report;
pub mod rollback;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod throttle;
pub mod validate;

shadow_rs::shadow!(build);

pub use error::MigrationError;
pub use orchestrator::{Orchestrator, Phase};
pub use report::{MigrationResult, WorkflowReport};

/// Root collection holding every owner's scoped data.
pub const OWNER_ROOT: &str = "users";

pub const DEMO_EMAIL: &str = "demo@byki.com";
pub const DEFAULT_PROJECT_ID: &str = "sparepart-management-system";

/// A single exported document. `data` is carried as-is, never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Record {
            id: id.into(),
            data,
        }
    }
}

/// The fixed set of global collections, in migration order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "camelCase")]
pub enum CollectionName {
    #[value(name = "parts")]
    Parts,
    #[value(name = "customers")]
    Customers,
    #[value(name = "mechanics")]
    Mechanics,
    #[value(name = "workOrders")]
    WorkOrders,
    #[value(name = "suppliers")]
    Suppliers,
    #[value(name = "purchaseOrders")]
    PurchaseOrders,
    #[value(name = "expenses")]
    Expenses,
    #[value(name = "payments")]
    Payments,
    #[value(name = "invoices")]
    Invoices,
    #[value(name = "stockCounts")]
    StockCounts,
    #[value(name = "scheduleEvents")]
    ScheduleEvents,
}

impl CollectionName {
    pub const ALL: [CollectionName; 11] = [
        CollectionName::Parts,
        CollectionName::Customers,
        CollectionName::Mechanics,
        CollectionName::WorkOrders,
        CollectionName::Suppliers,
        CollectionName::PurchaseOrders,
        CollectionName::Expenses,
        CollectionName::Payments,
        CollectionName::Invoices,
        CollectionName::StockCounts,
        CollectionName::ScheduleEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Parts => "parts",
            CollectionName::Customers => "customers",
            CollectionName::Mechanics => "mechanics",
            CollectionName::WorkOrders => "workOrders",
            CollectionName::Suppliers => "suppliers",
            CollectionName::PurchaseOrders => "purchaseOrders",
            CollectionName::Expenses => "expenses",
            CollectionName::Payments => "payments",
            CollectionName::Invoices => "invoices",
            CollectionName::StockCounts => "stockCounts",
            CollectionName::ScheduleEvents => "scheduleEvents",
        }
    }

    /// Path of the global (flat) collection.
    pub fn source_path(&self) -> String {
        self.as_str().to_owned()
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of the account that owns migrated data.
///
/// Never empty, and never contains `/` so it always names exactly one path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Result<Self, MigrationError> {
        let id = id.into();
        if id.is_empty() || id.contains('/') {
            return Err(MigrationError::InvalidOwnerId(id));
        }
        Ok(OwnerId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of this owner's copy of `collection`: `users/{owner}/{collection}`.
    pub fn scoped_path(&self, collection: CollectionName) -> String {
        format!("{}/{}/{}", OWNER_ROOT, self.0, collection)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = MigrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OwnerId::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join a collection path and a document id.
pub fn document_path(collection_path: &str, id: &str) -> String {
    format!("{}/{}", collection_path, id)
}

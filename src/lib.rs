//! Stockledger
//!
//! Inventory ledger and valuation engine. Every stock-affecting event is an
//! immutable movement; current stock is a fold over movement history;
//! valuation replays the same history under FIFO, LIFO or weighted-average
//! costing. The crate exposes plain async services for a boundary layer to
//! consume.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

pub mod prelude {
    pub use crate::cache::*;
    pub use crate::config::*;
    pub use crate::db::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::services::movements::{MovementService, NewMovement};
    pub use crate::services::products::{CreateProductRequest, ProductService};
    pub use crate::services::reconciliation::{
        ReconcileRequest, ReconciliationResponse, ReconciliationService,
    };
    pub use crate::services::reversals::ReversalService;
    pub use crate::services::stock::{LocationStock, LowStockItem, StockService};
    pub use crate::services::transactions::{
        CreateTransactionRequest, TransactionItemInput, TransactionResponse, TransactionService,
    };
    pub use crate::services::valuation::{
        CatalogValuation, CostingMethod, ProductValuation, ValuationService,
    };
}

// Leaf services: the movement ledger and the projections over it
pub mod movements;
pub mod products;
pub mod stock;

// The transaction ledger and its reversal path
pub mod reversals;
pub mod transactions;

// Derived views over movement history
pub mod reconciliation;
pub mod valuation;

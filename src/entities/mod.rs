pub mod inventory_transaction;
pub mod physical_count;
pub mod product;
pub mod stock_movement;
pub mod transaction_item;

//! SeaORM entities for the order lifecycle and checkout engine.

pub mod cart_item;
pub mod ledger_entry;
pub mod order;
pub mod order_audit;
pub mod order_item;

pub use cart_item::Entity as CartItem;
pub use ledger_entry::Entity as LedgerEntry;
pub use order::Entity as Order;
pub use order_audit::Entity as OrderAudit;
pub use order_item::Entity as OrderItem;

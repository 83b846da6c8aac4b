//! Business logic services

pub mod bom;
pub mod item;
pub mod ledger;
pub mod lot;
pub mod production;

pub use bom::BomService;
pub use item::ItemService;
pub use ledger::LedgerService;
pub use lot::LotService;
pub use production::ProductionService;

//! Domain models for the CraftCost platform

mod bom;
mod item;
mod lot;
mod run;
mod transaction;

pub use bom::*;
pub use item::*;
pub use lot::*;
pub use run::*;
pub use transaction::*;

//! Repository layer: entity-scoped database operations over a borrowed
//! `Connection`. Callers own locking through `SharedConnection::with`.

mod audit;
mod record;

pub use audit::*;
pub use record::*;

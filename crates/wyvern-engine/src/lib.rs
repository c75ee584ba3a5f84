//! Wyvern execution engine.
//!
//! A workflow (`Soar`) is a DAG of `Flap`s. Each flap owns an `Action` plus
//! its own retry/backoff bookkeeping. A background loop per soar walks the
//! graph depth-first on every tick, advancing each flap's state machine and
//! executing the actions whose dependencies and conditions are satisfied.

pub mod flap;
pub mod index;
pub mod soar;
pub mod traversal;
pub mod wyvern;

pub use flap::{Flap, Ticked};
pub use index::{FlapIdTable, FlapIndex};
pub use soar::{PassDiagnostics, PassReport, Soar, DEFAULT_TICK_INTERVAL};
pub use traversal::{FlapVisitor, Lookup};
pub use wyvern::Wyvern;

//! Built-in sorter adapters.
//!
//! External tools integrate through one of two staged-directory
//! protocols: `json` (the tool writes `sorting.json`) or `csv` (the tool
//! writes `sorting.csv`). Concrete sorter instances are declared in the
//! configuration file, one adapter per `[sorters.<name>]` table.

pub mod protocol;

pub use protocol::{ProtocolAdapter, SorterProtocol};

use clap::ValueEnum;

pub mod client;
pub mod error;
pub mod export;
pub mod harness;
pub mod progress;
pub mod runner;
pub mod schema;
pub mod sweep;
pub mod workload;

/// How documents are written during the insert phase.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum InsertMode {
    /// One awaited write request per document.
    #[default]
    Sequential,
    /// A single `_bulk_docs` request per database.
    Bulk,
}

impl InsertMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertMode::Sequential => "sequential",
            InsertMode::Bulk => "bulk",
        }
    }
}

//! Archive access: fetching LIDO payloads, parsing and filtering records.

mod client;
mod filter;
pub mod lido;

pub use client::{ArchiveClient, FetchError, RecordSource};
pub use filter::{RecordFilter, Rejection};
pub use lido::{parse_record, LidoError};

//! Remote search boundary consumed by the export pipeline

use serde_json::value::RawValue;

use crate::error::ExportError;

/// One page request for a slice.
///
/// `cursor == None` opens the slice's fetch session; afterwards the cursor
/// issued by the previous page is passed back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub index: &'a str,
    pub slice_id: u32,
    pub slice_max: u32,
    pub page_size: u32,
    pub cursor: Option<&'a str>,
}

/// One page of documents.
#[derive(Debug, Default)]
pub struct Page {
    /// Raw JSON documents, in the order the service returned them
    pub documents: Vec<Box<RawValue>>,
    /// Continuation token; must eventually be passed to [`SearchClient::release`]
    pub cursor: Option<String>,
    /// Service signalled no further pages
    pub exhausted: bool,
    /// Total documents in this slice, when the service reports it
    pub total_hint: Option<u64>,
}

/// Paginated, sliced access to a search service.
///
/// Implementations are shared by all workers and must be safe to call
/// concurrently; every call is a blocking network round-trip.
pub trait SearchClient: Send + Sync {
    /// Fetch the next page for a slice
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Page, ExportError>;

    /// Release the server-side session associated with a cursor
    fn release(&self, cursor: &str) -> Result<(), ExportError>;

    /// Current document count of an index
    fn count(&self, index: &str) -> Result<u64, ExportError>;

    /// Names of all (non-system) indices
    fn list_indices(&self) -> Result<Vec<String>, ExportError>;
}

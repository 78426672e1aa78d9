//! The receipt parsing gateway.
//!
//! Uploaded financial documents (bank statements, invoices, receipts) are
//! passed through to the Gemini document-understanding API and the
//! structured JSON it extracts is returned to the caller verbatim. The
//! gateway stores nothing: the receipt table exists only so transactions
//! can reference documents imported by other means.

mod gemini;
mod routes;

pub use gemini::{DEFAULT_GEMINI_MODEL, GeminiConfig};
pub use routes::{ReceiptState, create_receipt_table, parse_receipt_endpoint};

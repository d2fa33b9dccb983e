pub mod invoice_service;
pub mod jofotara;

pub use invoice_service::{
    InMemoryInvoiceStore, InvoiceServiceError, InvoiceStore, InvoiceSubmissionService,
};
pub use jofotara::{JoFotaraClient, JoFotaraError};

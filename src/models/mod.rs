pub mod invoice;
pub mod submission;

pub use invoice::{Invoice, InvoiceLine, JoFotaraFields, Party};
pub use submission::{SubmissionResult, SubmissionStatus};

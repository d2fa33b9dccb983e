// JoFotara (Jordan national e-invoicing) integration

pub mod auth;
pub mod client;
pub mod errors;
pub mod payload;
pub mod qr;
pub mod response;

pub use auth::{AccessToken, Authenticator};
pub use client::JoFotaraClient;
pub use errors::{JoFotaraError, Result};
pub use payload::{EncodedPayload, InvoiceFields, PayloadSerializer};

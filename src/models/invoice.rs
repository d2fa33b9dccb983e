use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Sales invoice snapshot as delivered by the ERP.
///
/// Read-only to the connector: only the JoFotara result fields
/// ([`JoFotaraFields`]) are ever written back.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Invoice {
    #[validate(length(min = 1, max = 140, message = "Invoice name required"))]
    pub name: String,
    pub posting_date: Option<NaiveDate>,
    #[validate(length(equal = 3, message = "Currency must be an ISO 4217 code"))]
    pub currency: Option<String>,
    #[serde(default)]
    pub is_return: bool,
    /// Original invoice a credit note reverses
    pub return_against: Option<String>,
    pub return_against_uuid: Option<String>,
    pub return_against_total: Option<Decimal>,
    pub remarks: Option<String>,
    pub seller: Option<Party>,
    pub buyer: Option<Party>,
    #[serde(default)]
    pub items: Vec<InvoiceLine>,
    /// Header-level discount
    #[serde(default)]
    pub discount_amount: Decimal,
    /// VAT percent for lines that carry no rate of their own
    pub default_vat_rate: Option<Decimal>,
    pub grand_total: Option<Decimal>,
    /// UUID from an earlier submission, reused on resubmission
    pub jofotara_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Party {
    pub tax_id: Option<String>,
    pub name: Option<String>,
    pub postal_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub item_name: Option<String>,
    pub item_code: Option<String>,
    pub qty: Decimal,
    pub uom: Option<String>,
    pub rate: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub vat_rate: Option<Decimal>,
}

impl InvoiceLine {
    pub fn display_name(&self) -> String {
        [&self.item_name, &self.item_code]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("Item")
            .to_string()
    }
}

/// The custom fields the connector owns on the ERP invoice record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoFotaraFields {
    pub jofotara_status: Option<String>,
    pub jofotara_uuid: Option<String>,
    pub jofotara_qr: Option<String>,
    pub jofotara_error: Option<String>,
    pub jofotara_qr_image: Option<String>,
    pub jofotara_sent_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Exact document last submitted, before base64 encoding
    pub jofotara_xml: Option<String>,
}

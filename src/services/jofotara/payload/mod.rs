// Invoice payload construction
// Maps an ERP invoice onto the fields JoFotara expects once, then hands the
// mapped fields to the XML or JSON serializer.

pub mod json;
pub mod xml;

use base64::{engine::general_purpose, Engine as _};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::PayloadFormat;
use crate::models::Invoice;

use super::errors::{JoFotaraError, Result};

pub use json::JsonSerializer;
pub use xml::UblXmlSerializer;

pub const INVOICE_TYPE_CODE: &str = "388";
pub const CREDIT_NOTE_TYPE_CODE: &str = "381";
/// Fixed `name` attribute on InvoiceTypeCode for the reporting profile
pub const INVOICE_TYPE_NAME: &str = "022";
pub const DEFAULT_CURRENCY: &str = "JOD";
/// currencyID used on monetary amounts
pub const AMOUNT_CURRENCY_ID: &str = "JO";
pub const DEFAULT_VAT_PERCENT: Decimal = dec!(16.0);

/// Values the mapping needs from the connector settings.
#[derive(Debug, Clone, Default)]
pub struct PayloadContext {
    /// Digits-only activity (income source) number
    pub activity_number: Option<String>,
    /// Used when the invoice seller carries no tax id
    pub seller_tax_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyFields {
    pub tax_id: String,
    pub name: String,
    pub postal_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingReference {
    pub invoice_id: Option<String>,
    pub uuid: Option<String>,
    pub total: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineFields {
    pub id: u32,
    pub name: String,
    pub quantity: String,
    pub unit_code: String,
    pub unit_price: String,
    pub discount: String,
    pub net_amount: String,
    pub vat_percent: String,
    pub vat_amount: String,
}

/// Format-neutral view of an invoice. Amounts are pre-formatted to three
/// decimals so both serializers emit identical figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFields {
    pub profile_id: String,
    pub invoice_id: String,
    pub uuid: String,
    pub issue_date: String,
    pub type_code: String,
    pub type_name: String,
    pub currency: String,
    pub is_return: bool,
    pub billing_reference: Option<BillingReference>,
    pub seller: PartyFields,
    pub buyer: PartyFields,
    pub activity_number: Option<String>,
    pub payment_note: Option<String>,
    pub header_discount: String,
    pub default_vat_percent: String,
    pub tax_exclusive_amount: String,
    pub vat_amount: String,
    pub tax_inclusive_amount: String,
    pub payable_amount: String,
    pub grand_total: String,
    pub lines: Vec<LineFields>,
}

impl InvoiceFields {
    pub fn from_invoice(invoice: &Invoice, ctx: &PayloadContext) -> Result<Self> {
        let seller = invoice.seller.clone().unwrap_or_default();
        let seller_tax_id = non_blank(&seller.tax_id)
            .or_else(|| non_blank(&ctx.seller_tax_number))
            .ok_or_else(|| missing("seller tax id"))?;
        let seller_name = non_blank(&seller.name).unwrap_or_else(|| seller_tax_id.clone());

        let buyer = invoice.buyer.clone().ok_or_else(|| missing("buyer"))?;
        let buyer_id = non_blank(&buyer.tax_id).ok_or_else(|| missing("buyer id"))?;
        let buyer_name = non_blank(&buyer.name).unwrap_or_else(|| "Consumer".to_string());

        if invoice.items.is_empty() {
            return Err(missing("line items"));
        }
        let grand_total = invoice.grand_total.ok_or_else(|| missing("grand total"))?;

        let is_return = invoice.is_return;
        let positive = |v: Decimal| if is_return { v.abs() } else { v };
        let default_vat = invoice
            .default_vat_rate
            .filter(|r| !r.is_zero())
            .unwrap_or(DEFAULT_VAT_PERCENT);

        let mut net_sum = Decimal::ZERO;
        let mut vat_sum = Decimal::ZERO;
        let mut lines = Vec::with_capacity(invoice.items.len());

        for (idx, item) in invoice.items.iter().enumerate() {
            let qty = positive(item.qty);
            let price = positive(item.rate);
            let discount = positive(item.discount_amount);
            let vat_percent = item.vat_rate.unwrap_or(default_vat);

            let net = qty
                .checked_mul(price)
                .and_then(|gross| gross.checked_sub(discount))
                .ok_or_else(overflow)?
                .max(Decimal::ZERO);
            let vat = net
                .checked_mul(vat_percent)
                .and_then(|v| v.checked_div(dec!(100)))
                .ok_or_else(overflow)?;
            net_sum = net_sum.checked_add(net).ok_or_else(overflow)?;
            vat_sum = vat_sum.checked_add(vat).ok_or_else(overflow)?;

            lines.push(LineFields {
                id: idx as u32 + 1,
                name: item.display_name(),
                quantity: format_qty(qty),
                unit_code: uom_code(item.uom.as_deref()).to_string(),
                unit_price: format_amount(price),
                discount: format_amount(discount),
                net_amount: format_amount(net),
                vat_percent: format_percent(vat_percent),
                vat_amount: format_amount(vat),
            });
        }

        let header_discount = positive(invoice.discount_amount);
        let tax_exclusive = net_sum
            .checked_sub(header_discount)
            .ok_or_else(overflow)?
            .max(Decimal::ZERO);
        let tax_inclusive = tax_exclusive.checked_add(vat_sum).ok_or_else(overflow)?;

        if (round3(tax_inclusive) - round3(grand_total.abs())).abs() > dec!(0.001) {
            tracing::warn!(
                "Invoice {} computed total {} differs from ERP grand total {}",
                crate::utils::log_sanitizer::sanitize_for_log(&invoice.name),
                format_amount(tax_inclusive),
                format_amount(grand_total)
            );
        }

        let billing_reference = is_return.then(|| BillingReference {
            invoice_id: non_blank(&invoice.return_against),
            uuid: non_blank(&invoice.return_against_uuid),
            total: invoice.return_against_total.map(format_amount),
        });

        let payment_note = is_return.then(|| {
            let reason = non_blank(&invoice.remarks).unwrap_or_else(|| "مرتجع".to_string());
            match non_blank(&invoice.return_against) {
                Some(original) => format!("عكس: {}, {}", original, reason),
                None => reason,
            }
        });

        let currency = non_blank(&invoice.currency)
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        Ok(Self {
            profile_id: "reporting:1.0".to_string(),
            invoice_id: invoice.name.clone(),
            uuid: non_blank(&invoice.jofotara_uuid)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            issue_date: invoice
                .posting_date
                .unwrap_or_else(|| chrono::Utc::now().date_naive())
                .format("%Y-%m-%d")
                .to_string(),
            type_code: if is_return { CREDIT_NOTE_TYPE_CODE } else { INVOICE_TYPE_CODE }.to_string(),
            type_name: INVOICE_TYPE_NAME.to_string(),
            currency,
            is_return,
            billing_reference,
            seller: PartyFields {
                tax_id: seller_tax_id,
                name: seller_name,
                postal_zone: non_blank(&seller.postal_zone),
            },
            buyer: PartyFields {
                tax_id: buyer_id,
                name: buyer_name,
                postal_zone: non_blank(&buyer.postal_zone),
            },
            activity_number: non_blank(&ctx.activity_number),
            payment_note,
            header_discount: format_amount(header_discount),
            default_vat_percent: format_percent(default_vat),
            tax_exclusive_amount: format_amount(tax_exclusive),
            vat_amount: format_amount(vat_sum),
            tax_inclusive_amount: format_amount(tax_inclusive),
            payable_amount: format_amount(tax_inclusive),
            grand_total: format_amount(grand_total),
            lines,
        })
    }
}

/// Turns mapped fields into a document in one wire format.
pub trait PayloadSerializer {
    fn format(&self) -> PayloadFormat;
    fn serialize(&self, fields: &InvoiceFields) -> Result<String>;
}

pub fn serializer_for(format: PayloadFormat) -> Box<dyn PayloadSerializer + Send + Sync> {
    match format {
        PayloadFormat::Xml => Box::new(UblXmlSerializer),
        PayloadFormat::Json => Box::new(JsonSerializer),
    }
}

/// A serialized invoice ready for the submit endpoint.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    pub format: PayloadFormat,
    /// UUID embedded in the document
    pub invoice_uuid: String,
    pub document: String,
    /// Base64 of `document`, the value sent as `{"invoice": ...}`
    pub encoded: String,
}

impl EncodedPayload {
    pub fn decode(&self) -> Result<String> {
        decode_base64(&self.encoded)
    }
}

pub fn build_payload(
    invoice: &Invoice,
    format: PayloadFormat,
    ctx: &PayloadContext,
) -> Result<EncodedPayload> {
    let fields = InvoiceFields::from_invoice(invoice, ctx)?;
    let serializer = serializer_for(format);
    let document = serializer.serialize(&fields)?;

    Ok(EncodedPayload {
        format: serializer.format(),
        invoice_uuid: fields.uuid,
        encoded: to_base64(&document),
        document,
    })
}

pub fn to_base64(document: &str) -> String {
    general_purpose::STANDARD.encode(document.as_bytes())
}

pub fn decode_base64(encoded: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| JoFotaraError::SerializationError(format!("base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| JoFotaraError::SerializationError(format!("utf-8: {}", e)))
}

/// UN/ECE Recommendation 20 unit code for an ERP unit name.
pub fn uom_code(uom: Option<&str>) -> &'static str {
    let key = uom.unwrap_or("").trim().to_lowercase();
    match key.as_str() {
        "unit" | "units" | "each" | "pcs" | "piece" | "nos" | "قطعة" | "وحدة" => "PCE",
        "box" | "صندوق" => "BOX",
        "kg" | "kilogram" | "كيلو" => "KGM",
        "g" | "جرام" => "GRM",
        "m" | "meter" | "متر" => "MTR",
        "cm" | "سم" => "CMT",
        "mm" => "MMT",
        "m2" | "sq m" | "متر مربع" => "MTK",
        "l" | "liter" | "لتر" => "LTR",
        "hour" | "ساعة" => "HUR",
        "day" | "يوم" => "DAY",
        _ => "PCE",
    }
}

fn round3(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
}

pub fn format_amount(value: Decimal) -> String {
    format!("{:.3}", round3(value))
}

pub fn format_qty(value: Decimal) -> String {
    format!("{:.1}", value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

fn format_percent(value: Decimal) -> String {
    format!("{:.1}", value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn missing(field: &str) -> JoFotaraError {
    JoFotaraError::SerializationError(format!("invoice is missing {}", field))
}

fn overflow() -> JoFotaraError {
    JoFotaraError::SerializationError("amount overflow".to_string())
}

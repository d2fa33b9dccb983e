// UBL 2.1 invoice document in the element order JoFotara's XSD accepts.

use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;

use crate::config::PayloadFormat;

use super::{InvoiceFields, LineFields, PayloadSerializer, AMOUNT_CURRENCY_ID};
use crate::services::jofotara::errors::{JoFotaraError, Result};

pub const NS_INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
pub const NS_CAC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
pub const NS_CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
pub const NS_EXT: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";

const VAT_SCHEME_AGENCY: &str = "6";
const VAT_SCHEME_5305: &str = "UN/ECE 5305";
const VAT_SCHEME_5153: &str = "UN/ECE 5153";
const COUNTRY_CODE: &str = "JO";
const COUNTRY_SUBENTITY: &str = "JO-AM";

type XmlWriter = Writer<Vec<u8>>;
type XmlResult = quick_xml::Result<()>;

#[derive(Debug, Clone, Copy, Default)]
pub struct UblXmlSerializer;

impl PayloadSerializer for UblXmlSerializer {
    fn format(&self) -> PayloadFormat {
        PayloadFormat::Xml
    }

    /// Minified: no whitespace between elements.
    fn serialize(&self, fields: &InvoiceFields) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        writer
            .create_element("Invoice")
            .with_attributes([
                ("xmlns", NS_INVOICE),
                ("xmlns:cac", NS_CAC),
                ("xmlns:cbc", NS_CBC),
                ("xmlns:ext", NS_EXT),
            ])
            .write_inner_content(|w| write_invoice(w, fields))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| JoFotaraError::SerializationError(format!("utf-8: {}", e)))
    }
}

fn write_invoice(w: &mut XmlWriter, f: &InvoiceFields) -> XmlResult {
    text(w, "cbc:ProfileID", &f.profile_id)?;
    text(w, "cbc:ID", &f.invoice_id)?;
    text(w, "cbc:UUID", &f.uuid)?;
    text(w, "cbc:IssueDate", &f.issue_date)?;
    w.create_element("cbc:InvoiceTypeCode")
        .with_attribute(("name", f.type_name.as_str()))
        .write_text_content(BytesText::new(&f.type_code))?;
    text(w, "cbc:DocumentCurrencyCode", &f.currency)?;
    text(w, "cbc:TaxCurrencyCode", &f.currency)?;

    if let Some(reference) = &f.billing_reference {
        w.create_element("cac:BillingReference").write_inner_content(|w| {
            w.create_element("cac:InvoiceDocumentReference").write_inner_content(|w| {
                if let Some(id) = &reference.invoice_id {
                    text(w, "cbc:ID", id)?;
                }
                if let Some(uuid) = &reference.uuid {
                    text(w, "cbc:UUID", uuid)?;
                }
                if let Some(total) = &reference.total {
                    text(w, "cbc:DocumentDescription", total)?;
                }
                Ok::<(), quick_xml::Error>(())
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;
    }

    // Invoice counter value
    w.create_element("cac:AdditionalDocumentReference").write_inner_content(|w| {
        text(w, "cbc:ID", "ICV")?;
        text(w, "cbc:UUID", "1")
    })?;

    w.create_element("cac:AccountingSupplierParty").write_inner_content(|w| {
        w.create_element("cac:Party").write_inner_content(|w| {
            postal_address(w, f.seller.postal_zone.as_deref())?;
            w.create_element("cac:PartyTaxScheme").write_inner_content(|w| {
                text(w, "cbc:CompanyID", &f.seller.tax_id)?;
                vat_scheme(w)
            })?;
            w.create_element("cac:PartyLegalEntity").write_inner_content(|w| {
                text(w, "cbc:RegistrationName", &f.seller.name)
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;
        Ok::<(), quick_xml::Error>(())
    })?;

    w.create_element("cac:AccountingCustomerParty").write_inner_content(|w| {
        w.create_element("cac:Party").write_inner_content(|w| {
            w.create_element("cac:PartyIdentification").write_inner_content(|w| {
                w.create_element("cbc:ID")
                    .with_attribute(("schemeID", "TN"))
                    .write_text_content(BytesText::new(&f.buyer.tax_id))?;
                Ok::<(), quick_xml::Error>(())
            })?;
            postal_address(w, f.buyer.postal_zone.as_deref())?;
            w.create_element("cac:PartyTaxScheme").write_inner_content(vat_scheme)?;
            w.create_element("cac:PartyLegalEntity").write_inner_content(|w| {
                text(w, "cbc:RegistrationName", &f.buyer.name)
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;
        Ok::<(), quick_xml::Error>(())
    })?;

    if let Some(activity) = &f.activity_number {
        w.create_element("cac:SellerSupplierParty").write_inner_content(|w| {
            w.create_element("cac:Party").write_inner_content(|w| {
                w.create_element("cac:PartyIdentification").write_inner_content(|w| {
                    text(w, "cbc:ID", activity)
                })?;
                Ok::<(), quick_xml::Error>(())
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;
    }

    // XSD requires PaymentMeans after SellerSupplierParty
    if let Some(note) = &f.payment_note {
        w.create_element("cac:PaymentMeans").write_inner_content(|w| {
            w.create_element("cbc:PaymentMeansCode")
                .with_attribute(("listID", "UN/ECE 4461"))
                .write_text_content(BytesText::new("10"))?;
            text(w, "cbc:InstructionNote", note)
        })?;
    }

    w.create_element("cac:AllowanceCharge").write_inner_content(|w| {
        text(w, "cbc:ChargeIndicator", "false")?;
        text(w, "cbc:AllowanceChargeReason", "discount")?;
        amount(w, "cbc:Amount", &f.header_discount)
    })?;

    w.create_element("cac:TaxTotal").write_inner_content(|w| {
        amount(w, "cbc:TaxAmount", &f.vat_amount)?;
        if f.is_return {
            tax_subtotal(w, &f.tax_exclusive_amount, &f.vat_amount, &f.default_vat_percent)?;
        }
        Ok::<(), quick_xml::Error>(())
    })?;

    w.create_element("cac:LegalMonetaryTotal").write_inner_content(|w| {
        amount(w, "cbc:TaxExclusiveAmount", &f.tax_exclusive_amount)?;
        amount(w, "cbc:TaxInclusiveAmount", &f.tax_inclusive_amount)?;
        amount(w, "cbc:AllowanceTotalAmount", &f.header_discount)?;
        if f.is_return {
            amount(w, "cbc:PrepaidAmount", "0.000")?;
        }
        amount(w, "cbc:PayableAmount", &f.payable_amount)
    })?;

    let single_line = f.lines.len() == 1;
    for line in &f.lines {
        let rounding = single_line.then_some(f.payable_amount.as_str());
        write_line(w, line, rounding)?;
    }

    Ok(())
}

fn write_line(w: &mut XmlWriter, line: &LineFields, rounding_amount: Option<&str>) -> XmlResult {
    w.create_element("cac:InvoiceLine").write_inner_content(|w| {
        text(w, "cbc:ID", &line.id.to_string())?;
        w.create_element("cbc:InvoicedQuantity")
            .with_attribute(("unitCode", line.unit_code.as_str()))
            .write_text_content(BytesText::new(&line.quantity))?;
        amount(w, "cbc:LineExtensionAmount", &line.net_amount)?;

        w.create_element("cac:TaxTotal").write_inner_content(|w| {
            amount(w, "cbc:TaxAmount", &line.vat_amount)?;
            if let Some(rounding) = rounding_amount {
                amount(w, "cbc:RoundingAmount", rounding)?;
            }
            tax_subtotal(w, &line.net_amount, &line.vat_amount, &line.vat_percent)
        })?;

        w.create_element("cac:Item").write_inner_content(|w| text(w, "cbc:Name", &line.name))?;

        w.create_element("cac:Price").write_inner_content(|w| {
            amount(w, "cbc:PriceAmount", &line.unit_price)?;
            w.create_element("cac:AllowanceCharge").write_inner_content(|w| {
                text(w, "cbc:ChargeIndicator", "false")?;
                text(w, "cbc:AllowanceChargeReason", "DISCOUNT")?;
                amount(w, "cbc:Amount", &line.discount)
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(())
}

fn tax_subtotal(w: &mut XmlWriter, taxable: &str, tax: &str, percent: &str) -> XmlResult {
    w.create_element("cac:TaxSubtotal").write_inner_content(|w| {
        amount(w, "cbc:TaxableAmount", taxable)?;
        amount(w, "cbc:TaxAmount", tax)?;
        w.create_element("cac:TaxCategory").write_inner_content(|w| {
            w.create_element("cbc:ID")
                .with_attributes([("schemeAgencyID", VAT_SCHEME_AGENCY), ("schemeID", VAT_SCHEME_5305)])
                .write_text_content(BytesText::new("S"))?;
            text(w, "cbc:Percent", percent)?;
            w.create_element("cac:TaxScheme").write_inner_content(|w| {
                w.create_element("cbc:ID")
                    .with_attributes([("schemeAgencyID", VAT_SCHEME_AGENCY), ("schemeID", VAT_SCHEME_5153)])
                    .write_text_content(BytesText::new("VAT"))?;
                Ok::<(), quick_xml::Error>(())
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(())
}

fn postal_address(w: &mut XmlWriter, postal_zone: Option<&str>) -> XmlResult {
    w.create_element("cac:PostalAddress").write_inner_content(|w| {
        if let Some(zone) = postal_zone {
            text(w, "cbc:PostalZone", zone)?;
        }
        text(w, "cbc:CountrySubentityCode", COUNTRY_SUBENTITY)?;
        w.create_element("cac:Country").write_inner_content(|w| {
            text(w, "cbc:IdentificationCode", COUNTRY_CODE)
        })?;
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(())
}

fn vat_scheme(w: &mut XmlWriter) -> XmlResult {
    w.create_element("cac:TaxScheme").write_inner_content(|w| text(w, "cbc:ID", "VAT"))?;
    Ok(())
}

fn text(w: &mut XmlWriter, name: &str, value: &str) -> XmlResult {
    w.create_element(name).write_text_content(BytesText::new(value))?;
    Ok(())
}

fn amount(w: &mut XmlWriter, name: &str, value: &str) -> XmlResult {
    w.create_element(name)
        .with_attribute(("currencyID", AMOUNT_CURRENCY_ID))
        .write_text_content(BytesText::new(value))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::jofotara::payload::tests::sample_invoice;
    use crate::services::jofotara::payload::{build_payload, decode_base64, PayloadContext};
    use quick_xml::Reader;

    fn fields() -> InvoiceFields {
        let ctx = PayloadContext {
            activity_number: Some("12345".to_string()),
            seller_tax_number: None,
        };
        InvoiceFields::from_invoice(&sample_invoice(), &ctx).unwrap()
    }

    /// Text of every element matching `name`, in document order.
    fn texts_of(xml: &str, name: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut inside = false;
        let mut found = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if e.name().as_ref() == name.as_bytes() => inside = true,
                Event::End(e) if e.name().as_ref() == name.as_bytes() => inside = false,
                Event::Text(t) if inside => found.push(t.unescape().unwrap().into_owned()),
                Event::Eof => break,
                _ => {}
            }
        }
        found
    }

    /// Text of every element at exactly `path` (slash-joined from the root).
    fn texts_at(xml: &str, path: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut stack: Vec<String> = Vec::new();
        let mut found = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => {
                    stack.push(String::from_utf8(e.name().as_ref().to_vec()).unwrap())
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(t) if stack.join("/") == path => {
                    found.push(t.unescape().unwrap().into_owned())
                }
                Event::Eof => break,
                _ => {}
            }
        }
        found
    }

    #[test]
    fn test_encoded_document_reproduces_fields() {
        let ctx = PayloadContext {
            activity_number: Some("12345".to_string()),
            seller_tax_number: None,
        };
        let f = InvoiceFields::from_invoice(&sample_invoice(), &ctx).unwrap();
        let payload = build_payload(&sample_invoice(), PayloadFormat::Xml, &ctx).unwrap();
        let xml = decode_base64(&payload.encoded).unwrap();
        let at = |path: &str| texts_at(&xml, path);

        assert_eq!(at("Invoice/cbc:ProfileID"), vec![f.profile_id.clone()]);
        assert_eq!(at("Invoice/cbc:ID"), vec![f.invoice_id.clone()]);
        assert_eq!(at("Invoice/cbc:UUID"), vec![f.uuid.clone()]);
        assert_eq!(payload.invoice_uuid, f.uuid);
        assert_eq!(at("Invoice/cbc:IssueDate"), vec![f.issue_date.clone()]);
        assert_eq!(at("Invoice/cbc:InvoiceTypeCode"), vec![f.type_code.clone()]);
        assert_eq!(at("Invoice/cbc:DocumentCurrencyCode"), vec![f.currency.clone()]);

        assert_eq!(
            at("Invoice/cac:AccountingSupplierParty/cac:Party/cac:PartyTaxScheme/cbc:CompanyID"),
            vec![f.seller.tax_id.clone()]
        );
        assert_eq!(
            at("Invoice/cac:AccountingSupplierParty/cac:Party/cac:PartyLegalEntity/cbc:RegistrationName"),
            vec![f.seller.name.clone()]
        );
        assert_eq!(
            at("Invoice/cac:AccountingSupplierParty/cac:Party/cac:PostalAddress/cbc:PostalZone"),
            f.seller.postal_zone.iter().cloned().collect::<Vec<_>>()
        );
        assert_eq!(
            at("Invoice/cac:AccountingCustomerParty/cac:Party/cac:PartyIdentification/cbc:ID"),
            vec![f.buyer.tax_id.clone()]
        );
        assert_eq!(
            at("Invoice/cac:AccountingCustomerParty/cac:Party/cac:PartyLegalEntity/cbc:RegistrationName"),
            vec![f.buyer.name.clone()]
        );
        assert_eq!(
            at("Invoice/cac:SellerSupplierParty/cac:Party/cac:PartyIdentification/cbc:ID"),
            f.activity_number.iter().cloned().collect::<Vec<_>>()
        );

        let line_values = |pick: fn(&LineFields) -> String| -> Vec<String> {
            f.lines.iter().map(pick).collect()
        };
        assert_eq!(at("Invoice/cac:InvoiceLine/cbc:ID"), line_values(|l| l.id.to_string()));
        assert_eq!(
            at("Invoice/cac:InvoiceLine/cbc:InvoicedQuantity"),
            line_values(|l| l.quantity.clone())
        );
        assert_eq!(
            at("Invoice/cac:InvoiceLine/cbc:LineExtensionAmount"),
            line_values(|l| l.net_amount.clone())
        );
        assert_eq!(
            at("Invoice/cac:InvoiceLine/cac:TaxTotal/cbc:TaxAmount"),
            line_values(|l| l.vat_amount.clone())
        );
        assert_eq!(
            at("Invoice/cac:InvoiceLine/cac:TaxTotal/cac:TaxSubtotal/cbc:TaxableAmount"),
            line_values(|l| l.net_amount.clone())
        );
        assert_eq!(
            at("Invoice/cac:InvoiceLine/cac:TaxTotal/cac:TaxSubtotal/cac:TaxCategory/cbc:Percent"),
            line_values(|l| l.vat_percent.clone())
        );
        assert_eq!(at("Invoice/cac:InvoiceLine/cac:Item/cbc:Name"), line_values(|l| l.name.clone()));
        assert_eq!(
            at("Invoice/cac:InvoiceLine/cac:Price/cbc:PriceAmount"),
            line_values(|l| l.unit_price.clone())
        );
        assert_eq!(
            at("Invoice/cac:InvoiceLine/cac:Price/cac:AllowanceCharge/cbc:Amount"),
            line_values(|l| l.discount.clone())
        );

        assert_eq!(at("Invoice/cac:AllowanceCharge/cbc:Amount"), vec![f.header_discount.clone()]);
        assert_eq!(at("Invoice/cac:TaxTotal/cbc:TaxAmount"), vec![f.vat_amount.clone()]);
        assert_eq!(
            at("Invoice/cac:LegalMonetaryTotal/cbc:TaxExclusiveAmount"),
            vec![f.tax_exclusive_amount.clone()]
        );
        assert_eq!(
            at("Invoice/cac:LegalMonetaryTotal/cbc:TaxInclusiveAmount"),
            vec![f.tax_inclusive_amount.clone()]
        );
        assert_eq!(
            at("Invoice/cac:LegalMonetaryTotal/cbc:AllowanceTotalAmount"),
            vec![f.header_discount.clone()]
        );
        assert_eq!(
            at("Invoice/cac:LegalMonetaryTotal/cbc:PayableAmount"),
            vec![f.payable_amount.clone()]
        );
    }

    #[test]
    fn test_ubl_header_and_totals() {
        let xml = UblXmlSerializer.serialize(&fields()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Invoice"));
        assert!(!xml.contains("\n"));
        assert!(xml.contains(&format!("xmlns=\"{}\"", NS_INVOICE)));
        assert!(xml.contains("<cbc:InvoiceTypeCode name=\"022\">388</cbc:InvoiceTypeCode>"));
        assert!(xml.contains("<cbc:PayableAmount currencyID=\"JO\">73.000</cbc:PayableAmount>"));
        assert!(xml.contains("<cbc:CompanyID>SEL1</cbc:CompanyID>"));
        assert!(xml.contains("<cbc:ID schemeID=\"TN\">BUY1</cbc:ID>"));
        assert!(xml.contains("<cac:SellerSupplierParty>"));
        assert!(!xml.contains("BillingReference"));
        assert!(!xml.contains("PaymentMeans"));
    }

    #[test]
    fn test_element_order_follows_xsd() {
        let xml = UblXmlSerializer.serialize(&fields()).unwrap();
        let order = [
            "<cbc:ProfileID>",
            "<cbc:UUID>",
            "<cac:AdditionalDocumentReference>",
            "<cac:AccountingSupplierParty>",
            "<cac:AccountingCustomerParty>",
            "<cac:SellerSupplierParty>",
            "<cac:AllowanceCharge>",
            "<cac:LegalMonetaryTotal>",
            "<cac:InvoiceLine>",
        ];
        let positions: Vec<usize> = order.iter().map(|tag| xml.find(tag).unwrap()).collect();
        assert!(positions.windows(2).all(|p| p[0] < p[1]));
    }

    #[test]
    fn test_lines_parse_back() {
        let f = fields();
        let xml = UblXmlSerializer.serialize(&f).unwrap();

        assert_eq!(texts_of(&xml, "cbc:LineExtensionAmount"), vec!["50.000", "15.000"]);
        assert_eq!(texts_of(&xml, "cbc:Name"), vec!["Widget", "SVC-1"]);
        assert_eq!(texts_of(&xml, "cbc:UUID")[0], f.uuid);
        // RoundingAmount only on single-line invoices
        assert!(texts_of(&xml, "cbc:RoundingAmount").is_empty());
    }

    #[test]
    fn test_return_invoice_sections() {
        let mut invoice = sample_invoice();
        invoice.is_return = true;
        invoice.return_against = Some("SINV-0000".to_string());
        invoice.return_against_uuid = Some("orig-uuid".to_string());
        invoice.items.truncate(1);
        invoice.grand_total = Some(rust_decimal_macros::dec!(58));
        let f = InvoiceFields::from_invoice(&invoice, &PayloadContext::default()).unwrap();
        let xml = UblXmlSerializer.serialize(&f).unwrap();

        assert!(xml.contains("<cbc:InvoiceTypeCode name=\"022\">381</cbc:InvoiceTypeCode>"));
        assert!(xml.contains("<cac:BillingReference><cac:InvoiceDocumentReference><cbc:ID>SINV-0000</cbc:ID><cbc:UUID>orig-uuid</cbc:UUID>"));
        assert!(xml.contains("<cbc:PaymentMeansCode listID=\"UN/ECE 4461\">10</cbc:PaymentMeansCode>"));
        assert!(xml.contains("<cbc:PrepaidAmount currencyID=\"JO\">0.000</cbc:PrepaidAmount>"));
        assert_eq!(texts_of(&xml, "cbc:RoundingAmount"), vec!["58.000"]);
        // Header TaxTotal carries a subtotal on returns
        assert_eq!(texts_of(&xml, "cbc:TaxableAmount").len(), 2);
    }

    #[test]
    fn test_text_is_escaped() {
        let mut f = fields();
        f.buyer.name = "Smith & Sons <JO>".to_string();
        let xml = UblXmlSerializer.serialize(&f).unwrap();
        assert!(xml.contains("Smith &amp; Sons &lt;JO&gt;"));
        assert_eq!(texts_of(&xml, "cbc:RegistrationName")[1], "Smith & Sons <JO>");
    }
}

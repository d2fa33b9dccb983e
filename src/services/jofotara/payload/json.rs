use crate::config::PayloadFormat;

use super::{InvoiceFields, PayloadSerializer};
use crate::services::jofotara::errors::Result;

/// JSON rendering of the mapped invoice fields (camelCase keys).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl PayloadSerializer for JsonSerializer {
    fn format(&self) -> PayloadFormat {
        PayloadFormat::Json
    }

    fn serialize(&self, fields: &InvoiceFields) -> Result<String> {
        Ok(serde_json::to_string(fields)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::jofotara::payload::tests::sample_invoice;
    use crate::services::jofotara::payload::{build_payload, PayloadContext};

    #[test]
    fn test_json_payload_decodes_to_same_fields() {
        let ctx = PayloadContext::default();
        let invoice = sample_invoice();
        let expected = InvoiceFields::from_invoice(&invoice, &ctx).unwrap();

        let payload = build_payload(&invoice, PayloadFormat::Json, &ctx).unwrap();
        let decoded: InvoiceFields = serde_json::from_str(&payload.decode().unwrap()).unwrap();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_json_keys_are_camel_case() {
        let fields = InvoiceFields::from_invoice(&sample_invoice(), &PayloadContext::default()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&JsonSerializer.serialize(&fields).unwrap()).unwrap();

        assert_eq!(value["seller"]["taxId"], "SEL1");
        assert_eq!(value["buyer"]["taxId"], "BUY1");
        assert_eq!(value["payableAmount"], "73.000");
        assert_eq!(value["lines"][0]["unitCode"], "PCE");
        assert_eq!(value["typeCode"], "388");
    }
}

//! # Field Extraction Tests Module
//!
//! Extraction of invoice number, date and total from realistic recognized text.

#[cfg(test)]
mod tests {
    use docscan::field_extraction::{extract_fields, FieldMap, FieldName};

    /// Test the canonical invoice text
    #[test]
    fn test_extracts_all_three_fields() {
        let text = "ACME Supplies Ltd\n\
                    Invoice Number: INV12345\n\
                    Date: 2023-05-12\n\
                    Widgets x3     $1,000.00\n\
                    Total: $1,234.56\n";
        let fields = extract_fields(text);

        assert_eq!(fields.get(FieldName::InvoiceNumber), Some("INV12345"));
        assert_eq!(fields.get(FieldName::Date), Some("2023-05-12"));
        assert_eq!(fields.get(FieldName::Total), Some("1,234.56"));
        assert_eq!(fields.len(), 3);
    }

    /// Test missing fields are absent rather than empty
    #[test]
    fn test_missing_fields_are_absent() {
        let fields = extract_fields("Thank you for your business!");
        assert!(fields.is_empty());
        assert!(!fields.contains(FieldName::Total));
        assert_eq!(fields.get(FieldName::Date), None);
        assert_eq!(extract_fields(""), FieldMap::new());
    }

    /// Test OCR-style noise around the labels
    #[test]
    fn test_tolerates_recognition_noise() {
        let text = "invoice no.  A-2291\n\
                    Invoice Date 04/11/2022\n\
                    Subtotal 900.00\n\
                    VAT 180.00\n\
                    TOTAL DUE: € 1,080.00";
        let fields = extract_fields(text);

        assert_eq!(fields.get(FieldName::InvoiceNumber), Some("A-2291"));
        assert_eq!(fields.get(FieldName::Date), Some("04/11/2022"));
        assert_eq!(fields.get(FieldName::Total), Some("1,080.00"));
    }

    /// Test iteration order follows the field vocabulary
    #[test]
    fn test_iteration_order() {
        let fields = extract_fields("Total: 5.00\nINV-9 issued 01.01.2024");
        let names: Vec<FieldName> = fields.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![FieldName::InvoiceNumber, FieldName::Date, FieldName::Total]
        );
        assert_eq!(fields.get(FieldName::InvoiceNumber), Some("INV-9"));
    }

    /// Test the field map serializes with kebab-case names
    #[test]
    fn test_field_map_json() {
        let fields = extract_fields("Invoice #: 77\nTotal: 12.50");
        let json = serde_json::to_value(&fields).expect("serializes");
        assert_eq!(json["fields"]["invoice-number"], "77");
        assert_eq!(json["fields"]["total"], "12.50");
        assert!(json["fields"].get("date").is_none());
    }
}

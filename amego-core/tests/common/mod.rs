use amego_core::invoice::{
    InvoiceBuilder, InvoiceRecord, LineItem, LineItemFields, ProductTaxType,
    RequiredInvoiceFields,
};
use rust_decimal_macros::dec;
use std::path::PathBuf;

#[allow(dead_code)]
pub const SAMPLE_APP_KEY: &str = "sHeq7t8G1wiQvhAuIM27";
#[allow(dead_code)]
pub const SAMPLE_TIMESTAMP: i64 = 1597645574;
#[allow(dead_code)]
pub const SAMPLE_SELLER: &str = "12345678";

/// Canonical serialization of `fixtures/sample-invoice.json`.
#[allow(dead_code)]
pub const SAMPLE_CANONICAL_JSON: &str = concat!(
    r#"{"OrderId":"A20200817105934","BuyerIdentifier":"28080623","#,
    r#""BuyerName":"光貿科技有限公司","NPOBAN":"","#,
    r#""ProductItem":[{"Description":"測試商品1","Quantity":"1","UnitPrice":"170","Amount":"170","Remark":"","TaxType":"1"},"#,
    r#"{"Description":"會員折抵","Quantity":"1","UnitPrice":"-2","Amount":"-2","Remark":"","TaxType":"1"}],"#,
    r#""SalesAmount":"160","FreeTaxSalesAmount":"0","ZeroTaxSalesAmount":"0","#,
    r#""TaxType":"1","TaxRate":"0.05","TaxAmount":"8","TotalAmount":"168"}"#,
);

#[allow(dead_code)]
pub fn sample_invoice_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("sample-invoice.json")
}

#[allow(dead_code)]
pub fn sample_invoice() -> InvoiceRecord {
    let json = std::fs::read_to_string(sample_invoice_path()).expect("read sample invoice");
    InvoiceRecord::from_json(&json).expect("parse sample invoice")
}

/// The sample invoice assembled through the builder instead of the fixture.
#[allow(dead_code)]
pub fn built_sample_invoice() -> InvoiceRecord {
    InvoiceBuilder::new(RequiredInvoiceFields {
        order_id: "A20200817105934".into(),
        buyer_identifier: "28080623".into(),
        buyer_name: "光貿科技有限公司".into(),
        line_items: dummy_line_items(),
    })
    .build()
    .expect("build sample invoice")
}

#[allow(dead_code)]
pub fn dummy_line_items() -> Vec<LineItem> {
    vec![
        LineItem::new(LineItemFields {
            description: "測試商品1".into(),
            quantity: dec!(1),
            unit_price: dec!(170),
            tax_type: ProductTaxType::Taxable,
        })
        .expect("line item"),
        LineItem::new(LineItemFields {
            description: "會員折抵".into(),
            quantity: dec!(1),
            unit_price: dec!(-2),
            tax_type: ProductTaxType::Taxable,
        })
        .expect("line item"),
    ]
}

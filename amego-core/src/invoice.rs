//! Invoice domain types and builders.
//!
//! Field names and declaration order mirror the gateway's JSON schema. The
//! canonical serialization used for signing is derived from this order, so
//! reordering fields changes every signature.
mod builder;
pub mod tax;
pub mod validation;

pub use builder::{InvoiceBuilder, RequiredInvoiceFields};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

type Result<T> = std::result::Result<T, InvoiceError>;

/// Buyer identifier used for consumers without a tax id.
pub const B2C_BUYER_IDENTIFIER: &str = "0000000000";

/// Invoice-related errors.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invoice has no line items")]
    MissingLineItems,
    #[error("Invalid invoice JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown tax type code: {0}")]
    UnknownTaxType(String),
    #[error("Unknown carrier type: {0}")]
    UnknownCarrierType(String),
    #[error("Amount out of range while computing {0}")]
    AmountOverflow(&'static str),
}

/// Structured validation error with field-level issues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invoice validation failed with {} issue(s)", .issues.len())]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn has(&self, field: InvoiceField, kind: ValidationKind) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.field == field && issue.kind == kind)
    }
}

/// Single validation issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: InvoiceField,
    pub kind: ValidationKind,
    pub line_item_index: Option<usize>,
}

impl ValidationIssue {
    pub fn new(field: InvoiceField, kind: ValidationKind) -> Self {
        Self {
            field,
            kind,
            line_item_index: None,
        }
    }

    pub fn at_line(field: InvoiceField, kind: ValidationKind, index: usize) -> Self {
        Self {
            field,
            kind,
            line_item_index: Some(index),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line_item_index {
            Some(index) => write!(f, "ProductItem[{index}].{:?}: {:?}", self.field, self.kind),
            None => write!(f, "{:?}: {:?}", self.field, self.kind),
        }
    }
}

#[non_exhaustive]
/// Field associated with a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceField {
    OrderId,
    BuyerIdentifier,
    BuyerName,
    BuyerEmailAddress,
    MainRemark,
    CarrierId1,
    CarrierId2,
    Npoban,
    LineItems,
    LineItemDescription,
    LineItemQuantity,
    LineItemUnit,
    LineItemAmount,
    LineItemRemark,
    TaxRate,
    TotalAmount,
    ZeroTaxRateReason,
    AllowanceNumber,
    OriginalInvoiceNumber,
    OriginalInvoiceDate,
}

#[non_exhaustive]
/// Classification of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Missing,
    Empty,
    InvalidFormat,
    TooLong,
    OutOfRange,
    Mismatch,
}

/// Invoice-level tax type (`TaxType`).
///
/// # Examples
/// ```rust
/// use amego_core::invoice::TaxType;
///
/// assert_eq!(TaxType::Mixed.code(), "9");
/// assert_eq!("1".parse::<TaxType>()?, TaxType::Taxable);
/// # Ok::<(), amego_core::invoice::InvoiceError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxType {
    #[serde(rename = "1")]
    Taxable,
    #[serde(rename = "2")]
    ZeroRate,
    #[serde(rename = "3")]
    Exempt,
    #[serde(rename = "4")]
    SpecialRate,
    #[serde(rename = "9")]
    Mixed,
}

impl TaxType {
    pub fn code(&self) -> &'static str {
        match self {
            TaxType::Taxable => "1",
            TaxType::ZeroRate => "2",
            TaxType::Exempt => "3",
            TaxType::SpecialRate => "4",
            TaxType::Mixed => "9",
        }
    }
}

impl FromStr for TaxType {
    type Err = InvoiceError;
    fn from_str(code: &str) -> Result<Self> {
        match code.trim() {
            "1" => Ok(TaxType::Taxable),
            "2" => Ok(TaxType::ZeroRate),
            "3" => Ok(TaxType::Exempt),
            "4" => Ok(TaxType::SpecialRate),
            "9" => Ok(TaxType::Mixed),
            other => Err(InvoiceError::UnknownTaxType(other.to_string())),
        }
    }
}

/// Line-level tax type; a subset of [`TaxType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductTaxType {
    #[serde(rename = "1")]
    Taxable,
    #[serde(rename = "2")]
    ZeroRate,
    #[serde(rename = "3")]
    Exempt,
}

impl ProductTaxType {
    pub fn code(&self) -> &'static str {
        TaxType::from(*self).code()
    }
}

impl From<ProductTaxType> for TaxType {
    fn from(value: ProductTaxType) -> Self {
        match value {
            ProductTaxType::Taxable => TaxType::Taxable,
            ProductTaxType::ZeroRate => TaxType::ZeroRate,
            ProductTaxType::Exempt => TaxType::Exempt,
        }
    }
}

impl FromStr for ProductTaxType {
    type Err = InvoiceError;
    fn from_str(code: &str) -> Result<Self> {
        match code.trim() {
            "1" => Ok(ProductTaxType::Taxable),
            "2" => Ok(ProductTaxType::ZeroRate),
            "3" => Ok(ProductTaxType::Exempt),
            other => Err(InvoiceError::UnknownTaxType(other.to_string())),
        }
    }
}

/// Carrier (載具) kinds accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarrierType {
    #[serde(rename = "3J0002")]
    MobileBarcode,
    #[serde(rename = "CQ0001")]
    NaturalPersonCertificate,
    #[serde(rename = "amego")]
    Member,
}

impl CarrierType {
    pub fn code(&self) -> &'static str {
        match self {
            CarrierType::MobileBarcode => "3J0002",
            CarrierType::NaturalPersonCertificate => "CQ0001",
            CarrierType::Member => "amego",
        }
    }
}

impl FromStr for CarrierType {
    type Err = InvoiceError;
    fn from_str(code: &str) -> Result<Self> {
        match code.trim() {
            "3J0002" => Ok(CarrierType::MobileBarcode),
            "CQ0001" => Ok(CarrierType::NaturalPersonCertificate),
            "amego" => Ok(CarrierType::Member),
            other => Err(InvoiceError::UnknownCarrierType(other.to_string())),
        }
    }
}

/// Export customs marker, only meaningful for zero-rated sales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CustomsClearanceMark {
    NonCustoms,
    Customs,
}

impl TryFrom<u8> for CustomsClearanceMark {
    type Error = String;
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(CustomsClearanceMark::NonCustoms),
            2 => Ok(CustomsClearanceMark::Customs),
            other => Err(format!("invalid customs clearance mark {other}")),
        }
    }
}

impl From<CustomsClearanceMark> for u8 {
    fn from(value: CustomsClearanceMark) -> Self {
        match value {
            CustomsClearanceMark::NonCustoms => 1,
            CustomsClearanceMark::Customs => 2,
        }
    }
}

/// Whether line unit prices include tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DetailVat {
    Exclusive,
    Inclusive,
}

impl TryFrom<u8> for DetailVat {
    type Error = String;
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(DetailVat::Exclusive),
            1 => Ok(DetailVat::Inclusive),
            other => Err(format!("invalid detail vat flag {other}")),
        }
    }
}

impl From<DetailVat> for u8 {
    fn from(value: DetailVat) -> Self {
        match value {
            DetailVat::Exclusive => 0,
            DetailVat::Inclusive => 1,
        }
    }
}

/// How the gateway treats line amounts: seven decimal places, or whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DetailAmountRound {
    Precise,
    Whole,
}

impl TryFrom<u8> for DetailAmountRound {
    type Error = String;
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(DetailAmountRound::Precise),
            1 => Ok(DetailAmountRound::Whole),
            other => Err(format!("invalid detail amount rounding {other}")),
        }
    }
}

impl From<DetailAmountRound> for u8 {
    fn from(value: DetailAmountRound) -> Self {
        match value {
            DetailAmountRound::Precise => 0,
            DetailAmountRound::Whole => 1,
        }
    }
}

/// Text encoding for thermal printer output (`PrinterLang`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PrinterEncoding {
    Big5,
    Gbk,
    Utf8,
}

impl TryFrom<u8> for PrinterEncoding {
    type Error = String;
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(PrinterEncoding::Big5),
            2 => Ok(PrinterEncoding::Gbk),
            3 => Ok(PrinterEncoding::Utf8),
            other => Err(format!("invalid printer encoding {other}")),
        }
    }
}

impl From<PrinterEncoding> for u8 {
    fn from(value: PrinterEncoding) -> Self {
        match value {
            PrinterEncoding::Big5 => 1,
            PrinterEncoding::Gbk => 2,
            PrinterEncoding::Utf8 => 3,
        }
    }
}

impl FromStr for PrinterEncoding {
    type Err = String;
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BIG5" | "1" => Ok(PrinterEncoding::Big5),
            "GBK" | "2" => Ok(PrinterEncoding::Gbk),
            "UTF-8" | "UTF8" | "3" => Ok(PrinterEncoding::Utf8),
            other => Err(format!("unknown printer encoding {other:?}")),
        }
    }
}

/// Whether printed invoices include the line detail (`PrintDetail`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PrintDetail {
    Omit,
    Print,
}

impl TryFrom<u8> for PrintDetail {
    type Error = String;
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(PrintDetail::Omit),
            1 => Ok(PrintDetail::Print),
            other => Err(format!("invalid print detail flag {other}")),
        }
    }
}

impl From<PrintDetail> for u8 {
    fn from(value: PrintDetail) -> Self {
        match value {
            PrintDetail::Omit => 0,
            PrintDetail::Print => 1,
        }
    }
}

/// Single invoice line item (`ProductItem`).
///
/// # Examples
/// ```rust
/// use amego_core::invoice::{LineItem, LineItemFields, ProductTaxType};
/// use rust_decimal::Decimal;
///
/// let item = LineItem::new(LineItemFields {
///     description: "Item".into(),
///     quantity: Decimal::from(2),
///     unit_price: Decimal::from(50),
///     tax_type: ProductTaxType::Taxable,
/// })?;
/// assert_eq!(item.amount(), Decimal::from(100));
/// # Ok::<(), amego_core::invoice::InvoiceError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct LineItem {
    description: String,
    quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    unit_price: Decimal,
    amount: Decimal,
    #[serde(default)]
    remark: String,
    tax_type: ProductTaxType,
}

/// Fields for creating a line item with a computed amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemFields {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_type: ProductTaxType,
}

/// Fields for creating a line item with a provided amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemPartsFields {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub tax_type: ProductTaxType,
}

impl LineItem {
    /// Create a line item with `Amount = Quantity × UnitPrice`.
    ///
    /// # Errors
    /// Returns [`InvoiceError::AmountOverflow`] if the product is not representable.
    pub fn new(fields: LineItemFields) -> Result<Self> {
        let amount = tax::calculate_item_amount(fields.quantity, fields.unit_price)?;
        Ok(Self {
            description: fields.description,
            quantity: fields.quantity,
            unit: None,
            unit_price: fields.unit_price,
            amount,
            remark: String::new(),
            tax_type: fields.tax_type,
        })
    }

    /// Create a line item from a caller-supplied amount.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if the amount differs from quantity × unit price,
    /// or the product is out of range.
    pub fn from_parts(fields: LineItemPartsFields) -> std::result::Result<Self, ValidationError> {
        let kind = match validation::amount_matches(fields.quantity, fields.unit_price, fields.amount) {
            Some(true) => None,
            Some(false) => Some(ValidationKind::Mismatch),
            None => Some(ValidationKind::OutOfRange),
        };
        if let Some(kind) = kind {
            return Err(ValidationError::new(vec![ValidationIssue::new(
                InvoiceField::LineItemAmount,
                kind,
            )]));
        }
        Ok(Self {
            description: fields.description,
            quantity: fields.quantity,
            unit: None,
            unit_price: fields.unit_price,
            amount: fields.amount,
            remark: String::new(),
            tax_type: fields.tax_type,
        })
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn remark(&self) -> &str {
        &self.remark
    }

    pub fn tax_type(&self) -> ProductTaxType {
        self.tax_type
    }
}

/// Complete invoice payload for the issue endpoint.
///
/// Records are produced by [`InvoiceBuilder`] (totals computed) or parsed from
/// JSON with [`InvoiceRecord::from_json`] (totals taken as given). Nothing
/// mutates a record once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct InvoiceRecord {
    order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    track_api_code: Option<String>,
    buyer_identifier: String,
    buyer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buyer_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buyer_telephone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buyer_email_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    main_remark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    carrier_type: Option<CarrierType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    carrier_id1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    carrier_id2: Option<String>,
    #[serde(rename = "NPOBAN", default)]
    npoban: String,
    #[serde(rename = "ProductItem")]
    line_items: Vec<LineItem>,
    sales_amount: Decimal,
    free_tax_sales_amount: Decimal,
    zero_tax_sales_amount: Decimal,
    tax_type: TaxType,
    tax_rate: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    customs_clearance_mark: Option<CustomsClearanceMark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zero_tax_rate_reason: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    brand_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail_vat: Option<DetailVat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail_amount_round: Option<DetailAmountRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    printer_type: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    printer_lang: Option<PrinterEncoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    print_detail: Option<PrintDetail>,
}

impl InvoiceRecord {
    /// Parse a record from gateway-shaped JSON without recomputing totals.
    ///
    /// # Errors
    /// Returns [`InvoiceError::Json`] if the document does not match the schema,
    /// or [`InvoiceError::MissingLineItems`] for an empty `ProductItem` list.
    pub fn from_json(json: &str) -> Result<Self> {
        let record: InvoiceRecord = serde_json::from_str(json)?;
        if record.line_items.is_empty() {
            return Err(InvoiceError::MissingLineItems);
        }
        Ok(record)
    }

    /// Run the field and arithmetic checks from [`validation::validate_invoice`].
    ///
    /// # Errors
    /// Returns [`ValidationError`] listing every issue found.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        validation::validate_invoice(self)
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn track_api_code(&self) -> Option<&str> {
        self.track_api_code.as_deref()
    }

    pub fn buyer_identifier(&self) -> &str {
        &self.buyer_identifier
    }

    pub fn buyer_name(&self) -> &str {
        &self.buyer_name
    }

    pub fn buyer_address(&self) -> Option<&str> {
        self.buyer_address.as_deref()
    }

    pub fn buyer_telephone_number(&self) -> Option<&str> {
        self.buyer_telephone_number.as_deref()
    }

    pub fn buyer_email_address(&self) -> Option<&str> {
        self.buyer_email_address.as_deref()
    }

    pub fn main_remark(&self) -> Option<&str> {
        self.main_remark.as_deref()
    }

    pub fn carrier_type(&self) -> Option<CarrierType> {
        self.carrier_type
    }

    pub fn carrier_id1(&self) -> Option<&str> {
        self.carrier_id1.as_deref()
    }

    pub fn carrier_id2(&self) -> Option<&str> {
        self.carrier_id2.as_deref()
    }

    pub fn npoban(&self) -> &str {
        &self.npoban
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn sales_amount(&self) -> Decimal {
        self.sales_amount
    }

    pub fn free_tax_sales_amount(&self) -> Decimal {
        self.free_tax_sales_amount
    }

    pub fn zero_tax_sales_amount(&self) -> Decimal {
        self.zero_tax_sales_amount
    }

    pub fn tax_type(&self) -> TaxType {
        self.tax_type
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn tax_amount(&self) -> Decimal {
        self.tax_amount
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn customs_clearance_mark(&self) -> Option<CustomsClearanceMark> {
        self.customs_clearance_mark
    }

    pub fn zero_tax_rate_reason(&self) -> Option<u8> {
        self.zero_tax_rate_reason
    }

    pub fn brand_name(&self) -> Option<&str> {
        self.brand_name.as_deref()
    }

    pub fn detail_vat(&self) -> Option<DetailVat> {
        self.detail_vat
    }

    pub fn detail_amount_round(&self) -> Option<DetailAmountRound> {
        self.detail_amount_round
    }

    /// Thermal printer model code, when the gateway should print the invoice.
    pub fn printer_type(&self) -> Option<u32> {
        self.printer_type
    }

    pub fn printer_lang(&self) -> Option<PrinterEncoding> {
        self.printer_lang
    }

    pub fn print_detail(&self) -> Option<PrintDetail> {
        self.print_detail
    }

    pub fn is_b2c(&self) -> bool {
        self.buyer_identifier == B2C_BUYER_IDENTIFIER
    }
}

//! Field-level checks for invoice records and carrier identifiers.
use super::{
    tax::round_half_up, CarrierType, DetailAmountRound, InvoiceField, InvoiceRecord, LineItem, ValidationError, ValidationIssue,
    ValidationKind, B2C_BUYER_IDENTIFIER,
};
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;

pub const MAX_ORDER_ID_CHARS: usize = 40;
pub const MAX_MAIN_REMARK_CHARS: usize = 200;
pub const MAX_LINE_ITEMS: usize = 9999;
pub const MAX_DESCRIPTION_CHARS: usize = 256;
pub const MAX_UNIT_CHARS: usize = 6;
pub const MAX_REMARK_CHARS: usize = 40;

/// Allowed difference between `Amount` and `Quantity × UnitPrice`.
const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 7);

static TAX_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{8}$").expect("tax id regex"));
static MOBILE_BARCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[0-9A-Z+\-.]{7}$").expect("barcode regex"));
static NATURAL_PERSON_CERT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}\d{14}$").expect("certificate regex"));
static DONATION_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3,7}$").expect("donation regex"));
static INVOICE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}\d{8}$").expect("invoice number regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

/// Eight-digit business tax id (統一編號).
pub fn is_valid_tax_id(value: &str) -> bool {
    TAX_ID.is_match(value)
}

/// Buyer identifier: a business tax id or the consumer placeholder.
pub fn is_valid_buyer_identifier(value: &str) -> bool {
    value == B2C_BUYER_IDENTIFIER || is_valid_tax_id(value)
}

/// Mobile barcode carrier, `/` followed by seven of `0-9 A-Z + - .`.
pub fn is_valid_mobile_barcode(value: &str) -> bool {
    MOBILE_BARCODE.is_match(value)
}

/// Natural-person certificate carrier, two capitals and fourteen digits.
pub fn is_valid_natural_person_cert(value: &str) -> bool {
    NATURAL_PERSON_CERT.is_match(value)
}

/// Issued invoice number, two capitals and eight digits.
pub fn is_valid_invoice_number(value: &str) -> bool {
    INVOICE_NUMBER.is_match(value)
}

/// Donation code (NPOBAN), three to seven digits.
pub fn is_valid_donation_code(value: &str) -> bool {
    DONATION_CODE.is_match(value)
}

/// `None` when `quantity × unit_price` or the difference is out of range.
pub(crate) fn amount_matches(quantity: Decimal, unit_price: Decimal, amount: Decimal) -> Option<bool> {
    let difference = quantity.checked_mul(unit_price)?.checked_sub(amount)?;
    Some(difference.abs() <= AMOUNT_TOLERANCE)
}

/// Like [`amount_matches`], also accepting the whole-unit rounding the
/// gateway applies under [`DetailAmountRound::Whole`].
fn amount_matches_rounded(item: &LineItem, rounding: Option<DetailAmountRound>) -> Option<bool> {
    let precise = amount_matches(item.quantity(), item.unit_price(), item.amount())?;
    if precise || rounding != Some(DetailAmountRound::Whole) {
        return Some(precise);
    }
    let product = item.quantity().checked_mul(item.unit_price())?;
    Some(round_half_up(product, 0)? == item.amount())
}

/// Check a single line item; `index` is recorded on every issue.
pub fn validate_line_item(item: &LineItem, index: usize) -> Vec<ValidationIssue> {
    check_line_item(item, index, None)
}

fn check_line_item(
    item: &LineItem,
    index: usize,
    rounding: Option<DetailAmountRound>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let description_len = item.description().chars().count();
    if description_len == 0 {
        issues.push(ValidationIssue::at_line(
            InvoiceField::LineItemDescription,
            ValidationKind::Empty,
            index,
        ));
    } else if description_len > MAX_DESCRIPTION_CHARS {
        issues.push(ValidationIssue::at_line(
            InvoiceField::LineItemDescription,
            ValidationKind::TooLong,
            index,
        ));
    }
    if item.quantity() <= Decimal::ZERO {
        issues.push(ValidationIssue::at_line(
            InvoiceField::LineItemQuantity,
            ValidationKind::OutOfRange,
            index,
        ));
    }
    if item
        .unit()
        .is_some_and(|unit| unit.chars().count() > MAX_UNIT_CHARS)
    {
        issues.push(ValidationIssue::at_line(
            InvoiceField::LineItemUnit,
            ValidationKind::TooLong,
            index,
        ));
    }
    if item.remark().chars().count() > MAX_REMARK_CHARS {
        issues.push(ValidationIssue::at_line(
            InvoiceField::LineItemRemark,
            ValidationKind::TooLong,
            index,
        ));
    }
    match amount_matches_rounded(item, rounding) {
        Some(true) => {}
        Some(false) => issues.push(ValidationIssue::at_line(
            InvoiceField::LineItemAmount,
            ValidationKind::Mismatch,
            index,
        )),
        None => issues.push(ValidationIssue::at_line(
            InvoiceField::LineItemAmount,
            ValidationKind::OutOfRange,
            index,
        )),
    }
    issues
}

/// Validate an invoice record, collecting every issue rather than stopping at
/// the first.
///
/// # Errors
/// Returns [`ValidationError`] when any check fails.
pub fn validate_invoice(invoice: &InvoiceRecord) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    let order_id_len = invoice.order_id().chars().count();
    if order_id_len == 0 {
        issues.push(ValidationIssue::new(InvoiceField::OrderId, ValidationKind::Empty));
    } else if order_id_len > MAX_ORDER_ID_CHARS {
        issues.push(ValidationIssue::new(InvoiceField::OrderId, ValidationKind::TooLong));
    }

    if !is_valid_buyer_identifier(invoice.buyer_identifier()) {
        issues.push(ValidationIssue::new(
            InvoiceField::BuyerIdentifier,
            ValidationKind::InvalidFormat,
        ));
    }
    if invoice.buyer_name().trim().is_empty() {
        issues.push(ValidationIssue::new(InvoiceField::BuyerName, ValidationKind::Empty));
    }
    if invoice
        .buyer_email_address()
        .is_some_and(|email| !email.is_empty() && !EMAIL.is_match(email))
    {
        issues.push(ValidationIssue::new(
            InvoiceField::BuyerEmailAddress,
            ValidationKind::InvalidFormat,
        ));
    }
    if invoice
        .main_remark()
        .is_some_and(|remark| remark.chars().count() > MAX_MAIN_REMARK_CHARS)
    {
        issues.push(ValidationIssue::new(InvoiceField::MainRemark, ValidationKind::TooLong));
    }
    if !invoice.npoban().is_empty() && !is_valid_donation_code(invoice.npoban()) {
        issues.push(ValidationIssue::new(InvoiceField::Npoban, ValidationKind::InvalidFormat));
    }

    validate_carrier(invoice, &mut issues);

    if invoice
        .zero_tax_rate_reason()
        .is_some_and(|reason| !(71..=79).contains(&reason))
    {
        issues.push(ValidationIssue::new(
            InvoiceField::ZeroTaxRateReason,
            ValidationKind::OutOfRange,
        ));
    }
    if invoice.tax_rate() < Decimal::ZERO || invoice.tax_rate() >= Decimal::ONE {
        issues.push(ValidationIssue::new(InvoiceField::TaxRate, ValidationKind::OutOfRange));
    }

    let items = invoice.line_items();
    if items.is_empty() {
        issues.push(ValidationIssue::new(InvoiceField::LineItems, ValidationKind::Missing));
    } else if items.len() > MAX_LINE_ITEMS {
        issues.push(ValidationIssue::new(InvoiceField::LineItems, ValidationKind::OutOfRange));
    }
    for (index, item) in items.iter().enumerate() {
        issues.extend(check_line_item(item, index, invoice.detail_amount_round()));
    }

    let expected_total = [
        invoice.free_tax_sales_amount(),
        invoice.zero_tax_sales_amount(),
        invoice.tax_amount(),
    ]
    .into_iter()
    .try_fold(invoice.sales_amount(), Decimal::checked_add);
    match expected_total {
        Some(total) if total == invoice.total_amount() => {}
        Some(_) => {
            issues.push(ValidationIssue::new(InvoiceField::TotalAmount, ValidationKind::Mismatch))
        }
        None => issues.push(ValidationIssue::new(
            InvoiceField::TotalAmount,
            ValidationKind::OutOfRange,
        )),
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(issues))
    }
}

fn validate_carrier(invoice: &InvoiceRecord, issues: &mut Vec<ValidationIssue>) {
    let Some(carrier) = invoice.carrier_type() else {
        return;
    };
    let id1 = invoice.carrier_id1().unwrap_or_default();
    let id2 = invoice.carrier_id2().unwrap_or_default();
    if id1.is_empty() {
        issues.push(ValidationIssue::new(InvoiceField::CarrierId1, ValidationKind::Missing));
    }
    if id2.is_empty() {
        issues.push(ValidationIssue::new(InvoiceField::CarrierId2, ValidationKind::Missing));
    }

    let well_formed: fn(&str) -> bool = match carrier {
        CarrierType::MobileBarcode => is_valid_mobile_barcode,
        CarrierType::NaturalPersonCertificate => is_valid_natural_person_cert,
        CarrierType::Member => return,
    };
    if !id1.is_empty() && !well_formed(id1) {
        issues.push(ValidationIssue::new(
            InvoiceField::CarrierId1,
            ValidationKind::InvalidFormat,
        ));
    }
    if !id2.is_empty() && !well_formed(id2) {
        issues.push(ValidationIssue::new(
            InvoiceField::CarrierId2,
            ValidationKind::InvalidFormat,
        ));
    }
}

//! Invoice amount calculation.
//!
//! Amounts are summed per product tax type and rounded to whole dollars
//! (halves toward positive infinity). For buyers with a tax id the taxable sum is split
//! into net sales and tax; consumer invoices carry no separate tax amount.
use super::{InvoiceError, LineItem, ProductTaxType, TaxType};
use rust_decimal::Decimal;
use serde::Serialize;

/// Standard business tax rate (5%).
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Line amounts keep at most seven decimal places.
const ITEM_AMOUNT_PLACES: u32 = 7;

const HALF: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Options for [`calculate_amounts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountOptions {
    pub buyer_has_tax_id: bool,
    pub tax_rate: Decimal,
    /// Line amounts exclude tax and tax is added on top.
    pub price_exclusive: bool,
}

impl Default for AmountOptions {
    fn default() -> Self {
        Self {
            buyer_has_tax_id: false,
            tax_rate: DEFAULT_TAX_RATE,
            price_exclusive: false,
        }
    }
}

/// Totals derived from a set of line items, serialized with the record's
/// field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceAmounts {
    pub sales_amount: Decimal,
    pub free_tax_sales_amount: Decimal,
    pub zero_tax_sales_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub tax_type: TaxType,
}

/// Compute invoice totals for `items`.
///
/// # Errors
/// Returns [`InvoiceError::AmountOverflow`] when a sum or the tax split leaves
/// the representable range.
///
/// # Examples
/// ```rust
/// use amego_core::invoice::tax::{calculate_amounts, AmountOptions};
/// use amego_core::invoice::{LineItem, LineItemFields, ProductTaxType};
/// use rust_decimal::Decimal;
///
/// let items = vec![LineItem::new(LineItemFields {
///     description: "Tea".into(),
///     quantity: Decimal::ONE,
///     unit_price: Decimal::from(105),
///     tax_type: ProductTaxType::Taxable,
/// })?];
/// let options = AmountOptions { buyer_has_tax_id: true, ..AmountOptions::default() };
/// let amounts = calculate_amounts(&items, &options)?;
/// assert_eq!(amounts.sales_amount, Decimal::from(100));
/// assert_eq!(amounts.tax_amount, Decimal::from(5));
/// # Ok::<(), amego_core::invoice::InvoiceError>(())
/// ```
pub fn calculate_amounts(
    items: &[LineItem],
    options: &AmountOptions,
) -> Result<InvoiceAmounts, InvoiceError> {
    let mut taxable = Decimal::ZERO;
    let mut zero_rated = Decimal::ZERO;
    let mut exempt = Decimal::ZERO;

    for item in items {
        let bucket = match item.tax_type() {
            ProductTaxType::Taxable => &mut taxable,
            ProductTaxType::ZeroRate => &mut zero_rated,
            ProductTaxType::Exempt => &mut exempt,
        };
        *bucket = bucket
            .checked_add(item.amount())
            .ok_or(InvoiceError::AmountOverflow("line item sum"))?;
    }

    let mut sales_amount = round_whole(taxable)?;
    let free_tax_sales_amount = round_whole(exempt)?;
    let zero_tax_sales_amount = round_whole(zero_rated)?;
    let mut tax_amount = Decimal::ZERO;

    if options.buyer_has_tax_id && sales_amount > Decimal::ZERO {
        if options.price_exclusive {
            let tax = sales_amount
                .checked_mul(options.tax_rate)
                .ok_or(InvoiceError::AmountOverflow("tax amount"))?;
            tax_amount = round_whole(tax)?;
        } else {
            let divisor = Decimal::ONE
                .checked_add(options.tax_rate)
                .ok_or(InvoiceError::AmountOverflow("tax rate"))?;
            let net = sales_amount
                .checked_div(divisor)
                .ok_or(InvoiceError::AmountOverflow("net sales"))?;
            let net = round_whole(net)?;
            tax_amount = sales_amount
                .checked_sub(net)
                .ok_or(InvoiceError::AmountOverflow("tax amount"))?;
            sales_amount = net;
        }
    }

    let total_amount = [free_tax_sales_amount, zero_tax_sales_amount, tax_amount]
        .into_iter()
        .try_fold(sales_amount, Decimal::checked_add)
        .ok_or(InvoiceError::AmountOverflow("total amount"))?;

    Ok(InvoiceAmounts {
        sales_amount: sales_amount.normalize(),
        free_tax_sales_amount: free_tax_sales_amount.normalize(),
        zero_tax_sales_amount: zero_tax_sales_amount.normalize(),
        tax_amount: tax_amount.normalize(),
        total_amount: total_amount.normalize(),
        tax_type: determine_tax_type(items),
    })
}

/// Invoice tax type: the single product tax type in use, otherwise mixed.
pub fn determine_tax_type(items: &[LineItem]) -> TaxType {
    let Some(first) = items.first().map(LineItem::tax_type) else {
        return TaxType::Taxable;
    };
    if items.iter().all(|item| item.tax_type() == first) {
        first.into()
    } else {
        TaxType::Mixed
    }
}

/// `quantity × unit_price`, kept to seven decimal places.
///
/// # Errors
/// Returns [`InvoiceError::AmountOverflow`] if the product is not representable.
pub fn calculate_item_amount(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, InvoiceError> {
    quantity
        .checked_mul(unit_price)
        .and_then(|amount| round_half_up(amount, ITEM_AMOUNT_PLACES))
        .map(|amount| amount.normalize())
        .ok_or(InvoiceError::AmountOverflow("line item amount"))
}

/// Tax-inclusive amount to tax-exclusive. `None` on overflow.
pub fn to_exclusive(inclusive_amount: Decimal, tax_rate: Decimal) -> Option<Decimal> {
    inclusive_amount.checked_div(Decimal::ONE.checked_add(tax_rate)?)
}

/// Tax-exclusive amount to tax-inclusive. `None` on overflow.
pub fn to_inclusive(exclusive_amount: Decimal, tax_rate: Decimal) -> Option<Decimal> {
    exclusive_amount.checked_mul(Decimal::ONE.checked_add(tax_rate)?)
}

/// True when `buyer_identifier` is an 8-digit business tax id.
pub fn buyer_has_tax_id(buyer_identifier: &str) -> bool {
    buyer_identifier.len() == 8 && buyer_identifier.bytes().all(|b| b.is_ascii_digit())
}

/// Round to `places` decimals with halves going toward positive infinity,
/// so `-2.5` becomes `-2` and `2.5` becomes `3`.
pub(crate) fn round_half_up(value: Decimal, places: u32) -> Option<Decimal> {
    if value.scale() <= places {
        return Some(value);
    }
    let scale = Decimal::from(10_u64.checked_pow(places)?);
    value
        .checked_mul(scale)?
        .checked_add(HALF)?
        .floor()
        .checked_div(scale)
}

fn round_whole(value: Decimal) -> Result<Decimal, InvoiceError> {
    round_half_up(value, 0).ok_or(InvoiceError::AmountOverflow("rounding"))
}

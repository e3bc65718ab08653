use super::{
    CarrierType, CustomsClearanceMark, DetailAmountRound, DetailVat, InvoiceError, InvoiceRecord,
    LineItem, PrintDetail, PrinterEncoding,
    tax::{self, AmountOptions},
};
use rust_decimal::Decimal;

/// Fields every invoice needs before totals can be computed.
#[derive(Debug, Clone)]
pub struct RequiredInvoiceFields {
    pub order_id: String,
    pub buyer_identifier: String,
    pub buyer_name: String,
    pub line_items: Vec<LineItem>,
}

/// Builds an [`InvoiceRecord`] whose totals are derived from its line items.
///
/// # Examples
/// ```rust
/// use amego_core::invoice::{
///     InvoiceBuilder, LineItem, LineItemFields, ProductTaxType, RequiredInvoiceFields,
/// };
/// use rust_decimal::Decimal;
///
/// let invoice = InvoiceBuilder::new(RequiredInvoiceFields {
///     order_id: "A0001".into(),
///     buyer_identifier: "0000000000".into(),
///     buyer_name: "Guest".into(),
///     line_items: vec![LineItem::new(LineItemFields {
///         description: "Tea".into(),
///         quantity: Decimal::ONE,
///         unit_price: Decimal::from(60),
///         tax_type: ProductTaxType::Taxable,
///     })?],
/// })
/// .build()?;
/// assert_eq!(invoice.total_amount(), Decimal::from(60));
/// # Ok::<(), amego_core::invoice::InvoiceError>(())
/// ```
pub struct InvoiceBuilder {
    invoice: InvoiceRecord,
    price_exclusive: bool,
}

impl InvoiceBuilder {
    pub fn new(fields: RequiredInvoiceFields) -> Self {
        Self {
            invoice: InvoiceRecord {
                order_id: fields.order_id,
                track_api_code: None,
                buyer_identifier: fields.buyer_identifier,
                buyer_name: fields.buyer_name,
                buyer_address: None,
                buyer_telephone_number: None,
                buyer_email_address: None,
                main_remark: None,
                carrier_type: None,
                carrier_id1: None,
                carrier_id2: None,
                npoban: String::new(),
                line_items: fields.line_items,
                sales_amount: Decimal::ZERO,
                free_tax_sales_amount: Decimal::ZERO,
                zero_tax_sales_amount: Decimal::ZERO,
                tax_type: super::TaxType::Taxable,
                tax_rate: tax::DEFAULT_TAX_RATE,
                tax_amount: Decimal::ZERO,
                total_amount: Decimal::ZERO,
                customs_clearance_mark: None,
                zero_tax_rate_reason: None,
                brand_name: None,
                detail_vat: None,
                detail_amount_round: None,
                printer_type: None,
                printer_lang: None,
                print_detail: None,
            },
            price_exclusive: false,
        }
    }

    pub fn tax_rate(mut self, rate: Decimal) -> Self {
        self.invoice.tax_rate = rate;
        self
    }

    /// Treat line amounts as tax-exclusive; tax is added on top.
    pub fn price_exclusive(mut self, exclusive: bool) -> Self {
        self.price_exclusive = exclusive;
        self
    }

    pub fn track_api_code(mut self, code: impl Into<String>) -> Self {
        self.invoice.track_api_code = Some(code.into());
        self
    }

    pub fn buyer_address(mut self, address: impl Into<String>) -> Self {
        self.invoice.buyer_address = Some(address.into());
        self
    }

    pub fn buyer_telephone_number(mut self, phone: impl Into<String>) -> Self {
        self.invoice.buyer_telephone_number = Some(phone.into());
        self
    }

    pub fn buyer_email_address(mut self, email: impl Into<String>) -> Self {
        self.invoice.buyer_email_address = Some(email.into());
        self
    }

    pub fn main_remark(mut self, remark: impl Into<String>) -> Self {
        self.invoice.main_remark = Some(remark.into());
        self
    }

    pub fn carrier(
        mut self,
        carrier_type: CarrierType,
        id1: impl Into<String>,
        id2: impl Into<String>,
    ) -> Self {
        self.invoice.carrier_type = Some(carrier_type);
        self.invoice.carrier_id1 = Some(id1.into());
        self.invoice.carrier_id2 = Some(id2.into());
        self
    }

    pub fn npoban(mut self, code: impl Into<String>) -> Self {
        self.invoice.npoban = code.into();
        self
    }

    pub fn customs_clearance_mark(mut self, mark: CustomsClearanceMark) -> Self {
        self.invoice.customs_clearance_mark = Some(mark);
        self
    }

    pub fn zero_tax_rate_reason(mut self, reason: u8) -> Self {
        self.invoice.zero_tax_rate_reason = Some(reason);
        self
    }

    pub fn brand_name(mut self, name: impl Into<String>) -> Self {
        self.invoice.brand_name = Some(name.into());
        self
    }

    pub fn detail_amount_round(mut self, rounding: DetailAmountRound) -> Self {
        self.invoice.detail_amount_round = Some(rounding);
        self
    }

    /// Ask the gateway to render the invoice for a thermal printer model.
    pub fn printer(mut self, printer_type: u32, encoding: PrinterEncoding) -> Self {
        self.invoice.printer_type = Some(printer_type);
        self.invoice.printer_lang = Some(encoding);
        self
    }

    pub fn print_detail(mut self, print_detail: PrintDetail) -> Self {
        self.invoice.print_detail = Some(print_detail);
        self
    }

    /// Compute totals, then validate the finished record.
    ///
    /// # Errors
    /// Returns [`InvoiceError::MissingLineItems`] for an empty item list,
    /// [`InvoiceError::AmountOverflow`] when totals leave the decimal range, or
    /// [`InvoiceError::Validation`] listing every failed check.
    pub fn build(mut self) -> Result<InvoiceRecord, InvoiceError> {
        if self.invoice.line_items.is_empty() {
            return Err(InvoiceError::MissingLineItems);
        }

        let options = AmountOptions {
            buyer_has_tax_id: tax::buyer_has_tax_id(&self.invoice.buyer_identifier),
            tax_rate: self.invoice.tax_rate,
            price_exclusive: self.price_exclusive,
        };
        let amounts = tax::calculate_amounts(&self.invoice.line_items, &options)?;
        self.invoice.sales_amount = amounts.sales_amount;
        self.invoice.free_tax_sales_amount = amounts.free_tax_sales_amount;
        self.invoice.zero_tax_sales_amount = amounts.zero_tax_sales_amount;
        self.invoice.tax_amount = amounts.tax_amount;
        self.invoice.total_amount = amounts.total_amount;
        self.invoice.tax_type = amounts.tax_type;
        if self.price_exclusive {
            self.invoice.detail_vat = Some(DetailVat::Exclusive);
        }

        self.invoice.validate()?;
        Ok(self.invoice)
    }
}

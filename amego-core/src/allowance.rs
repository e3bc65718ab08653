//! Allowance (折讓) documents issued against earlier invoices.
//!
//! Like [`InvoiceRecord`](crate::invoice::InvoiceRecord), field order is the
//! wire order and unknown keys are rejected so the signed payload always
//! carries every field the caller supplied.
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::invoice::{
    InvoiceError, InvoiceField, ProductTaxType, ValidationError, ValidationIssue, ValidationKind,
    validation,
};

/// One returned or discounted line, referencing the invoice it reduces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct AllowanceItem {
    original_invoice_number: String,
    original_invoice_date: String,
    original_description: String,
    quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    unit_price: Decimal,
    amount: Decimal,
    tax: ProductTaxType,
}

/// Fields for [`AllowanceItem::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceItemFields {
    pub original_invoice_number: String,
    pub original_invoice_date: String,
    pub original_description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax: ProductTaxType,
}

impl AllowanceItem {
    /// # Errors
    /// Returns [`InvoiceError::AmountOverflow`] if `quantity × unit_price` is not representable.
    pub fn new(fields: AllowanceItemFields) -> Result<Self, InvoiceError> {
        let amount = crate::invoice::tax::calculate_item_amount(fields.quantity, fields.unit_price)?;
        Ok(Self {
            original_invoice_number: fields.original_invoice_number,
            original_invoice_date: fields.original_invoice_date,
            original_description: fields.original_description,
            quantity: fields.quantity,
            unit: None,
            unit_price: fields.unit_price,
            amount,
            tax: fields.tax,
        })
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn original_invoice_number(&self) -> &str {
        &self.original_invoice_number
    }

    pub fn original_invoice_date(&self) -> &str {
        &self.original_invoice_date
    }

    pub fn original_description(&self) -> &str {
        &self.original_description
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

    pub fn tax(&self) -> ProductTaxType {
        self.tax
    }
}

/// Required fields for [`AllowanceRecord::new`].
#[derive(Debug, Clone)]
pub struct AllowanceFields {
    pub allowance_number: String,
    pub allowance_date: NaiveDate,
    pub buyer_identifier: String,
    pub buyer_name: String,
    pub items: Vec<AllowanceItem>,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Payload for `json/g0401`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct AllowanceRecord {
    allowance_number: String,
    allowance_date: NaiveDate,
    buyer_identifier: String,
    buyer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buyer_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buyer_telephone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buyer_email_address: Option<String>,
    #[serde(rename = "ProductItem")]
    items: Vec<AllowanceItem>,
    tax_amount: Decimal,
    total_amount: Decimal,
}

impl AllowanceRecord {
    /// # Errors
    /// Returns [`InvoiceError::MissingLineItems`] for an empty item list, or
    /// [`InvoiceError::Validation`] when a field check fails.
    pub fn new(fields: AllowanceFields) -> Result<Self, InvoiceError> {
        let record = Self {
            allowance_number: fields.allowance_number,
            allowance_date: fields.allowance_date,
            buyer_identifier: fields.buyer_identifier,
            buyer_name: fields.buyer_name,
            buyer_address: None,
            buyer_telephone_number: None,
            buyer_email_address: None,
            items: fields.items,
            tax_amount: fields.tax_amount,
            total_amount: fields.total_amount,
        };
        if record.items.is_empty() {
            return Err(InvoiceError::MissingLineItems);
        }
        record.validate()?;
        Ok(record)
    }

    /// Parse an allowance as given, without validating it.
    ///
    /// # Errors
    /// Returns [`InvoiceError::Json`] for schema violations or unknown keys, or
    /// [`InvoiceError::MissingLineItems`] for an empty `ProductItem` list.
    pub fn from_json(json: &str) -> Result<Self, InvoiceError> {
        let record: AllowanceRecord = serde_json::from_str(json)?;
        if record.items.is_empty() {
            return Err(InvoiceError::MissingLineItems);
        }
        Ok(record)
    }

    pub fn with_buyer_address(mut self, address: impl Into<String>) -> Self {
        self.buyer_address = Some(address.into());
        self
    }

    pub fn with_buyer_telephone_number(mut self, phone: impl Into<String>) -> Self {
        self.buyer_telephone_number = Some(phone.into());
        self
    }

    pub fn with_buyer_email_address(mut self, email: impl Into<String>) -> Self {
        self.buyer_email_address = Some(email.into());
        self
    }

    /// # Errors
    /// Returns [`ValidationError`] listing every issue found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.allowance_number.trim().is_empty() {
            issues.push(ValidationIssue::new(InvoiceField::AllowanceNumber, ValidationKind::Empty));
        }
        if !validation::is_valid_buyer_identifier(&self.buyer_identifier) {
            issues.push(ValidationIssue::new(
                InvoiceField::BuyerIdentifier,
                ValidationKind::InvalidFormat,
            ));
        }
        if self.buyer_name.trim().is_empty() {
            issues.push(ValidationIssue::new(InvoiceField::BuyerName, ValidationKind::Empty));
        }

        for (index, item) in self.items.iter().enumerate() {
            if !validation::is_valid_invoice_number(&item.original_invoice_number) {
                issues.push(ValidationIssue::at_line(
                    InvoiceField::OriginalInvoiceNumber,
                    ValidationKind::InvalidFormat,
                    index,
                ));
            }
            if item.original_invoice_date.trim().is_empty() {
                issues.push(ValidationIssue::at_line(
                    InvoiceField::OriginalInvoiceDate,
                    ValidationKind::Empty,
                    index,
                ));
            }
            if item.original_description.trim().is_empty() {
                issues.push(ValidationIssue::at_line(
                    InvoiceField::LineItemDescription,
                    ValidationKind::Empty,
                    index,
                ));
            }
            if item.quantity <= Decimal::ZERO {
                issues.push(ValidationIssue::at_line(
                    InvoiceField::LineItemQuantity,
                    ValidationKind::OutOfRange,
                    index,
                ));
            }
            match validation::amount_matches(item.quantity, item.unit_price, item.amount) {
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
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }

    pub fn allowance_number(&self) -> &str {
        &self.allowance_number
    }

    pub fn allowance_date(&self) -> NaiveDate {
        self.allowance_date
    }

    pub fn buyer_identifier(&self) -> &str {
        &self.buyer_identifier
    }

    pub fn buyer_name(&self) -> &str {
        &self.buyer_name
    }

    pub fn items(&self) -> &[AllowanceItem] {
        &self.items
    }

    pub fn tax_amount(&self) -> Decimal {
        self.tax_amount
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }
}

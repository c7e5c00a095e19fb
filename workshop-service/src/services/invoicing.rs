//! Invoice generation and rendering.

use crate::error::{Result, WorkshopError};
use crate::models::{Customer, Invoice, Principal, ServiceRequest, ServiceStatus};
use crate::services::ledger::CostLedger;
use crate::services::metrics::{INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL};
use crate::services::pricing::{price, round_money, DiscountPolicy, TaxCalculator};
use crate::services::state_machine::authorize_work;
use crate::services::store::ServiceStore;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Freezes ledger totals, discount and tax into an invoice, once per request.
#[derive(Clone)]
pub struct InvoiceGenerator {
    store: Arc<dyn ServiceStore>,
    ledger: CostLedger,
    discount: DiscountPolicy,
    tax: TaxCalculator,
    currency: String,
}

impl InvoiceGenerator {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        ledger: CostLedger,
        discount: DiscountPolicy,
        tax: TaxCalculator,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            discount,
            tax,
            currency: currency.into(),
        }
    }

    pub fn discount_policy(&self) -> &DiscountPolicy {
        &self.discount
    }

    pub fn tax_calculator(&self) -> &TaxCalculator {
        &self.tax
    }

    /// Generate the invoice of a completed request.
    ///
    /// Callers must hold the request lock so that no ledger write lands
    /// between reading the totals and storing the snapshot.
    #[instrument(skip(self, request, customer, actor), fields(request_id = %request.request_id, actor_id = %actor.principal_id))]
    pub async fn generate(
        &self,
        request: &ServiceRequest,
        customer: &Customer,
        actor: &Principal,
    ) -> Result<Invoice> {
        authorize_work(request, actor)?;

        if request.status != ServiceStatus::Completed {
            return Err(WorkshopError::InvalidState(format!(
                "Service request {} is {}, invoices need completed",
                request.request_id, request.status
            )));
        }

        if self.store.get_invoice(request.request_id).await?.is_some() {
            return Err(WorkshopError::AlreadyInvoiced(request.request_id));
        }

        let totals = self.ledger.compute_totals(request.request_id).await?;
        let breakdown = price(&totals, customer, &self.discount, &self.tax);

        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            request_id: request.request_id,
            customer_id: customer.customer_id.clone(),
            membership: customer.membership,
            currency: self.currency.clone(),
            materials_total: breakdown.materials_total,
            labor_total: breakdown.labor_total,
            discount: breakdown.discount,
            subtotal: breakdown.subtotal,
            tax: breakdown.tax,
            grand_total: breakdown.grand_total,
            discount_rate: self.discount.rate_for(customer.membership),
            tax_rate: self.tax.rate(),
            ledger_revision: totals.revision,
            downloadable: true,
            generated_utc: Utc::now(),
        };

        if !self.store.insert_invoice(&invoice).await? {
            return Err(WorkshopError::AlreadyInvoiced(request.request_id));
        }

        INVOICES_TOTAL
            .with_label_values(&[customer.membership.as_str()])
            .inc();
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[invoice.currency.as_str()])
            .inc_by(invoice.grand_total.to_f64().unwrap_or(0.0));

        info!(
            invoice_id = %invoice.invoice_id,
            grand_total = %invoice.grand_total,
            membership = %invoice.membership,
            "Invoice generated"
        );

        Ok(invoice)
    }
}

/// Money with exactly two decimals.
fn money(value: Decimal) -> String {
    let mut value = round_money(value);
    value.rescale(2);
    value.to_string()
}

/// Rate as a percentage without trailing zeros.
fn percent(rate: Decimal) -> String {
    let s = (rate * Decimal::ONE_HUNDRED).normalize().to_string();
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Printable invoice. Depends only on the stored snapshot, so rendering the
/// same invoice always yields the same bytes.
pub fn render_invoice(invoice: &Invoice) -> String {
    const WIDTH: usize = 14;
    let mut out = String::new();

    let rows = [
        ("Materials".to_string(), money(invoice.materials_total)),
        ("Labor".to_string(), money(invoice.labor_total)),
        (
            format!("Discount ({}%)", percent(invoice.discount_rate)),
            format!("-{}", money(invoice.discount)),
        ),
        ("Subtotal".to_string(), money(invoice.subtotal)),
        (
            format!("Tax ({}%)", percent(invoice.tax_rate)),
            money(invoice.tax),
        ),
    ];

    // Writing into a String cannot fail.
    let _ = writeln!(out, "INVOICE {}", invoice.invoice_id);
    let _ = writeln!(out, "Service request: {}", invoice.request_id);
    let _ = writeln!(
        out,
        "Customer: {} ({})",
        invoice.customer_id, invoice.membership
    );
    let _ = writeln!(
        out,
        "Generated: {}",
        invoice.generated_utc.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "Currency: {}", invoice.currency);
    let _ = writeln!(out);
    for (label, amount) in rows {
        let _ = writeln!(out, "{:<20}{:>width$}", label, amount, width = WIDTH);
    }
    let _ = writeln!(out, "{}", "-".repeat(20 + WIDTH));
    let _ = writeln!(
        out,
        "{:<20}{:>width$}",
        "Grand total",
        money(invoice.grand_total),
        width = WIDTH
    );

    out
}

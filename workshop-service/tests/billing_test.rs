//! Integration tests for invoicing, payment and dispatch.

mod common;

use common::*;
use rust_decimal::Decimal;
use workshop_service::collaborators::{NotificationKind, RecordingNotifier};
use workshop_service::error::WorkshopError;
use workshop_service::models::{
    DispatchDetails, Membership, PaymentMethod, PaymentStatus, RecordPayment, ServiceStatus,
};

fn payment(amount: Decimal, transaction_id: &str) -> RecordPayment {
    RecordPayment {
        amount,
        method: PaymentMethod::Upi,
        transaction_id: transaction_id.to_string(),
    }
}

fn hand_off() -> DispatchDetails {
    DispatchDetails {
        received_by: "Asha".into(),
        odometer_km: Some(42_180),
        notes: None,
    }
}

#[tokio::test]
async fn premium_invoice_discounts_labor() {
    let app = spawn_app();
    let request_id = app.completed_request(app.premium_vehicle).await;

    let invoice = app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    assert_eq!(invoice.membership, Membership::Premium);
    assert_eq!(invoice.materials_total, Decimal::new(1000, 0));
    assert_eq!(invoice.labor_total, Decimal::new(500, 0));
    assert_eq!(invoice.discount, Decimal::new(100, 0));
    assert_eq!(invoice.subtotal, Decimal::new(1400, 0));
    assert_eq!(invoice.tax, Decimal::new(252, 0));
    assert_eq!(invoice.grand_total, Decimal::new(1652, 0));
    assert!(invoice.downloadable);
}

#[tokio::test]
async fn standard_invoice_has_no_discount() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;

    let invoice = app.service().generate_invoice(request_id, ADMIN).await.unwrap();

    assert_eq!(invoice.discount, Decimal::ZERO);
    assert_eq!(invoice.subtotal, Decimal::new(1500, 0));
    assert_eq!(invoice.tax, Decimal::new(270, 0));
    assert_eq!(invoice.grand_total, Decimal::new(1770, 0));
}

#[tokio::test]
async fn invoice_needs_completed_request() {
    let app = spawn_app();
    let request_id = app.open_request(app.standard_vehicle).await;
    app.book_standard_work(request_id).await;

    let result = app.service().generate_invoice(request_id, ADVISOR).await;

    assert!(matches!(result, Err(WorkshopError::InvalidState(_))));
}

#[tokio::test]
async fn customers_cannot_generate_invoices() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;

    let result = app
        .service()
        .generate_invoice(request_id, STANDARD_CUSTOMER)
        .await;

    assert!(matches!(result, Err(WorkshopError::Unauthorized(_))));
}

#[tokio::test]
async fn second_invoice_is_rejected_and_first_is_unchanged() {
    let app = spawn_app();
    let request_id = app.completed_request(app.premium_vehicle).await;
    let first = app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    app.catalog.set_price(BRAKE_KIT, Decimal::new(999, 0));
    let second = app.service().generate_invoice(request_id, ADMIN).await;
    let stored = app.service().invoice(request_id, ADMIN).await.unwrap();

    assert!(matches!(second, Err(WorkshopError::AlreadyInvoiced(id)) if id == request_id));
    assert_eq!(stored, first);
}

#[tokio::test]
async fn ledger_writes_after_invoicing_mark_the_invoice_stale() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;
    let invoice = app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    let before = app.service().billing_summary(request_id, ADMIN).await.unwrap();
    app.service()
        .add_material(request_id, material(ENGINE_OIL, 1), ADVISOR)
        .await
        .unwrap();
    let after = app.service().billing_summary(request_id, ADMIN).await.unwrap();
    let stored = app.service().invoice(request_id, ADMIN).await.unwrap();

    assert!(!before.invoice_stale);
    assert!(after.invoice_stale);
    assert_eq!(after.grand_total, invoice.grand_total);
    assert_eq!(stored, invoice);
}

#[tokio::test]
async fn summary_before_invoice_is_computed_live() {
    let app = spawn_app();
    let request_id = app.open_request(app.premium_vehicle).await;
    app.book_standard_work(request_id).await;

    let summary = app
        .service()
        .billing_summary(request_id, PREMIUM_CUSTOMER)
        .await
        .unwrap();

    assert_eq!(summary.status, ServiceStatus::Repair);
    assert_eq!(summary.grand_total, Decimal::new(1652, 0));
    assert!(!summary.has_invoice);
    assert!(!summary.is_paid);
    assert!(!summary.is_dispatched);
}

#[tokio::test]
async fn rendered_invoice_is_stable() {
    let app = spawn_app();
    let request_id = app.completed_request(app.premium_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    let first = app.service().render_invoice(request_id, PREMIUM_CUSTOMER).await.unwrap();
    app.catalog.set_price(BRAKE_KIT, Decimal::new(1, 0));
    let second = app.service().render_invoice(request_id, ADMIN).await.unwrap();

    assert_eq!(first, second);
    assert!(first.contains("1652.00"));
}

#[tokio::test]
async fn payment_is_recorded_once() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    let paid = app
        .service()
        .record_payment(request_id, payment(Decimal::new(1770, 0), "UPI-001"), STANDARD_CUSTOMER)
        .await
        .unwrap();
    let again = app
        .service()
        .record_payment(request_id, payment(Decimal::new(1770, 0), "UPI-002"), ADMIN)
        .await;
    let summary = app.service().billing_summary(request_id, ADMIN).await.unwrap();

    assert_eq!(paid.status, PaymentStatus::Completed);
    assert_eq!(paid.customer_id, STANDARD_CUSTOMER);
    assert!(matches!(again, Err(WorkshopError::DuplicatePayment(id)) if id == request_id));
    assert!(summary.is_paid);
}

#[tokio::test]
async fn payment_needs_an_invoice() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;

    let result = app
        .service()
        .record_payment(request_id, payment(Decimal::new(1770, 0), "UPI-001"), ADMIN)
        .await;

    assert!(matches!(result, Err(WorkshopError::InvalidState(_))));
}

#[tokio::test]
async fn payment_must_match_invoice_total() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    let result = app
        .service()
        .record_payment(request_id, payment(Decimal::new(1000, 0), "UPI-001"), ADMIN)
        .await;

    assert!(matches!(result, Err(WorkshopError::Validation(_))));
}

#[tokio::test]
async fn unreconciled_payments_accept_any_amount() {
    let mut config = test_config();
    config.billing.reconcile_payments = false;
    let app = spawn_app_with(config, RecordingNotifier::new());
    let request_id = app.completed_request(app.standard_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    let result = app
        .service()
        .record_payment(request_id, payment(Decimal::new(1000, 0), "CASH-1"), ADMIN)
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn other_customers_cannot_pay() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    let result = app
        .service()
        .record_payment(request_id, payment(Decimal::new(1770, 0), "UPI-9"), PREMIUM_CUSTOMER)
        .await;

    assert!(matches!(result, Err(WorkshopError::Unauthorized(_))));
}

#[tokio::test]
async fn failed_attempt_does_not_block_payment() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    let failed = app
        .service()
        .record_failed_payment(
            request_id,
            payment(Decimal::new(1770, 0), "CARD-1"),
            "card declined",
            STANDARD_CUSTOMER,
        )
        .await
        .unwrap();
    let paid = app
        .service()
        .record_payment(request_id, payment(Decimal::new(1770, 0), "CARD-2"), STANDARD_CUSTOMER)
        .await;

    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
    assert!(paid.is_ok());
}

#[tokio::test]
async fn dispatch_closes_a_paid_request_once() {
    let app = spawn_app();
    let request_id = app.completed_request(app.premium_vehicle).await;
    let invoice = app.service().generate_invoice(request_id, ADVISOR).await.unwrap();
    let paid = app
        .service()
        .record_payment(request_id, payment(invoice.grand_total, "UPI-77"), PREMIUM_CUSTOMER)
        .await
        .unwrap();

    let record = app.service().dispatch(request_id, hand_off(), ADVISOR).await.unwrap();
    let again = app.service().dispatch(request_id, hand_off(), ADMIN).await;
    let summary = app.service().billing_summary(request_id, ADMIN).await.unwrap();

    assert_eq!(record.invoice_id, invoice.invoice_id);
    assert_eq!(record.payment_id, paid.payment_id);
    assert_eq!(record.dispatched_by, ADVISOR);
    assert!(matches!(again, Err(WorkshopError::AlreadyDispatched(_))));
    assert!(summary.is_dispatched);
}

#[tokio::test]
async fn dispatch_needs_invoice_and_payment() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;

    let without_invoice = app.service().dispatch(request_id, hand_off(), ADVISOR).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();
    let without_payment = app.service().dispatch(request_id, hand_off(), ADVISOR).await;

    assert!(matches!(without_invoice, Err(WorkshopError::InvalidState(_))));
    assert!(matches!(without_payment, Err(WorkshopError::InvalidState(_))));
}

#[tokio::test]
async fn dispatch_needs_completed_request() {
    let app = spawn_app();
    let request_id = app.open_request(app.standard_vehicle).await;
    app.book_standard_work(request_id).await;

    let result = app.service().dispatch(request_id, hand_off(), ADVISOR).await;

    assert!(matches!(result, Err(WorkshopError::InvalidState(_))));
}

#[tokio::test]
async fn ledger_is_closed_after_dispatch() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();
    app.service()
        .record_payment(request_id, payment(Decimal::new(1770, 0), "UPI-5"), ADMIN)
        .await
        .unwrap();
    app.service().dispatch(request_id, hand_off(), ADMIN).await.unwrap();

    let result = app
        .service()
        .add_labor(request_id, labor("Late touch-up", 1, 100), ADVISOR)
        .await;

    assert!(matches!(result, Err(WorkshopError::InvalidState(_))));
}

#[tokio::test]
async fn lifecycle_notifications_are_sent() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();
    app.service()
        .record_payment(request_id, payment(Decimal::new(1770, 0), "UPI-3"), ADMIN)
        .await
        .unwrap();
    app.service().dispatch(request_id, hand_off(), ADMIN).await.unwrap();

    let sent = app.wait_for_notifications(4).await;
    let kinds: Vec<_> = sent.iter().map(|n| n.kind).collect();

    assert!(kinds.contains(&NotificationKind::BookingReceived));
    assert!(kinds.contains(&NotificationKind::InvoiceGenerated));
    assert!(kinds.contains(&NotificationKind::PaymentReceived));
    assert!(kinds.contains(&NotificationKind::VehicleDispatched));
}

#[tokio::test]
async fn invoice_metrics_are_exported() {
    let app = spawn_app();
    let request_id = app.completed_request(app.premium_vehicle).await;
    app.service().generate_invoice(request_id, ADVISOR).await.unwrap();

    let text = app.app.metrics();

    assert!(text.contains("workshop_invoices_total"));
    assert!(text.contains("workshop_transitions_total"));
}

#[tokio::test]
async fn notification_failure_never_fails_the_command() {
    let app = spawn_app_with(test_config(), RecordingNotifier::failing());
    let request_id = app.completed_request(app.premium_vehicle).await;

    let invoice = app.service().generate_invoice(request_id, ADVISOR).await;

    assert!(invoice.is_ok());
    // booking and invoice, each tried once plus two retries
    assert!(app.wait_for_attempts(6).await >= 6);
    assert!(app.notifier.sent().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invoicing_issues_one_snapshot_between_ledger_writes() {
    let app = spawn_app();
    let request_id = app.completed_request(app.standard_vehicle).await;

    let mut invoice_calls = Vec::new();
    let mut labor_calls = Vec::new();
    for i in 0..6 {
        let service = app.service().clone();
        invoice_calls.push(tokio::spawn(async move {
            service.generate_invoice(request_id, ADVISOR).await
        }));
        let service = app.service().clone();
        labor_calls.push(tokio::spawn(async move {
            service
                .add_labor(request_id, labor(&format!("Road test {}", i), 1, 100), ADVISOR)
                .await
        }));
    }

    let mut issued = Vec::new();
    let mut rejected = 0;
    for handle in invoice_calls {
        match handle.await.unwrap() {
            Ok(invoice) => issued.push(invoice),
            Err(WorkshopError::AlreadyInvoiced(id)) => {
                assert_eq!(id, request_id);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    for handle in labor_calls {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(issued.len(), 1);
    assert_eq!(rejected, 5);

    // Standard work is two costed records; each later write adds 100.00 labor.
    let invoice = &issued[0];
    let writes_before_snapshot = invoice.ledger_revision - 2;
    assert!(writes_before_snapshot <= 6);
    assert_eq!(invoice.materials_total, Decimal::new(1000, 0));
    assert_eq!(
        invoice.labor_total,
        Decimal::new(500 + 100 * writes_before_snapshot as i64, 0)
    );

    let stored = app.service().invoice(request_id, ADMIN).await.unwrap();
    let summary = app.service().billing_summary(request_id, ADMIN).await.unwrap();

    assert_eq!(&stored, invoice);
    assert_eq!(summary.grand_total, invoice.grand_total);
    assert_eq!(summary.invoice_stale, writes_before_snapshot < 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn billing_summary_status_matches_its_figures() {
    let app = spawn_app();
    let request_id = app.open_request(app.standard_vehicle).await;
    app.book_standard_work(request_id).await;

    let readers: Vec<_> = (0..20)
        .map(|_| {
            let service = app.service().clone();
            tokio::spawn(async move { service.billing_summary(request_id, ADMIN).await })
        })
        .collect();

    app.service()
        .transition(request_id, ServiceStatus::Completed, ADVISOR, "Work done")
        .await
        .unwrap();
    app.service()
        .generate_invoice(request_id, ADVISOR)
        .await
        .unwrap();

    for handle in readers {
        let summary = handle.await.unwrap().unwrap();
        if summary.has_invoice {
            assert_eq!(summary.status, ServiceStatus::Completed);
        }
    }

    let summary = app.service().billing_summary(request_id, ADMIN).await.unwrap();
    assert_eq!(summary.status, ServiceStatus::Completed);
    assert!(summary.has_invoice);
}


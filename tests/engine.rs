//! State transition engine tests: idempotency, ordering, atomicity

mod common;

use common::*;
use featuregate::engine::Transition;

#[test]
fn test_success_settles_order_and_issues_invoice() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let payment = create_test_payment(&conn, &order, Gateway::Stripe);

    let evt = test_event(Gateway::Stripe, &payment.id, CanonicalEvent::PaymentSucceeded);
    let result = engine::apply_event(&mut conn, &evt).unwrap();

    match result {
        Transition::Applied {
            order_status,
            invoice_issued,
            ..
        } => {
            assert_eq!(order_status, OrderStatus::Paid);
            assert!(invoice_issued);
        }
        other => panic!("expected applied, got {:?}", other),
    }

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.external_txn_id.as_deref(), Some("txn_external_123"));
    assert!(payment.paid_at.is_some());

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());

    let invoice = queries::get_invoice_for_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(invoice.amount_cents, 999);
    assert_eq!(invoice.status, InvoiceStatus::Issued);
    assert_eq!(invoice.billing_email.as_deref(), Some("buyer@example.com"));
}

#[test]
fn test_duplicate_success_is_noop() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let payment = create_test_payment(&conn, &order, Gateway::Stripe);
    let evt = test_event(Gateway::Stripe, &payment.id, CanonicalEvent::PaymentSucceeded);

    assert!(matches!(
        engine::apply_event(&mut conn, &evt).unwrap(),
        Transition::Applied { .. }
    ));
    // Gateway redelivers the same notification
    assert!(matches!(
        engine::apply_event(&mut conn, &evt).unwrap(),
        Transition::Duplicate { .. }
    ));

    // Still exactly one invoice
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM invoices WHERE order_id = ?1",
            [&order.id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_failure_marks_order_failed_with_error() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let payment = create_test_payment(&conn, &order, Gateway::Stripe);

    let mut evt = test_event(Gateway::Stripe, &payment.id, CanonicalEvent::PaymentFailed);
    evt.error_code = Some("card_declined".to_string());
    evt.error_message = Some("Your card was declined.".to_string());
    engine::apply_event(&mut conn, &evt).unwrap();

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.error_code.as_deref(), Some("card_declined"));
    assert_eq!(payment.error_message.as_deref(), Some("Your card was declined."));

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert!(queries::get_invoice_for_order(&conn, &order.id).unwrap().is_none());
}

#[test]
fn test_success_after_cancellation_is_out_of_order() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let payment = create_test_payment(&conn, &order, Gateway::Wechat);

    let cancel = test_event(Gateway::Wechat, &payment.id, CanonicalEvent::PaymentCancelled);
    engine::apply_event(&mut conn, &cancel).unwrap();

    // A late success notification must not resurrect the attempt
    let success = test_event(Gateway::Wechat, &payment.id, CanonicalEvent::PaymentSucceeded);
    match engine::apply_event(&mut conn, &success).unwrap() {
        Transition::OutOfOrder { current_status, .. } => {
            assert_eq!(current_status, PaymentStatus::Cancelled);
        }
        other => panic!("expected out-of-order, got {:?}", other),
    }

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Cancelled);
    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert!(queries::get_invoice_for_order(&conn, &order.id).unwrap().is_none());
}

#[test]
fn test_cancelled_attempt_fails_order() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let payment = create_test_payment(&conn, &order, Gateway::Wechat);

    let cancel = test_event(Gateway::Wechat, &payment.id, CanonicalEvent::PaymentCancelled);
    engine::apply_event(&mut conn, &cancel).unwrap();

    // The payment records the precise outcome; the order only knows the
    // sale did not settle
    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Cancelled);
    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
}

#[test]
fn test_refund_after_success() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 2500, 500);
    let payment = create_test_payment(&conn, &order, Gateway::Alipay);

    let success = test_event(Gateway::Alipay, &payment.id, CanonicalEvent::PaymentSucceeded);
    engine::apply_event(&mut conn, &success).unwrap();

    let refund = test_event(Gateway::Alipay, &payment.id, CanonicalEvent::PaymentRefunded);
    assert!(matches!(
        engine::apply_event(&mut conn, &refund).unwrap(),
        Transition::Applied { .. }
    ));

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);

    // The invoice from the settled sale remains
    assert!(queries::get_invoice_for_order(&conn, &order.id).unwrap().is_some());
}

#[test]
fn test_refund_without_success_is_noop() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let payment = create_test_payment(&conn, &order, Gateway::Alipay);

    let refund = test_event(Gateway::Alipay, &payment.id, CanonicalEvent::PaymentRefunded);
    assert!(matches!(
        engine::apply_event(&mut conn, &refund).unwrap(),
        Transition::Duplicate { .. }
    ));

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[test]
fn test_unknown_merchant_ref_is_orphan() {
    let mut conn = setup_test_db();
    create_test_order(&conn, 999, 0);

    let evt = test_event(
        Gateway::Stripe,
        "fg_pay_ffffffffffffffffffffffffffffffff",
        CanonicalEvent::PaymentSucceeded,
    );
    assert!(matches!(
        engine::apply_event(&mut conn, &evt).unwrap(),
        Transition::Orphan
    ));
}

#[test]
fn test_gateway_mismatch_is_orphan() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let payment = create_test_payment(&conn, &order, Gateway::Stripe);

    // Correct merchant reference but verified against the wrong gateway
    let evt = test_event(Gateway::Alipay, &payment.id, CanonicalEvent::PaymentSucceeded);
    assert!(matches!(
        engine::apply_event(&mut conn, &evt).unwrap(),
        Transition::Orphan
    ));

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[test]
fn test_transition_and_invoice_are_atomic() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let payment = create_test_payment(&conn, &order, Gateway::Stripe);

    // Force the invoice insert inside the transaction to fail
    conn.execute_batch("DROP TABLE invoices").unwrap();

    let evt = test_event(Gateway::Stripe, &payment.id, CanonicalEvent::PaymentSucceeded);
    assert!(engine::apply_event(&mut conn, &evt).is_err());

    // The payment transition rolled back with it
    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[test]
fn test_supersede_allows_new_attempt() {
    let conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    let first = create_test_payment(&conn, &order, Gateway::Stripe);

    queries::supersede_payment(&conn, &first.id).unwrap();
    let second = create_test_payment(&conn, &order, Gateway::Alipay);

    let active = queries::get_active_payment(&conn, &order.id).unwrap().unwrap();
    assert_eq!(active.id, second.id);

    let first = queries::get_payment(&conn, &first.id).unwrap().unwrap();
    assert!(first.superseded);
}

#[test]
fn test_one_active_attempt_enforced() {
    let conn = setup_test_db();
    let order = create_test_order(&conn, 999, 0);
    create_test_payment(&conn, &order, Gateway::Stripe);

    // Second non-superseded attempt violates the partial unique index
    let result = queries::create_payment(
        &conn,
        &CreatePayment {
            id: EntityType::Payment.gen_id(),
            order_id: order.id.clone(),
            gateway: Gateway::Alipay,
            session_ref: None,
            amount_cents: order.final_cents,
            currency: order.currency.clone(),
        },
    );
    assert!(result.is_err());
}

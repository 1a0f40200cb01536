//! The payment state transition engine.
//!
//! All lifecycle mutations flow through [`apply_event`]: it takes a verified,
//! normalized gateway event and applies it inside a single transaction, so a
//! payment transition, the derived order transition and invoice issuance
//! either all land or none do. Conditional updates make it safe under
//! concurrent redelivery of the same notification.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::*;

/// Outcome of applying a gateway event.
#[derive(Debug)]
pub enum Transition {
    /// The event won its compare-and-swap and state moved.
    Applied {
        payment_id: String,
        order_id: String,
        event: CanonicalEvent,
        order_status: OrderStatus,
        invoice_issued: bool,
    },
    /// The payment had already absorbed this (or an equivalent) event.
    Duplicate { payment_id: String },
    /// A success notification arrived after the attempt was already
    /// terminally failed, cancelled or refunded. Never applied; flagged
    /// loudly for reconciliation because money may have moved.
    OutOfOrder {
        payment_id: String,
        current_status: PaymentStatus,
    },
    /// No payment matches the event's merchant reference.
    Orphan,
}

/// Statuses a live attempt may hold before settlement.
const OPEN: &[PaymentStatus] = &[PaymentStatus::Pending, PaymentStatus::Processing];

pub fn apply_event(conn: &mut Connection, evt: &GatewayEvent) -> Result<Transition> {
    let tx = conn.transaction()?;

    let payment = match queries::get_payment_for_event(&tx, evt.gateway, &evt.merchant_ref)? {
        Some(p) => p,
        None => return Ok(Transition::Orphan),
    };

    let txn_id = evt.external_txn_id.as_deref();
    let paid_at = queries::now();

    let outcome = match evt.event {
        CanonicalEvent::PaymentSucceeded => {
            let won = queries::try_transition_payment(
                &tx,
                &payment.id,
                OPEN,
                PaymentStatus::Success,
                txn_id,
                Some(paid_at),
                None,
                None,
            )?;
            if won {
                queries::try_transition_order(
                    &tx,
                    &payment.order_id,
                    OrderStatus::Pending,
                    OrderStatus::Paid,
                    Some(paid_at),
                )?;
                settle(&tx, &payment, evt.event)?
            } else {
                lost(&tx, &payment, true)?
            }
        }
        CanonicalEvent::PaymentFailed => {
            let won = queries::try_transition_payment(
                &tx,
                &payment.id,
                OPEN,
                PaymentStatus::Failed,
                txn_id,
                None,
                evt.error_code.as_deref(),
                evt.error_message.as_deref(),
            )?;
            if won {
                queries::try_transition_order(
                    &tx,
                    &payment.order_id,
                    OrderStatus::Pending,
                    OrderStatus::Failed,
                    None,
                )?;
                settle(&tx, &payment, evt.event)?
            } else {
                lost(&tx, &payment, false)?
            }
        }
        CanonicalEvent::PaymentCancelled => {
            let won = queries::try_transition_payment(
                &tx,
                &payment.id,
                OPEN,
                PaymentStatus::Cancelled,
                txn_id,
                None,
                None,
                None,
            )?;
            if won {
                // A cancelled attempt and a failed one look the same from
                // the order's side: the sale did not settle.
                queries::try_transition_order(
                    &tx,
                    &payment.order_id,
                    OrderStatus::Pending,
                    OrderStatus::Failed,
                    None,
                )?;
                settle(&tx, &payment, evt.event)?
            } else {
                lost(&tx, &payment, false)?
            }
        }
        CanonicalEvent::PaymentRefunded => {
            let won = queries::try_transition_payment(
                &tx,
                &payment.id,
                &[PaymentStatus::Success],
                PaymentStatus::Refunded,
                txn_id,
                None,
                None,
                None,
            )?;
            if won {
                queries::try_transition_order(
                    &tx,
                    &payment.order_id,
                    OrderStatus::Paid,
                    OrderStatus::Refunded,
                    None,
                )?;
                settle(&tx, &payment, evt.event)?
            } else {
                lost(&tx, &payment, false)?
            }
        }
    };

    tx.commit()?;
    Ok(outcome)
}

/// Finish an applied transition: reload the order for its derived status and
/// issue the invoice if the order is now paid and has none. Runs inside the
/// same transaction as the payment transition.
fn settle(tx: &Connection, payment: &Payment, event: CanonicalEvent) -> Result<Transition> {
    let order = queries::get_order(tx, &payment.order_id)?.ok_or_else(|| {
        crate::error::AppError::Internal(format!(
            "payment {} references missing order {}",
            payment.id, payment.order_id
        ))
    })?;

    let invoice_issued = if order.status == OrderStatus::Paid {
        queries::create_invoice_if_absent(tx, &order)?
    } else {
        false
    };

    Ok(Transition::Applied {
        payment_id: payment.id.clone(),
        order_id: order.id,
        event,
        order_status: order.status,
        invoice_issued,
    })
}

/// Classify a lost compare-and-swap. A success event arriving after the
/// attempt went terminally non-successful is the one genuinely alarming case.
fn lost(tx: &Connection, payment: &Payment, was_success_event: bool) -> Result<Transition> {
    let current = queries::get_payment(tx, &payment.id)?
        .map(|p| p.status)
        .unwrap_or(payment.status);

    if was_success_event
        && matches!(
            current,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    {
        return Ok(Transition::OutOfOrder {
            payment_id: payment.id.clone(),
            current_status: current,
        });
    }

    Ok(Transition::Duplicate {
        payment_id: payment.id.clone(),
    })
}

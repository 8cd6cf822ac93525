use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events published after a procurement operation has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    SupplierCreated(Uuid),
    PurchaseOrderCreated {
        order_id: Uuid,
        order_number: String,
        supplier_id: Uuid,
    },
    PurchaseOrderSent(Uuid),
    PurchaseOrderCancelled {
        order_id: Uuid,
        reason: Option<String>,
    },
    PurchaseOrderReceived {
        order_id: Uuid,
        receipt_id: Uuid,
        complete: bool,
    },
    /// A receipt was stored but some lines have not reached inventory yet.
    ReceiptStockPending {
        receipt_id: Uuid,
        product_id: Uuid,
        reason: String,
    },
    InvoiceRegistered {
        invoice_id: Uuid,
        payable_id: Uuid,
        amount: Decimal,
        due_date: NaiveDate,
    },
    InvoicePaid(Uuid),
    PaymentRecorded {
        payable_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
        balance: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without failing the caller. The operation that produced the
    /// event has already committed, so a closed channel is only logged.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Creates a sender/receiver pair with the given buffer size.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::ReceiptStockPending {
                receipt_id,
                product_id,
                reason,
            } => {
                warn!(
                    %receipt_id,
                    %product_id,
                    reason = %reason,
                    "Receipt waiting for stock retry"
                );
            }
            Event::PaymentRecorded {
                payable_id,
                amount,
                balance,
                ..
            } => {
                info!(%payable_id, %amount, %balance, "Payment recorded");
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event processing loop stopped");
}

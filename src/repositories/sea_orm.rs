use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    SqlErr, TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::{
    InvoiceRepository, PayableRepository, PurchaseOrderRepository, ReceiptRepository, RepoResult,
    SupplierRepository,
};
use crate::entities::{
    payable_account, payment, product_receipt, purchase_order, purchase_order_item, receipt_item,
    supplier, supplier_invoice,
};
use crate::errors::ServiceError;
use crate::models::{
    PayableAccount, Payment, ProductReceipt, PurchaseOrder, PurchaseOrderItem,
    PurchaseOrderStatus, ReceiptItem, StockStatus, Supplier, SupplierInvoice,
};

/// SQL-backed store over a sea-orm connection pool.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn corrupt(what: impl std::fmt::Display) -> ServiceError {
    error!("Unreadable row: {}", what);
    ServiceError::DatabaseError(DbErr::Custom(format!("unreadable row: {}", what)))
}

fn unique_or_db(err: DbErr, conflict: impl FnOnce() -> String) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(conflict()),
        _ => ServiceError::DatabaseError(err),
    }
}

fn parse<T: FromStr>(column: &str, value: &str) -> RepoResult<T> {
    T::from_str(value).map_err(|_| corrupt(format_args!("{} = {:?}", column, value)))
}

fn to_u32(column: &str, value: i64) -> RepoResult<u32> {
    u32::try_from(value).map_err(|_| corrupt(format_args!("{} = {}", column, value)))
}

// ---- suppliers ----

fn supplier_active(s: &Supplier) -> supplier::ActiveModel {
    supplier::ActiveModel {
        id: Set(s.id),
        name: Set(s.name.clone()),
        contact: Set(s.contact.clone()),
        tax_id: Set(s.tax_id.clone()),
        payment_terms_days: Set(i64::from(s.payment_terms_days)),
        active: Set(s.active),
        created_at: Set(s.created_at),
        updated_at: Set(s.updated_at),
    }
}

fn supplier_from(m: supplier::Model) -> RepoResult<Supplier> {
    Ok(Supplier {
        id: m.id,
        name: m.name,
        contact: m.contact,
        tax_id: m.tax_id,
        payment_terms_days: to_u32("payment_terms_days", m.payment_terms_days)?,
        active: m.active,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

#[async_trait]
impl SupplierRepository for SeaOrmStore {
    async fn insert_supplier(&self, s: &Supplier) -> RepoResult<()> {
        supplier::Entity::insert(supplier_active(s))
            .exec(self.db())
            .await
            .map_err(|e| unique_or_db(e, || format!("supplier {} already exists", s.id)))?;
        Ok(())
    }

    async fn update_supplier(&self, s: &Supplier) -> RepoResult<bool> {
        let mut model = supplier_active(s);
        model.id = NotSet;
        let result = supplier::Entity::update_many()
            .set(model)
            .filter(supplier::Column::Id.eq(s.id))
            .exec(self.db())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn get_supplier(&self, id: Uuid) -> RepoResult<Option<Supplier>> {
        supplier::Entity::find_by_id(id)
            .one(self.db())
            .await?
            .map(supplier_from)
            .transpose()
    }

    async fn list_suppliers(&self) -> RepoResult<Vec<Supplier>> {
        supplier::Entity::find()
            .order_by_asc(supplier::Column::Name)
            .all(self.db())
            .await?
            .into_iter()
            .map(supplier_from)
            .collect()
    }

    async fn delete_supplier(&self, id: Uuid) -> RepoResult<bool> {
        let result = supplier::Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(result.rows_affected > 0)
    }
}

// ---- purchase orders ----

fn order_active(o: &PurchaseOrder) -> purchase_order::ActiveModel {
    purchase_order::ActiveModel {
        id: Set(o.id),
        order_number: Set(o.order_number.clone()),
        supplier_id: Set(o.supplier_id),
        supplier_name: Set(o.supplier_name.clone()),
        notes: Set(o.notes.clone()),
        status: Set(o.status.to_string()),
        created_at: Set(o.created_at),
        created_by: Set(o.created_by.clone()),
        sent_at: Set(o.sent_at),
        sent_by: Set(o.sent_by.clone()),
        received_at: Set(o.received_at),
        received_by: Set(o.received_by.clone()),
        cancelled_at: Set(o.cancelled_at),
        cancelled_by: Set(o.cancelled_by.clone()),
        cancellation_reason: Set(o.cancellation_reason.clone()),
        version: Set(o.version),
    }
}

fn order_item_active(
    order_id: Uuid,
    position: usize,
    item: &PurchaseOrderItem,
) -> purchase_order_item::ActiveModel {
    purchase_order_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        purchase_order_id: Set(order_id),
        position: Set(position as i32),
        product_id: Set(item.product_id),
        product_name: Set(item.product_name.clone()),
        quantity: Set(i64::from(item.quantity)),
        unit: Set(item.unit.to_string()),
        unit_equivalence: Set(item.unit_equivalence.map(i64::from)),
        equivalence_unit: Set(item.equivalence_unit.map(|u| u.to_string())),
        unit_cost: Set(item.unit_cost),
    }
}

fn order_from(
    m: purchase_order::Model,
    mut items: Vec<purchase_order_item::Model>,
) -> RepoResult<PurchaseOrder> {
    items.sort_by_key(|i| i.position);
    let items = items
        .into_iter()
        .map(|i| {
            Ok(PurchaseOrderItem {
                product_id: i.product_id,
                product_name: i.product_name,
                quantity: to_u32("quantity", i.quantity)?,
                unit: parse("unit", &i.unit)?,
                unit_equivalence: i
                    .unit_equivalence
                    .map(|q| to_u32("unit_equivalence", q))
                    .transpose()?,
                equivalence_unit: i
                    .equivalence_unit
                    .as_deref()
                    .map(|u| parse("equivalence_unit", u))
                    .transpose()?,
                unit_cost: i.unit_cost,
            })
        })
        .collect::<RepoResult<Vec<_>>>()?;
    Ok(PurchaseOrder {
        id: m.id,
        order_number: m.order_number,
        supplier_id: m.supplier_id,
        supplier_name: m.supplier_name,
        items,
        notes: m.notes,
        status: parse("status", &m.status)?,
        created_at: m.created_at,
        created_by: m.created_by,
        sent_at: m.sent_at,
        sent_by: m.sent_by,
        received_at: m.received_at,
        received_by: m.received_by,
        cancelled_at: m.cancelled_at,
        cancelled_by: m.cancelled_by,
        cancellation_reason: m.cancellation_reason,
        version: m.version,
    })
}

#[async_trait]
impl PurchaseOrderRepository for SeaOrmStore {
    async fn insert_order(&self, order: &PurchaseOrder) -> RepoResult<()> {
        let txn = self.db().begin().await?;
        purchase_order::Entity::insert(order_active(order))
            .exec(&txn)
            .await
            .map_err(|e| {
                unique_or_db(e, || {
                    format!("order number {} already exists", order.order_number)
                })
            })?;
        if !order.items.is_empty() {
            purchase_order_item::Entity::insert_many(
                order
                    .items
                    .iter()
                    .enumerate()
                    .map(|(pos, item)| order_item_active(order.id, pos, item)),
            )
            .exec(&txn)
            .await?;
        }
        txn.commit().await?;
        Ok(())
    }

    // Lines are fixed at creation, so only the header row is rewritten.
    async fn update_order(&self, order: &PurchaseOrder, expected_version: i64) -> RepoResult<bool> {
        let mut model = order_active(order);
        model.id = NotSet;
        let result = purchase_order::Entity::update_many()
            .set(model)
            .filter(purchase_order::Column::Id.eq(order.id))
            .filter(purchase_order::Column::Version.eq(expected_version))
            .exec(self.db())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<PurchaseOrder>> {
        let Some(header) = purchase_order::Entity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        let items = purchase_order_item::Entity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(id))
            .all(self.db())
            .await?;
        order_from(header, items).map(Some)
    }

    async fn list_orders(
        &self,
        status: Option<PurchaseOrderStatus>,
    ) -> RepoResult<Vec<PurchaseOrder>> {
        let mut query = purchase_order::Entity::find();
        if let Some(status) = status {
            query = query.filter(purchase_order::Column::Status.eq(status.to_string()));
        }
        query
            .order_by_desc(purchase_order::Column::CreatedAt)
            .find_with_related(purchase_order_item::Entity)
            .all(self.db())
            .await?
            .into_iter()
            .map(|(header, items)| order_from(header, items))
            .collect()
    }
}

// ---- receipts ----

fn receipt_active(r: &ProductReceipt) -> product_receipt::ActiveModel {
    product_receipt::ActiveModel {
        id: Set(r.id),
        receipt_number: Set(r.receipt_number.clone()),
        purchase_order_id: Set(r.purchase_order_id),
        order_number: Set(r.order_number.clone()),
        received_at: Set(r.received_at),
        received_by: Set(r.received_by.clone()),
        notes: Set(r.notes.clone()),
        stock_status: Set(r.stock_status.to_string()),
        version: Set(r.version),
    }
}

fn receipt_item_active(
    receipt_id: Uuid,
    position: usize,
    item: &ReceiptItem,
) -> receipt_item::ActiveModel {
    receipt_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        receipt_id: Set(receipt_id),
        position: Set(position as i32),
        product_id: Set(item.product_id),
        product_name: Set(item.product_name.clone()),
        unit: Set(item.unit.to_string()),
        ordered_quantity: Set(i64::from(item.ordered_quantity)),
        received_quantity: Set(i64::from(item.received_quantity)),
        unit_cost: Set(item.unit_cost),
        is_complete: Set(item.is_complete),
        line_total: Set(item.line_total),
        stock_applied: Set(item.stock_applied),
    }
}

fn receipt_from(
    m: product_receipt::Model,
    mut items: Vec<receipt_item::Model>,
) -> RepoResult<ProductReceipt> {
    items.sort_by_key(|i| i.position);
    let items = items
        .into_iter()
        .map(|i| {
            Ok(ReceiptItem {
                product_id: i.product_id,
                product_name: i.product_name,
                unit: parse("unit", &i.unit)?,
                ordered_quantity: to_u32("ordered_quantity", i.ordered_quantity)?,
                received_quantity: to_u32("received_quantity", i.received_quantity)?,
                unit_cost: i.unit_cost,
                is_complete: i.is_complete,
                line_total: i.line_total,
                stock_applied: i.stock_applied,
            })
        })
        .collect::<RepoResult<Vec<_>>>()?;
    Ok(ProductReceipt {
        id: m.id,
        receipt_number: m.receipt_number,
        purchase_order_id: m.purchase_order_id,
        order_number: m.order_number,
        items,
        received_at: m.received_at,
        received_by: m.received_by,
        notes: m.notes,
        stock_status: parse("stock_status", &m.stock_status)?,
        version: m.version,
    })
}

impl SeaOrmStore {
    async fn load_receipts(
        &self,
        filter: Option<sea_orm::sea_query::SimpleExpr>,
    ) -> RepoResult<Vec<ProductReceipt>> {
        let mut query = product_receipt::Entity::find();
        if let Some(filter) = filter {
            query = query.filter(filter);
        }
        query
            .order_by_desc(product_receipt::Column::ReceivedAt)
            .find_with_related(receipt_item::Entity)
            .all(self.db())
            .await?
            .into_iter()
            .map(|(header, items)| receipt_from(header, items))
            .collect()
    }
}

#[async_trait]
impl ReceiptRepository for SeaOrmStore {
    async fn insert_receipt(
        &self,
        receipt: &ProductReceipt,
        order: &PurchaseOrder,
        expected_order_version: i64,
    ) -> RepoResult<bool> {
        let txn = self.db().begin().await?;
        let mut claim = order_active(order);
        claim.id = NotSet;
        let claimed = purchase_order::Entity::update_many()
            .set(claim)
            .filter(purchase_order::Column::Id.eq(order.id))
            .filter(purchase_order::Column::Version.eq(expected_order_version))
            .exec(&txn)
            .await?;
        if claimed.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }

        product_receipt::Entity::insert(receipt_active(receipt))
            .exec(&txn)
            .await
            .map_err(|e| {
                unique_or_db(e, || {
                    format!(
                        "a receipt already exists for purchase order {}",
                        receipt.purchase_order_id
                    )
                })
            })?;
        if !receipt.items.is_empty() {
            receipt_item::Entity::insert_many(
                receipt
                    .items
                    .iter()
                    .enumerate()
                    .map(|(pos, item)| receipt_item_active(receipt.id, pos, item)),
            )
            .exec(&txn)
            .await?;
        }
        txn.commit().await?;
        Ok(true)
    }

    async fn update_receipt(
        &self,
        receipt: &ProductReceipt,
        expected_version: i64,
    ) -> RepoResult<bool> {
        let txn = self.db().begin().await?;
        let mut model = receipt_active(receipt);
        model.id = NotSet;
        let result = product_receipt::Entity::update_many()
            .set(model)
            .filter(product_receipt::Column::Id.eq(receipt.id))
            .filter(product_receipt::Column::Version.eq(expected_version))
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }
        for item in &receipt.items {
            receipt_item::Entity::update_many()
                .col_expr(receipt_item::Column::StockApplied, Expr::value(item.stock_applied))
                .filter(receipt_item::Column::ReceiptId.eq(receipt.id))
                .filter(receipt_item::Column::ProductId.eq(item.product_id))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;
        Ok(true)
    }

    async fn get_receipt(&self, id: Uuid) -> RepoResult<Option<ProductReceipt>> {
        Ok(self
            .load_receipts(Some(product_receipt::Column::Id.eq(id)))
            .await?
            .into_iter()
            .next())
    }

    async fn receipt_for_order(&self, order_id: Uuid) -> RepoResult<Option<ProductReceipt>> {
        Ok(self
            .load_receipts(Some(product_receipt::Column::PurchaseOrderId.eq(order_id)))
            .await?
            .into_iter()
            .next())
    }

    async fn list_pending_receipts(&self) -> RepoResult<Vec<ProductReceipt>> {
        self.load_receipts(Some(
            product_receipt::Column::StockStatus.eq(StockStatus::Pending.to_string()),
        ))
        .await
    }
}

// ---- invoices ----

fn invoice_active(i: &SupplierInvoice) -> supplier_invoice::ActiveModel {
    supplier_invoice::ActiveModel {
        id: Set(i.id),
        invoice_number: Set(i.invoice_number.clone()),
        supplier_id: Set(i.supplier_id),
        supplier_name: Set(i.supplier_name.clone()),
        purchase_order_id: Set(i.purchase_order_id),
        amount: Set(i.amount),
        status: Set(i.status.to_string()),
        issue_date: Set(i.issue_date),
        due_date: Set(i.due_date),
        paid_date: Set(i.paid_date),
        notes: Set(i.notes.clone()),
        created_at: Set(i.created_at),
        created_by: Set(i.created_by.clone()),
        version: Set(i.version),
    }
}

fn invoice_from(m: supplier_invoice::Model) -> RepoResult<SupplierInvoice> {
    Ok(SupplierInvoice {
        id: m.id,
        invoice_number: m.invoice_number,
        supplier_id: m.supplier_id,
        supplier_name: m.supplier_name,
        purchase_order_id: m.purchase_order_id,
        amount: m.amount,
        status: parse("status", &m.status)?,
        issue_date: m.issue_date,
        due_date: m.due_date,
        paid_date: m.paid_date,
        notes: m.notes,
        created_at: m.created_at,
        created_by: m.created_by,
        version: m.version,
    })
}

async fn update_invoice_on<C: ConnectionTrait>(
    conn: &C,
    invoice: &SupplierInvoice,
    expected_version: i64,
) -> RepoResult<bool> {
    let mut model = invoice_active(invoice);
    model.id = NotSet;
    let result = supplier_invoice::Entity::update_many()
        .set(model)
        .filter(supplier_invoice::Column::Id.eq(invoice.id))
        .filter(supplier_invoice::Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

#[async_trait]
impl InvoiceRepository for SeaOrmStore {
    async fn insert_invoice_with_payable(
        &self,
        invoice: &SupplierInvoice,
        payable: &PayableAccount,
    ) -> RepoResult<()> {
        let txn = self.db().begin().await?;
        supplier_invoice::Entity::insert(invoice_active(invoice))
            .exec(&txn)
            .await
            .map_err(|e| {
                unique_or_db(e, || {
                    format!(
                        "invoice {} already registered for supplier {}",
                        invoice.invoice_number, invoice.supplier_id
                    )
                })
            })?;
        payable_account::Entity::insert(payable_active(payable))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn update_invoice(
        &self,
        invoice: &SupplierInvoice,
        expected_version: i64,
    ) -> RepoResult<bool> {
        update_invoice_on(self.db(), invoice, expected_version).await
    }

    async fn get_invoice(&self, id: Uuid) -> RepoResult<Option<SupplierInvoice>> {
        supplier_invoice::Entity::find_by_id(id)
            .one(self.db())
            .await?
            .map(invoice_from)
            .transpose()
    }

    async fn find_invoice_by_number(
        &self,
        supplier_id: Uuid,
        invoice_number: &str,
    ) -> RepoResult<Option<SupplierInvoice>> {
        supplier_invoice::Entity::find()
            .filter(supplier_invoice::Column::SupplierId.eq(supplier_id))
            .filter(supplier_invoice::Column::InvoiceNumber.eq(invoice_number))
            .one(self.db())
            .await?
            .map(invoice_from)
            .transpose()
    }

    async fn list_invoices(&self) -> RepoResult<Vec<SupplierInvoice>> {
        supplier_invoice::Entity::find()
            .order_by_desc(supplier_invoice::Column::IssueDate)
            .all(self.db())
            .await?
            .into_iter()
            .map(invoice_from)
            .collect()
    }
}

// ---- payables ----

fn payable_active(p: &PayableAccount) -> payable_account::ActiveModel {
    payable_account::ActiveModel {
        id: Set(p.id),
        supplier_id: Set(p.supplier_id),
        supplier_name: Set(p.supplier_name.clone()),
        invoice_id: Set(p.invoice_id),
        invoice_number: Set(p.invoice_number.clone()),
        amount: Set(p.amount),
        amount_paid: Set(p.amount_paid),
        balance: Set(p.balance),
        status: Set(p.status.to_string()),
        due_date: Set(p.due_date),
        created_at: Set(p.created_at),
        updated_at: Set(p.updated_at),
        version: Set(p.version),
    }
}

fn payment_active(payable_id: Uuid, position: usize, p: &Payment) -> payment::ActiveModel {
    payment::ActiveModel {
        id: Set(p.id),
        payable_account_id: Set(payable_id),
        position: Set(position as i32),
        amount: Set(p.amount),
        date: Set(p.date),
        method: Set(p.method.to_string()),
        notes: Set(p.notes.clone()),
        reference: Set(p.reference.clone()),
        recorded_by: Set(p.recorded_by.clone()),
    }
}

fn payable_from(
    m: payable_account::Model,
    mut payments: Vec<payment::Model>,
) -> RepoResult<PayableAccount> {
    payments.sort_by_key(|p| p.position);
    let payments = payments
        .into_iter()
        .map(|p| {
            Ok(Payment {
                id: p.id,
                amount: p.amount,
                date: p.date,
                method: parse("method", &p.method)?,
                notes: p.notes,
                reference: p.reference,
                recorded_by: p.recorded_by,
            })
        })
        .collect::<RepoResult<Vec<_>>>()?;
    Ok(PayableAccount {
        id: m.id,
        supplier_id: m.supplier_id,
        supplier_name: m.supplier_name,
        invoice_id: m.invoice_id,
        invoice_number: m.invoice_number,
        amount: m.amount,
        amount_paid: m.amount_paid,
        balance: m.balance,
        status: parse("status", &m.status)?,
        due_date: m.due_date,
        payments,
        created_at: m.created_at,
        updated_at: m.updated_at,
        version: m.version,
    })
}

impl SeaOrmStore {
    async fn load_payables(
        &self,
        filter: Option<sea_orm::sea_query::SimpleExpr>,
    ) -> RepoResult<Vec<PayableAccount>> {
        let mut query = payable_account::Entity::find();
        if let Some(filter) = filter {
            query = query.filter(filter);
        }
        query
            .order_by_asc(payable_account::Column::DueDate)
            .find_with_related(payment::Entity)
            .all(self.db())
            .await?
            .into_iter()
            .map(|(header, payments)| payable_from(header, payments))
            .collect()
    }
}

#[async_trait]
impl PayableRepository for SeaOrmStore {
    async fn get_payable(&self, id: Uuid) -> RepoResult<Option<PayableAccount>> {
        Ok(self
            .load_payables(Some(payable_account::Column::Id.eq(id)))
            .await?
            .into_iter()
            .next())
    }

    async fn payable_for_invoice(&self, invoice_id: Uuid) -> RepoResult<Option<PayableAccount>> {
        Ok(self
            .load_payables(Some(payable_account::Column::InvoiceId.eq(invoice_id)))
            .await?
            .into_iter()
            .next())
    }

    async fn list_payables(&self) -> RepoResult<Vec<PayableAccount>> {
        self.load_payables(None).await
    }

    async fn record_payment(
        &self,
        payable: &PayableAccount,
        new_payment: &Payment,
        expected_version: i64,
        settled_invoice: Option<&SupplierInvoice>,
    ) -> RepoResult<bool> {
        let txn = self.db().begin().await?;

        let mut header = payable_active(payable);
        header.id = NotSet;
        let result = payable_account::Entity::update_many()
            .set(header)
            .filter(payable_account::Column::Id.eq(payable.id))
            .filter(payable_account::Column::Version.eq(expected_version))
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }

        let position = payable.payments.len().saturating_sub(1);
        payment::Entity::insert(payment_active(payable.id, position, new_payment))
            .exec(&txn)
            .await
            .map_err(|e| {
                unique_or_db(e, || {
                    format!(
                        "payment reference {} already recorded",
                        new_payment.reference.as_deref().unwrap_or_default()
                    )
                })
            })?;

        if let Some(invoice) = settled_invoice {
            if !update_invoice_on(&txn, invoice, invoice.version - 1).await? {
                txn.rollback().await?;
                return Ok(false);
            }
        }

        txn.commit().await?;
        Ok(true)
    }
}

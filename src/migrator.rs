use anyhow::Result;
use sea_orm_migration::prelude::*;
use tracing::{error, info};

use crate::db::{self, DbConfig};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_suppliers_table::Migration),
            Box::new(m20240101_000002_create_purchase_order_tables::Migration),
            Box::new(m20240101_000003_create_receipt_tables::Migration),
            Box::new(m20240101_000004_create_payable_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_suppliers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_suppliers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Suppliers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::Contact).string().null())
                        .col(ColumnDef::new(Suppliers::TaxId).string().null())
                        .col(
                            ColumnDef::new(Suppliers::PaymentTermsDays)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Suppliers::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
        Name,
        Contact,
        TaxId,
        PaymentTermsDays,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_purchase_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_purchase_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // supplier_id carries no foreign key: deleting a
            // supplier leaves its orders in place
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::SupplierName).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::Notes).text().null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CreatedBy).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::SentAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SentBy).string().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::ReceivedBy).string().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CancelledBy).string().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CancellationReason)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::Version)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_status")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::Position).integer().not_null())
                        .col(ColumnDef::new(PurchaseOrderItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::Unit).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitEquivalence)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::EquivalenceUnit)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::UnitCost).decimal().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_items_order_id")
                                .from(PurchaseOrderItems::Table, PurchaseOrderItems::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_items_order_product")
                        .table(PurchaseOrderItems::Table)
                        .col(PurchaseOrderItems::PurchaseOrderId)
                        .col(PurchaseOrderItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        OrderNumber,
        SupplierId,
        SupplierName,
        Notes,
        Status,
        CreatedAt,
        CreatedBy,
        SentAt,
        SentBy,
        ReceivedAt,
        ReceivedBy,
        CancelledAt,
        CancelledBy,
        CancellationReason,
        Version,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        Position,
        ProductId,
        ProductName,
        Quantity,
        Unit,
        UnitEquivalence,
        EquivalenceUnit,
        UnitCost,
    }
}

mod m20240101_000003_create_receipt_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_receipt_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductReceipts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductReceipts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductReceipts::ReceiptNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        // one receipt per order
                        .col(
                            ColumnDef::new(ProductReceipts::PurchaseOrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ProductReceipts::OrderNumber).string().not_null())
                        .col(
                            ColumnDef::new(ProductReceipts::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductReceipts::ReceivedBy).string().not_null())
                        .col(ColumnDef::new(ProductReceipts::Notes).text().null())
                        .col(ColumnDef::new(ProductReceipts::StockStatus).string().not_null())
                        .col(
                            ColumnDef::new(ProductReceipts::Version)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_receipts_stock_status")
                        .table(ProductReceipts::Table)
                        .col(ProductReceipts::StockStatus)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReceiptItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ReceiptItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(ReceiptItems::ReceiptId).uuid().not_null())
                        .col(ColumnDef::new(ReceiptItems::Position).integer().not_null())
                        .col(ColumnDef::new(ReceiptItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ReceiptItems::ProductName).string().not_null())
                        .col(ColumnDef::new(ReceiptItems::Unit).string().not_null())
                        .col(
                            ColumnDef::new(ReceiptItems::OrderedQuantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReceiptItems::ReceivedQuantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReceiptItems::UnitCost).decimal().not_null())
                        .col(ColumnDef::new(ReceiptItems::IsComplete).boolean().not_null())
                        .col(ColumnDef::new(ReceiptItems::LineTotal).decimal().not_null())
                        .col(
                            ColumnDef::new(ReceiptItems::StockApplied)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_receipt_items_receipt_id")
                                .from(ReceiptItems::Table, ReceiptItems::ReceiptId)
                                .to(ProductReceipts::Table, ProductReceipts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReceiptItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductReceipts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProductReceipts {
        Table,
        Id,
        ReceiptNumber,
        PurchaseOrderId,
        OrderNumber,
        ReceivedAt,
        ReceivedBy,
        Notes,
        StockStatus,
        Version,
    }

    #[derive(DeriveIden)]
    enum ReceiptItems {
        Table,
        Id,
        ReceiptId,
        Position,
        ProductId,
        ProductName,
        Unit,
        OrderedQuantity,
        ReceivedQuantity,
        UnitCost,
        IsComplete,
        LineTotal,
        StockApplied,
    }
}

mod m20240101_000004_create_payable_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_payable_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupplierInvoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplierInvoices::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInvoices::InvoiceNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplierInvoices::SupplierId).uuid().not_null())
                        .col(
                            ColumnDef::new(SupplierInvoices::SupplierName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplierInvoices::PurchaseOrderId).uuid().null())
                        .col(ColumnDef::new(SupplierInvoices::Amount).decimal().not_null())
                        .col(ColumnDef::new(SupplierInvoices::Status).string().not_null())
                        .col(ColumnDef::new(SupplierInvoices::IssueDate).date().not_null())
                        .col(ColumnDef::new(SupplierInvoices::DueDate).date().not_null())
                        .col(
                            ColumnDef::new(SupplierInvoices::PaidDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(SupplierInvoices::Notes).text().null())
                        .col(
                            ColumnDef::new(SupplierInvoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplierInvoices::CreatedBy).string().not_null())
                        .col(
                            ColumnDef::new(SupplierInvoices::Version)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_invoices_supplier_number")
                        .table(SupplierInvoices::Table)
                        .col(SupplierInvoices::SupplierId)
                        .col(SupplierInvoices::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PayableAccounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PayableAccounts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PayableAccounts::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(PayableAccounts::SupplierName).string().not_null())
                        .col(
                            ColumnDef::new(PayableAccounts::InvoiceId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PayableAccounts::InvoiceNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PayableAccounts::Amount).decimal().not_null())
                        .col(ColumnDef::new(PayableAccounts::AmountPaid).decimal().not_null())
                        .col(ColumnDef::new(PayableAccounts::Balance).decimal().not_null())
                        .col(ColumnDef::new(PayableAccounts::Status).string().not_null())
                        .col(ColumnDef::new(PayableAccounts::DueDate).date().not_null())
                        .col(
                            ColumnDef::new(PayableAccounts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PayableAccounts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PayableAccounts::Version)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payable_accounts_invoice_id")
                                .from(PayableAccounts::Table, PayableAccounts::InvoiceId)
                                .to(SupplierInvoices::Table, SupplierInvoices::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payable_accounts_status")
                        .table(PayableAccounts::Table)
                        .col(PayableAccounts::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::PayableAccountId).uuid().not_null())
                        .col(ColumnDef::new(Payments::Position).integer().not_null())
                        .col(ColumnDef::new(Payments::Amount).decimal().not_null())
                        .col(
                            ColumnDef::new(Payments::Date)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::Method).string().not_null())
                        .col(ColumnDef::new(Payments::Notes).text().null())
                        .col(ColumnDef::new(Payments::Reference).string().null())
                        .col(ColumnDef::new(Payments::RecordedBy).string().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_payable_account_id")
                                .from(Payments::Table, Payments::PayableAccountId)
                                .to(PayableAccounts::Table, PayableAccounts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_account_reference")
                        .table(Payments::Table)
                        .col(Payments::PayableAccountId)
                        .col(Payments::Reference)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PayableAccounts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SupplierInvoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SupplierInvoices {
        Table,
        Id,
        InvoiceNumber,
        SupplierId,
        SupplierName,
        PurchaseOrderId,
        Amount,
        Status,
        IssueDate,
        DueDate,
        PaidDate,
        Notes,
        CreatedAt,
        CreatedBy,
        Version,
    }

    #[derive(DeriveIden)]
    enum PayableAccounts {
        Table,
        Id,
        SupplierId,
        SupplierName,
        InvoiceId,
        InvoiceNumber,
        Amount,
        AmountPaid,
        Balance,
        Status,
        DueDate,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        PayableAccountId,
        Position,
        Amount,
        Date,
        Method,
        Notes,
        Reference,
        RecordedBy,
    }
}

/// Connects to `db_url` and applies every pending migration.
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");
    let db = db::establish_connection(&DbConfig::new(db_url)).await?;

    info!("Running database migrations");
    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}

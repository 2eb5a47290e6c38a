use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_orders_table::Migration),
            Box::new(m20240101_000002_create_order_items_table::Migration),
            Box::new(m20240101_000003_create_cart_items_table::Migration),
            Box::new(m20240101_000004_create_order_audit_log_table::Migration),
            Box::new(m20240101_000005_create_ledger_entries_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create orders table aligned with entities::order Model
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::DeliveryStatus).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).string().not_null())
                        .col(ColumnDef::new(Orders::BatchId).string().null())
                        .col(ColumnDef::new(Orders::PaymentProvider).string().null())
                        .col(
                            ColumnDef::new(Orders::PaymentTransactionId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::ProviderOrderId).string().null())
                        .col(
                            ColumnDef::new(Orders::PaymentAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::PaymentDate).timestamp().null())
                        .col(
                            ColumnDef::new(Orders::GatewayPaymentStatus)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::TrackingNumber).string().null())
                        .col(ColumnDef::new(Orders::Carrier).string().null())
                        .col(ColumnDef::new(Orders::CarrierUrl).string().null())
                        .col(ColumnDef::new(Orders::CourierPhone).string().null())
                        .col(ColumnDef::new(Orders::CourierLogoUrl).string().null())
                        .col(
                            ColumnDef::new(Orders::ExpectedDeliveryDate)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::IsVerified)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Orders::VerifiedAt).timestamp().null())
                        .col(ColumnDef::new(Orders::VerifiedBy).uuid().null())
                        .col(ColumnDef::new(Orders::PackedAt).timestamp().null())
                        .col(ColumnDef::new(Orders::ShippedAt).timestamp().null())
                        .col(ColumnDef::new(Orders::DeliveredAt).timestamp().null())
                        .col(ColumnDef::new(Orders::DeliveryDate).timestamp().null())
                        .col(ColumnDef::new(Orders::CancelledAt).timestamp().null())
                        .col(ColumnDef::new(Orders::CancelledBy).string().null())
                        .col(ColumnDef::new(Orders::CancelReason).string().null())
                        .col(ColumnDef::new(Orders::ReturnedAt).timestamp().null())
                        .col(ColumnDef::new(Orders::AdminNotes).string().null())
                        .col(ColumnDef::new(Orders::CustomerNotes).string().null())
                        .col(
                            ColumnDef::new(Orders::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Orders::DeletedAt).timestamp().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().null())
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            // Useful indexes
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .to_owned(),
                )
                .await?;

            // Idempotency guard: a checkout retry with the same batch id for
            // the same user collides here instead of creating a second order.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_batch")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .col(Orders::BatchId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        Status,
        DeliveryStatus,
        PaymentStatus,
        TotalAmount,
        Currency,
        ShippingAddress,
        BatchId,
        PaymentProvider,
        PaymentTransactionId,
        ProviderOrderId,
        PaymentAmount,
        PaymentDate,
        GatewayPaymentStatus,
        TrackingNumber,
        Carrier,
        CarrierUrl,
        CourierPhone,
        CourierLogoUrl,
        ExpectedDeliveryDate,
        IsVerified,
        VerifiedAt,
        VerifiedBy,
        PackedAt,
        ShippedAt,
        DeliveredAt,
        DeliveryDate,
        CancelledAt,
        CancelledBy,
        CancelReason,
        ReturnedAt,
        AdminNotes,
        CustomerNotes,
        IsDeleted,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000002_create_order_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create order_items table aligned with entities::order_item Model
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(ColumnDef::new(OrderItems::Description).string().null())
                        .col(ColumnDef::new(OrderItems::Image).string().null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::UnitPrice).decimal().not_null())
                        .col(ColumnDef::new(OrderItems::BasePrice).decimal().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Tax)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderItems::ShippingCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderItems::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OrderItems::TotalPrice).decimal().not_null())
                        .col(ColumnDef::new(OrderItems::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Name,
        Description,
        Image,
        Quantity,
        UnitPrice,
        BasePrice,
        Tax,
        ShippingCost,
        Discount,
        TotalPrice,
        CreatedAt,
    }
}

mod m20240101_000003_create_cart_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_cart_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create cart_items table aligned with entities::cart_item Model
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Title).string().not_null())
                        .col(ColumnDef::new(CartItems::Description).string().null())
                        .col(ColumnDef::new(CartItems::Image).string().null())
                        .col(ColumnDef::new(CartItems::Size).string().null())
                        .col(ColumnDef::new(CartItems::Color).string().null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(CartItems::UnitPrice).decimal().not_null())
                        .col(ColumnDef::new(CartItems::BasePrice).decimal().null())
                        .col(
                            ColumnDef::new(CartItems::Tax)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CartItems::ShippingCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CartItems::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CartItems::Total).decimal().null())
                        .col(ColumnDef::new(CartItems::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(CartItems::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_user_id")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CartItems {
        Table,
        Id,
        UserId,
        ProductId,
        Title,
        Description,
        Image,
        Size,
        Color,
        Quantity,
        UnitPrice,
        BasePrice,
        Tax,
        ShippingCost,
        Discount,
        Total,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_order_audit_log_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_order_audit_log_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Append-only audit trail; rows are never updated or deleted.
            manager
                .create_table(
                    Table::create()
                        .table(OrderAuditLog::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderAuditLog::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderAuditLog::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderAuditLog::Action).string().not_null())
                        .col(ColumnDef::new(OrderAuditLog::ActorId).uuid().null())
                        .col(
                            ColumnDef::new(OrderAuditLog::RecordedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderAuditLog::Meta).json().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_audit_log_order_id")
                        .table(OrderAuditLog::Table)
                        .col(OrderAuditLog::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderAuditLog::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderAuditLog {
        Table,
        Id,
        OrderId,
        Action,
        ActorId,
        RecordedAt,
        Meta,
    }
}

mod m20240101_000005_create_ledger_entries_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_ledger_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LedgerEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::OrderId).uuid().not_null())
                        .col(ColumnDef::new(LedgerEntries::UserId).uuid().not_null())
                        .col(ColumnDef::new(LedgerEntries::Amount).decimal().not_null())
                        .col(ColumnDef::new(LedgerEntries::Currency).string().not_null())
                        .col(
                            ColumnDef::new(LedgerEntries::Description)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_entries_order_id")
                        .table(LedgerEntries::Table)
                        .col(LedgerEntries::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum LedgerEntries {
        Table,
        Id,
        OrderId,
        UserId,
        Amount,
        Currency,
        Description,
        CreatedAt,
    }
}

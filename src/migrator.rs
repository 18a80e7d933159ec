use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_orders_table::Migration),
            Box::new(m20240101_000003_create_order_items_table::Migration),
            Box::new(m20240101_000004_create_pending_checkouts_table::Migration),
            Box::new(m20240101_000005_create_coupons_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::Sku).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).string().null())
                        .col(ColumnDef::new(Products::Price).decimal().not_null())
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::SoldCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::WeightKg).decimal().null())
                        .col(ColumnDef::new(Products::HsnCode).string().null())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_sku")
                        .table(Products::Table)
                        .col(Products::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_is_available")
                        .table(Products::Table)
                        .col(Products::IsAvailable)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
        Sku,
        Name,
        Description,
        Price,
        Stock,
        IsAvailable,
        SoldCount,
        WeightKg,
        HsnCode,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::UserId).string().null())
                        .col(ColumnDef::new(Orders::CustomerName).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerEmail).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerPhone).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal().not_null())
                        .col(
                            ColumnDef::new(Orders::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::ShippingFee)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Tax).decimal().not_null().default(0))
                        .col(ColumnDef::new(Orders::TotalAmount).decimal().not_null())
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::CouponCode).string().null())
                        .col(ColumnDef::new(Orders::ShippingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::GatewayOrderId).string().null())
                        .col(ColumnDef::new(Orders::GatewayPaymentId).string().null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string().null())
                        .col(ColumnDef::new(Orders::ShipmentOrderId).string().null())
                        .col(ColumnDef::new(Orders::ShipmentId).string().null())
                        .col(ColumnDef::new(Orders::AwbCode).string().null())
                        .col(ColumnDef::new(Orders::CourierId).string().null())
                        .col(ColumnDef::new(Orders::CourierName).string().null())
                        .col(
                            ColumnDef::new(Orders::CurrentShipmentStatus)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::AwbAssignedAt).timestamp().null())
                        .col(
                            ColumnDef::new(Orders::PickupScheduledAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::ShipmentCreatedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::ShipmentCancelledAt)
                                .timestamp()
                                .null(),
                        )
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

            // The unique index is the second line of defense against a
            // racing double confirmation of the same gateway order.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_gateway_order_id")
                        .table(Orders::Table)
                        .col(Orders::GatewayOrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

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
                        .name("idx_orders_shipment_id")
                        .table(Orders::Table)
                        .col(Orders::ShipmentId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_awb_code")
                        .table(Orders::Table)
                        .col(Orders::AwbCode)
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

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        CustomerName,
        CustomerEmail,
        CustomerPhone,
        Status,
        PaymentStatus,
        Subtotal,
        Discount,
        ShippingFee,
        Tax,
        TotalAmount,
        Currency,
        CouponCode,
        ShippingAddress,
        GatewayOrderId,
        GatewayPaymentId,
        PaymentMethod,
        ShipmentOrderId,
        ShipmentId,
        AwbCode,
        CourierId,
        CourierName,
        CurrentShipmentStatus,
        AwbAssignedAt,
        PickupScheduledAt,
        ShipmentCreatedAt,
        ShipmentCancelledAt,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000003_create_order_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
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
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::UnitPrice).decimal().not_null())
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

    #[derive(Iden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Name,
        Quantity,
        UnitPrice,
        CreatedAt,
    }
}

mod m20240101_000004_create_pending_checkouts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_pending_checkouts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PendingCheckouts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PendingCheckouts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::GatewayOrderId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PendingCheckouts::UserId).string().null())
                        .col(
                            ColumnDef::new(PendingCheckouts::CustomerName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::CustomerEmail)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::CustomerPhone)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::LineItems)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::Subtotal)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::ShippingFee)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PendingCheckouts::Tax).decimal().not_null())
                        .col(
                            ColumnDef::new(PendingCheckouts::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::Total)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::CouponCode)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::ShippingAddress)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCheckouts::CreatedAt)
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
                        .name("idx_pending_checkouts_gateway_order_id")
                        .table(PendingCheckouts::Table)
                        .col(PendingCheckouts::GatewayOrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Sweep task scans by age
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_pending_checkouts_created_at")
                        .table(PendingCheckouts::Table)
                        .col(PendingCheckouts::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PendingCheckouts::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum PendingCheckouts {
        Table,
        Id,
        GatewayOrderId,
        UserId,
        CustomerName,
        CustomerEmail,
        CustomerPhone,
        LineItems,
        Subtotal,
        ShippingFee,
        Tax,
        Discount,
        Total,
        CouponCode,
        ShippingAddress,
        CreatedAt,
    }
}

mod m20240101_000005_create_coupons_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_coupons_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Coupons::Code).string().not_null())
                        .col(
                            ColumnDef::new(Coupons::DiscountPercentage)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Coupons::ExpiresAt).timestamp().not_null())
                        .col(ColumnDef::new(Coupons::UserId).string().null())
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Coupons::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::UsageLimit).integer().null())
                        .col(ColumnDef::new(Coupons::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Coupons::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupons_code")
                        .table(Coupons::Table)
                        .col(Coupons::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupons_user_id")
                        .table(Coupons::Table)
                        .col(Coupons::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Coupons {
        Table,
        Id,
        Code,
        DiscountPercentage,
        ExpiresAt,
        UserId,
        IsActive,
        UsageCount,
        UsageLimit,
        CreatedAt,
        UpdatedAt,
    }
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // zones 表
        manager
            .create_table(
                Table::create()
                    .table(Zone::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Zone::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Zone::TenantId).string().not_null())
                    .col(ColumnDef::new(Zone::Name).string().not_null())
                    .col(ColumnDef::new(Zone::Status).string().not_null().default("active"))
                    .col(ColumnDef::new(Zone::RegistrarType).string().null())
                    .col(ColumnDef::new(Zone::ProviderId).string().null())
                    .col(ColumnDef::new(Zone::ExpiresAt).string().null())
                    .col(ColumnDef::new(Zone::AutoRenew).boolean().not_null().default(false))
                    .col(ColumnDef::new(Zone::GroupId).string().null())
                    .col(ColumnDef::new(Zone::Remark).string().null())
                    .col(ColumnDef::new(Zone::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Zone::UpdatedBy).string().not_null())
                    .col(ColumnDef::new(Zone::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Zone::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uq_zones_tenant_name")
                    .table(Zone::Table)
                    .col(Zone::TenantId)
                    .col(Zone::Name)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // providers 表（名称唯一性由服务层检查，软删除的行不参与）
        manager
            .create_table(
                Table::create()
                    .table(Provider::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Provider::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Provider::TenantId).string().not_null())
                    .col(ColumnDef::new(Provider::Name).string().not_null())
                    .col(ColumnDef::new(Provider::ProviderType).string().not_null())
                    .col(ColumnDef::new(Provider::CredentialsEnc).text().not_null())
                    .col(ColumnDef::new(Provider::RateLimit).big_integer().not_null())
                    .col(ColumnDef::new(Provider::Concurrency).big_integer().not_null())
                    .col(ColumnDef::new(Provider::TimeoutSecs).big_integer().not_null())
                    .col(ColumnDef::new(Provider::IsDefault).boolean().not_null().default(false))
                    .col(ColumnDef::new(Provider::Status).string().not_null())
                    .col(ColumnDef::new(Provider::HealthStatus).string().not_null())
                    .col(ColumnDef::new(Provider::LastCheckedAt).string().null())
                    .col(ColumnDef::new(Provider::LastLatencyMs).big_integer().null())
                    .col(ColumnDef::new(Provider::LastError).text().null())
                    .col(ColumnDef::new(Provider::Remark).string().null())
                    .col(ColumnDef::new(Provider::DeletedAt).string().null())
                    .col(ColumnDef::new(Provider::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Provider::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_providers_tenant")
                    .table(Provider::Table)
                    .col(Provider::TenantId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // records 表
        manager
            .create_table(
                Table::create()
                    .table(Record::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Record::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Record::TenantId).string().not_null())
                    .col(ColumnDef::new(Record::ZoneId).string().not_null())
                    .col(ColumnDef::new(Record::ProviderId).string().null())
                    .col(ColumnDef::new(Record::Name).string().not_null())
                    .col(ColumnDef::new(Record::RecordType).string().not_null())
                    .col(ColumnDef::new(Record::Value).text().not_null())
                    .col(ColumnDef::new(Record::Ttl).big_integer().not_null())
                    .col(ColumnDef::new(Record::Priority).integer().null())
                    .col(ColumnDef::new(Record::Weight).integer().null())
                    .col(ColumnDef::new(Record::Port).integer().null())
                    .col(ColumnDef::new(Record::SyncStatus).string().not_null().default("pending"))
                    .col(ColumnDef::new(Record::CloudRecordId).string().null())
                    .col(ColumnDef::new(Record::LastSyncAt).string().null())
                    .col(ColumnDef::new(Record::Remark).string().null())
                    .col(ColumnDef::new(Record::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Record::UpdatedBy).string().not_null())
                    .col(ColumnDef::new(Record::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Record::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uq_records_zone_name_type")
                    .table(Record::Table)
                    .col(Record::ZoneId)
                    .col(Record::Name)
                    .col(Record::RecordType)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // certificates 表
        manager
            .create_table(
                Table::create()
                    .table(Certificate::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Certificate::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Certificate::TenantId).string().not_null())
                    .col(ColumnDef::new(Certificate::ZoneId).string().null())
                    .col(ColumnDef::new(Certificate::ProviderId).string().null())
                    .col(ColumnDef::new(Certificate::CommonName).string().not_null())
                    .col(
                        ColumnDef::new(Certificate::SubjectAltNames)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Certificate::CaType).string().not_null())
                    .col(ColumnDef::new(Certificate::Status).string().not_null())
                    .col(ColumnDef::new(Certificate::KeyType).string().not_null())
                    .col(ColumnDef::new(Certificate::ChallengeType).string().not_null())
                    .col(ColumnDef::new(Certificate::Email).string().null())
                    .col(ColumnDef::new(Certificate::CertificateEnc).text().null())
                    .col(ColumnDef::new(Certificate::PrivateKeyEnc).text().null())
                    .col(ColumnDef::new(Certificate::ChainEnc).text().null())
                    .col(ColumnDef::new(Certificate::CsrPem).text().null())
                    .col(ColumnDef::new(Certificate::SerialNumber).string().null())
                    .col(ColumnDef::new(Certificate::Fingerprint).string().null())
                    .col(ColumnDef::new(Certificate::IssuedAt).string().null())
                    .col(ColumnDef::new(Certificate::ExpiresAt).string().null())
                    .col(ColumnDef::new(Certificate::AutoRenew).boolean().not_null().default(true))
                    .col(ColumnDef::new(Certificate::RenewDays).big_integer().not_null().default(30))
                    .col(ColumnDef::new(Certificate::LastRenewAt).string().null())
                    .col(ColumnDef::new(Certificate::RenewedFrom).string().null())
                    .col(ColumnDef::new(Certificate::ErrorMessage).text().null())
                    .col(ColumnDef::new(Certificate::Remark).string().null())
                    .col(ColumnDef::new(Certificate::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Certificate::UpdatedBy).string().not_null())
                    .col(ColumnDef::new(Certificate::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Certificate::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_certificates_tenant_status")
                    .table(Certificate::Table)
                    .col(Certificate::TenantId)
                    .col(Certificate::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // certificate_deployments 表
        manager
            .create_table(
                Table::create()
                    .table(CertificateDeployment::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CertificateDeployment::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CertificateDeployment::CertificateId).string().not_null())
                    .col(ColumnDef::new(CertificateDeployment::TenantId).string().not_null())
                    .col(ColumnDef::new(CertificateDeployment::Host).string().not_null())
                    .col(ColumnDef::new(CertificateDeployment::DeployPath).string().not_null())
                    .col(ColumnDef::new(CertificateDeployment::ServiceName).string().not_null())
                    .col(ColumnDef::new(CertificateDeployment::Status).string().not_null())
                    .col(ColumnDef::new(CertificateDeployment::ErrorMessage).text().null())
                    .col(ColumnDef::new(CertificateDeployment::DeployedAt).string().null())
                    .col(ColumnDef::new(CertificateDeployment::CreatedAt).string().not_null())
                    .col(ColumnDef::new(CertificateDeployment::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_deployments_certificate")
                    .table(CertificateDeployment::Table)
                    .col(CertificateDeployment::CertificateId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // change_logs 表
        manager
            .create_table(
                Table::create()
                    .table(ChangeLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ChangeLog::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(ChangeLog::TenantId).string().not_null())
                    .col(ColumnDef::new(ChangeLog::ResourceType).string().not_null())
                    .col(ColumnDef::new(ChangeLog::ResourceId).string().not_null())
                    .col(ColumnDef::new(ChangeLog::Action).string().not_null())
                    .col(ColumnDef::new(ChangeLog::Before).text().null())
                    .col(ColumnDef::new(ChangeLog::After).text().null())
                    .col(ColumnDef::new(ChangeLog::Status).string().not_null())
                    .col(ColumnDef::new(ChangeLog::Description).text().null())
                    .col(ColumnDef::new(ChangeLog::ActorId).string().not_null())
                    .col(ColumnDef::new(ChangeLog::ClientIp).string().not_null())
                    .col(ColumnDef::new(ChangeLog::CreatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_change_logs_tenant_created")
                    .table(ChangeLog::Table)
                    .col(ChangeLog::TenantId)
                    .col(ChangeLog::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChangeLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CertificateDeployment::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Certificate::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Record::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Provider::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Zone::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Zone {
    #[sea_orm(iden = "zones")]
    Table,
    Id,
    TenantId,
    Name,
    Status,
    RegistrarType,
    ProviderId,
    ExpiresAt,
    AutoRenew,
    GroupId,
    Remark,
    CreatedBy,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Provider {
    #[sea_orm(iden = "providers")]
    Table,
    Id,
    TenantId,
    Name,
    ProviderType,
    CredentialsEnc,
    RateLimit,
    Concurrency,
    TimeoutSecs,
    IsDefault,
    Status,
    HealthStatus,
    LastCheckedAt,
    LastLatencyMs,
    LastError,
    Remark,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Record {
    #[sea_orm(iden = "records")]
    Table,
    Id,
    TenantId,
    ZoneId,
    ProviderId,
    Name,
    RecordType,
    Value,
    Ttl,
    Priority,
    Weight,
    Port,
    SyncStatus,
    CloudRecordId,
    LastSyncAt,
    Remark,
    CreatedBy,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Certificate {
    #[sea_orm(iden = "certificates")]
    Table,
    Id,
    TenantId,
    ZoneId,
    ProviderId,
    CommonName,
    SubjectAltNames,
    CaType,
    Status,
    KeyType,
    ChallengeType,
    Email,
    CertificateEnc,
    PrivateKeyEnc,
    ChainEnc,
    CsrPem,
    SerialNumber,
    Fingerprint,
    IssuedAt,
    ExpiresAt,
    AutoRenew,
    RenewDays,
    LastRenewAt,
    RenewedFrom,
    ErrorMessage,
    Remark,
    CreatedBy,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CertificateDeployment {
    #[sea_orm(iden = "certificate_deployments")]
    Table,
    Id,
    CertificateId,
    TenantId,
    Host,
    DeployPath,
    ServiceName,
    Status,
    ErrorMessage,
    DeployedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ChangeLog {
    #[sea_orm(iden = "change_logs")]
    Table,
    Id,
    TenantId,
    ResourceType,
    ResourceId,
    Action,
    Before,
    After,
    Status,
    Description,
    ActorId,
    ClientIp,
    CreatedAt,
}

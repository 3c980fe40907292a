use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProgressRun::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProgressRun::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProgressRun::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(ProgressRun::StartedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(ProgressRun::LastUpdated).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(ProgressRun::TotalVideos).big_integer().not_null())
                    .col(ColumnDef::new(ProgressRun::CompletedVideos).big_integer().not_null())
                    .col(ColumnDef::new(ProgressRun::CurrentBatch).big_integer().not_null())
                    .col(ColumnDef::new(ProgressRun::TotalBatches).big_integer().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_table(
                Table::create()
                    .table(ProgressSuccess::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProgressSuccess::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProgressSuccess::RunId).integer().not_null())
                    .col(ColumnDef::new(ProgressSuccess::VideoId).string().not_null())
                    .to_owned(),
            )
            .await?;
        // 同一个视频在一次任务中只会成功一次
        manager
            .create_index(
                Index::create()
                    .table(ProgressSuccess::Table)
                    .name("idx_progress_success_run_id_video_id")
                    .col(ProgressSuccess::RunId)
                    .col(ProgressSuccess::VideoId)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_table(
                Table::create()
                    .table(ProgressFailure::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProgressFailure::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProgressFailure::RunId).integer().not_null())
                    .col(ColumnDef::new(ProgressFailure::VideoId).string().not_null())
                    .col(ColumnDef::new(ProgressFailure::Error).text().not_null())
                    .col(
                        ColumnDef::new(ProgressFailure::FailedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .table(ProgressFailure::Table)
                    .name("idx_progress_failure_run_id")
                    .col(ProgressFailure::RunId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .table(ProgressFailure::Table)
                    .name("idx_progress_failure_run_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ProgressFailure::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .table(ProgressSuccess::Table)
                    .name("idx_progress_success_run_id_video_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ProgressSuccess::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProgressRun::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProgressRun {
    Table,
    Id,
    Name,
    StartedAt,
    LastUpdated,
    TotalVideos,
    CompletedVideos,
    CurrentBatch,
    TotalBatches,
}

#[derive(DeriveIden)]
enum ProgressSuccess {
    Table,
    Id,
    RunId,
    VideoId,
}

#[derive(DeriveIden)]
enum ProgressFailure {
    Table,
    Id,
    RunId,
    VideoId,
    Error,
    FailedAt,
}

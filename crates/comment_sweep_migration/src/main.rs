use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    cli::run_cli(comment_sweep_migration::Migrator).await;
}

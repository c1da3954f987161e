pub use sea_orm_migration::prelude::*;

mod m20251101_000001_create_users_table;
mod m20251101_000002_create_tasks_table;
mod m20251115_000001_add_tasks_owner_deadline_index;
mod m20251203_000001_add_password_reset_columns;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251101_000001_create_users_table::Migration),
            Box::new(m20251101_000002_create_tasks_table::Migration),
            Box::new(m20251115_000001_add_tasks_owner_deadline_index::Migration),
            Box::new(m20251203_000001_add_password_reset_columns::Migration),
        ]
    }
}

use crate::storage::entity::{
    app_setting, bidder, bidder_check, bidder_check_line, bidder_document, eligibility_criterion,
    job, payment, tender, work_experience,
};
use log::info;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    EntityTrait, Schema, Statement,
};
use std::time::Duration;

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_bidders_job_company ON bidders(job_id, company_name);",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_tenders_job ON tenders(job_id);",
    "CREATE INDEX IF NOT EXISTS idx_criteria_job ON eligibility_criteria(job_id, seq);",
    "CREATE INDEX IF NOT EXISTS idx_payments_bidder ON payments(bidder_id);",
    "CREATE INDEX IF NOT EXISTS idx_work_experiences_bidder ON work_experiences(bidder_id);",
    "CREATE INDEX IF NOT EXISTS idx_bidder_documents_bidder ON bidder_documents(bidder_id);",
    "CREATE INDEX IF NOT EXISTS idx_bidder_checks_job ON bidder_checks(job_id);",
    "CREATE INDEX IF NOT EXISTS idx_check_lines_check ON bidder_check_lines(check_id);",
];

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;
    let backend = db.get_database_backend();

    if backend == DatabaseBackend::Sqlite {
        db.execute(Statement::from_string(
            backend,
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;
        db.execute(Statement::from_string(
            backend,
            "PRAGMA busy_timeout=5000;".to_string(),
        ))
        .await?;
    }

    create_table(&db, job::Entity).await?;
    create_table(&db, tender::Entity).await?;
    create_table(&db, eligibility_criterion::Entity).await?;
    create_table(&db, bidder::Entity).await?;
    create_table(&db, payment::Entity).await?;
    create_table(&db, work_experience::Entity).await?;
    create_table(&db, bidder_document::Entity).await?;
    create_table(&db, bidder_check::Entity).await?;
    create_table(&db, bidder_check_line::Entity).await?;
    create_table(&db, app_setting::Entity).await?;

    for sql in INDEXES {
        db.execute(Statement::from_string(backend, sql.to_string()))
            .await?;
    }

    info!("Database connection established ({:?}), tables initialized.", backend);
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let stmt = backend.build(schema.create_table_from_entity(entity).if_not_exists());
    db.execute(stmt).await?;
    Ok(())
}

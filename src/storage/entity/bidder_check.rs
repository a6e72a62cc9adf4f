use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "bidder_checks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub job_id: i32,
    pub bidder_id: i32,
    pub overall_result: String, // pass/fail/unknown
    pub total_criteria: i32,
    pub passed_criteria: i32,
    pub failed_criteria: i32,
    pub unknown_criteria: i32,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

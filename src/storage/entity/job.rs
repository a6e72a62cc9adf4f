use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub state: String, // draft/extracting/extracted/processing/completed/failed/cancelled
    pub archive_path: String,
    pub run_id: Option<String>,
    pub extraction_started_at: Option<i64>,
    pub extraction_finished_at: Option<i64>,
    pub evaluation_started_at: Option<i64>,
    pub evaluation_finished_at: Option<i64>,
    pub error_message: Option<String>,
    pub analytics_json: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "tenders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub job_id: i32,
    pub department_name: String,
    pub tender_id: String,
    pub ref_no: String,
    pub title: String,
    pub procurement_category: String,
    pub tender_type: String,
    pub organisation_chain: String,
    pub estimated_value: String,
    pub currency: String,
    pub validity_from: String,
    pub validity_to: String,
    pub published_on: String,
    pub bid_submission_start: String,
    pub bid_submission_end: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Text")]
    pub notice: String,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

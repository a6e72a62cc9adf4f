use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "work_experiences")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub bidder_id: i32,
    pub vendor_name: String,
    #[sea_orm(column_type = "Text")]
    pub name_of_work: String,
    pub employer: String,
    pub location: String,
    pub contract_amount: String,
    pub date_of_start: String,
    pub date_of_completion: String,
    pub has_completion_certificate: bool,
    pub attachment: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

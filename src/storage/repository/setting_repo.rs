use crate::storage::entity::app_setting::{self, ActiveModel as SettingActiveModel, Entity as AppSetting};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Set};

pub struct SettingRepository;

impl SettingRepository {
    pub async fn get<C: ConnectionTrait>(db: &C, key: &str) -> Result<Option<String>, DbErr> {
        Ok(AppSetting::find_by_id(key.to_string())
            .one(db)
            .await?
            .map(|m| m.value))
    }

    pub async fn set<C: ConnectionTrait>(db: &C, key: &str, value: &str) -> Result<(), DbErr> {
        let model = SettingActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now().timestamp()),
        };
        AppSetting::insert(model)
            .on_conflict(
                OnConflict::column(app_setting::Column::Key)
                    .update_columns([app_setting::Column::Value, app_setting::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        Ok(())
    }
}

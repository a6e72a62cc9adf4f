use crate::job::model::JobState;
use crate::storage::entity::job::{self, ActiveModel as JobActiveModel, Entity as Job};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, UpdateMany,
};

pub struct JobRepository;

impl JobRepository {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        name: &str,
        archive_path: &str,
    ) -> Result<job::Model, DbErr> {
        let now = Utc::now().timestamp();
        JobActiveModel {
            name: Set(name.to_string()),
            state: Set(JobState::Draft.as_str().to_string()),
            archive_path: Set(archive_path.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<job::Model>, DbErr> {
        Job::find_by_id(id).one(db).await
    }

    pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<job::Model>, DbErr> {
        Job::find().order_by_desc(job::Column::Id).all(db).await
    }

    /// `UPDATE jobs SET state = to WHERE id = ? AND state IN (from)`. Returns whether a row moved.
    async fn guarded<C: ConnectionTrait>(
        db: &C,
        id: i32,
        from: &[JobState],
        to: JobState,
        patch: impl FnOnce(UpdateMany<Job>) -> UpdateMany<Job>,
    ) -> Result<bool, DbErr> {
        let now = Utc::now().timestamp();
        let query = Job::update_many()
            .col_expr(job::Column::State, Expr::value(to.as_str()))
            .col_expr(job::Column::UpdatedAt, Expr::value(now))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::State.is_in(from.iter().map(|s| s.as_str())));
        let res = patch(query).exec(db).await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn begin_extraction<C: ConnectionTrait>(
        db: &C,
        id: i32,
        run_id: &str,
    ) -> Result<bool, DbErr> {
        let now = Utc::now().timestamp();
        let run_id = run_id.to_string();
        Self::guarded(db, id, &[JobState::Draft], JobState::Extracting, |q| {
            q.col_expr(job::Column::RunId, Expr::value(Some(run_id)))
                .col_expr(job::Column::ExtractionStartedAt, Expr::value(Some(now)))
                .col_expr(job::Column::ExtractionFinishedAt, Expr::value(Option::<i64>::None))
                .col_expr(job::Column::ErrorMessage, Expr::value(Option::<String>::None))
        })
        .await
    }

    pub async fn finish_extraction<C: ConnectionTrait>(
        db: &C,
        id: i32,
        analytics_json: &str,
    ) -> Result<bool, DbErr> {
        let now = Utc::now().timestamp();
        let analytics = analytics_json.to_string();
        Self::guarded(db, id, &[JobState::Extracting], JobState::Extracted, |q| {
            q.col_expr(job::Column::ExtractionFinishedAt, Expr::value(Some(now)))
                .col_expr(job::Column::AnalyticsJson, Expr::value(Some(analytics)))
        })
        .await
    }

    pub async fn begin_evaluation<C: ConnectionTrait>(db: &C, id: i32) -> Result<bool, DbErr> {
        let now = Utc::now().timestamp();
        Self::guarded(db, id, &[JobState::Extracted], JobState::Processing, |q| {
            q.col_expr(job::Column::EvaluationStartedAt, Expr::value(Some(now)))
                .col_expr(job::Column::EvaluationFinishedAt, Expr::value(Option::<i64>::None))
                .col_expr(job::Column::ErrorMessage, Expr::value(Option::<String>::None))
        })
        .await
    }

    pub async fn finish_evaluation<C: ConnectionTrait>(
        db: &C,
        id: i32,
        analytics_json: &str,
    ) -> Result<bool, DbErr> {
        let now = Utc::now().timestamp();
        let analytics = analytics_json.to_string();
        Self::guarded(db, id, &[JobState::Processing], JobState::Completed, |q| {
            q.col_expr(job::Column::EvaluationFinishedAt, Expr::value(Some(now)))
                .col_expr(job::Column::AnalyticsJson, Expr::value(Some(analytics)))
        })
        .await
    }

    /// Moves an active job to `failed`. Terminal states written concurrently are left alone.
    pub async fn mark_failed<C: ConnectionTrait>(
        db: &C,
        id: i32,
        message: &str,
        analytics_json: Option<&str>,
    ) -> Result<bool, DbErr> {
        let message = message.to_string();
        let analytics = analytics_json.map(|s| s.to_string());
        Self::guarded(db, id, &JobState::ACTIVE, JobState::Failed, |q| {
            let q = q.col_expr(job::Column::ErrorMessage, Expr::value(Some(message)));
            match analytics {
                Some(a) => q.col_expr(job::Column::AnalyticsJson, Expr::value(Some(a))),
                None => q,
            }
        })
        .await
    }

    pub async fn mark_cancelled<C: ConnectionTrait>(
        db: &C,
        id: i32,
        analytics_json: Option<&str>,
    ) -> Result<bool, DbErr> {
        let analytics = analytics_json.map(|s| s.to_string());
        Self::guarded(db, id, &JobState::ACTIVE, JobState::Cancelled, |q| match analytics {
            Some(a) => q.col_expr(job::Column::AnalyticsJson, Expr::value(Some(a))),
            None => q,
        })
        .await
    }

    /// Analytics of a job that already left the active states (e.g. cancelled mid-phase).
    pub async fn set_analytics<C: ConnectionTrait>(
        db: &C,
        id: i32,
        analytics_json: &str,
    ) -> Result<(), DbErr> {
        Job::update_many()
            .col_expr(job::Column::AnalyticsJson, Expr::value(Some(analytics_json.to_string())))
            .filter(job::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn reset_to_draft<C: ConnectionTrait>(db: &C, id: i32) -> Result<bool, DbErr> {
        Self::guarded(db, id, &JobState::RESETTABLE, JobState::Draft, |q| {
            q.col_expr(job::Column::RunId, Expr::value(Option::<String>::None))
                .col_expr(job::Column::ExtractionStartedAt, Expr::value(Option::<i64>::None))
                .col_expr(job::Column::ExtractionFinishedAt, Expr::value(Option::<i64>::None))
                .col_expr(job::Column::EvaluationStartedAt, Expr::value(Option::<i64>::None))
                .col_expr(job::Column::EvaluationFinishedAt, Expr::value(Option::<i64>::None))
                .col_expr(job::Column::ErrorMessage, Expr::value(Option::<String>::None))
                .col_expr(job::Column::AnalyticsJson, Expr::value(Option::<String>::None))
        })
        .await
    }

    /// Jobs left active by a previous process are failed; returns how many were touched.
    pub async fn fail_interrupted<C: ConnectionTrait>(db: &C, message: &str) -> Result<u64, DbErr> {
        let now = Utc::now().timestamp();
        let res = Job::update_many()
            .col_expr(job::Column::State, Expr::value(JobState::Failed.as_str()))
            .col_expr(job::Column::ErrorMessage, Expr::value(Some(message.to_string())))
            .col_expr(job::Column::UpdatedAt, Expr::value(now))
            .filter(job::Column::State.is_in(JobState::ACTIVE.iter().map(|s| s.as_str())))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}

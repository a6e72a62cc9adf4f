use crate::evaluate::model::{serial_key, CheckLine, Verdict};
use crate::storage::entity::bidder_check::{
    self, ActiveModel as CheckActiveModel, Entity as BidderCheck,
};
use crate::storage::entity::bidder_check_line::{
    self, ActiveModel as LineActiveModel, Entity as BidderCheckLine,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashSet;

/// One evaluated bidder, ready to be written as a check plus its lines.
#[derive(Clone, Debug)]
pub struct NewCheck {
    pub job_id: i32,
    pub bidder_id: i32,
    pub overall_result: Verdict,
    pub total_criteria: i32,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub lines: Vec<CheckLine>,
}

pub struct CheckRepository;

impl CheckRepository {
    /// Stores the check and its lines. Only the first line of each serial is kept, and the
    /// pass/fail counts never exceed `total_criteria`.
    pub async fn insert<C: ConnectionTrait>(
        db: &C,
        check: &NewCheck,
    ) -> Result<bidder_check::Model, DbErr> {
        let mut seen = HashSet::new();
        let lines: Vec<&CheckLine> = check
            .lines
            .iter()
            .filter(|l| seen.insert(serial_key(&l.sl_no)))
            .collect();
        let total = check.total_criteria.max(0);
        let passed = (lines.iter().filter(|l| l.result == Verdict::Pass).count() as i32).min(total);
        let failed =
            (lines.iter().filter(|l| l.result == Verdict::Fail).count() as i32).min(total - passed);
        let unknown = total - passed - failed;

        let saved = CheckActiveModel {
            job_id: Set(check.job_id),
            bidder_id: Set(check.bidder_id),
            overall_result: Set(check.overall_result.as_str().to_string()),
            total_criteria: Set(check.total_criteria),
            passed_criteria: Set(passed),
            failed_criteria: Set(failed),
            unknown_criteria: Set(unknown),
            duration_ms: Set(check.duration_ms),
            error_message: Set(check.error_message.clone()),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        if !lines.is_empty() {
            let rows = lines.iter().map(|l| LineActiveModel {
                check_id: Set(saved.id),
                sl_no: Set(l.sl_no.clone()),
                criteria: Set(l.criteria.clone()),
                supporting_document: Set(l.supporting_document.clone()),
                result: Set(l.result.as_str().to_string()),
                reason: Set(l.reason.clone()),
                evidence: Set(l.evidence.clone()),
                missing_documents: Set(l.missing_documents.clone()),
                ..Default::default()
            });
            BidderCheckLine::insert_many(rows).exec(db).await?;
        }
        Ok(saved)
    }

    pub async fn list_for_job<C: ConnectionTrait>(
        db: &C,
        job_id: i32,
    ) -> Result<Vec<bidder_check::Model>, DbErr> {
        BidderCheck::find()
            .filter(bidder_check::Column::JobId.eq(job_id))
            .order_by_asc(bidder_check::Column::Id)
            .all(db)
            .await
    }

    pub async fn count_for_job<C: ConnectionTrait>(db: &C, job_id: i32) -> Result<u64, DbErr> {
        BidderCheck::find()
            .filter(bidder_check::Column::JobId.eq(job_id))
            .count(db)
            .await
    }

    pub async fn lines_for<C: ConnectionTrait>(
        db: &C,
        check_id: i32,
    ) -> Result<Vec<bidder_check_line::Model>, DbErr> {
        BidderCheckLine::find()
            .filter(bidder_check_line::Column::CheckId.eq(check_id))
            .order_by_asc(bidder_check_line::Column::Id)
            .all(db)
            .await
    }

    pub async fn delete_for_job<C: ConnectionTrait>(db: &C, job_id: i32) -> Result<u64, DbErr> {
        let ids: Vec<i32> = BidderCheck::find()
            .select_only()
            .column(bidder_check::Column::Id)
            .filter(bidder_check::Column::JobId.eq(job_id))
            .into_tuple()
            .all(db)
            .await?;
        if ids.is_empty() {
            return Ok(0);
        }
        BidderCheckLine::delete_many()
            .filter(bidder_check_line::Column::CheckId.is_in(ids))
            .exec(db)
            .await?;
        let res = BidderCheck::delete_many()
            .filter(bidder_check::Column::JobId.eq(job_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}

use crate::extract::model::{CriterionRow, TenderFacts};
use crate::storage::entity::eligibility_criterion::{
    self, ActiveModel as CriterionActiveModel, Entity as EligibilityCriterion,
};
use crate::storage::entity::tender::{self, ActiveModel as TenderActiveModel, Entity as Tender};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};

pub struct TenderRepository;

impl TenderRepository {
    /// Stores the tender row and its criteria, replacing whatever the job had before.
    pub async fn replace_for_job<C: ConnectionTrait>(
        db: &C,
        job_id: i32,
        facts: &TenderFacts,
        criteria: &[CriterionRow],
    ) -> Result<tender::Model, DbErr> {
        Self::delete_for_job(db, job_id).await?;

        let saved = TenderActiveModel {
            job_id: Set(job_id),
            department_name: Set(facts.department_name.clone()),
            tender_id: Set(facts.tender_id.clone()),
            ref_no: Set(facts.ref_no.clone()),
            title: Set(facts.title.clone()),
            procurement_category: Set(facts.procurement_category.clone()),
            tender_type: Set(facts.tender_type.clone()),
            organisation_chain: Set(facts.organisation_chain.clone()),
            estimated_value: Set(facts.estimated_value.clone()),
            currency: Set(facts.currency.clone()),
            validity_from: Set(facts.validity_from.clone()),
            validity_to: Set(facts.validity_to.clone()),
            published_on: Set(facts.published_on.clone()),
            bid_submission_start: Set(facts.bid_submission_start.clone()),
            bid_submission_end: Set(facts.bid_submission_end.clone()),
            description: Set(facts.description.clone()),
            notice: Set(facts.notice.clone()),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        if !criteria.is_empty() {
            let rows = criteria.iter().enumerate().map(|(i, c)| CriterionActiveModel {
                job_id: Set(job_id),
                seq: Set(i as i32),
                sl_no: Set(c.sl_no.clone()),
                criteria: Set(c.criteria.clone()),
                supporting_document: Set(c.supporting_document.clone()),
                ..Default::default()
            });
            EligibilityCriterion::insert_many(rows).exec(db).await?;
        }
        Ok(saved)
    }

    pub async fn find_by_job<C: ConnectionTrait>(
        db: &C,
        job_id: i32,
    ) -> Result<Option<tender::Model>, DbErr> {
        Tender::find()
            .filter(tender::Column::JobId.eq(job_id))
            .one(db)
            .await
    }

    pub async fn criteria_for_job<C: ConnectionTrait>(
        db: &C,
        job_id: i32,
    ) -> Result<Vec<eligibility_criterion::Model>, DbErr> {
        EligibilityCriterion::find()
            .filter(eligibility_criterion::Column::JobId.eq(job_id))
            .order_by_asc(eligibility_criterion::Column::Seq)
            .all(db)
            .await
    }

    pub async fn count_criteria<C: ConnectionTrait>(db: &C, job_id: i32) -> Result<u64, DbErr> {
        EligibilityCriterion::find()
            .filter(eligibility_criterion::Column::JobId.eq(job_id))
            .count(db)
            .await
    }

    pub async fn delete_for_job<C: ConnectionTrait>(db: &C, job_id: i32) -> Result<(), DbErr> {
        EligibilityCriterion::delete_many()
            .filter(eligibility_criterion::Column::JobId.eq(job_id))
            .exec(db)
            .await?;
        Tender::delete_many()
            .filter(tender::Column::JobId.eq(job_id))
            .exec(db)
            .await?;
        Ok(())
    }
}

impl From<&eligibility_criterion::Model> for CriterionRow {
    fn from(m: &eligibility_criterion::Model) -> Self {
        CriterionRow {
            sl_no: m.sl_no.clone(),
            criteria: m.criteria.clone(),
            supporting_document: m.supporting_document.clone(),
        }
    }
}

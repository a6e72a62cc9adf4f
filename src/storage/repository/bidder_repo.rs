use crate::extract::model::{
    work_key, BidderFacts, CompanyExtraction, PaymentRow, WorkExperienceRow, WorkKey,
};
use crate::storage::entity::bidder::{self, ActiveModel as BidderActiveModel, Entity as Bidder};
use crate::storage::entity::bidder_document::{
    self, ActiveModel as DocumentActiveModel, Entity as BidderDocument,
};
use crate::storage::entity::payment::{self, ActiveModel as PaymentActiveModel, Entity as Payment};
use crate::storage::entity::work_experience::{
    self, ActiveModel as WorkActiveModel, Entity as WorkExperience,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashSet;

/// Row counts of one company persisted during extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub bidder_id: i32,
    pub created: bool,
    pub payments_inserted: usize,
    pub payments_skipped: usize,
    pub work_inserted: usize,
    pub work_skipped: usize,
    pub documents_inserted: usize,
}

pub struct BidderRepository;

impl BidderRepository {
    pub async fn find_by_name<C: ConnectionTrait>(
        db: &C,
        job_id: i32,
        company_name: &str,
    ) -> Result<Option<bidder::Model>, DbErr> {
        Bidder::find()
            .filter(bidder::Column::JobId.eq(job_id))
            .filter(bidder::Column::CompanyName.eq(company_name))
            .one(db)
            .await
    }

    pub async fn list_for_job<C: ConnectionTrait>(
        db: &C,
        job_id: i32,
    ) -> Result<Vec<bidder::Model>, DbErr> {
        Bidder::find()
            .filter(bidder::Column::JobId.eq(job_id))
            .order_by_asc(bidder::Column::CompanyName)
            .all(db)
            .await
    }

    pub async fn count_for_job<C: ConnectionTrait>(db: &C, job_id: i32) -> Result<u64, DbErr> {
        Bidder::find()
            .filter(bidder::Column::JobId.eq(job_id))
            .count(db)
            .await
    }

    /// Upserts the bidder of `extraction` (exact company-name identity) and appends its rows.
    ///
    /// Payments whose transaction id is already stored for the bidder are skipped; payments
    /// without one are always appended. Work experience is skipped when its canonical key
    /// matches a stored row.
    pub async fn persist_extraction<C: ConnectionTrait>(
        db: &C,
        job_id: i32,
        extraction: &CompanyExtraction,
    ) -> Result<PersistSummary, DbErr> {
        let mut summary = PersistSummary::default();
        let now = Utc::now().timestamp();
        let facts = &extraction.bidder;

        let bidder_id = match Self::find_by_name(db, job_id, &extraction.company_name).await? {
            Some(existing) => {
                // newer non-empty values win on re-extraction
                let mut merged = facts.clone();
                merged.fill_missing_from(&BidderFacts::from(&existing));
                let mut am: BidderActiveModel = existing.into();
                am.company_address = Set(merged.company_address);
                am.email_id = Set(merged.email_id);
                am.contact_person = Set(merged.contact_person);
                am.contact_no = Set(merged.contact_no);
                am.pan = Set(merged.pan);
                am.gstin = Set(merged.gstin);
                am.place_of_registration = Set(merged.place_of_registration);
                am.offer_validity_days = Set(merged.offer_validity_days);
                am.updated_at = Set(now);
                am.update(db).await?.id
            }
            None => {
                summary.created = true;
                BidderActiveModel {
                    job_id: Set(job_id),
                    company_name: Set(extraction.company_name.clone()),
                    company_address: Set(facts.company_address.clone()),
                    email_id: Set(facts.email_id.clone()),
                    contact_person: Set(facts.contact_person.clone()),
                    contact_no: Set(facts.contact_no.clone()),
                    pan: Set(facts.pan.clone()),
                    gstin: Set(facts.gstin.clone()),
                    place_of_registration: Set(facts.place_of_registration.clone()),
                    offer_validity_days: Set(facts.offer_validity_days.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?
                .id
            }
        };
        summary.bidder_id = bidder_id;

        let mut known_txn: HashSet<String> = Payment::find()
            .select_only()
            .column(payment::Column::TransactionId)
            .filter(payment::Column::BidderId.eq(bidder_id))
            .into_tuple::<Option<String>>()
            .all(db)
            .await?
            .into_iter()
            .flatten()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        for row in &extraction.payments {
            let txn = row.transaction_id.trim();
            if !txn.is_empty() && !known_txn.insert(txn.to_string()) {
                summary.payments_skipped += 1;
                continue;
            }
            payment_model(bidder_id, row).insert(db).await?;
            summary.payments_inserted += 1;
        }

        let mut known_work: HashSet<WorkKey> = Self::work_for(db, bidder_id)
            .await?
            .iter()
            .map(|w| {
                work_key(
                    &w.name_of_work,
                    &w.employer,
                    &w.location,
                    &w.date_of_start,
                    &w.contract_amount,
                )
            })
            .collect();
        for row in &extraction.work_experience {
            if !known_work.insert(row.dedup_key()) {
                summary.work_skipped += 1;
                continue;
            }
            work_model(bidder_id, row).insert(db).await?;
            summary.work_inserted += 1;
        }

        let known_docs: HashSet<String> = Self::documents_for(db, bidder_id)
            .await?
            .into_iter()
            .map(|d| d.path)
            .collect();
        for path in &extraction.documents {
            let path_str = path.display().to_string();
            if known_docs.contains(&path_str) {
                continue;
            }
            DocumentActiveModel {
                bidder_id: Set(bidder_id),
                file_name: Set(path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()),
                path: Set(path_str),
                ..Default::default()
            }
            .insert(db)
            .await?;
            summary.documents_inserted += 1;
        }

        Ok(summary)
    }

    pub async fn payments_for<C: ConnectionTrait>(
        db: &C,
        bidder_id: i32,
    ) -> Result<Vec<payment::Model>, DbErr> {
        Payment::find()
            .filter(payment::Column::BidderId.eq(bidder_id))
            .order_by_asc(payment::Column::Id)
            .all(db)
            .await
    }

    pub async fn work_for<C: ConnectionTrait>(
        db: &C,
        bidder_id: i32,
    ) -> Result<Vec<work_experience::Model>, DbErr> {
        WorkExperience::find()
            .filter(work_experience::Column::BidderId.eq(bidder_id))
            .order_by_asc(work_experience::Column::Id)
            .all(db)
            .await
    }

    pub async fn documents_for<C: ConnectionTrait>(
        db: &C,
        bidder_id: i32,
    ) -> Result<Vec<bidder_document::Model>, DbErr> {
        BidderDocument::find()
            .filter(bidder_document::Column::BidderId.eq(bidder_id))
            .order_by_asc(bidder_document::Column::Path)
            .all(db)
            .await
    }

    /// Removes the job's bidders with their payments, work experience and documents.
    pub async fn delete_for_job<C: ConnectionTrait>(db: &C, job_id: i32) -> Result<u64, DbErr> {
        let ids: Vec<i32> = Bidder::find()
            .select_only()
            .column(bidder::Column::Id)
            .filter(bidder::Column::JobId.eq(job_id))
            .into_tuple()
            .all(db)
            .await?;
        if ids.is_empty() {
            return Ok(0);
        }
        Payment::delete_many()
            .filter(payment::Column::BidderId.is_in(ids.clone()))
            .exec(db)
            .await?;
        WorkExperience::delete_many()
            .filter(work_experience::Column::BidderId.is_in(ids.clone()))
            .exec(db)
            .await?;
        BidderDocument::delete_many()
            .filter(bidder_document::Column::BidderId.is_in(ids))
            .exec(db)
            .await?;
        let res = Bidder::delete_many()
            .filter(bidder::Column::JobId.eq(job_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}

fn payment_model(bidder_id: i32, row: &PaymentRow) -> PaymentActiveModel {
    let txn = row.transaction_id.trim();
    PaymentActiveModel {
        bidder_id: Set(bidder_id),
        vendor: Set(row.vendor.clone()),
        payment_mode: Set(row.payment_mode.clone()),
        bank_name: Set(row.bank_name.clone()),
        transaction_id: Set((!txn.is_empty()).then(|| txn.to_string())),
        amount: Set(row.amount.clone()),
        transaction_date: Set(row.transaction_date.clone()),
        status: Set(row.status.clone()),
        ..Default::default()
    }
}

fn work_model(bidder_id: i32, row: &WorkExperienceRow) -> WorkActiveModel {
    WorkActiveModel {
        bidder_id: Set(bidder_id),
        vendor_name: Set(row.vendor_name.clone()),
        name_of_work: Set(row.name_of_work.clone()),
        employer: Set(row.employer.clone()),
        location: Set(row.location.clone()),
        contract_amount: Set(row.contract_amount.clone()),
        date_of_start: Set(row.date_of_start.clone()),
        date_of_completion: Set(row.date_of_completion.clone()),
        has_completion_certificate: Set(row.completion_certificate),
        attachment: Set(row.attachment.clone()),
        ..Default::default()
    }
}

impl From<&bidder::Model> for BidderFacts {
    fn from(m: &bidder::Model) -> Self {
        BidderFacts {
            company_name: m.company_name.clone(),
            company_address: m.company_address.clone(),
            email_id: m.email_id.clone(),
            contact_person: m.contact_person.clone(),
            contact_no: m.contact_no.clone(),
            pan: m.pan.clone(),
            gstin: m.gstin.clone(),
            place_of_registration: m.place_of_registration.clone(),
            offer_validity_days: m.offer_validity_days.clone(),
        }
    }
}

impl From<&payment::Model> for PaymentRow {
    fn from(m: &payment::Model) -> Self {
        PaymentRow {
            vendor: m.vendor.clone(),
            payment_mode: m.payment_mode.clone(),
            bank_name: m.bank_name.clone(),
            transaction_id: m.transaction_id.clone().unwrap_or_default(),
            amount: m.amount.clone(),
            transaction_date: m.transaction_date.clone(),
            status: m.status.clone(),
        }
    }
}

impl From<&work_experience::Model> for WorkExperienceRow {
    fn from(m: &work_experience::Model) -> Self {
        WorkExperienceRow {
            vendor_name: m.vendor_name.clone(),
            name_of_work: m.name_of_work.clone(),
            employer: m.employer.clone(),
            location: m.location.clone(),
            contract_amount: m.contract_amount.clone(),
            date_of_start: m.date_of_start.clone(),
            date_of_completion: m.date_of_completion.clone(),
            completion_certificate: m.has_completion_certificate,
            attachment: m.attachment.clone(),
        }
    }
}

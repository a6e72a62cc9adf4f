use log::warn;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;

pub type TxnFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, DbErr>> + Send + 'c>>;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(150),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// base * 2^attempt, capped, plus up to 20% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay);
        let jitter_ms = (exp.as_millis() as u64 / 5) * (rand::random::<u8>() as u64 % 5) / 5;
        exp + Duration::from_millis(jitter_ms)
    }
}

/// Serialization/lock conflicts that a blind retry can resolve.
pub fn is_conflict(err: &DbErr) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    [
        "database is locked",
        "database table is locked",
        "database is busy",
        "sqlite_busy",
        "could not serialize access",
        "40001",
        "deadlock detected",
    ]
    .iter()
    .any(|needle| msg.contains(needle))
}

/// Runs `op` in its own transaction and retries the whole transaction on conflicts.
///
/// Any other error rolls back and propagates immediately. `op` is called once per attempt and
/// must therefore own (or clone) whatever it writes.
pub async fn safe_write<T, F>(
    db: &DatabaseConnection,
    policy: &RetryPolicy,
    label: &str,
    op: F,
) -> Result<T, DbErr>
where
    T: Send,
    F: for<'c> Fn(&'c DatabaseTransaction) -> TxnFuture<'c, T> + Send + Sync,
{
    let mut attempt = 0u32;
    loop {
        let result: Result<T, DbErr> = async {
            let txn = db.begin().await?;
            match op(&txn).await {
                Ok(v) => {
                    txn.commit().await?;
                    Ok(v)
                }
                Err(e) => {
                    let _ = txn.rollback().await;
                    Err(e)
                }
            }
        }
        .await;

        match result {
            Ok(v) => return Ok(v),
            Err(e) if is_conflict(&e) && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    "{}: write conflict ({}), retry {}/{} in {:?}",
                    label, e, attempt, policy.max_attempts, delay
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

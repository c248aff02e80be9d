use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use doctor_cell::models::RatingSummary;
use doctor_cell::services::doctor::DoctorService;
use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{round_tenths, FeedbackError, FeedbackStatus, RatingRow};

/// One async lock per doctor so recomputations for the same doctor run one
/// after another within this process.
static DOCTOR_LOCKS: LazyLock<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn doctor_lock(doctor_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = DOCTOR_LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(doctor_id).or_default())
}

/// Exclusive hold on one doctor's rating. Dropping the last hold removes the
/// doctor's entry from the registry.
struct RatingLease {
    doctor_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RatingLease {
    async fn acquire(doctor_id: Uuid) -> Self {
        let guard = doctor_lock(doctor_id).lock_owned().await;
        Self {
            doctor_id,
            guard: Some(guard),
        }
    }
}

impl Drop for RatingLease {
    fn drop(&mut self) {
        drop(self.guard.take());

        // clones are only handed out under the registry mutex, so a count of
        // one here means nobody else holds or waits on this lock
        let mut locks = DOCTOR_LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(&self.doctor_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.doctor_id);
        }
    }
}

/// The displayed rating for a set of approved ratings: the mean rounded
/// half-up to one decimal, or the unrated default when there are none.
pub fn recompute_doctor_rating(approved_ratings: &[u8]) -> RatingSummary {
    if approved_ratings.is_empty() {
        return RatingSummary::UNRATED;
    }

    let sum: u32 = approved_ratings.iter().map(|&r| u32::from(r)).sum();
    let count = approved_ratings.len() as u32;

    RatingSummary {
        rating: round_tenths(sum, count),
        total_reviews: count,
    }
}

pub struct RatingService {
    supabase: SupabaseClient,
    doctors: DoctorService,
}

impl RatingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
        }
    }

    /// Rebuilds a doctor's rating from the full set of approved feedback and
    /// stores it. Must run after any change to which feedback is approved.
    #[instrument(skip(self, auth_token))]
    pub async fn refresh_doctor_rating(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<RatingSummary, FeedbackError> {
        let _lease = RatingLease::acquire(doctor_id).await;

        let result = self.recompute_and_store(doctor_id, auth_token).await;
        if let Err(e) = &result {
            // the feedback change that triggered this refresh is already committed
            error!("Rating for doctor {} is stale after a failed refresh: {}", doctor_id, e);
        }
        result
    }

    async fn recompute_and_store(&self, doctor_id: Uuid, auth_token: &str) -> Result<RatingSummary, FeedbackError> {
        let path = format!(
            "/rest/v1/feedback?doctor_id=eq.{}&status=eq.{}&select=rating",
            doctor_id,
            FeedbackStatus::Approved
        );
        let rows: Vec<RatingRow> = self.supabase.select(&path, auth_token).await?;
        let ratings: Vec<u8> = rows.into_iter().map(|r| r.rating).collect();

        let summary = recompute_doctor_rating(&ratings);
        debug!("Recomputed rating for doctor {}: {:?}", doctor_id, summary);

        self.doctors.apply_rating_summary(doctor_id, summary, auth_token).await?;
        Ok(summary)
    }
}

use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{Doctor, RatingSummary, ScheduleError};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, ScheduleError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.supabase
            .select_one::<Doctor>(&path, auth_token)
            .await?
            .ok_or(ScheduleError::DoctorNotFound)
    }

    /// Stores a freshly recomputed rating. Nothing else writes `rating` or
    /// `total_reviews`.
    #[instrument(skip(self, auth_token))]
    pub async fn apply_rating_summary(
        &self,
        doctor_id: Uuid,
        summary: RatingSummary,
        auth_token: &str,
    ) -> Result<Doctor, ScheduleError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let body = json!({
            "rating": summary.rating,
            "total_reviews": summary.total_reviews,
        });

        let updated: Vec<Doctor> = self.supabase.update(&path, body, auth_token).await?;
        let doctor = updated.into_iter().next().ok_or(ScheduleError::DoctorNotFound)?;

        info!(
            "Doctor {} rating set to {} over {} reviews",
            doctor_id, summary.rating, summary.total_reviews
        );
        Ok(doctor)
    }
}

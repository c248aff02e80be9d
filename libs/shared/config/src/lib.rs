use std::env;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Fixed offset of the clinic's wall clock, used to turn a stored
    /// appointment date + HH:MM into an instant.
    pub clinic_utc_offset_minutes: i32,
    pub cancellation_lead_minutes: i64,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            clinic_utc_offset_minutes: env::var("CLINIC_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| {
                    warn!("CLINIC_UTC_OFFSET_MINUTES not set or invalid, using UTC");
                    0
                }),
            cancellation_lead_minutes: env::var("CANCELLATION_LEAD_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// The clinic's local time base. Out-of-range offsets fall back to UTC.
    pub fn clinic_offset(&self) -> FixedOffset {
        let minutes = self.clinic_utc_offset_minutes;
        if minutes.abs() > MAX_OFFSET_MINUTES {
            warn!("Clinic UTC offset {} minutes is out of range, using UTC", minutes);
            return Utc.fix();
        }
        FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_offset(minutes: i32) -> AppConfig {
        AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            clinic_utc_offset_minutes: minutes,
            cancellation_lead_minutes: 120,
            server_port: 3000,
        }
    }

    #[test]
    fn test_clinic_offset() {
        assert_eq!(config_with_offset(420).clinic_offset().local_minus_utc(), 420 * 60);
        assert_eq!(config_with_offset(-300).clinic_offset().local_minus_utc(), -300 * 60);
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        assert_eq!(config_with_offset(15 * 60).clinic_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_is_configured() {
        assert!(config_with_offset(0).is_configured());
        let mut config = config_with_offset(0);
        config.supabase_jwt_secret.clear();
        assert!(!config.is_configured());
    }
}

use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, BookAppointmentRequest, BookingRejection,
    CancelAppointmentRequest, UpdateAppointmentStatusRequest,
};
use appointment_cell::router::appointment_routes;
use appointment_cell::services::booking::AppointmentBookingService;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};
use shared_utils::FixedClock;

const DATE: &str = "2024-06-10";

struct Fixture {
    server: MockServer,
    config: AppConfig,
    patient_id: String,
    doctor_id: String,
    schedule_id: String,
}

impl Fixture {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let config = TestConfig::with_url(server.uri()).to_app_config();
        Self {
            server,
            config,
            patient_id: Uuid::new_v4().to_string(),
            doctor_id: Uuid::new_v4().to_string(),
            schedule_id: Uuid::new_v4().to_string(),
        }
    }

    async fn mount_references(&self, max_patients: u8) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::patient_response(&self.patient_id)
            ])))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::doctor_response(&self.doctor_id, 150.0)
            ])))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/schedules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::schedule_response(
                    &self.schedule_id, &self.doctor_id, DATE, "09:00", "12:00", max_patients
                )
            ])))
            .mount(&self.server)
            .await;
    }

    fn appointment(&self, id: &str, status: &str) -> Value {
        MockSupabaseResponses::appointment_response(id, &self.doctor_id, &self.schedule_id, DATE, "10:00", status)
    }

    fn booking(&self) -> BookAppointmentRequest {
        serde_json::from_value(json!({
            "patient_id": self.patient_id,
            "doctor_id": self.doctor_id,
            "schedule_id": self.schedule_id,
            "appointment_date": DATE,
            "appointment_time": "10:00",
            "reason": "Persistent cough"
        }))
        .unwrap()
    }

    fn service_at(&self, hour: u32, minute: u32) -> AppointmentBookingService {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, hour, minute, 0).unwrap();
        AppointmentBookingService::with_clock(&self.config, Arc::new(FixedClock::new(now)))
    }
}

#[tokio::test]
async fn test_book_appointment_takes_next_seat_and_doctor_fee() {
    let fx = Fixture::new().await;
    fx.mount_references(2).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "seat"))
        .and(query_param("appointment_time", "eq.10:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "seat": 0 }])))
        .mount(&fx.server)
        .await;

    let appointment_id = Uuid::new_v4().to_string();
    let mut created = fx.appointment(&appointment_id, "SCHEDULED");
    created["seat"] = json!(1);
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "seat": 1,
            "consultation_fee": 150.0,
            "status": "SCHEDULED",
            "priority": "NORMAL",
            "appointment_type": "CONSULTATION",
            "payment_status": "PENDING",
            "duration": 30
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .expect(1)
        .mount(&fx.server)
        .await;

    let app = appointment_routes(Arc::new(fx.config.clone()));
    let user = TestUser::receptionist("desk@example.com");
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", JwtTestUtils::bearer(&user))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&fx.booking()).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["appointment"]["id"], appointment_id.as_str());
}

#[tokio::test]
async fn test_book_appointment_full_slot_is_rejected() {
    let fx = Fixture::new().await;
    fx.mount_references(1).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "seat": 0 }])))
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&fx.server)
        .await;

    let result = fx.service_at(6, 0).book_appointment(fx.booking(), "desk-user", "token").await;
    assert_matches!(result, Err(AppointmentError::Rejected(BookingRejection::SlotFullyBooked)));
}

#[tokio::test]
async fn test_book_appointment_outside_hours_is_rejected() {
    let fx = Fixture::new().await;
    fx.mount_references(1).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&fx.server)
        .await;

    let mut booking = fx.booking();
    booking.appointment_time = Some("12:00".to_string());

    let result = fx.service_at(6, 0).book_appointment(booking, "desk-user", "token").await;
    assert_matches!(result, Err(AppointmentError::Rejected(BookingRejection::OutsideScheduleHours)));
}

#[tokio::test]
async fn test_book_appointment_loses_race_for_last_seat() {
    let fx = Fixture::new().await;
    fx.mount_references(1).await;

    // first read sees an empty slot, the re-read after the conflict sees it taken
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&fx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "seat": 0 }])))
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value violates unique constraint", "23505"),
        ))
        .expect(1)
        .mount(&fx.server)
        .await;

    let result = fx.service_at(6, 0).book_appointment(fx.booking(), "desk-user", "token").await;
    assert_matches!(result, Err(AppointmentError::Rejected(BookingRejection::SlotFullyBooked)));
}

#[tokio::test]
async fn test_book_appointment_on_schedule_cancelled_meanwhile() {
    let fx = Fixture::new().await;
    fx.mount_references(2).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&fx.server)
        .await;
    // the block was cancelled between our read and the insert
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("schedule_not_active", "PT409"),
        ))
        .expect(1)
        .mount(&fx.server)
        .await;

    let result = fx.service_at(6, 0).book_appointment(fx.booking(), "desk-user", "token").await;
    assert_matches!(result, Err(AppointmentError::Rejected(BookingRejection::ScheduleNotActive)));
}

#[tokio::test]
async fn test_book_appointment_unknown_patient() {
    let fx = Fixture::new().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&fx.server)
        .await;
    fx.mount_references(1).await;

    let result = fx.service_at(6, 0).book_appointment(fx.booking(), "desk-user", "token").await;
    assert_matches!(result, Err(AppointmentError::PatientNotFound));
}

#[tokio::test]
async fn test_cancel_exactly_at_lead_time() {
    let fx = Fixture::new().await;
    let appointment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fx.appointment(&appointment_id, "SCHEDULED")])))
        .mount(&fx.server)
        .await;

    let mut cancelled = fx.appointment(&appointment_id, "CANCELLED");
    cancelled["cancellation_reason"] = json!("Cancelled by receptionist");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.SCHEDULED"))
        .and(body_partial_json(json!({
            "status": "CANCELLED",
            "cancelled_by": "desk-user",
            "cancellation_reason": "Cancelled by receptionist"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .expect(1)
        .mount(&fx.server)
        .await;

    let id = Uuid::parse_str(&appointment_id).unwrap();
    let result = fx
        .service_at(8, 0)
        .cancel_appointment(id, CancelAppointmentRequest::default(), "desk-user", "token")
        .await
        .unwrap();
    assert_eq!(result.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_inside_lead_time_is_refused() {
    let fx = Fixture::new().await;
    let appointment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fx.appointment(&appointment_id, "CONFIRMED")])))
        .mount(&fx.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fx.server)
        .await;

    let id = Uuid::parse_str(&appointment_id).unwrap();
    let result = fx
        .service_at(8, 1)
        .cancel_appointment(id, CancelAppointmentRequest::default(), "desk-user", "token")
        .await;
    assert_matches!(result, Err(AppointmentError::NotCancellable { lead_minutes: 120 }));
}

#[tokio::test]
async fn test_concurrent_cancel_second_writer_is_refused() {
    let fx = Fixture::new().await;
    let appointment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fx.appointment(&appointment_id, "SCHEDULED")])))
        .up_to_n_times(1)
        .mount(&fx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fx.appointment(&appointment_id, "CANCELLED")])))
        .mount(&fx.server)
        .await;
    // the other cancellation already moved the row off SCHEDULED
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&fx.server)
        .await;

    let id = Uuid::parse_str(&appointment_id).unwrap();
    let result = fx
        .service_at(6, 0)
        .cancel_appointment(id, CancelAppointmentRequest::default(), "desk-user", "token")
        .await;
    assert_matches!(result, Err(AppointmentError::NotCancellable { .. }));
}

#[tokio::test]
async fn test_status_update_follows_lifecycle() {
    let fx = Fixture::new().await;
    let appointment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fx.appointment(&appointment_id, "COMPLETED")])))
        .mount(&fx.server)
        .await;

    let id = Uuid::parse_str(&appointment_id).unwrap();
    let request = UpdateAppointmentStatusRequest { status: AppointmentStatus::Confirmed, notes: None };
    let result = fx.service_at(6, 0).update_status(id, request, "token").await;
    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Confirmed
        })
    );
}

#[tokio::test]
async fn test_status_update_writes_conditionally() {
    let fx = Fixture::new().await;
    let appointment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fx.appointment(&appointment_id, "SCHEDULED")])))
        .mount(&fx.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.SCHEDULED"))
        .and(body_partial_json(json!({ "status": "CONFIRMED" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fx.appointment(&appointment_id, "CONFIRMED")])))
        .expect(1)
        .mount(&fx.server)
        .await;

    let id = Uuid::parse_str(&appointment_id).unwrap();
    let request = UpdateAppointmentStatusRequest { status: AppointmentStatus::Confirmed, notes: None };
    let updated = fx.service_at(6, 0).update_status(id, request, "token").await.unwrap();
    assert_eq!(updated.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn test_routes_require_token() {
    let app = appointment_routes(TestConfig::default().to_arc());
    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let app = appointment_routes(TestConfig::default().to_arc());
    let user = TestUser::receptionist("desk@example.com");
    let token = JwtTestUtils::create_expired_token(&user, shared_utils::test_utils::TEST_JWT_SECRET);
    let request = Request::builder()
        .method("GET")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

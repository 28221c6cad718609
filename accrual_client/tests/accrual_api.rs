use std::time::Duration;

use accrual_client::{AccrualApi, AccrualApiError, AccrualConfig, AccrualOutcome, AccrualStatus};
use actix_web::{dev::ServerHandle, get, web, App, HttpResponse, HttpServer};
use loyalty_common::{OrderNumber, Points};

const PROCESSED: &str = "79927398713";
const UNKNOWN: &str = "4561261212345467";
const RATE_LIMITED: &str = "2377225624";
const BROKEN: &str = "9278923470";
const GARBLED: &str = "346436439";

/// A stand-in for the accrual service. The order number decides which canned answer comes back.
#[get("/api/orders/{number}")]
async fn order_status(number: web::Path<String>) -> HttpResponse {
    match number.as_str() {
        PROCESSED => HttpResponse::Ok().json(serde_json::json!({
            "order": PROCESSED,
            "status": "PROCESSED",
            "accrual": 500,
        })),
        UNKNOWN => HttpResponse::NoContent().finish(),
        RATE_LIMITED => HttpResponse::TooManyRequests()
            .insert_header(("Retry-After", "2"))
            .body("No more than N requests per minute allowed"),
        GARBLED => HttpResponse::Ok().content_type("application/json").body("{not json"),
        BROKEN => HttpResponse::InternalServerError().body("boom"),
        other => HttpResponse::Ok().json(serde_json::json!({ "order": other, "status": "PROCESSING" })),
    }
}

fn start_mock_accrual_service() -> (String, ServerHandle) {
    let server = HttpServer::new(|| App::new().service(order_status))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("Could not bind mock accrual service");
    let port = server.addrs()[0].port();
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);
    (format!("http://127.0.0.1:{port}"), handle)
}

fn number(s: &str) -> OrderNumber {
    s.parse().expect("test order numbers are Luhn-valid")
}

#[actix_web::test]
async fn classifies_accrual_responses() {
    let _ = env_logger::try_init();
    let (url, handle) = start_mock_accrual_service();
    let api = AccrualApi::new(AccrualConfig::new(&url)).unwrap();

    match api.poll(&number(PROCESSED)).await {
        AccrualOutcome::Result(result) => {
            assert_eq!(result.order, PROCESSED);
            assert_eq!(result.status, AccrualStatus::Processed);
            assert_eq!(result.accrual, Some(Points::from_whole(500)));
        },
        other => panic!("Expected a result, got {other:?}"),
    }

    match api.poll(&number(UNKNOWN)).await {
        AccrualOutcome::Unregistered => {},
        other => panic!("Expected an unregistered order, got {other:?}"),
    }

    match api.poll(&number(RATE_LIMITED)).await {
        AccrualOutcome::RateLimited { retry_after } => assert_eq!(retry_after, Some(Duration::from_secs(2))),
        other => panic!("Expected rate limiting, got {other:?}"),
    }

    match api.poll(&number(BROKEN)).await {
        AccrualOutcome::TransportError(AccrualApiError::UnexpectedStatus { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        },
        other => panic!("Expected an unexpected status error, got {other:?}"),
    }

    match api.poll(&number(GARBLED)).await {
        AccrualOutcome::TransportError(AccrualApiError::JsonError(_)) => {},
        other => panic!("Expected a JSON error, got {other:?}"),
    }

    match api.poll(&number("12345678903")).await {
        AccrualOutcome::Result(result) => assert_eq!(result.status, AccrualStatus::Processing),
        other => panic!("Expected PROCESSING, got {other:?}"),
    }

    handle.stop(true).await;
}

#[actix_web::test]
async fn connection_failure_is_a_transport_error() {
    let _ = env_logger::try_init();
    // Nothing listens on port 1
    let config = AccrualConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_secs(2));
    let api = AccrualApi::new(config).unwrap();
    match api.poll(&number(PROCESSED)).await {
        AccrualOutcome::TransportError(AccrualApiError::RequestError(_)) => {},
        other => panic!("Expected a request error, got {other:?}"),
    }
}

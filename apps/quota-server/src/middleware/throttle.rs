//! Per-client throttling middleware built on the quota gate.

use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue, RETRY_AFTER},
};
use quota_shared::ErrorResponse;
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use quota_core::{Clock, Policy};
use quota_infra::QuotaGate;

use crate::observability::RequestId;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Throttling middleware factory.
///
/// Every request counts against `"ip:{peer address}"` under one policy,
/// except paths under an exempt prefix. The key is the TCP peer, not a
/// forwarded header, so clients cannot pick their own bucket.
pub struct ThrottleMiddleware {
    gate: Arc<QuotaGate>,
    policy: Policy,
    clock: Arc<dyn Clock>,
    exempt: Arc<[String]>,
}

impl ThrottleMiddleware {
    pub fn new(gate: Arc<QuotaGate>, policy: Policy, clock: Arc<dyn Clock>) -> Self {
        Self {
            gate,
            policy,
            clock,
            exempt: Arc::from(Vec::new()),
        }
    }

    /// Skip throttling for request paths starting with any of `prefixes`.
    pub fn exempt(mut self, prefixes: impl Into<Arc<[String]>>) -> Self {
        self.exempt = prefixes.into();
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for ThrottleMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = ThrottleService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ThrottleService {
            service: Rc::new(service),
            gate: self.gate.clone(),
            policy: self.policy,
            clock: self.clock.clone(),
            exempt: self.exempt.clone(),
        }))
    }
}

pub struct ThrottleService<S> {
    service: Rc<S>,
    gate: Arc<QuotaGate>,
    policy: Policy,
    clock: Arc<dyn Clock>,
    exempt: Arc<[String]>,
}

impl<S, B> Service<ServiceRequest> for ThrottleService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        if self.exempt.iter().any(|prefix| req.path().starts_with(prefix.as_str())) {
            return Box::pin(async move { Ok(service.call(req).await?.map_into_left_body()) });
        }

        let gate = self.gate.clone();
        let policy = self.policy;
        let clock = self.clock.clone();

        let key = match req.peer_addr() {
            Some(addr) => format!("ip:{}", addr.ip()),
            None => "ip:unknown".to_string(),
        };

        Box::pin(async move {
            let decision = gate.check(&key, &policy).await;

            if !decision.allowed {
                let retry_after = decision.retry_after(clock.now()).as_secs();
                tracing::warn!(client = %key, retry_after, "Request throttled");

                let request_id = req.extensions().get::<RequestId>().cloned();
                let mut error = ErrorResponse::too_many_requests(retry_after);
                if let Some(id) = request_id {
                    error = error.with_request_id(id.as_str());
                }

                let response = HttpResponse::TooManyRequests()
                    .insert_header((REMAINING_HEADER, "0"))
                    .insert_header((RESET_HEADER, decision.reset_at.timestamp().to_string()))
                    .insert_header((RETRY_AFTER, retry_after.to_string()))
                    .json(error);

                return Ok(req.into_response(response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            let headers = res.headers_mut();
            headers.insert(
                HeaderName::from_static(REMAINING_HEADER),
                HeaderValue::from(decision.remaining),
            );
            headers.insert(
                HeaderName::from_static(RESET_HEADER),
                HeaderValue::from(decision.reset_at.timestamp()),
            );

            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test, web};
    use chrono::{TimeDelta, Utc};
    use quota_core::ManualClock;
    use quota_infra::{LocalBackendConfig, LocalCounterBackend};
    use std::time::Duration;

    async fn ping() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn test_throttles_after_policy_is_spent() {
        let clock = ManualClock::new(Utc::now());
        let clock_handle: Arc<dyn Clock> = Arc::new(clock.clone());
        let local = LocalCounterBackend::new(LocalBackendConfig::default(), clock_handle.clone());
        let gate = Arc::new(QuotaGate::local_only(Arc::new(local)));
        let policy = Policy::new(2, Duration::from_secs(60)).unwrap();

        let app = test::init_service(
            App::new()
                .wrap(ThrottleMiddleware::new(gate, policy, clock_handle))
                .route("/ping", web::get().to(ping)),
        )
        .await;

        for expected in ["1", "0"] {
            let res = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request())
                .await;
            assert!(res.status().is_success());
            assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), expected);
        }

        clock.advance(TimeDelta::seconds(20));
        let res =
            test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(res.status(), 429);
        assert_eq!(res.headers().get(RETRY_AFTER).unwrap(), "40");

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["retry_after_secs"], 40);

        clock.advance(TimeDelta::seconds(40));
        let res =
            test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert!(res.status().is_success());
    }

    fn peer(addr: &str) -> std::net::SocketAddr {
        addr.parse().unwrap()
    }

    fn throttle(max: u32, exempt: Vec<String>) -> ThrottleMiddleware {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let local = LocalCounterBackend::new(LocalBackendConfig::default(), clock.clone());
        let gate = Arc::new(QuotaGate::local_only(Arc::new(local)));
        let policy = Policy::new(max, Duration::from_secs(60)).unwrap();

        ThrottleMiddleware::new(gate, policy, clock).exempt(exempt)
    }

    #[actix_web::test]
    async fn test_exempt_prefixes_are_not_throttled() {
        let app = test::init_service(
            App::new()
                .wrap(throttle(1, vec!["/api/quota".to_string()]))
                .route("/ping", web::get().to(ping))
                .route("/api/quota/check", web::post().to(ping)),
        )
        .await;

        for _ in 0..3 {
            let req = test::TestRequest::post()
                .uri("/api/quota/check")
                .peer_addr(peer("10.0.0.1:4000"))
                .to_request();
            let res = test::call_service(&app, req).await;
            assert!(res.status().is_success());
            assert!(res.headers().get(REMAINING_HEADER).is_none());
        }

        let req = test::TestRequest::get()
            .uri("/ping")
            .peer_addr(peer("10.0.0.1:4000"))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get()
            .uri("/ping")
            .peer_addr(peer("10.0.0.1:4000"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 429);
    }

    #[actix_web::test]
    async fn test_key_is_peer_ip_not_forwarded_header() {
        let app = test::init_service(
            App::new()
                .wrap(throttle(1, Vec::new()))
                .route("/ping", web::get().to(ping)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/ping")
            .peer_addr(peer("10.0.0.1:4000"))
            .insert_header(("x-forwarded-for", "203.0.113.1"))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        // New source port and a different forwarded address: same bucket.
        let req = test::TestRequest::get()
            .uri("/ping")
            .peer_addr(peer("10.0.0.1:4001"))
            .insert_header(("x-forwarded-for", "203.0.113.2"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 429);

        let req = test::TestRequest::get()
            .uri("/ping")
            .peer_addr(peer("10.0.0.2:4000"))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }
}

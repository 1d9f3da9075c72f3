//! Request ID middleware - tags each request and its log span with an ID.

use actix_web::{
    Error, HttpMessage,
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue},
};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use tracing::Instrument;
use uuid::Uuid;

use crate::middleware::error::AppError;

/// Header carrying the request ID, in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied ID that is trusted as-is.
const MAX_INBOUND_ID_LEN: usize = 128;

/// Request ID stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reuse an upstream ID (load balancer, client) when it looks sane.
    fn from_request(req: &ServiceRequest) -> Self {
        let inbound = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|id| !id.is_empty() && id.len() <= MAX_INBOUND_ID_LEN);

        match inbound {
            Some(id) => RequestId(id.to_string()),
            None => RequestId(Uuid::new_v4().to_string()),
        }
    }
}

/// Middleware that assigns a request ID, runs the request inside a span
/// carrying it, and echoes it in the response headers. Problem details
/// bodies produced by [`AppError`] are re-rendered with the ID included.
pub struct RequestIdMiddleware;

impl<S, B> Transform<S, ServiceRequest> for RequestIdMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequestIdService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdService { service }))
    }
}

pub struct RequestIdService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestIdService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let request_id = RequestId::from_request(&req);
        req.extensions_mut().insert(request_id.clone());

        let span = tracing::info_span!("request", request_id = %request_id.as_str());
        let fut = {
            let _guard = span.enter();
            self.service.call(req)
        };

        Box::pin(
            async move {
                let res = fut.await?;
                let problem = res
                    .response()
                    .error()
                    .and_then(|err| err.as_error::<AppError>())
                    .map(|err| err.problem().with_request_id(request_id.as_str()))
                    .and_then(|problem| serde_json::to_vec(&problem).ok());

                let mut res = match problem {
                    Some(body) => res.map_body(|_, _| EitherBody::right(BoxBody::new(body))),
                    None => res.map_into_left_body(),
                };
                if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
                    res.headers_mut()
                        .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                }
                Ok(res)
            }
            .instrument(span),
        )
    }
}

use axum::{
    extract::{FromRequest, Request},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use validator::Validate;

use crate::domain::describe_validation_errors;

pub const API_VERSION: &str = "1";
pub static API_VERSION_HEADER: HeaderName = HeaderName::from_static("x-api-version");

/// JSON body that has passed its `validator` rules.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[derive(Debug)]
pub struct ValidationRejection {
    pub errors: String,
}

impl IntoResponse for ValidationRejection {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.errors }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidationRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ValidationRejection {
                errors: rejection.body_text(),
            })?;

        value.validate().map_err(|e| {
            let errors = describe_validation_errors(&e);
            debug!("Request body rejected: {}", errors);
            ValidationRejection { errors }
        })?;

        Ok(ValidatedJson(value))
    }
}

/// Stamps every response with the API version it was served by.
pub async fn api_version_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        API_VERSION_HEADER.clone(),
        HeaderValue::from_static(API_VERSION),
    );
    response
}

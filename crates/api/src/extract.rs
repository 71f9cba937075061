//! Request extractors shared by the route handlers.

use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Form, FromRequest, FromRequestParts, Json, Path, Query, Request};
use axum::http::header;
use axum::http::request::Parts;
use common::{Page, UserId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::error::ApiError;

/// JSON body that has passed its `validator` rules.
///
/// Malformed JSON and failed rules both become a 400.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| ApiError::BadRequest(e.body_text()))?;
        data.validate()
            .map_err(|e| ApiError::BadRequest(describe(&e)))?;
        Ok(ValidatedJson(data))
    }
}

/// Validated body sent either as JSON or as an urlencoded form.
pub struct JsonOrForm<T>(pub T);

impl<T, S> FromRequest<S> for JsonOrForm<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
        if !is_form {
            let ValidatedJson(data) = ValidatedJson::<T>::from_request(req, state).await?;
            return Ok(JsonOrForm(data));
        }

        let Form(data) = Form::<T>::from_request(req, state)
            .await
            .map_err(|e: FormRejection| ApiError::BadRequest(e.body_text()))?;
        data.validate()
            .map_err(|e| ApiError::BadRequest(describe(&e)))?;
        Ok(JsonOrForm(data))
    }
}

/// Flattens field errors into `field: message; field: message`.
fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| match &err.message {
                Some(msg) => format!("{field}: {msg}"),
                None => format!("{field}: invalid ({})", err.code),
            })
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

/// The user the session middleware authenticated.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserId>()
            .copied()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
    }
}

/// Path parameters. A segment that does not parse becomes a 400.
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: PathRejection| ApiError::BadRequest(e.body_text()))?;
        Ok(ApiPath(value))
    }
}

/// Query string parameters. A malformed query becomes a 400.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| ApiError::BadRequest(e.body_text()))?;
        Ok(ApiQuery(value))
    }
}

/// `?skip=&limit=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl Pagination {
    /// Limit must be within `1..=1000`; defaults to 100.
    pub fn page(&self) -> Result<Page, ApiError> {
        let limit = self.limit.unwrap_or(Page::DEFAULT_LIMIT);
        if !(1..=Page::MAX_LIMIT).contains(&limit) {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {}",
                Page::MAX_LIMIT
            )));
        }
        Ok(Page::new(self.skip.unwrap_or(0), limit))
    }
}

//! Request body extraction.
//!
//! Wraps `axum::Json` so malformed bodies come back in the standard error
//! envelope instead of axum's plain-text rejection.

use crate::error::ApiError;
use axum::extract::FromRequest;

/// JSON body extractor whose rejections are `ApiError`s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

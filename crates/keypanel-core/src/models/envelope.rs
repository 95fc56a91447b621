use serde::{Deserialize, Serialize};

use crate::api::ApiError;

/// Generic response wrapper used by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub total: Option<i64>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, treating a missing `data` field as a bad response
    pub fn into_data(self) -> Result<T, ApiError> {
        let Envelope {
            status,
            message,
            data,
            ..
        } = self;
        data.ok_or_else(|| {
            ApiError::InvalidResponse(format!(
                "Envelope without data (status {}): {}",
                status,
                message.unwrap_or_default()
            ))
        })
    }
}

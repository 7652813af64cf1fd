//! Refresh endpoint Data Transfer Objects
//!
//! These types match EXACTLY what `POST /auth/refresh` accepts and returns.
//! DO NOT use these types outside the auth module.

use serde::{Deserialize, Serialize};

/// Body of the refresh call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Successful refresh response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// New access token
    pub token: String,
    /// Lifetime of the new token in seconds
    pub expires_in: i64,
    /// Rotated refresh token, when the server rotates them
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case() {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: "r".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "refreshToken": "r" }));
    }

    #[test]
    fn test_response_without_rotation() {
        let response: RefreshResponse =
            serde_json::from_str(r#"{"token":"abc","expiresIn":3600}"#).unwrap();
        assert_eq!(response.token, "abc");
        assert_eq!(response.expires_in, 3600);
        assert!(response.refresh_token.is_none());
    }
}

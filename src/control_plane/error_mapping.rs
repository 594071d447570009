//! Error mapping helpers for the HTTP control-plane gateway.

use http::StatusCode;

use super::error::ControlPlaneError;
use super::models::ApiErrorBody;

/// Checks if a status indicates an authentication failure.
pub(super) const fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Checks if a status means the control plane is temporarily unavailable.
pub(super) const fn is_unavailable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Extracts the message and code from a grpc-gateway style error body.
///
/// Falls back to the raw body text when it is not JSON.
pub(super) fn extract_error_details(body: &str) -> (String, Option<i32>) {
    let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) else {
        let trimmed = body.trim();
        let message = if trimmed.is_empty() {
            "no response body".to_owned()
        } else {
            trimmed.to_owned()
        };
        return (message, None);
    };

    let message = parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| "unknown error".to_owned());
    (message, parsed.code)
}

pub(super) fn map_status_error(
    operation: &str,
    resource: &str,
    status: StatusCode,
    body: &str,
) -> ControlPlaneError {
    let (message, code) = extract_error_details(body);

    if is_auth_failure(status) {
        return ControlPlaneError::Authentication {
            message: format!("{operation} failed: control plane returned {status} {message}"),
        };
    }

    if status == StatusCode::NOT_FOUND {
        return ControlPlaneError::NotFound {
            resource: resource.to_owned(),
            message,
        };
    }

    // A 5xx without a control-plane code came from a proxy, not the API server.
    if is_unavailable(status) || (status.is_server_error() && code.is_none()) {
        return ControlPlaneError::Transient {
            message: format!("{operation} failed with status {status}: {message}"),
        };
    }

    ControlPlaneError::Rejected {
        status: status.as_u16(),
        code,
        message,
    }
}

pub(super) fn map_transport_error(operation: &str, error: &reqwest::Error) -> ControlPlaneError {
    if error.is_decode() {
        return ControlPlaneError::Decode {
            message: format!("{operation}: {error}"),
        };
    }

    if error.is_builder() {
        return ControlPlaneError::InvalidUrl {
            message: format!("{operation}: {error}"),
        };
    }

    ControlPlaneError::Transient {
        message: format!("{operation} failed: {error}"),
    }
}

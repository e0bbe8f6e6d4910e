use reqwest::StatusCode;
use serde::Deserialize;

/// Failure of a REST call, returned as data rather than raised.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized: check your token or credentials")]
    Unauthorized,

    #[error("Forbidden: you don't have permission or hit the rate limit{}", detail(.message))]
    Forbidden { message: Option<String> },

    #[error("Not Found: resource does not exist or is private")]
    NotFound,

    /// Any other non-success status. The remote `message` is kept verbatim.
    #[error("HTTP Error: {status}{}", detail(.message))]
    Status {
        status: u16,
        message: Option<String>,
    },

    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

fn detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" - {}", m))
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

/// Entries of the `errors` array; GitHub sends objects or bare strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object {
        message: Option<String>,
        code: Option<String>,
        field: Option<String>,
    },
    Text(String),
}

impl ErrorDetail {
    fn describe(&self) -> Option<String> {
        match self {
            ErrorDetail::Object {
                message: Some(message),
                ..
            } => Some(message.clone()),
            ErrorDetail::Object {
                code: Some(code),
                field,
                ..
            } => Some(match field {
                Some(field) => format!("{} {}", field, code),
                None => code.clone(),
            }),
            ErrorDetail::Object { .. } => None,
            ErrorDetail::Text(text) => Some(text.clone()),
        }
    }
}

impl ErrorBody {
    /// Top-level message followed by the per-field reasons, if any.
    fn into_message(self) -> Option<String> {
        let details: Vec<String> = self.errors.iter().filter_map(ErrorDetail::describe).collect();
        match (self.message, details.is_empty()) {
            (Some(message), true) => Some(message),
            (Some(message), false) => Some(format!("{} ({})", message, details.join("; "))),
            (None, false) => Some(details.join("; ")),
            (None, true) => None,
        }
    }
}

impl ApiError {
    /// Classify a non-success status and its (possibly empty) body.
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_message)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            });

        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::Forbidden { message },
            StatusCode::NOT_FOUND => ApiError::NotFound,
            other => ApiError::Status {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// HTTP status behind this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound => Some(404),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e)
        }
    }
}

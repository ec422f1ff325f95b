use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

/// Everything that can go wrong around the tour. None of these are fatal to the
/// tour itself: callers log them and carry on with the page as it is.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TourError {
    StepOutOfRange { index: usize, step_count: usize },
    NotAuthenticated,
    NoStepAction { index: usize },
    Store { message: String },
    Config { message: String },
    Mailbox { message: String },
    Snapshot { message: String },
    UnknownPage { page: String },
}

impl TourError {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl std::fmt::Display for TourError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TourError::StepOutOfRange { index, step_count } => {
                write!(f, "step {} is out of range, the tour has {} steps", index, step_count)
            }
            TourError::NotAuthenticated => write!(f, "only signed-in viewers can start the tour"),
            TourError::NoStepAction { index } => write!(f, "step {} has no embedded action", index),
            TourError::Store { message } => write!(f, "flag store error: {}", message),
            TourError::Config { message } => write!(f, "config error: {}", message),
            TourError::Mailbox { message } => write!(f, "mailbox error: {}", message),
            TourError::Snapshot { message } => write!(f, "snapshot error: {}", message),
            TourError::UnknownPage { page } => write!(f, "no tour is attached to page '{}'", page),
        }
    }
}

impl std::error::Error for TourError {}

impl From<actix::MailboxError> for TourError {
    fn from(e: actix::MailboxError) -> Self {
        TourError::Mailbox { message: e.to_string() }
    }
}

impl From<std::io::Error> for TourError {
    fn from(e: std::io::Error) -> Self {
        TourError::Store { message: e.to_string() }
    }
}

impl From<serde_json::Error> for TourError {
    fn from(e: serde_json::Error) -> Self {
        TourError::Store { message: e.to_string() }
    }
}

impl ResponseError for TourError {
    fn status_code(&self) -> StatusCode {
        match self {
            TourError::StepOutOfRange { .. } | TourError::NoStepAction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TourError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            TourError::Snapshot { .. } => StatusCode::BAD_REQUEST,
            TourError::UnknownPage { .. } => StatusCode::NOT_FOUND,
            TourError::Store { .. } | TourError::Config { .. } | TourError::Mailbox { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/json")
            .body(self.to_json())
    }
}

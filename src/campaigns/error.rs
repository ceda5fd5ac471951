use axum::http::StatusCode;
use axum::response::IntoResponse;

#[derive(Debug, Clone)]
pub enum CampaignError {
    DatabaseConnection,
    NotFound,
    MemberNotFound,
    Conflict(String),
    InvalidInput(String),
    InvalidState(String),
    Forbidden,
    QueryFailed(String),
    SendFailed(String),
}

impl std::fmt::Display for CampaignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DatabaseConnection => write!(f, "Database connection failed"),
            Self::NotFound => write!(f, "Campaign not found"),
            Self::MemberNotFound => write!(f, "Audience member not found"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Self::Forbidden => write!(f, "Not allowed"),
            Self::QueryFailed(msg) => write!(f, "Query failed: {msg}"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
        }
    }
}

impl std::error::Error for CampaignError {}

impl From<diesel::result::Error> for CampaignError {
    fn from(e: diesel::result::Error) -> Self {
        Self::QueryFailed(e.to_string())
    }
}

impl IntoResponse for CampaignError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            Self::NotFound | Self::MemberNotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidInput(_) | Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

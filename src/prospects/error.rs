use axum::http::StatusCode;
use axum::response::IntoResponse;

#[derive(Debug, Clone)]
pub enum ProspectError {
    DatabaseConnection,
    NotFound,
    AlreadyConverted,
    Conflict(String),
    InvalidInput(String),
    Forbidden,
    QueryFailed(String),
}

impl std::fmt::Display for ProspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DatabaseConnection => write!(f, "Database connection failed"),
            Self::NotFound => write!(f, "Prospect not found"),
            Self::AlreadyConverted => {
                write!(f, "Prospect has already been converted to a contact")
            }
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            Self::Forbidden => write!(f, "Not allowed"),
            Self::QueryFailed(msg) => write!(f, "Query failed: {msg}"),
        }
    }
}

impl std::error::Error for ProspectError {}

impl From<diesel::result::Error> for ProspectError {
    fn from(e: diesel::result::Error) -> Self {
        Self::QueryFailed(e.to_string())
    }
}

impl IntoResponse for ProspectError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::AlreadyConverted | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

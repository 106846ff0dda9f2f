use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("expected a JSON object at {path}")]
    NotAnObject { path: String },
    #[error("`field` must be an object with exactly one entry: {{name: schema}}")]
    InvalidField,
    #[error("field schema for `{0}` must be an object")]
    FieldSchemaNotObject(String),
    #[error("unresolvable $ref `{0}`")]
    UnresolvedRef(String),
    #[error("cyclic $ref to `{0}`")]
    CyclicRef(String),
}

/// An error carrying the HTTP status the API host should answer with.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{status}: {detail}")]
pub struct ApiError {
    pub status: u16,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(400, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(403, detail)
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(422, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(500, detail)
    }

    pub fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(502, detail)
    }
}

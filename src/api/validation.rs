use thiserror::Error;

use crate::store::ItemStatus;

pub const MAX_RENEW_IDS: usize = 500;

#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("item_ids must contain at most {MAX_RENEW_IDS} entries")]
    TooManyItemIds,
    #[error("unknown status '{0}' (expected pending, processing, done, failed or blocked)")]
    UnknownStatus(String),
}

impl RequestValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            RequestValidationError::MissingField(field) => field,
            RequestValidationError::TooManyItemIds => "item_ids",
            RequestValidationError::UnknownStatus(_) => "status",
        }
    }
}

pub fn require(field: &'static str, value: &str) -> Result<(), RequestValidationError> {
    if value.trim().is_empty() {
        return Err(RequestValidationError::MissingField(field));
    }
    Ok(())
}

pub fn validate_item_ids(ids: Option<&[u64]>) -> Result<(), RequestValidationError> {
    match ids {
        Some(ids) if ids.len() > MAX_RENEW_IDS => Err(RequestValidationError::TooManyItemIds),
        _ => Ok(()),
    }
}

/// Empty strings mean "no filter"
pub fn parse_status(raw: Option<&str>) -> Result<Option<ItemStatus>, RequestValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse::<ItemStatus>()
            .map(Some)
            .map_err(|_| RequestValidationError::UnknownStatus(value.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("")).unwrap(), None);
        assert_eq!(parse_status(Some("failed")).unwrap(), Some(ItemStatus::Failed));
        assert!(matches!(
            parse_status(Some("archived")),
            Err(RequestValidationError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_item_id_limit() {
        let ids: Vec<u64> = (0..501).collect();
        assert!(validate_item_ids(Some(&ids)).is_err());
        assert!(validate_item_ids(Some(&ids[..500])).is_ok());
        assert!(validate_item_ids(None).is_ok());
    }

    #[test]
    fn test_require() {
        assert!(require("supplier_name", "acme").is_ok());
        assert_eq!(require("supplier_name", " ").unwrap_err().field(), "supplier_name");
    }
}

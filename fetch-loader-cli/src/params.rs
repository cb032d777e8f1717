use crate::error::AppError;
use tracing::{debug, error};

/// Parses `-H` arguments of the form `Name: value` into header pairs.
///
/// The split happens at the first `:`, surrounding whitespace is trimmed and
/// the value may be empty. A missing `:` or an empty name is rejected.
pub fn parse_headers(headers: &[String]) -> Result<Vec<(String, String)>, AppError> {
    debug!("Parsing {} headers", headers.len());

    headers
        .iter()
        .map(|header| {
            let parsed = header
                .split_once(':')
                .map(|(name, value)| (name.trim(), value.trim()))
                .filter(|(name, _)| !name.is_empty());

            match parsed {
                Some((name, value)) => {
                    debug!("Added header: name='{name}'");
                    Ok((name.to_string(), value.to_string()))
                }
                None => {
                    error!("Invalid header format: {header}");
                    Err(AppError::InvalidInput(format!(
                        "Invalid header format: {header} (expected NAME:VALUE)"
                    )))
                }
            }
        })
        .collect()
}

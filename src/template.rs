//! Template clause library.
//!
//! The library is a JSON object of categories, each an object mapping a
//! sub-identifier to the template clause text:
//!
//! ```json
//! { "Governing Law": { "1": "This agreement is governed by Swiss law." } }
//! ```
//!
//! Records come out in file order, so runs over the same library are
//! reproducible.

use std::path::Path;

use serde_json::Value;

use crate::clause::ClauseRecord;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("io error reading template library: {0}")]
    Io(#[from] std::io::Error),

    #[error("template library is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected template library shape: {0}")]
    InvalidShape(String),
}

pub fn load_template(path: impl AsRef<Path>) -> Result<Vec<ClauseRecord>, TemplateError> {
    let data = std::fs::read(path.as_ref())?;
    let value: Value = serde_json::from_slice(&data)?;
    let records = records_from_value(value)?;

    log::info!(
        "loaded {} template clauses from {}",
        records.len(),
        path.as_ref().display()
    );

    Ok(records)
}

pub fn records_from_value(value: Value) -> Result<Vec<ClauseRecord>, TemplateError> {
    let Value::Object(categories) = value else {
        return Err(TemplateError::InvalidShape(
            "top level must be an object of clause categories".to_string(),
        ));
    };

    let mut records = vec![];

    for (category, clauses) in categories {
        let Value::Object(clauses) = clauses else {
            log::warn!("skipping template category '{category}': not an object");
            continue;
        };

        for (subname, text) in clauses {
            let Value::String(text) = text else {
                return Err(TemplateError::InvalidShape(format!(
                    "clause '{category}' / '{subname}' must be a string"
                )));
            };

            records.push(ClauseRecord::new(category.clone(), subname, text));
        }
    }

    Ok(records)
}

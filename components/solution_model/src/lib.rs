// components/solution_model/src/lib.rs
//! Solution documents for the cloud provisioner
//!
//! A solution is a JSON file describing an ordered list of configuration
//! items. This component owns the document types, the normalized
//! `ServiceResponse` every HTTP call is reduced to, and reading/writing
//! solution files.
//!
//! ```no_run
//! # async fn demo() -> solution_model::Result<()> {
//! let solution = solution_model::load_solution("sandbox.json").await?;
//! println!("{} has {} steps", solution.name, solution.config_items.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod item;
mod response;
mod solution;
mod validation;

use serde_json::Value;
use std::path::Path;

pub use error::{Result, SolutionError};
pub use item::{ItemType, ResourceApiType, StepKind};
pub use response::{
    succeeded, ServiceError, ServiceResponse, LOCAL_FAILURE_STATUS, UNAUTHORIZED_STATUS,
};
pub use solution::{ConfigurationItem, Solution, SOLUTION_FILE_TYPE};
pub use validation::ValidationError;

/// Read a solution file, refusing anything without the solution file type
///
/// The file type is checked before the rest of the document is decoded so a
/// foreign JSON file is reported as such rather than as a schema error.
pub async fn load_solution(path: impl AsRef<Path>) -> Result<Solution> {
    let path = path.as_ref();
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| SolutionError::read(path, e))?;

    let document: Value = serde_json::from_slice(&raw).map_err(|e| SolutionError::json(path, e))?;

    let file_type = document.get("fileType").and_then(Value::as_str);
    if file_type != Some(SOLUTION_FILE_TYPE) {
        tracing::error!(path = %path.display(), ?file_type, "rejected solution file");
        return Err(SolutionError::WrongFileType {
            path: path.to_path_buf(),
        });
    }

    let solution: Solution =
        serde_json::from_value(document).map_err(|e| SolutionError::json(path, e))?;
    solution.validate()?;

    tracing::info!(
        path = %path.display(),
        name = %solution.name,
        items = solution.config_items.len(),
        "loaded solution"
    );
    Ok(solution)
}

/// Write the whole solution document back to disk
pub async fn save_solution(path: impl AsRef<Path>, solution: &Solution) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_vec_pretty(solution).map_err(|e| SolutionError::json(path, e))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| SolutionError::write(path, e))?;
    tracing::debug!(path = %path.display(), "saved solution");
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors raised while building query trees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("empty segment in field path `{path}`")]
    EmptySegment { path: String },
}

pub type QueryResult<T> = Result<T, QueryError>;

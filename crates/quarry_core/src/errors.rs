use crate::schema::DataType;

#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    #[error("Missing field '{path}'{}", suggestion_suffix(.suggestion))]
    FieldNotFound {
        path: String,
        suggestion: Option<String>,
    },

    #[error("Ambiguous field '{path}', candidates: {}", join_candidates(.candidates))]
    AmbiguousField {
        path: String,
        candidates: Vec<String>,
    },

    #[error("Can't coerce {left} to {right}")]
    TypeMismatch { left: DataType, right: DataType },

    #[error("Missing function '{0}'")]
    FunctionNotFound(String),

    #[error("Missing aggregate '{0}'")]
    AggregateNotFound(String),

    #[error("Missing relation '{0}'")]
    RelationNotFound(String),

    #[error("adapter '{adapter}': {message}")]
    Adapter { adapter: String, message: String },

    /// Structurally valid tree that can't be resolved, such as mismatched
    /// union inputs.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("execution: {0}")]
    Execution(String),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T, E = QuarryError> = std::result::Result<T, E>;

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(", did you mean '{s}'?"),
        None => String::new(),
    }
}

fn join_candidates(candidates: &[String]) -> String {
    candidates.join(", ")
}

/// Build a field-not-found error, suggesting the closest candidate name.
pub fn field_not_found<'a>(
    path: impl Into<String>,
    candidates: impl IntoIterator<Item = &'a str>,
) -> QuarryError {
    let path = path.into();
    let suggestion = candidates
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(&path, candidate), candidate))
        .filter(|(score, _)| *score > 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string());

    QuarryError::FieldNotFound { path, suggestion }
}

macro_rules! internal {
    ($($arg:tt)*) => {
        crate::errors::QuarryError::Internal(std::format!($($arg)*))
    };
}
pub(crate) use internal;

macro_rules! invalid_plan {
    ($($arg:tt)*) => {
        crate::errors::QuarryError::InvalidPlan(std::format!($($arg)*))
    };
}
pub(crate) use invalid_plan;

macro_rules! execution {
    ($($arg:tt)*) => {
        crate::errors::QuarryError::Execution(std::format!($($arg)*))
    };
}
pub(crate) use execution;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_suggests_close_name() {
        let err = field_not_found("manger_id", ["id", "name", "manager_id"]);
        assert_eq!(
            "Missing field 'manger_id', did you mean 'manager_id'?",
            err.to_string()
        );
    }

    #[test]
    fn not_found_without_close_name() {
        let err = field_not_found("zzz", ["id", "name"]);
        assert_eq!("Missing field 'zzz'", err.to_string());
    }
}

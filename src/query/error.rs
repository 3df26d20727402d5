use crate::codec::DecodeError;
use crate::ptb::ComposeError;

pub type QueryResult<T> = Result<T, QueryError>;

/// Failure of a query. Nothing is retried or partially returned.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Unknown pool, coin, or trading account key.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The ledger could not evaluate the call. `message` is the ledger's own text.
    #[error("simulation failed: {message}")]
    Simulation { code: Option<u64>, message: String },

    /// The node could not be reached or answered with something unparseable.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl QueryError {
    /// Build a simulation error from a ledger message, pulling out the Move
    /// abort code when there is one.
    pub fn simulation(message: impl Into<String>) -> Self {
        let message = message.into();
        QueryError::Simulation {
            code: parse_abort_code(&message),
            message,
        }
    }
}

impl From<ComposeError> for QueryError {
    fn from(err: ComposeError) -> Self {
        QueryError::InvalidInput(err.to_string())
    }
}

/// Extract `CODE` from `MoveAbort(MoveLocation { .. }, CODE) in command N`.
pub fn parse_abort_code(message: &str) -> Option<u64> {
    let start = message.find("MoveAbort(")? + "MoveAbort(".len();
    let rest = &message[start..];

    // The location may itself contain parentheses; the code follows the
    // comma that closes it at nesting depth zero.
    let mut depth = 0usize;
    let mut code_start = None;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '(' | '{' => depth += 1,
            ')' | '}' if depth > 0 => depth -= 1,
            ')' => break,
            ',' if depth == 0 => code_start = Some(idx + 1),
            _ => {}
        }
    }

    let code_start = code_start?;
    let code = rest[code_start..]
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()?;
    code.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_abort_code() {
        let message = "MoveAbort(MoveLocation { module: ModuleId { address: 2c8d603bc51326b8c13cef9dd07031a408a48dddb541963357661df5d3204809, name: Identifier(\"balance_manager\") }, function: 11, instruction: 12, function_name: Some(\"validate_owner\") }, 0) in command 0";
        assert_eq!(parse_abort_code(message), Some(0));

        let message = "MoveAbort(MoveLocation { module: ModuleId { address: 0x2, name: Identifier(\"pool\") }, function: 3, instruction: 7, function_name: Some(\"get_level2_range\") }, 14) in command 0";
        assert_eq!(parse_abort_code(message), Some(14));
    }

    #[test]
    fn test_parse_abort_code_absent() {
        assert_eq!(parse_abort_code("InsufficientGas"), None);
        assert_eq!(parse_abort_code("MoveAbort(garbage"), None);
    }

    #[test]
    fn test_simulation_keeps_message_verbatim() {
        let message = "MoveAbort(MoveLocation { module: ModuleId { address: 0x2, name: Identifier(\"pool\") }, function: 1, instruction: 2, function_name: None }, 4) in command 0";
        match QueryError::simulation(message) {
            QueryError::Simulation { code, message: kept } => {
                assert_eq!(code, Some(4));
                assert_eq!(kept, message);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

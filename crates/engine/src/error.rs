/// Errors produced while talking to, or running inside, a computation unit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// The request failed shape validation before it was sent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The engine reported a failure for an otherwise valid request.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The engine panicked while handling the request.
    #[error("Engine panicked: {0}")]
    Panicked(String),

    /// The unit's thread has exited and can no longer accept requests.
    #[error("Computation unit {0} has stopped")]
    UnitStopped(String),

    /// The unit answered with a response of the wrong kind.
    #[error("Unexpected response from computation unit, expected {0}")]
    UnexpectedResponse(&'static str),

    /// The unit's thread could not be started.
    #[error("Failed to spawn computation unit: {0}")]
    Spawn(String),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool source error: {0}")]
    ToolSource(String),

    #[error("Agent reached the maximum of {0} steps without a final answer")]
    StepBudgetExceeded(usize),
}

/// A failed turn. Reported to the user; the session keeps going.
#[derive(Error, Debug)]
pub enum TurnError {
    #[error("{0}")]
    Agent(#[from] AgentError),

    #[error("{0}")]
    Other(String),
}

/// A failure of the session loop itself. Ends the loop but never skips shutdown.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("input error: {0}")]
    Input(String),

    #[error("EOF when reading a line")]
    InputClosed,

    #[error("interrupted")]
    Interrupted,

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

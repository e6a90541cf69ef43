use std::fmt;
use std::sync::Arc;
use tokio::process::Command;
use try_again::MaybeAsync;

/// A process to run once per attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub success_codes: Arc<Vec<i32>>,
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The process could not be started
    Spawn(String),
    /// The process exited with an unexpected code, `None` if killed by a signal
    Exit(Option<i32>),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Spawn(e) => write!(f, "failed to start command: {}", e),
            CommandError::Exit(Some(code)) => write!(f, "command exited with code {}", code),
            CommandError::Exit(None) => write!(f, "command was terminated by a signal"),
        }
    }
}

impl std::error::Error for CommandError {}

impl CommandSpec {
    pub fn new(command: &[String], success_codes: Vec<i32>) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            success_codes: Arc::new(success_codes),
        })
    }

    /// Run the process to completion and return its exit code
    pub async fn run(self) -> Result<i32, CommandError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| CommandError::Spawn(e.to_string()))?;
        match status.code() {
            Some(code) if self.success_codes.contains(&code) => Ok(code),
            code => Err(CommandError::Exit(code)),
        }
    }

    /// Attempt suitable for [`try_again::wrap`]
    pub fn attempt(self) -> MaybeAsync<i32, CommandError> {
        MaybeAsync::future(self.run())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, success: Vec<i32>) -> CommandSpec {
        let cmd = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        CommandSpec::new(&cmd, success).unwrap()
    }

    #[test]
    fn splits_program_and_args() {
        let cmd = vec!["echo".to_string(), "a".to_string(), "b".to_string()];
        let spec = CommandSpec::new(&cmd, vec![0]).unwrap();
        assert_eq!(spec.program, "echo");
        assert_eq!(spec.args, vec!["a", "b"]);
        assert!(CommandSpec::new(&[], vec![0]).is_none());
    }

    #[tokio::test]
    async fn exit_codes() {
        assert_eq!(sh("exit 0", vec![0]).run().await, Ok(0));
        assert_eq!(sh("exit 3", vec![0]).run().await, Err(CommandError::Exit(Some(3))));
        assert_eq!(sh("exit 3", vec![0, 3]).run().await, Ok(3));
    }

    #[tokio::test]
    async fn missing_program() {
        let cmd = vec!["/nonexistent/try-again-test".to_string()];
        let res = CommandSpec::new(&cmd, vec![0]).unwrap().run().await;
        assert!(matches!(res, Err(CommandError::Spawn(_))));
    }

    #[tokio::test]
    async fn retries_failing_command() {
        use try_again::{Options, wrap};

        let retryable = wrap(|spec: CommandSpec| spec.attempt()).with_options(
            Options::default()
                .with_retries(2)
                .with_delay_multiplier(1),
        );
        let err = retryable.call(sh("exit 7", vec![0])).await.unwrap_err();

        assert_eq!(err.into_inner(), Some(CommandError::Exit(Some(7))));
        assert_eq!(retryable.executions().len(), 3);
    }
}

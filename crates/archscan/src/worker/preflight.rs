//! Startup checks run before any worker is spawned.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::config::{ScannerConfig, DEFAULT_TOKEN_ENV_VAR};
use crate::error::WorkerError;
use crate::process::{CommandSpec, ProcessRunner};

/// Text the scanner's `--help` output must contain.
const HELP_MARKER: &str = "Usage: semgrep";

const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(60);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Verifies the scanner binary can be executed and is the expected tool.
pub fn check_tool(runner: &dyn ProcessRunner, config: &ScannerConfig) -> Result<(), WorkerError> {
    info!("Checking if {} is installed", config.binary);

    let command = CommandSpec::new(&config.binary)
        .arg("--help")
        .timeout(Some(PREFLIGHT_TIMEOUT));
    let output = runner
        .run(&command)
        .map_err(|e| WorkerError::ToolNotAvailable {
            program: config.binary.clone(),
            detail: e.to_string(),
        })?;

    if !output.success {
        return Err(WorkerError::ToolNotAvailable {
            program: config.binary.clone(),
            detail: output.failure_detail(),
        });
    }

    if !String::from_utf8_lossy(&output.stdout).contains(HELP_MARKER) {
        return Err(WorkerError::ToolNotAvailable {
            program: config.binary.clone(),
            detail: format!("'--help' output does not contain '{}'", HELP_MARKER),
        });
    }

    info!("{} is installed", config.binary);
    Ok(())
}

/// Logs in with `token` and installs the pro engine. Runs once per process.
pub fn activate_pro(
    runner: &dyn ProcessRunner,
    config: &ScannerConfig,
    token: &SecretString,
) -> Result<(), WorkerError> {
    info!("Found token, logging into the scanner");
    run_with_token(runner, config, token, &["login"], PREFLIGHT_TIMEOUT, "logging in")?;

    info!("Installing the scanner pro engine");
    run_with_token(
        runner,
        config,
        token,
        &["install-semgrep-pro"],
        INSTALL_TIMEOUT,
        "installing the pro engine",
    )?;

    info!("Scanner pro engine installed");
    Ok(())
}

fn run_with_token(
    runner: &dyn ProcessRunner,
    config: &ScannerConfig,
    token: &SecretString,
    args: &[&str],
    timeout: Duration,
    step: &str,
) -> Result<(), WorkerError> {
    let command = CommandSpec::new(&config.binary)
        .args(args.iter().copied())
        .env(
            DEFAULT_TOKEN_ENV_VAR,
            SecretString::from(token.expose_secret().to_string()),
        )
        .timeout(Some(timeout));

    let output = runner
        .run(&command)
        .map_err(|e| WorkerError::ActivationFailed(format!("error {}: {}", step, e)))?;

    if !output.success {
        return Err(WorkerError::ActivationFailed(format!(
            "error {}: {}",
            step,
            output.failure_detail()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::process::testing::{exit, ok, ScriptedRunner};

    const HELP: &str = "Usage: semgrep [OPTIONS] COMMAND [ARGS]...\n\n  To get started quickly, run `semgrep scan`";

    #[test]
    fn test_check_tool_accepts_scanner_help() {
        let runner = ScriptedRunner::new(|_| ok(HELP));
        check_tool(&runner, &ScannerConfig::default()).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "semgrep");
        assert_eq!(calls[0].args, vec!["--help"]);
    }

    #[test]
    fn test_check_tool_missing_binary() {
        let runner = ScriptedRunner::new(|spec| {
            Err(ProcessError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });
        let err = check_tool(&runner, &ScannerConfig::default()).unwrap_err();
        assert!(matches!(err, WorkerError::ToolNotAvailable { .. }));
    }

    #[test]
    fn test_check_tool_rejects_other_program() {
        let runner =
            ScriptedRunner::new(|_| ok("usage: grep [-abcdDEFGHhIiJLlMmnOopqRSsUVvwXxZz]"));
        let err = check_tool(&runner, &ScannerConfig::default()).unwrap_err();
        match err {
            WorkerError::ToolNotAvailable { detail, .. } => assert!(detail.contains(HELP_MARKER)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_tool_rejects_failing_help() {
        let runner = ScriptedRunner::new(|_| exit(127, "semgrep: command not found"));
        let err = check_tool(&runner, &ScannerConfig::default()).unwrap_err();
        assert!(matches!(err, WorkerError::ToolNotAvailable { .. }));
    }

    #[test]
    fn test_activation_logs_in_then_installs_with_token() {
        let runner = ScriptedRunner::new(|_| ok(""));
        let token = SecretString::from("sgp_test".to_string());

        activate_pro(&runner, &ScannerConfig::default(), &token).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, vec!["login"]);
        assert_eq!(calls[1].args, vec!["install-semgrep-pro"]);
        for call in &calls {
            assert_eq!(call.env_keys, vec![DEFAULT_TOKEN_ENV_VAR]);
        }
    }

    #[test]
    fn test_login_failure_stops_activation() {
        let runner = ScriptedRunner::new(|spec| {
            if spec.args == ["login"] {
                exit(1, "invalid token")
            } else {
                ok("")
            }
        });
        let token = SecretString::from("bad".to_string());

        let err = activate_pro(&runner, &ScannerConfig::default(), &token).unwrap_err();

        match err {
            WorkerError::ActivationFailed(message) => {
                assert!(message.contains("logging in"));
                assert!(message.contains("invalid token"));
                assert!(!message.contains("bad"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runner.calls().len(), 1);
    }
}

//! Command builder for solana-test-validator.

use std::path::Path;

/// Builder for solana-test-validator arguments.
#[derive(Debug, Clone)]
pub struct ValidatorCmdBuilder {
    ledger: String,
    quiet: bool,
    reset: bool,
    rpc_port: Option<u16>,
    extra_args: Vec<String>,
}

impl ValidatorCmdBuilder {
    /// Create a new builder writing its ledger to `ledger`.
    pub fn new(ledger: impl AsRef<Path>) -> Self {
        Self {
            ledger: ledger.as_ref().display().to_string(),
            quiet: false,
            reset: false,
            rpc_port: None,
            extra_args: Vec::new(),
        }
    }

    /// Suppress the validator's interactive progress output.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Discard any ledger state left by a previous run.
    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Set the JSON RPC port.
    pub fn rpc_port(mut self, port: Option<u16>) -> Self {
        self.rpc_port = port;
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the command as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = Vec::new();

        if self.quiet {
            cmd.push("--quiet".to_string());
        }

        if self.reset {
            cmd.push("--reset".to_string());
        }

        cmd.push("--ledger".to_string());
        cmd.push(self.ledger);

        if let Some(port) = self.rpc_port {
            cmd.push("--rpc-port".to_string());
            cmd.push(port.to_string());
        }

        cmd.extend(self.extra_args);

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_cmd_builder() {
        let cmd = ValidatorCmdBuilder::new(".anchor/test-ledger")
            .quiet(true)
            .reset(true)
            .build();

        assert_eq!(cmd, vec!["--quiet", "--reset", "--ledger", ".anchor/test-ledger"]);
    }

    #[test]
    fn test_validator_cmd_builder_optional_args() {
        let cmd = ValidatorCmdBuilder::new("/tmp/ledger")
            .rpc_port(Some(8999))
            .extra_args(["--limit-ledger-size", "50000000"])
            .build();

        assert!(!cmd.contains(&"--reset".to_string()));
        assert!(cmd.contains(&"--rpc-port".to_string()));
        assert!(cmd.contains(&"8999".to_string()));
        assert_eq!(cmd.last().map(String::as_str), Some("50000000"));
    }
}

//! Scripted toolchain used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output, Stdio};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use tokio::process::{Child, Command};

use crate::runner::ToolRunner;

pub fn ok_output(stdout: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

pub fn output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

pub fn config_report(rpc_url: &str) -> String {
    format!(
        "Config File: /home/dev/.config/solana/cli/config.yml\n\
         RPC URL: {rpc_url} \n\
         WebSocket URL: ws://localhost:8900 (computed)\n\
         Keypair Path: /home/dev/.config/solana/id.json\n\
         Commitment: confirmed\n"
    )
}

/// A fake Solana/Anchor toolchain.
///
/// `solana config get/set` keep a shared RPC URL; any other command answers from a
/// per-command script (last entry repeats) or with an empty success.
pub struct FakeToolchain {
    rpc_url: Mutex<Option<String>>,
    scripts: Mutex<HashMap<String, VecDeque<std::result::Result<Output, String>>>>,
    calls: Mutex<Vec<String>>,
    spawn_script: Mutex<Option<String>>,
    fail_config_set: bool,
}

impl FakeToolchain {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            rpc_url: Mutex::new(Some(rpc_url.to_string())),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            spawn_script: Mutex::new(None),
            fail_config_set: false,
        }
    }

    /// A toolchain whose config report has no RPC URL line.
    pub fn without_rpc_url() -> Self {
        let fake = Self::new("");
        *fake.rpc_url.lock().unwrap() = None;
        fake
    }

    pub fn failing_config_set(mut self) -> Self {
        self.fail_config_set = true;
        self
    }

    pub fn script(self, command: &str, response: Output) -> Self {
        self.push(command, Ok(response));
        self
    }

    pub fn script_err(self, command: &str, message: &str) -> Self {
        self.push(command, Err(message.to_string()));
        self
    }

    pub fn spawns(self, script: &str) -> Self {
        *self.spawn_script.lock().unwrap() = Some(script.to_string());
        self
    }

    fn push(&self, command: &str, response: std::result::Result<Output, String>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn rpc_url(&self) -> Option<String> {
        self.rpc_url.lock().unwrap().clone()
    }

    fn respond(&self, line: &str, args: &[&str]) -> Result<Output> {
        self.calls.lock().unwrap().push(line.to_string());

        if let Some(queue) = self.scripts.lock().unwrap().get_mut(line) {
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(response) = next {
                return response.map_err(|e| anyhow::anyhow!(e));
            }
        }

        if line.ends_with("config get") {
            let url = self.rpc_url.lock().unwrap().clone();
            return Ok(match url {
                Some(url) => ok_output(&config_report(&url)),
                None => ok_output("Config File: /home/dev/.config/solana/cli/config.yml\n"),
            });
        }

        if line.contains("config set --url") {
            if self.fail_config_set {
                return Ok(output(1, "", "Error: unable to write config file"));
            }
            *self.rpc_url.lock().unwrap() = args.last().map(|s| s.to_string());
            return Ok(ok_output(""));
        }

        Ok(ok_output(""))
    }
}

impl ToolRunner for FakeToolchain {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        let line = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
        self.respond(&line, args)
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<Output> {
        self.run(program, args).await
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<Child> {
        let line = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
        self.calls.lock().unwrap().push(format!("spawn {line}"));

        let script = self
            .spawn_script
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("failed to spawn {program}: not found"))?;

        Ok(Command::new("sh")
            .args(["-c", &script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?)
    }
}

//! Simulated ELM327 adapter for tests and demo runs (no hardware required)

use crate::command;
use crate::pid::Pid;
use crate::protocol::ObdProtocol;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::{debug, warn};

/// Commands received by a [`MockAdapter`], shared with the test that spawned it
#[derive(Debug, Clone, Default)]
pub struct CommandHistory(Arc<Mutex<Vec<String>>>);

impl CommandHistory {
    fn record(&self, command: &str) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.to_string());
    }

    /// All commands in arrival order
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// How many times `command` arrived
    pub fn count(&self, command: &str) -> usize {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scriptable adapter that answers over an in-memory duplex stream
pub struct MockAdapter {
    firmware: String,
    echo: bool,
    active_protocol: ObdProtocol,
    rejected: Vec<ObdProtocol>,
    replies: HashMap<String, String>,
    values: HashMap<Pid, f64>,
    trouble_codes: Vec<String>,
    silent: Vec<String>,
    disconnect_after: Option<usize>,
    served: usize,
    history: CommandHistory,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self {
            firmware: "ELM327 v1.5".to_string(),
            echo: true,
            active_protocol: ObdProtocol::Auto,
            rejected: Vec::new(),
            replies: HashMap::new(),
            values: HashMap::new(),
            trouble_codes: Vec::new(),
            silent: Vec::new(),
            disconnect_after: None,
            served: 0,
            history: CommandHistory::default(),
        }
    }
}

impl MockAdapter {
    pub fn with_firmware(mut self, firmware: impl Into<String>) -> Self {
        self.firmware = firmware.into();
        self
    }

    /// Fixed reply for a command, overriding the built-in behavior
    pub fn with_reply(mut self, command: &str, reply: impl Into<String>) -> Self {
        self.replies.insert(command.to_uppercase(), reply.into());
        self
    }

    /// Fixed physical value for a PID instead of simulated data
    pub fn with_value(mut self, pid: Pid, value: f64) -> Self {
        self.values.insert(pid, value);
        self
    }

    /// Stored trouble code, e.g. `P0133`
    pub fn with_trouble_code(mut self, code: &str) -> Self {
        let digit = match code.chars().next() {
            Some('P') => '0',
            Some('C') => '1',
            Some('B') => '2',
            Some('U') => '3',
            _ => {
                warn!("Ignoring malformed trouble code {:?}", code);
                return self;
            }
        };
        match code.get(2..5) {
            Some(suffix) if code.len() == 5 => {
                self.trouble_codes.push(format!("{}{}", digit, suffix))
            }
            _ => warn!("Ignoring malformed trouble code {:?}", code),
        }
        self
    }

    /// Answer `?` to this protocol's `ATSPn`
    pub fn rejecting_protocol(mut self, protocol: ObdProtocol) -> Self {
        self.rejected.push(protocol);
        self
    }

    /// Never answer this command
    pub fn silent_on(mut self, command: &str) -> Self {
        self.silent.push(command.to_uppercase());
        self
    }

    /// Close the stream after answering `count` commands
    pub fn disconnect_after(mut self, count: usize) -> Self {
        self.disconnect_after = Some(count);
        self
    }

    /// Handle to the commands this adapter receives
    pub fn history(&self) -> CommandHistory {
        self.history.clone()
    }

    /// Start serving on a background task and return the client end
    pub fn spawn(self) -> DuplexStream {
        let (client, server) = duplex(4096);
        tokio::spawn(self.serve(server));
        client
    }

    async fn serve(mut self, mut stream: DuplexStream) {
        let mut pending = Vec::new();
        let mut buf = [0u8; 256];

        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            pending.extend_from_slice(&buf[..n]);

            while let Some(end) = pending.iter().position(|&b| b == b'\r') {
                let line: Vec<u8> = pending.drain(..=end).collect();
                let command = String::from_utf8_lossy(&line[..end]).trim().to_uppercase();
                if command.is_empty() {
                    continue;
                }

                self.history.record(&command);
                let echo = self.echo;
                let Some(reply) = self.respond(&command) else {
                    debug!("Mock adapter ignoring {}", command);
                    continue;
                };

                let mut out = String::new();
                if echo {
                    out.push_str(&command);
                    out.push('\r');
                }
                out.push_str(&reply);
                out.push_str("\r\r>");
                if stream.write_all(out.as_bytes()).await.is_err() {
                    return;
                }

                self.served += 1;
                if self.disconnect_after.is_some_and(|limit| self.served >= limit) {
                    debug!("Mock adapter closing after {} commands", self.served);
                    return;
                }
            }
        }
    }

    fn respond(&mut self, command: &str) -> Option<String> {
        if self.silent.iter().any(|c| c == command) {
            return None;
        }
        if let Some(reply) = self.replies.get(command) {
            return Some(reply.clone());
        }

        let reply = match command {
            command::RESET => {
                self.echo = true;
                self.active_protocol = ObdProtocol::Auto;
                self.firmware.clone()
            }
            command::VERSION => self.firmware.clone(),
            command::ECHO_OFF => {
                self.echo = false;
                "OK".to_string()
            }
            "ATE1" => {
                self.echo = true;
                "OK".to_string()
            }
            "ATH0" | "ATH1" | "ATL0" | "ATL1" => "OK".to_string(),
            command::DESCRIBE_PROTOCOL => self.active_protocol.description().to_string(),
            command::READ_DTC => self.trouble_code_reply(),
            command::CLEAR_DTC => {
                self.trouble_codes.clear();
                "OK".to_string()
            }
            _ if command.starts_with("ATSP") => match ObdProtocol::from_elm_command(command) {
                Some(protocol) if !self.rejected.contains(&protocol) => {
                    self.active_protocol = protocol;
                    "OK".to_string()
                }
                _ => "?".to_string(),
            },
            _ if command.len() == 4 && command.starts_with("01") => self.pid_reply(&command[2..]),
            _ => "?".to_string(),
        };

        Some(reply)
    }

    fn pid_reply(&mut self, digits: &str) -> String {
        let Some(pid) = u8::from_str_radix(digits, 16).ok().and_then(Pid::from_hex) else {
            return "NO DATA".to_string();
        };
        let value = match self.values.get(&pid) {
            Some(value) => *value,
            None => self.simulated_value(pid),
        };
        pid.definition()
            .response_for(value)
            .unwrap_or_else(|| "NO DATA".to_string())
    }

    fn trouble_code_reply(&self) -> String {
        if self.trouble_codes.is_empty() {
            return "NO DATA".to_string();
        }

        // Pad to whole frames of three codes
        let mut groups = self.trouble_codes.clone();
        while groups.len() % 3 != 0 {
            groups.push("0000".to_string());
        }
        groups
            .iter()
            .map(|g| format!("{} {}", &g[..2], &g[2..]))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Pseudo-random but plausible values, varying per served command
    fn simulated_value(&self, pid: Pid) -> f64 {
        let mut hasher = DefaultHasher::new();
        self.served.hash(&mut hasher);
        pid.hash(&mut hasher);
        let hash = hasher.finish();

        match pid {
            // 800-3500 RPM
            Pid::EngineRpm => 800.0 + (hash % 2700) as f64,
            // 0-120 km/h
            Pid::Speed => (hash % 120) as f64,
            // 70-105°C
            Pid::CoolantTemp => 70.0 + (hash % 35) as f64,
            Pid::FuelLevel => 20.0 + (hash % 60) as f64,
            Pid::IntakePressure => 30.0 + (hash % 70) as f64,
            Pid::TurboPressure | Pid::BoostPressure => 100.0 + (hash % 100) as f64,
            Pid::ClutchStatus => (hash % 2) as f64,
            Pid::FuelConsumption => 4.0 + (hash % 60) as f64 / 10.0,
            Pid::OilTemperature => 80.0 + (hash % 40) as f64,
            Pid::HybridBattery => 40.0 + (hash % 50) as f64,
        }
    }
}

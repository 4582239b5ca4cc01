//! Console output: JSON lines or plain text

use chrono::SecondsFormat;
use obd_protocol::{MetricReading, Snapshot, TroubleCode, VehicleProfile};
use obd_scheduler::LinkEvent;
use std::io::{self, Write};

pub struct Output<W: Write> {
    writer: W,
    json: bool,
}

impl<W: Write> Output<W> {
    pub fn new(writer: W, json: bool) -> Self {
        Self { writer, json }
    }

    pub fn event(&mut self, event: &LinkEvent) -> io::Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.writer, event)?;
            return writeln!(self.writer);
        }

        match event {
            LinkEvent::ConnectionStatusChanged { success, message } => {
                let status = if *success { "Connected" } else { "Not connected" };
                writeln!(self.writer, "{}", status)?;
                for line in message.lines() {
                    writeln!(self.writer, "  {}", line)?;
                }
                Ok(())
            }
            LinkEvent::SnapshotProduced(snapshot) => {
                writeln!(self.writer, "{}", format_snapshot(snapshot))
            }
            LinkEvent::TroubleCodesProduced(codes) => self.trouble_codes(codes),
        }
    }

    pub fn trouble_codes(&mut self, codes: &[TroubleCode]) -> io::Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.writer, codes)?;
            return writeln!(self.writer);
        }
        if codes.is_empty() {
            return writeln!(self.writer, "No stored trouble codes");
        }
        for code in codes {
            writeln!(self.writer, "{}", code)?;
        }
        Ok(())
    }

    pub fn profiles(&mut self, profiles: &[VehicleProfile]) -> io::Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.writer, profiles)?;
            return writeln!(self.writer);
        }
        for profile in profiles {
            writeln!(
                self.writer,
                "{} ({} {}, fallback {} {})",
                profile.name,
                profile.protocol_command(),
                profile.protocol.description(),
                profile.fallback_command(),
                profile.fallback.description()
            )?;
            for parameter in &profile.parameters {
                writeln!(self.writer, "  {:<20} {}", parameter.name, parameter.pid)?;
            }
        }
        Ok(())
    }

    /// Plain status line; skipped in JSON mode
    pub fn message(&mut self, text: &str) -> io::Result<()> {
        if self.json {
            return Ok(());
        }
        writeln!(self.writer, "{}", text)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// One line per snapshot: time, then `key=value unit` pairs
pub fn format_snapshot(snapshot: &Snapshot) -> String {
    let mut line = snapshot
        .timestamp()
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    for reading in snapshot.readings() {
        line.push_str("  ");
        line.push_str(&reading.name);
        line.push('=');
        line.push_str(&format_value(reading));
    }
    line
}

fn format_value(reading: &MetricReading) -> String {
    let Some(value) = reading.value else {
        return "-".to_string();
    };
    let number = if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    };
    match reading.unit.symbol() {
        "" => number,
        unit => format!("{} {}", number, unit),
    }
}

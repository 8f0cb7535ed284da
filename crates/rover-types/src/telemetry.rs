//! Telemetry line codec shared by the controller and the host.
//!
//! Every line is ASCII, comma separated and terminated by `\n`. Two line
//! families exist:
//!
//! ```text
//! T,<seq>,<mode>,<level>,<n>,<r_0>,...,<r_{n-1}>,<imbalance>,<p>,<i>,<d>,<output>,<forward>,<left>,<right>
//! !<status text>
//! ```
//!
//! | field | meaning |
//! |---|---|
//! | `seq` | frame counter, +1 per emitted frame |
//! | `mode` | `A` = AutonomousPid, `M` = Manual |
//! | `level` | base speed level 0-9 |
//! | `n` | number of ranging readings that follow |
//! | `r_k` | reading in mm, `8190` = no echo / fault |
//! | `imbalance` | right minus left obstacle pressure |
//! | `p`,`i`,`d`,`output` | PID terms of the last update |
//! | `forward` | forward wheel component |
//! | `left`,`right` | applied wheel speeds, signed |
//!
//! Floats carry three decimals.

use std::str::{FromStr, Split};

use serde::{Deserialize, Serialize};

use crate::{ControlMode, MAX_SENSORS, RangingVector, RoverError, SpeedLevel};

/// The individual terms of the last PID update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidTerms {
    pub p: f32,
    pub i: f32,
    pub d: f32,
    pub output: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub seq: u32,
    pub mode: ControlMode,
    pub level: SpeedLevel,
    pub ranging: RangingVector,
    pub imbalance: f32,
    pub pid: PidTerms,
    pub forward: i16,
    pub left: i16,
    pub right: i16,
}

impl TelemetryFrame {
    /// Serialise to a complete line, including the trailing `\n`.
    pub fn encode(&self) -> String {
        let mut line = format!(
            "T,{},{},{},{}",
            self.seq,
            self.mode.as_flag(),
            self.level,
            self.ranging.len()
        );
        for r in self.ranging.iter() {
            line.push(',');
            line.push_str(&r.to_string());
        }
        line.push_str(&format!(
            ",{:.3},{:.3},{:.3},{:.3},{:.3},{},{},{}\n",
            self.imbalance,
            self.pid.p,
            self.pid.i,
            self.pid.d,
            self.pid.output,
            self.forward,
            self.left,
            self.right
        ));
        line
    }

    /// Parse one `T,` line. Trailing line-end characters are ignored.
    pub fn parse(line: &str) -> Result<Self, RoverError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = Fields::new(line);

        if fields.text("tag")? != "T" {
            return Err(malformed(line, "not a telemetry line"));
        }
        let seq = fields.value("seq")?;
        let mode = ControlMode::from_flag(fields.text("mode")?)
            .ok_or_else(|| malformed(line, "unknown mode flag"))?;
        let level = SpeedLevel::new(fields.value("level")?)
            .ok_or_else(|| malformed(line, "speed level outside 0-9"))?;

        let n: usize = fields.value("n")?;
        if n > MAX_SENSORS {
            return Err(malformed(line, "too many readings"));
        }
        let mut readings = Vec::with_capacity(n);
        for _ in 0..n {
            readings.push(fields.value("reading")?);
        }

        let frame = Self {
            seq,
            mode,
            level,
            ranging: RangingVector::from_readings(readings),
            imbalance: fields.value("imbalance")?,
            pid: PidTerms {
                p: fields.value("p")?,
                i: fields.value("i")?,
                d: fields.value("d")?,
                output: fields.value("output")?,
            },
            forward: fields.value("forward")?,
            left: fields.value("left")?,
            right: fields.value("right")?,
        };
        fields.finish()?;
        Ok(frame)
    }

    /// The avoidance loop has stopped forward progress and is pivoting.
    pub fn is_obstacle_halt(&self) -> bool {
        self.mode == ControlMode::AutonomousPid && self.forward == 0
    }
}

/// One line received from the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Telemetry(TelemetryFrame),
    /// Text after the leading `!`.
    Status(String),
}

impl Inbound {
    pub fn parse(line: &str) -> Result<Self, RoverError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if let Some(status) = trimmed.strip_prefix('!') {
            return Ok(Self::Status(status.trim().to_string()));
        }
        if trimmed.starts_with("T,") {
            return TelemetryFrame::parse(trimmed).map(Self::Telemetry);
        }
        Err(malformed(trimmed, "unknown line type"))
    }
}

/// Format a status line, including the `!` prefix and trailing `\n`.
pub fn status_line(text: &str) -> String {
    format!("!{text}\n")
}

fn malformed(line: &str, reason: &str) -> RoverError {
    RoverError::MalformedTelemetry(format!("{reason}: {line:?}"))
}

struct Fields<'a> {
    line: &'a str,
    parts: Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            line,
            parts: line.split(','),
        }
    }

    fn text(&mut self, name: &str) -> Result<&'a str, RoverError> {
        self.parts
            .next()
            .ok_or_else(|| malformed(self.line, &format!("missing field `{name}`")))
    }

    fn value<T: FromStr>(&mut self, name: &str) -> Result<T, RoverError> {
        let raw = self.text(name)?;
        raw.trim()
            .parse()
            .map_err(|_| malformed(self.line, &format!("bad value for `{name}`")))
    }

    fn finish(mut self) -> Result<(), RoverError> {
        match self.parts.next() {
            None => Ok(()),
            Some(_) => Err(malformed(self.line, "trailing fields")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetryFrame {
        TelemetryFrame {
            seq: 42,
            mode: ControlMode::AutonomousPid,
            level: SpeedLevel::default(),
            ranging: RangingVector::from_readings(vec![800, 640, 50, 8190, 800]),
            imbalance: -0.875,
            pid: PidTerms {
                p: 0.875,
                i: 0.0,
                d: 0.0,
                output: 0.875,
            },
            forward: 0,
            left: 111,
            right: -111,
        }
    }

    #[test]
    fn encoded_line_has_documented_field_order() {
        let line = sample().encode();
        assert_eq!(
            line,
            "T,42,A,5,5,800,640,50,8190,800,-0.875,0.875,0.000,0.000,0.875,0,111,-111\n"
        );
    }

    #[test]
    fn parse_accepts_encoded_frame() {
        let frame = TelemetryFrame::parse(&sample().encode()).unwrap();
        assert_eq!(frame.seq, 42);
        assert_eq!(frame.ranging.as_slice(), &[800, 640, 50, 8190, 800]);
        assert!((frame.pid.output - 0.875).abs() < 1e-6);
        assert!(frame.is_obstacle_halt());
    }

    #[test]
    fn parse_rejects_truncated_and_padded_lines() {
        let line = sample().encode();
        let truncated = line.trim_end().rsplit_once(',').unwrap().0;
        assert!(matches!(
            TelemetryFrame::parse(truncated),
            Err(RoverError::MalformedTelemetry(_))
        ));
        let padded = format!("{},9", line.trim_end());
        assert!(TelemetryFrame::parse(&padded).is_err());
        assert!(TelemetryFrame::parse("T,1,Z,5,0,0,0,0,0,0,0,0,0").is_err());
    }

    #[test]
    fn inbound_distinguishes_status_and_garbage() {
        assert_eq!(
            Inbound::parse("!watchdog revert\r\n").unwrap(),
            Inbound::Status("watchdog revert".into())
        );
        assert!(matches!(
            Inbound::parse(&sample().encode()).unwrap(),
            Inbound::Telemetry(_)
        ));
        assert!(Inbound::parse("hello").is_err());
        assert_eq!(status_line("fault sensor 2"), "!fault sensor 2\n");
    }
}

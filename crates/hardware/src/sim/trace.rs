//! Request traces.
//!
//! A trace is a text file with one request per line:
//!
//! ```text
//! # core kind address [operand]
//! 0 R 0x1000 8
//! 0 W 0x1040 deadbeef
//! @2000 1 I 0x1000
//! ```
//!
//! `R` takes an optional size (default 8 bytes), `W` a hex string of the bytes
//! to store, `I` nothing. A leading `@<ps>` sets the issue time; lines without
//! one are issued as soon as they are read. Blank lines and `#` comments are
//! skipped.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::common::units::parse_addr;
use crate::common::{Addr, RequestId, RequestKind, SimError, SimResult, Tick};
use crate::sim::Simulator;

/// Read size used when a `R` line gives none.
pub const DEFAULT_READ_SIZE: usize = 8;

/// One parsed trace line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceOp {
    /// Issue time, if the line gave one.
    pub at: Option<Tick>,
    /// Issuing core.
    pub core: usize,
    /// First byte touched.
    pub addr: Addr,
    /// Operation.
    pub kind: RequestKind,
}

/// Parses a whole trace.
///
/// # Errors
///
/// [`SimError::Trace`] naming the first malformed line.
pub fn parse(text: &str) -> SimResult<Vec<TraceOp>> {
    let mut ops = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let op = parse_line(line).map_err(|detail| SimError::Trace {
            line: index + 1,
            detail,
        })?;
        ops.push(op);
    }
    Ok(ops)
}

/// Reads and parses the trace at `path`.
///
/// # Errors
///
/// [`SimError::Io`] if the file cannot be read, [`SimError::Trace`] if it is malformed.
pub fn load(path: impl AsRef<Path>) -> SimResult<Vec<TraceOp>> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

fn parse_line(line: &str) -> Result<TraceOp, String> {
    let mut fields = line.split_whitespace().peekable();
    let at = match fields.peek() {
        Some(first) if first.starts_with('@') => {
            let time = first[1..]
                .parse::<Tick>()
                .map_err(|e| format!("invalid issue time {first:?}: {e}"))?;
            let _ = fields.next();
            Some(time)
        }
        _ => None,
    };
    let core = fields
        .next()
        .ok_or("missing core")?
        .parse::<usize>()
        .map_err(|e| format!("invalid core: {e}"))?;
    let op = fields.next().ok_or("missing operation")?;
    let addr = parse_addr(fields.next().ok_or("missing address")?)?;
    let operand = fields.next();

    let kind = match op.to_ascii_uppercase().as_str() {
        "R" => {
            let size = match operand {
                Some(size) => size
                    .parse::<usize>()
                    .map_err(|e| format!("invalid read size {size:?}: {e}"))?,
                None => DEFAULT_READ_SIZE,
            };
            RequestKind::Read { size }
        }
        "W" => RequestKind::Write {
            bytes: parse_hex(operand.ok_or("write needs data bytes")?)?,
        },
        "I" => RequestKind::Invalidate,
        other => return Err(format!("unknown operation {other:?}")),
    };
    let extra = match kind {
        RequestKind::Invalidate => operand,
        _ => fields.next(),
    };
    if let Some(extra) = extra {
        return Err(format!("unexpected field {extra:?}"));
    }
    Ok(TraceOp {
        at,
        core,
        addr,
        kind,
    })
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if !digits.is_ascii() || digits.is_empty() || digits.len() % 2 != 0 {
        return Err(format!("hex data {text:?} must have an even number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("invalid hex data {text:?}: {e}"))
        })
        .collect()
}

/// Submits every operation in order and runs the hierarchy until it drains.
///
/// Timed operations wait for the clock to reach their issue time; an issue
/// time already in the past means "now".
///
/// # Errors
///
/// The first submission or simulation error.
pub fn replay(sim: &mut Simulator, ops: &[TraceOp]) -> SimResult<Vec<RequestId>> {
    let mut ids = Vec::with_capacity(ops.len());
    for op in ops {
        if let Some(at) = op.at.filter(|&at| at > sim.now()) {
            sim.run_until(at)?;
        }
        ids.push(sim.submit(op.core, op.addr, op.kind.clone())?);
    }
    sim.run()?;
    debug!(requests = ids.len(), now = sim.now(), "trace replayed");
    Ok(ids)
}

//! Physical units used by the configuration surface.
//!
//! Simulated time is counted in integer picoseconds ([`Tick`]), matching the
//! `1ps` timebase of the configurations this simulator reproduces. The types
//! here parse the human-readable strings found in those configurations:
//! 1. **Frequency:** `"2.5GHz"`, `"2400 MHz"` → clock period in ticks.
//! 2. **TimeSpan:** `"300ps"`, `"10ns"` → ticks.
//! 3. **ByteSize:** `"32 KiB"`, `"1030 MiB"`, `"256KB"` → bytes (SI vs binary prefixes honoured).
//!
//! All three also accept bare JSON numbers (Hz, ps and bytes respectively).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Simulated time in picoseconds.
pub type Tick = u64;

/// Picoseconds per second.
pub const PS_PER_SECOND: u64 = 1_000_000_000_000;

/// Untyped quantity as it appears in JSON: a number or a unit-suffixed string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Int(u64),
    Float(f64),
    Text(String),
}

/// Splits `"2.5 GHz"` into `("2.5", "GHz")`.
fn split_quantity(text: &str) -> (&str, &str) {
    let text = text.trim();
    let idx = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    (text[..idx].trim(), text[idx..].trim())
}

/// Multiplies a decimal number string by an integer unit, rounding to the nearest integer.
fn scale(number: &str, multiplier: u64) -> Result<u64, String> {
    if number.is_empty() {
        return Err("missing numeric value".to_owned());
    }
    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| format!("value {number} overflows"));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid number {number:?}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid number {number:?}"));
    }
    let scaled = (value * multiplier as f64).round();
    if scaled > u64::MAX as f64 {
        return Err(format!("value {number} overflows"));
    }
    Ok(scaled as u64)
}

/// A clock frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawQuantity", into = "String")]
pub struct Frequency {
    hz: u64,
}

impl Frequency {
    /// Creates a frequency from a value in hertz.
    pub const fn from_hz(hz: u64) -> Self {
        Self { hz }
    }

    /// Creates a frequency from a value in megahertz.
    pub const fn from_mhz(mhz: u64) -> Self {
        Self {
            hz: mhz * 1_000_000,
        }
    }

    /// Returns the frequency in hertz.
    pub const fn hz(self) -> u64 {
        self.hz
    }

    /// Clock period in ticks, rounded to the nearest picosecond (never zero).
    pub fn period(self) -> Tick {
        if self.hz == 0 {
            return 1;
        }
        ((PS_PER_SECOND + self.hz / 2) / self.hz).max(1)
    }

    /// Duration of `n` clock cycles in ticks.
    pub fn cycles(self, n: u64) -> Tick {
        self.period().saturating_mul(n)
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (number, unit) = split_quantity(s);
        let multiplier = match unit.to_ascii_lowercase().as_str() {
            "" | "hz" => 1,
            "khz" => 1_000,
            "mhz" => 1_000_000,
            "ghz" => 1_000_000_000,
            other => return Err(format!("unknown frequency unit {other:?} in {s:?}")),
        };
        let hz = scale(number, multiplier)?;
        if hz == 0 || hz > PS_PER_SECOND {
            return Err(format!("frequency {s:?} out of range (1Hz..=1THz)"));
        }
        Ok(Self { hz })
    }
}

impl TryFrom<RawQuantity> for Frequency {
    type Error = String;

    fn try_from(raw: RawQuantity) -> Result<Self, Self::Error> {
        match raw {
            RawQuantity::Int(hz) if hz > 0 => Ok(Self { hz }),
            RawQuantity::Int(_) => Err("frequency must be positive".to_owned()),
            RawQuantity::Float(hz) => format!("{hz}Hz").parse(),
            RawQuantity::Text(text) => text.parse(),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hz % 1_000_000_000 == 0 {
            write!(f, "{}GHz", self.hz / 1_000_000_000)
        } else if self.hz % 1_000_000 == 0 {
            write!(f, "{}MHz", self.hz / 1_000_000)
        } else if self.hz % 1_000 == 0 {
            write!(f, "{}kHz", self.hz / 1_000)
        } else {
            write!(f, "{}Hz", self.hz)
        }
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.to_string()
    }
}

/// A span of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawQuantity", into = "String")]
pub struct TimeSpan(Tick);

impl TimeSpan {
    /// Creates a span from picoseconds.
    pub const fn from_ps(ps: Tick) -> Self {
        Self(ps)
    }

    /// Creates a span from nanoseconds.
    pub const fn from_ns(ns: u64) -> Self {
        Self(ns * 1_000)
    }

    /// Returns the span in ticks (picoseconds).
    pub const fn ticks(self) -> Tick {
        self.0
    }
}

impl FromStr for TimeSpan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (number, unit) = split_quantity(s);
        let multiplier = match unit.to_ascii_lowercase().as_str() {
            "" | "ps" => 1,
            "ns" => 1_000,
            "us" => 1_000_000,
            "ms" => 1_000_000_000,
            "s" => PS_PER_SECOND,
            other => return Err(format!("unknown time unit {other:?} in {s:?}")),
        };
        scale(number, multiplier).map(Self)
    }
}

impl TryFrom<RawQuantity> for TimeSpan {
    type Error = String;

    fn try_from(raw: RawQuantity) -> Result<Self, Self::Error> {
        match raw {
            RawQuantity::Int(ps) => Ok(Self(ps)),
            RawQuantity::Float(ps) => format!("{ps}ps").parse(),
            RawQuantity::Text(text) => text.parse(),
        }
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 != 0 && self.0 % 1_000_000 == 0 {
            write!(f, "{}us", self.0 / 1_000_000)
        } else if self.0 != 0 && self.0 % 1_000 == 0 {
            write!(f, "{}ns", self.0 / 1_000)
        } else {
            write!(f, "{}ps", self.0)
        }
    }
}

impl From<TimeSpan> for String {
    fn from(value: TimeSpan) -> Self {
        value.to_string()
    }
}

/// A size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawQuantity", into = "String")]
pub struct ByteSize(u64);

impl ByteSize {
    /// Creates a size from a byte count.
    pub const fn bytes(n: u64) -> Self {
        Self(n)
    }

    /// Creates a size from kibibytes.
    pub const fn kib(n: u64) -> Self {
        Self(n * 1024)
    }

    /// Creates a size from mebibytes.
    pub const fn mib(n: u64) -> Self {
        Self(n * 1024 * 1024)
    }

    /// Returns the size in bytes.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (number, unit) = split_quantity(s);
        let multiplier: u64 = match unit.to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "kb" => 1_000,
            "kib" => 1 << 10,
            "mb" => 1_000_000,
            "mib" => 1 << 20,
            "gb" => 1_000_000_000,
            "gib" => 1 << 30,
            "tb" => 1_000_000_000_000,
            "tib" => 1 << 40,
            other => return Err(format!("unknown size unit {other:?} in {s:?}")),
        };
        scale(number, multiplier).map(Self)
    }
}

impl TryFrom<RawQuantity> for ByteSize {
    type Error = String;

    fn try_from(raw: RawQuantity) -> Result<Self, Self::Error> {
        match raw {
            RawQuantity::Int(n) => Ok(Self(n)),
            RawQuantity::Float(n) => format!("{n}B").parse(),
            RawQuantity::Text(text) => text.parse(),
        }
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 != 0 && self.0 % (1 << 30) == 0 {
            write!(f, "{} GiB", self.0 >> 30)
        } else if self.0 != 0 && self.0 % (1 << 20) == 0 {
            write!(f, "{} MiB", self.0 >> 20)
        } else if self.0 != 0 && self.0 % (1 << 10) == 0 {
            write!(f, "{} KiB", self.0 >> 10)
        } else {
            write!(f, "{} B", self.0)
        }
    }
}

impl From<ByteSize> for String {
    fn from(value: ByteSize) -> Self {
        value.to_string()
    }
}

/// A physical address given either as a JSON number or a decimal/hex string.
///
/// Address ranges are often quoted in configuration files (`"10000000000"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawQuantity", into = "u64")]
pub struct AddrValue(pub u64);

impl TryFrom<RawQuantity> for AddrValue {
    type Error = String;

    fn try_from(raw: RawQuantity) -> Result<Self, Self::Error> {
        match raw {
            RawQuantity::Int(n) => Ok(Self(n)),
            RawQuantity::Float(n) => Err(format!("address {n} is not an integer")),
            RawQuantity::Text(text) => parse_addr(&text).map(Self),
        }
    }
}

impl From<AddrValue> for u64 {
    fn from(value: AddrValue) -> Self {
        value.0
    }
}

/// Parses hex (`"0x1f00"`), binary (`"0b1010"`) or decimal (`"7936"`) address literals.
pub fn parse_addr(text: &str) -> Result<u64, String> {
    let text = text.trim().replace('_', "");
    let parsed = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else {
        text.parse::<u64>()
    };
    parsed.map_err(|e| format!("invalid address {text:?}: {e}"))
}

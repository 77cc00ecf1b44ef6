//! Text notation for hand written SysEx messages.
//!
//! `F0 41 10 42 11 400000 00007F CK6 F7`: hex chunks of any even length, `CKn` inserts
//! a Roland checksum of the previous `n` bytes and `'text'` stands for its ASCII bytes.
//! One `[from-to]` decimal range of data byte values (0 to 127) expands the template into
//! one message per value.

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::{SysExBuilder, SysExError, SysExEvent};

lazy_static! {
    static ref ASCII: Regex = Regex::new("'[^']+'").expect("valid regex");
    static ref RANGE: Regex =
        Regex::new(r"\[(?P<from>[0-9]+)-(?P<to>[0-9]+)\]").expect("valid regex");
    static ref CHECKSUM: Regex = Regex::new(r"^CK(?P<size>[0-9]+)$").expect("valid regex");
}

const DATA_MAX: u8 = 0x7F;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Range {
    text: String,
    from: u8,
    to: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysExTemplate {
    text: String,
    range: Option<Range>,
}

impl SysExTemplate {
    pub fn parse(definition: &str) -> Result<Self, SysExError> {
        let invalid = |reason: &str| SysExError::InvalidTemplate {
            template: definition.to_owned(),
            reason: reason.to_owned(),
        };

        let text = ASCII
            .replace_all(definition, |caps: &Captures<'_>| {
                let quoted = &caps[0];
                quoted[1..quoted.len() - 1]
                    .bytes()
                    .map(|byte| format!("{byte:02X}"))
                    .collect::<String>()
            })
            .into_owned();

        let mut ranges = RANGE.captures_iter(&text);
        let range = match ranges.next() {
            Some(caps) => {
                let bound = |name: &str| {
                    caps[name]
                        .parse::<u8>()
                        .ok()
                        .filter(|value| *value <= DATA_MAX)
                        .ok_or_else(|| invalid("range bound is not a data byte"))
                };
                let range = Range {
                    text: caps[0].to_owned(),
                    from: bound("from")?,
                    to: bound("to")?,
                };
                if range.from > range.to {
                    return Err(invalid("range is reversed"));
                }
                Some(range)
            }
            None => None,
        };
        if ranges.next().is_some() {
            return Err(invalid("only one range is supported"));
        }

        // Syntax errors surface here rather than on expansion.
        let sample = match &range {
            Some(range) => text.replacen(&range.text, "00", 1),
            None => text.clone(),
        };
        let template = Self { text, range };
        Self::forge(&sample)?;
        Ok(template)
    }

    /// Number of messages the template expands to.
    pub fn message_count(&self) -> usize {
        self.range
            .as_ref()
            .map_or(1, |range| usize::from(range.to - range.from) + 1)
    }

    pub fn events(&self) -> Result<Vec<SysExEvent>, SysExError> {
        match &self.range {
            Some(range) => (range.from..=range.to)
                .map(|value| Self::forge(&self.text.replace(&range.text, &format!("{value:02X}"))))
                .collect(),
            None => Ok(vec![Self::forge(&self.text)?]),
        }
    }

    fn forge(text: &str) -> Result<SysExEvent, SysExError> {
        let invalid = |reason: String| SysExError::InvalidTemplate {
            template: text.to_owned(),
            reason,
        };

        let mut data = Vec::new();
        let mut checksum = None;
        for chunk in text.split_whitespace() {
            if chunk.starts_with("CK") {
                let caps = CHECKSUM
                    .captures(chunk)
                    .ok_or_else(|| invalid(format!("bad checksum definition {chunk:?}")))?;
                let size: usize = caps["size"]
                    .parse()
                    .map_err(|_| invalid(format!("bad checksum size {chunk:?}")))?;
                if size > data.len() || checksum.is_some() {
                    return Err(invalid(format!("checksum {chunk:?} does not fit")));
                }
                checksum = Some((data.len(), size));
                continue;
            }

            if chunk.len() % 2 != 0 {
                return Err(invalid(format!("{chunk:?} is not a list of hex bytes")));
            }
            for idx in (0..chunk.len()).step_by(2) {
                let byte = chunk
                    .get(idx..idx + 2)
                    .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                    .ok_or_else(|| invalid(format!("{chunk:?} is not a list of hex bytes")))?;
                data.push(byte);
            }
        }

        let mut builder = SysExBuilder::new();
        match checksum {
            Some((position, size)) => {
                builder
                    .write(&data[..position - size])
                    .begin_checksum()
                    .write(&data[position - size..position])
                    .write_checksum()
                    .write(&data[position..]);
            }
            None => {
                builder.write(&data);
            }
        }
        builder.build_event()
    }
}

impl FromStr for SysExTemplate {
    type Err = SysExError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//! JSON encoding and decoding of invoke payloads.

use crate::error::{InvocationError, ValidationError, INPUT_ERROR};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;

/// Encoder/decoder settings shared by every adapted handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonCodec {
    /// Escape `<`, `>` and `&` inside strings as unicode escapes.
    pub escape_html: bool,
    /// Written at the start of every line after the first.
    pub prefix: String,
    /// Written once per nesting level after the prefix.
    pub indent: String,
    /// Reject payloads with fields the input type does not declare.
    pub disallow_unknown_fields: bool,
    /// Keep the exact text of numbers in untyped values such as
    /// `serde_json::Value`. Needs the `use-number` feature.
    pub use_number: bool,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self {
            escape_html: true,
            prefix: String::new(),
            indent: String::new(),
            disallow_unknown_fields: false,
            use_number: false,
        }
    }
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_pretty(&self) -> bool {
        !self.prefix.is_empty() || !self.indent.is_empty()
    }

    /// Prefix and indent must keep the output valid JSON, and `use_number`
    /// needs arbitrary-precision numbers compiled in.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.use_number && !cfg!(feature = "use-number") {
            return Err(ValidationError::UseNumberUnavailable);
        }
        let whitespace = |s: &str| s.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'));
        if !whitespace(&self.prefix) {
            return Err(ValidationError::IndentPrefix(self.prefix.clone()));
        }
        if !whitespace(&self.indent) {
            return Err(ValidationError::Indent(self.indent.clone()));
        }
        Ok(())
    }

    /// Decode an invoke payload into a fresh `T`.
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, InvocationError> {
        let input_error = |e: serde_json::Error| InvocationError::new(INPUT_ERROR, e.to_string());
        if !self.disallow_unknown_fields {
            return serde_json::from_slice(payload).map_err(input_error);
        }

        let mut unknown = Vec::new();
        let mut de = serde_json::Deserializer::from_slice(payload);
        let value: T = serde_ignored::deserialize(&mut de, |path| unknown.push(path.to_string()))
            .map_err(input_error)?;
        de.end().map_err(input_error)?;
        match unknown.first() {
            Some(field) => Err(InvocationError::new(
                INPUT_ERROR,
                format!("unknown field {field:?}"),
            )),
            None => Ok(value),
        }
    }

    /// Encode a handler result. Pretty output ends with a newline; compact
    /// output does not, so `()` encodes as exactly `null`.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, serde_json::Error> {
        let mut out = Vec::with_capacity(128);
        let formatter = HostFormatter {
            escape_html: self.escape_html,
            pretty: self.is_pretty(),
            prefix: self.prefix.as_bytes(),
            indent: self.indent.as_bytes(),
            depth: 0,
            has_value: false,
        };
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        value.serialize(&mut serializer)?;
        if self.is_pretty() {
            out.push(b'\n');
        }
        Ok(Bytes::from(out))
    }
}

struct HostFormatter<'a> {
    escape_html: bool,
    pretty: bool,
    prefix: &'a [u8],
    indent: &'a [u8],
    depth: usize,
    has_value: bool,
}

impl HostFormatter<'_> {
    fn newline<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b"\n")?;
        writer.write_all(self.prefix)?;
        for _ in 0..self.depth {
            writer.write_all(self.indent)?;
        }
        Ok(())
    }

    fn begin_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            writer.write_all(b",")?;
        }
        if self.pretty {
            self.newline(writer)?;
        }
        Ok(())
    }

    fn close<W: ?Sized + io::Write>(&mut self, writer: &mut W, token: &[u8]) -> io::Result<()> {
        self.depth -= 1;
        if self.pretty && self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(token)
    }
}

impl Formatter for HostFormatter<'_> {
    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            let escaped: &[u8] = match ch {
                '<' if self.escape_html => b"\\u003c",
                '>' if self.escape_html => b"\\u003e",
                '&' if self.escape_html => b"\\u0026",
                // Valid JSON, but line terminators in JavaScript.
                '\u{2028}' => b"\\u2028",
                '\u{2029}' => b"\\u2029",
                _ => continue,
            };
            writer.write_all(&bytes[start..i])?;
            writer.write_all(escaped)?;
            start = i + ch.len_utf8();
        }
        writer.write_all(&bytes[start..])
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.depth += 1;
        self.has_value = false;
        writer.write_all(b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.close(writer, b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.begin_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.depth += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.close(writer, b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.begin_value(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(if self.pretty { b": " } else { b":" })
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }
}

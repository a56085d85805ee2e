//! Traits for text (human readable) and byte encodings for crypto primitives.
use anyhow::Context as _;

/// Utility for parsing human-readable text representations via TextFmt::decode.
/// It keeps a reference to the initial text and a reference to the remaining unparsed text.
/// This allows to provide more context when a parsing error is encountered.
pub struct Text<'a> {
    /// Initial text.
    context: &'a str,
    /// Remaining unparsed text.
    inner: &'a str,
}

impl<'a> Text<'a> {
    /// Constructs a new unparsed text. Use other methods of Text
    /// to parse it afterwards. Text is an argument to TextFmt::decode
    /// trait method.
    pub fn new(s: &'a str) -> Self {
        Self {
            context: s,
            inner: s,
        }
    }

    /// Prefix of this text, which has been already parsed.
    fn prefix(&self) -> &'a str {
        &self.context[..self.context.len() - self.inner.len()]
    }

    /// Strips a fixed prefix from the remaining text.
    pub fn strip(mut self, prefix: &str) -> anyhow::Result<Self> {
        let Some(inner) = self.inner.strip_prefix(prefix) else {
            anyhow::bail!("{}: expected {} got {}", self.prefix(), prefix, self.inner);
        };
        self.inner = inner;
        Ok(self)
    }

    /// Strips a fixed prefix from the remaining text,
    /// matching it without case sensitivity.
    pub fn strip_nocase(mut self, prefix: &str) -> anyhow::Result<Self> {
        if self.inner.len() < prefix.len() || !self.inner[..prefix.len()].eq_ignore_ascii_case(prefix) {
            anyhow::bail!("{}: expected {} got {}", self.prefix(), prefix, self.inner);
        }
        self.inner = &self.inner[prefix.len()..];
        Ok(self)
    }

    /// Parses the remaining text, assuming that it is in hex format.
    /// The parsed bytes are then converted to T, using ByteFmt trait.
    pub fn decode_hex<T: ByteFmt>(self) -> anyhow::Result<T> {
        let raw = hex::decode(self.inner).context(self.prefix().to_owned())?;
        ByteFmt::decode(&raw).context(self.prefix().to_owned())
    }

    /// Syntax sugar for `TextFmt::decode`:
    /// instead of `<T as TextFmt>::decode(t)`, you can write
    /// `t.decode::<T>()`.
    pub fn decode<T: TextFmt>(self) -> anyhow::Result<T> {
        TextFmt::decode(self)
    }
}

/// Trait converting a type from/to a human-readable text format.
/// It is roughly equivalent to str::FromStr + std::fmt::Display,
/// but has additional requirements:
/// - `x == decode(x.encode())` has to hold.
/// - decoding has to accept all spellings that denote the same value
///   (for signer addresses: hex of any capitalization).
pub trait TextFmt: Sized {
    /// Decodes the object from a text representation.
    fn decode(text: Text) -> anyhow::Result<Self>;
    /// Encodes the object to a text representation.
    fn encode(&self) -> String;
}

/// Trait converting a type from/to a sparse byte format.
/// It is roughly equivalent to serde::Serialize + serde::Deserialize,
/// but the binary encoding is well defined, rather than relying on the
/// internals of a serde::Serializer implementation. The encodings are
/// used for wire-level signature bytes, which must survive reencoding.
pub trait ByteFmt: Sized {
    /// Decodes the object from the byte representation.
    fn decode(bytes: &[u8]) -> anyhow::Result<Self>;
    /// Encodes the object to the byte representation.
    fn encode(&self) -> Vec<u8>;
}

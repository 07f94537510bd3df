use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;

use core::fmt::Write;

/// A control channel reply.
///
/// A reply has a three-digit code and one or more text lines. A single line
/// is sent as `<code> <text>\r\n`. With more lines, every line but the last
/// is sent as `<code>-<text>\r\n` and the last one as `<code> <text>\r\n`.
/// Intermediate lines starting with a space are sent verbatim, which is how
/// feature lists are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<Cow<'static, str>>,
}

impl Reply {
    /// Creates a single-line [`Reply`].
    pub fn new(code: u16, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            lines: alloc::vec![text.into()],
        }
    }

    /// Creates a multi-line [`Reply`].
    ///
    /// An empty `lines` iterator produces a reply with an empty text.
    pub fn multiline<I, T>(code: u16, lines: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Cow<'static, str>>,
    {
        let mut lines: Vec<Cow<'static, str>> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            lines.push(Cow::Borrowed(""));
        }
        Self { code, lines }
    }

    /// Appends a line to the [`Reply`].
    #[must_use]
    pub fn line(mut self, text: impl Into<Cow<'static, str>>) -> Self {
        self.lines.push(text.into());
        self
    }

    /// Returns the reply code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.code
    }

    /// Returns the text lines.
    #[must_use]
    pub fn lines(&self) -> &[Cow<'static, str>] {
        &self.lines
    }

    /// Encodes the reply as it is sent on the control channel.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut wire = String::new();
        let last = self.lines.len() - 1;
        for (index, line) in self.lines.iter().enumerate() {
            // Writing into a `String` cannot fail.
            let _ = if index == last {
                write!(wire, "{} {line}\r\n", self.code)
            } else if index > 0 && line.starts_with(' ') {
                write!(wire, "{line}\r\n")
            } else {
                write!(wire, "{}-{line}\r\n", self.code)
            };
        }
        wire
    }
}

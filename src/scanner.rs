//! Low-level line scanning.
//!
//! [`LineScanner`] walks a single line with an explicit cursor. It pulls
//! integers out of arbitrary separator noise and cuts substrings at
//! delimiters; nothing else in the crate touches raw character positions.

/// Cursor over one line of text
#[derive(Debug, Clone)]
pub struct LineScanner<'a> {
    line: &'a str,
    pos: usize,
    skip: &'a [char],
}

impl<'a> LineScanner<'a> {
    /// Scanner with an empty skip set
    pub fn new(line: &'a str) -> Self {
        Self::with_skip(line, &[])
    }

    /// Scanner that ignores the given characters while scanning integers.
    ///
    /// A skip character is never read as a sign, so `-` in the skip set turns
    /// `1958-1960` into two positive years.
    pub fn with_skip(line: &'a str, skip: &'a [char]) -> Self {
        Self { line, pos: 0, skip }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remainder(&self) -> &'a str {
        &self.line[self.pos..]
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.line.len()
    }

    /// Lazy sequence of the integers from the cursor to the end of the line.
    ///
    /// The returned iterator does not move this scanner. Clone it to keep a
    /// restart point.
    pub fn integers(&self) -> Integers<'a> {
        Integers {
            rest: self.remainder(),
            skip: self.skip,
        }
    }

    /// Return the text before the next `delimiter` and stop on it.
    ///
    /// Returns `None` and leaves the cursor where it was if the delimiter
    /// does not occur in the rest of the line.
    pub fn scan_up_to(&mut self, delimiter: char) -> Option<&'a str> {
        let rest = self.remainder();
        let index = rest.find(delimiter)?;
        self.pos += index;
        Some(&rest[..index])
    }

    /// Move past the next `delimiter`. Returns `false` without moving if absent.
    pub fn skip_past(&mut self, delimiter: char) -> bool {
        match self.remainder().find(delimiter) {
            Some(index) => {
                self.pos += index + delimiter.len_utf8();
                true
            }
            None => false,
        }
    }
}

/// Iterator over the integers of a line remainder
#[derive(Debug, Clone)]
pub struct Integers<'a> {
    rest: &'a str,
    skip: &'a [char],
}

impl Integers<'_> {
    fn advance(&mut self, bytes: usize) {
        self.rest = &self.rest[bytes..];
    }
}

impl Iterator for Integers<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        loop {
            let c = self.rest.chars().next()?;

            if self.skip.contains(&c) {
                self.advance(c.len_utf8());
                continue;
            }

            let signed = matches!(c, '-' | '+')
                && self.rest[1..].starts_with(|d: char| d.is_ascii_digit());

            if !signed && !c.is_ascii_digit() {
                self.advance(c.len_utf8());
                continue;
            }

            let digits_start = usize::from(signed);
            let end = self.rest[digits_start..]
                .find(|d: char| !d.is_ascii_digit())
                .map_or(self.rest.len(), |i| i + digits_start);
            let token = &self.rest[..end];
            self.advance(end);

            // Digit runs too long for i64 are noise like any other separator
            if let Ok(value) = token.parse::<i64>() {
                return Some(value);
            }
        }
    }
}

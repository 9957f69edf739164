use std::str::FromStr;

use crate::core::error::Error;

/// First mismatch recorded while walking the argument vector.
#[derive(Debug, Clone)]
pub struct ArgError {
    pub message: String,
    pub index: usize,
}

/// Positional tokenizer over a command's flat argument vector.
///
/// Mismatches are recorded, not thrown: every accessor keeps returning usable
/// defaults so grammar code can stay linear, and the caller surfaces the
/// first recorded error at the end (or recovers and ignores it).
/// Keyword comparisons are ASCII case-insensitive.
pub struct ArgParser<'a> {
    args: &'a [String],
    pos: usize,
    error: Option<ArgError>,
}

impl<'a> ArgParser<'a> {
    pub fn new(args: &'a [String]) -> Self {
        ArgParser { args, pos: 0, error: None }
    }

    pub fn has_next(&self) -> bool {
        self.pos < self.args.len()
    }

    /// Next token without consuming it; empty when exhausted.
    pub fn peek(&self) -> &'a str {
        self.args.get(self.pos).map(String::as_str).unwrap_or("")
    }

    /// Consume the next token. Exhaustion records an error and yields "".
    pub fn next(&mut self) -> &'a str {
        match self.args.get(self.pos) {
            Some(tok) => {
                self.pos += 1;
                tok
            }
            None => {
                self.record("missing argument");
                ""
            }
        }
    }

    /// Consume the next token parsed as `T`; records an error and yields the
    /// default on failure.
    pub fn next_parsed<T>(&mut self) -> T
    where
        T: FromStr + Default,
    {
        let tok = self.next();
        match tok.parse() {
            Ok(value) => value,
            Err(_) => {
                self.record("value is not an integer or out of range");
                T::default()
            }
        }
    }

    /// Consume `tag` if it is the next token.
    pub fn check(&mut self, tag: &str) -> bool {
        if self.has_next() && self.peek().eq_ignore_ascii_case(tag) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the next token if it matches one of the keys.
    pub fn try_map_next<T: Copy>(&mut self, pairs: &[(&str, T)]) -> Option<T> {
        if !self.has_next() {
            return None;
        }
        let tok = self.peek();
        for (key, value) in pairs {
            if tok.eq_ignore_ascii_case(key) {
                self.pos += 1;
                return Some(*value);
            }
        }
        None
    }

    /// Like [`try_map_next`](Self::try_map_next) but a miss is an error.
    pub fn map_next<T: Copy>(&mut self, pairs: &[(&str, T)]) -> Option<T> {
        match self.try_map_next(pairs) {
            Some(value) => Some(value),
            None => {
                let tok = self.next().to_string();
                self.record(format!("unexpected token: `{}`", tok));
                None
            }
        }
    }

    pub fn expect_tag(&mut self, tag: &str) {
        if !self.check(tag) {
            self.record(format!("{} expected", tag));
        }
    }

    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.args.len());
    }

    pub fn error(&self) -> Option<&ArgError> {
        self.error.as_ref()
    }

    /// True when the whole vector was consumed cleanly. Leftover tokens are
    /// recorded as an error.
    pub fn finalize(&mut self) -> bool {
        if self.has_next() {
            let tok = self.peek().to_string();
            self.record(format!("unexpected token: `{}`", tok));
        }
        self.error.is_none()
    }

    /// The recorded error as a surfaceable syntax error, if any.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take().map(|e| Error::syntax(e.message))
    }

    fn record(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(ArgError { message: message.into(), index: self.pos });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn check_is_case_insensitive_and_consumes() {
        let argv = args(&["limit", "0", "10"]);
        let mut parser = ArgParser::new(&argv);
        assert!(parser.check("LIMIT"));
        assert_eq!(parser.next_parsed::<usize>(), 0);
        assert_eq!(parser.next_parsed::<usize>(), 10);
        assert!(!parser.has_next());
        assert!(parser.error().is_none());
    }

    #[test]
    fn exhaustion_records_an_error_once() {
        let argv = args(&[]);
        let mut parser = ArgParser::new(&argv);
        assert_eq!(parser.next(), "");
        assert_eq!(parser.next(), "");
        let err = parser.error().unwrap();
        assert_eq!(err.message, "missing argument");
        assert_eq!(err.index, 0);
    }

    #[test]
    fn bad_integer_yields_default_and_error() {
        let argv = args(&["abc"]);
        let mut parser = ArgParser::new(&argv);
        assert_eq!(parser.next_parsed::<usize>(), 0);
        assert!(parser.error().is_some());
    }

    #[test]
    fn map_next_records_miss() {
        let argv = args(&["NEITHER"]);
        let mut parser = ArgParser::new(&argv);
        assert_eq!(parser.map_next(&[("HASH", 1), ("JSON", 2)]), None);
        assert!(parser.error().is_some());
    }

    #[test]
    fn finalize_rejects_leftovers() {
        let argv = args(&["a", "b"]);
        let mut parser = ArgParser::new(&argv);
        parser.next();
        assert!(!parser.finalize());
    }
}

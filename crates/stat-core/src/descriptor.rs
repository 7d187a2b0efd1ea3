//! Engine configuration descriptors
//!
//! A descriptor is the text form `algorithm(param1=value1,param2=value2,...)`
//! used to rebuild an engine with its configuration. Values are integers,
//! reals, quoted strings (either quote style), bare words, or parenthesized
//! tuples of values, which may nest. Inside a quoted string a backslash takes
//! the next character literally.
//!
//! ```
//! use stat_core::descriptor::{Descriptor, ParamValue};
//!
//! let d: Descriptor = "order(intervals=4,definition='InverseCDF',columns=(x,(a,\"b c\")))"
//!     .parse()
//!     .unwrap();
//! assert_eq!(d.algorithm, "order");
//! assert_eq!(d.get("intervals"), Some(&ParamValue::Integer(4)));
//! assert_eq!(d.to_string().parse::<Descriptor>().unwrap(), d);
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Tuple(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Integer(v) => Some(*v as f64),
            ParamValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Booleans are written as 0/1 or as `true`/`false`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Integer(0) => Some(false),
            ParamValue::Integer(1) => Some(true),
            ParamValue::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            ParamValue::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Text items of a tuple; a lone text value counts as a one-item list
    pub fn as_text_list(&self) -> Option<Vec<String>> {
        match self {
            ParamValue::Text(s) => Some(vec![s.clone()]),
            ParamValue::Tuple(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// Numeric items of a tuple; a lone number counts as a one-item list
    pub fn as_real_list(&self) -> Option<Vec<f64>> {
        match self {
            ParamValue::Tuple(items) => items.iter().map(ParamValue::as_f64).collect(),
            other => other.as_f64().map(|v| vec![v]),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        ParamValue::Text(value.into())
    }

    pub fn text_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParamValue::Tuple(items.into_iter().map(|s| ParamValue::Text(s.into())).collect())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{v}"),
            // Debug keeps a decimal point so the value parses back as a real
            ParamValue::Real(v) => write!(f, "{v:?}"),
            ParamValue::Text(s) => {
                let quote = if s.contains('"') && !s.contains('\'') { '\'' } else { '"' };
                write!(f, "{quote}")?;
                for c in s.chars() {
                    if c == quote || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "{quote}")
            }
            ParamValue::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Parsed `algorithm(name=value,...)` text
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub algorithm: String,
    pub parameters: Vec<(String, ParamValue)>,
}

impl Descriptor {
    pub fn new(algorithm: impl Into<String>, parameters: Vec<(String, ParamValue)>) -> Self {
        Self {
            algorithm: algorithm.into(),
            parameters,
        }
    }

    /// Value of the last occurrence of `name`
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.parameters
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.algorithm)?;
        for (i, (name, value)) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}

impl FromStr for Descriptor {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut parser = Parser::new(text);
        let descriptor = parser.descriptor()?;
        parser.skip_whitespace();
        if let Some((position, c)) = parser.peek() {
            return Err(parser.error_at(position, format!("unexpected trailing '{c}'")));
        }
        Ok(descriptor)
    }
}

struct Parser<'a> {
    text: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        self.chars.peek().copied()
    }

    fn position(&mut self) -> usize {
        self.peek().map_or(self.text.len(), |(p, _)| p)
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            position,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expect(&mut self, wanted: char) -> Result<()> {
        self.skip_whitespace();
        match self.chars.next() {
            Some((_, c)) if c == wanted => Ok(()),
            Some((p, c)) => Err(self.error_at(p, format!("expected '{wanted}', found '{c}'"))),
            None => Err(self.error_at(self.text.len(), format!("expected '{wanted}'"))),
        }
    }

    fn identifier(&mut self) -> Result<String> {
        self.skip_whitespace();
        let start = self.position();
        let mut name = String::new();
        while let Some((_, c)) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error_at(start, "expected an identifier"));
        }
        Ok(name)
    }

    fn descriptor(&mut self) -> Result<Descriptor> {
        let algorithm = self.identifier()?;
        self.expect('(')?;
        let mut parameters = Vec::new();
        self.skip_whitespace();
        if matches!(self.peek(), Some((_, ')'))) {
            self.chars.next();
            return Ok(Descriptor::new(algorithm, parameters));
        }
        loop {
            let name = self.identifier()?;
            self.expect('=')?;
            let value = self.value()?;
            parameters.push((name, value));
            self.skip_whitespace();
            match self.chars.next() {
                Some((_, ',')) => continue,
                Some((_, ')')) => break,
                Some((p, c)) => {
                    return Err(self.error_at(p, format!("expected ',' or ')', found '{c}'")))
                }
                None => return Err(self.error_at(self.text.len(), "unterminated parameter list")),
            }
        }
        Ok(Descriptor::new(algorithm, parameters))
    }

    fn value(&mut self) -> Result<ParamValue> {
        self.skip_whitespace();
        match self.peek() {
            Some((_, '(')) => self.tuple(),
            Some((_, quote @ ('"' | '\''))) => {
                self.chars.next();
                self.quoted(quote)
            }
            Some(_) => self.bare(),
            None => Err(self.error_at(self.text.len(), "expected a value")),
        }
    }

    fn tuple(&mut self) -> Result<ParamValue> {
        self.expect('(')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if matches!(self.peek(), Some((_, ')'))) {
            self.chars.next();
            return Ok(ParamValue::Tuple(items));
        }
        loop {
            items.push(self.value()?);
            self.skip_whitespace();
            match self.chars.next() {
                Some((_, ',')) => continue,
                Some((_, ')')) => break,
                Some((p, c)) => {
                    return Err(self.error_at(p, format!("expected ',' or ')', found '{c}'")))
                }
                None => return Err(self.error_at(self.text.len(), "unterminated tuple")),
            }
        }
        Ok(ParamValue::Tuple(items))
    }

    fn quoted(&mut self, quote: char) -> Result<ParamValue> {
        let start = self.position();
        let mut text = String::new();
        while let Some((_, c)) = self.chars.next() {
            if c == quote {
                return Ok(ParamValue::Text(text));
            }
            if c == '\\' {
                match self.chars.next() {
                    Some((_, escaped)) => text.push(escaped),
                    None => break,
                }
            } else {
                text.push(c);
            }
        }
        Err(self.error_at(start, "unterminated string"))
    }

    fn bare(&mut self) -> Result<ParamValue> {
        let start = self.position();
        let mut word = String::new();
        while let Some((_, c)) = self.peek() {
            if c == ',' || c == ')' || c == '(' {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        let word = word.trim();
        if word.is_empty() {
            return Err(self.error_at(start, "expected a value"));
        }
        if let Ok(v) = word.parse::<i64>() {
            return Ok(ParamValue::Integer(v));
        }
        if let Ok(v) = word.parse::<f64>() {
            if word.chars().any(|c| c.is_ascii_digit()) {
                return Ok(ParamValue::Real(v));
            }
        }
        Ok(ParamValue::Text(word.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        let d: Descriptor = "descriptive( sample = 1, skip_mask=255, scale=2.5 )".parse().unwrap();
        assert_eq!(d.algorithm, "descriptive");
        assert_eq!(d.get("sample"), Some(&ParamValue::Integer(1)));
        assert_eq!(d.get("scale"), Some(&ParamValue::Real(2.5)));
        assert_eq!(d.parameters.len(), 3);
    }

    #[test]
    fn test_parse_quotes_and_nesting() {
        let d: Descriptor =
            r#"order(definition='InverseCDFAveragedSteps',names=("a,b",'c"d',(1,2.0)),mode=nan)"#
                .parse()
                .unwrap();
        assert_eq!(
            d.get("definition").and_then(ParamValue::as_str),
            Some("InverseCDFAveragedSteps")
        );
        let names = d.get("names").and_then(ParamValue::as_tuple).unwrap();
        assert_eq!(names[0], ParamValue::text("a,b"));
        assert_eq!(names[1], ParamValue::text("c\"d"));
        assert_eq!(
            names[2],
            ParamValue::Tuple(vec![ParamValue::Integer(1), ParamValue::Real(2.0)])
        );
        // Bare words without digits stay text
        assert_eq!(d.get("mode"), Some(&ParamValue::text("nan")));
    }

    #[test]
    fn test_display_round_trip() {
        let d = Descriptor::new(
            "kmeans",
            vec![
                ("k".to_string(), ParamValue::Integer(3)),
                ("tolerance".to_string(), ParamValue::Real(1.0)),
                ("columns".to_string(), ParamValue::text_list(["x", "y z"])),
                ("empty".to_string(), ParamValue::Tuple(vec![])),
            ],
        );
        let text = d.to_string();
        assert_eq!(text, r#"kmeans(k=3,tolerance=1.0,columns=("x","y z"),empty=())"#);
        assert_eq!(text.parse::<Descriptor>().unwrap(), d);
    }

    #[test]
    fn test_text_with_both_quotes_round_trips() {
        for raw in [r#"it's "x""#, r"back\slash", "'", "\"", "\\"] {
            let d = Descriptor::new("order", vec![("label".to_string(), ParamValue::text(raw))]);
            let back: Descriptor = d.to_string().parse().unwrap();
            assert_eq!(back, d, "{raw}");
        }
        let d: Descriptor = r#"order(a="say \"hi\"",b='\'')"#.parse().unwrap();
        assert_eq!(d.get("a"), Some(&ParamValue::text(r#"say "hi""#)));
        assert_eq!(d.get("b"), Some(&ParamValue::text("'")));
        assert!(r#"order(a="x\")"#.parse::<Descriptor>().is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "order".parse::<Descriptor>(),
            Err(Error::Parse { .. })
        ));
        assert!("order(a=)".parse::<Descriptor>().is_err());
        assert!("order(a='x)".parse::<Descriptor>().is_err());
        assert!("order(a=(1,2)".parse::<Descriptor>().is_err());
        assert!("order(a=1) extra".parse::<Descriptor>().is_err());
        assert_eq!(
            "order()".parse::<Descriptor>().unwrap(),
            Descriptor::new("order", vec![])
        );
    }

    #[test]
    fn test_bool_and_lists() {
        assert_eq!(ParamValue::Integer(1).as_bool(), Some(true));
        assert_eq!(ParamValue::text("False").as_bool(), Some(false));
        assert_eq!(
            ParamValue::text("x").as_text_list(),
            Some(vec!["x".to_string()])
        );
        assert_eq!(
            ParamValue::Tuple(vec![ParamValue::Integer(1), ParamValue::Real(0.5)]).as_real_list(),
            Some(vec![1.0, 0.5])
        );
    }
}

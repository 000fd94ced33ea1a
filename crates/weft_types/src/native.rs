//! Native type descriptions.
//!
//! The authoring layer describes every declared input and output type with a
//! [`NativeType`]: an origin (what kind of type it is) plus its type
//! arguments. The mapping engine reads only this description; it never
//! inspects the authoring language's own type objects.
//!
//! Descriptions also have a textual form used by manifests and tests:
//!
//! ```text
//! int | float | bool | str | datetime | timedelta | dict | none
//! TextIO | BinaryIO | file | csv_file
//! list[T] | dict[K, V] | tuple[T, ...] | record[name: T, ...] | <ident>[T, ...]
//! ```

use crate::error::TypeError;
use std::fmt;
use std::str::FromStr;

/// What kind of type a [`NativeType`] is
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Integer
    Int,
    /// Float
    Float,
    /// Boolean
    Bool,
    /// Text
    Str,
    /// Instant in time
    Datetime,
    /// Span of time
    Timedelta,
    /// Map; bare when it has no arguments
    Dict,
    /// List; bare when it has no arguments
    List,
    /// Fixed or variadic tuple
    Tuple,
    /// Named fields stored positionally; names match the arguments one to one
    Record(Vec<String>),
    /// No value
    None,
    /// Text stream handle
    TextIo,
    /// Byte stream handle
    BinaryIo,
    /// File of unspecified format
    File,
    /// CSV file
    CsvFile,
    /// Any other named type
    Custom(String),
}

impl Origin {
    fn keyword(&self) -> &str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "str",
            Self::Datetime => "datetime",
            Self::Timedelta => "timedelta",
            Self::Dict => "dict",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Record(_) => "record",
            Self::None => "none",
            Self::TextIo => "TextIO",
            Self::BinaryIo => "BinaryIO",
            Self::File => "file",
            Self::CsvFile => "csv_file",
            Self::Custom(name) => name.as_str(),
        }
    }

    fn from_keyword(word: &str) -> Self {
        match word {
            "int" => Self::Int,
            "float" => Self::Float,
            "bool" => Self::Bool,
            "str" => Self::Str,
            "datetime" => Self::Datetime,
            "timedelta" => Self::Timedelta,
            "dict" => Self::Dict,
            "list" => Self::List,
            "tuple" => Self::Tuple,
            "none" | "None" => Self::None,
            "TextIO" => Self::TextIo,
            "BinaryIO" => Self::BinaryIo,
            "file" => Self::File,
            "csv_file" => Self::CsvFile,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Structural view of a [`NativeType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescription<'a> {
    /// Origin
    pub origin: &'a Origin,
    /// Type arguments, empty for bare types
    pub args: &'a [NativeType],
}

/// Description of a native value type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeType {
    origin: Origin,
    args: Vec<NativeType>,
}

impl NativeType {
    /// Type with no arguments
    #[must_use]
    pub const fn bare(origin: Origin) -> Self {
        Self {
            origin,
            args: Vec::new(),
        }
    }

    /// Generic type with arguments
    #[must_use]
    pub fn generic(origin: Origin, args: Vec<NativeType>) -> Self {
        Self { origin, args }
    }

    /// `int`
    #[must_use]
    pub const fn int() -> Self {
        Self::bare(Origin::Int)
    }

    /// `float`
    #[must_use]
    pub const fn float() -> Self {
        Self::bare(Origin::Float)
    }

    /// `bool`
    #[must_use]
    pub const fn bool() -> Self {
        Self::bare(Origin::Bool)
    }

    /// `str`
    #[must_use]
    pub const fn str() -> Self {
        Self::bare(Origin::Str)
    }

    /// `none`
    #[must_use]
    pub const fn none() -> Self {
        Self::bare(Origin::None)
    }

    /// `list[element]`
    #[must_use]
    pub fn list(element: NativeType) -> Self {
        Self::generic(Origin::List, vec![element])
    }

    /// `dict[key, value]`
    #[must_use]
    pub fn dict(key: NativeType, value: NativeType) -> Self {
        Self::generic(Origin::Dict, vec![key, value])
    }

    /// `tuple[items...]`
    #[must_use]
    pub fn tuple(items: Vec<NativeType>) -> Self {
        Self::generic(Origin::Tuple, items)
    }

    /// `record[name: type, ...]`
    #[must_use]
    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, NativeType)>,
        S: Into<String>,
    {
        let (names, types): (Vec<String>, Vec<NativeType>) =
            fields.into_iter().map(|(n, t)| (n.into(), t)).unzip();
        Self::generic(Origin::Record(names), types)
    }

    /// Structural view for the mapping engine
    #[must_use]
    pub fn describe(&self) -> TypeDescription<'_> {
        TypeDescription {
            origin: &self.origin,
            args: &self.args,
        }
    }

    /// Origin
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Type arguments
    #[must_use]
    pub fn args(&self) -> &[NativeType] {
        &self.args
    }

    /// Whether the type has no arguments
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.args.is_empty()
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.origin.keyword())?;
        if self.args.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if let Origin::Record(names) = &self.origin {
                if let Some(name) = names.get(i) {
                    write!(f, "{}: ", name)?;
                }
            }
            write!(f, "{}", arg)?;
        }
        f.write_str("]")
    }
}

impl FromStr for NativeType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser { input: s, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }
}

/// Recursive descent over the textual form
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> TypeError {
        TypeError::Parse {
            input: self.input.to_string(),
            position: self.pos,
            reason: reason.to_string(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, ch: char) -> bool {
        self.skip_ws();
        if self.rest().starts_with(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<&'a str, TypeError> {
        self.skip_ws();
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(self.rest().len());
        if len == 0 {
            return Err(self.error("expected a type name"));
        }
        self.pos += len;
        Ok(&self.input[start..self.pos])
    }

    fn parse_type(&mut self) -> Result<NativeType, TypeError> {
        let word = self.ident()?;
        if word == "record" {
            return self.parse_record();
        }
        let origin = Origin::from_keyword(word);
        let mut args = Vec::new();
        if self.eat('[') {
            loop {
                args.push(self.parse_type()?);
                if self.eat(',') {
                    continue;
                }
                if self.eat(']') {
                    break;
                }
                return Err(self.error("expected ',' or ']'"));
            }
        }
        Ok(NativeType { origin, args })
    }

    fn parse_record(&mut self) -> Result<NativeType, TypeError> {
        let mut fields: Vec<(String, NativeType)> = Vec::new();
        if self.eat('[') {
            loop {
                let name = self.ident()?.to_string();
                if !self.eat(':') {
                    return Err(self.error("expected ':' after record field name"));
                }
                fields.push((name, self.parse_type()?));
                if self.eat(',') {
                    continue;
                }
                if self.eat(']') {
                    break;
                }
                return Err(self.error("expected ',' or ']'"));
            }
        }
        Ok(NativeType::record(fields))
    }
}

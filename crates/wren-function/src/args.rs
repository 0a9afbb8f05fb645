use std::fmt;

use wren_core::{Error, Result};

// Type-erased construction arguments
//
// The registry creates functions from a name plus a list of `Arg` values. Each
// registered name declares its signature as a list of `ArgKind`s; `create`
// checks count and kinds before any factory runs, and factories read the
// values back through `ArgReader`, which reports mismatches with the function
// name and argument position.

/// The kind of one construction argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Int,
    Float,
    Bool,
    Ints,
    Floats,
    /// An integer that may be absent (e.g. an optional seed).
    OptionalInt,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgKind::Int => "int",
            ArgKind::Float => "float",
            ArgKind::Bool => "bool",
            ArgKind::Ints => "int list",
            ArgKind::Floats => "float list",
            ArgKind::OptionalInt => "optional int",
        };
        write!(f, "{}", s)
    }
}

/// One construction argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Bool(bool),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    OptionalInt(Option<i64>),
}

impl Arg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::Int(_) => ArgKind::Int,
            Arg::Float(_) => ArgKind::Float,
            Arg::Bool(_) => ArgKind::Bool,
            Arg::Ints(_) => ArgKind::Ints,
            Arg::Floats(_) => ArgKind::Floats,
            Arg::OptionalInt(_) => ArgKind::OptionalInt,
        }
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<Vec<i64>> for Arg {
    fn from(v: Vec<i64>) -> Self {
        Arg::Ints(v)
    }
}

impl From<Vec<f64>> for Arg {
    fn from(v: Vec<f64>) -> Self {
        Arg::Floats(v)
    }
}

impl From<Option<i64>> for Arg {
    fn from(v: Option<i64>) -> Self {
        Arg::OptionalInt(v)
    }
}

/// Check `args` against a declared signature.
pub fn check_signature(function: &str, signature: &[ArgKind], args: &[Arg]) -> Result<()> {
    if signature.len() != args.len() {
        return Err(Error::ArgumentCount {
            function: function.to_string(),
            expected: signature.len(),
            got: args.len(),
        });
    }
    for (index, (kind, arg)) in signature.iter().zip(args).enumerate() {
        if *kind != arg.kind() {
            return Err(Error::ArgumentKind {
                function: function.to_string(),
                index,
                expected: kind.to_string(),
                got: arg.kind().to_string(),
            });
        }
    }
    Ok(())
}

/// Typed positional access into a checked argument list.
pub struct ArgReader<'a> {
    function: &'a str,
    args: &'a [Arg],
}

impl<'a> ArgReader<'a> {
    pub fn new(function: &'a str, args: &'a [Arg]) -> Self {
        Self { function, args }
    }

    fn arg(&self, index: usize) -> Result<&'a Arg> {
        self.args.get(index).ok_or_else(|| Error::ArgumentCount {
            function: self.function.to_string(),
            expected: index + 1,
            got: self.args.len(),
        })
    }

    fn mismatch(&self, index: usize, expected: ArgKind, got: &Arg) -> Error {
        Error::ArgumentKind {
            function: self.function.to_string(),
            index,
            expected: expected.to_string(),
            got: got.kind().to_string(),
        }
    }

    pub fn int(&self, index: usize) -> Result<i64> {
        match self.arg(index)? {
            Arg::Int(v) => Ok(*v),
            other => Err(self.mismatch(index, ArgKind::Int, other)),
        }
    }

    pub fn float(&self, index: usize) -> Result<f64> {
        match self.arg(index)? {
            Arg::Float(v) => Ok(*v),
            other => Err(self.mismatch(index, ArgKind::Float, other)),
        }
    }

    pub fn bool(&self, index: usize) -> Result<bool> {
        match self.arg(index)? {
            Arg::Bool(v) => Ok(*v),
            other => Err(self.mismatch(index, ArgKind::Bool, other)),
        }
    }

    pub fn ints(&self, index: usize) -> Result<&'a [i64]> {
        match self.arg(index)? {
            Arg::Ints(v) => Ok(v),
            other => Err(self.mismatch(index, ArgKind::Ints, other)),
        }
    }

    pub fn floats(&self, index: usize) -> Result<&'a [f64]> {
        match self.arg(index)? {
            Arg::Floats(v) => Ok(v),
            other => Err(self.mismatch(index, ArgKind::Floats, other)),
        }
    }

    pub fn optional_int(&self, index: usize) -> Result<Option<i64>> {
        match self.arg(index)? {
            Arg::OptionalInt(v) => Ok(*v),
            other => Err(self.mismatch(index, ArgKind::OptionalInt, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_signature_count_and_kind() {
        let sig = [ArgKind::Int, ArgKind::Float];
        assert!(check_signature("F", &sig, &[Arg::Int(1), Arg::Float(0.5)]).is_ok());
        assert!(matches!(
            check_signature("F", &sig, &[Arg::Int(1)]),
            Err(Error::ArgumentCount { expected: 2, got: 1, .. })
        ));
        assert!(matches!(
            check_signature("F", &sig, &[Arg::Int(1), Arg::Int(2)]),
            Err(Error::ArgumentKind { index: 1, .. })
        ));
    }

    #[test]
    fn test_reader_typed_access() {
        let args = vec![
            Arg::from(10i64),
            Arg::from(0.5f64),
            Arg::from(vec![4i64]),
            Arg::from(Some(42i64)),
        ];
        let r = ArgReader::new("RandBinomial", &args);
        assert_eq!(r.int(0).unwrap(), 10);
        assert_eq!(r.float(1).unwrap(), 0.5);
        assert_eq!(r.ints(2).unwrap(), &[4]);
        assert_eq!(r.optional_int(3).unwrap(), Some(42));
        assert!(r.float(0).is_err());
        assert!(r.int(9).is_err());
    }
}

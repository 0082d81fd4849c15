use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Integer,
    Real,
    Boolean,
    Text,
    Blob,
}

impl Type {
    pub(crate) fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Real)
    }
}

impl std::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Integer => f.write_str("INTEGER"),
            Self::Real => f.write_str("REAL"),
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::Text => f.write_str("TEXT"),
            Self::Blob => f.write_str("BLOB"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullableType {
    Null,
    NonNull(Type),
}

impl From<Type> for NullableType {
    fn from(ty: Type) -> Self {
        Self::NonNull(ty)
    }
}

impl std::fmt::Display for NullableType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::NonNull(ty) => ty.fmt(f),
        }
    }
}

impl NullableType {
    pub fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(self) -> bool {
        match self {
            Self::Null => true,
            Self::NonNull(ty) => ty.is_numeric(),
        }
    }

    pub fn is_compatible_with<T: Into<Self>>(self, other: T) -> bool {
        match (self, other.into()) {
            (Self::Null, _) | (_, Self::Null) => true,
            (Self::NonNull(a), Self::NonNull(b)) => a == b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
    Blob(Vec<u8>),
}

/// Renders the value as a SQL literal. This is the form literals take
/// when an expression is printed back at the user, so text is quoted
/// and blobs come out as a hex literal.
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Text(s) => {
                f.write_str("'")?;
                for (i, chunk) in s.split('\'').enumerate() {
                    if i > 0 {
                        f.write_str("''")?;
                    }
                    f.write_str(chunk)?;
                }
                f.write_str("'")
            }
            Self::Blob(bytes) => {
                f.write_str("x'")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
        }
    }
}

impl Value {
    pub fn ty(&self) -> NullableType {
        match self {
            Self::Null => NullableType::Null,
            Self::Integer(_) => Type::Integer.into(),
            Self::Real(_) => Type::Real.into(),
            Self::Boolean(_) => Type::Boolean.into(),
            Self::Text(_) => Type::Text.into(),
            Self::Blob(_) => Type::Blob.into(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

//! Projection of decoded column maps onto statically typed records.
//!
//! A target type lists its fields once, in a static table returned by
//! [`Mappable::fields`]. [`scan`] walks the source map, matches each key
//! against the field tags and assigns the value through the field's setter,
//! parsing numeric text where the field is numeric.
//!
//! ```rust
//! use mssql_capture::mapper::{scan_into, FieldDescriptor, FieldSetter, Mappable};
//! use serde_json::json;
//!
//! #[derive(Debug, Default)]
//! struct Product {
//!     product_id: i64,
//!     name: String,
//! }
//!
//! impl Mappable for Product {
//!     fn fields() -> &'static [FieldDescriptor<Self>] {
//!         static FIELDS: [FieldDescriptor<Product>; 2] = [
//!             FieldDescriptor {
//!                 name: "product_id",
//!                 tag: "product_id",
//!                 setter: FieldSetter::Integer(|p, v| p.product_id = v),
//!             },
//!             FieldDescriptor {
//!                 name: "name",
//!                 tag: "name",
//!                 setter: FieldSetter::Text(|p, v| p.name = v),
//!             },
//!         ];
//!         &FIELDS
//!     }
//! }
//!
//! let source = json!({"product_id": "42", "name": "Widget"});
//! let product: Product = scan_into(source.as_object().unwrap()).unwrap();
//! assert_eq!(product.product_id, 42);
//! ```

use std::fmt;

use serde_json::{Map, Value};
use tracing::trace;

use crate::{Error, Result};

/// Static kind of a mappable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Bool => "boolean",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed write access to one field of `T`.
pub enum FieldSetter<T> {
    Text(fn(&mut T, String)),
    Integer(fn(&mut T, i64)),
    Float(fn(&mut T, f64)),
    Bool(fn(&mut T, bool)),
}

impl<T> FieldSetter<T> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldSetter::Text(_) => FieldKind::Text,
            FieldSetter::Integer(_) => FieldKind::Integer,
            FieldSetter::Float(_) => FieldKind::Float,
            FieldSetter::Bool(_) => FieldKind::Bool,
        }
    }
}

/// One field of a mappable type.
pub struct FieldDescriptor<T> {
    /// Field name, used in error reports.
    pub name: &'static str,
    /// Source key the field is matched against: the column name as declared
    /// in SQL Server (`unit price`, not the `unit_x0020_price` element name
    /// `FOR XML` writes; the decoder undoes that escaping).
    pub tag: &'static str,
    pub setter: FieldSetter<T>,
}

/// A record type that can be filled from a decoded column map.
pub trait Mappable: Default + Sized + 'static {
    fn fields() -> &'static [FieldDescriptor<Self>];
}

/// Outcome of a [`scan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapReport {
    /// Source keys that matched a field tag.
    pub matched: usize,
    /// Matched keys whose value was written to the target.
    pub assigned: usize,
}

impl MapReport {
    /// Matched keys left unassigned because of a kind mismatch or a null.
    pub fn skipped(&self) -> usize {
        self.matched - self.assigned
    }
}

/// Copy matching values from `source` into `target`.
///
/// Keys without a matching tag are ignored and fields without a matching key
/// keep their current value. Text is parsed into integer and float fields;
/// any other kind mismatch leaves the field untouched. Text that does not
/// parse is an [`Error::Coercion`]; fields assigned before it stay assigned.
pub fn scan<T: Mappable>(source: &Map<String, Value>, target: &mut T) -> Result<MapReport> {
    let fields = T::fields();
    let mut report = MapReport::default();

    for (key, value) in source {
        let Some(field) = fields.iter().find(|field| field.tag == key) else {
            continue;
        };
        report.matched += 1;

        if assign(field, value, target)? {
            report.assigned += 1;
        } else {
            trace!(
                field = field.name,
                kind = %field.setter.kind(),
                "Leaving field unassigned"
            );
        }
    }

    Ok(report)
}

/// Build a `T` from its default and [`scan`] `source` into it.
pub fn scan_into<T: Mappable>(source: &Map<String, Value>) -> Result<T> {
    let mut target = T::default();
    scan(source, &mut target)?;
    Ok(target)
}

fn assign<T>(field: &FieldDescriptor<T>, value: &Value, target: &mut T) -> Result<bool> {
    match (&field.setter, value) {
        (FieldSetter::Text(set), Value::String(text)) => set(target, text.clone()),
        (FieldSetter::Bool(set), Value::Bool(flag)) => set(target, *flag),
        (FieldSetter::Integer(set), Value::Number(number)) => match number.as_i64() {
            Some(n) => set(target, n),
            None => return Ok(false),
        },
        (FieldSetter::Float(set), Value::Number(number)) => match number.as_f64() {
            Some(n) => set(target, n),
            None => return Ok(false),
        },
        (FieldSetter::Integer(set), Value::String(text)) => {
            let n = text.parse::<i64>().map_err(|_| coercion(field, text))?;
            set(target, n);
        }
        (FieldSetter::Float(set), Value::String(text)) => {
            let n = text.parse::<f64>().map_err(|_| coercion(field, text))?;
            set(target, n);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn coercion<T>(field: &FieldDescriptor<T>, text: &str) -> Error {
    Error::Coercion {
        field: field.name,
        value: text.to_string(),
        target: field.setter.kind().as_str(),
    }
}

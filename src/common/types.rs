//! The native/boxed type system.
//!
//! `DataType` covers the native C types a declaration can take plus `Object`,
//! the host runtime's boxed value representation (`VALUE`). Alongside the
//! type constructors this module owns the whole conversion matrix between the
//! two worlds: per-type printf format specifiers, the boxing and unboxing
//! call text, and the covariance test used to validate array literals.
//!
//! Pointer level and array dimension are structural, not nominal: a pointer
//! type is `CPtr` nesting and two pointers to the same base compare equal.

use crate::common::symbol_table::ScopeRef;
use std::rc::Rc;

/// Struct vs. union, carried by both definitions and forward declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Struct,
    Union,
}

impl AggregateKind {
    pub fn keyword(self) -> &'static str {
        match self {
            AggregateKind::Struct => "struct",
            AggregateKind::Union => "union",
        }
    }
}

/// A slot in the compilation unit's named-type registry.
///
/// A forward declaration inserts `Unresolved` at construction time, before
/// any analysis runs, so later-in-file references succeed during the declare
/// pass. The rescan pass overwrites the slot with `Resolved` exactly once;
/// no slot is ever written a third time.
#[derive(Debug, Clone)]
pub enum TypeRef {
    Unresolved(String),
    Resolved(DataType),
}

/// A struct or union type. The member scope is shared with the definition
/// statement so that rescan write-throughs are visible everywhere.
#[derive(Clone)]
pub struct StructType {
    pub kind: AggregateKind,
    pub name: String,
    pub c_name: String,
    pub scope: ScopeRef,
}

// The member scope of a self-referential struct links back to entries of
// this very type; deriving Debug would recurse through that cycle until the
// stack overflows.
impl std::fmt::Debug for StructType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructType")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("c_name", &self.c_name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for StructType {
    fn eq(&self, other: &Self) -> bool {
        // Generated names are unique per compilation unit, so identity
        // reduces to the emitted C name.
        self.kind == other.kind && self.c_name == other.c_name
    }
}

/// A C function signature: name, generated name, parameter types and return
/// type. Function pointers reuse this with `name`/`c_name` unset.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub name: Option<String>,
    pub c_name: Option<String>,
    pub params: Vec<DataType>,
    pub ret: DataType,
}

/// A typedef/alias: `name` maps onto the underlying `old` type. Forward
/// declarations produce one of these over a still-unresolved registry slot;
/// rescan tightens `old` in place.
#[derive(Debug, Clone)]
pub struct TypeDefType {
    pub name: String,
    pub c_name: String,
    pub old: TypeRef,
}

impl PartialEq for TypeDefType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.c_name == other.c_name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Int,
    UInt,
    LInt,
    ULInt,
    F32,
    F64,
    /// The boxed runtime value (`VALUE`).
    Object,
    CPtr(Box<DataType>),
    CArray { base: Box<DataType>, len: Option<usize> },
    CStructOrUnion(Rc<StructType>),
    CFunction(Rc<FunctionType>),
    TypeDef(Box<TypeDefType>),
    /// A bare placeholder name, pending resolution by the rescan pass.
    Unresolved(String),
}

/// Primitive-name lookup table. Checked before the custom-type registry
/// whenever a declaration names a type.
pub fn primitive_from_name(name: &str) -> Option<DataType> {
    let ty = match name {
        "char" => DataType::Char,
        "i8" => DataType::I8,
        "i16" => DataType::I16,
        "i32" => DataType::I32,
        "i64" => DataType::I64,
        "u8" => DataType::U8,
        "u16" => DataType::U16,
        "u32" => DataType::U32,
        "u64" => DataType::U64,
        "int" => DataType::Int,
        "uint" => DataType::UInt,
        "lint" => DataType::LInt,
        "ulint" => DataType::ULInt,
        "f32" => DataType::F32,
        "f64" => DataType::F64,
        "object" => DataType::Object,
        _ => return None,
    };
    Some(ty)
}

impl DataType {
    /// Wrap `base` in `level` pointer layers.
    pub fn with_ptr_level(self, level: usize) -> DataType {
        let mut ty = self;
        for _ in 0..level {
            ty = DataType::CPtr(Box::new(ty));
        }
        ty
    }

    pub fn is_object(&self) -> bool {
        matches!(self.unwrap_alias(), DataType::Object)
    }

    pub fn is_float(&self) -> bool {
        matches!(self.unwrap_alias(), DataType::F32 | DataType::F64)
    }

    pub fn is_int_like(&self) -> bool {
        matches!(
            self.unwrap_alias(),
            DataType::Char
                | DataType::I8
                | DataType::I16
                | DataType::I32
                | DataType::I64
                | DataType::U8
                | DataType::U16
                | DataType::U32
                | DataType::U64
                | DataType::Int
                | DataType::UInt
                | DataType::LInt
                | DataType::ULInt
        )
    }

    /// A `char *` target accepts a boxed source through string extraction.
    pub fn is_char_ptr(&self) -> bool {
        match self.unwrap_alias() {
            DataType::CPtr(base) => matches!(**base, DataType::Char),
            _ => false,
        }
    }

    /// Peel typedef wrappers down to the underlying type. Unresolved slots
    /// stay put; they are rewritten before anything cares.
    pub fn unwrap_alias(&self) -> &DataType {
        match self {
            DataType::TypeDef(td) => match &td.old {
                TypeRef::Resolved(inner) => inner.unwrap_alias(),
                TypeRef::Unresolved(_) => self,
            },
            other => other,
        }
    }

    /// Whether the type is, or points at, a C function signature. Assignment
    /// into such a target copies the referenced function's generated name.
    pub fn base_is_c_function(&self) -> bool {
        match self.unwrap_alias() {
            DataType::CFunction(_) => true,
            DataType::CPtr(base) => base.base_is_c_function(),
            _ => false,
        }
    }

    /// The type a `return` of this expression produces: functions yield
    /// their return type, typedefs their underlying type.
    pub fn unwrap_return(&self) -> DataType {
        match self {
            DataType::CFunction(f) => f.ret.clone(),
            DataType::TypeDef(td) => match &td.old {
                TypeRef::Resolved(inner) => inner.clone(),
                TypeRef::Unresolved(name) => DataType::Unresolved(name.clone()),
            },
            other => other.clone(),
        }
    }

    /// printf format specifier for a value of this type. Boxed objects are
    /// rendered through `inspect` as strings, never passed raw.
    pub fn format_specifier(&self) -> &'static str {
        match self.unwrap_alias() {
            DataType::Char => "%c",
            DataType::I8 | DataType::I16 | DataType::I32 | DataType::Int => "%d",
            DataType::U8 | DataType::U16 | DataType::U32 | DataType::UInt => "%u",
            DataType::I64 => "%lld",
            DataType::U64 => "%llu",
            DataType::LInt => "%ld",
            DataType::ULInt => "%lu",
            DataType::F32 | DataType::F64 => "%f",
            DataType::Object => "%s",
            DataType::CPtr(base) if matches!(**base, DataType::Char) => "%s",
            _ => "%p",
        }
    }

    /// C text converting a native expression of this type into a boxed value.
    pub fn to_boxed(&self, expr: &str) -> String {
        match self.unwrap_alias() {
            DataType::Char => format!("rb_str_new(&{expr}, 1)"),
            DataType::I8 | DataType::I16 | DataType::I32 | DataType::Int => {
                format!("INT2NUM({expr})")
            }
            DataType::U8 | DataType::U16 | DataType::U32 | DataType::UInt => {
                format!("UINT2NUM({expr})")
            }
            DataType::LInt => format!("LONG2NUM({expr})"),
            DataType::ULInt => format!("ULONG2NUM({expr})"),
            DataType::I64 => format!("LL2NUM({expr})"),
            DataType::U64 => format!("ULL2NUM({expr})"),
            DataType::F32 | DataType::F64 => format!("DBL2NUM({expr})"),
            DataType::CPtr(base) if matches!(**base, DataType::Char) => {
                format!("rb_str_new_cstr({expr})")
            }
            // Already boxed.
            _ => expr.to_string(),
        }
    }

    /// C text converting a boxed expression into a native value of this type.
    pub fn from_boxed(&self, expr: &str) -> String {
        match self.unwrap_alias() {
            DataType::Char => format!("NUM2CHR({expr})"),
            DataType::I8 | DataType::I16 | DataType::I32 | DataType::Int => {
                format!("NUM2INT({expr})")
            }
            DataType::U8 | DataType::U16 | DataType::U32 | DataType::UInt => {
                format!("NUM2UINT({expr})")
            }
            DataType::LInt => format!("NUM2LONG({expr})"),
            DataType::ULInt => format!("NUM2ULONG({expr})"),
            DataType::I64 => format!("NUM2LL({expr})"),
            DataType::U64 => format!("NUM2ULL({expr})"),
            DataType::F32 | DataType::F64 => format!("NUM2DBL({expr})"),
            DataType::CPtr(base) if matches!(**base, DataType::Char) => {
                format!("StringValueCStr({expr})")
            }
            _ => expr.to_string(),
        }
    }

    /// Numeric width rank used by the covariance test. Wider (and floating)
    /// types can hold narrower ones.
    fn rank(&self) -> Option<u8> {
        let rank = match self.unwrap_alias() {
            DataType::Char | DataType::I8 | DataType::U8 => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::I32 | DataType::U32 | DataType::Int | DataType::UInt => 3,
            DataType::LInt | DataType::ULInt => 4,
            DataType::I64 | DataType::U64 => 5,
            DataType::F32 => 6,
            DataType::F64 => 7,
            _ => return None,
        };
        Some(rank)
    }

    /// The assignability test used by array-literal validation: `self` is the
    /// declared element type, `other` the type of an initializer element.
    pub fn covariant_with(&self, other: &DataType) -> bool {
        if self.unwrap_alias() == other.unwrap_alias() {
            return true;
        }
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    /// Whether any `Unresolved` placeholder survives inside this type.
    /// Checked after the rescan fixpoint; a survivor is fatal.
    pub fn first_unresolved(&self) -> Option<&str> {
        match self {
            DataType::Unresolved(name) => Some(name),
            DataType::CPtr(base) => base.first_unresolved(),
            DataType::CArray { base, .. } => base.first_unresolved(),
            DataType::CFunction(f) => f
                .params
                .iter()
                .find_map(|p| p.first_unresolved())
                .or_else(|| f.ret.first_unresolved()),
            DataType::TypeDef(td) => match &td.old {
                TypeRef::Unresolved(name) => Some(name),
                TypeRef::Resolved(inner) => inner.first_unresolved(),
            },
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Char => write!(f, "char"),
            DataType::I8 => write!(f, "i8"),
            DataType::I16 => write!(f, "i16"),
            DataType::I32 => write!(f, "i32"),
            DataType::I64 => write!(f, "i64"),
            DataType::U8 => write!(f, "u8"),
            DataType::U16 => write!(f, "u16"),
            DataType::U32 => write!(f, "u32"),
            DataType::U64 => write!(f, "u64"),
            DataType::Int => write!(f, "int"),
            DataType::UInt => write!(f, "uint"),
            DataType::LInt => write!(f, "lint"),
            DataType::ULInt => write!(f, "ulint"),
            DataType::F32 => write!(f, "f32"),
            DataType::F64 => write!(f, "f64"),
            DataType::Object => write!(f, "object"),
            DataType::CPtr(base) => write!(f, "{base} *"),
            DataType::CArray { base, .. } => write!(f, "{base} []"),
            DataType::CStructOrUnion(s) => write!(f, "{} {}", s.kind.keyword(), s.name),
            DataType::CFunction(func) => match &func.name {
                Some(name) => write!(f, "cfunc {name}"),
                None => write!(f, "cfunc"),
            },
            DataType::TypeDef(td) => write!(f, "{}", td.name),
            DataType::Unresolved(name) => write!(f, "{name}"),
        }
    }
}

//! Expression nodes.
//!
//! Expression-level type inference is a consumed interface: the statement
//! engine only needs each expression's resolved type, its C rendering, and
//! name binding. There is no promotion lattice and no constant folding here.

use crate::common::error::{CompileError, Result};
use crate::common::source::SourceLocation;
use crate::common::symbol_table::{EntryRef, Scope, ScopeRef};
use crate::common::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    fn as_str(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }

    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit {
        value: i64,
        loc: SourceLocation,
    },
    /// Kept as source text so emission is byte-deterministic.
    FloatLit {
        text: String,
        loc: SourceLocation,
    },
    StrLit {
        value: String,
        loc: SourceLocation,
    },
    CharLit {
        value: char,
        loc: SourceLocation,
    },
    Name {
        name: String,
        entry: Option<EntryRef>,
        loc: SourceLocation,
    },
    /// `name[index]` — an indexed element reference.
    ElementRef {
        name: String,
        index: Box<Expr>,
        entry: Option<EntryRef>,
        loc: SourceLocation,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        entry: Option<EntryRef>,
        loc: SourceLocation,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        loc: SourceLocation,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        loc: SourceLocation,
    },
}

impl Expr {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Expr::IntLit { loc, .. }
            | Expr::FloatLit { loc, .. }
            | Expr::StrLit { loc, .. }
            | Expr::CharLit { loc, .. }
            | Expr::Name { loc, .. }
            | Expr::ElementRef { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Unary { loc, .. }
            | Expr::Binary { loc, .. } => loc,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::IntLit { .. } | Expr::FloatLit { .. } | Expr::StrLit { .. } | Expr::CharLit { .. }
        )
    }

    /// Resolve names against the scope chain and record entry bindings.
    pub fn analyse(&mut self, scope: &ScopeRef) -> Result<()> {
        match self {
            Expr::IntLit { .. }
            | Expr::FloatLit { .. }
            | Expr::StrLit { .. }
            | Expr::CharLit { .. } => Ok(()),
            Expr::Name { name, entry, loc } => {
                *entry = Some(lookup(scope, name, loc)?);
                Ok(())
            }
            Expr::ElementRef {
                name,
                index,
                entry,
                loc,
            } => {
                *entry = Some(lookup(scope, name, loc)?);
                index.analyse(scope)
            }
            Expr::Call {
                name, args, entry, loc, ..
            } => {
                *entry = Some(lookup(scope, name, loc)?);
                for arg in args {
                    arg.analyse(scope)?;
                }
                Ok(())
            }
            Expr::Unary { operand, .. } => operand.analyse(scope),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.analyse(scope)?;
                rhs.analyse(scope)
            }
        }
    }

    /// Analyse knowing the type of the target this expression flows into.
    /// Literals keep their native type; the assignment conversion matrix
    /// decides what boxing (if any) applies at emission time.
    pub fn analyse_for_target_type(&mut self, _target: &DataType, scope: &ScopeRef) -> Result<()> {
        self.analyse(scope)
    }

    /// The entry a plain-name or indexed reference resolved to.
    pub fn entry(&self) -> Option<EntryRef> {
        match self {
            Expr::Name { entry, .. }
            | Expr::ElementRef { entry, .. }
            | Expr::Call { entry, .. } => entry.clone(),
            _ => None,
        }
    }

    /// The expression's resolved type. Requires prior analysis for any
    /// name-bearing node.
    pub fn dtype(&self) -> DataType {
        match self {
            Expr::IntLit { .. } => DataType::Int,
            Expr::FloatLit { .. } => DataType::F64,
            Expr::StrLit { .. } => DataType::Char.with_ptr_level(1),
            Expr::CharLit { .. } => DataType::Char,
            Expr::Name { entry, .. } => bound(entry).borrow().ty.clone(),
            Expr::ElementRef { entry, .. } => {
                let ty = bound(entry).borrow().ty.clone();
                match ty.unwrap_alias() {
                    DataType::CArray { base, .. } => (**base).clone(),
                    DataType::CPtr(base) => (**base).clone(),
                    // Indexing a boxed container yields a boxed value.
                    DataType::Object => DataType::Object,
                    _ => ty,
                }
            }
            Expr::Call { entry, .. } => {
                let ty = bound(entry).borrow().ty.clone();
                match ty.unwrap_alias() {
                    DataType::CFunction(f) => f.ret.clone(),
                    _ => ty,
                }
            }
            Expr::Unary { operand, .. } => operand.dtype(),
            Expr::Binary { op, lhs, rhs, .. } => {
                if op.is_comparison() {
                    DataType::Int
                } else {
                    let (l, r) = (lhs.dtype(), rhs.dtype());
                    if l.covariant_with(&r) {
                        l
                    } else {
                        r
                    }
                }
            }
        }
    }

    /// Render the expression as C text. Deterministic for a given analysed
    /// node; generation never mutates.
    pub fn c_code(&self) -> String {
        match self {
            Expr::IntLit { value, .. } => value.to_string(),
            Expr::FloatLit { text, .. } => text.clone(),
            Expr::StrLit { value, .. } => format!("\"{}\"", escape_c(value)),
            Expr::CharLit { value, .. } => match escape_common(*value) {
                Some(esc) => format!("'{esc}'"),
                None if *value == '\'' => "'\\''".to_string(),
                None => format!("'{value}'"),
            },
            Expr::Name { entry, .. } => bound(entry).borrow().c_name.clone(),
            Expr::ElementRef { entry, index, .. } => {
                format!("{}[{}]", bound(entry).borrow().c_name, index.c_code())
            }
            Expr::Call { entry, args, .. } => {
                let rendered: Vec<String> = args.iter().map(|a| a.c_code()).collect();
                format!("{}({})", bound(entry).borrow().c_name, rendered.join(", "))
            }
            Expr::Unary { op, operand, .. } => format!("{}{}", op.as_str(), operand.c_code()),
            Expr::Binary { op, lhs, rhs, .. } => {
                format!("{} {} {}", lhs.c_code(), op.as_str(), rhs.c_code())
            }
        }
    }
}

fn lookup(scope: &ScopeRef, name: &str, loc: &SourceLocation) -> Result<EntryRef> {
    Scope::lookup(scope, name).ok_or_else(|| CompileError::SymbolNotFound {
        name: name.to_string(),
        location: loc.clone(),
    })
}

fn bound(entry: &Option<EntryRef>) -> EntryRef {
    entry
        .clone()
        .expect("expression used before name resolution")
}

/// Escape a string for inclusion in a double-quoted C literal.
pub(crate) fn escape_c(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match escape_common(c) {
            Some(esc) => out.push_str(esc),
            None if c == '"' => out.push_str("\\\""),
            None => out.push(c),
        }
    }
    out
}

/// Escapes shared by char and string literals; the quote characters differ
/// per context and are handled by the callers.
fn escape_common(c: char) -> Option<&'static str> {
    Some(match c {
        '\\' => "\\\\",
        '\n' => "\\n",
        '\t' => "\\t",
        '\r' => "\\r",
        '\0' => "\\0",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::symbol_table::Scope;

    fn loc() -> SourceLocation {
        SourceLocation::new("test.rbx", 1)
    }

    #[test]
    fn name_resolution_binds_entry() {
        let scope = Scope::root("m");
        scope
            .borrow_mut()
            .declare("x", "rbx_v_x".into(), DataType::Int, false)
            .unwrap();
        let mut e = Expr::Name { name: "x".into(), entry: None, loc: loc() };
        e.analyse(&scope).unwrap();
        assert_eq!(e.dtype(), DataType::Int);
        assert_eq!(e.c_code(), "rbx_v_x");
    }

    #[test]
    fn missing_name_is_symbol_not_found() {
        let scope = Scope::root("m");
        let mut e = Expr::Name { name: "ghost".into(), entry: None, loc: loc() };
        assert!(matches!(
            e.analyse(&scope),
            Err(CompileError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn element_ref_types_come_from_the_container() {
        let scope = Scope::root("m");
        scope
            .borrow_mut()
            .declare(
                "xs",
                "rbx_a_xs".into(),
                DataType::CArray { base: Box::new(DataType::F64), len: None },
                false,
            )
            .unwrap();
        let mut e = Expr::ElementRef {
            name: "xs".into(),
            index: Box::new(Expr::IntLit { value: 2, loc: loc() }),
            entry: None,
            loc: loc(),
        };
        e.analyse(&scope).unwrap();
        assert_eq!(e.dtype(), DataType::F64);
        assert_eq!(e.c_code(), "rbx_a_xs[2]");
    }

    #[test]
    fn string_literals_escape_and_type_as_char_ptr() {
        let e = Expr::StrLit { value: "a \"b\"\n".into(), loc: loc() };
        assert_eq!(e.c_code(), "\"a \\\"b\\\"\\n\"");
        assert!(e.dtype().is_char_ptr());

        let e = Expr::StrLit { value: "cr\r nul\0 bs\\".into(), loc: loc() };
        assert_eq!(e.c_code(), "\"cr\\r nul\\0 bs\\\\\"");
    }

    #[test]
    fn char_literals_escape_quotes_and_controls() {
        let cases = [
            ('a', "'a'"),
            ('\'', "'\\''"),
            ('\\', "'\\\\'"),
            ('\n', "'\\n'"),
            ('\0', "'\\0'"),
            ('"', "'\"'"),
        ];
        for (value, expected) in cases {
            let e = Expr::CharLit { value, loc: loc() };
            assert_eq!(e.c_code(), expected);
        }
    }

    #[test]
    fn comparisons_are_native_int() {
        let scope = Scope::root("m");
        let mut e = Expr::Binary {
            op: BinOp::Lt,
            lhs: Box::new(Expr::IntLit { value: 1, loc: loc() }),
            rhs: Box::new(Expr::IntLit { value: 2, loc: loc() }),
            loc: loc(),
        };
        e.analyse(&scope).unwrap();
        assert_eq!(e.dtype(), DataType::Int);
        assert_eq!(e.c_code(), "1 < 2");
    }
}

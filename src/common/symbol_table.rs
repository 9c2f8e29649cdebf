//! Scoped symbol table.
//!
//! Scopes nest lexically and hold a weak back-reference to their parent for
//! outward lookup. Entries are shared (`Rc<RefCell<..>>`) rather than copied:
//! when the rescan pass overwrites an entry's type in place, every statement
//! holding that entry observes the update.
//!
//! Each scope carries a qualifying name; struct/union definitions compose it
//! with their own name to build collision-free generated identifiers.

use crate::common::types::DataType;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Information about a declared symbol.
#[derive(Debug)]
pub struct SymbolEntry {
    pub name: String,
    /// The mangled identifier emitted into C source. Extern declarations
    /// keep the user name verbatim.
    pub c_name: String,
    pub ty: DataType,
    pub is_extern: bool,
    /// Positional index within the enclosing scope, in declaration order.
    /// Meaningful for struct/union members and array entries.
    pub pos: usize,
}

pub type EntryRef = Rc<RefCell<SymbolEntry>>;
pub type ScopeRef = Rc<RefCell<Scope>>;

/// A lexical scope: name→entry map plus qualification metadata.
#[derive(Debug)]
pub struct Scope {
    parent: Weak<RefCell<Scope>>,
    qual_name: String,
    /// Declared return type when this scope is a function body.
    ret_ty: Option<DataType>,
    symbols: FxHashMap<String, EntryRef>,
}

impl Scope {
    pub fn root(qual_name: impl Into<String>) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            parent: Weak::new(),
            qual_name: qual_name.into(),
            ret_ty: None,
            symbols: FxHashMap::default(),
        }))
    }

    /// A named nested scope (struct/union member scope). Its qualifying name
    /// composes with the parent's.
    pub fn nested(parent: &ScopeRef, name: &str) -> ScopeRef {
        let qual = {
            let p = parent.borrow();
            if p.qual_name.is_empty() {
                name.to_string()
            } else {
                format!("{}_{}", p.qual_name, name)
            }
        };
        Rc::new(RefCell::new(Scope {
            parent: Rc::downgrade(parent),
            qual_name: qual,
            ret_ty: None,
            symbols: FxHashMap::default(),
        }))
    }

    /// An anonymous block scope (loop body). Keeps the parent's qualifying
    /// name; new declarations land here and shadow outer bindings.
    pub fn block(parent: &ScopeRef) -> ScopeRef {
        let qual = parent.borrow().qual_name.clone();
        Rc::new(RefCell::new(Scope {
            parent: Rc::downgrade(parent),
            qual_name: qual,
            ret_ty: None,
            symbols: FxHashMap::default(),
        }))
    }

    /// A function body scope carrying the function's declared return type,
    /// consulted by `return` emission for the boxing decision.
    pub fn function(parent: &ScopeRef, name: &str, ret_ty: DataType) -> ScopeRef {
        let scope = Scope::nested(parent, name);
        scope.borrow_mut().ret_ty = Some(ret_ty);
        scope
    }

    /// Qualifying-name accessor for generated-identifier construction.
    pub fn qualifying_name(&self) -> &str {
        &self.qual_name
    }

    /// Insert a symbol into this scope. Returns `None` if the name is
    /// already declared here (shadowing an outer scope is allowed).
    pub fn declare(
        &mut self,
        name: &str,
        c_name: String,
        ty: DataType,
        is_extern: bool,
    ) -> Option<EntryRef> {
        if self.symbols.contains_key(name) {
            return None;
        }
        let entry = Rc::new(RefCell::new(SymbolEntry {
            name: name.to_string(),
            c_name,
            ty,
            is_extern,
            pos: self.symbols.len(),
        }));
        self.symbols.insert(name.to_string(), Rc::clone(&entry));
        Some(entry)
    }

    /// Look a name up in this scope only, no parent walk.
    pub fn local(&self, name: &str) -> Option<EntryRef> {
        self.symbols.get(name).map(Rc::clone)
    }

    /// Look a name up in this scope, then outward through the parent chain.
    pub fn lookup(scope: &ScopeRef, name: &str) -> Option<EntryRef> {
        let mut current = Rc::clone(scope);
        loop {
            if let Some(entry) = current.borrow().local(name) {
                return Some(entry);
            }
            let parent = current.borrow().parent.upgrade();
            match parent {
                Some(p) => current = p,
                None => return None,
            }
        }
    }

    /// The declared return type of the innermost enclosing function scope.
    pub fn enclosing_return_type(scope: &ScopeRef) -> Option<DataType> {
        let mut current = Rc::clone(scope);
        loop {
            if let Some(ty) = current.borrow().ret_ty.clone() {
                return Some(ty);
            }
            let parent = current.borrow().parent.upgrade();
            match parent {
                Some(p) => current = p,
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward() {
        let root = Scope::root("m");
        let inner = Scope::block(&root);
        root.borrow_mut()
            .declare("x", "rbx_v_x".into(), DataType::Int, false)
            .unwrap();
        let found = Scope::lookup(&inner, "x").unwrap();
        assert_eq!(found.borrow().c_name, "rbx_v_x");
        assert!(Scope::lookup(&inner, "y").is_none());
    }

    #[test]
    fn duplicate_in_same_scope_rejected_but_shadowing_allowed() {
        let root = Scope::root("m");
        root.borrow_mut()
            .declare("x", "a".into(), DataType::Int, false)
            .unwrap();
        assert!(root
            .borrow_mut()
            .declare("x", "b".into(), DataType::Int, false)
            .is_none());

        let inner = Scope::block(&root);
        let shadow = inner
            .borrow_mut()
            .declare("x", "b".into(), DataType::F64, false)
            .unwrap();
        assert_eq!(shadow.borrow().ty, DataType::F64);
        // Inner lookup sees the shadow, outer still sees the original.
        assert_eq!(Scope::lookup(&inner, "x").unwrap().borrow().c_name, "b");
        assert_eq!(Scope::lookup(&root, "x").unwrap().borrow().c_name, "a");
    }

    #[test]
    fn qualifying_names_compose() {
        let root = Scope::root("pkg");
        let sue = Scope::nested(&root, "node");
        assert_eq!(sue.borrow().qualifying_name(), "pkg_node");
        let block = Scope::block(&sue);
        assert_eq!(block.borrow().qualifying_name(), "pkg_node");
    }

    #[test]
    fn member_positions_follow_declaration_order() {
        let root = Scope::root("m");
        let a = root
            .borrow_mut()
            .declare("a", "a".into(), DataType::Int, false)
            .unwrap();
        let b = root
            .borrow_mut()
            .declare("b", "b".into(), DataType::Int, false)
            .unwrap();
        assert_eq!(a.borrow().pos, 0);
        assert_eq!(b.borrow().pos, 1);
    }

    #[test]
    fn return_type_found_through_block_scopes() {
        let root = Scope::root("m");
        let f = Scope::function(&root, "answer", DataType::Object);
        let body = Scope::block(&f);
        assert_eq!(
            Scope::enclosing_return_type(&body),
            Some(DataType::Object)
        );
        assert_eq!(Scope::enclosing_return_type(&root), None);
    }
}

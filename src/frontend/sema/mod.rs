//! Compilation-unit context for name and type resolution.
//!
//! The context owns the named-type registry consulted by every declaration:
//! `name -> TypeRef::{Unresolved, Resolved}`. Forward declarations and
//! aliases insert placeholder slots at construction time; struct/union
//! definitions and alias analysis overwrite them with resolved types. The
//! registry lives for the whole compilation unit and is passed explicitly
//! through every resolution call, so independent compilations never share
//! state.
//!
//! The mutation discipline is declare once (as placeholder), resolve once
//! (to a concrete type); no slot is written a third time.

use crate::common::error::{CompileError, Result};
use crate::common::source::SourceLocation;
use crate::common::types::{primitive_from_name, DataType, TypeRef};
use rustc_hash::FxHashMap;

/// Prefixes composing deterministic, collision-free generated C names.
/// Extern declarations bypass them and keep the user name verbatim.
pub const VAR_PREFIX: &str = "rbx_v_";
pub const POINTER_PREFIX: &str = "rbx_p_";
pub const ARRAY_PREFIX: &str = "rbx_a_";
pub const TYPE_PREFIX: &str = "rbx_t_";
pub const FUNC_PREFIX: &str = "rbx_f_";
pub const ARG_PREFIX: &str = "rbx_arg_";

/// Per-compilation-unit state threaded through analyse and rescan.
#[derive(Debug, Default)]
pub struct CompilationContext {
    registry: FxHashMap<String, TypeRef>,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an unresolved placeholder for `name`. Called from statement
    /// constructors (forward declarations, aliases), before any analysis
    /// runs, so later-in-file references succeed during the declare pass.
    /// A slot that already resolved is left alone.
    pub fn register_placeholder(&mut self, name: &str) {
        self.registry
            .entry(name.to_string())
            .or_insert_with(|| TypeRef::Unresolved(name.to_string()));
    }

    /// Overwrite `name`'s slot with its resolved type.
    pub fn register_resolved(&mut self, name: &str, ty: DataType) {
        self.registry.insert(name.to_string(), TypeRef::Resolved(ty));
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeRef> {
        self.registry.get(name)
    }

    /// Resolve a declared type name: primitive table first, then the
    /// custom-type registry. A registered-but-unresolved name yields an
    /// `Unresolved` placeholder for the rescan pass to tighten; a name known
    /// to neither table is fatal.
    pub fn resolve_named(
        &self,
        name: &str,
        ptr_level: usize,
        location: &SourceLocation,
    ) -> Result<DataType> {
        let base = if let Some(prim) = primitive_from_name(name) {
            prim
        } else {
            match self.registry.get(name) {
                Some(TypeRef::Resolved(ty)) => ty.clone(),
                Some(TypeRef::Unresolved(_)) => DataType::Unresolved(name.to_string()),
                None => {
                    return Err(CompileError::UnresolvedType {
                        name: name.to_string(),
                        location: location.clone(),
                    })
                }
            }
        };
        Ok(base.with_ptr_level(ptr_level))
    }

    /// Rewrite every placeholder inside `ty` whose registry slot has since
    /// resolved. Returns the refreshed type, or `None` when nothing changed.
    /// Placeholders whose slots are still unresolved stay put; the rescan
    /// fixpoint retries them on the next round.
    pub fn refresh(&self, ty: &DataType) -> Option<DataType> {
        match ty {
            DataType::Unresolved(name) => match self.registry.get(name) {
                Some(TypeRef::Resolved(resolved)) => Some(resolved.clone()),
                _ => None,
            },
            DataType::CPtr(base) => self
                .refresh(base)
                .map(|b| DataType::CPtr(Box::new(b))),
            DataType::CArray { base, len } => self.refresh(base).map(|b| DataType::CArray {
                base: Box::new(b),
                len: *len,
            }),
            DataType::CFunction(f) => {
                let new_ret = self.refresh(&f.ret);
                let mut new_params: Vec<Option<DataType>> =
                    f.params.iter().map(|p| self.refresh(p)).collect();
                if new_ret.is_none() && new_params.iter().all(|p| p.is_none()) {
                    return None;
                }
                let mut func = (**f).clone();
                if let Some(ret) = new_ret {
                    func.ret = ret;
                }
                for (slot, refreshed) in func.params.iter_mut().zip(new_params.iter_mut()) {
                    if let Some(ty) = refreshed.take() {
                        *slot = ty;
                    }
                }
                Some(DataType::CFunction(std::rc::Rc::new(func)))
            }
            DataType::TypeDef(td) => match &td.old {
                TypeRef::Unresolved(name) => match self.registry.get(name) {
                    Some(TypeRef::Resolved(resolved)) => {
                        let mut td = td.clone();
                        td.old = TypeRef::Resolved(resolved.clone());
                        Some(DataType::TypeDef(td))
                    }
                    _ => None,
                },
                TypeRef::Resolved(inner) => self.refresh(inner).map(|refreshed| {
                    let mut td = td.clone();
                    td.old = TypeRef::Resolved(refreshed);
                    DataType::TypeDef(td)
                }),
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new("test.rbx", 1)
    }

    #[test]
    fn primitives_win_over_registry() {
        let mut ctx = CompilationContext::new();
        ctx.register_resolved("int", DataType::F64);
        let ty = ctx.resolve_named("int", 0, &loc()).unwrap();
        assert_eq!(ty, DataType::Int);
    }

    #[test]
    fn unknown_name_is_fatal_but_placeholder_is_not() {
        let ctx = CompilationContext::new();
        assert!(matches!(
            ctx.resolve_named("node", 0, &loc()),
            Err(CompileError::UnresolvedType { .. })
        ));

        let mut ctx = CompilationContext::new();
        ctx.register_placeholder("node");
        let ty = ctx.resolve_named("node", 1, &loc()).unwrap();
        assert_eq!(
            ty,
            DataType::Unresolved("node".into()).with_ptr_level(1)
        );
    }

    #[test]
    fn refresh_rewrites_through_pointers() {
        let mut ctx = CompilationContext::new();
        ctx.register_placeholder("node");
        let ty = DataType::Unresolved("node".into()).with_ptr_level(2);

        // Nothing to do while the slot is still a placeholder.
        assert!(ctx.refresh(&ty).is_none());

        ctx.register_resolved("node", DataType::Int);
        let refreshed = ctx.refresh(&ty).unwrap();
        assert_eq!(refreshed, DataType::Int.with_ptr_level(2));
        assert_eq!(refreshed.first_unresolved(), None);
    }
}

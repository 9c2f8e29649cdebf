//! Statement-level semantic analysis and C code generation.
//!
//! Every statement kind lives in one closed enum and exposes the same three
//! operations the driver invokes in fixed order across the whole unit:
//!
//! - `analyse(scope, ctx, is_extern)` — the declare pass: resolve named
//!   types (primitive table first, then the custom-type registry), compute
//!   generated names, insert symbol entries, type-check operands.
//! - `rescan(scope, ctx)` — the second pass over declarations: any stored
//!   type that is still a bare placeholder is re-resolved from the registry
//!   and written back into both the statement and its live scope entry.
//!   Returns whether progress was made; the driver repeats to a fixpoint.
//! - `generate(writer, scope)` — emit C text. Declarations emit nothing
//!   here (their C declarations are rendered from the scope by the outer
//!   code generator); the no-op arms are explicit.
//!
//! The two-pass split exists because the language permits later-declared,
//! mutually-recursive, and self-referential types — a struct holding a
//! pointer to its own type cannot resolve in one linear pass.

use crate::backend::writer::CodeWriter;
use crate::common::error::{CompileError, Result};
use crate::common::source::SourceLocation;
use crate::common::symbol_table::{EntryRef, Scope, ScopeRef};
use crate::common::types::{AggregateKind, DataType, FunctionType, StructType, TypeDefType, TypeRef};
use crate::frontend::ast::expr::{escape_c, Expr};
use crate::frontend::sema::{
    CompilationContext, ARG_PREFIX, ARRAY_PREFIX, FUNC_PREFIX, POINTER_PREFIX, TYPE_PREFIX,
    VAR_PREFIX,
};
use std::rc::Rc;

/// Comparison operators appearing in `for` statement bounds. The loop
/// direction is inferred from them, never stated explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A function-pointer signature: return pointer level plus a parameter list.
/// The return base type is named by the enclosing declaration.
#[derive(Debug)]
pub struct FuncPtrSig {
    pub ret_ptr_level: usize,
    pub args: ArgList,
}

/// A formal parameter declaration. Inside a function-pointer signature the
/// parameter has no name and gets no symbol-table slot; only its type is
/// retained.
#[derive(Debug)]
pub struct ArgDecl {
    pub ty_name: String,
    pub ptr_level: usize,
    /// Set when this parameter is itself a function pointer.
    pub func_ptr: Option<Box<FuncPtrSig>>,
    pub name: Option<String>,
    pub ty: Option<DataType>,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

impl ArgDecl {
    fn analyse(
        &mut self,
        scope: &ScopeRef,
        ctx: &mut CompilationContext,
        inside_func_ptr: bool,
        is_extern: bool,
    ) -> Result<()> {
        let ty = match &mut self.func_ptr {
            Some(sig) => {
                sig.args.analyse(scope, ctx, true, is_extern)?;
                let ret = ctx.resolve_named(&self.ty_name, sig.ret_ptr_level, &self.loc)?;
                let (name, c_name) = if inside_func_ptr {
                    (None, None)
                } else {
                    let n = self.name.clone();
                    let c = n.as_ref().map(|n| format!("{ARG_PREFIX}{n}"));
                    (n, c)
                };
                let func = FunctionType { name, c_name, params: sig.args.types(), ret };
                // A function-pointer parameter written without a star still
                // is one.
                let level = self.ptr_level.max(1);
                DataType::CFunction(Rc::new(func)).with_ptr_level(level)
            }
            None => ctx.resolve_named(&self.ty_name, self.ptr_level, &self.loc)?,
        };

        if !is_extern && !inside_func_ptr {
            if let Some(name) = &self.name {
                let c_name = format!("{ARG_PREFIX}{name}");
                self.entry = Some(declare(scope, name, c_name, ty.clone(), false, &self.loc)?);
            }
        }
        self.ty = Some(ty);
        Ok(())
    }

    fn rescan(&mut self, ctx: &CompilationContext) -> bool {
        refresh_in_place(&mut self.ty, &self.entry, ctx)
    }
}

/// A formal parameter list, used by function declarations and by
/// function-pointer signatures.
#[derive(Debug, Default)]
pub struct ArgList {
    pub args: Vec<ArgDecl>,
}

impl ArgList {
    pub fn analyse(
        &mut self,
        scope: &ScopeRef,
        ctx: &mut CompilationContext,
        inside_func_ptr: bool,
        is_extern: bool,
    ) -> Result<()> {
        for arg in &mut self.args {
            arg.analyse(scope, ctx, inside_func_ptr, is_extern)?;
        }
        Ok(())
    }

    /// The analysed parameter types, in declaration order.
    pub fn types(&self) -> Vec<DataType> {
        self.args
            .iter()
            .map(|a| a.ty.clone().expect("argument list analysed before use"))
            .collect()
    }

    fn rescan(&mut self, ctx: &CompilationContext) -> bool {
        let mut progress = false;
        for arg in &mut self.args {
            progress |= arg.rescan(ctx);
        }
        progress
    }
}

/// A by-value variable declaration with an optional initializer.
#[derive(Debug)]
pub struct VarDecl {
    pub ty_name: String,
    pub name: String,
    pub value: Option<Expr>,
    pub ty: Option<DataType>,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

/// A pointer declaration. The target is either a named base type or a
/// function-pointer signature.
#[derive(Debug)]
pub struct PtrDecl {
    pub ty_name: String,
    pub ptr_level: usize,
    pub func_ptr: Option<FuncPtrSig>,
    pub name: String,
    pub value: Option<Expr>,
    pub ty: Option<DataType>,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

/// A fixed-size array declaration with an optional initializer list.
#[derive(Debug)]
pub struct ArrayDecl {
    pub elem_ty_name: String,
    pub name: String,
    pub dimension: Expr,
    pub values: Vec<Expr>,
    pub elem_ty: Option<DataType>,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

/// A struct or union definition. Members live in a nested scope whose
/// qualifying name composes with the parent's.
#[derive(Debug)]
pub struct StructOrUnionDef {
    pub kind: AggregateKind,
    pub name: String,
    pub members: Vec<Statement>,
    pub ty: Option<DataType>,
    pub scope: Option<ScopeRef>,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

/// A forward struct/union declaration. Construction registers an unresolved
/// placeholder in the registry so later-in-file references succeed during
/// the declare pass; rescan tightens it once the definition is seen.
#[derive(Debug)]
pub struct ForwardDecl {
    pub kind: AggregateKind,
    pub name: String,
    pub c_name: Option<String>,
    pub ty: Option<DataType>,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

impl ForwardDecl {
    pub fn new(
        kind: AggregateKind,
        name: impl Into<String>,
        loc: SourceLocation,
        ctx: &mut CompilationContext,
    ) -> Self {
        let name = name.into();
        ctx.register_placeholder(&name);
        ForwardDecl { kind, name, c_name: None, ty: None, entry: None, loc }
    }
}

/// The target of an `alias` declaration.
#[derive(Debug)]
pub enum AliasTarget {
    /// A named type, possibly written with a `struct`/`union` keyword
    /// (stripped during analysis) and a pointer level.
    Type { ty_name: String, ptr_level: usize },
    /// A function-pointer signature.
    FuncPtr { ret_ty_name: String, ptr_level: usize, sig: FuncPtrSig },
}

/// A typedef introducing `new_name` for an existing type.
#[derive(Debug)]
pub struct AliasDecl {
    pub new_name: String,
    pub target: AliasTarget,
    pub ty: Option<DataType>,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

impl AliasDecl {
    pub fn new(
        new_name: impl Into<String>,
        target: AliasTarget,
        loc: SourceLocation,
        ctx: &mut CompilationContext,
    ) -> Self {
        let new_name = new_name.into();
        ctx.register_placeholder(&new_name);
        AliasDecl { new_name, target, ty: None, entry: None, loc }
    }
}

/// A C function declaration (signature only; bodies are a separate,
/// out-of-scope statement form).
#[derive(Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub ret_ty_name: String,
    pub ret_ptr_level: usize,
    pub args: ArgList,
    pub ty: Option<DataType>,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

/// `print(expr, ...)` — one formatted-output call per statement.
#[derive(Debug)]
pub struct Print {
    pub args: Vec<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug)]
pub struct Return {
    pub value: Expr,
    pub ty: Option<DataType>,
    pub loc: SourceLocation,
}

/// Assignment. A plain-name left side that was never declared acts as an
/// implicit declaration: the type is inferred from the right side and the
/// entry is created in the innermost scope, even when that shadows an outer
/// binding.
#[derive(Debug)]
pub struct Assign {
    pub lhs: Expr,
    pub rhs: Expr,
    pub entry: Option<EntryRef>,
    pub loc: SourceLocation,
}

/// One conditional arm: optional condition (absent for the final `else`),
/// a body, and an optional chained tail arm.
#[derive(Debug)]
pub struct Conditional {
    pub cond: Option<Expr>,
    pub body: Vec<Statement>,
    pub tail: Option<Box<Conditional>>,
    pub loc: SourceLocation,
}

/// A bounded loop over a pre-declared counter. Direction comes from the two
/// comparison operators: start `<` begins one past the left bound, `>` one
/// before; end `<`/`<=` increments, `>`/`>=` decrements.
#[derive(Debug)]
pub struct For {
    pub start: Expr,
    pub start_op: CmpOp,
    pub counter: String,
    pub end_op: CmpOp,
    pub end: Expr,
    pub body: Vec<Statement>,
    pub counter_entry: Option<EntryRef>,
    pub body_scope: Option<ScopeRef>,
    pub loc: SourceLocation,
}

#[derive(Debug)]
pub struct While {
    pub cond: Expr,
    pub body: Vec<Statement>,
    pub body_scope: Option<ScopeRef>,
    pub loc: SourceLocation,
}

/// An expression used for its side effects, e.g. a bare call.
#[derive(Debug)]
pub struct ExprStatement {
    pub expr: Expr,
    pub loc: SourceLocation,
}

/// All statement kinds, closed. Built once by parsing, analysed once,
/// generated once, in that fixed order.
#[derive(Debug)]
pub enum Statement {
    VarDecl(VarDecl),
    PtrDecl(PtrDecl),
    ArrayDecl(ArrayDecl),
    StructOrUnionDef(StructOrUnionDef),
    ForwardDecl(ForwardDecl),
    Alias(AliasDecl),
    FunctionDecl(FunctionDecl),
    Print(Print),
    Return(Return),
    Assign(Assign),
    Conditional(Conditional),
    For(For),
    While(While),
    Expr(ExprStatement),
}

impl Statement {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Statement::VarDecl(s) => &s.loc,
            Statement::PtrDecl(s) => &s.loc,
            Statement::ArrayDecl(s) => &s.loc,
            Statement::StructOrUnionDef(s) => &s.loc,
            Statement::ForwardDecl(s) => &s.loc,
            Statement::Alias(s) => &s.loc,
            Statement::FunctionDecl(s) => &s.loc,
            Statement::Print(s) => &s.loc,
            Statement::Return(s) => &s.loc,
            Statement::Assign(s) => &s.loc,
            Statement::Conditional(s) => &s.loc,
            Statement::For(s) => &s.loc,
            Statement::While(s) => &s.loc,
            Statement::Expr(s) => &s.loc,
        }
    }

    /// The declare pass plus per-kind semantic checks.
    pub fn analyse(
        &mut self,
        scope: &ScopeRef,
        ctx: &mut CompilationContext,
        is_extern: bool,
    ) -> Result<()> {
        match self {
            Statement::VarDecl(s) => {
                let ty = ctx.resolve_named(&s.ty_name, 0, &s.loc)?;
                if let Some(value) = &mut s.value {
                    value.analyse_for_target_type(&ty, scope)?;
                }
                let c_name = generated_name(VAR_PREFIX, &s.name, is_extern);
                s.entry = Some(declare(scope, &s.name, c_name, ty.clone(), is_extern, &s.loc)?);
                s.ty = Some(ty);
                Ok(())
            }
            Statement::PtrDecl(s) => {
                let c_name = generated_name(POINTER_PREFIX, &s.name, is_extern);
                let ty = match &mut s.func_ptr {
                    Some(sig) => {
                        sig.args.analyse(scope, ctx, true, is_extern)?;
                        let ret = ctx.resolve_named(&s.ty_name, sig.ret_ptr_level, &s.loc)?;
                        let func = FunctionType {
                            name: Some(s.name.clone()),
                            c_name: Some(c_name.clone()),
                            params: sig.args.types(),
                            ret,
                        };
                        DataType::CFunction(Rc::new(func)).with_ptr_level(s.ptr_level)
                    }
                    None => ctx.resolve_named(&s.ty_name, s.ptr_level, &s.loc)?,
                };
                if let Some(value) = &mut s.value {
                    value.analyse_for_target_type(&ty, scope)?;
                }
                s.entry = Some(declare(scope, &s.name, c_name, ty.clone(), is_extern, &s.loc)?);
                s.ty = Some(ty);
                Ok(())
            }
            Statement::ArrayDecl(s) => {
                s.dimension.analyse(scope)?;
                let dim_ty = s.dimension.dtype();
                if !dim_ty.is_int_like() {
                    return Err(CompileError::TypeMismatch {
                        expected: DataType::Int.to_string(),
                        found: dim_ty.to_string(),
                        location: s.dimension.loc().clone(),
                    });
                }
                let elem_ty = ctx.resolve_named(&s.elem_ty_name, 0, &s.loc)?;
                let array_ty =
                    DataType::CArray { base: Box::new(elem_ty.clone()), len: None };
                let c_name = generated_name(ARRAY_PREFIX, &s.name, is_extern);
                s.entry = Some(declare(scope, &s.name, c_name, array_ty, is_extern, &s.loc)?);

                for value in &mut s.values {
                    value.analyse(scope)?;
                    let found = value.dtype();
                    if !elem_ty.covariant_with(&found) {
                        return Err(CompileError::TypeMismatch {
                            expected: elem_ty.to_string(),
                            found: found.to_string(),
                            location: value.loc().clone(),
                        });
                    }
                }
                s.elem_ty = Some(elem_ty);
                Ok(())
            }
            Statement::StructOrUnionDef(s) => {
                let member_scope = Scope::nested(scope, &s.name);
                let c_name = if is_extern {
                    format!("{} {}", s.kind.keyword(), s.name)
                } else {
                    format!("{TYPE_PREFIX}{}", member_scope.borrow().qualifying_name())
                };
                let ty = DataType::CStructOrUnion(Rc::new(StructType {
                    kind: s.kind,
                    name: s.name.clone(),
                    c_name: c_name.clone(),
                    scope: Rc::clone(&member_scope),
                }));
                // Members are analysed under the enclosing extern flag.
                // Self-references inside them go through a prior forward
                // declaration's placeholder and settle during rescan.
                for member in &mut s.members {
                    member.analyse(&member_scope, ctx, is_extern)?;
                }
                ctx.register_resolved(&s.name, ty.clone());
                let declared =
                    scope
                        .borrow_mut()
                        .declare(&s.name, c_name, ty.clone(), is_extern);
                let entry = match declared {
                    Some(entry) => entry,
                    // A prior forward declaration holds the slot as a
                    // placeholder typedef; resolve it in place. Anything
                    // else is a real redeclaration.
                    None => {
                        let existing = scope
                            .borrow()
                            .local(&s.name)
                            .expect("declare refused, so the slot exists");
                        let forward_slot = matches!(
                            &existing.borrow().ty,
                            DataType::TypeDef(td)
                                if matches!(&td.old, TypeRef::Unresolved(n) if *n == s.name)
                        );
                        if !forward_slot {
                            return Err(CompileError::DuplicateSymbol {
                                name: s.name.clone(),
                                location: s.loc.clone(),
                            });
                        }
                        existing.borrow_mut().ty = ty.clone();
                        existing
                    }
                };
                s.entry = Some(entry);
                s.ty = Some(ty);
                s.scope = Some(member_scope);
                Ok(())
            }
            Statement::ForwardDecl(s) => {
                let qual = scope.borrow().qualifying_name().to_string();
                let c_name = format!("{TYPE_PREFIX}{qual}_{}", s.name);
                let ty = DataType::TypeDef(Box::new(TypeDefType {
                    name: format!("{} {}", s.kind.keyword(), s.name),
                    c_name: c_name.clone(),
                    old: TypeRef::Unresolved(s.name.clone()),
                }));
                // The placeholder also takes the scope slot, so the name is
                // reserved until the definition resolves it in place.
                s.entry =
                    Some(declare(scope, &s.name, c_name.clone(), ty.clone(), is_extern, &s.loc)?);
                s.ty = Some(ty);
                s.c_name = Some(c_name);
                Ok(())
            }
            Statement::Alias(s) => {
                let (base, self_named) = match &mut s.target {
                    AliasTarget::Type { ty_name, ptr_level } => {
                        let stripped = ty_name
                            .strip_prefix("struct ")
                            .or_else(|| ty_name.strip_prefix("union "))
                            .unwrap_or(ty_name);
                        let self_named = stripped == s.new_name;
                        (ctx.resolve_named(stripped, *ptr_level, &s.loc)?, self_named)
                    }
                    AliasTarget::FuncPtr { ret_ty_name, ptr_level, sig } => {
                        sig.args.analyse(scope, ctx, true, is_extern)?;
                        let ret = ctx.resolve_named(ret_ty_name, sig.ret_ptr_level, &s.loc)?;
                        let func = FunctionType {
                            name: None,
                            c_name: None,
                            params: sig.args.types(),
                            ret,
                        };
                        let level = (*ptr_level).max(1);
                        (DataType::CFunction(Rc::new(func)).with_ptr_level(level), false)
                    }
                };
                let ty = DataType::TypeDef(Box::new(TypeDefType {
                    name: s.new_name.clone(),
                    c_name: s.new_name.clone(),
                    old: TypeRef::Resolved(base),
                }));
                ctx.register_resolved(&s.new_name, ty.clone());
                // A self-named alias (`alias node = struct node`) would
                // collide with the aliased type's own slot; it lives in the
                // registry only.
                if !self_named {
                    s.entry = Some(declare(
                        scope,
                        &s.new_name,
                        s.new_name.clone(),
                        ty.clone(),
                        is_extern,
                        &s.loc,
                    )?);
                }
                s.ty = Some(ty);
                Ok(())
            }
            Statement::FunctionDecl(s) => {
                s.args.analyse(scope, ctx, false, is_extern)?;
                let c_name = generated_name(FUNC_PREFIX, &s.name, is_extern);
                let ret = ctx.resolve_named(&s.ret_ty_name, s.ret_ptr_level, &s.loc)?;
                let ty = DataType::CFunction(Rc::new(FunctionType {
                    name: Some(s.name.clone()),
                    c_name: Some(c_name.clone()),
                    params: s.args.types(),
                    ret,
                }));
                s.entry = Some(declare(scope, &s.name, c_name, ty.clone(), is_extern, &s.loc)?);
                s.ty = Some(ty);
                Ok(())
            }
            Statement::Print(s) => {
                for arg in &mut s.args {
                    arg.analyse(scope)?;
                }
                Ok(())
            }
            Statement::Return(s) => {
                s.value.analyse(scope)?;
                s.ty = Some(s.value.dtype().unwrap_return());
                Ok(())
            }
            Statement::Assign(s) => {
                let mut rhs_analysed = false;
                let lhs_entry = match &mut s.lhs {
                    Expr::Name { name, entry, .. } => match Scope::lookup(scope, name) {
                        Some(found) => {
                            *entry = Some(Rc::clone(&found));
                            found
                        }
                        None => {
                            // First use on the left side: implicit
                            // declaration, type inferred from the right side.
                            s.rhs.analyse(scope)?;
                            rhs_analysed = true;
                            let ty = s.rhs.dtype();
                            let c_name = format!("{VAR_PREFIX}{name}");
                            let created =
                                declare(scope, name, c_name, ty, false, &s.loc)?;
                            *entry = Some(Rc::clone(&created));
                            created
                        }
                    },
                    other => {
                        other.analyse(scope)?;
                        other.entry().expect("indexed target binds an entry")
                    }
                };
                if !rhs_analysed {
                    let target = lhs_entry.borrow().ty.clone();
                    s.rhs.analyse_for_target_type(&target, scope)?;
                }
                s.entry = Some(lhs_entry);
                Ok(())
            }
            Statement::Conditional(s) => {
                if let Some(cond) = &mut s.cond {
                    cond.analyse(scope)?;
                }
                for stmt in &mut s.body {
                    stmt.analyse(scope, ctx, is_extern)?;
                }
                if let Some(tail) = &mut s.tail {
                    analyse_conditional(tail, scope, ctx, is_extern)?;
                }
                Ok(())
            }
            Statement::For(s) => {
                s.start.analyse(scope)?;
                s.end.analyse(scope)?;
                // The counter is looked up, never redeclared.
                s.counter_entry = Some(Scope::lookup(scope, &s.counter).ok_or_else(|| {
                    CompileError::SymbolNotFound {
                        name: s.counter.clone(),
                        location: s.loc.clone(),
                    }
                })?);
                let body_scope = Scope::block(scope);
                for stmt in &mut s.body {
                    stmt.analyse(&body_scope, ctx, is_extern)?;
                }
                s.body_scope = Some(body_scope);
                Ok(())
            }
            Statement::While(s) => {
                s.cond.analyse(scope)?;
                let body_scope = Scope::block(scope);
                for stmt in &mut s.body {
                    stmt.analyse(&body_scope, ctx, is_extern)?;
                }
                s.body_scope = Some(body_scope);
                Ok(())
            }
            Statement::Expr(s) => s.expr.analyse(scope),
        }
    }

    /// The rescan pass. Declarations whose types still hold placeholders are
    /// re-resolved from the registry and written back into both the statement
    /// and the live scope entry. Returns whether anything changed.
    pub fn rescan(&mut self, _scope: &ScopeRef, ctx: &mut CompilationContext) -> bool {
        match self {
            Statement::VarDecl(s) => refresh_in_place(&mut s.ty, &s.entry, ctx),
            Statement::PtrDecl(s) => refresh_in_place(&mut s.ty, &s.entry, ctx),
            Statement::ArrayDecl(s) => refresh_in_place(&mut s.elem_ty, &s.entry, ctx),
            Statement::StructOrUnionDef(s) => {
                let member_scope = s
                    .scope
                    .clone()
                    .expect("struct definition rescanned before analysis");
                let mut progress = false;
                for member in &mut s.members {
                    progress |= member.rescan(&member_scope, ctx);
                }
                progress
            }
            Statement::ForwardDecl(s) => refresh_in_place(&mut s.ty, &s.entry, ctx),
            Statement::Alias(s) => {
                let progress = refresh_in_place(&mut s.ty, &s.entry, ctx);
                if progress {
                    if let Some(ty) = &s.ty {
                        // Keep the registry slot in step with the statement.
                        ctx.register_resolved(&s.new_name, ty.clone());
                    }
                }
                progress
            }
            Statement::FunctionDecl(s) => {
                let mut progress = s.args.rescan(ctx);
                progress |= refresh_in_place(&mut s.ty, &s.entry, ctx);
                progress
            }
            // Executable statements declare nothing rescannable.
            Statement::Print(_)
            | Statement::Return(_)
            | Statement::Assign(_)
            | Statement::Conditional(_)
            | Statement::For(_)
            | Statement::While(_)
            | Statement::Expr(_) => false,
        }
    }

    /// A placeholder that survived the rescan fixpoint, if any. The driver
    /// turns the first survivor into a fatal `UnresolvedType`.
    pub fn first_unresolved(&self) -> Option<(String, SourceLocation)> {
        let from_ty = |ty: &Option<DataType>, loc: &SourceLocation| {
            ty.as_ref()
                .and_then(|t| t.first_unresolved())
                .map(|name| (name.to_string(), loc.clone()))
        };
        match self {
            Statement::VarDecl(s) => from_ty(&s.ty, &s.loc),
            Statement::PtrDecl(s) => from_ty(&s.ty, &s.loc),
            Statement::ArrayDecl(s) => from_ty(&s.elem_ty, &s.loc),
            Statement::StructOrUnionDef(s) => {
                s.members.iter().find_map(|m| m.first_unresolved())
            }
            Statement::ForwardDecl(s) => from_ty(&s.ty, &s.loc),
            Statement::Alias(s) => from_ty(&s.ty, &s.loc),
            Statement::FunctionDecl(s) => from_ty(&s.ty, &s.loc).or_else(|| {
                s.args
                    .args
                    .iter()
                    .find_map(|a| from_ty(&a.ty, &a.loc))
            }),
            _ => None,
        }
    }

    /// Emit C text. Requires prior analysis; deterministic, so generating
    /// the same statement twice produces byte-identical output.
    pub fn generate(&self, w: &mut CodeWriter, scope: &ScopeRef) {
        match self {
            // Declarations add symbols and types, not statement-level code.
            Statement::VarDecl(_)
            | Statement::PtrDecl(_)
            | Statement::ArrayDecl(_)
            | Statement::StructOrUnionDef(_)
            | Statement::ForwardDecl(_)
            | Statement::Alias(_) => {}
            Statement::FunctionDecl(s) => {
                let entry = s.entry.as_ref().expect("generated before analysis");
                w.write_location(&s.loc);
                if entry.borrow().is_extern {
                    w.write_line(&format!("/* C function {} declared. */", s.name));
                }
            }
            Statement::Print(s) => generate_print(s, w),
            Statement::Return(s) => generate_return(s, w, scope),
            Statement::Assign(s) => generate_assign(s, w),
            Statement::Conditional(s) => generate_conditional(s, w, scope, "if"),
            Statement::For(s) => generate_for(s, w),
            Statement::While(s) => generate_while(s, w),
            Statement::Expr(s) => {
                w.write_location(&s.loc);
                w.write_line(&format!("{};", s.expr.c_code()));
            }
        }
    }
}

fn generated_name(prefix: &str, name: &str, is_extern: bool) -> String {
    if is_extern {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}

fn declare(
    scope: &ScopeRef,
    name: &str,
    c_name: String,
    ty: DataType,
    is_extern: bool,
    loc: &SourceLocation,
) -> Result<EntryRef> {
    scope
        .borrow_mut()
        .declare(name, c_name, ty, is_extern)
        .ok_or_else(|| CompileError::DuplicateSymbol {
            name: name.to_string(),
            location: loc.clone(),
        })
}

/// Re-resolve a declaration's stored type from the registry, writing the
/// result back into the statement and through the shared scope entry.
fn refresh_in_place(
    ty: &mut Option<DataType>,
    entry: &Option<EntryRef>,
    ctx: &CompilationContext,
) -> bool {
    let Some(current) = ty.as_ref() else {
        return false;
    };
    let Some(refreshed) = ctx.refresh(current) else {
        return false;
    };
    if let Some(entry) = entry {
        entry.borrow_mut().ty = refreshed.clone();
    }
    *ty = Some(refreshed);
    true
}

fn analyse_conditional(
    arm: &mut Conditional,
    scope: &ScopeRef,
    ctx: &mut CompilationContext,
    is_extern: bool,
) -> Result<()> {
    if let Some(cond) = &mut arm.cond {
        cond.analyse(scope)?;
    }
    for stmt in &mut arm.body {
        stmt.analyse(scope, ctx, is_extern)?;
    }
    if let Some(tail) = &mut arm.tail {
        analyse_conditional(tail, scope, ctx, is_extern)?;
    }
    Ok(())
}

fn generate_print(s: &Print, w: &mut CodeWriter) {
    w.write_location(&s.loc);
    let mut format_string = String::new();
    let mut rendered = Vec::with_capacity(s.args.len());
    for arg in &s.args {
        let ty = arg.dtype();
        format_string.push_str(ty.format_specifier());
        // Boxed values are rendered through `inspect`, never passed raw to
        // the formatter.
        if ty.is_object() {
            rendered.push(format!(
                "RSTRING_PTR(rb_funcall({}, rb_intern(\"inspect\"), 0, NULL))",
                arg.c_code()
            ));
        } else {
            rendered.push(arg.c_code());
        }
    }
    let mut line = format!("printf(\"{format_string}\"");
    for piece in &rendered {
        line.push_str(", ");
        line.push_str(piece);
    }
    line.push_str(");");
    w.write_line(&line);
}

fn generate_return(s: &Return, w: &mut CodeWriter, scope: &ScopeRef) {
    w.write_location(&s.loc);
    let value = s.value.c_code();
    let boxed_ret = Scope::enclosing_return_type(scope)
        .map(|ret| ret.is_object())
        .unwrap_or(false);
    if boxed_ret {
        let ty = s.ty.as_ref().expect("return generated before analysis");
        w.write_line(&format!("return {};", ty.to_boxed(&value)));
    } else {
        w.write_line(&format!("return {value};"));
    }
}

/// The assignment conversion matrix. Rules apply in precedence order and the
/// first match wins, so a specific conversion always beats the generic
/// passthrough.
fn generate_assign(s: &Assign, w: &mut CodeWriter) {
    w.write_location(&s.loc);
    let entry = s.entry.as_ref().expect("assignment generated before analysis");
    let target_ty = entry.borrow().ty.clone();

    // 1. Indexed assignment into a boxed container: an indexed-setter call
    //    with both index and value boxed.
    if let Expr::ElementRef { index, .. } = &s.lhs {
        if target_ty.is_object() {
            let boxed_index = index.dtype().to_boxed(&index.c_code());
            let boxed_value = s.rhs.dtype().to_boxed(&s.rhs.c_code());
            w.write_line(&format!(
                "rb_funcall({}, rb_intern(\"[]=\"), 2, {boxed_index}, {boxed_value});",
                entry.borrow().c_name
            ));
            return;
        }
    }

    let lhs_code = s.lhs.c_code();

    // 2. Literal source into a boxed target: box the literal directly.
    if target_ty.is_object() && s.rhs.is_literal() {
        let boxed = match &s.rhs {
            // Char literals box as single-character runtime strings.
            Expr::CharLit { value, .. } => {
                format!("rb_str_new2(\"{}\")", escape_c(&value.to_string()))
            }
            other => other.dtype().to_boxed(&other.c_code()),
        };
        w.write_line(&format!("{lhs_code} = {boxed};"));
        return;
    }

    let rhs_ty = s.rhs.dtype();
    let rhs_code = s.rhs.c_code();

    // 3. Char-pointer target receiving a boxed source: runtime string
    //    extraction.
    if target_ty.is_char_ptr() && rhs_ty.is_object() {
        w.write_line(&format!("{lhs_code} = StringValueCStr({rhs_code});"));
        return;
    }

    // 4. Function(-pointer) target with a plain-name source: copy the
    //    referenced function's generated name, no value conversion.
    if target_ty.base_is_c_function() && matches!(s.rhs, Expr::Name { .. }) {
        w.write_line(&format!("{lhs_code} = {rhs_code};"));
        return;
    }

    // 5. Integer target receiving a boxed source: unbox.
    if target_ty.is_int_like() && rhs_ty.is_object() {
        w.write_line(&format!("{lhs_code} = {};", target_ty.from_boxed(&rhs_code)));
        return;
    }

    // 6. Default: the native right-hand expression, unchanged.
    w.write_line(&format!("{lhs_code} = {rhs_code};"));
}

fn generate_conditional(arm: &Conditional, w: &mut CodeWriter, scope: &ScopeRef, keyword: &str) {
    match &arm.cond {
        Some(cond) => {
            let code = cond.c_code();
            // A boxed condition wraps in a truthiness test: everything but
            // the runtime's two falsey singletons (Qnil, Qfalse) is true.
            let cond_code = if cond.dtype().is_object() {
                format!("RTEST({code})")
            } else {
                code
            };
            w.block(&format!("{keyword} ({cond_code})"), |w| {
                for stmt in &arm.body {
                    stmt.generate(w, scope);
                }
            });
        }
        // The final else: no condition, always fires once reached.
        None => {
            w.block("else", |w| {
                for stmt in &arm.body {
                    stmt.generate(w, scope);
                }
            });
        }
    }
    if let Some(tail) = &arm.tail {
        let keyword = if tail.cond.is_some() { "else if" } else { "else" };
        generate_conditional(tail, w, scope, keyword);
    }
}

fn generate_for(s: &For, w: &mut CodeWriter) {
    let counter_entry = s
        .counter_entry
        .as_ref()
        .expect("loop generated before analysis");
    let counter = counter_entry.borrow().c_name.clone();
    let body_scope = s.body_scope.as_ref().expect("loop generated before analysis");

    let mut init = s.start.c_code();
    match s.start_op {
        CmpOp::Lt => init.push_str(" + 1"),
        CmpOp::Gt => init.push_str(" - 1"),
        CmpOp::Le | CmpOp::Ge => {}
    }
    let step = match s.end_op {
        CmpOp::Lt | CmpOp::Le => "++",
        CmpOp::Gt | CmpOp::Ge => "--",
    };
    let header = format!(
        "for ({counter} = {init}; {counter} {} {}; {counter}{step})",
        s.end_op.as_str(),
        s.end.c_code()
    );
    w.block(&header, |w| {
        for stmt in &s.body {
            stmt.generate(w, body_scope);
        }
    });
}

fn generate_while(s: &While, w: &mut CodeWriter) {
    let body_scope = s.body_scope.as_ref().expect("loop generated before analysis");
    // While conditions re-evaluate natively each iteration; no RTEST wrap
    // here, unlike conditionals.
    w.block(&format!("while ({})", s.cond.c_code()), |w| {
        for stmt in &s.body {
            stmt.generate(w, body_scope);
        }
    });
}

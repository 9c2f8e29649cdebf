//! Phase orchestration.
//!
//! The external driver feeds a parsed top-level statement sequence through
//! four phases in fixed total order: declare (analyse), rescan, verify,
//! generate. Compilation is single-threaded and sequential; the first fatal
//! error aborts the whole unit.

use crate::backend::writer::CodeWriter;
use crate::common::error::{CompileError, Result};
use crate::common::symbol_table::ScopeRef;
use crate::frontend::ast::statement::Statement;
use crate::frontend::sema::CompilationContext;

/// Compile one statement sequence to C text.
///
/// Generation of any statement may assume that every declaration it can
/// reference — including ones resolved only by rescan — has completed.
pub fn compile_unit(
    statements: &mut [Statement],
    scope: &ScopeRef,
    ctx: &mut CompilationContext,
) -> Result<String> {
    for stmt in statements.iter_mut() {
        stmt.analyse(scope, ctx, false)?;
    }
    rescan_to_fixpoint(statements, scope, ctx);
    for stmt in statements.iter() {
        if let Some((name, location)) = stmt.first_unresolved() {
            return Err(CompileError::UnresolvedType { name, location });
        }
    }
    let mut writer = CodeWriter::new();
    for stmt in statements.iter() {
        stmt.generate(&mut writer, scope);
    }
    Ok(writer.finish())
}

/// Repeat the rescan pass until no declaration makes progress. Mutually
/// recursive declarations resolve in at most one round per declaration, so
/// the round count is bounded by the statement count.
fn rescan_to_fixpoint(
    statements: &mut [Statement],
    scope: &ScopeRef,
    ctx: &mut CompilationContext,
) {
    let mut rounds = statements.len() + 1;
    while rounds > 0 {
        let mut progress = false;
        for stmt in statements.iter_mut() {
            progress |= stmt.rescan(scope, ctx);
        }
        if !progress {
            break;
        }
        rounds -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::source::SourceLocation;
    use crate::common::symbol_table::Scope;
    use crate::common::types::{AggregateKind, DataType};
    use crate::frontend::ast::expr::Expr;
    use crate::frontend::ast::statement::{
        AliasDecl, AliasTarget, CmpOp, For, ForwardDecl, Print, PtrDecl, StructOrUnionDef,
        VarDecl,
    };

    fn loc(line: u32) -> SourceLocation {
        SourceLocation::new("test.rbx", line)
    }

    fn var_decl(ty_name: &str, name: &str, line: u32) -> Statement {
        Statement::VarDecl(VarDecl {
            ty_name: ty_name.into(),
            name: name.into(),
            value: None,
            ty: None,
            entry: None,
            loc: loc(line),
        })
    }

    fn ptr_member(ty_name: &str, name: &str, line: u32) -> Statement {
        Statement::PtrDecl(PtrDecl {
            ty_name: ty_name.into(),
            ptr_level: 1,
            func_ptr: None,
            name: name.into(),
            value: None,
            ty: None,
            entry: None,
            loc: loc(line),
        })
    }

    fn struct_def(name: &str, members: Vec<Statement>, line: u32) -> Statement {
        Statement::StructOrUnionDef(StructOrUnionDef {
            kind: AggregateKind::Struct,
            name: name.into(),
            members,
            ty: None,
            scope: None,
            entry: None,
            loc: loc(line),
        })
    }

    /// The type a struct definition's member resolved to, by member name.
    fn member_type(stmt: &Statement, member: &str) -> DataType {
        match stmt {
            Statement::StructOrUnionDef(s) => {
                let scope = s.scope.as_ref().expect("analysed");
                Scope::lookup(scope, member).expect("member").borrow().ty.clone()
            }
            other => panic!("expected a struct definition, got {other:?}"),
        }
    }

    #[test]
    fn self_referential_struct_resolves_through_forward_declaration() {
        let scope = Scope::root("main");
        let mut ctx = CompilationContext::new();
        let mut stmts = vec![
            Statement::ForwardDecl(ForwardDecl::new(
                AggregateKind::Struct,
                "node",
                loc(1),
                &mut ctx,
            )),
            struct_def(
                "node",
                vec![ptr_member("node", "next", 3), var_decl("int", "value", 4)],
                2,
            ),
        ];
        compile_unit(&mut stmts, &scope, &mut ctx).unwrap();

        match member_type(&stmts[1], "next") {
            DataType::CPtr(base) => match *base {
                DataType::CStructOrUnion(s) => assert_eq!(s.c_name, "rbx_t_main_node"),
                other => panic!("pointer base still abstract: {other:?}"),
            },
            other => panic!("expected a pointer member, got {other:?}"),
        }
        assert!(stmts.iter().all(|s| s.first_unresolved().is_none()));

        // The forward declaration reserved the scope slot; the definition
        // resolved that same entry in place.
        let slot = Scope::lookup(&scope, "node").unwrap();
        assert!(matches!(
            slot.borrow().ty.unwrap_alias(),
            DataType::CStructOrUnion(_)
        ));
    }

    #[test]
    fn mutually_recursive_structs_resolve() {
        let scope = Scope::root("main");
        let mut ctx = CompilationContext::new();
        let mut stmts = vec![
            Statement::ForwardDecl(ForwardDecl::new(
                AggregateKind::Struct,
                "leaf",
                loc(1),
                &mut ctx,
            )),
            Statement::ForwardDecl(ForwardDecl::new(
                AggregateKind::Struct,
                "branch",
                loc(2),
                &mut ctx,
            )),
            struct_def("leaf", vec![ptr_member("branch", "up", 4)], 3),
            struct_def("branch", vec![ptr_member("leaf", "down", 6)], 5),
        ];
        compile_unit(&mut stmts, &scope, &mut ctx).unwrap();

        match member_type(&stmts[2], "up") {
            DataType::CPtr(base) => match *base {
                DataType::CStructOrUnion(s) => assert_eq!(s.name, "branch"),
                other => panic!("pointer base still abstract: {other:?}"),
            },
            other => panic!("expected a pointer member, got {other:?}"),
        }
        match member_type(&stmts[3], "down") {
            DataType::CPtr(base) => match *base {
                DataType::CStructOrUnion(s) => assert_eq!(s.name, "leaf"),
                other => panic!("pointer base still abstract: {other:?}"),
            },
            other => panic!("expected a pointer member, got {other:?}"),
        }
    }

    #[test]
    fn unknown_member_type_is_fatal_unless_declared_somewhere_in_the_unit() {
        // Never declared anywhere: the declare pass fails outright.
        let scope = Scope::root("main");
        let mut ctx = CompilationContext::new();
        let mut stmts = vec![struct_def("holder", vec![var_decl("blob", "b", 2)], 1)];
        assert!(matches!(
            compile_unit(&mut stmts, &scope, &mut ctx),
            Err(CompileError::UnresolvedType { name, .. }) if name == "blob"
        ));

        // Same unit with the type declared later: the alias registers its
        // placeholder at construction, so the declare pass succeeds and the
        // rescan pass tightens the member.
        let scope = Scope::root("main");
        let mut ctx = CompilationContext::new();
        let mut stmts = vec![
            struct_def("holder", vec![var_decl("blob", "b", 2)], 1),
            Statement::Alias(AliasDecl::new(
                "blob",
                AliasTarget::Type { ty_name: "int".into(), ptr_level: 0 },
                loc(3),
                &mut ctx,
            )),
        ];
        compile_unit(&mut stmts, &scope, &mut ctx).unwrap();
        assert!(member_type(&stmts[0], "b").is_int_like());
    }

    #[test]
    fn generated_unit_text_is_exact() {
        let scope = Scope::root("main");
        let mut ctx = CompilationContext::new();
        let mut stmts = vec![
            var_decl("int", "i", 1),
            Statement::For(For {
                start: Expr::IntLit { value: 0, loc: loc(2) },
                start_op: CmpOp::Lt,
                counter: "i".into(),
                end_op: CmpOp::Lt,
                end: Expr::IntLit { value: 3, loc: loc(2) },
                body: vec![Statement::Print(Print {
                    args: vec![Expr::Name { name: "i".into(), entry: None, loc: loc(3) }],
                    loc: loc(3),
                })],
                counter_entry: None,
                body_scope: None,
                loc: loc(2),
            }),
        ];
        let out = compile_unit(&mut stmts, &scope, &mut ctx).unwrap();
        assert_eq!(
            out,
            "for (rbx_v_i = 0 + 1; rbx_v_i < 3; rbx_v_i++) {\n\
             \x20 /* test.rbx:3 */\n\
             \x20 printf(\"%d\", rbx_v_i);\n\
             }\n"
        );
    }
}

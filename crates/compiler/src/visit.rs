//! Generic AST traversal
//!
//! A pre-order walker over chunks, statements, and expressions.
//! Implementors override the hooks they care about; the walk functions
//! handle recursion into every child position so scanners cannot miss
//! a construct. Hooks return `Result` so a scanner can abort the walk
//! with an error.

use crate::ast::{Block, Chunk, Expr, Stmt, TableEntry};

/// Visitor hooks. Both default to "do nothing".
pub trait Visit {
    fn visit_stmt(&mut self, _stmt: &Stmt) -> Result<(), String> {
        Ok(())
    }

    fn visit_expr(&mut self, _expr: &Expr) -> Result<(), String> {
        Ok(())
    }
}

pub fn walk_chunk<V: Visit>(visitor: &mut V, chunk: &Chunk) -> Result<(), String> {
    walk_block(visitor, &chunk.block)
}

pub fn walk_block<V: Visit>(visitor: &mut V, block: &Block) -> Result<(), String> {
    for stmt in &block.stmts {
        walk_stmt(visitor, stmt)?;
    }
    Ok(())
}

pub fn walk_stmt<V: Visit>(visitor: &mut V, stmt: &Stmt) -> Result<(), String> {
    visitor.visit_stmt(stmt)?;
    match stmt {
        Stmt::LocalAssign { values, .. } => {
            for value in values {
                walk_expr(visitor, value)?;
            }
        }
        Stmt::Assign {
            targets, values, ..
        } => {
            for expr in targets.iter().chain(values) {
                walk_expr(visitor, expr)?;
            }
        }
        Stmt::LocalFunction { body, .. } | Stmt::Function { body, .. } => {
            walk_block(visitor, &body.body)?;
        }
        Stmt::CallStmt { call, .. } => walk_expr(visitor, call)?,
        Stmt::If {
            cond,
            then_body,
            elseifs,
            else_body,
            ..
        } => {
            walk_expr(visitor, cond)?;
            walk_block(visitor, then_body)?;
            for elseif in elseifs {
                walk_expr(visitor, &elseif.cond)?;
                walk_block(visitor, &elseif.body)?;
            }
            if let Some(body) = else_body {
                walk_block(visitor, body)?;
            }
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(visitor, cond)?;
            walk_block(visitor, body)?;
        }
        Stmt::Repeat { body, until, .. } => {
            walk_block(visitor, body)?;
            walk_expr(visitor, until)?;
        }
        Stmt::NumericFor {
            start,
            stop,
            step,
            body,
            ..
        } => {
            walk_expr(visitor, start)?;
            walk_expr(visitor, stop)?;
            if let Some(step) = step {
                walk_expr(visitor, step)?;
            }
            walk_block(visitor, body)?;
        }
        Stmt::GenericFor { exprs, body, .. } => {
            for expr in exprs {
                walk_expr(visitor, expr)?;
            }
            walk_block(visitor, body)?;
        }
        Stmt::Return { values, .. } => {
            for value in values {
                walk_expr(visitor, value)?;
            }
        }
        Stmt::Break { .. } => {}
        Stmt::Do { body, .. } => walk_block(visitor, body)?,
    }
    Ok(())
}

pub fn walk_expr<V: Visit>(visitor: &mut V, expr: &Expr) -> Result<(), String> {
    visitor.visit_expr(expr)?;
    match expr {
        Expr::Call { func, args, .. } => {
            walk_expr(visitor, func)?;
            for arg in args {
                walk_expr(visitor, arg)?;
            }
        }
        Expr::MethodCall { object, args, .. } => {
            walk_expr(visitor, object)?;
            for arg in args {
                walk_expr(visitor, arg)?;
            }
        }
        Expr::Index { value, key } => {
            walk_expr(visitor, value)?;
            walk_expr(visitor, key)?;
        }
        Expr::Field { value, .. } => walk_expr(visitor, value)?,
        Expr::Table(entries) => {
            for entry in entries {
                match entry {
                    TableEntry::Item(value) | TableEntry::Named(_, value) => {
                        walk_expr(visitor, value)?;
                    }
                    TableEntry::Keyed(key, value) => {
                        walk_expr(visitor, key)?;
                        walk_expr(visitor, value)?;
                    }
                }
            }
        }
        Expr::Function(body) => walk_block(visitor, &body.body)?,
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(visitor, lhs)?;
            walk_expr(visitor, rhs)?;
        }
        Expr::Unary { operand, .. } => walk_expr(visitor, operand)?,
        Expr::Nil
        | Expr::True
        | Expr::False
        | Expr::Number(_)
        | Expr::Str(_)
        | Expr::Varargs
        | Expr::Name(_) => {}
    }
    Ok(())
}

use super::ctx::{Binding, FuncCtx, LoopTargets};
use crate::{
    diag::LowerDiagnosticKind,
    hir::{Block as HirBlock, Expr, Place, Stmt, StmtKind},
    ice, LowerError,
};

use kiln_ssa::{Inst, Ty, Value};

impl FuncCtx<'_> {
    pub fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        match &stmt.kind {
            StmtKind::Let { local, init } => {
                let value = match init {
                    Some(init) => self.lower_expr(init)?,
                    None => None,
                };
                self.at(stmt.span, stmt.node);
                self.bind_local(*local, value);
            }
            StmtKind::Assign { place, value } => self.lower_assign(stmt, place, value)?,
            StmtKind::Expr(expr) => {
                self.lower_expr(expr)?;
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(value) => self.lower_expr(value)?,
                    None => None,
                };
                self.at(stmt.span, stmt.node);
                self.emit_return(value);
                self.enter_dead_block();
            }
            StmtKind::Break => self.jump(stmt, false),
            StmtKind::Continue => self.jump(stmt, true),
            StmtKind::Loop { cond, body, step } => {
                self.lower_loop(stmt, cond.as_ref(), body, step.as_ref())?
            }
        }
        Ok(())
    }

    /// Terminates the cursor with a `ret` of the function's return type.
    pub fn emit_return(&mut self, value: Option<Value>) {
        let ret = self.builder.func().ret;
        if ret == Ty::Void {
            self.builder.ret(None);
        } else {
            let value = match value {
                Some(value) => value,
                None => self.undef(ret),
            };
            self.builder.ret(Some(value));
        }
    }

    fn lower_assign(&mut self, stmt: &Stmt, place: &Place, value: &Expr) -> Result<(), LowerError> {
        match place {
            Place::Local(local) => {
                let value = self.lower_expr(value)?;
                self.at(stmt.span, stmt.node);
                match self.scopes.lookup(*local) {
                    Some(Binding::Slot { ptr, .. }) => {
                        if let Some(value) = value {
                            self.ins(Inst::store(ptr, value));
                        }
                    }
                    Some(Binding::Unit) => {}
                    Some(Binding::Value(_)) => {
                        return Err(ice(
                            stmt.span,
                            format!(
                                "assignment to immutable local `{}`",
                                self.body.local(*local).name
                            ),
                        ))
                    }
                    None => {
                        let message = format!(
                            "`{}` is not bound at this point",
                            self.body.local(*local).name
                        );
                        self.report(LowerDiagnosticKind::UnboundIdentifier, stmt.span, &message);
                    }
                }
            }
            Place::Global(name) => {
                let value = self.lower_expr(value)?;
                self.at(stmt.span, stmt.node);
                if self.env.global(name).is_none() {
                    let message = format!("no global named `{}`", name);
                    self.report(LowerDiagnosticKind::UnboundIdentifier, stmt.span, &message);
                } else if let Some(value) = value {
                    let addr = self.ins(Inst::GlobalAddr(name.as_str().into()));
                    self.ins(Inst::store(addr, value));
                }
            }
            Place::Field { base, index } => {
                let ptr = self.lower_value(base)?;
                let value = self.lower_expr(value)?;
                self.at(stmt.span, stmt.node);
                let agg = self.env.agg(base.ty).ok_or_else(|| {
                    ice(
                        stmt.span,
                        format!("field store into `{}`", self.env.display(base.ty)),
                    )
                })?;
                if let Some(value) = value {
                    let field = self.ins(Inst::GetFieldPtr {
                        agg,
                        ptr,
                        index: *index,
                    });
                    self.ins(Inst::store(field, value));
                }
            }
        }
        Ok(())
    }

    /// Lowers `break` (or `continue`) to a jump to the innermost loop.
    fn jump(&mut self, stmt: &Stmt, is_continue: bool) {
        self.at(stmt.span, stmt.node);
        match self.loops.last().copied() {
            Some(targets) if is_continue => {
                self.builder.br(targets.continue_block);
            }
            Some(targets) => {
                self.builder.br(targets.break_block);
            }
            None => {
                let (kind, message) = if is_continue {
                    (
                        LowerDiagnosticKind::ContinueOutsideLoop,
                        "`continue` can only be used inside a loop body",
                    )
                } else {
                    (
                        LowerDiagnosticKind::BreakOutsideLoop,
                        "`break` can only be used inside a loop body",
                    )
                };
                self.report(kind, stmt.span, message);
                self.builder.unreachable();
            }
        }
        self.enter_dead_block();
    }

    /// ```text
    /// entry ──> loop.cond ──> loop.body ──> loop.step ──┐
    ///              ^  │                                 │
    ///              │  └──> loop.exit                    │
    ///              └────────────────────────────────────┘
    /// ```
    ///
    /// Without a condition the body is the loop header; without a step the
    /// body jumps straight back to the header.
    fn lower_loop(
        &mut self,
        stmt: &Stmt,
        cond: Option<&Expr>,
        body: &HirBlock,
        step: Option<&HirBlock>,
    ) -> Result<(), LowerError> {
        self.at(stmt.span, stmt.node);
        let cond_block = cond.map(|_| self.builder.create_block("loop.cond"));
        let body_block = self.builder.create_block("loop.body");
        let step_block = step.map(|_| self.builder.create_block("loop.step"));
        let exit = self.builder.create_block("loop.exit");

        let header = cond_block.unwrap_or(body_block);
        self.builder.br(header);

        if let Some(cond) = cond {
            self.builder.switch_to_block(header);
            let cond = self.lower_value(cond)?;
            self.at(stmt.span, stmt.node);
            self.builder.cond_br(cond, body_block, exit);
        }

        let continue_block = step_block.unwrap_or(header);
        self.loops.push(LoopTargets {
            break_block: exit,
            continue_block,
        });
        self.builder.switch_to_block(body_block);
        self.lower_block(body)?;
        self.at(stmt.span, stmt.node);
        self.builder.br(continue_block);
        self.loops.pop();

        if let (Some(step_block), Some(step)) = (step_block, step) {
            self.builder.switch_to_block(step_block);
            self.lower_block(step)?;
            self.at(stmt.span, stmt.node);
            self.builder.br(header);
        }

        self.builder.switch_to_block(exit);
        Ok(())
    }
}

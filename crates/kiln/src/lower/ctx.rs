use super::env::LowerEnv;
use crate::{
    diag::{LowerDiagnostic, LowerDiagnosticKind, Reporter},
    hir::{self, Local},
};

use kiln_entity::SecondaryMap;
use kiln_sourcemap::SourceSpan;
use kiln_ssa::{builder::FunctionBuilder, Block, Inst, NodeId, Ty, Value};

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// How a local is materialized in the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// An immutable local bound directly to the value of its initializer.
    Value(Value),
    /// A local kept in a stack slot, read with `load` and written with `store`.
    Slot { ptr: Value, ty: Ty },
    /// A local of a type without runtime representation.
    Unit,
}

// ---------------------------------------------------------------------------
// ScopeStack
// ---------------------------------------------------------------------------

/// The bindings visible at the cursor, one frame per lexical scope.
#[derive(Default)]
pub struct ScopeStack {
    frames: Vec<Vec<Local>>,
    bindings: SecondaryMap<Local, Option<Binding>>,
}

impl ScopeStack {
    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Leaves the innermost scope, hiding every local declared in it.
    pub fn pop(&mut self) {
        if let Some(frame) = self.frames.pop() {
            for local in frame {
                self.bindings[local] = None;
            }
        }
    }

    pub fn bind(&mut self, local: Local, binding: Binding) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(local);
        }
        self.bindings[local] = Some(binding);
    }

    pub fn lookup(&self, local: Local) -> Option<Binding> {
        *self.bindings.get(local)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

// ---------------------------------------------------------------------------
// FuncCtx
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct LoopTargets {
    pub break_block: Block,
    pub continue_block: Block,
}

/// Lowering state of one function. Dropped once the function is built.
pub struct FuncCtx<'a> {
    pub env: &'a LowerEnv<'a>,
    pub body: &'a hir::Body,
    pub builder: FunctionBuilder,
    pub scopes: ScopeStack,
    pub loops: Vec<LoopTargets>,
    pub diagnostics: Vec<LowerDiagnostic>,
}

impl<'a> FuncCtx<'a> {
    pub fn new(env: &'a LowerEnv<'a>, body: &'a hir::Body) -> Self {
        let ret = env.ty(body.ret);
        Self {
            env,
            body,
            builder: FunctionBuilder::new(body.name.as_str(), ret, body.span, body.node),
            scopes: ScopeStack::default(),
            loops: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Attributes the instructions emitted next to a syntax node.
    #[inline]
    pub fn at(&mut self, span: SourceSpan, node: NodeId) {
        self.builder.set_location(span, node);
    }

    #[inline]
    pub fn ins(&mut self, inst: Inst) -> Value {
        self.builder.ins(inst)
    }

    pub fn report(&mut self, kind: LowerDiagnosticKind, span: SourceSpan, message: &str) {
        log::trace!("{}: {:?} at {}: {}", self.body.name, kind, span, message);
        self.diagnostics.report(kind, span, message);
    }

    /// Moves the cursor to a fresh block no edge leads to. Code lowered
    /// there is dropped before SSA construction.
    pub fn enter_dead_block(&mut self) {
        let block = self.builder.create_block("dead");
        self.builder.switch_to_block(block);
    }

    /// Closes the current block if control can no longer reach it.
    pub fn seal_dead_block(&mut self) {
        if !self.builder.is_terminated() {
            self.builder.unreachable();
        }
    }

    /// Binds `local` to `value`, the result of its initializer (if any).
    /// Mutable, captured and uninitialized locals get a stack slot.
    pub fn bind_local(&mut self, local: Local, value: Option<Value>) {
        let body = self.body;
        let decl = body.local(local);
        let ty = self.env.ty(decl.ty);
        let binding = if ty == Ty::Void {
            Binding::Unit
        } else if decl.mutable || decl.captured || value.is_none() {
            let ptr = self.builder.alloca(ty, decl.captured);
            if let Some(value) = value {
                self.ins(Inst::store(ptr, value));
            }
            Binding::Slot { ptr, ty }
        } else {
            Binding::Value(value.unwrap_or_else(|| self.builder.ins(Inst::Undef(ty))))
        };
        self.scopes.bind(local, binding);
    }

    /// An `undef` of type `ty`, used in place of a value that cannot be
    /// computed.
    pub fn undef(&mut self, ty: Ty) -> Value {
        self.ins(Inst::Undef(ty))
    }
}

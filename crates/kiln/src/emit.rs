//! Drives the lowering of a whole module and packages the result.

use crate::{
    ast::{self, Ast, ItemKind, ItemRef, Literal, UnaryOp},
    cache::{CacheEntry, LoweringCache},
    diag::Reporter,
    hir::{self, stamp::stamp},
    ice,
    lower::{env::LowerEnv, lower_body, Lowered},
    ssa, LowerError,
};

use kiln_ssa::{verify::verify_function, Const, FuncId, Function, Module, NodeId, SemanticTag, Ty};
use rayon::prelude::*;

use std::sync::Arc;

// ---------------------------------------------------------------------------
// LowerOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LowerOptions {
    /// Lower function items on the rayon thread pool.
    pub parallel: bool,
    /// Abort once this many diagnostics have been reported. A clean module
    /// never aborts, even with a budget of zero.
    pub max_diagnostics: Option<usize>,
    /// Run the IR verifier on every lowered function.
    pub verify: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_diagnostics: None,
            verify: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Lowers every item of `ast` into a module named `name`.
///
/// Function bodies are lowered independently, in parallel unless disabled.
/// Recoverable diagnostics are forwarded to `reporter` in declaration order.
/// If several items fail fatally, the error of the first one in declaration
/// order is returned.
pub fn lower_module(
    ast: &Ast,
    name: &str,
    options: &LowerOptions,
    cache: Option<&LoweringCache>,
    reporter: &mut dyn Reporter,
) -> Result<Module, LowerError> {
    let env = LowerEnv::new(ast);
    let items: Vec<ItemRef> = ast.items.keys().collect();

    let lower = |item: &ItemRef| lower_item(&env, *item, options, cache);
    let results: Vec<_> = if options.parallel {
        items.par_iter().map(lower).collect()
    } else {
        items.iter().map(lower).collect()
    };

    let mut emitter = ModuleEmitter::new(name, &env);
    let mut reported = 0;
    for (item, result) in items.into_iter().zip(results) {
        let entry = result?;
        if let Some(entry) = &entry {
            for diagnostic in entry.diagnostics.iter() {
                reporter.report(diagnostic.kind, diagnostic.span, &diagnostic.message);
                reported += 1;
            }
            if reported > 0 && options.max_diagnostics.is_some_and(|max| reported >= max) {
                log::debug!("diagnostics budget exhausted after {} reports", reported);
                return Err(LowerError::Aborted { reported });
            }
        }
        emitter.item(item, entry)?;
    }
    Ok(emitter.finish())
}

/// Runs the per-function pipeline. Returns `None` for items without a body.
fn lower_item(
    env: &LowerEnv<'_>,
    item: ItemRef,
    options: &LowerOptions,
    cache: Option<&LoweringCache>,
) -> Result<Option<CacheEntry>, LowerError> {
    let Some(body) = hir::desugar(env.ast, item)? else {
        return Ok(None);
    };
    let stamp = stamp(env.fingerprint, &body);
    if let Some(entry) = cache.and_then(|cache| cache.get(&body.name, stamp)) {
        log::trace!("`{}`: reusing cached lowering", body.name);
        return Ok(Some(entry));
    }

    let Lowered {
        mut func,
        diagnostics,
    } = lower_body(env, &body)?;
    ssa::construct(&mut func);
    if options.verify {
        verify_function(&func, &env.types).map_err(|source| LowerError::Verify {
            function: body.name.clone(),
            source,
        })?;
    }

    let entry = CacheEntry::new(stamp, func, diagnostics);
    Ok(Some(match cache {
        Some(cache) => cache.insert(&body.name, entry),
        None => entry,
    }))
}

// ---------------------------------------------------------------------------
// ModuleEmitter
// ---------------------------------------------------------------------------

/// Collects globals, declarations and lowered functions into a [`Module`].
pub struct ModuleEmitter<'a> {
    env: &'a LowerEnv<'a>,
    module: Module,
}

impl<'a> ModuleEmitter<'a> {
    pub fn new(name: &str, env: &'a LowerEnv<'a>) -> Self {
        Self {
            env,
            module: Module::new(name, env.types.clone()),
        }
    }

    /// Adds `item`. `lowered` is the lowered body of a function item.
    pub fn item(&mut self, item: ItemRef, lowered: Option<CacheEntry>) -> Result<(), LowerError> {
        let ast = self.env.ast;
        let item = &ast.items[item];
        let name = ast.resolve(item.name).unwrap_or_default();

        match (&item.kind, lowered) {
            (ItemKind::Function { .. }, Some(entry)) => {
                self.module.functions.push(entry.func);
            }
            (ItemKind::Function { params, ret, .. }, None) => {
                let params: Vec<Ty> = params
                    .iter()
                    .map(|param| self.env.ty(param.ty))
                    .filter(|ty| *ty != Ty::Void)
                    .collect();
                let func = Function::declaration(name, &params, self.env.ty(*ret), item.span, item.node);
                self.module.functions.push(Arc::new(func));
            }
            (ItemKind::Global { ty, init, .. }, _) => {
                let init = match init {
                    Some(init) => self.constant(*init)?,
                    None => Const::Zero,
                };
                self.module.globals.push(kiln_ssa::GlobalData {
                    name: name.into(),
                    ty: self.env.ty(*ty),
                    init,
                });
            }
        }
        Ok(())
    }

    /// Evaluates the initializer of a global. Only literals, optionally
    /// negated, are accepted.
    fn constant(&self, expr: ast::ExprRef) -> Result<Const, LowerError> {
        let ast = self.env.ast;
        let e = &ast.exprs[expr];
        let value = match &e.kind {
            ast::ExprKind::Literal(Literal::Int(value)) => Const::Int(*value),
            ast::ExprKind::Literal(Literal::Float(value)) => Const::Float(value.to_bits()),
            ast::ExprKind::Literal(Literal::Bool(value)) => Const::Bool(*value),
            ast::ExprKind::Literal(Literal::Str(symbol)) => {
                Const::Str(ast.resolve(*symbol).unwrap_or_default().into())
            }
            ast::ExprKind::Literal(Literal::Unit) => Const::Zero,
            ast::ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match self.constant(*operand)? {
                Const::Int(value) => Const::Int(value.wrapping_neg()),
                Const::Float(bits) => Const::Float((-f64::from_bits(bits)).to_bits()),
                _ => return Err(ice(e.span, "negated non-numeric constant")),
            },
            _ => return Err(ice(e.span, "global initializer is not a constant")),
        };
        Ok(value)
    }

    /// Attaches `tag` to every value of `func` lowered from `node`. Returns
    /// how many values were tagged.
    pub fn tag_node(&mut self, func: FuncId, node: NodeId, tag: SemanticTag) -> usize {
        let func = Arc::make_mut(&mut self.module.functions[func]);
        let values = func.values_for_node(node);
        for value in &values {
            func.attach_tag(*value, tag.clone());
        }
        values.len()
    }

    pub fn finish(self) -> Module {
        self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        fixture::*,
        tree::{load, BinaryOpTree, ExprKindTree, ItemTree, TypeTree, UnaryOpTree},
    };

    use kiln_entity::EntityRef;

    fn global(name: &str, ty: TypeTree, init: Option<ast::tree::ExprTree>) -> ItemTree {
        ItemTree::Global {
            name: name.to_string(),
            ty,
            mutable: false,
            init,
            span: None,
        }
    }

    fn negate(value: ast::tree::ExprTree) -> ast::tree::ExprTree {
        let ty = value.ty.clone();
        expr(
            ExprKindTree::Unary {
                op: UnaryOpTree::Neg,
                operand: Box::new(value),
            },
            ty,
        )
    }

    #[test]
    fn global_initializers_fold_to_constants() {
        let half = expr(ExprKindTree::Float(0.5), TypeTree::Float);
        let ast = load(&module(vec![
            global("zero", TypeTree::Int, None),
            global("neg", TypeTree::Int, Some(negate(int(3)))),
            global("half", TypeTree::Float, Some(negate(half))),
            global("yes", TypeTree::Bool, Some(boolean(true))),
        ]))
        .unwrap();
        let module = lower_module(&ast, "consts", &LowerOptions::default(), None, &mut ()).unwrap();

        assert_eq!(&*module.name, "consts");
        assert_eq!(module.global("zero").unwrap().init, Const::Zero);
        assert_eq!(module.global("neg").unwrap().init, Const::Int(-3));
        assert_eq!(
            module.global("half").unwrap().init,
            Const::Float((-0.5f64).to_bits())
        );
        assert_eq!(module.global("yes").unwrap().init, Const::Bool(true));
        assert!(module.functions.is_empty());
    }

    #[test]
    fn non_constant_global_initializers_are_rejected() {
        let sum = binary(BinaryOpTree::Add, int(1), int(2), TypeTree::Int);
        let ast = load(&module(vec![global("three", TypeTree::Int, Some(sum))])).unwrap();

        let result = lower_module(&ast, "m", &LowerOptions::default(), None, &mut ());
        assert!(matches!(result, Err(LowerError::Internal(_))));
    }

    #[test]
    fn tags_every_value_lowered_from_a_node() {
        let sum = binary(
            BinaryOpTree::Add,
            local(0, "a", TypeTree::Int),
            local(1, "b", TypeTree::Int),
            TypeTree::Int,
        );
        let ast = load(&module(vec![function(
            "add",
            vec![param(0, "a", TypeTree::Int), param(1, "b", TypeTree::Int)],
            TypeTree::Int,
            block(vec![], Some(sum)),
        )]))
        .unwrap();
        let env = LowerEnv::new(&ast);
        let options = LowerOptions::default();

        let mut emitter = ModuleEmitter::new("tagged", &env);
        for item in ast.items.keys() {
            let entry = lower_item(&env, item, &options, None).unwrap();
            emitter.item(item, entry).unwrap();
        }

        let node = ast
            .exprs
            .values()
            .find(|e| matches!(e.kind, ast::ExprKind::Binary { .. }))
            .unwrap()
            .node;
        let tag = SemanticTag::new("origin", "sum");
        assert_eq!(emitter.tag_node(FuncId::new(0), node, tag.clone()), 1);

        let module = emitter.finish();
        let func = module.function("add").unwrap();
        let tagged: Vec<_> = func.tags.values().flatten().collect();
        assert_eq!(tagged, [&tag]);
    }
}

use crate::ast::{Ast, ItemKind, Type, TypeId};

use kiln_entity::SecondaryMap;
use kiln_ssa::{AggData, AggId, Ty, TypeTable};
use rustc_hash::FxHashMap;

// ---------------------------------------------------------------------------
// LowerEnv
// ---------------------------------------------------------------------------

/// Module-wide, read-only context shared by every function lowering.
///
/// The IR layout of every static type is computed up front, so that lowering
/// functions in parallel never needs to intern new aggregates.
pub struct LowerEnv<'a> {
    pub ast: &'a Ast,
    pub types: TypeTable,
    tys: SecondaryMap<TypeId, Ty>,
    aggs: SecondaryMap<TypeId, Option<AggId>>,
    globals: FxHashMap<&'a str, TypeId>,
    pub fingerprint: u64,
}

impl<'a> LowerEnv<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        let mut types = TypeTable::new();
        let mut tys = SecondaryMap::new();
        let mut aggs = SecondaryMap::new();

        // Ids are interned bottom-up, so the payloads of a result always come
        // before the result itself.
        for (id, ty) in ast.types.iter() {
            tys[id] = match ty {
                Type::Unit | Type::Never => Ty::Void,
                Type::Bool => Ty::I1,
                Type::Int => Ty::I64,
                Type::Float => Ty::F64,
                Type::Str => Ty::Ptr,
                Type::Data(data) => {
                    let name = ast.resolve(ast.types.data(*data).name).unwrap_or("data");
                    aggs[id] = Some(types.intern(AggData::data(name, Vec::new())));
                    Ty::Ptr
                }
                Type::Result { ok, err } => {
                    let name = ast.types.display(id, &ast.interner);
                    let agg = types.intern(AggData::result(name, tys[*ok], tys[*err]));
                    aggs[id] = Some(agg);
                    Ty::Agg(agg)
                }
            };
        }

        for (id, ty) in ast.types.iter() {
            if let (Type::Data(data), Some(agg)) = (ty, aggs[id]) {
                let fields = ast
                    .types
                    .data(*data)
                    .fields
                    .iter()
                    .map(|(_, ty)| tys[*ty])
                    .collect();
                types.set_fields(agg, fields);
            }
        }

        let globals = ast
            .items
            .values()
            .filter_map(|item| match item.kind {
                ItemKind::Global { ty, .. } => Some((ast.resolve(item.name)?, ty)),
                ItemKind::Function { .. } => None,
            })
            .collect();

        Self {
            ast,
            types,
            tys,
            aggs,
            globals,
            fingerprint: crate::hir::stamp::fingerprint(ast),
        }
    }

    /// The IR type values of `ty` are represented with.
    #[inline]
    pub fn ty(&self, ty: TypeId) -> Ty {
        *self.tys.get(ty)
    }

    /// The aggregate layout of a data or result type.
    #[inline]
    pub fn agg(&self, ty: TypeId) -> Option<AggId> {
        *self.aggs.get(ty)
    }

    #[inline]
    pub fn kind(&self, ty: TypeId) -> Type {
        self.ast.types[ty]
    }

    pub fn global(&self, name: &str) -> Option<TypeId> {
        self.globals.get(name).copied()
    }

    pub fn display(&self, ty: TypeId) -> String {
        self.ast.types.display(ty, &self.ast.interner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ssa::AggKind;

    #[test]
    fn maps_static_types_to_ir_layouts() {
        let mut ast = Ast::new();
        let point = ast.intern("Point");
        let x = ast.intern("x");
        let next = ast.intern("next");
        let point_ty = ast.types.declare_data(point);
        let result = ast.types.result(TypeId::INT, TypeId::STR);
        let Type::Data(data) = ast.types[point_ty] else {
            unreachable!()
        };
        ast.types
            .define_data(data, vec![(x, TypeId::FLOAT), (next, point_ty)]);

        let env = LowerEnv::new(&ast);
        assert_eq!(env.ty(TypeId::UNIT), Ty::Void);
        assert_eq!(env.ty(TypeId::NEVER), Ty::Void);
        assert_eq!(env.ty(TypeId::BOOL), Ty::I1);
        assert_eq!(env.ty(point_ty), Ty::Ptr);

        let point_agg = env.agg(point_ty).unwrap();
        assert_eq!(env.types[point_agg].kind, AggKind::Data);
        assert_eq!(env.types[point_agg].fields, vec![Ty::F64, Ty::Ptr]);

        let result_agg = env.agg(result).unwrap();
        assert_eq!(env.ty(result), Ty::Agg(result_agg));
        assert_eq!(env.types[result_agg].fields, vec![Ty::I1, Ty::I64, Ty::Ptr]);
        assert_eq!(&*env.types[result_agg].name, "Result<Int, Str>");
        assert_eq!(env.agg(TypeId::INT), None);
    }
}

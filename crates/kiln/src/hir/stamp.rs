//! Content stamps for the incremental cache.
//!
//! A stamp covers the desugared body and a fingerprint of everything outside
//! the body that its lowering depends on: the type table and the signatures
//! of every item. Equal stamps mean equal lowered IR.

use super::Body;
use crate::ast::{Ast, ItemKind, Type};

use rustc_hash::FxHasher;

use std::hash::{Hash, Hasher};

/// Hashes the module-wide context shared by every body of `ast`.
pub fn fingerprint(ast: &Ast) -> u64 {
    let mut hasher = FxHasher::default();
    let name = |symbol| ast.resolve(symbol).unwrap_or_default();

    ast.types.len().hash(&mut hasher);
    for (id, ty) in ast.types.iter() {
        id.as_u32().hash(&mut hasher);
        ty.hash(&mut hasher);
        if let Type::Data(data) = ty {
            let def = ast.types.data(*data);
            name(def.name).hash(&mut hasher);
            for (field, ty) in &def.fields {
                name(*field).hash(&mut hasher);
                ty.hash(&mut hasher);
            }
        }
    }

    for item in ast.items.values() {
        name(item.name).hash(&mut hasher);
        match &item.kind {
            ItemKind::Function { params, ret, body } => {
                0u8.hash(&mut hasher);
                for param in params {
                    param.ty.hash(&mut hasher);
                }
                ret.hash(&mut hasher);
                body.is_some().hash(&mut hasher);
            }
            ItemKind::Global { ty, mutable, .. } => {
                1u8.hash(&mut hasher);
                ty.hash(&mut hasher);
                mutable.hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

pub fn stamp(fingerprint: u64, body: &Body) -> u64 {
    let mut hasher = FxHasher::default();
    fingerprint.hash(&mut hasher);
    body.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{tree::load_str, ItemRef},
        hir::desugar,
    };

    fn body_of(ast: &Ast, name: &str) -> Body {
        let item: ItemRef = ast.item(name).unwrap();
        desugar(ast, item).unwrap().unwrap()
    }

    const MODULE: &str = r#"{ "name": "m", "items": [
        { "function": { "name": "one", "ret": "int", "body": {
            "tail": { "kind": { "int": 1 }, "ty": "int" } } } },
        { "function": { "name": "two", "ret": "int", "body": {
            "tail": { "kind": { "int": 2 }, "ty": "int" } } } }
    ] }"#;

    #[test]
    fn stamps_are_stable_and_content_sensitive() {
        let (_, ast) = load_str(MODULE).unwrap();
        let (_, again) = load_str(MODULE).unwrap();
        let env = fingerprint(&ast);
        assert_eq!(env, fingerprint(&again));

        let one = stamp(env, &body_of(&ast, "one"));
        assert_eq!(one, stamp(env, &body_of(&again, "one")));
        assert_ne!(one, stamp(env, &body_of(&ast, "two")));
        assert_ne!(one, stamp(env.wrapping_add(1), &body_of(&ast, "one")));
    }

    #[test]
    fn fingerprint_tracks_signatures() {
        let (_, ast) = load_str(MODULE).unwrap();
        let changed = MODULE.replace(r#""name": "two", "ret": "int""#, r#""name": "two", "ret": "float""#);
        let (_, other) = load_str(&changed).unwrap();
        assert_ne!(fingerprint(&ast), fingerprint(&other));
    }
}

use super::Symbol;

use kiln_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;
use string_interner::DefaultStringInterner;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);
entity_impl!(TypeId, "ty");

impl TypeId {
    pub const UNIT: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const INT: TypeId = TypeId(2);
    pub const FLOAT: TypeId = TypeId(3);
    pub const STR: TypeId = TypeId(4);
    pub const NEVER: TypeId = TypeId(5);
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(u32);
entity_impl!(DataId, "data");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    /// The type of expressions that never produce a value.
    Never,
    /// A nominal record, see [`DataDef`].
    Data(DataId),
    Result { ok: TypeId, err: TypeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataDef {
    pub name: Symbol,
    pub fields: Vec<(Symbol, TypeId)>,
}

impl DataDef {
    pub fn field(&self, name: Symbol) -> Option<(u32, TypeId)> {
        self.fields
            .iter()
            .position(|(field, _)| *field == name)
            .map(|index| (index as u32, self.fields[index].1))
    }
}

/// Interned static types. Structural types are deduplicated, data types are
/// nominal.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: PrimaryMap<TypeId, Type>,
    lookup: FxHashMap<Type, TypeId>,
    datas: PrimaryMap<DataId, DataDef>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: PrimaryMap::new(),
            lookup: FxHashMap::default(),
            datas: PrimaryMap::new(),
        };
        for ty in [
            Type::Unit,
            Type::Bool,
            Type::Int,
            Type::Float,
            Type::Str,
            Type::Never,
        ] {
            table.intern(ty);
        }
        table
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.lookup.get(&ty) {
            return *id;
        }
        let id = self.types.push(ty);
        self.lookup.insert(ty, id);
        id
    }

    pub fn result(&mut self, ok: TypeId, err: TypeId) -> TypeId {
        self.intern(Type::Result { ok, err })
    }

    /// Declares a data type with no fields yet, so that fields may refer to it.
    pub fn declare_data(&mut self, name: Symbol) -> TypeId {
        let data = self.datas.push(DataDef {
            name,
            fields: Vec::new(),
        });
        self.intern(Type::Data(data))
    }

    pub fn define_data(&mut self, data: DataId, fields: Vec<(Symbol, TypeId)>) {
        if let Some(def) = self.datas.get_mut(data) {
            def.fields = fields;
        }
    }

    pub fn data(&self, data: DataId) -> &DataDef {
        &self.datas[data]
    }

    pub fn datas(&self) -> impl Iterator<Item = (DataId, &DataDef)> {
        self.datas.iter()
    }

    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Unit and never produce no runtime value.
    pub fn is_valueless(&self, id: TypeId) -> bool {
        matches!(self[id], Type::Unit | Type::Never)
    }

    /// Renders a type the way it is written in source.
    pub fn display(&self, id: TypeId, interner: &DefaultStringInterner) -> String {
        match self.get(id) {
            None => format!("{{unknown {}}}", id),
            Some(Type::Unit) => "()".to_string(),
            Some(Type::Bool) => "Bool".to_string(),
            Some(Type::Int) => "Int".to_string(),
            Some(Type::Float) => "Float".to_string(),
            Some(Type::Str) => "Str".to_string(),
            Some(Type::Never) => "!".to_string(),
            Some(Type::Data(data)) => interner
                .resolve(self.data(*data).name)
                .unwrap_or("?")
                .to_string(),
            Some(Type::Result { ok, err }) => format!(
                "Result<{}, {}>",
                self.display(*ok, interner),
                self.display(*err, interner)
            ),
        }
    }
}

impl std::ops::Index<TypeId> for TypeTable {
    type Output = Type;

    fn index(&self, id: TypeId) -> &Type {
        &self.types[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_have_fixed_ids() {
        let table = TypeTable::new();
        assert_eq!(table[TypeId::UNIT], Type::Unit);
        assert_eq!(table[TypeId::INT], Type::Int);
        assert_eq!(table[TypeId::NEVER], Type::Never);
        assert!(table.is_valueless(TypeId::NEVER));
        assert!(!table.is_valueless(TypeId::STR));
    }

    #[test]
    fn results_are_structural_and_data_is_nominal() {
        let mut interner = DefaultStringInterner::new();
        let mut table = TypeTable::new();
        let a = table.result(TypeId::INT, TypeId::STR);
        let b = table.result(TypeId::INT, TypeId::STR);
        assert_eq!(a, b);

        let name = interner.get_or_intern("Point");
        let p = table.declare_data(name);
        let q = table.declare_data(name);
        assert_ne!(p, q);

        let Type::Data(data) = table[p] else {
            panic!("expected a data type");
        };
        let x = interner.get_or_intern("x");
        table.define_data(data, vec![(x, TypeId::FLOAT)]);
        assert_eq!(table.data(data).field(x), Some((0, TypeId::FLOAT)));
        assert_eq!(table.display(a, &interner), "Result<Int, Str>");
        assert_eq!(table.display(p, &interner), "Point");
    }
}

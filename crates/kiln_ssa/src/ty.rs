use crate::AggId;

use kiln_entity::PrimaryMap;
use rustc_hash::FxHashMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    /// No value. Used by stores, terminators, calls without a result and
    /// unit payloads.
    #[default]
    Void,
    /// Boolean.
    I1,
    I64,
    F64,
    /// Opaque pointer: strings, stack slots, heap data instances.
    Ptr,
    /// A by-value aggregate described in the [`TypeTable`].
    Agg(AggId),
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::I1 => write!(f, "i1"),
            Ty::I64 => write!(f, "i64"),
            Ty::F64 => write!(f, "f64"),
            Ty::Ptr => write!(f, "ptr"),
            Ty::Agg(agg) => write!(f, "{}", agg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggKind {
    /// A `data` record, always accessed through a pointer.
    Data,
    /// A result value laid out as `[i1 is_err, ok, err]`.
    Result,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggData {
    pub name: Box<str>,
    pub kind: AggKind,
    pub fields: Vec<Ty>,
}

impl AggData {
    /// Field index of the tag in a result aggregate.
    pub const RESULT_TAG: u32 = 0;
    /// Field index of the success payload in a result aggregate.
    pub const RESULT_OK: u32 = 1;
    /// Field index of the error payload in a result aggregate.
    pub const RESULT_ERR: u32 = 2;

    pub fn result(name: impl Into<Box<str>>, ok: Ty, err: Ty) -> Self {
        Self {
            name: name.into(),
            kind: AggKind::Result,
            fields: vec![Ty::I1, ok, err],
        }
    }

    pub fn data(name: impl Into<Box<str>>, fields: Vec<Ty>) -> Self {
        Self {
            name: name.into(),
            kind: AggKind::Data,
            fields,
        }
    }

    /// Field types that carry a value, i.e. the operands of a `makeagg`.
    pub fn value_fields(&self) -> impl Iterator<Item = Ty> + '_ {
        self.fields.iter().copied().filter(|ty| *ty != Ty::Void)
    }
}

/// Interned aggregate layouts shared by every function in a module.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TypeTable {
    aggs: PrimaryMap<AggId, AggData>,
    lookup: FxHashMap<AggData, AggId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing id for an identical layout or allocates a new one.
    pub fn intern(&mut self, data: AggData) -> AggId {
        if let Some(agg) = self.lookup.get(&data) {
            return *agg;
        }
        let agg = self.aggs.push(data.clone());
        self.lookup.insert(data, agg);
        agg
    }

    /// Field types are patched after interning so that data records can refer
    /// to themselves through pointers.
    pub fn set_fields(&mut self, agg: AggId, fields: Vec<Ty>) {
        if let Some(data) = self.aggs.get_mut(agg) {
            self.lookup.remove(data);
            data.fields = fields;
            self.lookup.insert(data.clone(), agg);
        }
    }

    pub fn get(&self, agg: AggId) -> Option<&AggData> {
        self.aggs.get(agg)
    }

    /// Type of field `index` of `agg`, if both exist.
    pub fn field(&self, agg: AggId, index: u32) -> Option<Ty> {
        self.get(agg)?.fields.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.aggs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AggId, &AggData)> {
        self.aggs.iter()
    }
}

impl std::ops::Index<AggId> for TypeTable {
    type Output = AggData;

    fn index(&self, agg: AggId) -> &AggData {
        &self.aggs[agg]
    }
}

use crate::{function::Function, ty::Ty, ty::TypeTable, FuncId, GlobalId};

use kiln_entity::PrimaryMap;

use std::sync::Arc;

/// Constant initializer of a global.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Const {
    Zero,
    Int(i64),
    /// IEEE-754 bit pattern.
    Float(u64),
    Bool(bool),
    Str(Box<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalData {
    pub name: Box<str>,
    pub ty: Ty,
    pub init: Const,
}

/// A lowered compilation unit.
///
/// Functions are shared so that cached lowerings can be reused across
/// modules without copying.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Module {
    pub name: Box<str>,
    pub types: TypeTable,
    pub globals: PrimaryMap<GlobalId, GlobalData>,
    pub functions: PrimaryMap<FuncId, Arc<Function>>,
}

impl Module {
    pub fn new(name: impl Into<Box<str>>, types: TypeTable) -> Self {
        Self {
            types,
            name: name.into(),
            globals: PrimaryMap::new(),
            functions: PrimaryMap::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions
            .values()
            .find(|func| &*func.name == name)
            .map(|func| func.as_ref())
    }

    pub fn global(&self, name: &str) -> Option<&GlobalData> {
        self.globals.values().find(|global| &*global.name == name)
    }
}

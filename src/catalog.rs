use crate::builtin;
use crate::expression::{AttributeRef, Expression};
use crate::plan::LogicalPlan;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Unknown table {0:?}")]
    TableNotFound(String),

    #[error("Unknown function {0:?}")]
    FunctionNotFound(String),

    #[error("Duplicate table {0:?}")]
    DuplicateTable(String),

    #[error("Wrong number of arguments for {0}")]
    Arity(&'static str),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// A registered function: the builder turns the (already analyzed)
/// argument list into the resolved expression form.
pub struct FunctionInfo {
    pub name: &'static str,
    pub build: FunctionBuilderFnPtr,
}

pub type FunctionBuilderFnPtr = fn(Vec<Expression>) -> CatalogResult<Expression>;

/// Relation and function registry the analyzer resolves names against.
pub struct Catalog {
    relations: HashMap<String, LogicalPlan>,
    functions: HashMap<&'static str, FunctionInfo>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            relations: HashMap::new(),
            functions: builtin::load().map(|f| (f.name, f)).collect(),
        }
    }
}

impl Catalog {
    pub fn add_relation(
        &mut self,
        name: impl Into<String>,
        output: Vec<AttributeRef>,
    ) -> CatalogResult<()> {
        let name = name.into();
        match self.relations.entry(name.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(CatalogError::DuplicateTable(name))
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(LogicalPlan::relation(name, output));
                Ok(())
            }
        }
    }

    pub fn lookup_relation(&self, name: &str) -> CatalogResult<LogicalPlan> {
        self.relations
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_owned()))
    }

    /// Function lookup is case-insensitive.
    pub fn lookup_function(&self, name: &str) -> CatalogResult<&FunctionInfo> {
        let lowered = name.to_ascii_lowercase();
        self.functions
            .get(lowered.as_str())
            .ok_or_else(|| CatalogError::FunctionNotFound(name.to_owned()))
    }
}

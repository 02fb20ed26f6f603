//! Scoped symbol table
//!
//! Scopes live in an arena (`Vec<Scope>`) and refer to their parents by
//! index, so the tree has no owning back-pointers. Entries are never
//! reassigned once inserted; the tree is append-only during analysis.

use crate::types::Ty;
use hashbrown::HashMap;
use rill_common::VReg;

/// Index of a scope in the table's arena. The root scope is always index 0.
pub type ScopeId = usize;

/// A symbol-table value: a variable, a struct definition, or a function.
#[derive(Debug, Clone)]
pub enum Entry {
    /// A scalar or record-pointer variable with its assigned virtual register.
    Scalar { ty: Ty, register: VReg },
    /// A struct definition with its ordered field list and field scope.
    /// Field order drives record layout.
    StructDef { ty: Ty, fields: Vec<String>, scope: ScopeId },
    /// A function with its signature, local scope and parameter registers.
    Function {
        ty: Ty,
        params: Vec<Ty>,
        return_type: Option<Ty>,
        scope: ScopeId,
        param_registers: Vec<VReg>,
    },
}

impl Entry {
    pub fn ty(&self) -> &Ty {
        match self {
            Entry::Scalar { ty, .. } => ty,
            Entry::StructDef { ty, .. } => ty,
            Entry::Function { ty, .. } => ty,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Entry::Scalar { .. })
    }
}

/// A named mapping from identifier to entry, with an optional parent.
#[derive(Debug, Clone)]
pub struct Scope {
    pub name: String,
    pub parent: Option<ScopeId>,
    entries: HashMap<String, Entry>,
}

/// The scope tree for one compilation.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create a table holding only the root ("Global") scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                name: "Global".to_string(),
                parent: None,
                entries: HashMap::new(),
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        0
    }

    pub fn push_scope(&mut self, name: impl Into<String>, parent: ScopeId) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope { name: name.into(), parent: Some(parent), entries: HashMap::new() });
        id
    }

    pub fn scope_name(&self, scope: ScopeId) -> &str {
        &self.scopes[scope].name
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope].parent
    }

    /// Insert an entry into a scope. Returns false (and leaves the scope
    /// unchanged) if the name is already present there.
    pub fn insert(&mut self, scope: ScopeId, name: &str, entry: Entry) -> bool {
        let entries = &mut self.scopes[scope].entries;
        if entries.contains_key(name) {
            return false;
        }
        entries.insert(name.to_string(), entry);
        true
    }

    pub fn insert_scalar(&mut self, scope: ScopeId, name: &str, ty: Ty, register: VReg) -> bool {
        self.insert(scope, name, Entry::Scalar { ty, register })
    }

    pub fn insert_struct_definition(
        &mut self,
        scope: ScopeId,
        name: &str,
        field_scope: ScopeId,
        fields: Vec<String>,
    ) -> bool {
        let entry = Entry::StructDef { ty: Ty::Struct(name.to_string()), fields, scope: field_scope };
        self.insert(scope, name, entry)
    }

    pub fn insert_function(
        &mut self,
        scope: ScopeId,
        name: &str,
        params: Vec<Ty>,
        return_type: Option<Ty>,
        local_scope: ScopeId,
        param_registers: Vec<VReg>,
    ) -> bool {
        let entry = Entry::Function {
            ty: Ty::Function(name.to_string()),
            params,
            return_type,
            scope: local_scope,
            param_registers,
        };
        self.insert(scope, name, entry)
    }

    /// Walk parent links until the name is found or the root is exhausted.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, &Entry)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(entry) = self.scopes[id].entries.get(name) {
                return Some((id, entry));
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// A lookup that only reports hits in the root scope.
    pub fn lookup_global(&self, name: &str) -> Option<&Entry> {
        self.scopes[self.root()].entries.get(name)
    }

    /// A lookup confined to the given scope.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<&Entry> {
        self.scopes[scope].entries.get(name)
    }

    /// True when the name resolves to a variable in the root scope and is not
    /// shadowed on the path from `scope`. Such reads and writes go through
    /// the global's `.comm` storage rather than a register.
    pub fn resolves_to_global(&self, scope: ScopeId, name: &str) -> bool {
        match self.lookup(scope, name) {
            Some((id, entry)) => id == self.root() && entry.is_variable(),
            None => false,
        }
    }

    // -- struct definition helpers -----------------------------------------

    pub fn struct_fields(&self, struct_name: &str) -> Option<&[String]> {
        match self.lookup_global(struct_name) {
            Some(Entry::StructDef { fields, .. }) => Some(fields),
            _ => None,
        }
    }

    /// Field ordinal within the struct's declared field order.
    pub fn struct_field_index(&self, struct_name: &str, field: &str) -> Option<usize> {
        self.struct_fields(struct_name)?.iter().position(|name| name == field)
    }

    pub fn struct_field_count(&self, struct_name: &str) -> Option<usize> {
        Some(self.struct_fields(struct_name)?.len())
    }

    pub fn struct_field_ty(&self, struct_name: &str, field: &str) -> Option<Ty> {
        match self.lookup_global(struct_name) {
            Some(Entry::StructDef { scope, .. }) => {
                self.lookup_local(*scope, field).map(|entry| entry.ty().clone())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_never_reassigned() {
        let mut table = SymbolTable::new();
        let root = table.root();
        assert!(table.insert_scalar(root, "a", Ty::Int, 0));
        assert!(!table.insert_scalar(root, "a", Ty::Bool, 1));
        match table.lookup_local(root, "a") {
            Some(Entry::Scalar { ty: Ty::Int, register: 0 }) => {}
            other => panic!("first insertion must win, got {:?}", other),
        }
    }

    #[test]
    fn lookup_walks_parents_until_the_root() {
        let mut table = SymbolTable::new();
        let root = table.root();
        let outer = table.push_scope("outer", root);
        let inner = table.push_scope("inner", outer);
        table.insert_scalar(root, "g", Ty::Int, 0);
        table.insert_scalar(outer, "o", Ty::Int, 1);

        assert!(table.lookup(inner, "o").is_some());
        assert!(table.lookup(inner, "g").is_some());
        assert!(table.lookup(inner, "missing").is_none());
        assert_eq!(table.lookup(inner, "g").unwrap().0, root);
    }

    #[test]
    fn lookup_global_only_reports_root_hits() {
        let mut table = SymbolTable::new();
        let root = table.root();
        let local = table.push_scope("f", root);
        table.insert_scalar(local, "x", Ty::Int, 0);
        assert!(table.lookup(local, "x").is_some());
        assert!(table.lookup_global("x").is_none());
    }

    #[test]
    fn shadowing_resolves_to_the_nearest_scope() {
        let mut table = SymbolTable::new();
        let root = table.root();
        let local = table.push_scope("f", root);
        table.insert_scalar(root, "v", Ty::Int, 0);
        table.insert_scalar(local, "v", Ty::Bool, 1);

        let (scope, entry) = table.lookup(local, "v").unwrap();
        assert_eq!(scope, local);
        assert_eq!(entry.ty(), &Ty::Bool);
        assert!(!table.resolves_to_global(local, "v"));
    }

    #[test]
    fn struct_definitions_preserve_field_order() {
        let mut table = SymbolTable::new();
        let root = table.root();
        let fields_scope = table.push_scope("Struct:P", root);
        table.insert_scalar(fields_scope, "b", Ty::Int, 0);
        table.insert_scalar(fields_scope, "a", Ty::Int, 1);
        table.insert_struct_definition(
            root,
            "P",
            fields_scope,
            vec!["b".to_string(), "a".to_string()],
        );

        // declaration order drives layout, not alphabetical order
        assert_eq!(table.struct_field_index("P", "b"), Some(0));
        assert_eq!(table.struct_field_index("P", "a"), Some(1));
        assert_eq!(table.struct_field_count("P"), Some(2));
        assert_eq!(table.struct_field_ty("P", "a"), Some(Ty::Int));
        assert_eq!(table.struct_field_index("P", "zz"), None);
    }

    #[test]
    fn parent_links_reach_the_root() {
        let mut table = SymbolTable::new();
        let root = table.root();
        let child = table.push_scope("child", root);
        assert_eq!(table.parent(child), Some(root));
        assert_eq!(table.parent(root), None);
        assert_eq!(table.scope_name(child), "child");
    }
}

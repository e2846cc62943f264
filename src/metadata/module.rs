//! Modules, the containers of type definitions and imported references.

use serde::{Deserialize, Serialize};

use crate::{
    metadata::{
        customattributes::CustomAttribute,
        method::MethodDef,
        references::{MemberRef, TypeRef},
        token::{TableId, Token, MAX_ROW},
        typesystem::TypeDef,
    },
    Error, Result,
};

/// A module of an assembly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module file name, e.g. `Library.dll`
    pub name: String,
    /// Custom attributes attached to the module
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
    /// Top-level types in declaration order
    #[serde(default)]
    pub types: Vec<TypeDef>,
    /// Imported types
    #[serde(default)]
    pub type_refs: Vec<TypeRef>,
    /// Imported members
    #[serde(default)]
    pub member_refs: Vec<MemberRef>,
}

impl Module {
    /// Create an empty module
    #[must_use]
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// All type definitions, top-level and nested, parents before children
    #[must_use]
    pub fn all_types(&self) -> Vec<&TypeDef> {
        let mut types = Vec::new();
        for ty in &self.types {
            ty.visit(&mut |t| types.push(t));
        }
        types
    }

    /// Find a top-level type by namespace and name
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<&TypeDef> {
        self.types
            .iter()
            .find(|ty| ty.namespace == namespace && ty.name == name)
    }

    /// Find a type by its namespace and the names of its enclosing types.
    ///
    /// `names` lists the outermost type first; the namespace applies to the outermost type.
    /// Returns the whole chain, outermost first.
    #[must_use]
    pub fn find_type_path(&self, namespace: &str, names: &[String]) -> Option<Vec<&TypeDef>> {
        let (outermost, rest) = names.split_first()?;
        let mut current = self.find_type(namespace, outermost)?;
        let mut chain = vec![current];

        for name in rest {
            current = current.nested(name)?;
            chain.push(current);
        }

        Some(chain)
    }

    /// The chain of types from a top-level type down to the type with `token`
    #[must_use]
    pub fn type_path(&self, token: Token) -> Option<Vec<&TypeDef>> {
        if !token.is_table(TableId::TYPE_DEF) {
            return None;
        }
        self.types.iter().find_map(|ty| ty.path_to(token))
    }

    /// Find a method definition together with the chain of its declaring types
    #[must_use]
    pub fn find_method(&self, token: Token) -> Option<(Vec<&TypeDef>, &MethodDef)> {
        if !token.is_table(TableId::METHOD_DEF) {
            return None;
        }

        self.all_types().into_iter().find_map(|ty| {
            ty.method(token).map(|method| {
                // The declaring type was found by the traversal, so its path exists
                let path = self.type_path(ty.token).unwrap_or_else(|| vec![ty]);
                (path, method)
            })
        })
    }

    /// Look up an imported type
    #[must_use]
    pub fn type_ref(&self, token: Token) -> Option<&TypeRef> {
        self.type_refs.iter().find(|type_ref| type_ref.token == token)
    }

    /// Look up an imported member
    #[must_use]
    pub fn member_ref(&self, token: Token) -> Option<&MemberRef> {
        self.member_refs
            .iter()
            .find(|member_ref| member_ref.token == token)
    }

    /// Allocate the next free token of a table owned by this module.
    ///
    /// # Errors
    /// Returns [`Error::TokenSpaceExhausted`] if the table is full, or [`Error::Error`] for
    /// tables the module does not own.
    pub fn next_token(&self, table: u8) -> Result<Token> {
        let max_row = match table {
            TableId::TYPE_REF => max_row(self.type_refs.iter().map(|t| t.token)),
            TableId::MEMBER_REF => max_row(self.member_refs.iter().map(|m| m.token)),
            TableId::TYPE_DEF => max_row(self.all_types().into_iter().map(|t| t.token)),
            TableId::METHOD_DEF => max_row(
                self.all_types()
                    .into_iter()
                    .flat_map(|t| t.methods.iter().map(|m| m.token)),
            ),
            TableId::FIELD => max_row(
                self.all_types()
                    .into_iter()
                    .flat_map(|t| t.fields.iter().map(|f| f.token)),
            ),
            _ => {
                return Err(Error::Error(format!(
                    "table 0x{table:02x} is not owned by a module"
                )))
            }
        };

        if max_row >= MAX_ROW {
            return Err(Error::TokenSpaceExhausted(table));
        }
        Ok(Token::from_parts(table, max_row + 1))
    }
}

pub(crate) fn max_row(tokens: impl Iterator<Item = Token>) -> u32 {
    tokens.map(|token| token.row()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{flags::TypeAttributes, references::ResolutionScope},
        test::factories::{public_method, public_type},
    };

    fn module() -> Module {
        let mut module = Module::new("Library.dll");
        module.types.push(
            public_type(2, "Lib", "Outer")
                .with_method(public_method(1, "Run"))
                .with_nested(
                    TypeDef::new(Token(0x02000003), "", "Inner", TypeAttributes::NESTED_PUBLIC)
                        .with_method(public_method(7, "Go")),
                ),
        );
        module.type_refs.push(TypeRef {
            token: Token(0x01000004),
            scope: ResolutionScope::Module,
            namespace: "Lib".to_string(),
            name: "Outer".to_string(),
        });
        module
    }

    #[test]
    fn find_method_returns_declaring_chain() {
        let module = module();
        let (chain, method) = module.find_method(Token(0x06000007)).unwrap();

        assert_eq!(method.name, "Go");
        let names: Vec<_> = chain.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Outer", "Inner"]);

        assert!(module.find_method(Token(0x06000002)).is_none());
        assert!(module.find_method(Token(0x0A000007)).is_none());
    }

    #[test]
    fn find_type_path_walks_nesting() {
        let module = module();
        let chain = module
            .find_type_path("Lib", &["Outer".to_string(), "Inner".to_string()])
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].token, Token(0x02000003));

        assert!(module.find_type_path("Other", &["Outer".to_string()]).is_none());
        assert!(module.find_type_path("Lib", &[]).is_none());
    }

    #[test]
    fn next_token_per_table() {
        let module = module();

        assert_eq!(module.next_token(TableId::TYPE_REF).unwrap(), Token(0x01000005));
        assert_eq!(module.next_token(TableId::MEMBER_REF).unwrap(), Token(0x0A000001));
        assert_eq!(module.next_token(TableId::TYPE_DEF).unwrap(), Token(0x02000004));
        assert_eq!(module.next_token(TableId::METHOD_DEF).unwrap(), Token(0x06000008));
        assert!(module.next_token(TableId::ASSEMBLY_REF).is_err());
    }

    #[test]
    fn next_token_detects_exhaustion() {
        let mut module = module();
        module.member_refs.push(MemberRef {
            token: Token::from_parts(TableId::MEMBER_REF, MAX_ROW),
            parent: Token(0x01000004),
            name: "Full".to_string(),
            signature: Vec::new(),
        });

        assert!(matches!(
            module.next_token(TableId::MEMBER_REF),
            Err(Error::TokenSpaceExhausted(TableId::MEMBER_REF))
        ));
    }
}

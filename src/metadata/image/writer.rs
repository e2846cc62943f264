//! Writing a modified assembly back over the image it was read from.
//!
//! The source image is loaded again into a `dotscope` `CilAssembly`, the [`ImagePatch`]
//! between the freshly read model and the modified one is replayed on it, and a new PE file
//! is generated:
//!
//! 1. New `AssemblyRef`, `TypeRef` and `MemberRef` rows are added through the `dotscope`
//!    builders; their model tokens are mapped to the placeholder rows the builders return.
//! 2. `TypeRef` scopes, `TypeDef` base types and `MethodDef` bodies are updated in place.
//!    Stub bodies referencing a new constructor row get the placeholder token, which the
//!    generator resolves when it lays out the tables.
//! 3. Properties, events, interface implementations, member references and assembly
//!    references are removed row by row.
//! 4. Types, methods, fields and attributes go through `dotscope`'s cleanup, which also
//!    removes everything that only existed for them (parameters, nested class entries,
//!    property and event maps, method semantics, unreferenced signatures).

use std::collections::{HashMap, HashSet};

use dotscope::{
    metadata::{
        tables::{
            CodedIndex, CodedIndexType, InterfaceImplRaw, MethodDefRaw, MethodSemanticsRaw,
            TableDataOwned, TableId as RawTable, TypeDefRaw, TypeRefRaw,
        },
        token::Token as MetadataToken,
    },
    prelude::{AssemblyRefBuilder, MemberRefBuilder, TypeRefBuilder},
    CilAssembly, CilAssemblyView, CleanupRequest,
};

use crate::{
    metadata::{
        assembly::Assembly,
        image::{patch::ImagePatch, reader::read_view},
        method::MethodBody,
        references::ResolutionScope,
        token::{TableId, Token},
    },
    Error, Result,
};

/// Apply the changes made to `assembly` to the image it was read from and generate the new
/// image.
///
/// # Errors
/// - [`Error::NoSourceImage`] if `assembly` was not read from an image
/// - [`Error::Error`] if the model contains changes that cannot be written (see
///   [`ImagePatch::between`])
/// - [`Error::Metadata`] if `dotscope` rejects a modification or cannot generate the image
pub fn write(assembly: &Assembly) -> Result<Vec<u8>> {
    let source = assembly.source.as_ref().ok_or(Error::NoSourceImage)?;

    let view = CilAssemblyView::from_mem(source.to_vec())?;
    let original = read_view(&view)?;
    let patch = ImagePatch::between(&original, assembly)?;

    let mut image = CilAssembly::new(view);
    Patcher {
        image: &mut image,
        rows: HashMap::new(),
    }
    .apply(&patch)?;

    let data = image.to_memory()?;
    log::debug!("Wrote {} ({} bytes)", assembly.name, data.len());
    Ok(data)
}

struct Patcher<'a> {
    image: &'a mut CilAssembly,
    /// Placeholder rows of the rows added by this patch, by model token
    rows: HashMap<Token, u32>,
}

impl Patcher<'_> {
    fn apply(&mut self, patch: &ImagePatch) -> Result<()> {
        self.add_rows(patch)?;
        self.update_rows(patch)?;
        self.remove_rows(patch)?;
        self.cleanup(patch)
    }

    /// The row a model token refers to in the image being written
    fn row(&self, token: Token) -> u32 {
        self.rows.get(&token).copied().unwrap_or(token.row())
    }

    fn coded(&self, token: Token, kind: CodedIndexType) -> Result<CodedIndex> {
        Ok(CodedIndex::new(raw_table(token.table())?, self.row(token), kind))
    }

    fn scope(&self, scope: ResolutionScope) -> Result<CodedIndex> {
        let kind = CodedIndexType::ResolutionScope;
        match scope {
            ResolutionScope::Module => Ok(CodedIndex::new(RawTable::Module, 1, kind)),
            ResolutionScope::AssemblyRef(token)
            | ResolutionScope::TypeRef(token)
            | ResolutionScope::ModuleRef(token) => self.coded(token, kind),
            ResolutionScope::Exported => Ok(CodedIndex::new(RawTable::Module, 0, kind)),
        }
    }

    fn source_type_ref(&self, rid: u32) -> Result<TypeRefRaw> {
        let view = self.image.view();
        let Some(tables) = view.tables() else {
            return Err(malformed_error!("Image has no metadata tables"));
        };
        tables
            .table::<TypeRefRaw>()
            .and_then(|table| table.get(rid))
            .ok_or_else(|| malformed_error!("Row {} is not in the source image", rid))
    }

    fn source_type_def(&self, rid: u32) -> Result<TypeDefRaw> {
        let view = self.image.view();
        let Some(tables) = view.tables() else {
            return Err(malformed_error!("Image has no metadata tables"));
        };
        tables
            .table::<TypeDefRaw>()
            .and_then(|table| table.get(rid))
            .ok_or_else(|| malformed_error!("Row {} is not in the source image", rid))
    }

    fn source_method_def(&self, rid: u32) -> Result<MethodDefRaw> {
        let view = self.image.view();
        let Some(tables) = view.tables() else {
            return Err(malformed_error!("Image has no metadata tables"));
        };
        tables
            .table::<MethodDefRaw>()
            .and_then(|table| table.get(rid))
            .ok_or_else(|| malformed_error!("Row {} is not in the source image", rid))
    }

    fn add_rows(&mut self, patch: &ImagePatch) -> Result<()> {
        for reference in &patch.added_references {
            if reference.culture.is_some() {
                return Err(Error::Error(format!(
                    "Cannot add a reference to the culture-specific assembly {}",
                    reference.assembly_name()
                )));
            }

            let version = reference.version;
            let mut builder = AssemblyRefBuilder::new().name(reference.name.as_str()).version(
                version.major.into(),
                version.minor.into(),
                version.build.into(),
                version.revision.into(),
            );
            if let Some(key_token) = reference.public_key_token() {
                builder = builder.public_key_token(&key_token.to_le_bytes());
            }
            let added = builder.build(self.image)?;
            self.rows.insert(reference.token, added.placeholder());
        }

        for type_ref in &patch.added_type_refs {
            let added = TypeRefBuilder::new()
                .name(type_ref.name.as_str())
                .namespace(type_ref.namespace.as_str())
                .resolution_scope(self.scope(type_ref.scope)?)
                .build(self.image)?;
            self.rows.insert(type_ref.token, added.placeholder());
        }

        for member_ref in &patch.added_member_refs {
            let added = MemberRefBuilder::new()
                .name(member_ref.name.as_str())
                .class(self.coded(member_ref.parent, CodedIndexType::MemberRefParent)?)
                .signature(&member_ref.signature)
                .build(self.image)?;
            self.rows.insert(member_ref.token, added.placeholder());
        }

        Ok(())
    }

    fn update_rows(&mut self, patch: &ImagePatch) -> Result<()> {
        for type_ref in &patch.rescoped_type_refs {
            let row = self.source_type_ref(type_ref.token.row())?;
            let resolution_scope = self.scope(type_ref.scope)?;
            self.image.table_row_update(
                RawTable::TypeRef,
                row.rid,
                TableDataOwned::TypeRef(TypeRefRaw {
                    rid: row.rid,
                    token: row.token,
                    offset: row.offset,
                    resolution_scope,
                    type_name: row.type_name,
                    type_namespace: row.type_namespace,
                }),
            )?;
        }

        for (token, extends) in &patch.rebased_types {
            let row = self.source_type_def(token.row())?;
            let extends = match extends {
                Some(base) => self.coded(*base, CodedIndexType::TypeDefOrRef)?,
                None => CodedIndex::new(RawTable::TypeDef, 0, CodedIndexType::TypeDefOrRef),
            };
            self.image.table_row_update(
                RawTable::TypeDef,
                row.rid,
                TableDataOwned::TypeDef(TypeDefRaw {
                    rid: row.rid,
                    token: row.token,
                    offset: row.offset,
                    flags: row.flags,
                    type_name: row.type_name,
                    type_namespace: row.type_namespace,
                    extends,
                    field_list: row.field_list,
                    method_list: row.method_list,
                }),
            )?;
        }

        for method in &patch.rewritten_methods {
            let row = self.source_method_def(method.token.row())?;
            let rva = match &method.body {
                Some(body) if method.can_have_body() => {
                    let encoded = self.resolve_body(body).encode()?;
                    self.image.store_method_body(encoded)
                }
                _ => row.rva,
            };
            self.image.table_row_update(
                RawTable::MethodDef,
                row.rid,
                TableDataOwned::MethodDef(MethodDefRaw {
                    rid: row.rid,
                    token: row.token,
                    offset: row.offset,
                    rva,
                    impl_flags: method.impl_flags,
                    flags: row.flags,
                    name: row.name,
                    signature: row.signature,
                    param_list: row.param_list,
                }),
            )?;
        }

        Ok(())
    }

    /// `body` with a stub constructor added by this patch replaced by its placeholder
    fn resolve_body(&self, body: &MethodBody) -> MethodBody {
        match body.stub_constructor() {
            Some(constructor) if self.rows.contains_key(&constructor) => MethodBody::stub(
                Token::from_parts(constructor.table(), self.row(constructor)),
            ),
            _ => body.clone(),
        }
    }

    fn remove_rows(&mut self, patch: &ImagePatch) -> Result<()> {
        let interfaces: HashSet<(Token, Token)> =
            patch.removed_interfaces.iter().copied().collect();
        let associations: HashSet<Token> = patch
            .removed_properties
            .iter()
            .chain(&patch.removed_events)
            .copied()
            .collect();

        let (interface_rows, semantics_rows) = {
            let view = self.image.view();
            let mut interface_rows = Vec::new();
            let mut semantics_rows = Vec::new();
            if let Some(tables) = view.tables() {
                if let Some(table) = tables.table::<InterfaceImplRaw>() {
                    for row in table {
                        let key = (
                            Token::from_parts(TableId::TYPE_DEF, row.class),
                            Token(row.interface.token.value()),
                        );
                        if interfaces.contains(&key) {
                            interface_rows.push(row.rid);
                        }
                    }
                }
                if let Some(table) = tables.table::<MethodSemanticsRaw>() {
                    for row in table {
                        if associations.contains(&Token(row.association.token.value())) {
                            semantics_rows.push(row.rid);
                        }
                    }
                }
            }
            (interface_rows, semantics_rows)
        };

        self.remove(RawTable::InterfaceImpl, interface_rows)?;
        self.remove(RawTable::MethodSemantics, semantics_rows)?;
        self.remove(RawTable::Property, rows(&patch.removed_properties))?;
        self.remove(RawTable::Event, rows(&patch.removed_events))?;
        self.remove(RawTable::MemberRef, rows(&patch.removed_member_refs))?;
        self.remove(RawTable::AssemblyRef, rows(&patch.removed_references))
    }

    /// Remove rows of one table, highest row first
    fn remove(&mut self, table: RawTable, mut rids: Vec<u32>) -> Result<()> {
        rids.sort_unstable_by(|a, b| b.cmp(a));
        for rid in rids {
            self.image.table_row_remove(table, rid)?;
        }
        Ok(())
    }

    fn cleanup(&mut self, patch: &ImagePatch) -> Result<()> {
        let mut request = CleanupRequest::with_settings(true, false);
        request
            .add_types(patch.removed_types.iter().map(metadata_token))
            .add_methods(patch.removed_methods.iter().map(metadata_token))
            .add_fields(patch.removed_fields.iter().map(metadata_token));
        for attribute in &patch.removed_attributes {
            request.add_attribute(metadata_token(attribute));
        }

        self.image.add_cleanup(&request);
        Ok(())
    }
}

fn rows(tokens: &[Token]) -> Vec<u32> {
    tokens.iter().map(Token::row).collect()
}

fn metadata_token(token: &Token) -> MetadataToken {
    MetadataToken::new(token.value())
}

/// The `dotscope` table of a model token
fn raw_table(table: u8) -> Result<RawTable> {
    Ok(match table {
        TableId::MODULE => RawTable::Module,
        TableId::TYPE_REF => RawTable::TypeRef,
        TableId::TYPE_DEF => RawTable::TypeDef,
        TableId::FIELD => RawTable::Field,
        TableId::METHOD_DEF => RawTable::MethodDef,
        TableId::MEMBER_REF => RawTable::MemberRef,
        TableId::MODULE_REF => RawTable::ModuleRef,
        TableId::TYPE_SPEC => RawTable::TypeSpec,
        TableId::ASSEMBLY_REF => RawTable::AssemblyRef,
        _ => {
            return Err(Error::Error(format!(
                "Table 0x{table:02x} cannot be referenced from a coded index"
            )))
        }
    })
}

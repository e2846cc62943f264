//! Building the object model from the metadata tables of a PE image.
//!
//! Every entity keeps the token of the row it was read from, so a model read from an image
//! can later be compared row by row with the same image (see [`super::patch`]).
//!
//! The `<Module>` pseudo type (`TypeDef` row 1) and the global members it owns are not part
//! of the model; they are never stripped and the writer leaves them as they are.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use dotscope::{
    metadata::{
        method::MethodBody as RawBody,
        streams::TablesHeader,
        tables::{
            AssemblyRaw, AssemblyRefRaw, CodedIndex, CustomAttributeRaw, EventMapRaw, EventRaw,
            FieldRaw, InterfaceImplRaw, MemberRefRaw, MethodDefRaw, MethodSemanticsRaw,
            ModuleRaw, NestedClassRaw, PropertyMapRaw, PropertyRaw, TableId as RawTable,
            TypeDefRaw, TypeRefRaw,
        },
    },
    CilAssemblyView,
};

use crate::{
    metadata::{
        assembly::Assembly,
        customattributes::CustomAttribute,
        identity::Identity,
        members::{EventDef, FieldDef, PropertyDef},
        method::{MethodBody, MethodDef},
        module::Module,
        references::{AssemblyRef, AssemblyVersion, MemberRef, ResolutionScope, TypeRef},
        token::{TableId, Token},
        typesystem::TypeDef,
    },
    Error, Result,
};

/// `AssemblyRef` flag: the blob holds the full public key instead of its token
const PUBLIC_KEY_FLAG: u32 = 0x0001;

/// `MethodSemantics` values (ECMA-335 II.23.1.12)
const SEMANTICS_SETTER: u32 = 0x0001;
const SEMANTICS_GETTER: u32 = 0x0002;
const SEMANTICS_ADD_ON: u32 = 0x0008;
const SEMANTICS_REMOVE_ON: u32 = 0x0010;
const SEMANTICS_FIRE: u32 = 0x0020;

/// Decode the image in `data` into an [`Assembly`] that keeps a copy of `data` as its source.
///
/// # Errors
/// - [`Error::Empty`] for empty input
/// - [`Error::Metadata`] if `dotscope` cannot load the image
/// - [`Error::Malformed`] if the metadata has no assembly manifest or is inconsistent
pub fn read(data: &[u8]) -> Result<Assembly> {
    if data.is_empty() {
        return Err(Error::Empty);
    }

    let view = CilAssemblyView::from_mem(data.to_vec())?;
    let mut assembly = read_view(&view)?;
    assembly.source = Some(Arc::from(data));

    log::debug!(
        "Read {} {} with {} types",
        assembly.name,
        assembly.version,
        assembly
            .main_module()
            .map_or(0, |module| module.all_types().len())
    );
    Ok(assembly)
}

/// Build the object model of an already loaded image. The result has no source attached.
pub(crate) fn read_view(view: &CilAssemblyView) -> Result<Assembly> {
    let tables = view
        .tables()
        .ok_or_else(|| malformed_error!("Image has no metadata tables"))?;

    let mut reader = Reader {
        view,
        tables,
        attributes: HashMap::new(),
    };
    reader.collect_attributes()?;
    reader.assembly()
}

struct Reader<'a> {
    view: &'a CilAssemblyView,
    tables: &'a TablesHeader<'a>,
    /// Custom attributes by the token of their owner
    attributes: HashMap<Token, Vec<CustomAttribute>>,
}

impl<'a> Reader<'a> {
    fn string(&self, index: u32) -> Result<String> {
        let strings = self
            .view
            .strings()
            .ok_or_else(|| malformed_error!("Image has no #Strings heap"))?;
        Ok(strings.get(index as usize)?.to_string())
    }

    fn blob(&self, index: u32) -> Result<Vec<u8>> {
        if index == 0 {
            return Ok(Vec::new());
        }
        let blobs = self
            .view
            .blobs()
            .ok_or_else(|| malformed_error!("Image has no #Blob heap"))?;
        Ok(blobs.get(index as usize)?.to_vec())
    }

    fn take_attributes(&mut self, owner: Token) -> Vec<CustomAttribute> {
        self.attributes.remove(&owner).unwrap_or_default()
    }

    fn collect_attributes(&mut self) -> Result<()> {
        let Some(table) = self.tables.table::<CustomAttributeRaw>() else {
            return Ok(());
        };

        for row in table {
            let attribute = CustomAttribute {
                token: Some(Token::from_parts(TableId::CUSTOM_ATTRIBUTE, row.rid)),
                constructor: coded_token(&row.constructor),
                value: self.blob(row.value)?,
            };
            self.attributes
                .entry(Token(row.parent.token.value()))
                .or_default()
                .push(attribute);
        }
        Ok(())
    }

    fn assembly(&mut self) -> Result<Assembly> {
        let row = self
            .tables
            .table::<AssemblyRaw>()
            .and_then(|table| table.get(1))
            .ok_or_else(|| malformed_error!("Image has no assembly manifest"))?;

        let name = self.string(row.name)?;
        let version = version(
            row.major_version,
            row.minor_version,
            row.build_number,
            row.revision_number,
        )?;
        let culture = non_empty(self.string(row.culture)?);
        let references = self.references()?;
        let module = self.module()?;
        let custom_attributes = self.take_attributes(Token::from_parts(TableId::ASSEMBLY, 1));

        Ok(Assembly {
            name,
            version,
            culture,
            custom_attributes,
            references,
            modules: vec![module],
            source: None,
        })
    }

    fn references(&self) -> Result<Vec<AssemblyRef>> {
        let Some(table) = self.tables.table::<AssemblyRefRaw>() else {
            return Ok(Vec::new());
        };

        let mut references = Vec::new();
        for row in table {
            let key = self.blob(row.public_key_or_token)?;
            let identity = if key.is_empty() {
                None
            } else if row.flags & PUBLIC_KEY_FLAG != 0 {
                Some(Identity::PubKey(key))
            } else {
                let token: [u8; 8] = key.as_slice().try_into().map_err(|_| {
                    malformed_error!(
                        "AssemblyRef {} has a {}-byte public key token",
                        row.rid,
                        key.len()
                    )
                })?;
                Some(Identity::from_token_bytes(token))
            };

            references.push(AssemblyRef {
                token: Token::from_parts(TableId::ASSEMBLY_REF, row.rid),
                name: self.string(row.name)?,
                version: version(
                    row.major_version,
                    row.minor_version,
                    row.build_number,
                    row.revision_number,
                )?,
                culture: non_empty(self.string(row.culture)?),
                identity,
            });
        }
        Ok(references)
    }

    fn module(&mut self) -> Result<Module> {
        let row = self
            .tables
            .table::<ModuleRaw>()
            .and_then(|table| table.get(1))
            .ok_or_else(|| malformed_error!("Image has no Module row"))?;

        let mut module = Module::new(&self.string(row.name)?);
        module.custom_attributes = self.take_attributes(Token::from_parts(TableId::MODULE, 1));
        module.type_refs = self.type_refs()?;
        module.member_refs = self.member_refs()?;
        module.types = self.types()?;
        Ok(module)
    }

    fn type_refs(&self) -> Result<Vec<TypeRef>> {
        let Some(table) = self.tables.table::<TypeRefRaw>() else {
            return Ok(Vec::new());
        };

        let mut type_refs = Vec::new();
        for row in table {
            let scope = &row.resolution_scope;
            let scope = match (scope.tag, coded_token(scope)) {
                (_, None) => ResolutionScope::Exported,
                (RawTable::Module, Some(_)) => ResolutionScope::Module,
                (RawTable::ModuleRef, Some(token)) => ResolutionScope::ModuleRef(token),
                (RawTable::AssemblyRef, Some(token)) => ResolutionScope::AssemblyRef(token),
                (RawTable::TypeRef, Some(token)) => ResolutionScope::TypeRef(token),
                (_, Some(token)) => {
                    return Err(malformed_error!(
                        "TypeRef {} has resolution scope {}",
                        row.rid,
                        token
                    ))
                }
            };

            type_refs.push(TypeRef {
                token: Token::from_parts(TableId::TYPE_REF, row.rid),
                scope,
                namespace: self.string(row.type_namespace)?,
                name: self.string(row.type_name)?,
            });
        }
        Ok(type_refs)
    }

    fn member_refs(&self) -> Result<Vec<MemberRef>> {
        let Some(table) = self.tables.table::<MemberRefRaw>() else {
            return Ok(Vec::new());
        };

        let mut member_refs = Vec::new();
        for row in table {
            member_refs.push(MemberRef {
                token: Token::from_parts(TableId::MEMBER_REF, row.rid),
                parent: Token(row.class.token.value()),
                name: self.string(row.name)?,
                signature: self.blob(row.signature)?,
            });
        }
        Ok(member_refs)
    }

    fn method_body(&self, rva: u32) -> Result<Option<MethodBody>> {
        if rva == 0 {
            return Ok(None);
        }

        let file = self.view.file();
        let offset = file.rva_to_offset(rva as usize)?;
        let data = file
            .data()
            .get(offset..)
            .ok_or_else(|| malformed_error!("Method body at RVA 0x{:08x} is out of bounds", rva))?;

        let raw = RawBody::from(data)?;
        let code = data
            .get(raw.size_header..raw.size_header + raw.size_code)
            .ok_or_else(|| malformed_error!("Method body at RVA 0x{:08x} is truncated", rva))?;
        let max_stack = u16::try_from(raw.max_stack)
            .map_err(|_| malformed_error!("Method body at RVA 0x{:08x} has max stack {}", rva, raw.max_stack))?;

        Ok(Some(MethodBody {
            max_stack,
            init_locals: raw.is_init_local,
            local_var_sig: (raw.local_var_sig_token != 0).then_some(Token(raw.local_var_sig_token)),
            code: code.to_vec(),
        }))
    }

    fn field(&mut self, rid: u32) -> Result<Option<FieldDef>> {
        let Some(row) = self.tables.table::<FieldRaw>().and_then(|table| table.get(rid)) else {
            return Ok(None);
        };

        let token = Token::from_parts(TableId::FIELD, rid);
        let mut field = FieldDef::new(
            token,
            &self.string(row.name)?,
            row.flags,
            &self.blob(row.signature)?,
        );
        field.custom_attributes = self.take_attributes(token);
        Ok(Some(field))
    }

    fn method(&mut self, rid: u32) -> Result<Option<MethodDef>> {
        let Some(row) = self
            .tables
            .table::<MethodDefRaw>()
            .and_then(|table| table.get(rid))
        else {
            return Ok(None);
        };

        let token = Token::from_parts(TableId::METHOD_DEF, rid);
        let mut method = MethodDef::new(
            token,
            &self.string(row.name)?,
            row.flags,
            &self.blob(row.signature)?,
        );
        method.impl_flags = row.impl_flags;
        method.body = self.method_body(row.rva)?;
        method.custom_attributes = self.take_attributes(token);
        Ok(Some(method))
    }

    /// Accessor methods by the token of the property or event they belong to
    fn semantics(&self) -> HashMap<Token, Vec<(u32, Token)>> {
        let mut semantics: HashMap<Token, Vec<(u32, Token)>> = HashMap::new();
        if let Some(table) = self.tables.table::<MethodSemanticsRaw>() {
            for row in table {
                semantics
                    .entry(Token(row.association.token.value()))
                    .or_default()
                    .push((
                        row.semantics,
                        Token::from_parts(TableId::METHOD_DEF, row.method),
                    ));
            }
        }
        semantics
    }

    fn properties(
        &mut self,
        range: (u32, u32),
        semantics: &HashMap<Token, Vec<(u32, Token)>>,
    ) -> Result<Vec<PropertyDef>> {
        let mut properties = Vec::new();
        for rid in range.0..range.1 {
            let Some(row) = self
                .tables
                .table::<PropertyRaw>()
                .and_then(|table| table.get(rid))
            else {
                continue;
            };

            let token = Token::from_parts(TableId::PROPERTY, rid);
            let accessor = |kind: u32| {
                semantics.get(&token).and_then(|methods| {
                    methods
                        .iter()
                        .find(|(semantic, _)| *semantic & kind != 0)
                        .map(|(_, method)| *method)
                })
            };

            let mut property = PropertyDef::new(
                token,
                &self.string(row.name)?,
                accessor(SEMANTICS_GETTER),
                accessor(SEMANTICS_SETTER),
            );
            property.flags = narrow(row.flags, "property flags")?;
            property.signature = self.blob(row.signature)?;
            property.custom_attributes = self.take_attributes(token);
            properties.push(property);
        }
        Ok(properties)
    }

    fn events(
        &mut self,
        range: (u32, u32),
        semantics: &HashMap<Token, Vec<(u32, Token)>>,
    ) -> Result<Vec<EventDef>> {
        let mut events = Vec::new();
        for rid in range.0..range.1 {
            let Some(row) = self.tables.table::<EventRaw>().and_then(|table| table.get(rid))
            else {
                continue;
            };

            let token = Token::from_parts(TableId::EVENT, rid);
            let accessor = |kind: u32| {
                semantics.get(&token).and_then(|methods| {
                    methods
                        .iter()
                        .find(|(semantic, _)| *semantic & kind != 0)
                        .map(|(_, method)| *method)
                })
            };

            events.push(EventDef {
                token,
                name: self.string(row.name)?,
                flags: narrow(row.flags, "event flags")?,
                event_type: coded_token(&row.event_type),
                add_method: accessor(SEMANTICS_ADD_ON),
                remove_method: accessor(SEMANTICS_REMOVE_ON),
                raise_method: accessor(SEMANTICS_FIRE),
                custom_attributes: self.take_attributes(token),
            });
        }
        Ok(events)
    }

    /// All type definitions except `<Module>`, nested into their enclosing types
    fn types(&mut self) -> Result<Vec<TypeDef>> {
        let Some(table) = self.tables.table::<TypeDefRaw>() else {
            return Ok(Vec::new());
        };
        let rows: Vec<TypeDefRaw> = table.iter().collect();

        let field_end = self.tables.table_row_count(RawTable::Field) + 1;
        let method_end = self.tables.table_row_count(RawTable::MethodDef) + 1;
        let property_ranges = self.property_ranges();
        let event_ranges = self.event_ranges();
        let semantics = self.semantics();

        let mut interfaces: HashMap<u32, Vec<Token>> = HashMap::new();
        if let Some(table) = self.tables.table::<InterfaceImplRaw>() {
            for row in table {
                if let Some(interface) = coded_token(&row.interface) {
                    interfaces.entry(row.class).or_default().push(interface);
                }
            }
        }

        let mut types: HashMap<u32, TypeDef> = HashMap::new();
        for (index, row) in rows.iter().enumerate().skip(1) {
            let next = rows.get(index + 1);
            let fields = list_range(
                row.field_list,
                next.map_or(field_end, |next| next.field_list),
                field_end,
            );
            let methods = list_range(
                row.method_list,
                next.map_or(method_end, |next| next.method_list),
                method_end,
            );

            let token = Token::from_parts(TableId::TYPE_DEF, row.rid);
            let mut ty = TypeDef::new(
                token,
                &self.string(row.type_namespace)?,
                &self.string(row.type_name)?,
                row.flags,
            );
            ty.extends = coded_token(&row.extends);
            ty.interfaces = interfaces.remove(&row.rid).unwrap_or_default();
            for rid in fields.0..fields.1 {
                if let Some(field) = self.field(rid)? {
                    ty.fields.push(field);
                }
            }
            for rid in methods.0..methods.1 {
                if let Some(method) = self.method(rid)? {
                    ty.methods.push(method);
                }
            }
            if let Some(range) = property_ranges.get(&row.rid) {
                ty.properties = self.properties(*range, &semantics)?;
            }
            if let Some(range) = event_ranges.get(&row.rid) {
                ty.events = self.events(*range, &semantics)?;
            }
            ty.custom_attributes = self.take_attributes(token);
            types.insert(row.rid, ty);
        }

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut nested = HashSet::new();
        if let Some(table) = self.tables.table::<NestedClassRaw>() {
            for row in table {
                if types.contains_key(&row.nested_class) && types.contains_key(&row.enclosing_class)
                {
                    children
                        .entry(row.enclosing_class)
                        .or_default()
                        .push(row.nested_class);
                    nested.insert(row.nested_class);
                }
            }
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }

        let mut top_level = Vec::new();
        for row in rows.iter().skip(1) {
            if nested.contains(&row.rid) {
                continue;
            }
            if let Some(ty) = assemble(row.rid, &mut types, &children) {
                top_level.push(ty);
            }
        }

        if !types.is_empty() {
            return Err(malformed_error!(
                "{} nested types form a cycle or have no enclosing type",
                types.len()
            ));
        }
        Ok(top_level)
    }

    fn property_ranges(&self) -> HashMap<u32, (u32, u32)> {
        let end = self.tables.table_row_count(RawTable::Property) + 1;
        let rows: Vec<PropertyMapRaw> = self
            .tables
            .table::<PropertyMapRaw>()
            .map(|table| table.iter().collect())
            .unwrap_or_default();

        rows.iter()
            .enumerate()
            .map(|(index, row)| {
                let next = rows.get(index + 1).map_or(end, |next| next.property_list);
                (row.parent, list_range(row.property_list, next, end))
            })
            .collect()
    }

    fn event_ranges(&self) -> HashMap<u32, (u32, u32)> {
        let end = self.tables.table_row_count(RawTable::Event) + 1;
        let rows: Vec<EventMapRaw> = self
            .tables
            .table::<EventMapRaw>()
            .map(|table| table.iter().collect())
            .unwrap_or_default();

        rows.iter()
            .enumerate()
            .map(|(index, row)| {
                let next = rows.get(index + 1).map_or(end, |next| next.event_list);
                (row.parent, list_range(row.event_list, next, end))
            })
            .collect()
    }
}

/// Take `rid` out of `types` with all its nested types attached
fn assemble(
    rid: u32,
    types: &mut HashMap<u32, TypeDef>,
    children: &HashMap<u32, Vec<u32>>,
) -> Option<TypeDef> {
    let mut ty = types.remove(&rid)?;
    if let Some(nested) = children.get(&rid) {
        for child in nested {
            if let Some(child) = assemble(*child, types, children) {
                ty.nested_types.push(child);
            }
        }
    }
    Some(ty)
}

/// The half-open row range of a list column, clamped to the table
fn list_range(start: u32, next: u32, end: u32) -> (u32, u32) {
    let start = start.clamp(1, end);
    (start, next.clamp(start, end))
}

/// The token a coded index points at; `None` for a null index
fn coded_token(index: &CodedIndex) -> Option<Token> {
    (index.row != 0).then(|| Token(index.token.value()))
}

fn version(major: u32, minor: u32, build: u32, revision: u32) -> Result<AssemblyVersion> {
    Ok(AssemblyVersion::new(
        narrow(major, "major version")?,
        narrow(minor, "minor version")?,
        narrow(build, "build number")?,
        narrow(revision, "revision number")?,
    ))
}

fn narrow(value: u32, what: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| malformed_error!("{} {} does not fit 16 bits", what, value))
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

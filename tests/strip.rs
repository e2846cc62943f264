//! End-to-end tests of the stripping pass over hand-built assemblies.
//!
//! Each test builds an assembly through the public model API, strips it, and checks the
//! properties every stripped assembly must have: the surface is closed under visibility,
//! accessors, attributes, base types and member references only point at retained
//! definitions, and every method throws.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use dotstub::{
    metadata::{
        customattributes::CustomAttribute,
        flags::{FieldAttributes, MemberAccess, TypeAttributes, TypeVisibility},
        members::{EventDef, FieldDef, PropertyDef},
        method::{Instruction, MethodBody, MethodDef, OpCode, Operand},
        module::Module,
        references::{
            AssemblyName, AssemblyRef, AssemblyVersion, MemberRef, ResolutionScope, TypeRef,
        },
        token::{TableId, Token},
        typesystem::TypeDef,
    },
    Assembly, AssemblyCache, AssemblyReader, AssemblyWriter, NullResolver, PeImage,
    StripConfig, Stripper, VisibilityPolicy,
};

const HIDE_BY_SIG: u32 = 0x0080;
const ACCESSOR: u32 = HIDE_BY_SIG | 0x0800;
const CTOR: u32 = HIDE_BY_SIG | 0x0800 | 0x1000;

// Signature blobs
const VOID: &[u8] = &[0x20, 0x00, 0x01]; // instance void ()
const INT_TO_INT: &[u8] = &[0x20, 0x01, 0x08, 0x08]; // instance int32 (int32)
const INT_SETTER: &[u8] = &[0x20, 0x01, 0x01, 0x08]; // instance void (int32)
const STRING_GETTER: &[u8] = &[0x20, 0x00, 0x0E]; // instance string ()
const STRING_SETTER: &[u8] = &[0x20, 0x01, 0x01, 0x0E]; // instance void (string)
const HANDLER: &[u8] = &[0x20, 0x01, 0x01, 0x12, 0x05]; // instance void (class EventHandler)
const INT_FIELD: &[u8] = &[0x06, 0x08];
const OBJECT_FIELD: &[u8] = &[0x06, 0x1C];

/// `tests/samples/<name>`, if that sample image is present
fn sample(name: &str) -> Option<PathBuf> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/samples").join(name);
    path.exists().then_some(path)
}

fn version(major: u16) -> AssemblyVersion {
    AssemblyVersion::new(major, 0, 0, 0)
}

fn assembly_name(name: &str, major: u16) -> AssemblyName {
    AssemblyName {
        name: name.to_string(),
        version: version(major),
        culture: None,
        public_key_token: None,
    }
}

fn real_body() -> MethodBody {
    MethodBody::from_instructions(
        2,
        &[
            Instruction::simple(OpCode::LDARG_1),
            Instruction::new(OpCode::LDC_I4, Operand::Int32(2)),
            Instruction::simple(OpCode::RET),
        ],
    )
    .unwrap()
}

fn method(row: u32, name: &str, access: MemberAccess, extra: u32, signature: &[u8]) -> MethodDef {
    MethodDef::new(
        Token(0x0600_0000 | row),
        name,
        access.apply(extra),
        signature,
    )
    .with_body(real_body())
}

fn class(row: u32, name: &str, flags: u32) -> TypeDef {
    TypeDef::new(Token(0x0200_0000 | row), "Sample", name, flags)
}

fn library_class(row: u32, name: &str, flags: u32) -> TypeDef {
    TypeDef::new(Token(0x0200_0000 | row), "Library", name, flags)
}

/// `public class A { public int F(int x); private int _x; protected int P { private set; } }`
fn scenario_a() -> Assembly {
    Assembly::new("Sample", version(1)).with_type(
        class(2, "A", TypeAttributes::PUBLIC)
            .with_field(FieldDef::new(
                Token(0x0400_0001),
                "_x",
                FieldAttributes::PRIVATE,
                INT_FIELD,
            ))
            .with_method(method(1, "F", MemberAccess::Public, HIDE_BY_SIG, INT_TO_INT))
            .with_method(method(2, "set_P", MemberAccess::Private, ACCESSOR, INT_SETTER))
            .with_method(method(3, ".ctor", MemberAccess::Public, CTOR, VOID))
            .with_property(PropertyDef::new(
                Token(0x1700_0001),
                "P",
                None,
                Some(Token(0x0600_0002)),
            )),
    )
}

/// A broad assembly: nested types, events, interfaces, attributes of every visibility, and a
/// public type deriving from an internal one that a member reference points into
fn library() -> Assembly {
    let attribute_ctor = |row| method(row, ".ctor", MemberAccess::Public, CTOR, VOID);

    let mut assembly = Assembly::new("Library", version(1))
        .with_reference(AssemblyRef::new(Token(0x2300_0001), &assembly_name("Dependency", 2)))
        .with_type(library_class(2, "InternalBase", TypeAttributes::NOT_PUBLIC).with_method(attribute_ctor(10)))
        .with_type(library_class(3, "PublicAttribute", TypeAttributes::PUBLIC).with_method(attribute_ctor(1)))
        .with_type(library_class(4, "InternalAttribute", TypeAttributes::NOT_PUBLIC).with_method(attribute_ctor(2)))
        .with_type(
            library_class(5, "IHidden", TypeAttributes::NOT_PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT)
                .with_method(MethodDef::new(
                    Token(0x0600_0003),
                    "Hidden",
                    MemberAccess::Public.apply(HIDE_BY_SIG | 0x0400 | 0x0040),
                    VOID,
                )),
        )
        .with_type({
            let mut widget = library_class(6, "Widget", TypeAttributes::PUBLIC)
                .with_attribute(CustomAttribute::new(Token(0x0600_0001)))
                .with_attribute(CustomAttribute::new(Token(0x0600_0002)))
                .with_attribute(CustomAttribute::new(Token(0x0A00_0001)))
                .with_field(FieldDef::new(Token(0x0400_0001), "Count", FieldAttributes::PUBLIC, INT_FIELD))
                .with_field(FieldDef::new(Token(0x0400_0002), "State", FieldAttributes::FAMILY, INT_FIELD))
                .with_field(FieldDef::new(Token(0x0400_0003), "_cache", FieldAttributes::PRIVATE, OBJECT_FIELD))
                .with_method(method(4, "get_Name", MemberAccess::Public, ACCESSOR, STRING_GETTER))
                .with_method(method(5, "set_Name", MemberAccess::Assembly, ACCESSOR, STRING_SETTER))
                .with_method(method(6, "add_Changed", MemberAccess::Family, ACCESSOR, HANDLER))
                .with_method(method(7, "remove_Changed", MemberAccess::Family, ACCESSOR, HANDLER))
                .with_method(method(8, "OnChanged", MemberAccess::FamOrAssem, HIDE_BY_SIG, VOID))
                .with_property(PropertyDef::new(Token(0x1700_0001), "Name", Some(Token(0x0600_0004)), Some(Token(0x0600_0005))))
                .with_event(EventDef::new(Token(0x1400_0001), "Changed", Some(Token(0x0600_0006)), Some(Token(0x0600_0007))))
                .with_nested(
                    TypeDef::new(Token(0x0200_0007), "", "Options", TypeAttributes::NESTED_PUBLIC)
                        .with_method(method(9, "Reset", MemberAccess::Public, HIDE_BY_SIG, VOID))
                        .with_nested(TypeDef::new(Token(0x0200_0008), "", "Secret", TypeAttributes::NESTED_PRIVATE)),
                )
                .with_nested(TypeDef::new(Token(0x0200_0009), "", "Helper", TypeAttributes::NESTED_FAMILY));
            widget.interfaces = vec![Token(0x0200_0005)];
            widget
        })
        .with_type({
            let mut derived = library_class(10, "Derived", TypeAttributes::PUBLIC);
            derived.extends = Some(Token(0x0200_0002));
            derived
        });

    assembly.main_module_mut().unwrap().member_refs.push(MemberRef {
        token: Token(0x0A00_0002),
        parent: Token(0x0200_0002),
        name: ".ctor".to_string(),
        signature: VOID.to_vec(),
    });
    assembly
}

/// Every type, field, method, property and event in `assembly`, named by its full path
fn surface(assembly: &Assembly) -> Vec<String> {
    fn collect(ty: &TypeDef, owner: String, names: &mut Vec<String>) {
        names.push(owner.clone());
        names.extend(ty.fields.iter().map(|f| format!("{owner}::{}", f.name)));
        names.extend(ty.methods.iter().map(|m| format!("{owner}::{}", m.name)));
        names.extend(ty.properties.iter().map(|p| format!("{owner}::{}", p.name)));
        names.extend(ty.events.iter().map(|e| format!("{owner}::{}", e.name)));
        for nested in &ty.nested_types {
            collect(nested, format!("{owner}/{}", nested.name), names);
        }
    }

    let mut names = Vec::new();
    for ty in &assembly.main_module().unwrap().types {
        collect(ty, ty.full_name(), &mut names);
    }
    names.sort();
    names
}

fn stub_constructor(assembly: &Assembly) -> Token {
    let module = assembly.main_module().unwrap();
    module
        .member_refs
        .iter()
        .find(|member| {
            module
                .type_ref(member.parent)
                .is_some_and(|parent| parent.name == "NotImplementedException")
        })
        .map(|member| member.token)
        .unwrap()
}

/// Every `TypeDef` token in base types, interfaces and member reference parents names a type
/// still in `module`, and every `TypeRef` base is a reference the module has
fn assert_type_tokens_resolve(module: &Module) {
    let defined: HashSet<Token> = module.all_types().iter().map(|ty| ty.token).collect();
    let resolves = |token: Token| match token.table() {
        TableId::TYPE_DEF => defined.contains(&token),
        TableId::TYPE_REF => module.type_ref(token).is_some(),
        _ => true,
    };

    for ty in module.all_types() {
        if let Some(base) = ty.extends {
            assert!(resolves(base), "{} extends 0x{:08x}", ty.full_name(), base.value());
        }
        for interface in &ty.interfaces {
            assert!(resolves(*interface), "{} implements 0x{:08x}", ty.full_name(), interface.value());
        }
    }
    for member_ref in &module.member_refs {
        assert!(
            !member_ref.parent.is_table(TableId::TYPE_DEF) || resolves(member_ref.parent),
            "{} is declared on 0x{:08x}",
            member_ref.name,
            member_ref.parent.value()
        );
    }
}

#[test]
fn public_type_with_private_members() {
    let mut assembly = scenario_a();
    Stripper::default()
        .strip(&mut assembly, &NullResolver)
        .unwrap();

    let module = assembly.main_module().unwrap();
    assert_eq!(module.types.len(), 1);

    let a = &module.types[0];
    assert_eq!(a.name, "A");
    assert_eq!(a.visibility(), TypeVisibility::Public);
    assert!(a.fields.is_empty());
    assert!(a.properties.is_empty());

    let names: Vec<_> = a.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["F", ".ctor"]);

    let ctor = stub_constructor(&assembly);
    let f = &a.methods[0];
    assert_eq!(f.signature, INT_TO_INT);
    assert!(f.body.as_ref().unwrap().is_stub(ctor));
    assert_eq!(
        f.body.as_ref().unwrap().encode().unwrap(),
        [0x1A, 0x73, ctor.row() as u8, 0x00, 0x00, 0x0A, 0x7A]
    );
}

#[test]
fn no_public_types_yields_empty_module() {
    let mut assembly = Assembly::new("Internal", version(1))
        .with_type(class(2, "Hidden", TypeAttributes::NOT_PUBLIC).with_method(method(
            1,
            "Run",
            MemberAccess::Public,
            HIDE_BY_SIG,
            VOID,
        )));

    let stats = Stripper::default()
        .strip(&mut assembly, &NullResolver)
        .unwrap();

    assert!(assembly.main_module().unwrap().types.is_empty());
    assert_eq!(stats.types_removed, 1);
    assert_eq!(stats.methods_stubbed, 0);
}

#[test]
fn legacy_core_library_reference_is_removed() {
    let legacy = AssemblyName {
        public_key_token: Some(0x89e0_3419_565c_7ab7),
        ..assembly_name("mscorlib", 2)
    };
    let mut assembly = scenario_a()
        .with_reference(AssemblyRef::new(Token(0x2300_0001), &legacy))
        .with_reference(AssemblyRef::new(Token(0x2300_0002), &assembly_name("Newtonsoft.Json", 12)));
    assembly.main_module_mut().unwrap().type_refs.push(TypeRef {
        token: Token(0x0100_0001),
        scope: ResolutionScope::AssemblyRef(Token(0x2300_0001)),
        namespace: "System".to_string(),
        name: "Object".to_string(),
    });

    let stats = Stripper::new(StripConfig::extended())
        .strip(&mut assembly, &NullResolver)
        .unwrap();
    assert_eq!(stats.references_removed, 1);

    let input_references: Vec<_> = assembly
        .references
        .iter()
        .filter(|reference| reference.token.row() <= 2)
        .map(|reference| reference.name.as_str())
        .collect();
    assert_eq!(input_references, vec!["Newtonsoft.Json"]);

    // The added core library reference takes over the orphaned type references
    let core = assembly
        .references
        .iter()
        .find(|reference| reference.name == "mscorlib")
        .unwrap();
    assert_eq!(core.version.major, 4);
    for type_ref in &assembly.main_module().unwrap().type_refs {
        assert_eq!(type_ref.scope, ResolutionScope::AssemblyRef(core.token));
    }
}

#[test]
fn strict_surface() {
    let mut assembly = library();
    Stripper::default()
        .strip(&mut assembly, &NullResolver)
        .unwrap();

    assert_eq!(
        surface(&assembly),
        vec![
            "Library.Derived",
            "Library.PublicAttribute",
            "Library.PublicAttribute::.ctor",
            "Library.Widget",
            "Library.Widget/Options",
            "Library.Widget/Options::Reset",
            "Library.Widget::Count",
            "Library.Widget::Name",
            "Library.Widget::get_Name",
        ]
    );

    let widget = assembly.main_module().unwrap().find_type("Library", "Widget").unwrap();
    let attributes: Vec<_> = widget
        .custom_attributes
        .iter()
        .map(|attribute| attribute.constructor)
        .collect();
    assert_eq!(attributes, vec![Some(Token(0x0600_0001))]);
    assert_eq!(widget.properties[0].getter, Some(Token(0x0600_0004)));
    assert_eq!(widget.properties[0].setter, None);
    assert!(widget.interfaces.is_empty());
}

#[test]
fn extended_surface_keeps_protected_members() {
    let mut assembly = library();
    Stripper::new(StripConfig::extended())
        .strip(&mut assembly, &NullResolver)
        .unwrap();

    assert_eq!(
        surface(&assembly),
        vec![
            "Library.Derived",
            "Library.PublicAttribute",
            "Library.PublicAttribute::.ctor",
            "Library.Widget",
            "Library.Widget/Options",
            "Library.Widget/Options::Reset",
            "Library.Widget::Changed",
            "Library.Widget::Count",
            "Library.Widget::Name",
            "Library.Widget::State",
            "Library.Widget::add_Changed",
            "Library.Widget::get_Name",
            "Library.Widget::remove_Changed",
        ]
    );
}

#[test]
fn stripped_assembly_invariants() {
    for config in [StripConfig::strict(), StripConfig::extended()] {
        let policy = config.policy;
        let mut assembly = library();
        let stats = Stripper::new(config)
            .strip(&mut assembly, &NullResolver)
            .unwrap();
        assert_eq!(stats.member_refs_removed, 1);
        assert_eq!(stats.types_rebased, 1);

        let ctor = stub_constructor(&assembly);
        let module = assembly.main_module().unwrap();
        assert_type_tokens_resolve(module);

        // InternalBase has no retained base left, so Derived falls back to System.Object
        let derived = module.find_type("Library", "Derived").unwrap();
        let object = module.type_ref(derived.extends.unwrap()).unwrap();
        assert_eq!((object.namespace.as_str(), object.name.as_str()), ("System", "Object"));
        assert_eq!(
            object.scope,
            module.type_ref(module.member_ref(ctor).unwrap().parent).unwrap().scope
        );

        for ty in &module.types {
            assert_eq!(ty.visibility(), TypeVisibility::Public);
            ty.visit(&mut |ty: &TypeDef| {
                for nested in &ty.nested_types {
                    assert_eq!(nested.visibility(), TypeVisibility::NestedPublic);
                }
                for field in &ty.fields {
                    assert!(policy.retains(field.access()), "{}", field.name);
                }
                for method in &ty.methods {
                    assert!(policy.retains(method.access()), "{}", method.name);
                    assert!(method.body.as_ref().unwrap().is_stub(ctor), "{}", method.name);
                    assert!(!method.is_internal_call());
                }

                let accessor_ok = |token: Option<Token>| token.map_or(true, |t| ty.method(t).is_some());
                for property in &ty.properties {
                    assert!(!property.has_no_accessors());
                    assert!(accessor_ok(property.getter) && accessor_ok(property.setter));
                }
                for event in &ty.events {
                    assert!(!event.has_no_accessors());
                    assert!(accessor_ok(event.add_method) && accessor_ok(event.remove_method));
                    assert!(accessor_ok(event.raise_method));
                }
            });
        }

        if policy == VisibilityPolicy::Extended {
            assert!(!assembly
                .references
                .iter()
                .any(|r| r.name == "mscorlib" && r.version.major == 2));
        }
    }
}

#[test]
fn abstract_and_internal_call_methods_are_stubbed() {
    // static void ()
    let mut extern_method = method(2, "Native", MemberAccess::Public, HIDE_BY_SIG | 0x0010, &[0x00, 0x00, 0x01]);
    extern_method.impl_flags = 0x1000;
    extern_method.body = None;

    let mut assembly = Assembly::new("Sample", version(1)).with_type(
        class(2, "Shape", TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT)
            .with_method(MethodDef::new(
                Token(0x0600_0001),
                "Area",
                MemberAccess::Public.apply(HIDE_BY_SIG | 0x0400 | 0x0040),
                &[0x20, 0x00, 0x0D],
            ))
            .with_method(extern_method),
    );

    let stats = Stripper::default()
        .strip(&mut assembly, &NullResolver)
        .unwrap();
    assert_eq!(stats.methods_stubbed, 2);

    let ctor = stub_constructor(&assembly);
    let shape = &assembly.main_module().unwrap().types[0];
    for method in &shape.methods {
        assert!(method.body.as_ref().unwrap().is_stub(ctor));
        assert!(!method.is_internal_call());
    }
}

#[test]
fn stripping_twice_changes_nothing() {
    for config in [StripConfig::strict(), StripConfig::extended()] {
        let stripper = Stripper::new(config);
        let mut once = library();
        stripper.strip(&mut once, &NullResolver).unwrap();

        let mut twice = once.clone();
        let stats = stripper.strip(&mut twice, &NullResolver).unwrap();

        assert_eq!(once, twice);
        assert_eq!(stats.types_removed, 0);
        assert_eq!(stats.methods_removed, 0);
        assert_eq!(stats.attributes_removed, 0);
        assert_eq!(stats.references_removed, 0);
    }
}

#[test]
fn attributes_from_resolved_dependency() {
    // Dependency defines one public and one internal attribute
    let ctor = |row| method(row, ".ctor", MemberAccess::Public, CTOR, VOID);
    let dependency = Assembly::new("Dependency", version(2))
        .with_type(class(2, "Shown", TypeAttributes::PUBLIC).with_method(ctor(1)))
        .with_type(class(3, "Hidden", TypeAttributes::NOT_PUBLIC).with_method(ctor(2)));

    let mut assembly = Assembly::new("Consumer", version(1))
        .with_reference(AssemblyRef::new(Token(0x2300_0001), &assembly_name("Dependency", 2)))
        .with_type(
            class(2, "Thing", TypeAttributes::PUBLIC)
                .with_attribute(CustomAttribute::new(Token(0x0A00_0001)))
                .with_attribute(CustomAttribute::new(Token(0x0A00_0002))),
        );
    {
        let module = assembly.main_module_mut().unwrap();
        for (row, name) in [(1, "Shown"), (2, "Hidden")] {
            module.type_refs.push(TypeRef {
                token: Token(0x0100_0000 | row),
                scope: ResolutionScope::AssemblyRef(Token(0x2300_0001)),
                namespace: "Sample".to_string(),
                name: name.to_string(),
            });
            module.member_refs.push(MemberRef {
                token: Token(0x0A00_0000 | row),
                parent: Token(0x0100_0000 | row),
                name: ".ctor".to_string(),
                signature: VOID.to_vec(),
            });
        }
    }

    let cache = AssemblyCache::default().with_assembly(dependency);
    let stats = Stripper::default().strip(&mut assembly, &cache).unwrap();

    let thing = &assembly.main_module().unwrap().types[0];
    let kept: Vec<_> = thing
        .custom_attributes
        .iter()
        .map(|attribute| attribute.constructor)
        .collect();
    assert_eq!(kept, vec![Some(Token(0x0A00_0001))]);
    assert_eq!(stats.attributes_removed, 1);

    // Without the dependency neither attribute can be judged visible
    let mut unresolved = assembly.clone();
    Stripper::default()
        .strip(&mut unresolved, &NullResolver)
        .unwrap();
    assert!(unresolved.main_module().unwrap().types[0]
        .custom_attributes
        .is_empty());
}

#[test]
fn netstandard_library_gains_no_mscorlib_reference() {
    let netstandard = AssemblyName {
        public_key_token: Some(0x51dd_2dcd_ff13_7bcc),
        ..assembly_name("netstandard", 2)
    };
    for config in [StripConfig::strict(), StripConfig::extended()] {
        let mut assembly = scenario_a().with_reference(AssemblyRef::new(Token(0x2300_0001), &netstandard));
        Stripper::new(config)
            .strip(&mut assembly, &NullResolver)
            .unwrap();

        let names: Vec<_> = assembly
            .references
            .iter()
            .map(|reference| reference.name.as_str())
            .collect();
        assert_eq!(names, vec!["netstandard"]);

        let module = assembly.main_module().unwrap();
        let exception = module
            .type_ref(module.member_ref(stub_constructor(&assembly)).unwrap().parent)
            .unwrap();
        assert_eq!(exception.scope, ResolutionScope::AssemblyRef(Token(0x2300_0001)));
    }
}

#[test]
fn sample_image_strips_to_closed_surface() {
    let Some(path) = sample("WindowsBase.dll") else {
        println!("Skipping: tests/samples/WindowsBase.dll not found");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("WindowsBase.dll");

    let mut assembly = PeImage.read_file(&path).unwrap();
    let stats = Stripper::new(StripConfig::extended())
        .strip(&mut assembly, &NullResolver)
        .unwrap();
    assert!(stats.types_removed > 0);
    PeImage.write_file(&assembly, &output).unwrap();

    let stripped = PeImage.read_file(&output).unwrap();
    let module = stripped.main_module().unwrap();
    assert_type_tokens_resolve(module);
    assert_eq!(surface(&stripped), surface(&assembly));

    let ctor = stub_constructor(&stripped);
    for ty in module.all_types() {
        for method in &ty.methods {
            if let Some(body) = &method.body {
                assert!(body.is_stub(ctor), "{}::{}", ty.full_name(), method.name);
            }
        }
    }
}

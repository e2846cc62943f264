extern crate dotstub;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use dotstub::{
    metadata::{
        customattributes::CustomAttribute,
        flags::{FieldAttributes, MemberAccess, TypeAttributes},
        members::{FieldDef, PropertyDef},
        method::{Instruction, MethodBody, MethodDef, OpCode, Operand},
        references::AssemblyVersion,
        token::Token,
        typesystem::TypeDef,
    },
    Assembly, AssemblyReader, AssemblyWriter, NullResolver, PeImage, StripConfig, Stripper,
};
use std::{fs, hint::black_box, path::PathBuf};

const TYPES: u32 = 500;
const METHODS_PER_TYPE: u32 = 20;

/// A synthetic assembly: every other type is internal, every other member private
fn synthetic_assembly() -> Assembly {
    let mut assembly = Assembly::new("Synthetic", AssemblyVersion::new(1, 0, 0, 0));
    let mut method_row = 1;
    let mut field_row = 1;
    let mut property_row = 1;

    for t in 0..TYPES {
        let flags = if t % 2 == 0 {
            TypeAttributes::PUBLIC
        } else {
            TypeAttributes::NOT_PUBLIC
        };
        let mut ty = TypeDef::new(
            Token(0x0200_0002 + t),
            "Synthetic",
            &format!("Type{t}"),
            flags,
        )
        .with_attribute(CustomAttribute::new(Token(0x0600_0001)));

        for m in 0..METHODS_PER_TYPE {
            let access = if m % 2 == 0 {
                MemberAccess::Public
            } else {
                MemberAccess::Private
            };
            let token = Token(0x0600_0000 | method_row);
            ty = ty.with_method(
                // instance int32 ()
                MethodDef::new(token, &format!("get_P{m}"), access.apply(0x0880), &[0x20, 0x00, 0x08])
                    .with_body({
                        let mut body = MethodBody::from_instructions(
                            2,
                            &[
                                Instruction::simple(OpCode::LDARG_0),
                                Instruction::new(OpCode::LDFLD, Operand::Token(Token(0x0400_0001))),
                                Instruction::new(OpCode::LDC_I4, Operand::Int32(m as i32)),
                                Instruction::simple(OpCode::RET),
                            ],
                        )
                        .unwrap();
                        body.init_locals = true;
                        body.local_var_sig = Some(Token(0x1100_0001));
                        body
                    }),
            );
            ty = ty.with_property(PropertyDef::new(
                Token(0x1700_0000 | property_row),
                &format!("P{m}"),
                Some(token),
                None,
            ));
            method_row += 1;
            property_row += 1;
        }

        ty = ty
            .with_field(FieldDef::new(Token(0x0400_0000 | field_row), "Value", FieldAttributes::PUBLIC, &[0x06, 0x08]))
            .with_field(FieldDef::new(Token(0x0400_0001 + field_row), "_state", FieldAttributes::PRIVATE, &[0x06, 0x08]));
        field_row += 2;

        assembly = assembly.with_type(ty);
    }

    assembly
}

fn bench_strip(c: &mut Criterion) {
    let assembly = synthetic_assembly();

    let mut group = c.benchmark_group("strip");
    group.throughput(Throughput::Elements(u64::from(TYPES * METHODS_PER_TYPE)));
    for (name, config) in [
        ("strict", StripConfig::strict()),
        ("extended", StripConfig::extended()),
    ] {
        let stripper = Stripper::new(config);
        group.bench_function(name, |b| {
            b.iter_batched(
                || assembly.clone(),
                |mut assembly| {
                    let stats = stripper.strip(&mut assembly, &NullResolver).unwrap();
                    black_box(stats)
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Read, strip and rewrite a real image (WindowsBase.dll from the test samples)
fn bench_image(c: &mut Criterion) {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/samples/WindowsBase.dll");
    let Ok(data) = fs::read(&path) else {
        println!("Skipping image benchmarks: {} not found", path.display());
        return;
    };
    let assembly = PeImage.read(&data).unwrap();
    let mut stripped = assembly.clone();
    Stripper::new(StripConfig::extended())
        .strip(&mut stripped, &NullResolver)
        .unwrap();

    let mut group = c.benchmark_group("image");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.sample_size(10);
    group.bench_function("read", |b| {
        b.iter(|| black_box(PeImage.read(black_box(&data)).unwrap()));
    });
    group.bench_function("write", |b| {
        b.iter(|| black_box(PeImage.write(black_box(&stripped)).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_strip, bench_image);
criterion_main!(benches);

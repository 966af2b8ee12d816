//! Tests for resolving remote type descriptors

mod common;

use common::{Desc, FieldDesc, Fixture, Shape};
use tyscope_core::prelude::*;
use tyscope_core::runtime::fields;
use tyscope_core::value::ValueMaker;

#[test]
fn test_resolving_twice_returns_same_type()
{
    let mut fx = Fixture::new(Architecture::I386);
    let int32 = fx.primitive(Primitive::Int32);
    let (mut registry, mut process) = fx.finish();

    let first = process.resolve_at(&mut registry, int32).unwrap();
    let decoded = process.stats().decoded;
    let second = process.resolve_at(&mut registry, int32).unwrap();

    assert_eq!(first, second);
    assert_eq!(decoded, 1);
    assert_eq!(process.stats().decoded, 1);
    assert_eq!(process.stats().cache_hits, 1);
    assert_eq!(process.cached(int32), Some(first));
}

#[test]
fn test_shared_element_is_decoded_once()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let uint8 = fx.primitive(Primitive::Uint8);
    let a = fx.pointer(uint8);
    let b = fx.slice(uint8);
    let (mut registry, mut process) = fx.finish();

    let a = process.resolve_at(&mut registry, a).unwrap();
    let b = process.resolve_at(&mut registry, b).unwrap();

    let elem_of = |id| match &registry.get(id).unwrap().maker {
        ValueMaker::Pointer { elem } | ValueMaker::Slice { elem } => *elem,
        other => panic!("unexpected maker {other:?}"),
    };
    assert_eq!(elem_of(a), elem_of(b));
    assert_eq!(process.stats().decoded, 3);
}

#[test]
fn test_named_struct_cycle_terminates()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let node = fx.reserve();
    let next = fx.pointer(node);
    let int32 = fx.primitive(Primitive::Int32);
    let desc = fx.struct_desc(
        Some("main.Node"),
        vec![FieldDesc::named("next", next, 0), FieldDesc::named("value", int32, 8)],
        16,
        8,
    );
    fx.define(node, desc);
    let (mut registry, mut process) = fx.finish();

    let id = process.resolve_at(&mut registry, node).unwrap();

    let layout = registry.struct_layout(id).unwrap().to_vec();
    assert_eq!(layout.len(), 2);
    let next_type = registry.get(layout[0].field_type).unwrap();
    assert_eq!(next_type.maker, ValueMaker::Pointer { elem: id });
    assert_eq!(registry.describe(id), "main.Node");
    assert_eq!(registry.describe(layout[0].field_type), "*main.Node");

    let local = registry.local_type(id).unwrap();
    let universe = registry.universe();
    assert_eq!(
        universe.display(universe.underlying(local)),
        "struct { next *main.Node; value int32 }"
    );
}

#[test]
fn test_struct_layout_uses_descriptor_offsets()
{
    let mut fx = Fixture::new(Architecture::I386);
    let uint8 = fx.primitive(Primitive::Uint8);
    let uint32 = fx.primitive(Primitive::Uint32);
    let pair = fx.structure(
        None,
        vec![FieldDesc::named("a", uint8, 0), FieldDesc::named("b", uint32, 4)],
        8,
        4,
    );
    let (mut registry, mut process) = fx.finish();

    let id = process.resolve_at(&mut registry, pair).unwrap();

    assert_eq!(registry.field_offset(id, 0), Some(0));
    assert_eq!(registry.field_offset(id, 1), Some(4));
    let ty = registry.get(id).unwrap();
    assert_eq!(ty.size(), 8);
    assert_eq!(ty.field_align(), 4);
    assert_eq!(registry.describe(id), "struct { a uint8; b uint32 }");
}

#[test]
fn test_packed_offsets_are_not_recomputed()
{
    // Offsets come from the target's compiler, even when they are not what
    // natural alignment would give.
    let mut fx = Fixture::new(Architecture::I386);
    let uint8 = fx.primitive(Primitive::Uint8);
    let uint32 = fx.primitive(Primitive::Uint32);
    let packed = fx.structure(
        None,
        vec![FieldDesc::named("a", uint8, 0), FieldDesc::named("b", uint32, 1)],
        5,
        1,
    );
    let (mut registry, mut process) = fx.finish();

    let id = process.resolve_at(&mut registry, packed).unwrap();
    assert_eq!(registry.field_offset(id, 1), Some(1));
    assert_eq!(registry.get(id).unwrap().size(), 5);
}

#[test]
fn test_manual_and_remote_primitives_agree()
{
    // (primitive, size, field alignment) on amd64
    let expected = [
        (Primitive::Bool, 1, 1),
        (Primitive::Uint8, 1, 1),
        (Primitive::Uint16, 2, 2),
        (Primitive::Uint32, 4, 4),
        (Primitive::Uint64, 8, 8),
        (Primitive::Uint, 4, 4),
        (Primitive::Uintptr, 8, 8),
        (Primitive::Int8, 1, 1),
        (Primitive::Int16, 2, 2),
        (Primitive::Int32, 4, 4),
        (Primitive::Int64, 8, 8),
        (Primitive::Int, 4, 4),
        (Primitive::Float32, 4, 4),
        (Primitive::Float64, 8, 8),
        (Primitive::Float, 4, 4),
        (Primitive::String, 12, 8),
    ];
    assert_eq!(expected.len(), Primitive::ALL.len());

    let mut fx = Fixture::new(Architecture::Amd64);
    let descriptors: Vec<_> = expected
        .iter()
        .map(|&(primitive, size, align)| {
            let tag = fx.tag(RuntimeKind::Primitive(primitive));
            fx.describe(Desc {
                tag,
                size,
                align,
                name: None,
                shape: Shape::Plain,
            })
        })
        .collect();
    let (mut registry, mut process) = fx.finish();

    for (&(primitive, size, align), address) in expected.iter().zip(descriptors) {
        let remote = process.resolve_at(&mut registry, address).unwrap();
        let local = registry.universe().primitive(primitive);
        let manual = registry.resolve_manual(local, Architecture::Amd64).unwrap();

        let remote_layout = registry.layout(remote).unwrap();
        let manual_layout = registry.layout(manual).unwrap();
        assert_eq!(remote_layout, manual_layout, "{primitive}");
        assert_eq!(remote_layout, Layout { size, field_align: align }, "{primitive}");
        assert_eq!(registry.local_type(remote), Some(local));
        assert_eq!(registry.get(remote).unwrap().maker, ValueMaker::Scalar(primitive));
    }
}

#[test]
fn test_unmodeled_kinds_fall_back_to_uintptr()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let chan = fx.unmodeled(UnmodeledKind::Chan);
    let func = fx.unmodeled(UnmodeledKind::Func);
    let (mut registry, mut process) = fx.finish();

    for address in [chan, func] {
        let id = process.resolve_at(&mut registry, address).unwrap();
        let ty = registry.get(id).unwrap();
        assert_eq!(ty.size(), 8);
        assert_eq!(ty.maker, ValueMaker::Scalar(Primitive::Uintptr));
        let value = ty.make_value(Address::from(0x1000)).into_scalar().unwrap();
        assert_eq!(value.kind, Primitive::Uintptr);
        assert_eq!(registry.describe(id), "uintptr");
    }
}

#[test]
fn test_every_unmodeled_kind_resolves()
{
    let kinds = [
        UnmodeledKind::Map,
        UnmodeledKind::Chan,
        UnmodeledKind::Func,
        UnmodeledKind::Interface,
        UnmodeledKind::UnsafePointer,
        UnmodeledKind::DotDotDot,
    ];
    let mut fx = Fixture::new(Architecture::I386);
    let addresses: Vec<_> = kinds.iter().map(|kind| fx.unmodeled(*kind)).collect();
    let (mut registry, mut process) = fx.finish();

    for address in addresses {
        let id = process.resolve_at(&mut registry, address).unwrap();
        assert_eq!(registry.layout(id).unwrap().size, 4);
    }
}

#[test]
fn test_unknown_kind_tag_is_fatal()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let bogus = fx.describe(Desc {
        tag: 0xdead_beef,
        size: 8,
        align: 8,
        name: None,
        shape: Shape::Plain,
    });
    let (mut registry, mut process) = fx.finish();

    let err = process.resolve_at(&mut registry, bogus).unwrap_err();
    match err {
        TyscopeError::UnknownTypeKind { address, tag, symbol } => {
            assert_eq!(address, bogus);
            assert_eq!(tag, 0xdead_beef);
            assert_eq!(symbol, None);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(process.cached(bogus), None);
}

#[test]
fn test_unknown_kind_names_nearest_symbol()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let bogus = fx.describe(Desc {
        tag: 0x0040_1010,
        size: 8,
        align: 8,
        name: None,
        shape: Shape::Plain,
    });
    let mut symbols = Fixture::kind_symbols();
    symbols.insert("main.someFunction", Address::from(0x0040_1000), 0x40);
    let (mut registry, process) = fx.finish();
    let mut process = process.with_symbols(Box::new(symbols));

    let err = process.resolve_at(&mut registry, bogus).unwrap_err();
    assert!(matches!(
        &err,
        TyscopeError::UnknownTypeKind { symbol: Some(name), .. } if name == "main.someFunction"
    ));
    assert!(err.to_string().contains("main.someFunction"));
    assert!(err.to_string().contains(&bogus.to_string()));
}

#[test]
fn test_failed_resolution_leaves_no_entries()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let int32 = fx.primitive(Primitive::Int32);
    let bogus = fx.describe(Desc {
        tag: 0x1234,
        size: 4,
        align: 4,
        name: None,
        shape: Shape::Plain,
    });
    let pair = fx.structure(
        Some("main.Broken"),
        vec![FieldDesc::named("ok", int32, 0), FieldDesc::named("bad", bogus, 4)],
        8,
        4,
    );
    let (mut registry, mut process) = fx.finish();

    assert!(process.resolve_at(&mut registry, pair).is_err());
    assert_eq!(process.cached(pair), None);
    assert_eq!(process.cached(int32), None);
    assert_eq!(process.cached(bogus), None);
    assert_eq!(process.cached_count(), 0);

    // The session stays usable.
    let id = process.resolve_at(&mut registry, int32).unwrap();
    assert_eq!(registry.describe(id), "int32");
}

#[test]
fn test_array_and_slice_composition()
{
    for arch in Architecture::ALL {
        let mut fx = Fixture::new(arch);
        let int32 = fx.primitive(Primitive::Int32);
        let point = fx.structure(None, vec![FieldDesc::named("x", int32, 0)], 4, 4);
        let array = fx.array(3, point, 4, 4);
        let slice = fx.slice(point);
        let (mut registry, mut process) = fx.finish();

        let point = process.resolve_at(&mut registry, point).unwrap();
        let array = process.resolve_at(&mut registry, array).unwrap();
        let slice = process.resolve_at(&mut registry, slice).unwrap();

        let point_size = registry.layout(point).unwrap().size;
        assert_eq!(registry.layout(array).unwrap().size, 3 * point_size);
        assert_eq!(
            registry.layout(slice).unwrap().size,
            arch.pointer_size() + 2 * arch.int_size()
        );
        assert_eq!(registry.describe(array), "[3]struct { x int32 }");
        assert_eq!(registry.describe(slice), "[]struct { x int32 }");
        assert_eq!(registry.get(array).unwrap().maker, ValueMaker::Array { len: 3, elem: point });
    }
}

#[test]
fn test_unnamed_cycle_is_reported()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let looped = fx.reserve();
    let desc = fx.pointer_desc(looped);
    fx.define(looped, desc);
    let (mut registry, mut process) = fx.finish();

    let err = process.resolve_at(&mut registry, looped).unwrap_err();
    assert!(matches!(err, TyscopeError::UnnamedTypeCycle(address) if address == looped));
    assert_eq!(process.cached(looped), None);
    assert_eq!(process.stats().reparsed, 1);
}

#[test]
fn test_unnamed_type_in_named_cycle_is_decoded_again()
{
    // S = struct { next *T }, T = main.T struct { back *S }; only T is named.
    let mut fx = Fixture::new(Architecture::Amd64);
    let s = fx.reserve();
    let t = fx.reserve();
    let to_s = fx.pointer(s);
    let to_t = fx.pointer(t);
    let t_desc = fx.struct_desc(Some("main.T"), vec![FieldDesc::named("back", to_s, 0)], 8, 8);
    fx.define(t, t_desc);
    let s_desc = fx.struct_desc(None, vec![FieldDesc::named("next", to_t, 0)], 8, 8);
    fx.define(s, s_desc);
    let (mut registry, mut process) = fx.finish();

    let s_id = process.resolve_at(&mut registry, s).unwrap();

    assert_eq!(registry.describe(s_id), "struct { next *main.T }");
    assert_eq!(process.stats().reparsed, 2);
    assert_eq!(process.stats().decoded, 6);

    let t_id = process.cached(t).unwrap();
    let back = registry.struct_layout(t_id).unwrap()[0].field_type;
    assert_eq!(registry.get(back).unwrap().maker, ValueMaker::Pointer { elem: s_id });
    let next = registry.struct_layout(s_id).unwrap()[0].field_type;
    assert_eq!(registry.get(next).unwrap().maker, ValueMaker::Pointer { elem: t_id });
    assert!(process.cached(to_s).is_some_and(|id| registry.is_resolved(id)));
}

#[test]
fn test_nil_element_descriptor_is_fatal()
{
    let mut fx = Fixture::new(Architecture::I386);
    let dangling = fx.pointer(Address::NULL);
    let (mut registry, mut process) = fx.finish();

    let err = process.resolve_at(&mut registry, dangling).unwrap_err();
    assert!(matches!(err, TyscopeError::NilDescriptor { address, .. } if address == dangling));
}

#[test]
fn test_named_primitive_keeps_its_name()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let celsius = fx.named_primitive("main.Celsius", Primitive::Float64);
    let (mut registry, mut process) = fx.finish();

    let id = process.resolve_at(&mut registry, celsius).unwrap();
    assert_eq!(registry.describe(id), "main.Celsius");
    let local = registry.local_type(id).unwrap();
    let universe = registry.universe();
    assert_eq!(universe.underlying(local), universe.primitive(Primitive::Float64));
    assert_eq!(registry.get(id).unwrap().maker, ValueMaker::Scalar(Primitive::Float64));
}

#[test]
fn test_embedded_field_is_anonymous()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let int64 = fx.primitive(Primitive::Int64);
    let base = fx.structure(Some("main.Base"), vec![FieldDesc::named("id", int64, 0)], 8, 8);
    let derived = fx.structure(
        Some("main.Derived"),
        vec![FieldDesc::embedded(base, 0), FieldDesc::named("extra", int64, 8)],
        16,
        8,
    );
    let (mut registry, mut process) = fx.finish();

    let id = process.resolve_at(&mut registry, derived).unwrap();
    let universe = registry.universe();
    let LocalType::Struct(fields) = universe.get(universe.underlying(registry.local_type(id).unwrap())) else {
        panic!("not a struct");
    };
    assert!(fields[0].is_anonymous());
    assert_eq!(fields[1].name.as_deref(), Some("extra"));
    assert_eq!(universe.display(fields[0].ty), "main.Base");
}

#[test]
fn test_descriptor_tracing_does_not_change_results()
{
    let build = || {
        let mut fx = Fixture::new(Architecture::Amd64);
        let node = fx.reserve();
        let next = fx.pointer(node);
        let desc = fx.struct_desc(Some("main.Node"), vec![FieldDesc::named("next", next, 0)], 8, 8);
        fx.define(node, desc);
        (node, fx.finish())
    };

    let (node, (mut quiet_registry, mut quiet)) = build();
    let quiet_id = quiet.resolve_at(&mut quiet_registry, node).unwrap();

    let (node, (mut traced_registry, traced)) = build();
    let mut traced = traced
        .with_symbols(Box::new(Fixture::kind_symbols()))
        .with_config(ResolverConfig::default().with_trace_descriptors(true));
    let traced_id = traced.resolve_at(&mut traced_registry, node).unwrap();

    assert_eq!(quiet_registry.describe(quiet_id), traced_registry.describe(traced_id));
    assert_eq!(quiet.stats(), traced.stats());
}

#[test]
fn test_kind_table_from_symbols_matches_fixture()
{
    let fx = Fixture::new(Architecture::Amd64);
    let table = KindTable::from_symbols(&Fixture::kind_symbols());
    assert_eq!(table.len(), RuntimeKind::SYMBOLS.len());
    for kind in RuntimeKind::all() {
        assert_eq!(table.tag_of(kind), Some(fx.tag(kind)), "{kind}");
    }
}

#[test]
fn test_huge_field_count_is_rejected()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let int32 = fx.primitive(Primitive::Int32);
    let record = fx.structure(None, vec![FieldDesc::named("x", int32, 0)], 4, 4);

    // Corrupt the `fields` slice header: length and capacity 0xffffffff.
    let struct_type = fx.record_of(record);
    let fields_at = fx
        .registry
        .field_offset(fx.runtime.struct_type, fields::struct_type::FIELDS)
        .unwrap();
    let (ptr, int) = (fx.arch.pointer_size(), fx.arch.int_size());
    fx.write_word(struct_type + fields_at + ptr, int, 0xffff_ffff);
    fx.write_word(struct_type + fields_at + ptr + int, int, 0xffff_ffff);
    let (mut registry, mut process) = fx.finish();

    let err = process.resolve_at(&mut registry, record).unwrap_err();
    assert!(matches!(err, TyscopeError::MalformedDescriptor { address, .. } if address == record));
    assert!(err.to_string().contains(&record.to_string()));
    assert_eq!(process.cached_count(), 0);

    // The field type is still decodable on its own.
    assert!(process.resolve_at(&mut registry, int32).is_ok());
}

#[test]
fn test_foreign_registry_is_rejected()
{
    let mut fx = Fixture::new(Architecture::Amd64);
    let int32 = fx.primitive(Primitive::Int32);
    let (mut registry, mut process) = fx.finish();
    let mut other = TypeRegistry::new();
    assert_ne!(registry.id(), other.id());

    assert!(matches!(
        process.resolve_at(&mut other, int32),
        Err(TyscopeError::InvalidArgument(_))
    ));
    let descriptor = process.type_descriptor(&registry, int32).unwrap();
    assert!(matches!(
        process.resolve_remote(&mut other, &descriptor),
        Err(TyscopeError::InvalidArgument(_))
    ));
    assert!(other.is_empty());
    assert_eq!(process.cached_count(), 0);

    // Ids of one registry are unknown to another.
    let id = process.resolve_remote(&mut registry, &descriptor).unwrap();
    assert!(matches!(
        other.make_value(id, Address::from(0x10)),
        Err(TyscopeError::UnresolvedType(unknown)) if unknown == id
    ));
    assert!(other.slot(id).is_none());
    assert_eq!(other.describe(id), format!("<unresolved {id}>"));
}

#[test]
fn test_session_is_send()
{
    fn assert_send<T: Send>() {}
    assert_send::<RemoteProcess>();
    assert_send::<TypeRegistry>();
}

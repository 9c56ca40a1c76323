use pare_ir::ir::IrBuilder;
use pare_ir::{AccessFlags, Program};
use pare_lens::{GraphLens, LensBuilder, LensKind};
use pretty_assertions::assert_eq;

use super::{FieldAccessInfoCollection, FieldAccessInfoModifier};
use crate::test_helpers::{class, field, method, object_class, with_body};

/// `A(int v) { this.x = v; }`, `int A.get() { return this.x; }` and
/// `static int B.peek(A a) { return a.y; }`.
fn sample_program() -> Program {
    let x = field("Lp/A;", "x", "I");
    let y = field("Lp/A;", "y", "I");
    let mut a = class("Lp/A;", "Ljava/lang/Object;");
    a.methods.push(with_body(
        method("Lp/A;", "<init>", "V", &["I"]),
        AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR,
        |b: &mut IrBuilder| {
            let (this, v) = (b.argument(0), b.argument(1));
            b.instance_put(x, this, v);
            b.ret(None);
        },
    ));
    a.methods.push(with_body(
        method("Lp/A;", "get", "I", &[]),
        AccessFlags::PUBLIC,
        |b: &mut IrBuilder| {
            let this = b.argument(0);
            let value = b.instance_get(x, this);
            b.ret(Some(value));
        },
    ));
    let mut b = class("Lp/B;", "Ljava/lang/Object;");
    b.methods.push(with_body(
        method("Lp/B;", "peek", "I", &["Lp/A;"]),
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        |b: &mut IrBuilder| {
            let a = b.argument(0);
            let value = b.instance_get(y, a);
            b.ret(Some(value));
        },
    ));
    [object_class(), a, b].into_iter().collect()
}

#[test]
fn compute_records_readers_and_writers() {
    let info = FieldAccessInfoCollection::compute(&sample_program()).unwrap();
    let x = field("Lp/A;", "x", "I");
    let y = field("Lp/A;", "y", "I");

    assert_eq!(info.len(), 2);
    assert!(info.is_read(&x) && info.is_written(&x));
    assert!(info.is_read(&y) && !info.is_written(&y));
    let x_info = info.get(&x).unwrap();
    assert!(x_info.is_written_only_in_initializers(&x));
    assert_eq!(
        x_info.readers().cloned().collect::<Vec<_>>(),
        vec![method("Lp/A;", "get", "I", &[])]
    );
}

#[test]
fn merged_fields_share_their_accesses() {
    let info = FieldAccessInfoCollection::compute(&sample_program()).unwrap();
    let mut builder = LensBuilder::new(LensKind::HorizontalClassMerger);
    builder.move_field(field("Lp/A;", "y", "I"), field("Lp/A;", "x", "I"));
    let lens = builder.build(&GraphLens::identity()).unwrap();

    let rewritten = info.rewritten_with_lens(&lens, &GraphLens::identity());
    let x = rewritten.get(&field("Lp/A;", "x", "I")).unwrap();
    assert_eq!(rewritten.len(), 1);
    assert_eq!(x.readers().count(), 2);
    assert_eq!(x.writers().count(), 1);
}

#[test]
fn modifier_adds_synthesized_accesses() {
    let info = FieldAccessInfoCollection::compute(&sample_program()).unwrap();
    let y = field("Lp/A;", "y", "I");
    let mut modifier = FieldAccessInfoModifier::new();
    assert!(modifier.is_empty());
    modifier.record_write(y, method("Lp/B;", "poke", "V", &["Lp/A;"]));
    modifier.record_read(field("Lp/A;", "z", "J"), method("Lp/B;", "peek", "I", &["Lp/A;"]));

    let updated = modifier.apply(&info);
    assert!(updated.is_written(&y));
    assert!(!updated.get(&y).unwrap().is_written_only_in_initializers(&y));
    assert_eq!(updated.len(), 3);
    assert_eq!(updated.iter().count(), 3);
    assert!(!updated.is_empty());
}

use pare_ir::ir::{InvokeKind, IrBuilder, IrCode, Op, Terminator};
use pare_ir::{known, MethodRef};
use pare_lens::{ExtraParameter, GraphLens, LensBuilder, LensKind, PrototypeChanges};
use pretty_assertions::assert_eq;

use super::LensCodeRewriter;
use crate::test_helpers::{field, method, ty};

fn body(reference: &MethodRef, is_static: bool, build: impl FnOnce(&mut IrBuilder)) -> IrCode {
    let mut b = IrBuilder::new(reference.clone(), is_static);
    build(&mut b);
    b.finish().unwrap()
}

fn ops(code: &IrCode) -> Vec<&Op> {
    code.instructions().map(|(_, insn)| &insn.op).collect()
}

/// `C` merged into `A`; `C.y:D` and `A.y:B` become `A.y:Object`.
fn merge_c_into_a() -> GraphLens {
    let mut builder = LensBuilder::new(LensKind::HorizontalClassMerger);
    builder.move_type(ty("Lp/C;"), ty("Lp/A;"));
    builder.move_field(field("Lp/C;", "y", "Lp/D;"), field("Lp/A;", "y", "Ljava/lang/Object;"));
    builder.move_field(field("Lp/A;", "y", "Lp/B;"), field("Lp/A;", "y", "Ljava/lang/Object;"));
    builder.build(&GraphLens::identity()).unwrap()
}

#[test]
fn identity_lens_keeps_the_body() {
    let m = method("Lp/Main;", "read", "Lp/D;", &["Lp/C;"]);
    let code = body(&m, true, |b| {
        let c = b.argument(0);
        let value = b.instance_get(field("Lp/C;", "y", "Lp/D;"), c);
        b.ret(Some(value));
    });
    let lens = GraphLens::identity();
    let rewritten = LensCodeRewriter::new(&lens, &lens).rewrite(code.clone(), &m, true);
    assert_eq!(rewritten, code);
}

#[test]
fn widened_field_read_is_cast_back() {
    let m = method("Lp/Main;", "read", "Lp/D;", &["Lp/C;"]);
    let code = body(&m, true, |b| {
        let c = b.argument(0);
        let value = b.instance_get(field("Lp/C;", "y", "Lp/D;"), c);
        b.ret(Some(value));
    });
    let lens = merge_c_into_a();
    let code_lens = GraphLens::identity();
    let rewriter = LensCodeRewriter::new(&lens, &code_lens);
    let current = lens.lookup_method(&m, None, InvokeKind::Static, &code_lens).reference;
    assert_eq!(current, method("Lp/Main;", "read", "Lp/D;", &["Lp/A;"]));

    let rewritten = rewriter.rewrite(code, &current, true);
    let emitted = ops(&rewritten);
    let [Op::InstanceGet { field: read, .. }, Op::CheckCast { value, ty: cast }] = emitted[..]
    else {
        panic!("expected a read followed by a cast, got {emitted:?}");
    };
    assert_eq!(*read, field("Lp/A;", "y", "Ljava/lang/Object;"));
    assert_eq!(*cast, ty("Lp/D;"));
    assert_eq!(rewritten.value_type(*value), known::object());
    assert_eq!(rewritten.value_type(rewritten.arguments[0]), ty("Lp/A;"));
    assert_eq!(rewritten.method, current);
    assert!(rewritten.verify().is_ok());
}

#[test]
fn merged_constructor_calls_pass_the_class_id() {
    let m = method("Lp/Main;", "make", "V", &[]);
    let c_init = method("Lp/C;", "<init>", "V", &[]);
    let code = body(&m, true, |b| {
        let object = b.emit_value(Op::NewInstance(ty("Lp/C;")), ty("Lp/C;"));
        b.invoke(InvokeKind::Direct, c_init.clone(), vec![object]);
        b.ret(None);
    });

    let merged = method("Lp/A;", "<init>", "V", &["I"]);
    let mut builder = LensBuilder::new(LensKind::HorizontalClassMerger);
    builder.move_type(ty("Lp/C;"), ty("Lp/A;"));
    builder.move_method(c_init.clone(), merged.clone());
    builder.record_call_site_changes(
        c_init,
        PrototypeChanges::none().with_extra_parameter(ExtraParameter::ConstantInt(1)),
    );
    let lens = builder.build(&GraphLens::identity()).unwrap();
    let code_lens = GraphLens::identity();
    let rewritten = LensCodeRewriter::new(&lens, &code_lens).rewrite(code, &m, true);

    let emitted = ops(&rewritten);
    assert_eq!(emitted[0], &Op::NewInstance(ty("Lp/A;")));
    assert_eq!(emitted[1], &Op::ConstInt(1));
    let Op::Invoke { method, args, kind, .. } = emitted[2] else {
        panic!("expected an invoke, got {:?}", emitted[2]);
    };
    assert_eq!(*method, merged);
    assert_eq!(*kind, InvokeKind::Direct);
    assert_eq!(args.len(), 2);
    assert!(rewritten.verify().is_ok());
}

#[test]
fn removed_argument_becomes_a_constant() {
    let old = method("Lp/Main;", "pick", "I", &["I", "I"]);
    let new = method("Lp/Main;", "pick", "I", &["I"]);
    let code = body(&old, true, |b| {
        let second = b.argument(1);
        b.ret(Some(second));
    });
    let mut builder = LensBuilder::new(LensKind::Synthetic);
    builder.move_method(old.clone(), new.clone());
    builder.record_prototype_changes(
        new.clone(),
        PrototypeChanges::none().with_removed_argument(1, known::int(), Some(7)),
    );
    let lens = builder.build(&GraphLens::identity()).unwrap();
    let code_lens = GraphLens::identity();
    let rewriter = LensCodeRewriter::new(&lens, &code_lens);

    let rewritten = rewriter.rewrite(code, &new, true);
    assert_eq!(rewritten.arguments.len(), 1);
    let entry = &rewritten.blocks[0];
    assert_eq!(entry.body[0].op, Op::ConstInt(7));
    assert_eq!(entry.terminator, Terminator::Return(entry.body[0].dest));
    assert!(rewritten.verify().is_ok());

    let caller = method("Lp/Main;", "call", "I", &[]);
    let call = body(&caller, true, |b| {
        let (one, two) = (b.const_int(1), b.const_int(2));
        let result = b.invoke(InvokeKind::Static, old.clone(), vec![one, two]);
        b.ret(result);
    });
    let rewritten = rewriter.rewrite(call, &caller, true);
    let emitted = ops(&rewritten);
    let Op::Invoke { method, args, .. } = emitted[2] else {
        panic!("expected an invoke, got {emitted:?}");
    };
    assert_eq!(*method, new);
    assert_eq!(args.len(), 1);
}

#[test]
fn merged_catch_guards_drop_the_second_handler() {
    let m = method("Lp/Main;", "guarded", "V", &[]);
    let code = body(&m, true, |b| {
        let first = b.new_block();
        let second = b.new_block();
        let exit = b.new_block();
        b.add_catch_handler(ty("Lp/E1;"), first);
        b.add_catch_handler(ty("Lp/E2;"), second);
        b.invoke(InvokeKind::Static, method("Lp/Main;", "risky", "V", &[]), vec![]);
        b.terminate(Terminator::Goto(exit));
        for block in [first, second, exit] {
            b.switch_to(block);
            b.ret(None);
        }
    });
    let mut builder = LensBuilder::new(LensKind::HorizontalClassMerger);
    builder.move_type(ty("Lp/E2;"), ty("Lp/E1;"));
    let lens = builder.build(&GraphLens::identity()).unwrap();
    let code_lens = GraphLens::identity();

    let rewritten = LensCodeRewriter::new(&lens, &code_lens).rewrite(code, &m, true);
    assert_eq!(rewritten.blocks.len(), 3);
    let handlers = &rewritten.blocks[0].catch_handlers;
    assert_eq!(handlers.len(), 1);
    assert_eq!(handlers[0].guard, ty("Lp/E1;"));
    assert!(rewritten.verify().is_ok());
}

#[test]
fn rewriting_stops_at_the_code_lens() {
    let m = method("Lp/Main;", "make", "Lp/C;", &[]);
    let code = body(&m, true, |b| {
        let object = b.emit_value(Op::NewInstance(ty("Lp/C;")), ty("Lp/C;"));
        b.ret(Some(object));
    });
    let lens = merge_c_into_a();
    let rewritten = LensCodeRewriter::new(&lens, &lens).rewrite(code.clone(), &m, true);
    assert_eq!(rewritten, code);
}

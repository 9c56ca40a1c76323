//! Shared test helpers for building IR bodies.

use crate::ir::{BinopKind, IfKind, IfType, IrBuilder, IrCode, NumericType, Op, Terminator};
use crate::{known, MethodRef, Proto, TypeRef};

pub(crate) fn method(holder: &str, name: &str, ret: TypeRef, params: &[TypeRef]) -> MethodRef {
    MethodRef::new(TypeRef::new(holder), name, Proto::new(ret, params.to_vec()))
}

/// `static int pick(int a) { return a == 0 ? 2 : 1; }` as a diamond.
pub(crate) fn diamond() -> IrCode {
    let mut b = IrBuilder::new(
        method("Lt/T;", "pick", known::int(), &[known::int()]),
        true,
    );
    let a = b.argument(0);
    let then_block = b.new_block();
    let else_block = b.new_block();
    let join = b.new_block();
    b.terminate(Terminator::If {
        kind: IfKind::Eq,
        ty: IfType::Int,
        lhs: a,
        rhs: None,
        target: else_block,
    });

    b.switch_to(then_block);
    let one = b.const_int(1);
    b.terminate(Terminator::Goto(join));

    b.switch_to(else_block);
    let two = b.const_int(2);
    b.terminate(Terminator::Goto(join));

    b.switch_to(join);
    let result = b.phi(known::int(), vec![one, two]);
    b.ret(Some(result));
    b.finish().unwrap_or_else(|e| panic!("diamond is well formed: {e}"))
}

/// `static int count(int n) { int i = 0; while (i < n) i = i + 1; return i; }`
pub(crate) fn counting_loop() -> IrCode {
    let mut b = IrBuilder::new(
        method("Lt/T;", "count", known::int(), &[known::int()]),
        true,
    );
    let n = b.argument(0);
    let header = b.new_block();
    let body = b.new_block();
    let exit = b.new_block();

    let zero = b.const_int(0);
    b.terminate(Terminator::Goto(header));

    // The phi's second operand is defined later, in the loop body.
    b.switch_to(body);
    let one = b.const_int(1);
    b.switch_to(header);
    let i = b.phi(known::int(), vec![zero, zero]);
    b.terminate(Terminator::If {
        kind: IfKind::Ge,
        ty: IfType::Int,
        lhs: i,
        rhs: Some(n),
        target: exit,
    });

    b.switch_to(body);
    let next = b.emit_value(
        Op::Binop {
            op: BinopKind::Add,
            ty: NumericType::Int,
            lhs: i,
            rhs: one,
        },
        known::int(),
    );
    b.terminate(Terminator::Goto(header));

    b.switch_to(exit);
    b.ret(Some(i));
    let mut code = b
        .finish()
        .unwrap_or_else(|e| panic!("loop is well formed: {e}"));
    code.blocks[header.index()].phis[0].operands[1] = next;
    code
}

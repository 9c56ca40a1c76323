//! LIR opcode table.
//!
//! Opcodes are grouped so families (invokes, branches, binary operations)
//! can be encoded and decoded arithmetically.

use crate::ir::{BinopKind, IfKind, IfType, InvokeKind, NumericType};

// ── Single-byte instructions ────────────────────────────────────────

pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_0: u8 = 0x02;
pub const ICONST_1: u8 = 0x03;
pub const ICONST_2: u8 = 0x04;
pub const ICONST_3: u8 = 0x05;
pub const ICONST_4: u8 = 0x06;
pub const ICONST_5: u8 = 0x07;
pub const RETURN: u8 = 0x08;
pub const DEBUGPOS: u8 = 0x09;
pub const FALLTHROUGH: u8 = 0x0A;

/// Opcodes from here on carry an operand-length byte.
pub const FIRST_OPERAND_OPCODE: u8 = 0x10;

// ── Constants and allocation ────────────────────────────────────────

pub const ICONST: u8 = 0x10;
pub const LCONST: u8 = 0x11;
/// Load a pool constant: string, type, method handle or prototype.
pub const LDC: u8 = 0x12;
pub const NEW: u8 = 0x13;
pub const NEWARRAY: u8 = 0x14;
pub const NEWUNBOXEDENUM: u8 = 0x15;

// ── Arrays and fields ───────────────────────────────────────────────

pub const ARRAYGET: u8 = 0x16;
pub const ARRAYPUT: u8 = 0x17;
pub const ARRAYLENGTH: u8 = 0x18;
pub const GETSTATIC: u8 = 0x19;
pub const PUTSTATIC: u8 = 0x1A;
pub const GETFIELD: u8 = 0x1B;
pub const PUTFIELD: u8 = 0x1C;

// ── Invokes ─────────────────────────────────────────────────────────

pub const INVOKESTATIC: u8 = 0x20;
pub const INVOKESTATIC_ITF: u8 = 0x21;
pub const INVOKEVIRTUAL: u8 = 0x22;
pub const INVOKEINTERFACE: u8 = 0x23;
pub const INVOKEDIRECT: u8 = 0x24;
pub const INVOKEDIRECT_ITF: u8 = 0x25;
pub const INVOKESUPER: u8 = 0x26;
pub const INVOKESUPER_ITF: u8 = 0x27;
pub const INVOKECUSTOM: u8 = 0x28;

// ── Types and arithmetic ────────────────────────────────────────────

pub const CHECKCAST: u8 = 0x29;
pub const INSTANCEOF: u8 = 0x2A;
/// `IADD..=IUSHR` in [`BinopKind::ALL`] order.
pub const IBINOP_BASE: u8 = 0x30;
/// `LADD..=LUSHR` in [`BinopKind::ALL`] order.
pub const LBINOP_BASE: u8 = 0x40;

// ── Control flow ────────────────────────────────────────────────────

pub const GOTO: u8 = 0x50;
/// `IFEQZ..=IFLEZ`: int compared against zero.
pub const IFZ_BASE: u8 = 0x51;
pub const IFNULL: u8 = 0x57;
pub const IFNONNULL: u8 = 0x58;
/// `IF_ICMPEQ..=IF_ICMPLE`.
pub const IF_ICMP_BASE: u8 = 0x59;
pub const IF_ACMPEQ: u8 = 0x5F;
pub const IF_ACMPNE: u8 = 0x60;
pub const RETURN_VALUE: u8 = 0x61;
pub const THROW: u8 = 0x62;
pub const PHI: u8 = 0x63;

const IF_KINDS: [IfKind; 6] = [
    IfKind::Eq,
    IfKind::Ne,
    IfKind::Lt,
    IfKind::Ge,
    IfKind::Gt,
    IfKind::Le,
];

#[expect(
    clippy::cast_possible_truncation,
    reason = "IF_KINDS has six entries"
)]
fn if_kind_ordinal(kind: IfKind) -> u8 {
    IF_KINDS.iter().position(|&k| k == kind).unwrap_or(0) as u8
}

pub fn is_one_byte(opcode: u8) -> bool {
    opcode < FIRST_OPERAND_OPCODE
}

pub fn invoke_opcode(kind: InvokeKind, is_interface: bool) -> u8 {
    match (kind, is_interface) {
        (InvokeKind::Static, false) => INVOKESTATIC,
        (InvokeKind::Static, true) => INVOKESTATIC_ITF,
        (InvokeKind::Virtual, _) => INVOKEVIRTUAL,
        (InvokeKind::Interface, _) => INVOKEINTERFACE,
        (InvokeKind::Direct, false) => INVOKEDIRECT,
        (InvokeKind::Direct, true) => INVOKEDIRECT_ITF,
        (InvokeKind::Super, false) => INVOKESUPER,
        (InvokeKind::Super, true) => INVOKESUPER_ITF,
    }
}

pub fn decode_invoke(opcode: u8) -> Option<(InvokeKind, bool)> {
    Some(match opcode {
        INVOKESTATIC => (InvokeKind::Static, false),
        INVOKESTATIC_ITF => (InvokeKind::Static, true),
        INVOKEVIRTUAL => (InvokeKind::Virtual, false),
        INVOKEINTERFACE => (InvokeKind::Interface, true),
        INVOKEDIRECT => (InvokeKind::Direct, false),
        INVOKEDIRECT_ITF => (InvokeKind::Direct, true),
        INVOKESUPER => (InvokeKind::Super, false),
        INVOKESUPER_ITF => (InvokeKind::Super, true),
        _ => return None,
    })
}

pub fn binop_opcode(op: BinopKind, ty: NumericType) -> u8 {
    let base = match ty {
        NumericType::Int => IBINOP_BASE,
        NumericType::Long => LBINOP_BASE,
    };
    base + op.ordinal()
}

pub fn decode_binop(opcode: u8) -> Option<(BinopKind, NumericType)> {
    let count = BinopKind::ALL.len();
    let (base, ty) = if (IBINOP_BASE..IBINOP_BASE + 16).contains(&opcode) {
        (IBINOP_BASE, NumericType::Int)
    } else if (LBINOP_BASE..LBINOP_BASE + 16).contains(&opcode) {
        (LBINOP_BASE, NumericType::Long)
    } else {
        return None;
    };
    let idx = usize::from(opcode - base);
    (idx < count).then(|| (BinopKind::ALL[idx], ty))
}

/// Branch opcode, or `None` for ordered comparisons of references.
pub fn if_opcode(kind: IfKind, ty: IfType, has_rhs: bool) -> Option<u8> {
    match (ty, has_rhs) {
        (IfType::Int, false) => Some(IFZ_BASE + if_kind_ordinal(kind)),
        (IfType::Int, true) => Some(IF_ICMP_BASE + if_kind_ordinal(kind)),
        (IfType::Object, false) => match kind {
            IfKind::Eq => Some(IFNULL),
            IfKind::Ne => Some(IFNONNULL),
            _ => None,
        },
        (IfType::Object, true) => match kind {
            IfKind::Eq => Some(IF_ACMPEQ),
            IfKind::Ne => Some(IF_ACMPNE),
            _ => None,
        },
    }
}

/// Kind, operand type and whether the branch has a second operand.
pub fn decode_if(opcode: u8) -> Option<(IfKind, IfType, bool)> {
    match opcode {
        IFNULL => Some((IfKind::Eq, IfType::Object, false)),
        IFNONNULL => Some((IfKind::Ne, IfType::Object, false)),
        IF_ACMPEQ => Some((IfKind::Eq, IfType::Object, true)),
        IF_ACMPNE => Some((IfKind::Ne, IfType::Object, true)),
        op if (IFZ_BASE..IFZ_BASE + 6).contains(&op) => {
            Some((IF_KINDS[usize::from(op - IFZ_BASE)], IfType::Int, false))
        }
        op if (IF_ICMP_BASE..IF_ICMP_BASE + 6).contains(&op) => {
            Some((IF_KINDS[usize::from(op - IF_ICMP_BASE)], IfType::Int, true))
        }
        _ => None,
    }
}

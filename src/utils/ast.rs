use crate::utils::info::InfoNode;

use strum_macros::EnumIter;
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum ElemSize {
    #[default] Bool, I8, I16, I32, I64, U8, U16, U32, U64, F32, F64
}

impl ElemSize {
    pub fn is_boolean(&self) -> bool {
        match self {
            ElemSize::Bool => true,
            _ => false
        }
    }

    pub fn is_signed_integer(&self) -> bool {
        match self {
            ElemSize::I8 | ElemSize::I16 | ElemSize::I32 | ElemSize::I64 => true,
            _ => false
        }
    }

    pub fn is_unsigned_integer(&self) -> bool {
        match self {
            ElemSize::U8 | ElemSize::U16 | ElemSize::U32 | ElemSize::U64 => true,
            _ => false
        }
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_floating_point(&self) -> bool {
        match self {
            ElemSize::F32 | ElemSize::F64 => true,
            _ => false
        }
    }

    /// Size of one element in bytes, as laid out in device memory.
    pub fn bytes(&self) -> i64 {
        match self {
            ElemSize::Bool | ElemSize::I8 | ElemSize::U8 => 1,
            ElemSize::I16 | ElemSize::U16 => 2,
            ElemSize::I32 | ElemSize::U32 | ElemSize::F32 => 4,
            ElemSize::I64 | ElemSize::U64 | ElemSize::F64 => 8,
        }
    }

    pub fn bits(&self) -> u32 {
        (self.bytes() * 8) as u32
    }

    // The integer type with the same size, used when a value is reinterpreted bit-by-bit (as in
    // compare-and-swap loops over floating-point values).
    pub fn bit_pattern_type(&self) -> ElemSize {
        match self.bytes() {
            1 => ElemSize::U8,
            2 => ElemSize::U16,
            4 => ElemSize::U32,
            _ => ElemSize::U64,
        }
    }
}

impl fmt::Display for ElemSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ElemSize::Bool => write!(f, "bool"),
            ElemSize::I8 => write!(f, "i8"),
            ElemSize::I16 => write!(f, "i16"),
            ElemSize::I32 => write!(f, "i32"),
            ElemSize::I64 => write!(f, "i64"),
            ElemSize::U8 => write!(f, "u8"),
            ElemSize::U16 => write!(f, "u16"),
            ElemSize::U32 => write!(f, "u32"),
            ElemSize::U64 => write!(f, "u64"),
            ElemSize::F32 => write!(f, "f32"),
            ElemSize::F64 => write!(f, "f64"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnOp {
    #[default] Neg, Not, BitNeg, Abs, Exp, Log, Sqrt
}

impl UnOp {
    pub fn is_function(&self) -> bool {
        match self {
            UnOp::Neg | UnOp::Not | UnOp::BitNeg => false,
            UnOp::Abs | UnOp::Exp | UnOp::Log | UnOp::Sqrt => true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinOp {
    #[default] Add, Sub, Mul, Div, Rem, And, Or,
    BitAnd, BitOr, BitXor, BitShl, BitShr,
    Eq, Neq, Leq, Geq, Lt, Gt,
    Max, Min
}

impl BinOp {
    fn prec_idx(&self) -> usize {
        match self {
            BinOp::Or => 2,
            BinOp::And => 3,
            BinOp::BitOr => 4,
            BinOp::BitXor => 5,
            BinOp::BitAnd => 6,
            BinOp::Eq | BinOp::Neq => 7,
            BinOp::Leq | BinOp::Geq | BinOp::Lt | BinOp::Gt => 8,
            BinOp::BitShl | BinOp::BitShr => 10,
            BinOp::Add | BinOp::Sub => 11,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 12,
            BinOp::Max | BinOp::Min => 20
        }
    }

    pub fn precedence(l: &BinOp, r: &BinOp) -> Ordering {
        l.prec_idx().cmp(&r.prec_idx())
    }

    pub fn is_infix(&self) -> bool {
        match self {
            BinOp::Max | BinOp::Min => false,
            _ => true
        }
    }

    pub fn is_comparison(&self) -> bool {
        match self {
            BinOp::Eq | BinOp::Neq | BinOp::Leq | BinOp::Geq | BinOp::Lt | BinOp::Gt => true,
            _ => false
        }
    }

    // Operators for which the order of the operands does not affect the result.
    pub fn is_commutative(&self) -> bool {
        match self {
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::BitAnd |
            BinOp::BitOr | BinOp::BitXor | BinOp::Eq | BinOp::Neq |
            BinOp::Max | BinOp::Min => true,
            _ => false
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitShl => "<<",
            BinOp::BitShr => ">>",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Leq => "<=",
            BinOp::Geq => ">=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Max => "max",
            BinOp::Min => "min",
        }
    }
}

pub trait ExprType<T>: InfoNode {
    fn get_type<'a>(&'a self) -> &'a T;
    fn is_leaf_node(&self) -> bool;
}

#[cfg(test)]
mod test {
    use super::*;

    use strum::IntoEnumIterator;

    #[test]
    fn bit_pattern_type_preserves_size() {
        for sz in ElemSize::iter() {
            assert_eq!(sz.bit_pattern_type().bytes(), sz.bytes());
            assert!(sz.bit_pattern_type().is_unsigned_integer());
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(BinOp::precedence(&BinOp::Mul, &BinOp::Add), Ordering::Greater);
    }

    #[test]
    fn logical_and_binds_tighter_than_or() {
        assert_eq!(BinOp::precedence(&BinOp::Or, &BinOp::And), Ordering::Less);
    }
}

use crate::parhist_runtime_error;
use crate::kernel::ast::{AtomicOp, BinOp, ElemSize, UnOp};
use crate::utils::err::*;
use crate::utils::info::Info;

use std::fmt;

/// A scalar value of the interpreter. Integers of all sizes are stored in a 128-bit integer,
/// normalized to the range of their element type, so that signed and unsigned 64-bit values
/// compare correctly. Single-precision floats are stored rounded to 32 bits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i128, ElemSize),
    Float(f64, ElemSize),
}

fn wrap(v: i128, sz: ElemSize) -> i128 {
    let bits = sz.bits();
    if sz.is_signed_integer() {
        let shift = 128 - bits;
        v.wrapping_shl(shift).wrapping_shr(shift)
    } else {
        v & ((1i128 << bits) - 1)
    }
}

impl Value {
    pub fn int(v: i128, sz: ElemSize) -> Value {
        if sz.is_floating_point() {
            Value::float(v as f64, sz)
        } else if sz.is_boolean() {
            Value::Bool(v != 0)
        } else {
            Value::Int(wrap(v, sz), sz)
        }
    }

    pub fn float(v: f64, sz: ElemSize) -> Value {
        match sz {
            ElemSize::F32 => Value::Float(v as f32 as f64, sz),
            ElemSize::F64 => Value::Float(v, sz),
            _ if sz.is_boolean() => Value::Bool(v != 0.0),
            _ => Value::int(v as i128, sz),
        }
    }

    // The zero value of an element type, used to initialize newly allocated memory.
    pub fn zero(sz: ElemSize) -> Value {
        Value::int(0, sz)
    }

    pub fn elem_size(&self) -> ElemSize {
        match self {
            Value::Bool(_) => ElemSize::Bool,
            Value::Int(_, sz) | Value::Float(_, sz) => *sz,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Bool(b) => *b as i64,
            Value::Int(v, _) => *v as i64,
            Value::Float(v, _) => *v as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            Value::Int(v, _) => *v as f64,
            Value::Float(v, _) => *v,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(v, _) => *v != 0,
            Value::Float(v, _) => *v != 0.0,
        }
    }

    // Converts the value to another element type, with the semantics of a C cast.
    pub fn convert(self, sz: ElemSize) -> Value {
        match self {
            Value::Bool(b) => Value::int(b as i128, sz),
            Value::Int(v, _) => Value::int(v, sz),
            Value::Float(v, _) => Value::float(v, sz),
        }
    }

    pub fn to_bits(&self) -> u64 {
        match self {
            Value::Bool(b) => *b as u64,
            Value::Int(v, sz) => (*v as u64) & mask(*sz),
            Value::Float(v, ElemSize::F32) => (*v as f32).to_bits() as u64,
            Value::Float(v, _) => v.to_bits(),
        }
    }

    // Reinterprets a bit pattern as a value of the given element type.
    pub fn from_bits(bits: u64, sz: ElemSize) -> Value {
        match sz {
            ElemSize::F32 => Value::Float(f32::from_bits(bits as u32) as f64, sz),
            ElemSize::F64 => Value::Float(f64::from_bits(bits), sz),
            _ => Value::int((bits & mask(sz)) as i128, sz),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v, sz) => write!(f, "{v}{sz}"),
            Value::Float(v, sz) => write!(f, "{v}{sz}"),
        }
    }
}

fn mask(sz: ElemSize) -> u64 {
    match sz.bits() {
        64 => u64::MAX,
        n => (1u64 << n) - 1
    }
}

pub fn eval_unop(op: &UnOp, v: Value, sz: ElemSize, i: &Info) -> CompileResult<Value> {
    let r = match (op, v) {
        (UnOp::Neg, Value::Int(x, _)) => Value::int(x.wrapping_neg(), sz),
        (UnOp::Neg, Value::Float(x, _)) => Value::float(-x, sz),
        (UnOp::Not, v) => Value::Bool(!v.as_bool()),
        (UnOp::BitNeg, Value::Int(x, _)) => Value::int(!x, sz),
        (UnOp::BitNeg, Value::Bool(b)) => Value::Bool(!b),
        (UnOp::Abs, Value::Int(x, _)) => Value::int(x.abs(), sz),
        (UnOp::Abs, Value::Float(x, _)) => Value::float(x.abs(), sz),
        (UnOp::Exp, Value::Float(x, _)) => Value::float(x.exp(), sz),
        (UnOp::Log, Value::Float(x, _)) => Value::float(x.ln(), sz),
        (UnOp::Sqrt, Value::Float(x, _)) => Value::float(x.sqrt(), sz),
        (op, v) => parhist_runtime_error!(i, "Unary operator {op:?} is not defined on {v}")?
    };
    Ok(r)
}

fn eval_int_binop(l: i128, op: &BinOp, r: i128, sz: ElemSize, i: &Info) -> CompileResult<Value> {
    let v = match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div | BinOp::Rem if r == 0 => {
            parhist_runtime_error!(i, "Integer division by zero")?
        },
        BinOp::Div => l.wrapping_div(r),
        BinOp::Rem => l.wrapping_rem(r),
        BinOp::BitAnd => l & r,
        BinOp::BitOr => l | r,
        BinOp::BitXor => l ^ r,
        BinOp::BitShl => l.wrapping_shl(r as u32),
        BinOp::BitShr => l.wrapping_shr(r as u32),
        BinOp::Max => i128::max(l, r),
        BinOp::Min => i128::min(l, r),
        BinOp::Eq => return Ok(Value::Bool(l == r)),
        BinOp::Neq => return Ok(Value::Bool(l != r)),
        BinOp::Leq => return Ok(Value::Bool(l <= r)),
        BinOp::Geq => return Ok(Value::Bool(l >= r)),
        BinOp::Lt => return Ok(Value::Bool(l < r)),
        BinOp::Gt => return Ok(Value::Bool(l > r)),
        BinOp::And => return Ok(Value::Bool(l != 0 && r != 0)),
        BinOp::Or => return Ok(Value::Bool(l != 0 || r != 0)),
    };
    Ok(Value::int(v, sz))
}

fn eval_float_binop(l: f64, op: &BinOp, r: f64, sz: ElemSize, i: &Info) -> CompileResult<Value> {
    let v = match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
        BinOp::Rem => l % r,
        BinOp::Max => f64::max(l, r),
        BinOp::Min => f64::min(l, r),
        BinOp::Eq => return Ok(Value::Bool(l == r)),
        BinOp::Neq => return Ok(Value::Bool(l != r)),
        BinOp::Leq => return Ok(Value::Bool(l <= r)),
        BinOp::Geq => return Ok(Value::Bool(l >= r)),
        BinOp::Lt => return Ok(Value::Bool(l < r)),
        BinOp::Gt => return Ok(Value::Bool(l > r)),
        _ => parhist_runtime_error!(i, "Binary operator {op:?} is not defined on floating-point values")?
    };
    Ok(Value::float(v, sz))
}

// Evaluates a binary operation whose result has the given element type. The short-circuiting
// logical operators are evaluated by the caller.
pub fn eval_binop(l: Value, op: &BinOp, r: Value, sz: ElemSize, i: &Info) -> CompileResult<Value> {
    match (l, r) {
        (Value::Float(..), _) | (_, Value::Float(..)) => {
            eval_float_binop(l.as_f64(), op, r.as_f64(), sz, i)
        },
        (Value::Bool(x), Value::Bool(y)) => {
            let v = match op {
                BinOp::And | BinOp::BitAnd => x && y,
                BinOp::Or | BinOp::BitOr => x || y,
                BinOp::BitXor | BinOp::Neq => x != y,
                BinOp::Eq => x == y,
                _ => return eval_int_binop(x as i128, op, y as i128, sz, i)
            };
            Ok(Value::Bool(v))
        },
        (l, r) => {
            let x = match l { Value::Int(x, _) => x, v => v.as_i64() as i128 };
            let y = match r { Value::Int(y, _) => y, v => v.as_i64() as i128 };
            eval_int_binop(x, op, y, sz, i)
        }
    }
}

// Computes the value stored by an atomic operation, given the current and the provided value.
pub fn eval_atomic(op: &AtomicOp, old: Value, v: Value, sz: ElemSize, i: &Info) -> CompileResult<Value> {
    let bop = match op {
        AtomicOp::Add => BinOp::Add,
        AtomicOp::SMin | AtomicOp::UMin => BinOp::Min,
        AtomicOp::SMax | AtomicOp::UMax => BinOp::Max,
        AtomicOp::And => BinOp::BitAnd,
        AtomicOp::Or => BinOp::BitOr,
        AtomicOp::Xor => BinOp::BitXor,
        AtomicOp::Xchg => return Ok(v.convert(sz)),
    };
    eval_binop(old.convert(sz), &bop, v.convert(sz), sz, i)
}

#[cfg(test)]
mod test {
    use super::*;

    fn i() -> Info {
        Info::default()
    }

    #[test]
    fn integers_wrap_to_their_type() {
        assert_eq!(Value::int(300, ElemSize::U8), Value::Int(44, ElemSize::U8));
        assert_eq!(Value::int(128, ElemSize::I8), Value::Int(-128, ElemSize::I8));
        assert_eq!(Value::int(-1, ElemSize::U64), Value::Int(u64::MAX as i128, ElemSize::U64));
    }

    #[test]
    fn unsigned_comparison_uses_full_range() {
        let big = Value::int(-1, ElemSize::U64);
        let one = Value::int(1, ElemSize::U64);
        let r = eval_binop(big, &BinOp::Gt, one, ElemSize::Bool, &i()).unwrap();
        assert_eq!(r, Value::Bool(true));
    }

    #[test]
    fn signed_overflow_wraps() {
        let l = Value::int(i32::MAX as i128, ElemSize::I32);
        let r = eval_binop(l, &BinOp::Add, Value::int(1, ElemSize::I32), ElemSize::I32, &i()).unwrap();
        assert_eq!(r, Value::int(i32::MIN as i128, ElemSize::I32));
    }

    #[test]
    fn division_truncates_towards_zero() {
        let r = eval_binop(Value::int(-7, ElemSize::I64), &BinOp::Div, Value::int(2, ElemSize::I64), ElemSize::I64, &i());
        assert_eq!(r.unwrap(), Value::int(-3, ElemSize::I64));
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        let r = eval_binop(Value::int(1, ElemSize::I64), &BinOp::Rem, Value::int(0, ElemSize::I64), ElemSize::I64, &i());
        assert!(format!("{}", r.unwrap_err()).starts_with("Runtime error"));
    }

    #[test]
    fn float_bit_patterns() {
        let v = Value::float(1.5, ElemSize::F32);
        let bits = v.to_bits();
        assert_eq!(bits, 1.5f32.to_bits() as u64);
        assert_eq!(Value::from_bits(bits, ElemSize::F32), v);
        assert_eq!(Value::from_bits(bits, ElemSize::U32), Value::int(bits as i128, ElemSize::U32));
    }

    #[test]
    fn single_precision_rounds() {
        assert_eq!(Value::float(0.1, ElemSize::F32).as_f64(), 0.1f32 as f64);
    }

    #[test]
    fn atomic_min_respects_signedness() {
        let r = eval_atomic(&AtomicOp::SMin, Value::int(3, ElemSize::I32), Value::int(-2, ElemSize::I32), ElemSize::I32, &i());
        assert_eq!(r.unwrap(), Value::int(-2, ElemSize::I32));
        let r = eval_atomic(&AtomicOp::UMin, Value::int(3, ElemSize::U32), Value::int(-2, ElemSize::U32), ElemSize::U32, &i());
        assert_eq!(r.unwrap(), Value::int(3, ElemSize::U32));
    }
}

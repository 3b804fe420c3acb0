use super::ast::*;
use super::work::apply_lambda;
use crate::kernel::ast::*;
use crate::kernel::ast_builder::*;
use crate::utils::name::Name;

pub const UNLOCKED: i64 = 0;
pub const LOCKED: i64 = 1;

// A table of locks guarding the buckets of operators without a native atomic update. A bucket
// address is mapped to a lock by taking it modulo the number of locks, so distinct buckets may
// share a lock.
#[derive(Clone, Debug, PartialEq)]
pub struct Locking {
    pub locks: Name,
    pub count: Expr,
    pub mem: MemSpace,
}

impl Locking {
    pub fn new(count: Expr, mem: MemSpace) -> Locking {
        Locking {locks: Name::sym_str("locks"), count, mem}
    }

    pub fn hash(&self, addr: Expr) -> Expr {
        rem(addr, self.count.clone())
    }
}

// The local memory taken by a table of the given number of locks.
pub fn lock_table_bytes(count: Expr) -> Expr {
    mul(count, int64(ElemSize::I32.bytes()))
}

#[derive(Clone, Debug, PartialEq)]
pub enum UpdateStrategy {
    // A single hardware atomic operation.
    Primitive(AtomicOp),

    // A retry loop based on compare-and-swap of the bit pattern of the value.
    CompareAndSwap(ElemSize),

    // A critical section guarded by a spin lock.
    Locked(Locking),
}

fn is_param(e: &Expr, id: &Name) -> bool {
    match e {
        Expr::Var {id: x, ..} => x == id,
        _ => false
    }
}

fn supports_native_atomics(sz: &ElemSize) -> bool {
    match sz {
        ElemSize::I32 | ElemSize::U32 | ElemSize::I64 | ElemSize::U64 => true,
        _ => false
    }
}

fn atomic_op_of_binop(op: &BinOp, sz: &ElemSize) -> Option<AtomicOp> {
    match op {
        BinOp::Add => Some(AtomicOp::Add),
        BinOp::Min if sz.is_signed_integer() => Some(AtomicOp::SMin),
        BinOp::Min => Some(AtomicOp::UMin),
        BinOp::Max if sz.is_signed_integer() => Some(AtomicOp::SMax),
        BinOp::Max => Some(AtomicOp::UMax),
        BinOp::BitAnd => Some(AtomicOp::And),
        BinOp::BitOr => Some(AtomicOp::Or),
        BinOp::BitXor => Some(AtomicOp::Xor),
        _ => None
    }
}

// Recognizes operators that combine a single integer value using one binary operation on the two
// parameters (in either order for commutative operations), or that replace the current value.
fn primitive_atomic(op: &ReductionOperator) -> Option<AtomicOp> {
    match (&op.dests[..], &op.lambda.params[..], &op.lambda.results[..]) {
        ([dest], [(x, _), (y, _)], [result]) if op.lambda.body.is_empty() => {
            if !supports_native_atomics(&dest.elem) {
                return None;
            }
            match result {
                Expr::BinOp {lhs, op: bop, rhs, ..} => {
                    let ordered = is_param(lhs, x) && is_param(rhs, y);
                    let swapped = is_param(lhs, y) && is_param(rhs, x) && bop.is_commutative();
                    if ordered || swapped {
                        atomic_op_of_binop(bop, &dest.elem)
                    } else {
                        None
                    }
                },
                e if is_param(e, y) => Some(AtomicOp::Xchg),
                _ => None
            }
        },
        _ => None
    }
}

fn compare_and_swap(op: &ReductionOperator) -> Option<ElemSize> {
    match &op.dests[..] {
        [dest] if dest.elem.bytes() == 4 || dest.elem.bytes() == 8 => Some(dest.elem),
        _ => None
    }
}

pub fn needs_locking(op: &ReductionOperator) -> bool {
    primitive_atomic(op).is_none() && compare_and_swap(op).is_none()
}

// Determines how to update the buckets of an operator. When a lock table is needed, the one
// accumulated from earlier operators is reused, or a new one is created using 'mk_locking'. The
// lock table is returned so that it can be passed on to the next operator.
pub fn synthesize(
    op: &ReductionOperator,
    locking: Option<Locking>,
    mk_locking: &impl Fn() -> Locking
) -> (Option<Locking>, UpdateStrategy) {
    if let Some(aop) = primitive_atomic(op) {
        (locking, UpdateStrategy::Primitive(aop))
    } else if let Some(sz) = compare_and_swap(op) {
        (locking, UpdateStrategy::CompareAndSwap(sz))
    } else {
        let l = locking.unwrap_or_else(mk_locking);
        (Some(l.clone()), UpdateStrategy::Locked(l))
    }
}

pub fn synthesize_all(
    ops: &[ReductionOperator],
    mk_locking: impl Fn() -> Locking
) -> (Option<Locking>, Vec<UpdateStrategy>) {
    ops.iter()
        .fold((None, vec![]), |(locking, mut acc), op| {
            let (locking, s) = synthesize(op, locking, &mk_locking);
            acc.push(s);
            (locking, acc)
        })
}

fn update_cas(
    sz: ElemSize,
    mem: &MemSpace,
    op: &ReductionOperator,
    target: &Name,
    addr: Expr,
    value: Expr
) -> Vec<Stmt> {
    let bits = sz.bit_pattern_type();
    let idx = Name::sym_str("idx");
    let y = Name::sym_str("y");
    let assumed = Name::sym_str("assumed");
    let old = Name::sym_str("old");
    let x = Name::sym_str("x");
    let done = Name::sym_str("done");
    let current = access(target, sz, mem.clone(), i64_var(&idx));
    let retry = vec![
        definition(&x, bitcast(var(&assumed, scalar(bits)), sz)),
        apply_lambda(&op.lambda, vec![var(&x, scalar(sz)), var(&y, scalar(sz))], &[x.clone()]),
        Stmt::AtomicCas {
            old: old.clone(), mem: mem.clone(), sz, target: target.clone(),
            idx: i64_var(&idx), cmp: var(&assumed, scalar(bits)),
            new: bitcast(var(&x, scalar(sz)), bits), i: i()
        },
        if_stmt(
            eq(var(&old, scalar(bits)), var(&assumed, scalar(bits))),
            vec![assign_var(&done, bool_expr(true))],
            vec![assign_var(&assumed, var(&old, scalar(bits)))]
        ),
    ];
    vec![
        definition(&idx, addr),
        definition(&y, value),
        definition(&assumed, bitcast(current, bits)),
        definition(&done, bool_expr(false)),
        while_loop(not(var(&done, bool_ty())), retry),
    ]
}

fn update_locked(
    locking: &Locking,
    mem: &MemSpace,
    op: &ReductionOperator,
    targets: &[Name],
    addr: Expr,
    values: Vec<Expr>
) -> Vec<Stmt> {
    let idx = Name::sym_str("idx");
    let lock = Name::sym_str("lock");
    let prev = Name::sym_str("prev");
    let done = Name::sym_str("done");
    let szs = op.elem_sizes();
    let ys = values.iter().map(|_| Name::sym_str("y")).collect::<Vec<Name>>();
    let xs = values.iter().map(|_| Name::sym_str("x")).collect::<Vec<Name>>();
    let lock_bits = ElemSize::I32.bit_pattern_type();
    let mut critical = xs.iter()
        .zip(targets.iter().zip(szs.iter()))
        .map(|(x, (t, sz))| definition(x, access(t, *sz, mem.clone(), i64_var(&idx))))
        .collect::<Vec<Stmt>>();
    let args = xs.iter().chain(ys.iter())
        .zip(szs.iter().chain(szs.iter()))
        .map(|(id, sz)| var(id, scalar(*sz)))
        .collect::<Vec<Expr>>();
    critical.push(apply_lambda(&op.lambda, args, &xs));
    critical.extend(xs.iter()
        .zip(targets.iter().zip(szs.iter()))
        .map(|(x, (t, sz))| {
            assign(access(t, *sz, mem.clone(), i64_var(&idx)), var(x, scalar(*sz)))
        }));
    critical.push(Stmt::MemFence {mem: mem.clone(), i: i()});
    critical.push(Stmt::Atomic {
        op: AtomicOp::Xchg, mem: locking.mem.clone(), sz: ElemSize::I32,
        target: locking.locks.clone(), idx: i64_var(&lock),
        value: int(UNLOCKED, ElemSize::I32), old: None, i: i()
    });
    critical.push(assign_var(&done, bool_expr(true)));
    let spin = vec![
        Stmt::AtomicCas {
            old: prev.clone(), mem: locking.mem.clone(), sz: ElemSize::I32,
            target: locking.locks.clone(), idx: i64_var(&lock),
            cmp: int(UNLOCKED, lock_bits), new: int(LOCKED, lock_bits), i: i()
        },
        if_stmt(eq(var(&prev, scalar(lock_bits)), int(UNLOCKED, lock_bits)), critical, vec![]),
    ];
    let mut stmts = vec![definition(&idx, addr)];
    stmts.extend(ys.iter().zip(values.into_iter()).map(|(y, v)| definition(y, v)));
    stmts.push(definition(&lock, locking.hash(i64_var(&idx))));
    stmts.push(definition(&done, bool_expr(false)));
    stmts.push(while_loop(not(var(&done, bool_ty())), spin));
    stmts
}

// Emits the code updating the element at a flat address of the target arrays (one per
// destination of the operator) with the given values.
pub fn emit_update(
    strategy: &UpdateStrategy,
    mem: &MemSpace,
    op: &ReductionOperator,
    targets: &[Name],
    addr: Expr,
    mut values: Vec<Expr>
) -> Stmt {
    let stmts = match strategy {
        UpdateStrategy::Primitive(aop) => {
            let sz = op.dests[0].elem;
            let value = values.remove(0);
            let value = if value.get_type() == &scalar(sz) { value } else { convert(value, sz) };
            vec![Stmt::Atomic {
                op: *aop, mem: mem.clone(), sz, target: targets[0].clone(), idx: addr,
                value, old: None, i: i()
            }]
        },
        UpdateStrategy::CompareAndSwap(sz) => {
            update_cas(*sz, mem, op, &targets[0], addr, values.remove(0))
        },
        UpdateStrategy::Locked(locking) => {
            update_locked(locking, mem, op, targets, addr, values)
        },
    };
    scope(stmts)
}

use crate::utils::info::*;
use crate::utils::name::Name;
use crate::utils::smap::{SFold, SMapAccum};

pub use crate::utils::ast::ElemSize;
pub use crate::utils::ast::UnOp;
pub use crate::utils::ast::BinOp;

use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemSpace {
    // Global memory on the device, visible to all threads of a launch.
    Device,

    // On-chip memory shared among the threads of a group.
    Local,

    // Memory private to one thread.
    Private,

    // A memory space qualifier not understood by this compiler. Translating code referring to it
    // to a device language is an error.
    Other(String),
}

impl fmt::Display for MemSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemSpace::Device => write!(f, "device"),
            MemSpace::Local => write!(f, "local"),
            MemSpace::Private => write!(f, "private"),
            MemSpace::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dim {
    X, Y, Z
}

impl Dim {
    pub fn index(&self) -> usize {
        match self {
            Dim::X => 0,
            Dim::Y => 1,
            Dim::Z => 2,
        }
    }

    pub fn from_index(idx: usize) -> Option<Dim> {
        match idx {
            0 => Some(Dim::X),
            1 => Some(Dim::Y),
            2 => Some(Dim::Z),
            _ => None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceCap {
    MaxGroupSize, MaxLocalMemory, LocalMemPerThread
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierScope {
    // Synchronizes the threads of a group with respect to local memory.
    Local,

    // Synchronizes the threads of a group and makes global memory writes of the group visible.
    Global,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AtomicOp {
    Add, SMin, SMax, UMin, UMax, And, Or, Xor, Xchg
}

impl fmt::Display for AtomicOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AtomicOp::Add => "add",
            AtomicOp::SMin => "smin",
            AtomicOp::SMax => "smax",
            AtomicOp::UMin => "umin",
            AtomicOp::UMax => "umax",
            AtomicOp::And => "and",
            AtomicOp::Or => "or",
            AtomicOp::Xor => "xor",
            AtomicOp::Xchg => "xchg",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Scalar {sz: ElemSize},
    Pointer {sz: ElemSize, mem: MemSpace},
}

impl Type {
    pub fn get_scalar_elem_size<'a>(&'a self) -> Option<&'a ElemSize> {
        match self {
            Type::Scalar {sz} => Some(sz),
            _ => None,
        }
    }

    pub fn elem_size(&self) -> &ElemSize {
        match self {
            Type::Scalar {sz} | Type::Pointer {sz, ..} => sz
        }
    }

    pub fn is_pointer(&self) -> bool {
        match self {
            Type::Pointer {..} => true,
            Type::Scalar {..} => false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expr {
    Var {id: Name, ty: Type, i: Info},
    Bool {v: bool, ty: Type, i: Info},
    Int {v: i64, ty: Type, i: Info},
    Float {v: f64, ty: Type, i: Info},
    UnOp {op: UnOp, arg: Box<Expr>, ty: Type, i: Info},
    BinOp {lhs: Box<Expr>, op: BinOp, rhs: Box<Expr>, ty: Type, i: Info},
    IfExpr {cond: Box<Expr>, thn: Box<Expr>, els: Box<Expr>, ty: Type, i: Info},
    ArrayAccess {target: Box<Expr>, idx: Box<Expr>, ty: Type, i: Info},
    Convert {e: Box<Expr>, ty: Type},

    // Reinterprets the bits of a value as a value of another type of the same size.
    BitCast {e: Box<Expr>, ty: Type},

    // Index of the executing thread within its group, index of its group, and the global index of
    // the thread, in a given dimension of the launch.
    LocalId {dim: Dim, ty: Type, i: Info},
    GroupId {dim: Dim, ty: Type, i: Info},
    GlobalId {dim: Dim, ty: Type, i: Info},

    // The number of threads per group and the number of groups of the current launch.
    LocalSize {dim: Dim, ty: Type, i: Info},
    NumGroups {dim: Dim, ty: Type, i: Info},

    // Host-level expressions: the value of a runtime-tunable size parameter and the result of
    // querying a capability of the device.
    SizeParam {id: String, ty: Type, i: Info},
    DeviceQuery {cap: DeviceCap, ty: Type, i: Info},
}

impl Expr {
    pub fn get_type<'a>(&'a self) -> &'a Type {
        match self {
            Expr::Var {ty, ..} => ty,
            Expr::Bool {ty, ..} => ty,
            Expr::Int {ty, ..} => ty,
            Expr::Float {ty, ..} => ty,
            Expr::UnOp {ty, ..} => ty,
            Expr::BinOp {ty, ..} => ty,
            Expr::IfExpr {ty, ..} => ty,
            Expr::ArrayAccess {ty, ..} => ty,
            Expr::Convert {ty, ..} => ty,
            Expr::BitCast {ty, ..} => ty,
            Expr::LocalId {ty, ..} => ty,
            Expr::GroupId {ty, ..} => ty,
            Expr::GlobalId {ty, ..} => ty,
            Expr::LocalSize {ty, ..} => ty,
            Expr::NumGroups {ty, ..} => ty,
            Expr::SizeParam {ty, ..} => ty,
            Expr::DeviceQuery {ty, ..} => ty,
        }
    }

    pub fn is_leaf_node(&self) -> bool {
        match self {
            Expr::Var {..} | Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} |
            Expr::LocalId {..} | Expr::GroupId {..} | Expr::GlobalId {..} |
            Expr::LocalSize {..} | Expr::NumGroups {..} | Expr::SizeParam {..} |
            Expr::DeviceQuery {..} => true,
            _ => false
        }
    }

    pub fn with_info(self, i: Info) -> Expr {
        match self {
            Expr::Var {id, ty, ..} => Expr::Var {id, ty, i},
            Expr::Bool {v, ty, ..} => Expr::Bool {v, ty, i},
            Expr::Int {v, ty, ..} => Expr::Int {v, ty, i},
            Expr::Float {v, ty, ..} => Expr::Float {v, ty, i},
            Expr::UnOp {op, arg, ty, ..} => Expr::UnOp {op, arg, ty, i},
            Expr::BinOp {lhs, op, rhs, ty, ..} => Expr::BinOp {lhs, op, rhs, ty, i},
            Expr::IfExpr {cond, thn, els, ty, ..} => Expr::IfExpr {cond, thn, els, ty, i},
            Expr::ArrayAccess {target, idx, ty, ..} => Expr::ArrayAccess {target, idx, ty, i},
            Expr::Convert {e, ty} => Expr::Convert {e: Box::new(e.with_info(i)), ty},
            Expr::BitCast {e, ty} => Expr::BitCast {e: Box::new(e.with_info(i)), ty},
            Expr::LocalId {dim, ty, ..} => Expr::LocalId {dim, ty, i},
            Expr::GroupId {dim, ty, ..} => Expr::GroupId {dim, ty, i},
            Expr::GlobalId {dim, ty, ..} => Expr::GlobalId {dim, ty, i},
            Expr::LocalSize {dim, ty, ..} => Expr::LocalSize {dim, ty, i},
            Expr::NumGroups {dim, ty, ..} => Expr::NumGroups {dim, ty, i},
            Expr::SizeParam {id, ty, ..} => Expr::SizeParam {id, ty, i},
            Expr::DeviceQuery {cap, ty, ..} => Expr::DeviceQuery {cap, ty, i},
        }
    }
}

impl InfoNode for Expr {
    fn get_info(&self) -> Info {
        match self {
            Expr::Var {i, ..} => i.clone(),
            Expr::Bool {i, ..} => i.clone(),
            Expr::Int {i, ..} => i.clone(),
            Expr::Float {i, ..} => i.clone(),
            Expr::UnOp {i, ..} => i.clone(),
            Expr::BinOp {i, ..} => i.clone(),
            Expr::IfExpr {i, ..} => i.clone(),
            Expr::ArrayAccess {i, ..} => i.clone(),
            Expr::Convert {e, ..} => e.get_info(),
            Expr::BitCast {e, ..} => e.get_info(),
            Expr::LocalId {i, ..} => i.clone(),
            Expr::GroupId {i, ..} => i.clone(),
            Expr::GlobalId {i, ..} => i.clone(),
            Expr::LocalSize {i, ..} => i.clone(),
            Expr::NumGroups {i, ..} => i.clone(),
            Expr::SizeParam {i, ..} => i.clone(),
            Expr::DeviceQuery {i, ..} => i.clone(),
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Var {id: lid, ..}, Expr::Var {id: rid, ..}) => lid.eq(rid),
            (Expr::Bool {v: lv, ..}, Expr::Bool {v: rv, ..}) => lv.eq(rv),
            (Expr::Int {v: lv, ty: lty, ..}, Expr::Int {v: rv, ty: rty, ..}) =>
                lv.eq(rv) && lty.eq(rty),
            (Expr::Float {v: lv, ty: lty, ..}, Expr::Float {v: rv, ty: rty, ..}) =>
                lv.to_bits() == rv.to_bits() && lty.eq(rty),
            ( Expr::UnOp {op: lop, arg: larg, ..}
            , Expr::UnOp {op: rop, arg: rarg, ..} ) =>
                lop.eq(rop) && larg.eq(rarg),
            ( Expr::BinOp {lhs: llhs, op: lop, rhs: lrhs, ..}
            , Expr::BinOp {lhs: rlhs, op: rop, rhs: rrhs, ..} ) =>
                llhs.eq(rlhs) && lop.eq(rop) && lrhs.eq(rrhs),
            ( Expr::IfExpr {cond: lcond, thn: lthn, els: lels, ..}
            , Expr::IfExpr {cond: rcond, thn: rthn, els: rels, ..} ) =>
                lcond.eq(rcond) && lthn.eq(rthn) && lels.eq(rels),
            ( Expr::ArrayAccess {target: ltarget, idx: lidx, ..}
            , Expr::ArrayAccess {target: rtarget, idx: ridx, ..} ) =>
                ltarget.eq(rtarget) && lidx.eq(ridx),
            (Expr::Convert {e: le, ty: lty}, Expr::Convert {e: re, ty: rty}) =>
                le.eq(re) && lty.eq(rty),
            (Expr::BitCast {e: le, ty: lty}, Expr::BitCast {e: re, ty: rty}) =>
                le.eq(re) && lty.eq(rty),
            (Expr::LocalId {dim: l, ..}, Expr::LocalId {dim: r, ..}) => l.eq(r),
            (Expr::GroupId {dim: l, ..}, Expr::GroupId {dim: r, ..}) => l.eq(r),
            (Expr::GlobalId {dim: l, ..}, Expr::GlobalId {dim: r, ..}) => l.eq(r),
            (Expr::LocalSize {dim: l, ..}, Expr::LocalSize {dim: r, ..}) => l.eq(r),
            (Expr::NumGroups {dim: l, ..}, Expr::NumGroups {dim: r, ..}) => l.eq(r),
            (Expr::SizeParam {id: l, ..}, Expr::SizeParam {id: r, ..}) => l.eq(r),
            (Expr::DeviceQuery {cap: l, ..}, Expr::DeviceQuery {cap: r, ..}) => l.eq(r),
            (_, _) => false
        }
    }
}

impl SMapAccum<Expr> for Expr {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, Expr) -> Result<(A, Expr), E>
    ) -> Result<(A, Expr), E> {
        match self {
            Expr::UnOp {op, arg, ty, i} => {
                let (acc, arg) = f(acc?, *arg)?;
                Ok((acc, Expr::UnOp {op, arg: Box::new(arg), ty, i}))
            },
            Expr::BinOp {lhs, op, rhs, ty, i} => {
                let (acc, lhs) = f(acc?, *lhs)?;
                let (acc, rhs) = f(acc, *rhs)?;
                Ok((acc, Expr::BinOp {
                    lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty, i
                }))
            },
            Expr::IfExpr {cond, thn, els, ty, i} => {
                let (acc, cond) = f(acc?, *cond)?;
                let (acc, thn) = f(acc, *thn)?;
                let (acc, els) = f(acc, *els)?;
                Ok((acc, Expr::IfExpr {
                    cond: Box::new(cond), thn: Box::new(thn), els: Box::new(els), ty, i
                }))
            },
            Expr::ArrayAccess {target, idx, ty, i} => {
                let (acc, target) = f(acc?, *target)?;
                let (acc, idx) = f(acc, *idx)?;
                Ok((acc, Expr::ArrayAccess {
                    target: Box::new(target), idx: Box::new(idx), ty, i
                }))
            },
            Expr::Convert {e, ty} => {
                let (acc, e) = f(acc?, *e)?;
                Ok((acc, Expr::Convert {e: Box::new(e), ty}))
            },
            Expr::BitCast {e, ty} => {
                let (acc, e) = f(acc?, *e)?;
                Ok((acc, Expr::BitCast {e: Box::new(e), ty}))
            },
            Expr::Var {..} | Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} |
            Expr::LocalId {..} | Expr::GroupId {..} | Expr::GlobalId {..} |
            Expr::LocalSize {..} | Expr::NumGroups {..} | Expr::SizeParam {..} |
            Expr::DeviceQuery {..} => Ok((acc?, self)),
        }
    }
}

impl SFold<Expr> for Expr {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &Expr) -> Result<A, E>
    ) -> Result<A, E> {
        match self {
            Expr::UnOp {arg, ..} => f(acc?, arg),
            Expr::BinOp {lhs, rhs, ..} => f(f(acc?, lhs)?, rhs),
            Expr::IfExpr {cond, thn, els, ..} => f(f(f(acc?, cond)?, thn)?, els),
            Expr::ArrayAccess {target, idx, ..} => f(f(acc?, target)?, idx),
            Expr::Convert {e, ..} | Expr::BitCast {e, ..} => f(acc?, e),
            Expr::Var {..} | Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} |
            Expr::LocalId {..} | Expr::GroupId {..} | Expr::GlobalId {..} |
            Expr::LocalSize {..} | Expr::NumGroups {..} | Expr::SizeParam {..} |
            Expr::DeviceQuery {..} => acc,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LocalMemSize {
    Static(i64),

    // The size is given by an expression evaluated on the host before the kernel is launched.
    Dynamic(Expr),
}

// A block of local memory allocated per group for the duration of a kernel. The size is given in
// number of elements.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalMemory {
    pub id: Name,
    pub elem: ElemSize,
    pub size: LocalMemSize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    pub id: Name,
    pub body: Vec<Stmt>,

    // The variables of the host code captured by the kernel, computed from the kernel body.
    pub uses: BTreeMap<Name, Type>,
    pub local_mem: Vec<LocalMemory>,

    // The number of groups and the number of threads per group in each dimension of the launch.
    // Both vectors have the same length, between one and three.
    pub num_groups: Vec<Expr>,
    pub group_size: Vec<Expr>,
    pub i: Info,
}

impl Kernel {
    pub fn dims(&self) -> usize {
        self.num_groups.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Definition {ty: Type, id: Name, expr: Expr, i: Info},
    Assign {dst: Expr, expr: Expr, i: Info},
    For {
        var_ty: Type, var: Name, init: Expr, cond: Expr,
        incr: Expr, body: Vec<Stmt>, i: Info
    },
    If {cond: Expr, thn: Vec<Stmt>, els: Vec<Stmt>, i: Info},
    While {cond: Expr, body: Vec<Stmt>, i: Info},
    Scope {body: Vec<Stmt>, i: Info},

    // Synchronization of all threads of a group.
    Barrier {scope: BarrierScope, i: Info},

    // Orders the memory accesses of a thread to the given memory space.
    MemFence {mem: MemSpace, i: Info},

    // Atomically updates the element at the given index of an array. When 'old' is set, it binds
    // a new variable to the value stored before the update.
    Atomic {
        op: AtomicOp, mem: MemSpace, sz: ElemSize, target: Name, idx: Expr,
        value: Expr, old: Option<Name>, i: Info
    },

    // Atomically replaces the element at the given index of an array with 'new' if its bit
    // pattern equals 'cmp'. Both 'cmp' and 'new' are bit patterns, represented using the unsigned
    // integer type of the same size as the element type. The variable 'old' is bound to the bit
    // pattern stored before the operation.
    AtomicCas {
        old: Name, mem: MemSpace, sz: ElemSize, target: Name, idx: Expr,
        cmp: Expr, new: Expr, i: Info
    },

    // The remaining statements are only valid in host code.
    Alloc {id: Name, elem: ElemSize, count: Expr, i: Info},
    Free {id: Name, i: Info},
    Copy {
        dst: Name, dst_offset: Expr, src: Name, src_offset: Expr,
        count: Expr, i: Info
    },
    Fill {id: Name, offset: Expr, count: Expr, value: Expr, i: Info},

    // Makes the destination refer to the same memory as the source, without copying.
    SetMem {dst: Name, src: Name, i: Info},
    StaticArray {id: Name, elem: ElemSize, values: Vec<Expr>, i: Info},
    LaunchKernel {kernel: Kernel, i: Info},
}

impl Stmt {
    pub fn is_host_only(&self) -> bool {
        match self {
            Stmt::Alloc {..} | Stmt::Free {..} | Stmt::Copy {..} | Stmt::Fill {..} |
            Stmt::SetMem {..} | Stmt::StaticArray {..} | Stmt::LaunchKernel {..} => true,
            _ => false
        }
    }
}

impl InfoNode for Stmt {
    fn get_info(&self) -> Info {
        match self {
            Stmt::Definition {i, ..} => i.clone(),
            Stmt::Assign {i, ..} => i.clone(),
            Stmt::For {i, ..} => i.clone(),
            Stmt::If {i, ..} => i.clone(),
            Stmt::While {i, ..} => i.clone(),
            Stmt::Scope {i, ..} => i.clone(),
            Stmt::Barrier {i, ..} => i.clone(),
            Stmt::MemFence {i, ..} => i.clone(),
            Stmt::Atomic {i, ..} => i.clone(),
            Stmt::AtomicCas {i, ..} => i.clone(),
            Stmt::Alloc {i, ..} => i.clone(),
            Stmt::Free {i, ..} => i.clone(),
            Stmt::Copy {i, ..} => i.clone(),
            Stmt::Fill {i, ..} => i.clone(),
            Stmt::SetMem {i, ..} => i.clone(),
            Stmt::StaticArray {i, ..} => i.clone(),
            Stmt::LaunchKernel {i, ..} => i.clone(),
        }
    }
}

impl SMapAccum<Expr> for Stmt {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, Expr) -> Result<(A, Expr), E>
    ) -> Result<(A, Self), E> {
        match self {
            Stmt::Definition {ty, id, expr, i} => {
                let (acc, expr) = f(acc?, expr)?;
                Ok((acc, Stmt::Definition {ty, id, expr, i}))
            },
            Stmt::Assign {dst, expr, i} => {
                let (acc, dst) = f(acc?, dst)?;
                let (acc, expr) = f(acc, expr)?;
                Ok((acc, Stmt::Assign {dst, expr, i}))
            },
            Stmt::For {var_ty, var, init, cond, incr, body, i} => {
                let (acc, init) = f(acc?, init)?;
                let (acc, cond) = f(acc, cond)?;
                let (acc, incr) = f(acc, incr)?;
                Ok((acc, Stmt::For {var_ty, var, init, cond, incr, body, i}))
            },
            Stmt::If {cond, thn, els, i} => {
                let (acc, cond) = f(acc?, cond)?;
                Ok((acc, Stmt::If {cond, thn, els, i}))
            },
            Stmt::While {cond, body, i} => {
                let (acc, cond) = f(acc?, cond)?;
                Ok((acc, Stmt::While {cond, body, i}))
            },
            Stmt::Atomic {op, mem, sz, target, idx, value, old, i} => {
                let (acc, idx) = f(acc?, idx)?;
                let (acc, value) = f(acc, value)?;
                Ok((acc, Stmt::Atomic {op, mem, sz, target, idx, value, old, i}))
            },
            Stmt::AtomicCas {old, mem, sz, target, idx, cmp, new, i} => {
                let (acc, idx) = f(acc?, idx)?;
                let (acc, cmp) = f(acc, cmp)?;
                let (acc, new) = f(acc, new)?;
                Ok((acc, Stmt::AtomicCas {old, mem, sz, target, idx, cmp, new, i}))
            },
            Stmt::Alloc {id, elem, count, i} => {
                let (acc, count) = f(acc?, count)?;
                Ok((acc, Stmt::Alloc {id, elem, count, i}))
            },
            Stmt::Copy {dst, dst_offset, src, src_offset, count, i} => {
                let (acc, dst_offset) = f(acc?, dst_offset)?;
                let (acc, src_offset) = f(acc, src_offset)?;
                let (acc, count) = f(acc, count)?;
                Ok((acc, Stmt::Copy {dst, dst_offset, src, src_offset, count, i}))
            },
            Stmt::Fill {id, offset, count, value, i} => {
                let (acc, offset) = f(acc?, offset)?;
                let (acc, count) = f(acc, count)?;
                let (acc, value) = f(acc, value)?;
                Ok((acc, Stmt::Fill {id, offset, count, value, i}))
            },
            Stmt::StaticArray {id, elem, values, i} => {
                let (acc, values) = values.smap_accum_l_result(acc, &f)?;
                Ok((acc, Stmt::StaticArray {id, elem, values, i}))
            },
            Stmt::Scope {..} | Stmt::Barrier {..} | Stmt::MemFence {..} |
            Stmt::Free {..} | Stmt::SetMem {..} | Stmt::LaunchKernel {..} => {
                Ok((acc?, self))
            },
        }
    }
}

impl SFold<Expr> for Stmt {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &Expr) -> Result<A, E>
    ) -> Result<A, E> {
        match self {
            Stmt::Definition {expr, ..} => f(acc?, expr),
            Stmt::Assign {dst, expr, ..} => f(f(acc?, dst)?, expr),
            Stmt::For {init, cond, incr, ..} => f(f(f(acc?, init)?, cond)?, incr),
            Stmt::If {cond, ..} => f(acc?, cond),
            Stmt::While {cond, ..} => f(acc?, cond),
            Stmt::Atomic {idx, value, ..} => f(f(acc?, idx)?, value),
            Stmt::AtomicCas {idx, cmp, new, ..} => f(f(f(acc?, idx)?, cmp)?, new),
            Stmt::Alloc {count, ..} => f(acc?, count),
            Stmt::Copy {dst_offset, src_offset, count, ..} => {
                f(f(f(acc?, dst_offset)?, src_offset)?, count)
            },
            Stmt::Fill {offset, count, value, ..} => f(f(f(acc?, offset)?, count)?, value),
            Stmt::StaticArray {values, ..} => values.sfold_result(acc, &f),
            Stmt::Scope {..} | Stmt::Barrier {..} | Stmt::MemFence {..} |
            Stmt::Free {..} | Stmt::SetMem {..} | Stmt::LaunchKernel {..} => acc,
        }
    }
}

impl SMapAccum<Stmt> for Stmt {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, Stmt) -> Result<(A, Stmt), E>
    ) -> Result<(A, Self), E> {
        match self {
            Stmt::For {var_ty, var, init, cond, incr, body, i} => {
                let (acc, body) = body.smap_accum_l_result(acc, &f)?;
                Ok((acc, Stmt::For {var_ty, var, init, cond, incr, body, i}))
            },
            Stmt::If {cond, thn, els, i} => {
                let (acc, thn) = thn.smap_accum_l_result(acc, &f)?;
                let (acc, els) = els.smap_accum_l_result(Ok(acc), &f)?;
                Ok((acc, Stmt::If {cond, thn, els, i}))
            },
            Stmt::While {cond, body, i} => {
                let (acc, body) = body.smap_accum_l_result(acc, &f)?;
                Ok((acc, Stmt::While {cond, body, i}))
            },
            Stmt::Scope {body, i} => {
                let (acc, body) = body.smap_accum_l_result(acc, &f)?;
                Ok((acc, Stmt::Scope {body, i}))
            },
            Stmt::Definition {..} | Stmt::Assign {..} | Stmt::Barrier {..} |
            Stmt::MemFence {..} | Stmt::Atomic {..} | Stmt::AtomicCas {..} |
            Stmt::Alloc {..} | Stmt::Free {..} | Stmt::Copy {..} | Stmt::Fill {..} |
            Stmt::SetMem {..} | Stmt::StaticArray {..} | Stmt::LaunchKernel {..} => {
                Ok((acc?, self))
            }
        }
    }
}

impl SFold<Stmt> for Stmt {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &Stmt) -> Result<A, E>
    ) -> Result<A, E> {
        match self {
            Stmt::For {body, ..} => body.sfold_result(acc, &f),
            Stmt::If {thn, els, ..} => els.sfold_result(thn.sfold_result(acc, &f), &f),
            Stmt::While {body, ..} => body.sfold_result(acc, &f),
            Stmt::Scope {body, ..} => body.sfold_result(acc, &f),
            Stmt::Definition {..} | Stmt::Assign {..} | Stmt::Barrier {..} |
            Stmt::MemFence {..} | Stmt::Atomic {..} | Stmt::AtomicCas {..} |
            Stmt::Alloc {..} | Stmt::Free {..} | Stmt::Copy {..} | Stmt::Fill {..} |
            Stmt::SetMem {..} | Stmt::StaticArray {..} | Stmt::LaunchKernel {..} => acc,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeClass {
    GroupSize, NumGroups
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SizeClass::GroupSize => write!(f, "group_size"),
            SizeClass::NumGroups => write!(f, "num_groups"),
        }
    }
}

// A program consisting of host code, which launches kernels, and a table of the runtime-tunable
// sizes referred to by the host code.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub sizes: BTreeMap<String, SizeClass>,
}

impl Program {
    pub fn register_size(&mut self, id: &str, class: SizeClass) {
        self.sizes.insert(id.to_string(), class);
    }

    // All kernels launched by the program, in the order they appear in the host code.
    pub fn kernels<'a>(&'a self) -> Vec<&'a Kernel> {
        fn collect<'a>(mut acc: Vec<&'a Kernel>, s: &'a Stmt) -> Vec<&'a Kernel> {
            match s {
                Stmt::LaunchKernel {kernel, ..} => {
                    acc.push(kernel);
                    acc
                },
                Stmt::For {body, ..} | Stmt::While {body, ..} | Stmt::Scope {body, ..} => {
                    body.iter().fold(acc, collect)
                },
                Stmt::If {thn, els, ..} => {
                    let acc = thn.iter().fold(acc, collect);
                    els.iter().fold(acc, collect)
                },
                _ => acc
            }
        }
        self.body.iter().fold(vec![], collect)
    }
}

use crate::utils::name::Name;

pub use crate::utils::ast::ElemSize;
pub use crate::utils::ast::UnOp;
pub use crate::utils::ast::BinOp;
pub use crate::kernel::ast::AtomicOp;

use std::fmt;

// Address space qualifiers of the device languages. The qualifiers of a type are decided by the
// code generation, so the printed form depends only on the qualifier itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Qualifier {
    None,
    Global,
    Local,
    Shared,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Void,
    Scalar {sz: ElemSize},
    Pointer {sz: ElemSize, qual: Qualifier},
}

impl Type {
    pub fn get_scalar_elem_size<'a>(&'a self) -> Option<&'a ElemSize> {
        match self {
            Type::Scalar {sz} => Some(sz),
            _ => None
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Var {id: Name, ty: Type},
    Bool {v: bool, ty: Type},
    Int {v: i64, ty: Type},
    Float {v: f64, ty: Type},
    UnOp {op: UnOp, arg: Box<Expr>, ty: Type},
    BinOp {lhs: Box<Expr>, op: BinOp, rhs: Box<Expr>, ty: Type},
    Ternary {cond: Box<Expr>, thn: Box<Expr>, els: Box<Expr>, ty: Type},
    ArrayAccess {target: Box<Expr>, idx: Box<Expr>, ty: Type},
    AddressOf {e: Box<Expr>, ty: Type},
    Convert {e: Box<Expr>, ty: Type},

    // A call to a function of the device language or of the prelude.
    Call {id: String, args: Vec<Expr>, ty: Type},
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
            Expr::Ternary {ty, ..} => ty,
            Expr::ArrayAccess {ty, ..} => ty,
            Expr::AddressOf {ty, ..} => ty,
            Expr::Convert {ty, ..} => ty,
            Expr::Call {ty, ..} => ty,
        }
    }

    pub fn is_leaf_node(&self) -> bool {
        match self {
            Expr::Var {..} | Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} |
            Expr::Call {..} | Expr::ArrayAccess {..} => true,
            _ => false
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Definition {ty: Type, id: Name, expr: Expr},
    Assign {dst: Expr, expr: Expr},
    For {var_ty: Type, var: Name, init: Expr, cond: Expr, incr: Expr, body: Vec<Stmt>},
    If {cond: Expr, thn: Vec<Stmt>, els: Vec<Stmt>},
    While {cond: Expr, body: Vec<Stmt>},
    Scope {body: Vec<Stmt>},
    Expr {e: Expr},

    // A fixed-size array in local memory, declared within the kernel.
    LocalArray {id: Name, elem: ElemSize, size: i64, qual: Qualifier},

    // The block of dynamically sized shared memory of a CUDA kernel, which all dynamically sized
    // local arrays are placed in.
    ExternShared {id: Name},
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    OpenCLKernel,
    CudaGlobal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub id: Name,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelDef {
    pub attr: Attribute,
    pub id: Name,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

// The address space of the target of an atomic operation, used to name the prelude wrappers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AtomicSpace {
    Global, Local
}

impl fmt::Display for AtomicSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AtomicSpace::Global => write!(f, "global"),
            AtomicSpace::Local => write!(f, "local"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AtomicKind {
    Op(AtomicOp),
    Cas,
}

impl fmt::Display for AtomicKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AtomicKind::Op(op) => write!(f, "{op}"),
            AtomicKind::Cas => write!(f, "cas"),
        }
    }
}

// Operations implemented as functions of the prelude, specialized to an element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Intrinsic {
    Abs, Exp, Log, Sqrt, Max, Min
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Intrinsic::Abs => "abs",
            Intrinsic::Exp => "exp",
            Intrinsic::Log => "log",
            Intrinsic::Sqrt => "sqrt",
            Intrinsic::Max => "max",
            Intrinsic::Min => "min",
        };
        write!(f, "{s}")
    }
}

pub fn atomic_wrapper_name(kind: &AtomicKind, sz: &ElemSize, space: &AtomicSpace) -> String {
    format!("atomic_{kind}_{sz}_{space}")
}

pub fn intrinsic_name(f: &Intrinsic, sz: &ElemSize) -> String {
    format!("{f}_{sz}")
}

pub fn bitcast_name(from: &ElemSize, to: &ElemSize) -> String {
    format!("bitcast_{from}_{to}")
}

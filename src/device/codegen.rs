use super::ast::*;
use crate::parhist_internal_error;
use crate::kernel::ast as kernel_ast;
use crate::kernel::ast::{BarrierScope, Dim, LocalMemSize, MemSpace};
use crate::option::Target;
use crate::utils::err::*;
use crate::utils::info::*;
use crate::utils::name::Name;

use std::collections::BTreeSet;

// The features of the prelude used by the translated kernels. Only the used parts of the prelude
// are emitted, as devices may reject programs referring to capabilities they do not support.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsedFeatures {
    pub types: BTreeSet<ElemSize>,
    pub atomics: BTreeSet<(AtomicKind, ElemSize, AtomicSpace)>,
    pub intrinsics: BTreeSet<(Intrinsic, ElemSize)>,
    pub bitcasts: BTreeSet<(ElemSize, ElemSize)>,
    pub permuted_grid: bool,
}

struct CodegenEnv<'a> {
    target: Target,
    permuted: bool,
    block_dims: Vec<Name>,
    used: &'a mut UsedFeatures,
}

// Kernels launched on a three-dimensional CUDA grid are permuted, such that the logical dimension
// with the most groups can be placed on the first physical dimension.
pub fn permutes_grid(target: Target, dims: usize) -> bool {
    target == Target::Cuda && dims == 3
}

pub fn block_dim_names() -> Vec<Name> {
    (0..3).map(|d| Name::new(format!("block_dim{d}"))).collect()
}

fn from_kernel_mem(env: &CodegenEnv, mem: &MemSpace, i: &Info) -> CompileResult<Qualifier> {
    match (env.target, mem) {
        (Target::OpenCL, MemSpace::Device) => Ok(Qualifier::Global),
        (Target::OpenCL, MemSpace::Local) => Ok(Qualifier::Local),
        (Target::Cuda, MemSpace::Device | MemSpace::Local) => Ok(Qualifier::None),
        (_, MemSpace::Private) => Ok(Qualifier::None),
        (_, MemSpace::Other(s)) => {
            parhist_internal_error!(i, "Unknown memory space qualifier {s}")
        }
    }
}

fn atomic_space(mem: &MemSpace, i: &Info) -> CompileResult<AtomicSpace> {
    match mem {
        MemSpace::Device => Ok(AtomicSpace::Global),
        MemSpace::Local => Ok(AtomicSpace::Local),
        MemSpace::Private => {
            parhist_internal_error!(i, "Atomic operations on private memory are not supported")
        },
        MemSpace::Other(s) => {
            parhist_internal_error!(i, "Unknown memory space qualifier {s}")
        }
    }
}

fn from_kernel_type(
    env: &mut CodegenEnv,
    ty: &kernel_ast::Type,
    i: &Info
) -> CompileResult<Type> {
    match ty {
        kernel_ast::Type::Scalar {sz} => {
            env.used.types.insert(*sz);
            Ok(Type::Scalar {sz: *sz})
        },
        kernel_ast::Type::Pointer {sz, mem} => {
            env.used.types.insert(*sz);
            let qual = from_kernel_mem(env, mem, i)?;
            Ok(Type::Pointer {sz: *sz, qual})
        }
    }
}

fn scalar_type(env: &mut CodegenEnv, sz: ElemSize) -> Type {
    env.used.types.insert(sz);
    Type::Scalar {sz}
}

fn i64_ty() -> Type {
    Type::Scalar {sz: ElemSize::I64}
}

fn builtin_call(env: &mut CodegenEnv, id: &str, dim: &Dim, permuted: bool) -> Expr {
    let d = Expr::Int {v: dim.index() as i64, ty: Type::Scalar {sz: ElemSize::I32}};
    env.used.types.insert(ElemSize::I64);
    if permuted && env.permuted {
        let mut args = env.block_dims.iter()
            .map(|id| Expr::Var {id: id.clone(), ty: i64_ty()})
            .collect::<Vec<Expr>>();
        args.push(d);
        Expr::Call {id: format!("{id}_fn"), args, ty: i64_ty()}
    } else {
        Expr::Call {id: id.to_string(), args: vec![d], ty: i64_ty()}
    }
}

fn intrinsic_call(
    env: &mut CodegenEnv,
    f: Intrinsic,
    args: Vec<Expr>,
    ty: Type,
    i: &Info
) -> CompileResult<Expr> {
    let sz = match ty.get_scalar_elem_size() {
        Some(sz) => *sz,
        None => parhist_internal_error!(i, "Intrinsic {f} applied to a non-scalar value")?
    };
    match f {
        Intrinsic::Exp | Intrinsic::Log | Intrinsic::Sqrt if !sz.is_floating_point() => {
            parhist_internal_error!(i, "Intrinsic {f} requires a floating-point argument, \
                                        found {sz}")
        },
        _ => {
            env.used.intrinsics.insert((f, sz));
            Ok(Expr::Call {id: intrinsic_name(&f, &sz), args, ty})
        }
    }
}

fn from_kernel_expr(env: &mut CodegenEnv, e: kernel_ast::Expr) -> CompileResult<Expr> {
    let i = e.get_info();
    let ty = from_kernel_type(env, e.get_type(), &i)?;
    match e {
        kernel_ast::Expr::Var {id, ..} => Ok(Expr::Var {id, ty}),
        kernel_ast::Expr::Bool {v, ..} => Ok(Expr::Bool {v, ty}),
        kernel_ast::Expr::Int {v, ..} => Ok(Expr::Int {v, ty}),
        kernel_ast::Expr::Float {v, ..} => Ok(Expr::Float {v, ty}),
        kernel_ast::Expr::UnOp {op, arg, ..} => {
            let arg = from_kernel_expr(env, *arg)?;
            match op {
                UnOp::Abs => intrinsic_call(env, Intrinsic::Abs, vec![arg], ty, &i),
                UnOp::Exp => intrinsic_call(env, Intrinsic::Exp, vec![arg], ty, &i),
                UnOp::Log => intrinsic_call(env, Intrinsic::Log, vec![arg], ty, &i),
                UnOp::Sqrt => intrinsic_call(env, Intrinsic::Sqrt, vec![arg], ty, &i),
                UnOp::Neg | UnOp::Not | UnOp::BitNeg => {
                    Ok(Expr::UnOp {op, arg: Box::new(arg), ty})
                }
            }
        },
        kernel_ast::Expr::BinOp {lhs, op, rhs, ..} => {
            let lhs = from_kernel_expr(env, *lhs)?;
            let rhs = from_kernel_expr(env, *rhs)?;
            match op {
                BinOp::Max => intrinsic_call(env, Intrinsic::Max, vec![lhs, rhs], ty, &i),
                BinOp::Min => intrinsic_call(env, Intrinsic::Min, vec![lhs, rhs], ty, &i),
                _ => Ok(Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty})
            }
        },
        kernel_ast::Expr::IfExpr {cond, thn, els, ..} => {
            let cond = Box::new(from_kernel_expr(env, *cond)?);
            let thn = Box::new(from_kernel_expr(env, *thn)?);
            let els = Box::new(from_kernel_expr(env, *els)?);
            Ok(Expr::Ternary {cond, thn, els, ty})
        },
        kernel_ast::Expr::ArrayAccess {target, idx, ..} => {
            let target = Box::new(from_kernel_expr(env, *target)?);
            let idx = Box::new(from_kernel_expr(env, *idx)?);
            Ok(Expr::ArrayAccess {target, idx, ty})
        },
        kernel_ast::Expr::Convert {e, ..} => {
            let e = Box::new(from_kernel_expr(env, *e)?);
            Ok(Expr::Convert {e, ty})
        },
        kernel_ast::Expr::BitCast {e, ..} => {
            let from = *e.get_type().elem_size();
            let to = *ty.get_scalar_elem_size().unwrap_or(&from);
            if from.bytes() != to.bytes() {
                parhist_internal_error!(i, "Bit cast from {from} to {to} changes the size \
                                            of the value")?
            }
            let e = from_kernel_expr(env, *e)?;
            env.used.bitcasts.insert((from, to));
            Ok(Expr::Call {id: bitcast_name(&from, &to), args: vec![e], ty})
        },
        kernel_ast::Expr::LocalId {dim, ..} => Ok(builtin_call(env, "get_local_id", &dim, false)),
        kernel_ast::Expr::LocalSize {dim, ..} => Ok(builtin_call(env, "get_local_size", &dim, false)),
        kernel_ast::Expr::GroupId {dim, ..} => Ok(builtin_call(env, "get_group_id", &dim, true)),
        kernel_ast::Expr::GlobalId {dim, ..} => Ok(builtin_call(env, "get_global_id", &dim, true)),
        kernel_ast::Expr::NumGroups {dim, ..} => Ok(builtin_call(env, "get_num_groups", &dim, true)),
        kernel_ast::Expr::SizeParam {id, ..} => {
            parhist_internal_error!(i, "Found size parameter {id} in device code")
        },
        kernel_ast::Expr::DeviceQuery {cap, ..} => {
            parhist_internal_error!(i, "Found query of device capability {cap:?} in device code")
        },
    }
}

fn element_address(
    env: &mut CodegenEnv,
    mem: &MemSpace,
    sz: ElemSize,
    target: Name,
    idx: kernel_ast::Expr,
    i: &Info
) -> CompileResult<Expr> {
    let qual = from_kernel_mem(env, mem, i)?;
    let ty = Type::Pointer {sz, qual};
    let target = Box::new(Expr::Var {id: target, ty: ty.clone()});
    let idx = Box::new(from_kernel_expr(env, idx)?);
    let elem = Expr::ArrayAccess {target, idx, ty: scalar_type(env, sz)};
    Ok(Expr::AddressOf {e: Box::new(elem), ty})
}

fn barrier_call(scope: &BarrierScope) -> Expr {
    let id = match scope {
        BarrierScope::Local => "barrier_local",
        BarrierScope::Global => "barrier_global",
    };
    Expr::Call {id: id.to_string(), args: vec![], ty: Type::Void}
}

fn from_kernel_stmts(
    env: &mut CodegenEnv,
    stmts: Vec<kernel_ast::Stmt>
) -> CompileResult<Vec<Stmt>> {
    stmts.into_iter()
        .map(|s| from_kernel_stmt(env, s))
        .collect::<CompileResult<Vec<Stmt>>>()
}

fn from_kernel_stmt(
    env: &mut CodegenEnv,
    s: kernel_ast::Stmt
) -> CompileResult<Stmt> {
    let i = s.get_info();
    let s = match s {
        kernel_ast::Stmt::Definition {ty, id, expr, ..} => {
            let ty = from_kernel_type(env, &ty, &i)?;
            let expr = from_kernel_expr(env, expr)?;
            Stmt::Definition {ty, id, expr}
        },
        kernel_ast::Stmt::Assign {dst, expr, ..} => {
            let dst = from_kernel_expr(env, dst)?;
            let expr = from_kernel_expr(env, expr)?;
            Stmt::Assign {dst, expr}
        },
        kernel_ast::Stmt::For {var_ty, var, init, cond, incr, body, ..} => {
            let var_ty = from_kernel_type(env, &var_ty, &i)?;
            let init = from_kernel_expr(env, init)?;
            let cond = from_kernel_expr(env, cond)?;
            let incr = from_kernel_expr(env, incr)?;
            let body = from_kernel_stmts(env, body)?;
            Stmt::For {var_ty, var, init, cond, incr, body}
        },
        kernel_ast::Stmt::If {cond, thn, els, ..} => {
            let cond = from_kernel_expr(env, cond)?;
            let thn = from_kernel_stmts(env, thn)?;
            let els = from_kernel_stmts(env, els)?;
            Stmt::If {cond, thn, els}
        },
        kernel_ast::Stmt::While {cond, body, ..} => {
            let cond = from_kernel_expr(env, cond)?;
            let body = from_kernel_stmts(env, body)?;
            Stmt::While {cond, body}
        },
        kernel_ast::Stmt::Scope {body, ..} => {
            Stmt::Scope {body: from_kernel_stmts(env, body)?}
        },
        kernel_ast::Stmt::Barrier {scope, ..} => Stmt::Expr {e: barrier_call(&scope)},
        kernel_ast::Stmt::MemFence {mem, ..} => {
            let id = match atomic_space(&mem, &i)? {
                AtomicSpace::Global => "mem_fence_global",
                AtomicSpace::Local => "mem_fence_local",
            };
            Stmt::Expr {e: Expr::Call {id: id.to_string(), args: vec![], ty: Type::Void}}
        },
        kernel_ast::Stmt::Atomic {op, mem, sz, target, idx, value, old, ..} => {
            let space = atomic_space(&mem, &i)?;
            let kind = AtomicKind::Op(op);
            env.used.atomics.insert((kind, sz, space));
            let addr = element_address(env, &mem, sz, target, idx, &i)?;
            let value = from_kernel_expr(env, value)?;
            let ty = scalar_type(env, sz);
            let e = Expr::Call {
                id: atomic_wrapper_name(&kind, &sz, &space), args: vec![addr, value],
                ty: ty.clone()
            };
            match old {
                Some(id) => Stmt::Definition {ty, id, expr: e},
                None => Stmt::Expr {e}
            }
        },
        kernel_ast::Stmt::AtomicCas {old, mem, sz, target, idx, cmp, new, ..} => {
            let space = atomic_space(&mem, &i)?;
            let bits = sz.bit_pattern_type();
            env.used.atomics.insert((AtomicKind::Cas, bits, space));
            let addr = element_address(env, &mem, sz, target, idx, &i)?;
            let ptr_ty = match addr.get_type() {
                Type::Pointer {qual, ..} => Type::Pointer {sz: bits, qual: *qual},
                ty => ty.clone()
            };
            let addr = if bits == sz { addr } else { Expr::Convert {e: Box::new(addr), ty: ptr_ty} };
            let cmp = from_kernel_expr(env, cmp)?;
            let new = from_kernel_expr(env, new)?;
            let ty = scalar_type(env, bits);
            let e = Expr::Call {
                id: atomic_wrapper_name(&AtomicKind::Cas, &bits, &space),
                args: vec![addr, cmp, new], ty: ty.clone()
            };
            Stmt::Definition {ty, id: old, expr: e}
        },
        kernel_ast::Stmt::Alloc {..} | kernel_ast::Stmt::Free {..} |
        kernel_ast::Stmt::Copy {..} | kernel_ast::Stmt::Fill {..} |
        kernel_ast::Stmt::SetMem {..} | kernel_ast::Stmt::StaticArray {..} |
        kernel_ast::Stmt::LaunchKernel {..} => {
            parhist_internal_error!(i, "Found host-level statement in kernel code")?
        },
    };
    Ok(s)
}

fn from_kernel_param(
    env: &mut CodegenEnv,
    id: Name,
    ty: &kernel_ast::Type,
    i: &Info
) -> CompileResult<Param> {
    let ty = match from_kernel_type(env, ty, i)? {
        // Kernel parameters cannot be booleans in the device languages.
        Type::Scalar {sz: ElemSize::Bool} => scalar_type(env, ElemSize::I8),
        ty => ty
    };
    Ok(Param {id, ty})
}

pub fn dynamic_offset_name(id: &Name) -> Name {
    Name::new(format!("{id}_offset"))
}

// Declares the local memory of a kernel. Statically sized arrays are declared in the body.
// Dynamically sized arrays are parameters in OpenCL, and for CUDA they are placed in the shared
// block of dynamic memory at an offset passed as a parameter.
fn from_local_memory(
    env: &mut CodegenEnv,
    local_mem: Vec<kernel_ast::LocalMemory>,
    params: &mut Vec<Param>
) -> CompileResult<Vec<Stmt>> {
    let shared = Name::new("shared_mem".to_string());
    let mut decls = vec![];
    for kernel_ast::LocalMemory {id, elem, size} in local_mem {
        env.used.types.insert(elem);
        match (size, env.target) {
            (LocalMemSize::Static(n), Target::OpenCL) => {
                decls.push(Stmt::LocalArray {id, elem, size: n, qual: Qualifier::Local});
            },
            (LocalMemSize::Static(n), Target::Cuda) => {
                decls.push(Stmt::LocalArray {id, elem, size: n, qual: Qualifier::Shared});
            },
            (LocalMemSize::Dynamic(_), Target::OpenCL) => {
                params.push(Param {id, ty: Type::Pointer {sz: elem, qual: Qualifier::Local}});
            },
            (LocalMemSize::Dynamic(_), Target::Cuda) => {
                if !decls.iter().any(|s| matches!(s, Stmt::ExternShared {..})) {
                    decls.insert(0, Stmt::ExternShared {id: shared.clone()});
                }
                let offset = dynamic_offset_name(&id);
                params.push(Param {id: offset.clone(), ty: scalar_type(env, ElemSize::I64)});
                let ty = Type::Pointer {sz: elem, qual: Qualifier::None};
                let base = Expr::ArrayAccess {
                    target: Box::new(Expr::Var {
                        id: shared.clone(), ty: Type::Pointer {sz: ElemSize::U8, qual: Qualifier::None}
                    }),
                    idx: Box::new(Expr::Var {id: offset, ty: i64_ty()}),
                    ty: Type::Scalar {sz: ElemSize::U8}
                };
                let addr = Expr::AddressOf {
                    e: Box::new(base), ty: Type::Pointer {sz: ElemSize::U8, qual: Qualifier::None}
                };
                let expr = Expr::Convert {e: Box::new(addr), ty: ty.clone()};
                decls.push(Stmt::Definition {ty, id, expr});
            },
        }
    }
    Ok(decls)
}

pub fn from_kernel(
    target: Target,
    kernel: kernel_ast::Kernel,
    used: &mut UsedFeatures
) -> CompileResult<KernelDef> {
    let kernel_ast::Kernel {id, body, uses, local_mem, num_groups, i, ..} = kernel;
    let permuted = permutes_grid(target, num_groups.len());
    let mut env = CodegenEnv {target, permuted, block_dims: block_dim_names(), used};
    if permuted {
        env.used.permuted_grid = true;
    }

    let mut params = uses.into_iter()
        .map(|(id, ty)| from_kernel_param(&mut env, id, &ty, &i))
        .collect::<CompileResult<Vec<Param>>>()?;
    let mut stmts = from_local_memory(&mut env, local_mem, &mut params)?;
    if permuted {
        params.extend(env.block_dims.clone().into_iter().map(|id| Param {id, ty: i64_ty()}));
    }
    stmts.extend(from_kernel_stmts(&mut env, body)?);
    tracing::trace!(kernel = %id, params = params.len(), permuted, "translated kernel");
    let attr = match target {
        Target::OpenCL => Attribute::OpenCLKernel,
        Target::Cuda => Attribute::CudaGlobal,
    };
    Ok(KernelDef {attr, id, params, body: stmts})
}

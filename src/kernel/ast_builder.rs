use super::ast::*;
use crate::utils::info::Info;
use crate::utils::name::Name;

pub fn i() -> Info {
    Info::default()
}

pub fn id(s: &str) -> Name {
    Name::new(s.to_string())
}

pub fn scalar(sz: ElemSize) -> Type {
    Type::Scalar {sz}
}

pub fn i64_ty() -> Type {
    scalar(ElemSize::I64)
}

pub fn bool_ty() -> Type {
    scalar(ElemSize::Bool)
}

pub fn pointer(sz: ElemSize, mem: MemSpace) -> Type {
    Type::Pointer {sz, mem}
}

pub fn var(id: &Name, ty: Type) -> Expr {
    Expr::Var {id: id.clone(), ty, i: i()}
}

pub fn i64_var(id: &Name) -> Expr {
    var(id, i64_ty())
}

pub fn bool_expr(v: bool) -> Expr {
    Expr::Bool {v, ty: bool_ty(), i: i()}
}

pub fn int(v: i64, sz: ElemSize) -> Expr {
    Expr::Int {v, ty: scalar(sz), i: i()}
}

pub fn int64(v: i64) -> Expr {
    int(v, ElemSize::I64)
}

pub fn float(v: f64, sz: ElemSize) -> Expr {
    Expr::Float {v, ty: scalar(sz), i: i()}
}

pub fn unop(op: UnOp, arg: Expr) -> Expr {
    let ty = match op {
        UnOp::Not => bool_ty(),
        _ => arg.get_type().clone()
    };
    Expr::UnOp {op, arg: Box::new(arg), ty, i: i()}
}

// Constructs a binary operation where the type of the result is the type of the left-hand side
// operand, or a boolean for comparisons.
pub fn binop(l: Expr, op: BinOp, r: Expr) -> Expr {
    let ty = if op.is_comparison() || op == BinOp::And || op == BinOp::Or {
        bool_ty()
    } else {
        l.get_type().clone()
    };
    Expr::BinOp {lhs: Box::new(l), op, rhs: Box::new(r), ty, i: i()}
}

pub fn add(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Add, r)
}

pub fn sub(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Sub, r)
}

pub fn mul(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Mul, r)
}

pub fn div(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Div, r)
}

pub fn rem(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Rem, r)
}

pub fn ceil_div(l: Expr, r: Expr) -> Expr {
    div(sub(add(l, r.clone()), int64(1)), r)
}

pub fn max(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Max, r)
}

pub fn lt(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Lt, r)
}

pub fn leq(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Leq, r)
}

pub fn geq(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Geq, r)
}

pub fn eq(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Eq, r)
}

pub fn neq(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::Neq, r)
}

pub fn and(l: Expr, r: Expr) -> Expr {
    binop(l, BinOp::And, r)
}

pub fn not(e: Expr) -> Expr {
    unop(UnOp::Not, e)
}

pub fn prod(args: Vec<Expr>) -> Expr {
    args.into_iter().reduce(mul).unwrap_or(int64(1))
}

pub fn sum(args: Vec<Expr>) -> Expr {
    args.into_iter().reduce(add).unwrap_or(int64(0))
}

pub fn if_expr(cond: Expr, thn: Expr, els: Expr) -> Expr {
    let ty = thn.get_type().clone();
    Expr::IfExpr {cond: Box::new(cond), thn: Box::new(thn), els: Box::new(els), ty, i: i()}
}

pub fn access(target: &Name, sz: ElemSize, mem: MemSpace, idx: Expr) -> Expr {
    Expr::ArrayAccess {
        target: Box::new(var(target, pointer(sz, mem))),
        idx: Box::new(idx),
        ty: scalar(sz),
        i: i()
    }
}

pub fn convert(e: Expr, sz: ElemSize) -> Expr {
    Expr::Convert {e: Box::new(e), ty: scalar(sz)}
}

pub fn bitcast(e: Expr, sz: ElemSize) -> Expr {
    Expr::BitCast {e: Box::new(e), ty: scalar(sz)}
}

pub fn local_id(dim: Dim) -> Expr {
    Expr::LocalId {dim, ty: i64_ty(), i: i()}
}

pub fn group_id(dim: Dim) -> Expr {
    Expr::GroupId {dim, ty: i64_ty(), i: i()}
}

pub fn global_id(dim: Dim) -> Expr {
    Expr::GlobalId {dim, ty: i64_ty(), i: i()}
}

pub fn local_size(dim: Dim) -> Expr {
    Expr::LocalSize {dim, ty: i64_ty(), i: i()}
}

pub fn num_groups(dim: Dim) -> Expr {
    Expr::NumGroups {dim, ty: i64_ty(), i: i()}
}

pub fn size_param(id: &str) -> Expr {
    Expr::SizeParam {id: id.to_string(), ty: i64_ty(), i: i()}
}

pub fn device_query(cap: DeviceCap) -> Expr {
    Expr::DeviceQuery {cap, ty: i64_ty(), i: i()}
}

pub fn definition(id: &Name, expr: Expr) -> Stmt {
    let ty = expr.get_type().clone();
    Stmt::Definition {ty, id: id.clone(), expr, i: i()}
}

pub fn assign(dst: Expr, expr: Expr) -> Stmt {
    Stmt::Assign {dst, expr, i: i()}
}

pub fn assign_var(id: &Name, expr: Expr) -> Stmt {
    let ty = expr.get_type().clone();
    assign(var(id, ty), expr)
}

// A loop 'for (var = init; var < bound; var += step)' over 64-bit integers.
pub fn for_loop(var_id: &Name, init: Expr, bound: Expr, step: Expr, body: Vec<Stmt>) -> Stmt {
    let x = i64_var(var_id);
    Stmt::For {
        var_ty: i64_ty(),
        var: var_id.clone(),
        init,
        cond: lt(x.clone(), bound),
        incr: add(x, step),
        body,
        i: i()
    }
}

pub fn for_range(var_id: &Name, init: Expr, bound: Expr, body: Vec<Stmt>) -> Stmt {
    for_loop(var_id, init, bound, int64(1), body)
}

pub fn if_stmt(cond: Expr, thn: Vec<Stmt>, els: Vec<Stmt>) -> Stmt {
    Stmt::If {cond, thn, els, i: i()}
}

pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While {cond, body, i: i()}
}

pub fn scope(body: Vec<Stmt>) -> Stmt {
    Stmt::Scope {body, i: i()}
}

pub fn barrier(scope: BarrierScope) -> Stmt {
    Stmt::Barrier {scope, i: i()}
}

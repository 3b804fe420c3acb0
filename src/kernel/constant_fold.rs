use super::ast::*;
use crate::utils::info::Info;
use crate::utils::smap::*;

fn fold_int_binop(l: i64, op: &BinOp, r: i64) -> Option<Expr> {
    let int = |v: Option<i64>| v.map(|v| (v, false));
    let b = |v: bool| Some((v as i64, true));
    let (v, is_bool) = match op {
        BinOp::Add => int(l.checked_add(r)),
        BinOp::Sub => int(l.checked_sub(r)),
        BinOp::Mul => int(l.checked_mul(r)),
        BinOp::Div => int(l.checked_div(r)),
        BinOp::Rem => int(l.checked_rem(r)),
        BinOp::BitAnd => int(Some(l & r)),
        BinOp::BitOr => int(Some(l | r)),
        BinOp::BitXor => int(Some(l ^ r)),
        BinOp::Max => int(Some(i64::max(l, r))),
        BinOp::Min => int(Some(i64::min(l, r))),
        BinOp::Eq => b(l == r),
        BinOp::Neq => b(l != r),
        BinOp::Leq => b(l <= r),
        BinOp::Geq => b(l >= r),
        BinOp::Lt => b(l < r),
        BinOp::Gt => b(l > r),
        _ => None
    }?;
    if is_bool {
        Some(Expr::Bool {v: v != 0, ty: Type::Scalar {sz: ElemSize::Bool}, i: Default::default()})
    } else {
        Some(Expr::Int {v, ty: Type::Scalar {sz: ElemSize::I64}, i: Default::default()})
    }
}

fn is_int_literal(e: &Expr, v: i64) -> bool {
    match e {
        Expr::Int {v: x, ..} => *x == v,
        _ => false
    }
}

fn fold_binop(lhs: Expr, op: BinOp, rhs: Expr, ty: Type, i: Info) -> Expr {
    let is_i64 = ty == Type::Scalar {sz: ElemSize::I64};
    match (&lhs, &op, &rhs) {
        (Expr::Int {v: l, ty: lty, ..}, _, Expr::Int {v: r, ty: rty, ..})
                if lty == rty && *lty == (Type::Scalar {sz: ElemSize::I64}) => {
            match fold_int_binop(*l, &op, *r) {
                Some(e) => e.with_info(i),
                None => Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty, i}
            }
        },
        (Expr::Bool {v: l, ..}, BinOp::And, Expr::Bool {v: r, ..}) =>
            Expr::Bool {v: *l && *r, ty, i},
        (Expr::Bool {v: l, ..}, BinOp::Or, Expr::Bool {v: r, ..}) =>
            Expr::Bool {v: *l || *r, ty, i},
        (Expr::Bool {v: true, ..}, BinOp::And, _) => rhs,
        (_, BinOp::And, Expr::Bool {v: true, ..}) => lhs,
        (_, BinOp::Add, _) if is_i64 && is_int_literal(&rhs, 0) => lhs,
        (_, BinOp::Add, _) if is_i64 && is_int_literal(&lhs, 0) => rhs,
        (_, BinOp::Sub, _) if is_i64 && is_int_literal(&rhs, 0) => lhs,
        (_, BinOp::Mul, _) if is_i64 && is_int_literal(&rhs, 1) => lhs,
        (_, BinOp::Mul, _) if is_i64 && is_int_literal(&lhs, 1) => rhs,
        (_, BinOp::Mul, _) if is_i64 && (is_int_literal(&lhs, 0) || is_int_literal(&rhs, 0)) => {
            Expr::Int {v: 0, ty, i}
        },
        (_, BinOp::Div, _) if is_i64 && is_int_literal(&rhs, 1) => lhs,
        _ => Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty, i}
    }
}

pub fn fold_expr(e: Expr) -> Expr {
    match e {
        Expr::UnOp {op, arg, ty, i} => {
            let arg = fold_expr(*arg);
            match (&op, &arg) {
                (UnOp::Neg, Expr::Int {v, ..}) if *v != i64::MIN => Expr::Int {v: -v, ty, i},
                (UnOp::Not, Expr::Bool {v, ..}) => Expr::Bool {v: !v, ty, i},
                _ => Expr::UnOp {op, arg: Box::new(arg), ty, i}
            }
        },
        Expr::BinOp {lhs, op, rhs, ty, i} => {
            let lhs = fold_expr(*lhs);
            let rhs = fold_expr(*rhs);
            fold_binop(lhs, op, rhs, ty, i)
        },
        Expr::IfExpr {cond, thn, els, ty, i} => {
            match fold_expr(*cond) {
                Expr::Bool {v: true, ..} => fold_expr(*thn),
                Expr::Bool {v: false, ..} => fold_expr(*els),
                cond => {
                    let thn = fold_expr(*thn);
                    let els = fold_expr(*els);
                    Expr::IfExpr {cond: Box::new(cond), thn: Box::new(thn), els: Box::new(els), ty, i}
                }
            }
        },
        Expr::Convert {e, ty} => {
            match (fold_expr(*e), &ty) {
                (Expr::Int {v, i, ..}, Type::Scalar {sz: ElemSize::I64}) => Expr::Int {v, ty, i},
                (e, _) => Expr::Convert {e: Box::new(e), ty}
            }
        },
        _ => e.smap(fold_expr)
    }
}

// Returns the value of an integer expression if it can be determined at compile time.
pub fn as_const_int(e: &Expr) -> Option<i64> {
    match fold_expr(e.clone()) {
        Expr::Int {v, ..} => Some(v),
        _ => None
    }
}

fn fold_stmt(mut acc: Vec<Stmt>, s: Stmt) -> Vec<Stmt> {
    match s {
        Stmt::If {cond, thn, els, i} => {
            let thn = fold_stmts(thn);
            let els = fold_stmts(els);
            match fold_expr(cond) {
                Expr::Bool {v: true, ..} => acc.extend(thn),
                Expr::Bool {v: false, ..} => acc.extend(els),
                cond => acc.push(Stmt::If {cond, thn, els, i})
            };
            acc
        },
        Stmt::LaunchKernel {mut kernel, i} => {
            kernel.body = fold_stmts(kernel.body);
            kernel.num_groups = kernel.num_groups.smap(fold_expr);
            kernel.group_size = kernel.group_size.smap(fold_expr);
            acc.push(Stmt::LaunchKernel {kernel, i});
            acc
        },
        Stmt::For {var_ty, var, init, cond, incr, body, i} => {
            let init = fold_expr(init);
            let cond = fold_expr(cond);
            let incr = fold_expr(incr);
            let body = fold_stmts(body);
            acc.push(Stmt::For {var_ty, var, init, cond, incr, body, i});
            acc
        },
        Stmt::While {cond, body, i} => {
            let cond = fold_expr(cond);
            let body = fold_stmts(body);
            acc.push(Stmt::While {cond, body, i});
            acc
        },
        Stmt::Scope {body, i} => {
            acc.push(Stmt::Scope {body: fold_stmts(body), i});
            acc
        },
        _ => {
            acc.push(s.smap(fold_expr));
            acc
        }
    }
}

// Folds constant expressions and eliminates conditionals whose condition is known at compile
// time. The statements of the taken branch replace the conditional.
pub fn fold_stmts(stmts: Vec<Stmt>) -> Vec<Stmt> {
    stmts.into_iter().fold(vec![], fold_stmt)
}

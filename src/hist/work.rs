use super::ast::*;
use crate::kernel::ast::*;
use crate::kernel::ast_builder::*;
use crate::kernel::constant_fold::as_const_int;
use crate::utils::name::Name;

// Binds an integer expression to a fresh host variable, unless its value is known at compile
// time. Returns the definitions to emit along with an expression referring to the value.
pub fn bind_i64(stmts: &mut Vec<Stmt>, label: &str, e: Expr) -> Expr {
    match as_const_int(&e) {
        Some(v) => int64(v),
        None => {
            let id = Name::sym_str(label);
            let e = if e.get_type() == &i64_ty() { e } else { convert(e, ElemSize::I64) };
            stmts.push(definition(&id, e));
            i64_var(&id)
        }
    }
}

// Computes the flat row-major index of a multi-dimensional index, given as pairs of index and
// dimension size.
pub fn flatten(idxs: Vec<(Expr, Expr)>) -> Expr {
    idxs.into_iter()
        .fold(None, |acc, (idx, size)| match acc {
            Some(acc) => Some(add(mul(acc, size), idx)),
            None => Some(idx)
        })
        .unwrap_or(int64(0))
}

// Defines the index variables of the given dimensions by decoding a flat row-major index.
pub fn unflatten(flat: Expr, dims: &[(Name, Expr)]) -> Vec<Stmt> {
    let n = dims.len();
    dims.iter()
        .enumerate()
        .map(|(k, (id, size))| {
            let stride = prod(dims[k+1..n].iter().map(|(_, s)| s.clone()).collect());
            let e = if k == 0 {
                div(flat.clone(), stride)
            } else {
                rem(div(flat.clone(), stride), size.clone())
            };
            definition(id, e)
        })
        .collect()
}

// Wraps the body in loops over each of the vector indices of an operator.
pub fn vector_loops(op: &ReductionOperator, body: Vec<Stmt>) -> Vec<Stmt> {
    op.vec_indices.iter()
        .zip(op.shape.iter())
        .rev()
        .fold(body, |body, (id, size)| {
            vec![for_range(id, int64(0), size.clone(), body)]
        })
}

// The flat index of the current element of the vector loops of an operator.
pub fn vector_index(op: &ReductionOperator) -> Expr {
    let idxs = op.vec_indices.iter()
        .zip(op.shape.iter())
        .map(|(id, size)| (i64_var(id), size.clone()))
        .collect::<Vec<_>>();
    flatten(idxs)
}

// Applies a combining function to its arguments and assigns the results to the given variables.
// The parameters of the function are bound in a separate scope, so that the function can be
// applied multiple times within the same block.
pub fn apply_lambda(lambda: &Lambda, args: Vec<Expr>, outs: &[Name]) -> Stmt {
    let mut body = lambda.params.iter()
        .zip(args.into_iter())
        .map(|((id, sz), arg)| {
            let arg = if arg.get_type() == &scalar(*sz) { arg } else { convert(arg, *sz) };
            definition(id, arg)
        })
        .collect::<Vec<Stmt>>();
    body.extend(lambda.body.clone());
    body.extend(lambda.results.iter()
        .zip(outs.iter())
        .zip(lambda.params.iter())
        .map(|((e, out), (_, sz))| assign(var(out, scalar(*sz)), e.clone())));
    scope(body)
}

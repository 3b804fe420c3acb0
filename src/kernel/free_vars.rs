use super::ast::*;
use crate::utils::name::Name;
use crate::utils::smap::SFold;

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct FVEnv {
    pub bound: BTreeSet<Name>,
    pub free: BTreeMap<Name, Type>
}

impl FVEnv {
    fn use_var(mut self, id: &Name, ty: &Type) -> Self {
        if !self.bound.contains(id) {
            self.free.insert(id.clone(), ty.clone());
        };
        self
    }

    fn bind(mut self, id: &Name) -> Self {
        self.bound.insert(id.clone());
        self
    }
}

fn fv_expr(env: FVEnv, e: &Expr) -> FVEnv {
    match e {
        Expr::Var {id, ty, ..} => env.use_var(id, ty),
        _ => e.sfold(env, fv_expr)
    }
}

fn fv_stmt(env: FVEnv, s: &Stmt) -> FVEnv {
    match s {
        Stmt::Definition {id, expr, ..} => fv_expr(env, expr).bind(id),
        Stmt::For {var, init, cond, incr, body, ..} => {
            let env = fv_expr(env, init).bind(var);
            let env = fv_expr(fv_expr(env, cond), incr);
            body.iter().fold(env, fv_stmt)
        },
        Stmt::Atomic {mem, sz, target, idx, value, old, ..} => {
            let env = env.use_var(target, &Type::Pointer {sz: *sz, mem: mem.clone()});
            let env = fv_expr(fv_expr(env, idx), value);
            match old {
                Some(id) => env.bind(id),
                None => env
            }
        },
        Stmt::AtomicCas {old, mem, sz, target, idx, cmp, new, ..} => {
            let env = env.use_var(target, &Type::Pointer {sz: *sz, mem: mem.clone()});
            let env = fv_expr(fv_expr(fv_expr(env, idx), cmp), new);
            env.bind(old)
        },
        _ => {
            let env = s.sfold(env, fv_expr);
            s.sfold(env, fv_stmt)
        }
    }
}

// Computes the variables used in a kernel body that are defined outside of it. Local memory
// blocks declared by the kernel are not considered free.
pub fn free_variables(body: &Vec<Stmt>, local_mem: &Vec<LocalMemory>) -> BTreeMap<Name, Type> {
    let env = local_mem.iter()
        .fold(FVEnv::default(), |env, m| env.bind(&m.id));
    body.iter().fold(env, fv_stmt).free
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::ast_builder::*;

    #[test]
    fn defined_variables_are_not_free() {
        let x = Name::sym_str("x");
        let y = Name::sym_str("y");
        let body = vec![
            definition(&x, int64(1)),
            definition(&y, add(i64_var(&x), int64(2)))
        ];
        assert!(free_variables(&body, &vec![]).is_empty());
    }

    #[test]
    fn captured_scalar_and_array() {
        let n = Name::sym_str("n");
        let a = Name::sym_str("a");
        let k = Name::sym_str("k");
        let body = vec![
            for_range(&k, int64(0), i64_var(&n), vec![
                assign(access(&a, ElemSize::F32, MemSpace::Device, i64_var(&k)), float(0.0, ElemSize::F32))
            ])
        ];
        let fv = free_variables(&body, &vec![]);
        assert_eq!(fv.len(), 2);
        assert_eq!(fv.get(&n), Some(&i64_ty()));
        assert_eq!(fv.get(&a), Some(&pointer(ElemSize::F32, MemSpace::Device)));
    }

    #[test]
    fn atomic_target_is_captured_and_local_memory_is_not() {
        let a = Name::sym_str("a");
        let l = Name::sym_str("l");
        let old = Name::sym_str("old");
        let body = vec![
            Stmt::Atomic {
                op: AtomicOp::Add, mem: MemSpace::Device, sz: ElemSize::I32, target: a.clone(),
                idx: int64(0), value: int(1, ElemSize::I32), old: Some(old.clone()), i: i()
            },
            Stmt::Atomic {
                op: AtomicOp::Add, mem: MemSpace::Local, sz: ElemSize::I32, target: l.clone(),
                idx: int64(0), value: var(&old, scalar(ElemSize::I32)), old: None, i: i()
            },
        ];
        let local_mem = vec![LocalMemory {id: l, elem: ElemSize::I32, size: LocalMemSize::Static(1)}];
        let fv = free_variables(&body, &local_mem);
        assert_eq!(fv.into_keys().collect::<Vec<Name>>(), vec![a]);
    }
}

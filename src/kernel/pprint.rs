use super::ast::*;
use crate::utils::pprint::*;

use itertools::Itertools;

use std::cmp::Ordering;

impl PrettyPrint for Type {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        match self {
            Type::Scalar {sz} => (env, sz.to_string()),
            Type::Pointer {sz, mem} => (env, format!("{mem} {sz}*")),
        }
    }
}

fn unop_str(op: &UnOp) -> &'static str {
    match op {
        UnOp::Neg => "-",
        UnOp::Not => "!",
        UnOp::BitNeg => "~",
        UnOp::Abs => "abs",
        UnOp::Exp => "exp",
        UnOp::Log => "log",
        UnOp::Sqrt => "sqrt",
    }
}

fn parenthesize_if_lower_precedence(inner: &Expr, outer_op: &BinOp, s: String) -> String {
    match inner {
        Expr::BinOp {op, ..} if op.is_infix() => {
            if let Ordering::Less = BinOp::precedence(op, outer_op) {
                format!("({s})")
            } else {
                s
            }
        },
        _ => s
    }
}

fn self_arg_is_leaf(e: &Expr) -> bool {
    match e {
        Expr::UnOp {arg, ..} => arg.is_leaf_node(),
        _ => true
    }
}

fn dim_str(dim: &Dim) -> usize {
    dim.index()
}

impl PrettyPrint for Expr {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        match self {
            Expr::Var {id, ..} => id.pprint(env),
            Expr::Bool {v, ..} => (env, v.to_string()),
            Expr::Int {v, ty, ..} => (env, format!("{v}{}", ty.elem_size())),
            Expr::Float {v, ty, ..} => (env, format!("{v:?}{}", ty.elem_size())),
            Expr::UnOp {op, arg, ..} => {
                let (env, arg) = arg.pprint(env);
                if op.is_function() || !self_arg_is_leaf(self) {
                    (env, format!("{0}({arg})", unop_str(op)))
                } else {
                    (env, format!("{0}{arg}", unop_str(op)))
                }
            },
            Expr::BinOp {lhs, op, rhs, ..} => {
                let (env, l) = lhs.pprint(env);
                let (env, r) = rhs.pprint(env);
                if op.is_infix() {
                    let l = parenthesize_if_lower_precedence(lhs, op, l);
                    let r = parenthesize_if_lower_precedence(rhs, op, r);
                    (env, format!("{l} {0} {r}", op.symbol()))
                } else {
                    (env, format!("{0}({l}, {r})", op.symbol()))
                }
            },
            Expr::IfExpr {cond, thn, els, ..} => {
                let (env, cond) = cond.pprint(env);
                let (env, thn) = thn.pprint(env);
                let (env, els) = els.pprint(env);
                (env, format!("(if {cond} then {thn} else {els})"))
            },
            Expr::ArrayAccess {target, idx, ..} => {
                let (env, target) = target.pprint(env);
                let (env, idx) = idx.pprint(env);
                (env, format!("{target}[{idx}]"))
            },
            Expr::Convert {e, ty} => {
                let (env, e) = e.pprint(env);
                let (env, ty) = ty.pprint(env);
                (env, format!("({ty})({e})"))
            },
            Expr::BitCast {e, ty} => {
                let (env, e) = e.pprint(env);
                let (env, ty) = ty.pprint(env);
                (env, format!("bitcast<{ty}>({e})"))
            },
            Expr::LocalId {dim, ..} => (env, format!("local_id({0})", dim_str(dim))),
            Expr::GroupId {dim, ..} => (env, format!("group_id({0})", dim_str(dim))),
            Expr::GlobalId {dim, ..} => (env, format!("global_id({0})", dim_str(dim))),
            Expr::LocalSize {dim, ..} => (env, format!("local_size({0})", dim_str(dim))),
            Expr::NumGroups {dim, ..} => (env, format!("num_groups({0})", dim_str(dim))),
            Expr::SizeParam {id, ..} => (env, format!("size<{id}>")),
            Expr::DeviceQuery {cap, ..} => (env, format!("device<{cap:?}>")),
        }
    }
}

impl PrettyPrint for LocalMemory {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let (env, id) = self.id.pprint(env);
        let (env, size) = match &self.size {
            LocalMemSize::Static(n) => (env, n.to_string()),
            LocalMemSize::Dynamic(e) => e.pprint(env),
        };
        (env, format!("local {0} {id}[{size}];", self.elem))
    }
}

impl PrettyPrint for Kernel {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let indent = env.print_indent();
        let (env, id) = self.id.pprint(env);
        let (env, uses) = self.uses.iter()
            .fold((env, vec![]), |(env, mut strs), (id, ty)| {
                let (env, id) = id.pprint(env);
                let (env, ty) = ty.pprint(env);
                strs.push(format!("{id}: {ty}"));
                (env, strs)
            });
        let (env, ng) = pprint_iter(self.num_groups.iter(), env, ", ");
        let (env, gs) = pprint_iter(self.group_size.iter(), env, ", ");
        let env = env.incr_indent();
        let inner = env.print_indent();
        let (env, mem) = self.local_mem.iter()
            .fold((env, vec![]), |(env, mut strs), m| {
                let (env, m) = m.pprint(env);
                strs.push(format!("{inner}{m}"));
                (env, strs)
            });
        let env = env.decr_indent();
        let (env, body) = pprint_block(&self.body, env);
        let body = mem.into_iter().chain(std::iter::once(body)).join("\n");
        let s = format!(
            "{indent}kernel {id}({0}) <<<[{ng}], [{gs}]>>> {{\n{body}\n{indent}}}",
            uses.into_iter().join(", ")
        );
        (env, s)
    }
}

impl PrettyPrint for Stmt {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let indent = env.print_indent();
        match self {
            Stmt::Definition {ty, id, expr, ..} => {
                let (env, ty) = ty.pprint(env);
                let (env, id) = id.pprint(env);
                let (env, expr) = expr.pprint(env);
                (env, format!("{indent}{ty} {id} = {expr};"))
            },
            Stmt::Assign {dst, expr, ..} => {
                let (env, dst) = dst.pprint(env);
                let (env, expr) = expr.pprint(env);
                (env, format!("{indent}{dst} = {expr};"))
            },
            Stmt::For {var_ty, var, init, cond, incr, body, ..} => {
                let (env, ty) = var_ty.pprint(env);
                let (env, var) = var.pprint(env);
                let (env, init) = init.pprint(env);
                let (env, cond) = cond.pprint(env);
                let (env, incr) = incr.pprint(env);
                let (env, body) = pprint_block(body, env);
                let s = format!(
                    "{0}for ({ty} {var} = {init}; {cond}; {var} = {incr}) {{\n{body}\n{0}}}",
                    indent
                );
                (env, s)
            },
            Stmt::If {cond, thn, els, ..} => {
                let (env, cond) = cond.pprint(env);
                let (env, thn) = pprint_block(thn, env);
                if els.is_empty() {
                    (env, format!("{0}if ({cond}) {{\n{thn}\n{0}}}", indent))
                } else {
                    let (env, els) = pprint_block(els, env);
                    let s = format!(
                        "{0}if ({cond}) {{\n{thn}\n{0}}} else {{\n{els}\n{0}}}", indent
                    );
                    (env, s)
                }
            },
            Stmt::While {cond, body, ..} => {
                let (env, cond) = cond.pprint(env);
                let (env, body) = pprint_block(body, env);
                (env, format!("{0}while ({cond}) {{\n{body}\n{0}}}", indent))
            },
            Stmt::Scope {body, ..} => {
                let (env, body) = pprint_block(body, env);
                (env, format!("{0}{{\n{body}\n{0}}}", indent))
            },
            Stmt::Barrier {scope, ..} => (env, format!("{indent}barrier({scope:?});")),
            Stmt::MemFence {mem, ..} => (env, format!("{indent}mem_fence({mem});")),
            Stmt::Atomic {op, mem, sz, target, idx, value, old, ..} => {
                let (env, old) = match old {
                    Some(id) => {
                        let (env, id) = id.pprint(env);
                        (env, format!("{sz} {id} = "))
                    },
                    None => (env, String::new())
                };
                let (env, target) = target.pprint(env);
                let (env, idx) = idx.pprint(env);
                let (env, value) = value.pprint(env);
                (env, format!("{indent}{old}atomic_{op}_{mem}(&{target}[{idx}], {value});"))
            },
            Stmt::AtomicCas {old, mem, sz, target, idx, cmp, new, ..} => {
                let (env, old) = old.pprint(env);
                let (env, target) = target.pprint(env);
                let (env, idx) = idx.pprint(env);
                let (env, cmp) = cmp.pprint(env);
                let (env, new) = new.pprint(env);
                let bits = sz.bit_pattern_type();
                (env, format!("{indent}{bits} {old} = atomic_cas_{mem}(&{target}[{idx}], {cmp}, {new});"))
            },
            Stmt::Alloc {id, elem, count, ..} => {
                let (env, id) = id.pprint(env);
                let (env, count) = count.pprint(env);
                (env, format!("{indent}{id} = alloc<{elem}>({count});"))
            },
            Stmt::Free {id, ..} => {
                let (env, id) = id.pprint(env);
                (env, format!("{indent}free({id});"))
            },
            Stmt::Copy {dst, dst_offset, src, src_offset, count, ..} => {
                let (env, dst) = dst.pprint(env);
                let (env, dst_offset) = dst_offset.pprint(env);
                let (env, src) = src.pprint(env);
                let (env, src_offset) = src_offset.pprint(env);
                let (env, count) = count.pprint(env);
                let s = format!(
                    "{indent}copy({dst} + {dst_offset}, {src} + {src_offset}, {count});"
                );
                (env, s)
            },
            Stmt::Fill {id, offset, count, value, ..} => {
                let (env, id) = id.pprint(env);
                let (env, offset) = offset.pprint(env);
                let (env, count) = count.pprint(env);
                let (env, value) = value.pprint(env);
                (env, format!("{indent}fill({id} + {offset}, {count}, {value});"))
            },
            Stmt::SetMem {dst, src, ..} => {
                let (env, dst) = dst.pprint(env);
                let (env, src) = src.pprint(env);
                (env, format!("{indent}{dst} <- {src};"))
            },
            Stmt::StaticArray {id, elem, values, ..} => {
                let (env, id) = id.pprint(env);
                let (env, values) = pprint_iter(values.iter(), env, ", ");
                (env, format!("{indent}static {elem} {id}[] = {{{values}}};"))
            },
            Stmt::LaunchKernel {kernel, ..} => kernel.pprint(env),
        }
    }
}

impl PrettyPrint for Program {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let sizes = self.sizes.iter()
            .map(|(id, class)| format!("size {id}: {class};"))
            .join("\n");
        let (env, body) = pprint_iter(self.body.iter(), env, "\n");
        if sizes.is_empty() {
            (env, body)
        } else {
            (env, format!("{sizes}\n{body}"))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::ast_builder::*;
    use crate::utils::name::Name;

    #[test]
    fn print_nested_binop_with_parentheses() {
        let x = Name::new("x".to_string());
        let e = mul(add(i64_var(&x), int64(1)), int64(2));
        assert_eq!(e.pprint_default(), "(x + 1i64) * 2i64");
    }

    #[test]
    fn print_for_loop() {
        let k = Name::new("k".to_string());
        let s = for_range(&k, int64(0), int64(4), vec![barrier(BarrierScope::Local)]);
        let expected = "for (i64 k = 0i64; k < 4i64; k = k + 1i64) {\n  barrier(Local);\n}";
        assert_eq!(s.pprint_default(), expected);
    }

    #[test]
    fn print_atomic_with_old_value() {
        let a = Name::new("a".to_string());
        let old = Name::new("old".to_string());
        let s = Stmt::Atomic {
            op: AtomicOp::Add, mem: MemSpace::Device, sz: ElemSize::I32, target: a,
            idx: int64(3), value: int(1, ElemSize::I32), old: Some(old), i: i()
        };
        assert_eq!(s.pprint_default(), "i32 old = atomic_add_device(&a[3i64], 1i32);");
    }
}

use super::ast::*;
use crate::utils::pprint::*;

use std::cmp::Ordering;

pub fn elem_type_str(sz: &ElemSize) -> &'static str {
    match sz {
        ElemSize::Bool => "bool",
        ElemSize::I8 => "int8_t",
        ElemSize::I16 => "int16_t",
        ElemSize::I32 => "int32_t",
        ElemSize::I64 => "int64_t",
        ElemSize::U8 => "uint8_t",
        ElemSize::U16 => "uint16_t",
        ElemSize::U32 => "uint32_t",
        ElemSize::U64 => "uint64_t",
        ElemSize::F32 => "float",
        ElemSize::F64 => "double",
    }
}

impl PrettyPrint for Qualifier {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let s = match self {
            Qualifier::None => "",
            Qualifier::Global => "__global",
            Qualifier::Local => "__local",
            Qualifier::Shared => "__shared__",
        };
        (env, s.to_string())
    }
}

fn with_qualifier(qual: &Qualifier, s: String) -> String {
    let q = qual.pprint_default();
    if q.is_empty() {
        s
    } else {
        format!("{q} {s}")
    }
}

impl PrettyPrint for Type {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        match self {
            Type::Void => (env, "void".to_string()),
            Type::Scalar {sz} => (env, elem_type_str(sz).to_string()),
            Type::Pointer {sz, qual} => {
                let s = format!("{0}*", elem_type_str(sz));
                (env, with_qualifier(qual, s))
            },
        }
    }
}

fn print_int(v: i64, ty: &Type) -> String {
    match ty.get_scalar_elem_size() {
        Some(ElemSize::I32) if v == i32::MIN as i64 => format!("({0} - 1)", v + 1),
        Some(ElemSize::I32) => v.to_string(),
        Some(ElemSize::U32) => format!("{0}u", v as u32),
        // The smallest 64-bit integer cannot be written as a negated literal, as the literal would
        // overflow before being negated.
        Some(ElemSize::I64) if v == i64::MIN => format!("((int64_t)({0}) - 1)", v + 1),
        Some(ElemSize::U64) if v < 0 => format!("(uint64_t)0x{0:x}", v as u64),
        Some(sz) => format!("({0}){v}", elem_type_str(sz)),
        None => v.to_string(),
    }
}

fn print_float(v: f64, ty: &Type) -> String {
    let suffix = match ty.get_scalar_elem_size() {
        Some(ElemSize::F32) => "f",
        _ => ""
    };
    if v.is_nan() {
        "NAN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INFINITY".to_string() } else { "-INFINITY".to_string() }
    } else {
        format!("{v:?}{suffix}")
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

// Operands of a binary operation are parenthesized when their operator binds less tightly than the
// enclosing one. On the right-hand side, operators of equal precedence are also parenthesized, as
// all binary operators of the device languages are left-associative.
fn parenthesize_operand(inner: &Expr, outer: &BinOp, rhs: bool, s: String) -> String {
    match inner {
        Expr::BinOp {op, ..} => {
            match BinOp::precedence(op, outer) {
                Ordering::Less => format!("({s})"),
                Ordering::Equal if rhs => format!("({s})"),
                _ => s
            }
        },
        Expr::Ternary {..} | Expr::Convert {..} | Expr::AddressOf {..} | Expr::UnOp {..} => {
            format!("({s})")
        },
        _ => s
    }
}

impl PrettyPrint for Expr {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        match self {
            Expr::Var {id, ..} => id.pprint(env),
            Expr::Bool {v, ..} => (env, v.to_string()),
            Expr::Int {v, ty} => (env, print_int(*v, ty)),
            Expr::Float {v, ty} => (env, print_float(*v, ty)),
            Expr::UnOp {op, arg, ..} => {
                let (env, arg_str) = arg.pprint(env);
                if arg.is_leaf_node() && !arg_str.starts_with('-') {
                    (env, format!("{0}{arg_str}", unop_str(op)))
                } else {
                    (env, format!("{0}({arg_str})", unop_str(op)))
                }
            },
            Expr::BinOp {lhs, op, rhs, ..} => {
                let (env, l) = lhs.pprint(env);
                let (env, r) = rhs.pprint(env);
                let l = parenthesize_operand(lhs, op, false, l);
                let r = parenthesize_operand(rhs, op, true, r);
                (env, format!("{l} {0} {r}", op.symbol()))
            },
            Expr::Ternary {cond, thn, els, ..} => {
                let (env, cond) = cond.pprint(env);
                let (env, thn) = thn.pprint(env);
                let (env, els) = els.pprint(env);
                (env, format!("({cond} ? {thn} : {els})"))
            },
            Expr::ArrayAccess {target, idx, ..} => {
                let (env, target) = target.pprint(env);
                let (env, idx) = idx.pprint(env);
                (env, format!("{target}[{idx}]"))
            },
            Expr::AddressOf {e, ..} => {
                let (env, e) = e.pprint(env);
                (env, format!("&{e}"))
            },
            Expr::Convert {e, ty} => {
                let (env, e_str) = e.pprint(env);
                let (env, ty) = ty.pprint(env);
                if e.is_leaf_node() {
                    (env, format!("({ty}){e_str}"))
                } else {
                    (env, format!("({ty})({e_str})"))
                }
            },
            Expr::Call {id, args, ..} => {
                let (env, args) = pprint_iter(args.iter(), env, ", ");
                (env, format!("{id}({args})"))
            },
        }
    }
}

impl PrettyPrint for Stmt {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let indent = env.print_indent();
        match self {
            Stmt::Definition {ty, id, expr} => {
                let (env, ty) = ty.pprint(env);
                let (env, id) = id.pprint(env);
                let (env, expr) = expr.pprint(env);
                (env, format!("{indent}{ty} {id} = {expr};"))
            },
            Stmt::Assign {dst, expr} => {
                let (env, dst) = dst.pprint(env);
                let (env, expr) = expr.pprint(env);
                (env, format!("{indent}{dst} = {expr};"))
            },
            Stmt::For {var_ty, var, init, cond, incr, body} => {
                let (env, ty) = var_ty.pprint(env);
                let (env, var) = var.pprint(env);
                let (env, init) = init.pprint(env);
                let (env, cond) = cond.pprint(env);
                let (env, incr) = incr.pprint(env);
                let (env, body) = pprint_block(body, env);
                (env, format!("{indent}for ({ty} {var} = {init}; {cond}; {var} = {incr}) {{\n\
                               {body}\n{indent}}}"))
            },
            Stmt::If {cond, thn, els} => {
                let (env, cond) = cond.pprint(env);
                let (env, thn) = pprint_block(thn, env);
                if els.is_empty() {
                    (env, format!("{indent}if ({cond}) {{\n{thn}\n{indent}}}"))
                } else {
                    let (env, els) = pprint_block(els, env);
                    (env, format!("{indent}if ({cond}) {{\n{thn}\n{indent}}} else {{\n\
                                   {els}\n{indent}}}"))
                }
            },
            Stmt::While {cond, body} => {
                let (env, cond) = cond.pprint(env);
                let (env, body) = pprint_block(body, env);
                (env, format!("{indent}while ({cond}) {{\n{body}\n{indent}}}"))
            },
            Stmt::Scope {body} => {
                let (env, body) = pprint_block(body, env);
                (env, format!("{indent}{{\n{body}\n{indent}}}"))
            },
            Stmt::Expr {e} => {
                let (env, e) = e.pprint(env);
                (env, format!("{indent}{e};"))
            },
            Stmt::LocalArray {id, elem, size, qual} => {
                let (env, id) = id.pprint(env);
                let decl = format!("{0} {id}[{size}];", elem_type_str(elem));
                (env, format!("{indent}{0}", with_qualifier(qual, decl)))
            },
            Stmt::ExternShared {id} => {
                let (env, id) = id.pprint(env);
                (env, format!("{indent}extern __shared__ __align__(8) uint8_t {id}[];"))
            },
        }
    }
}

impl PrettyPrint for Param {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let (env, ty) = self.ty.pprint(env);
        let (env, id) = self.id.pprint(env);
        (env, format!("{ty} {id}"))
    }
}

impl PrettyPrint for Attribute {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let s = match self {
            Attribute::OpenCLKernel => "__kernel",
            Attribute::CudaGlobal => "extern \"C\" __global__",
        };
        (env, s.to_string())
    }
}

impl PrettyPrint for KernelDef {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let (env, attr) = self.attr.pprint(env);
        let (env, id) = self.id.pprint(env);
        let (env, params) = pprint_iter(self.params.iter(), env, ", ");
        let (env, body) = pprint_block(&self.body, env);
        (env, format!("{attr} void {id}({params}) {{\n{body}\n}}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::name::Name;

    fn i32_ty() -> Type {
        Type::Scalar {sz: ElemSize::I32}
    }

    fn var(s: &str) -> Expr {
        Expr::Var {id: Name::new(s.to_string()), ty: i32_ty()}
    }

    fn bop(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
        Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty: i32_ty()}
    }

    #[test]
    fn left_nested_same_precedence_omits_parentheses() {
        let e = bop(bop(var("x"), BinOp::Sub, var("y")), BinOp::Sub, var("z"));
        assert_eq!(e.pprint_default(), "x - y - z");
    }

    #[test]
    fn right_nested_same_precedence_keeps_parentheses() {
        let e = bop(var("x"), BinOp::Sub, bop(var("y"), BinOp::Sub, var("z")));
        assert_eq!(e.pprint_default(), "x - (y - z)");
    }

    #[test]
    fn lower_precedence_operand_is_parenthesized() {
        let e = bop(bop(var("x"), BinOp::Add, var("y")), BinOp::Mul, var("z"));
        assert_eq!(e.pprint_default(), "(x + y) * z");
        let e = bop(var("x"), BinOp::Add, bop(var("y"), BinOp::Mul, var("z")));
        assert_eq!(e.pprint_default(), "x + y * z");
    }

    #[test]
    fn integer_literals() {
        let i64_ty = Type::Scalar {sz: ElemSize::I64};
        assert_eq!(print_int(3, &i32_ty()), "3");
        assert_eq!(print_int(3, &Type::Scalar {sz: ElemSize::U32}), "3u");
        assert_eq!(print_int(3, &i64_ty), "(int64_t)3");
        assert_eq!(print_int(i64::MIN, &i64_ty), "((int64_t)(-9223372036854775807) - 1)");
        assert_eq!(print_int(-1, &Type::Scalar {sz: ElemSize::U64}), "(uint64_t)0xffffffffffffffff");
    }

    #[test]
    fn float_literals() {
        let f32_ty = Type::Scalar {sz: ElemSize::F32};
        let f64_ty = Type::Scalar {sz: ElemSize::F64};
        assert_eq!(print_float(1.5, &f32_ty), "1.5f");
        assert_eq!(print_float(2.0, &f64_ty), "2.0");
        assert_eq!(print_float(f64::INFINITY, &f32_ty), "INFINITY");
        assert_eq!(print_float(f64::NEG_INFINITY, &f64_ty), "-INFINITY");
        assert_eq!(print_float(f64::NAN, &f64_ty), "NAN");
    }

    #[test]
    fn qualified_pointer_type() {
        let ty = Type::Pointer {sz: ElemSize::F32, qual: Qualifier::Global};
        assert_eq!(ty.pprint_default(), "__global float*");
        let ty = Type::Pointer {sz: ElemSize::U8, qual: Qualifier::None};
        assert_eq!(ty.pprint_default(), "uint8_t*");
    }

    #[test]
    fn kernel_definition() {
        let k = KernelDef {
            attr: Attribute::OpenCLKernel,
            id: Name::new("f".to_string()),
            params: vec![Param {
                id: Name::new("x".to_string()),
                ty: Type::Pointer {sz: ElemSize::I32, qual: Qualifier::Global}
            }],
            body: vec![
                Stmt::LocalArray {
                    id: Name::new("l".to_string()), elem: ElemSize::I32, size: 4,
                    qual: Qualifier::Local
                },
                Stmt::If {
                    cond: bop(var("y"), BinOp::Lt, var("z")),
                    thn: vec![Stmt::Expr {e: Expr::Call {
                        id: "barrier_local".to_string(), args: vec![], ty: Type::Void
                    }}],
                    els: vec![]
                }
            ]
        };
        let expected = "__kernel void f(__global int32_t* x) {\n  __local int32_t l[4];\n  \
                        if (y < z) {\n    barrier_local();\n  }\n}";
        assert_eq!(k.pprint_default(), expected);
    }
}

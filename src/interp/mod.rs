pub mod memory;
pub mod value;

use memory::{Buffer, Memory};
use value::*;
use crate::parhist_runtime_error;
use crate::kernel::ast::*;
use crate::option::DeviceCaps;
use crate::utils::err::*;
use crate::utils::info::*;
use crate::utils::name::Name;
use crate::utils::smap::SFold;

use std::collections::BTreeMap;

// The maximum number of iterations of a single loop. Exceeding it is reported as an error, as it
// indicates a spin loop that cannot make progress.
pub const DEFAULT_LOOP_LIMIT: i64 = 1 << 24;

#[derive(Clone, Copy, Debug, PartialEq)]
struct ThreadIds {
    local_id: [i64; 3],
    group_id: [i64; 3],
    local_size: [i64; 3],
    num_groups: [i64; 3],
}

impl ThreadIds {
    fn global_id(&self, d: usize) -> i64 {
        self.group_id[d] * self.local_size[d] + self.local_id[d]
    }
}

// The state visible to the code executed by the host or by one thread of a kernel.
struct Env<'a> {
    vars: &'a mut BTreeMap<Name, Value>,
    mem: &'a mut Memory,
    thread: Option<ThreadIds>,
}

struct Interp {
    caps: DeviceCaps,
    sizes: BTreeMap<String, i64>,
    loop_limit: i64,
    launches: Vec<String>,
}

fn i64_value(v: i64) -> Value {
    Value::int(v as i128, ElemSize::I64)
}

fn array_name<'a>(target: &'a Expr, i: &Info) -> CompileResult<&'a Name> {
    match target {
        Expr::Var {id, ..} => Ok(id),
        _ => parhist_runtime_error!(i, "Array accesses must refer to a named array")
    }
}

fn thread_ids(env: &Env, i: &Info) -> CompileResult<ThreadIds> {
    match env.thread {
        Some(ids) => Ok(ids),
        None => parhist_runtime_error!(i, "Thread index used in host code")
    }
}

fn host_only(env: &Env, i: &Info) -> CompileResult<()> {
    match env.thread {
        Some(_) => parhist_runtime_error!(i, "Found host-level expression in kernel code"),
        None => Ok(())
    }
}

fn contains_barrier(acc: bool, s: &Stmt) -> bool {
    match s {
        Stmt::Barrier {..} => true,
        _ => s.sfold(acc, contains_barrier)
    }
}

// Splits the body of a kernel into phases separated by barriers. All threads of a group complete
// a phase before any thread starts the next one. Only barriers at the top level of the body can
// be represented this way.
fn split_phases<'a>(kernel: &'a Kernel) -> CompileResult<Vec<&'a [Stmt]>> {
    let nested = kernel.body.iter()
        .any(|s| !matches!(s, Stmt::Barrier {..}) && contains_barrier(false, s));
    if nested {
        parhist_runtime_error!(
            kernel.i, "Kernel {0} contains a barrier nested in control flow, which is not \
                       supported by the interpreter", kernel.id
        )
    } else {
        Ok(kernel.body.split(|s| matches!(s, Stmt::Barrier {..})).collect())
    }
}

// Enumerates the indices of a three-dimensional grid with the first dimension varying fastest.
fn grid_indices(dims: &[i64; 3]) -> Vec<[i64; 3]> {
    let mut idxs = vec![];
    for z in 0..dims[2] {
        for y in 0..dims[1] {
            for x in 0..dims[0] {
                idxs.push([x, y, z]);
            }
        }
    }
    idxs
}

impl Interp {
    fn eval_i64(&self, env: &Env, e: &Expr) -> CompileResult<i64> {
        Ok(self.eval_expr(env, e)?.as_i64())
    }

    fn eval_expr(&self, env: &Env, e: &Expr) -> CompileResult<Value> {
        let i = e.get_info();
        match e {
            Expr::Var {id, ..} => match env.vars.get(id) {
                Some(v) => Ok(*v),
                None => parhist_runtime_error!(i, "Reference to undefined variable {id}")
            },
            Expr::Bool {v, ..} => Ok(Value::Bool(*v)),
            Expr::Int {v, ty, ..} => Ok(Value::int(*v as i128, *ty.elem_size())),
            Expr::Float {v, ty, ..} => Ok(Value::float(*v, *ty.elem_size())),
            Expr::UnOp {op, arg, ty, ..} => {
                let v = self.eval_expr(env, arg)?;
                eval_unop(op, v, *ty.elem_size(), &i)
            },
            Expr::BinOp {lhs, op: BinOp::And, rhs, ..} => {
                let v = self.eval_expr(env, lhs)?.as_bool() && self.eval_expr(env, rhs)?.as_bool();
                Ok(Value::Bool(v))
            },
            Expr::BinOp {lhs, op: BinOp::Or, rhs, ..} => {
                let v = self.eval_expr(env, lhs)?.as_bool() || self.eval_expr(env, rhs)?.as_bool();
                Ok(Value::Bool(v))
            },
            Expr::BinOp {lhs, op, rhs, ty, ..} => {
                let l = self.eval_expr(env, lhs)?;
                let r = self.eval_expr(env, rhs)?;
                eval_binop(l, op, r, *ty.elem_size(), &i)
            },
            Expr::IfExpr {cond, thn, els, ..} => {
                if self.eval_expr(env, cond)?.as_bool() {
                    self.eval_expr(env, thn)
                } else {
                    self.eval_expr(env, els)
                }
            },
            Expr::ArrayAccess {target, idx, ..} => {
                let id = array_name(target, &i)?;
                let idx = self.eval_i64(env, idx)?;
                env.mem.read(id, idx, &i)
            },
            Expr::Convert {e, ty} => Ok(self.eval_expr(env, e)?.convert(*ty.elem_size())),
            Expr::BitCast {e, ty} => {
                let v = self.eval_expr(env, e)?;
                let sz = *ty.elem_size();
                if v.elem_size().bytes() != sz.bytes() {
                    parhist_runtime_error!(i, "Bit cast of {v} to {sz} changes the size of the value")
                } else {
                    Ok(Value::from_bits(v.to_bits(), sz))
                }
            },
            Expr::LocalId {dim, ..} => Ok(i64_value(thread_ids(env, &i)?.local_id[dim.index()])),
            Expr::GroupId {dim, ..} => Ok(i64_value(thread_ids(env, &i)?.group_id[dim.index()])),
            Expr::GlobalId {dim, ..} => Ok(i64_value(thread_ids(env, &i)?.global_id(dim.index()))),
            Expr::LocalSize {dim, ..} => Ok(i64_value(thread_ids(env, &i)?.local_size[dim.index()])),
            Expr::NumGroups {dim, ..} => Ok(i64_value(thread_ids(env, &i)?.num_groups[dim.index()])),
            Expr::SizeParam {id, ..} => {
                host_only(env, &i)?;
                match self.sizes.get(id) {
                    Some(v) => Ok(i64_value(*v)),
                    None => parhist_runtime_error!(i, "Reference to unregistered size parameter {id}")
                }
            },
            Expr::DeviceQuery {cap, ..} => {
                host_only(env, &i)?;
                let v = match cap {
                    DeviceCap::MaxGroupSize => self.caps.max_group_size,
                    DeviceCap::MaxLocalMemory => self.caps.max_local_memory,
                    DeviceCap::LocalMemPerThread => self.caps.local_mem_per_thread,
                };
                Ok(i64_value(v))
            },
        }
    }

    fn step_loop(&self, iters: &mut i64, i: &Info) -> CompileResult<()> {
        *iters += 1;
        if *iters > self.loop_limit {
            parhist_runtime_error!(i, "Loop exceeded the limit of {0} iterations", self.loop_limit)
        } else {
            Ok(())
        }
    }

    fn exec_stmts(&mut self, env: &mut Env, stmts: &[Stmt]) -> CompileResult<()> {
        for s in stmts {
            self.exec_stmt(env, s)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, env: &mut Env, s: &Stmt) -> CompileResult<()> {
        let i = s.get_info();
        if env.thread.is_some() && s.is_host_only() {
            parhist_runtime_error!(i, "Found host-level statement in kernel code")?
        }
        match s {
            Stmt::Definition {ty, id, expr, ..} => {
                let v = match ty {
                    Type::Scalar {sz} => self.eval_expr(env, expr)?.convert(*sz),
                    Type::Pointer {..} => {
                        parhist_runtime_error!(i, "Definition of pointer variable {id} is not supported")?
                    }
                };
                env.vars.insert(id.clone(), v);
            },
            Stmt::Assign {dst, expr, ..} => {
                let v = self.eval_expr(env, expr)?;
                match dst {
                    Expr::Var {id, ty, ..} => {
                        env.vars.insert(id.clone(), v.convert(*ty.elem_size()));
                    },
                    Expr::ArrayAccess {target, idx, ..} => {
                        let id = array_name(target, &i)?;
                        let idx = self.eval_i64(env, idx)?;
                        env.mem.write(id, idx, v, &i)?;
                    },
                    _ => parhist_runtime_error!(i, "Invalid target of assignment")?
                }
            },
            Stmt::For {var_ty, var, init, cond, incr, body, ..} => {
                let sz = *var_ty.elem_size();
                let v = self.eval_expr(env, init)?.convert(sz);
                env.vars.insert(var.clone(), v);
                let mut iters = 0;
                while self.eval_expr(env, cond)?.as_bool() {
                    self.step_loop(&mut iters, &i)?;
                    self.exec_stmts(env, body)?;
                    let v = self.eval_expr(env, incr)?.convert(sz);
                    env.vars.insert(var.clone(), v);
                }
            },
            Stmt::If {cond, thn, els, ..} => {
                if self.eval_expr(env, cond)?.as_bool() {
                    self.exec_stmts(env, thn)?;
                } else {
                    self.exec_stmts(env, els)?;
                }
            },
            Stmt::While {cond, body, ..} => {
                let mut iters = 0;
                while self.eval_expr(env, cond)?.as_bool() {
                    self.step_loop(&mut iters, &i)?;
                    self.exec_stmts(env, body)?;
                }
            },
            Stmt::Scope {body, ..} => self.exec_stmts(env, body)?,
            Stmt::Barrier {..} => {
                parhist_runtime_error!(i, "Barrier outside the top level of a kernel")?
            },
            Stmt::MemFence {..} => (),
            Stmt::Atomic {op, sz, target, idx, value, old, ..} => {
                let idx = self.eval_i64(env, idx)?;
                let v = self.eval_expr(env, value)?;
                let current = env.mem.read(target, idx, &i)?.convert(*sz);
                let new = eval_atomic(op, current, v, *sz, &i)?;
                env.mem.write(target, idx, new, &i)?;
                if let Some(id) = old {
                    env.vars.insert(id.clone(), current);
                }
            },
            Stmt::AtomicCas {old, sz, target, idx, cmp, new, ..} => {
                let bits = sz.bit_pattern_type();
                let idx = self.eval_i64(env, idx)?;
                let cmp = Value::from_bits(self.eval_expr(env, cmp)?.to_bits(), bits);
                let new = self.eval_expr(env, new)?.to_bits();
                let current = Value::from_bits(env.mem.read(target, idx, &i)?.to_bits(), bits);
                if current == cmp {
                    env.mem.write(target, idx, Value::from_bits(new, *sz), &i)?;
                }
                env.vars.insert(old.clone(), current);
            },
            Stmt::Alloc {id, elem, count, ..} => {
                let n = self.eval_i64(env, count)?;
                if n < 0 {
                    parhist_runtime_error!(i, "Allocation of {id} with negative size {n}")?
                }
                env.mem.insert(id.clone(), Buffer::new(*elem, n as usize));
            },
            Stmt::Free {id, ..} => env.mem.remove(id, &i)?,
            Stmt::Copy {dst, dst_offset, src, src_offset, count, ..} => {
                let dst_offset = self.eval_i64(env, dst_offset)?;
                let src_offset = self.eval_i64(env, src_offset)?;
                let count = self.eval_i64(env, count)?;
                env.mem.copy(dst, dst_offset, src, src_offset, count, &i)?;
            },
            Stmt::Fill {id, offset, count, value, ..} => {
                let offset = self.eval_i64(env, offset)?;
                let count = self.eval_i64(env, count)?;
                let v = self.eval_expr(env, value)?;
                env.mem.fill(id, offset, count, v, &i)?;
            },
            Stmt::SetMem {dst, src, ..} => env.mem.alias(dst, src, &i)?,
            Stmt::StaticArray {id, elem, values, ..} => {
                let values = values.iter()
                    .map(|e| self.eval_expr(env, e))
                    .collect::<CompileResult<Vec<Value>>>()?;
                env.mem.insert(id.clone(), Buffer::from_values(*elem, values));
            },
            Stmt::LaunchKernel {kernel, ..} => self.launch(env, kernel)?,
        };
        Ok(())
    }

    fn launch_dims(&self, host: &Env, kernel: &Kernel) -> CompileResult<([i64; 3], [i64; 3])> {
        let dims = kernel.dims();
        if dims == 0 || dims > 3 || kernel.group_size.len() != dims {
            parhist_runtime_error!(
                kernel.i, "Kernel {0} has an invalid launch shape of {1} by {2} dimensions",
                kernel.id, kernel.num_groups.len(), kernel.group_size.len()
            )?
        }
        let mut num_groups = [1; 3];
        let mut group_size = [1; 3];
        for d in 0..dims {
            num_groups[d] = self.eval_i64(host, &kernel.num_groups[d])?;
            group_size[d] = self.eval_i64(host, &kernel.group_size[d])?;
        }
        if num_groups.iter().chain(group_size.iter()).any(|n| *n < 0) {
            parhist_runtime_error!(
                kernel.i, "Kernel {0} launched with negative size {num_groups:?} by {group_size:?}",
                kernel.id
            )?
        }
        let threads = group_size.iter().product::<i64>();
        if threads > self.caps.max_group_size {
            parhist_runtime_error!(
                kernel.i, "Kernel {0} launched with {threads} threads per group, exceeding the \
                           maximum of {1}", kernel.id, self.caps.max_group_size
            )?
        }
        Ok((num_groups, group_size))
    }

    // Runs all threads of a kernel launch sequentially. The groups run one after another, and
    // within a group, each phase is run by all threads before the next phase starts.
    fn launch(&mut self, host: &Env, kernel: &Kernel) -> CompileResult<()> {
        let (num_groups, group_size) = self.launch_dims(host, kernel)?;
        let phases = split_phases(kernel)?;

        let mut captured = BTreeMap::new();
        for (id, ty) in &kernel.uses {
            match (ty.is_pointer(), host.vars.get(id)) {
                (true, _) if host.mem.contains(id) => (),
                (false, Some(v)) => {
                    captured.insert(id.clone(), *v);
                },
                _ => parhist_runtime_error!(kernel.i, "Kernel {0} refers to undefined {id}", kernel.id)?
            }
        }
        let local_bufs = kernel.local_mem.iter()
            .map(|LocalMemory {id, elem, size}| {
                let n = match size {
                    LocalMemSize::Static(n) => *n,
                    LocalMemSize::Dynamic(e) => self.eval_i64(host, e)?,
                };
                if n < 0 {
                    parhist_runtime_error!(kernel.i, "Local memory {id} has negative size {n}")
                } else {
                    Ok((id.clone(), *elem, n as usize))
                }
            })
            .collect::<CompileResult<Vec<(Name, ElemSize, usize)>>>()?;

        let dims = kernel.dims();
        tracing::trace!(
            kernel = %kernel.id,
            num_groups = ?&num_groups[..dims],
            group_size = ?&group_size[..dims],
            phases = phases.len(),
            "launching kernel"
        );
        self.launches.push(kernel.id.get_str().clone());

        let local_ids = grid_indices(&group_size);
        for group_id in grid_indices(&num_groups) {
            let mut mem = host.mem.clone();
            for (id, elem, n) in &local_bufs {
                mem.insert(id.clone(), Buffer::new(*elem, *n));
            }
            let mut threads = vec![captured.clone(); local_ids.len()];
            for phase in &phases {
                for (vars, local_id) in threads.iter_mut().zip(local_ids.iter()) {
                    let thread = ThreadIds {
                        local_id: *local_id, group_id, local_size: group_size, num_groups
                    };
                    let mut env = Env {vars, mem: &mut mem, thread: Some(thread)};
                    self.exec_stmts(&mut env, phase)?;
                }
            }
        }
        Ok(())
    }
}

/// A reference interpreter executing the host code of a program on a simulated device. The
/// threads of a kernel launch run sequentially, which makes the results of programs using
/// atomic operations deterministic.
pub struct Machine {
    caps: DeviceCaps,
    sizes: BTreeMap<String, i64>,
    loop_limit: i64,
    vars: BTreeMap<Name, Value>,
    mem: Memory,
    launches: Vec<String>,
}

impl Machine {
    pub fn new(caps: DeviceCaps) -> Machine {
        Machine {
            caps,
            sizes: BTreeMap::new(),
            loop_limit: DEFAULT_LOOP_LIMIT,
            vars: BTreeMap::new(),
            mem: Memory::default(),
            launches: vec![],
        }
    }

    // Sets the value of a runtime-tunable size. Sizes without an explicit value use the default
    // of the device for their class.
    pub fn with_size(mut self, id: &str, v: i64) -> Machine {
        self.sizes.insert(id.to_string(), v);
        self
    }

    pub fn with_loop_limit(self, loop_limit: i64) -> Machine {
        Machine {loop_limit, ..self}
    }

    pub fn bind_array(&mut self, id: &Name, elem: ElemSize, values: Vec<Value>) {
        self.mem.insert(id.clone(), Buffer::from_values(elem, values));
    }

    pub fn bind_scalar(&mut self, id: &Name, v: Value) {
        self.vars.insert(id.clone(), v);
    }

    pub fn read_array(&self, id: &Name) -> CompileResult<Vec<Value>> {
        self.mem.values(id, &Info::default())
    }

    // The names of the kernels launched so far, in order.
    pub fn launched_kernels(&self) -> &[String] {
        &self.launches
    }

    fn resolve_sizes(&self, program: &Program) -> BTreeMap<String, i64> {
        let mut sizes = program.sizes.iter()
            .map(|(id, class)| {
                let v = match class {
                    SizeClass::GroupSize => self.caps.default_group_size,
                    SizeClass::NumGroups => self.caps.default_num_groups,
                };
                (id.clone(), v)
            })
            .collect::<BTreeMap<String, i64>>();
        sizes.extend(self.sizes.iter().map(|(id, v)| (id.clone(), *v)));
        sizes
    }

    pub fn run(&mut self, program: &Program) -> CompileResult<()> {
        let sizes = self.resolve_sizes(program);
        tracing::debug!(sizes = ?sizes, "running program");
        let mut interp = Interp {
            caps: self.caps, sizes, loop_limit: self.loop_limit, launches: vec![]
        };
        let mut env = Env {vars: &mut self.vars, mem: &mut self.mem, thread: None};
        let r = interp.exec_stmts(&mut env, &program.body);
        self.launches.extend(interp.launches);
        r
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::ast_builder::*;
    use crate::kernel::make_kernel;
    use crate::test::*;

    fn program(body: Vec<Stmt>) -> Program {
        Program {body, sizes: BTreeMap::new()}
    }

    fn launch(kernel: Kernel) -> Stmt {
        Stmt::LaunchKernel {kernel, i: i()}
    }

    fn ints(values: &[i64], sz: ElemSize) -> Vec<Value> {
        values.iter().map(|v| Value::int(*v as i128, sz)).collect()
    }

    fn read_ints(m: &Machine, id: &Name) -> Vec<i64> {
        m.read_array(id).unwrap().iter().map(|v| v.as_i64()).collect()
    }

    #[test]
    fn host_loop_fills_array() {
        let a = Name::sym_str("a");
        let k = Name::sym_str("k");
        let body = vec![
            Stmt::Alloc {id: a.clone(), elem: ElemSize::I32, count: int64(4), i: i()},
            for_range(&k, int64(0), int64(4), vec![
                assign(access(&a, ElemSize::I32, MemSpace::Device, i64_var(&k)), mul(i64_var(&k), int64(2)))
            ]),
        ];
        let mut m = Machine::new(DeviceCaps::default());
        m.run(&program(body)).unwrap();
        assert_eq!(read_ints(&m, &a), vec![0, 2, 4, 6]);
    }

    #[test]
    fn kernel_threads_see_their_indices() {
        let out = Name::sym_str("out");
        let body = vec![assign(
            access(&out, ElemSize::I64, MemSpace::Device, global_id(Dim::X)),
            add(mul(group_id(Dim::X), int64(10)), local_id(Dim::X))
        )];
        let kernel = make_kernel(id("k"), body, vec![], vec![int64(2)], vec![int64(3)], i());
        let mut m = Machine::new(DeviceCaps::default());
        m.bind_array(&out, ElemSize::I64, ints(&[0; 6], ElemSize::I64));
        m.run(&program(vec![launch(kernel)])).unwrap();
        assert_eq!(read_ints(&m, &out), vec![0, 1, 2, 10, 11, 12]);
        assert_eq!(m.launched_kernels(), &["k".to_string()]);
    }

    #[test]
    fn barrier_separates_phases_of_local_memory() {
        // Each thread writes its index to local memory, then reads the value of its neighbor.
        let out = Name::sym_str("out");
        let l = Name::sym_str("l");
        let mem = LocalMemory {id: l.clone(), elem: ElemSize::I32, size: LocalMemSize::Static(4)};
        let neighbor = rem(add(local_id(Dim::X), int64(1)), local_size(Dim::X));
        let body = vec![
            assign(access(&l, ElemSize::I32, MemSpace::Local, local_id(Dim::X)), convert(local_id(Dim::X), ElemSize::I32)),
            barrier(BarrierScope::Local),
            assign(
                access(&out, ElemSize::I32, MemSpace::Device, global_id(Dim::X)),
                access(&l, ElemSize::I32, MemSpace::Local, neighbor)
            ),
        ];
        let kernel = make_kernel(id("k"), body, vec![mem], vec![int64(2)], vec![int64(4)], i());
        let mut m = Machine::new(DeviceCaps::default());
        m.bind_array(&out, ElemSize::I32, ints(&[0; 8], ElemSize::I32));
        m.run(&program(vec![launch(kernel)])).unwrap();
        assert_eq!(read_ints(&m, &out), vec![1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn nested_barrier_is_rejected() {
        let body = vec![if_stmt(bool_expr(true), vec![barrier(BarrierScope::Local)], vec![])];
        let kernel = make_kernel(id("k"), body, vec![], vec![int64(1)], vec![int64(1)], i());
        let mut m = Machine::new(DeviceCaps::default());
        let r = m.run(&program(vec![launch(kernel)]));
        assert_error_matches(r, "Runtime error.*barrier nested in control flow");
    }

    #[test]
    fn out_of_bounds_write_is_runtime_error() {
        let a = Name::sym_str("a");
        let body = vec![assign(access(&a, ElemSize::I32, MemSpace::Device, int64(3)), int(1, ElemSize::I32))];
        let mut m = Machine::new(DeviceCaps::default());
        m.bind_array(&a, ElemSize::I32, ints(&[0, 0], ElemSize::I32));
        assert_error_matches(m.run(&program(body)), "Runtime error.*out of bounds");
    }

    #[test]
    fn spin_loop_hits_iteration_limit() {
        let body = vec![while_loop(bool_expr(true), vec![])];
        let mut m = Machine::new(DeviceCaps::default()).with_loop_limit(100);
        assert_error_matches(m.run(&program(body)), "limit of 100 iterations");
    }

    #[test]
    fn size_parameters_default_to_device_values() {
        let n = Name::sym_str("n");
        let body = vec![definition(&n, size_param("g"))];
        let mut p = program(body);
        p.register_size("g", SizeClass::GroupSize);
        let mut m = Machine::new(DeviceCaps::default());
        m.run(&p).unwrap();
        assert_eq!(m.vars.get(&n), Some(&Value::int(256, ElemSize::I64)));

        let mut m = Machine::new(DeviceCaps::default()).with_size("g", 32);
        m.run(&p).unwrap();
        assert_eq!(m.vars.get(&n), Some(&Value::int(32, ElemSize::I64)));
    }

    #[test]
    fn size_parameter_in_kernel_is_rejected() {
        let out = Name::sym_str("out");
        let body = vec![assign(access(&out, ElemSize::I64, MemSpace::Device, int64(0)), size_param("g"))];
        let kernel = make_kernel(id("k"), body, vec![], vec![int64(1)], vec![int64(1)], i());
        let mut p = program(vec![launch(kernel)]);
        p.register_size("g", SizeClass::GroupSize);
        let mut m = Machine::new(DeviceCaps::default());
        m.bind_array(&out, ElemSize::I64, ints(&[0], ElemSize::I64));
        assert_error_matches(m.run(&p), "host-level expression in kernel code");
    }

    #[test]
    fn compare_and_swap_only_replaces_matching_value() {
        let a = Name::sym_str("a");
        let old1 = Name::sym_str("old");
        let old2 = Name::sym_str("old");
        let cas = |old: &Name, cmp: i64| Stmt::AtomicCas {
            old: old.clone(), mem: MemSpace::Device, sz: ElemSize::I32, target: a.clone(),
            idx: int64(0), cmp: int(cmp, ElemSize::U32), new: int(9, ElemSize::U32), i: i()
        };
        let body = vec![cas(&old1, 1), cas(&old2, 5)];
        let mut m = Machine::new(DeviceCaps::default());
        m.bind_array(&a, ElemSize::I32, ints(&[5], ElemSize::I32));
        m.run(&program(body)).unwrap();
        assert_eq!(read_ints(&m, &a), vec![9]);
        assert_eq!(m.vars.get(&old1), Some(&Value::int(5, ElemSize::U32)));
    }

    #[test]
    fn group_size_limit_is_enforced() {
        let kernel = make_kernel(id("k"), vec![], vec![], vec![int64(1)], vec![int64(2048)], i());
        let mut m = Machine::new(DeviceCaps::default());
        assert_error_matches(m.run(&program(vec![launch(kernel)])), "exceeding the maximum of 1024");
    }
}

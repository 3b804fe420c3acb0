pub mod ast;
pub mod atomic;
pub mod global;
pub mod local;
pub mod segred;
pub mod strategy;
pub mod usage;
pub mod work;

use ast::*;
use segred::FoldKernel;
use strategy::Strategy;
use usage::SubhistogramInfo;
use work::*;
use crate::kernel::ast::*;
use crate::kernel::ast_builder::*;
use crate::kernel::constant_fold::{as_const_int, fold_stmts};
use crate::option::CompileOptions;
use crate::utils::debug::StageLog;
use crate::utils::err::*;
use crate::utils::name::Name;

use std::collections::BTreeMap;

// The state shared by the compilation of the kernels of one histogram operation. All expressions
// refer to host variables defined in the prologue of the generated program, or are constants.
pub struct HistContext<'a> {
    pub op: &'a HistOp,
    pub opts: &'a CompileOptions,

    pub group_size: Expr,
    pub num_groups: Expr,
    pub total_threads: Expr,

    // The segment dimensions of the iteration space, their combined size, and the number of
    // elements in each segment.
    pub seg_dims: Vec<(Name, Expr)>,
    pub segments: Expr,
    pub elems: Expr,

    // The number of buckets of each operator, and the number of values stored per bucket.
    pub widths: Vec<Expr>,
    pub vec_sizes: Vec<Expr>,
}

impl<'a> HistContext<'a> {
    // Emits the kernel code processing one element of the iteration space, given the flat index
    // of its segment and its index within the segment. The per-element body runs first, after
    // which the map results are written. Then, for each operator with a bucket within range, the
    // provided function produces the code updating the bucket with the computed values, inside
    // loops over the vector indices of the operator. Out-of-range buckets are ignored.
    pub fn emit_element(
        &self,
        seg_flat: &Expr,
        elem: &Expr,
        update: impl Fn(usize, &ReductionOperator, Expr, Vec<Expr>) -> Vec<Stmt>
    ) -> Vec<Stmt> {
        let mut stmts = unflatten(seg_flat.clone(), &self.seg_dims);
        let elem_id = match self.op.space.last() {
            Some((id, _)) => id.clone(),
            None => Name::sym_str("elem")
        };
        stmts.push(definition(&elem_id, elem.clone()));
        stmts.extend(self.op.body.stmts.clone());

        let flat = add(mul(seg_flat.clone(), self.elems.clone()), i64_var(&elem_id));
        stmts.extend(self.op.body.map_results.iter().map(|MapResult {dest, value}| {
            let dst = access(&dest.id, dest.elem, MemSpace::Device, flat.clone());
            assign(dst, value.clone())
        }));

        for (idx, (op, res)) in self.op.operators.iter().zip(self.op.body.results.iter()).enumerate() {
            let bucket = Name::sym_str("bucket");
            let e = if res.bucket.get_type() == &i64_ty() {
                res.bucket.clone()
            } else {
                convert(res.bucket.clone(), ElemSize::I64)
            };
            stmts.push(definition(&bucket, e));
            let in_range = and(
                geq(i64_var(&bucket), int64(0)),
                lt(i64_var(&bucket), self.widths[idx].clone())
            );
            let body = update(idx, op, i64_var(&bucket), res.values.clone());
            stmts.push(if_stmt(in_range, vector_loops(op, body), vec![]));
        }
        stmts
    }
}

fn launch_size(
    program: &mut Program,
    fixed: Option<i64>,
    id: String,
    class: SizeClass
) -> Expr {
    match fixed {
        Some(n) => int64(n),
        None => {
            program.register_size(&id, class);
            size_param(&id)
        }
    }
}

fn compile_strategy(
    ctx: &HistContext,
    strategy: &Strategy,
    subhistograms: &[SubhistogramInfo]
) -> Vec<Stmt> {
    match strategy {
        Strategy::Skip => vec![],
        Strategy::Local {subhistograms: lh} => {
            local::compile_local(ctx, &int64(*lh), subhistograms, &FoldKernel)
        },
        Strategy::Global => global::compile_global(ctx, subhistograms, &FoldKernel)
    }
}

// Compiles a histogram operation to a program of host code launching the kernels. The strategy is
// chosen by the compiler when all quantities it depends on are known. Otherwise, the host code
// contains both strategies and selects one when it runs.
pub fn compile_histogram(op: &HistOp, opts: &CompileOptions) -> CompileResult<Program> {
    let mut log = StageLog::new(&op.name, opts);
    op.validate()?;
    log.stage("validate");
    let mut program = Program {body: vec![], sizes: BTreeMap::new()};
    let mut host = vec![];

    let g = launch_size(&mut program, opts.group_size, format!("{0}_group_size", op.name), SizeClass::GroupSize);
    let ng = launch_size(&mut program, opts.num_groups, format!("{0}_num_groups", op.name), SizeClass::NumGroups);
    let group_size = bind_i64(&mut host, "group_size", g);
    let num_groups = bind_i64(&mut host, "num_groups", ng);
    let total_threads = bind_i64(&mut host, "total_threads", mul(group_size.clone(), num_groups.clone()));

    let seg_dims = op.segments().iter()
        .map(|(id, n)| (id.clone(), bind_i64(&mut host, "segment_dim", n.clone())))
        .collect::<Vec<(Name, Expr)>>();
    let segments = bind_i64(&mut host, "segments", prod(seg_dims.iter().map(|(_, n)| n.clone()).collect()));
    let elems = match op.space.last() {
        Some((_, n)) => bind_i64(&mut host, "segment_size", n.clone()),
        None => int64(0)
    };
    let widths = op.operators.iter()
        .map(|o| bind_i64(&mut host, "width", o.width.clone()))
        .collect::<Vec<Expr>>();
    let vec_sizes = op.operators.iter()
        .map(|o| bind_i64(&mut host, "vector_size", o.vec_size()))
        .collect::<Vec<Expr>>();

    let u = usage::plan(&segments, &widths, &vec_sizes, &op.operators);
    log.stage("plan memory usage");
    let hist_bytes = bind_i64(&mut host, "hist_bytes", u.hist_bytes.clone());
    let locking = op.operators.iter().any(atomic::needs_locking);
    tracing::debug!(
        histogram = %op.name,
        hist_bytes = ?as_const_int(&hist_bytes),
        group_size = ?as_const_int(&group_size),
        locking,
        "planned histogram memory usage"
    );

    let ctx = HistContext {
        op, opts, group_size, num_groups, total_threads, seg_dims, segments, elems, widths,
        vec_sizes
    };
    // The local strategy keeps one lock per thread of a group.
    let lock_bytes = if locking {
        atomic::lock_table_bytes(ctx.group_size.clone())
    } else {
        int64(0)
    };

    let known = (as_const_int(&hist_bytes), opts.device, as_const_int(&ctx.group_size), as_const_int(&lock_bytes));
    match known {
        (Some(h), Some(dev), Some(g), Some(lock)) => {
            let s = strategy::select(h, g, dev.local_mem_per_thread, dev.max_local_memory, lock);
            tracing::debug!(histogram = %op.name, strategy = ?s, "selected strategy at compile time");
            host.extend(compile_strategy(&ctx, &s, &u.subhistograms));
        },
        (Some(0), _, _, _) => {
            tracing::debug!(histogram = %op.name, "skipping histogram without buckets");
        },
        _ => {
            tracing::debug!(histogram = %op.name, "deferring strategy selection to run time");
            let mut branch = vec![];
            let (t, lmax) = match opts.device {
                Some(dev) => (int64(dev.local_mem_per_thread), int64(dev.max_local_memory)),
                None => (
                    device_query(DeviceCap::LocalMemPerThread),
                    device_query(DeviceCap::MaxLocalMemory)
                )
            };
            let t = bind_i64(&mut branch, "thread_bytes", t);
            let lmax = bind_i64(&mut branch, "max_local_memory", lmax);
            let use_local = strategy::select_expr(
                hist_bytes.clone(), ctx.group_size.clone(), t.clone(), lmax, lock_bytes
            );
            let lh = strategy::local_subhistograms_expr(ctx.group_size.clone(), t, hist_bytes.clone());
            let local = local::compile_local(&ctx, &lh, &u.subhistograms, &FoldKernel);
            let global = global::compile_global(&ctx, &u.subhistograms, &FoldKernel);
            branch.push(if_stmt(use_local, local, global));
            host.push(if_stmt(neq(hist_bytes, int64(0)), branch, vec![]));
        }
    };

    program.body = fold_stmts(host);
    log.stage_with("host program", &program);
    tracing::debug!(
        histogram = %op.name, kernels = program.kernels().len(),
        elapsed_us = log.total().as_micros() as u64, "compiled histogram"
    );
    Ok(program)
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::interp::Machine;
    use crate::interp::value::Value;
    use crate::option::DeviceCaps;
    use crate::utils::info::Info;

    use proptest::prelude::{prop_assert_eq, proptest, ProptestConfig};

    pub fn operator(
        sz: ElemSize,
        params: Vec<(Name, ElemSize)>,
        body: Vec<Stmt>,
        results: Vec<Expr>
    ) -> ReductionOperator {
        let k = results.len();
        let dests = (0..k)
            .map(|idx| Dest {id: id(&format!("hist{idx}")), elem: sz})
            .collect::<Vec<Dest>>();
        let neutral = (0..k)
            .map(|_| if sz.is_floating_point() { float(0.0, sz) } else { int(0, sz) })
            .collect();
        ReductionOperator {
            width: int64(1),
            shape: vec![],
            vec_indices: vec![],
            lambda: Lambda {
                params,
                body,
                results
            },
            neutral,
            dests
        }
    }

    pub fn add_operator(sz: ElemSize, width: i64) -> ReductionOperator {
        let x = Name::sym_str("x");
        let y = Name::sym_str("y");
        let result = add(var(&x, scalar(sz)), var(&y, scalar(sz)));
        let mut op = operator(sz, vec![(x, sz), (y, sz)], vec![], vec![result]);
        op.width = int64(width);
        op.dests = vec![Dest {id: id("hist"), elem: sz}];
        op
    }

    // A histogram counting the occurrences of each bucket index of the 32-bit integer input
    // array 'inp', of length n, in the destination array 'hist'.
    pub fn counting_hist(n: i64, width: i64) -> HistOp {
        let idx = Name::sym_str("i");
        let bucket = convert(access(&id("inp"), ElemSize::I32, MemSpace::Device, i64_var(&idx)), ElemSize::I64);
        HistOp {
            name: "hist".to_string(),
            space: vec![(idx, int64(n))],
            operators: vec![add_operator(ElemSize::I32, width)],
            body: HistBody {
                stmts: vec![],
                results: vec![HistResult {bucket, values: vec![int(1, ElemSize::I32)]}],
                map_results: vec![]
            },
            i: Info::new("hist")
        }
    }

    // A counting histogram over segments of the given number of elements, where each segment of
    // 'inp' is counted into its own row of 'hist'.
    pub fn segmented_counting_hist(segments: i64, elems: i64, width: i64) -> HistOp {
        let s = Name::sym_str("s");
        let x = Name::sym_str("x");
        let idx = add(mul(i64_var(&s), int64(elems)), i64_var(&x));
        let bucket = convert(access(&id("inp"), ElemSize::I32, MemSpace::Device, idx), ElemSize::I64);
        let mut h = counting_hist(segments * elems, width);
        h.space = vec![(s, int64(segments)), (x, int64(elems))];
        h.body.results[0].bucket = bucket;
        h
    }

    pub fn device_opts(group_size: i64, num_groups: i64) -> CompileOptions {
        CompileOptions {
            group_size: Some(group_size),
            num_groups: Some(num_groups),
            device: Some(DeviceCaps::default()),
            ..CompileOptions::default()
        }
    }

    fn kernel_names(p: &Program) -> Vec<String> {
        p.kernels().iter().map(|k| k.id.get_str().to_string()).collect()
    }

    #[test]
    fn compile_time_local_strategy() {
        let p = compile_histogram(&counting_hist(10, 4), &device_opts(4, 2)).unwrap();
        assert_eq!(kernel_names(&p), vec!["hist_local".to_string(), "hist_fold".to_string()]);
        assert!(p.sizes.is_empty());
    }

    #[test]
    fn compile_time_global_strategy() {
        let mut opts = device_opts(4, 2);
        if let Some(dev) = opts.device.as_mut() {
            dev.max_local_memory = 0;
        }
        let p = compile_histogram(&counting_hist(10, 4), &opts).unwrap();
        assert_eq!(kernel_names(&p), vec!["hist_global".to_string(), "hist_fold".to_string()]);
    }

    #[test]
    fn zero_width_histogram_is_empty() {
        let p = compile_histogram(&counting_hist(10, 0), &CompileOptions::default()).unwrap();
        assert!(p.body.iter().all(|s| !matches!(s, Stmt::If {..} | Stmt::LaunchKernel {..})));
        assert!(p.kernels().is_empty());
    }

    #[test]
    fn runtime_selection_contains_both_strategies() {
        let p = compile_histogram(&counting_hist(10, 4), &CompileOptions::default()).unwrap();
        let names = kernel_names(&p);
        assert!(names.contains(&"hist_local".to_string()));
        assert!(names.contains(&"hist_global".to_string()));
        assert_eq!(p.sizes.get("hist_group_size"), Some(&SizeClass::GroupSize));
        assert_eq!(p.sizes.get("hist_num_groups"), Some(&SizeClass::NumGroups));
    }

    #[test]
    fn invalid_histogram_is_rejected() {
        let mut h = counting_hist(10, 4);
        h.operators[0].neutral.clear();
        let r = compile_histogram(&h, &CompileOptions::default());
        assert!(r.unwrap_err().is_internal());
    }

    // Executing the compiled programs with the reference interpreter.

    fn ints(values: &[i64], sz: ElemSize) -> Vec<Value> {
        values.iter().map(|v| Value::int(*v as i128, sz)).collect()
    }

    fn as_ints(values: Vec<Value>) -> Vec<i64> {
        values.iter().map(|v| v.as_i64()).collect()
    }

    fn global_opts(group_size: i64, num_groups: i64) -> CompileOptions {
        let mut opts = device_opts(group_size, num_groups);
        if let Some(dev) = opts.device.as_mut() {
            dev.max_local_memory = 0;
        }
        opts
    }

    fn run(
        h: &HistOp,
        opts: &CompileOptions,
        machine: Machine,
        inp: &[i64],
        dest: Vec<Value>
    ) -> Vec<Value> {
        let p = compile_histogram(h, opts).unwrap();
        let mut m = machine;
        m.bind_array(&id("inp"), ElemSize::I32, ints(inp, ElemSize::I32));
        m.bind_array(&id("hist"), dest[0].elem_size(), dest);
        m.run(&p).unwrap();
        m.read_array(&id("hist")).unwrap()
    }

    fn run_counting(h: &HistOp, opts: &CompileOptions, inp: &[i64], prior: &[i64]) -> Vec<i64> {
        let m = Machine::new(DeviceCaps::default());
        as_ints(run(h, opts, m, inp, ints(prior, ElemSize::I32)))
    }

    const BUCKETS: [i64; 9] = [0, 1, 2, 3, 0, 1, 2, 3, 0];

    fn bucket_hist() -> HistOp {
        counting_hist(BUCKETS.len() as i64, 4)
    }

    #[test]
    fn counts_with_local_strategy() {
        let h = bucket_hist();
        assert_eq!(run_counting(&h, &device_opts(4, 2), &BUCKETS, &[0; 4]), vec![3, 2, 2, 2]);
    }

    #[test]
    fn counts_with_global_strategy() {
        let h = bucket_hist();
        assert_eq!(run_counting(&h, &global_opts(4, 2), &BUCKETS, &[0; 4]), vec![3, 2, 2, 2]);
    }

    #[test]
    fn counts_with_runtime_selected_strategy() {
        let h = bucket_hist();
        let opts = CompileOptions::default();
        let sized = |caps| {
            Machine::new(caps).with_size("hist_group_size", 8).with_size("hist_num_groups", 3)
        };

        let m = sized(DeviceCaps::default());
        let r = run(&h, &opts, m, &BUCKETS, ints(&[0; 4], ElemSize::I32));
        assert_eq!(as_ints(r), vec![3, 2, 2, 2]);

        let caps = DeviceCaps {max_local_memory: 0, ..DeviceCaps::default()};
        let mut m = sized(caps);
        let p = compile_histogram(&h, &opts).unwrap();
        m.bind_array(&id("inp"), ElemSize::I32, ints(&BUCKETS, ElemSize::I32));
        m.bind_array(&id("hist"), ElemSize::I32, ints(&[0; 4], ElemSize::I32));
        m.run(&p).unwrap();
        assert_eq!(as_ints(m.read_array(&id("hist")).unwrap()), vec![3, 2, 2, 2]);
        assert!(m.launched_kernels().contains(&"hist_global".to_string()));
        assert!(!m.launched_kernels().contains(&"hist_local".to_string()));
    }

    #[test]
    fn accumulates_onto_prior_contents() {
        let h = bucket_hist();
        let prior = [10, 0, 5, 1];
        let expected = vec![13, 2, 7, 3];
        assert_eq!(run_counting(&h, &device_opts(4, 2), &BUCKETS, &prior), expected);
        assert_eq!(run_counting(&h, &global_opts(4, 2), &BUCKETS, &prior), expected);
    }

    #[test]
    fn single_subhistogram_aliases_destination() {
        // With as many threads as buckets, the global strategy uses one subhistogram, which is
        // the destination itself, and no fold kernel is launched.
        let h = bucket_hist();
        let prior = [1, 2, 3, 4];
        let p = compile_histogram(&h, &global_opts(2, 2)).unwrap();
        let mut m = Machine::new(DeviceCaps::default());
        m.bind_array(&id("inp"), ElemSize::I32, ints(&BUCKETS, ElemSize::I32));
        m.bind_array(&id("hist"), ElemSize::I32, ints(&prior, ElemSize::I32));
        m.run(&p).unwrap();
        assert_eq!(m.launched_kernels(), &["hist_global".to_string()]);
        let aliased = as_ints(m.read_array(&id("hist")).unwrap());

        let multi = run_counting(&h, &global_opts(8, 4), &BUCKETS, &prior);
        assert_eq!(aliased, multi);
        assert_eq!(aliased, vec![4, 4, 5, 6]);

        let local = run_counting(&h, &device_opts(4, 1), &BUCKETS, &prior);
        assert_eq!(local, multi);
    }

    #[test]
    fn locked_updates_count_exactly() {
        // 16-bit integers have no native atomic update, so each update takes a lock. All threads
        // update the same bucket.
        let n = 200;
        let mut h = counting_hist(n, 1);
        h.operators = vec![add_operator(ElemSize::I16, 1)];
        h.body.results[0].values = vec![int(1, ElemSize::I16)];
        assert!(atomic::needs_locking(&h.operators[0]));
        let inp = vec![0; n as usize];
        for opts in [device_opts(32, 4), global_opts(32, 4)] {
            let m = Machine::new(DeviceCaps::default());
            let r = run(&h, &opts, m, &inp, ints(&[0], ElemSize::I16));
            assert_eq!(as_ints(r), vec![n]);
        }
    }

    #[test]
    fn float_updates_use_compare_and_swap() {
        let mut h = bucket_hist();
        h.operators = vec![add_operator(ElemSize::F32, 4)];
        h.body.results[0].values = vec![float(0.5, ElemSize::F32)];
        let prior = vec![Value::float(0.25, ElemSize::F32); 4];
        for opts in [device_opts(4, 2), global_opts(4, 2)] {
            let m = Machine::new(DeviceCaps::default());
            let r = run(&h, &opts, m, &BUCKETS, prior.clone());
            let r = r.iter().map(|v| v.as_f64()).collect::<Vec<f64>>();
            assert_eq!(r, vec![1.75, 1.25, 1.25, 1.25]);
        }
    }

    #[test]
    fn segments_are_independent_histograms() {
        let h = segmented_counting_hist(2, 5, 3);
        let inp = [0, 1, 2, 2, 0, 1, 1, 1, 2, 9];
        let expected = vec![2, 1, 2, 0, 3, 1];
        assert_eq!(run_counting(&h, &device_opts(4, 3), &inp, &[0; 6]), expected);
        assert_eq!(run_counting(&h, &global_opts(4, 3), &inp, &[0; 6]), expected);
    }

    #[test]
    fn local_kernel_places_segments_on_first_axis() {
        let (segments, elems, width) = (7, 3, 2);
        let h = segmented_counting_hist(segments, elems, width);
        let inp = (0..segments * elems).map(|v| (v * v) % 3).collect::<Vec<i64>>();
        let mut expected = vec![0; (segments * width) as usize];
        for (idx, b) in inp.iter().enumerate() {
            if *b < width {
                let seg = idx as i64 / elems;
                expected[(seg * width + b) as usize] += 1;
            }
        }
        // One group per segment, and three groups cooperating on each segment.
        for num_groups in [2, 20] {
            let p = compile_histogram(&h, &device_opts(2, num_groups)).unwrap();
            let local = p.kernels().into_iter().find(|k| k.id.get_str() == "hist_local").unwrap();
            assert_eq!(local.dims(), 1);
            let prior = vec![0; expected.len()];
            assert_eq!(run_counting(&h, &device_opts(2, num_groups), &inp, &prior), expected);
        }
    }

    #[test]
    fn lock_table_counts_against_local_memory() {
        // H = 2 and LH = ceil(4 * 48 / 2) = 96, so the subhistograms take 192 bytes and the four
        // locks another 16.
        let mut h = bucket_hist();
        h.operators = vec![add_operator(ElemSize::I16, 1)];
        h.body.results[0].values = vec![int(1, ElemSize::I16)];
        let with_limit = |max_local_memory| {
            let mut opts = device_opts(4, 2);
            if let Some(dev) = opts.device.as_mut() {
                dev.max_local_memory = max_local_memory;
            }
            kernel_names(&compile_histogram(&h, &opts).unwrap())
        };
        assert_eq!(with_limit(208)[0], "hist_local");
        assert_eq!(with_limit(207)[0], "hist_global");
    }

    // Runs a histogram with zero-initialized destinations, checking that the kernel of the
    // expected strategy is launched.
    fn run_zeroed(
        h: &HistOp,
        opts: &CompileOptions,
        kernel: &str,
        inp: &[i64],
        dests: &[(&str, ElemSize, usize)]
    ) -> Vec<Vec<i64>> {
        let p = compile_histogram(h, opts).unwrap();
        let mut m = Machine::new(DeviceCaps::default());
        m.bind_array(&id("inp"), ElemSize::I32, ints(inp, ElemSize::I32));
        for (dst, sz, n) in dests {
            m.bind_array(&id(dst), *sz, ints(&vec![0; *n], *sz));
        }
        m.run(&p).unwrap();
        assert!(m.launched_kernels().contains(&kernel.to_string()));
        dests.iter()
            .map(|(dst, _, _)| as_ints(m.read_array(&id(dst)).unwrap()))
            .collect()
    }

    // Launch configurations covering both strategies, with several subhistograms and with a
    // single subhistogram aliasing the destination.
    fn launch_configs() -> Vec<(CompileOptions, &'static str)> {
        vec![
            (device_opts(4, 2), "hist_local"),
            (device_opts(4, 1), "hist_local"),
            (global_opts(4, 2), "hist_global"),
            (global_opts(1, 3), "hist_global"),
        ]
    }

    const SMALL_BUCKETS: [i64; 6] = [0, 1, 1, 2, 2, 2];

    #[test]
    fn vector_shaped_buckets() {
        // Each bucket holds two values, where the v:th value is incremented by v + 1.
        let v = Name::sym_str("v");
        let mut h = counting_hist(SMALL_BUCKETS.len() as i64, 3);
        h.operators[0].shape = vec![int64(2)];
        h.operators[0].vec_indices = vec![v.clone()];
        h.body.results[0].values = vec![convert(add(i64_var(&v), int64(1)), ElemSize::I32)];
        for (opts, kernel) in launch_configs() {
            let r = run_zeroed(&h, &opts, kernel, &SMALL_BUCKETS, &[("hist", ElemSize::I32, 6)]);
            assert_eq!(r, vec![vec![1, 2, 2, 4, 3, 6]]);
        }
    }

    #[test]
    fn locked_and_primitive_operators_together() {
        let mut h = counting_hist(SMALL_BUCKETS.len() as i64, 3);
        let mut locked = add_operator(ElemSize::I16, 3);
        locked.dests = vec![Dest {id: id("hist16"), elem: ElemSize::I16}];
        let bucket = h.body.results[0].bucket.clone();
        h.operators = vec![locked, add_operator(ElemSize::I32, 3)];
        h.body.results = vec![
            HistResult {bucket: bucket.clone(), values: vec![int(1, ElemSize::I16)]},
            HistResult {bucket, values: vec![int(2, ElemSize::I32)]},
        ];
        assert!(atomic::needs_locking(&h.operators[0]));
        assert!(!atomic::needs_locking(&h.operators[1]));
        let dests = [("hist16", ElemSize::I16, 3), ("hist", ElemSize::I32, 3)];
        for (opts, kernel) in launch_configs() {
            let r = run_zeroed(&h, &opts, kernel, &SMALL_BUCKETS, &dests);
            assert_eq!(r, vec![vec![1, 2, 3], vec![2, 4, 6]]);
        }
    }

    #[test]
    fn multi_destination_operator_is_locked() {
        // Computes the number of elements and the sum of their bucket indices plus ten per bucket.
        let [c0, s0, c1, s1] = ["c0", "s0", "c1", "s1"].map(Name::sym_str);
        let sz = ElemSize::I32;
        let params = vec![(c0.clone(), sz), (s0.clone(), sz), (c1.clone(), sz), (s1.clone(), sz)];
        let results = vec![
            add(var(&c0, scalar(sz)), var(&c1, scalar(sz))),
            add(var(&s0, scalar(sz)), var(&s1, scalar(sz))),
        ];
        let mut pair = operator(sz, params, vec![], results);
        pair.width = int64(3);
        let mut h = counting_hist(SMALL_BUCKETS.len() as i64, 3);
        let x = h.space[0].0.clone();
        let value = add(access(&id("inp"), sz, MemSpace::Device, i64_var(&x)), int(10, sz));
        h.operators = vec![pair];
        h.body.results[0].values = vec![int(1, sz), value];
        assert!(atomic::needs_locking(&h.operators[0]));
        let dests = [("hist0", sz, 3), ("hist1", sz, 3)];
        for (opts, kernel) in launch_configs() {
            let r = run_zeroed(&h, &opts, kernel, &SMALL_BUCKETS, &dests);
            assert_eq!(r, vec![vec![1, 2, 3], vec![10, 22, 36]]);
        }
    }

    #[test]
    fn map_results_are_written_per_element() {
        let mut h = bucket_hist();
        let x = h.space[0].0.clone();
        let value = mul(access(&id("inp"), ElemSize::I32, MemSpace::Device, i64_var(&x)), int(2, ElemSize::I32));
        h.body.map_results = vec![MapResult {dest: Dest {id: id("out"), elem: ElemSize::I32}, value}];
        let p = compile_histogram(&h, &global_opts(4, 2)).unwrap();
        let mut m = Machine::new(DeviceCaps::default());
        m.bind_array(&id("inp"), ElemSize::I32, ints(&BUCKETS, ElemSize::I32));
        m.bind_array(&id("hist"), ElemSize::I32, ints(&[0; 4], ElemSize::I32));
        m.bind_array(&id("out"), ElemSize::I32, ints(&[0; 9], ElemSize::I32));
        m.run(&p).unwrap();
        assert_eq!(as_ints(m.read_array(&id("out")).unwrap()), vec![0, 2, 4, 6, 0, 2, 4, 6, 0]);
        assert_eq!(as_ints(m.read_array(&id("hist")).unwrap()), vec![3, 2, 2, 2]);
    }

    fn expected_counts(buckets: &[i64], prior: &[i64]) -> Vec<i64> {
        let mut r = prior.to_vec();
        for b in buckets {
            if *b >= 0 && (*b as usize) < r.len() {
                r[*b as usize] += 1;
            }
        }
        r
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn out_of_range_buckets_are_ignored(
            buckets in proptest::collection::vec(-3i64..8, 1..40),
            prior in proptest::collection::vec(0i64..5, 4),
        ) {
            let h = counting_hist(buckets.len() as i64, 4);
            let expected = expected_counts(&buckets, &prior);
            prop_assert_eq!(run_counting(&h, &device_opts(4, 2), &buckets, &prior), expected.clone());
            prop_assert_eq!(run_counting(&h, &global_opts(4, 2), &buckets, &prior), expected);
        }

        #[test]
        fn result_is_independent_of_launch_size(
            buckets in proptest::collection::vec(0i64..6, 1..40),
            group_size in 1i64..9,
            num_groups in 1i64..5,
        ) {
            let h = counting_hist(buckets.len() as i64, 6);
            let prior = [0; 6];
            let expected = expected_counts(&buckets, &prior);
            let local = run_counting(&h, &device_opts(group_size, num_groups), &buckets, &prior);
            let global = run_counting(&h, &global_opts(group_size, num_groups), &buckets, &prior);
            prop_assert_eq!(local, expected.clone());
            prop_assert_eq!(global, expected);
        }
    }
}

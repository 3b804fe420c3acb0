use super::HistContext;
use super::atomic::*;
use super::segred::SegmentedReduction;
use super::usage::SubhistogramInfo;
use super::work::*;
use crate::kernel::ast::*;
use crate::kernel::ast_builder::*;
use crate::kernel::make_kernel;
use crate::utils::name::Name;

// Compiles a histogram where each operator accumulates into subhistograms stored in global
// memory. Contiguous ranges of threads share a subhistogram, and the number of subhistograms is
// chosen based on how many threads there are per bucket. Returns the host code allocating the
// subhistograms, launching the kernel, and folding the subhistograms into the destinations.
pub fn compile_global(
    ctx: &HistContext,
    subhistograms: &[SubhistogramInfo],
    segred: &impl SegmentedReduction
) -> Vec<Stmt> {
    let mut host = vec![];
    let (locking, updates) = synthesize_all(&ctx.op.operators, || {
        Locking::new(int64(ctx.opts.lock_table_size), MemSpace::Device)
    });

    // The number of subhistograms of each operator, and the number of threads sharing each.
    let counts = ctx.widths.iter()
        .map(|w| {
            let buckets = max(int64(1), mul(w.clone(), ctx.segments.clone()));
            bind_i64(&mut host, "num_subhistos", ceil_div(ctx.total_threads.clone(), buckets))
        })
        .collect::<Vec<Expr>>();
    let per_sub = counts.iter()
        .map(|c| bind_i64(&mut host, "threads_per_subhisto", ceil_div(ctx.total_threads.clone(), c.clone())))
        .collect::<Vec<Expr>>();
    for (info, count) in subhistograms.iter().zip(counts.iter()) {
        host.extend(info.emit_alloc(count));
    }
    if let Some(l) = &locking {
        host.push(Stmt::Alloc {id: l.locks.clone(), elem: ElemSize::I32, count: l.count.clone(), i: i()});
        host.push(Stmt::Fill {
            id: l.locks.clone(), offset: int64(0), count: l.count.clone(),
            value: int(UNLOCKED, ElemSize::I32), i: i()
        });
    }
    let total_elems = mul(ctx.segments.clone(), ctx.elems.clone());
    let chunk = bind_i64(&mut host, "chunk", ceil_div(total_elems.clone(), ctx.total_threads.clone()));

    let gtid = Name::sym_str("gtid");
    let k = Name::sym_str("k");
    let flat = Name::sym_str("flat");
    let seg_flat = Name::sym_str("seg_flat");
    let sub_ids = counts.iter().map(|_| Name::sym_str("subhisto_id")).collect::<Vec<Name>>();

    let element = ctx.emit_element(&i64_var(&seg_flat), &rem(i64_var(&flat), ctx.elems.clone()), |idx, op, bucket, values| {
        let addr = flatten(vec![
            (i64_var(&seg_flat), int64(1)),
            (i64_var(&sub_ids[idx]), counts[idx].clone()),
            (bucket, ctx.widths[idx].clone()),
            (vector_index(op), ctx.vec_sizes[idx].clone()),
        ]);
        vec![emit_update(&updates[idx], &MemSpace::Device, op, &subhistograms[idx].subs, addr, values)]
    });
    let mut in_range = vec![definition(&seg_flat, div(i64_var(&flat), ctx.elems.clone()))];
    in_range.extend(element);
    let mut body = vec![definition(&gtid, global_id(Dim::X))];
    body.extend(sub_ids.iter()
        .zip(per_sub.iter())
        .map(|(id, n)| definition(id, div(i64_var(&gtid), n.clone()))));
    body.push(for_range(&k, int64(0), chunk.clone(), vec![
        definition(&flat, add(mul(i64_var(&gtid), chunk.clone()), i64_var(&k))),
        if_stmt(lt(i64_var(&flat), total_elems), in_range, vec![]),
    ]));
    let kernel = make_kernel(
        Name::sym_str(&format!("{0}_global", ctx.op.name)),
        body,
        vec![],
        vec![ctx.num_groups.clone()],
        vec![ctx.group_size.clone()],
        ctx.op.i.clone().with_label("global memory histogram")
    );
    host.push(Stmt::LaunchKernel {kernel, i: i()});

    for ((op, info), count) in ctx.op.operators.iter().zip(subhistograms.iter()).zip(counts.iter()) {
        host.extend(segred.fold(ctx, op, info, count));
        host.extend(info.emit_free(count));
    }
    if let Some(l) = locking {
        host.push(Stmt::Free {id: l.locks, i: i()});
    }
    host
}

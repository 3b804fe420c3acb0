use super::HistContext;
use super::atomic::*;
use super::segred::SegmentedReduction;
use super::usage::SubhistogramInfo;
use super::work::*;
use crate::kernel::ast::*;
use crate::kernel::ast_builder::*;
use crate::kernel::constant_fold::as_const_int;
use crate::kernel::make_kernel;
use crate::utils::name::Name;

fn local_mem_size(e: Expr) -> LocalMemSize {
    match as_const_int(&e) {
        Some(n) => LocalMemSize::Static(n),
        None => LocalMemSize::Dynamic(e)
    }
}

// A loop over the elements of a histogram of the given size in chunks of one element per thread
// of the group. The last chunk is guarded, as the size may not be divisible by the group size.
fn chunked(ltid: &Name, size: Expr, body: impl Fn(&Name) -> Vec<Stmt>) -> Stmt {
    let c = Name::sym_str("c");
    let j = Name::sym_str("j");
    let idx = add(mul(i64_var(&c), local_size(Dim::X)), i64_var(ltid));
    for_range(&c, int64(0), ceil_div(size.clone(), local_size(Dim::X)), vec![
        definition(&j, idx),
        if_stmt(lt(i64_var(&j), size), body(&j), vec![]),
    ])
}

// Compiles a histogram where each group accumulates into a number of subhistograms kept in local
// memory. The local subhistograms are compacted into one, which is published as the subhistogram
// of the group in global memory. The kernel uses a one-dimensional launch of
// groups_per_segment * segments groups, where consecutive groups cooperate on the same segment.
// Keeping the segments on the first axis avoids the limit on the secondary grid dimensions of CUDA.
pub fn compile_local(
    ctx: &HistContext,
    local_subhistos: &Expr,
    subhistograms: &[SubhistogramInfo],
    segred: &impl SegmentedReduction
) -> Vec<Stmt> {
    let mut host = vec![];
    let (locking, updates) = synthesize_all(&ctx.op.operators, || {
        Locking::new(local_size(Dim::X), MemSpace::Local)
    });
    let lh = bind_i64(&mut host, "local_subhistos", local_subhistos.clone());
    let groups_per_segment = bind_i64(
        &mut host, "groups_per_segment",
        max(int64(1), ceil_div(ctx.num_groups.clone(), ctx.segments.clone()))
    );
    for info in subhistograms {
        host.extend(info.emit_alloc(&groups_per_segment));
    }

    // Local memory of each operator, one block per destination.
    let local_subs = subhistograms.iter()
        .map(|info| {
            info.dests.iter()
                .map(|d| Name::sym_str(&format!("{0}_local", d.id)))
                .collect::<Vec<Name>>()
        })
        .collect::<Vec<Vec<Name>>>();
    let mut local_mem = subhistograms.iter()
        .zip(local_subs.iter())
        .flat_map(|(info, ids)| {
            let size = mul(lh.clone(), info.hist_size.clone());
            info.dests.iter().zip(ids.iter())
                .map(move |(d, id)| LocalMemory {
                    id: id.clone(), elem: d.elem, size: local_mem_size(size.clone())
                })
        })
        .collect::<Vec<LocalMemory>>();
    if let Some(l) = &locking {
        local_mem.push(LocalMemory {
            id: l.locks.clone(),
            elem: ElemSize::I32,
            size: local_mem_size(ctx.group_size.clone())
        });
    }

    let ltid = Name::sym_str("ltid");
    let gid = Name::sym_str("gid");
    let seg_flat = Name::sym_str("seg_flat");
    let slot = Name::sym_str("slot");
    let mut body = vec![
        definition(&ltid, local_id(Dim::X)),
        definition(&gid, rem(group_id(Dim::X), groups_per_segment.clone())),
        definition(&seg_flat, div(group_id(Dim::X), groups_per_segment.clone())),
        definition(&slot, rem(i64_var(&ltid), lh.clone())),
    ];
    let published = |info: &SubhistogramInfo, j: &Name| {
        flatten(vec![
            (i64_var(&seg_flat), int64(1)),
            (i64_var(&gid), groups_per_segment.clone()),
            (i64_var(j), info.hist_size.clone()),
        ])
    };

    // Initialize the local subhistograms: the first from the published subhistogram of the group
    // and the rest with the neutral element.
    for (info, ids) in subhistograms.iter().zip(local_subs.iter()) {
        let size = mul(lh.clone(), info.hist_size.clone());
        body.push(chunked(&ltid, size, |j| {
            let copy = ids.iter().enumerate()
                .map(|(idx, id)| {
                    let dst = access(id, info.dests[idx].elem, MemSpace::Local, i64_var(j));
                    assign(dst, info.sub_access(idx, published(info, j)))
                })
                .collect();
            let fill = ids.iter().enumerate()
                .map(|(idx, id)| {
                    let dst = access(id, info.dests[idx].elem, MemSpace::Local, i64_var(j));
                    assign(dst, info.neutral[idx].clone())
                })
                .collect();
            vec![if_stmt(lt(i64_var(j), info.hist_size.clone()), copy, fill)]
        }));
    }
    if let Some(l) = &locking {
        body.push(chunked(&ltid, local_size(Dim::X), |j| vec![
            assign(access(&l.locks, ElemSize::I32, MemSpace::Local, i64_var(j)), int(UNLOCKED, ElemSize::I32))
        ]));
    }
    body.push(barrier(BarrierScope::Local));

    // Accumulate the elements of the segment assigned to this thread.
    let seg_threads = mul(groups_per_segment.clone(), local_size(Dim::X));
    let stid = Name::sym_str("stid");
    let k = Name::sym_str("k");
    let e = Name::sym_str("e");
    let chunk = Name::sym_str("chunk");
    let element = ctx.emit_element(&i64_var(&seg_flat), &i64_var(&e), |idx, op, bucket, values| {
        let addr = flatten(vec![
            (i64_var(&slot), int64(1)),
            (bucket, ctx.widths[idx].clone()),
            (vector_index(op), ctx.vec_sizes[idx].clone()),
        ]);
        vec![emit_update(&updates[idx], &MemSpace::Local, op, &local_subs[idx], addr, values)]
    });
    body.push(definition(&stid, add(mul(i64_var(&gid), local_size(Dim::X)), i64_var(&ltid))));
    body.push(definition(&chunk, ceil_div(ctx.elems.clone(), seg_threads)));
    body.push(for_range(&k, int64(0), i64_var(&chunk), vec![
        definition(&e, add(mul(i64_var(&stid), i64_var(&chunk)), i64_var(&k))),
        if_stmt(lt(i64_var(&e), ctx.elems.clone()), element, vec![]),
    ]));
    body.push(barrier(BarrierScope::Local));

    // Compact the local subhistograms into the first one.
    for ((op, info), ids) in ctx.op.operators.iter().zip(subhistograms.iter()).zip(local_subs.iter()) {
        body.push(chunked(&ltid, info.hist_size.clone(), |j| {
            let s = Name::sym_str("s");
            let accs = ids.iter().map(|id| Name::sym_str(&format!("{id}_acc"))).collect::<Vec<Name>>();
            let elems = info.dests.iter().map(|d| d.elem).collect::<Vec<ElemSize>>();
            let mut stmts = accs.iter()
                .zip(ids.iter().zip(elems.iter()))
                .map(|(acc, (id, sz))| definition(acc, access(id, *sz, MemSpace::Local, i64_var(j))))
                .collect::<Vec<Stmt>>();
            let other = add(mul(i64_var(&s), info.hist_size.clone()), i64_var(j));
            let args = accs.iter().zip(elems.iter())
                .map(|(acc, sz)| var(acc, scalar(*sz)))
                .chain(ids.iter().zip(elems.iter()).map(|(id, sz)| {
                    access(id, *sz, MemSpace::Local, other.clone())
                }))
                .collect::<Vec<Expr>>();
            stmts.push(for_range(&s, int64(1), lh.clone(), vec![
                apply_lambda(&op.lambda, args, &accs)
            ]));
            stmts.extend(accs.iter()
                .zip(ids.iter().zip(elems.iter()))
                .map(|(acc, (id, sz))| {
                    assign(access(id, *sz, MemSpace::Local, i64_var(j)), var(acc, scalar(*sz)))
                }));
            stmts
        }));
    }
    body.push(barrier(BarrierScope::Global));

    // Publish the compacted subhistogram of the group to global memory.
    for (info, ids) in subhistograms.iter().zip(local_subs.iter()) {
        body.push(chunked(&ltid, info.hist_size.clone(), |j| {
            ids.iter().enumerate()
                .map(|(idx, id)| {
                    let src = access(id, info.dests[idx].elem, MemSpace::Local, i64_var(j));
                    assign(info.sub_access(idx, published(info, j)), src)
                })
                .collect()
        }));
    }

    let kernel = make_kernel(
        Name::sym_str(&format!("{0}_local", ctx.op.name)),
        body,
        local_mem,
        vec![mul(groups_per_segment.clone(), ctx.segments.clone())],
        vec![ctx.group_size.clone()],
        ctx.op.i.clone().with_label("local memory histogram")
    );
    host.push(Stmt::LaunchKernel {kernel, i: i()});

    for (op, info) in ctx.op.operators.iter().zip(subhistograms.iter()) {
        host.extend(segred.fold(ctx, op, info, &groups_per_segment));
        host.extend(info.emit_free(&groups_per_segment));
    }
    host
}

use super::HistContext;
use super::ast::*;
use super::usage::SubhistogramInfo;
use super::work::apply_lambda;
use crate::kernel::ast::*;
use crate::kernel::ast_builder::*;
use crate::kernel::make_kernel;
use crate::utils::name::Name;

// Folds the subhistograms of an operator into its destination arrays. The subhistogram dimension
// of the arrays is reduced away, independently for each segment and each element of the
// histogram, using the combining function of the operator.
pub trait SegmentedReduction {
    fn fold(
        &self,
        ctx: &HistContext,
        op: &ReductionOperator,
        info: &SubhistogramInfo,
        count: &Expr
    ) -> Vec<Stmt>;
}

// Folds using one thread per element of each segment, sequentially combining the values of that
// element across all subhistograms. The fold is skipped when there is only one subhistogram,
// since it then aliases the destination.
pub struct FoldKernel;

impl SegmentedReduction for FoldKernel {
    fn fold(
        &self,
        ctx: &HistContext,
        op: &ReductionOperator,
        info: &SubhistogramInfo,
        count: &Expr
    ) -> Vec<Stmt> {
        let gtid = Name::sym_str("gtid");
        let seg = Name::sym_str("seg");
        let j = Name::sym_str("j");
        let s = Name::sym_str("s");
        let accs = info.dests.iter()
            .map(|d| Name::sym_str(&format!("{0}_acc", d.id)))
            .collect::<Vec<Name>>();
        let hist_size = info.hist_size.clone();
        let sub_idx = |k: Expr| {
            add(mul(add(mul(i64_var(&seg), count.clone()), k), hist_size.clone()), i64_var(&j))
        };

        let mut body = vec![
            definition(&seg, div(i64_var(&gtid), hist_size.clone())),
            definition(&j, rem(i64_var(&gtid), hist_size.clone())),
        ];
        body.extend(accs.iter()
            .enumerate()
            .map(|(idx, acc)| definition(acc, info.sub_access(idx, sub_idx(int64(0))))));
        let args = accs.iter()
            .zip(info.dests.iter())
            .map(|(acc, d)| var(acc, scalar(d.elem)))
            .chain((0..accs.len()).map(|idx| info.sub_access(idx, sub_idx(i64_var(&s)))))
            .collect::<Vec<Expr>>();
        body.push(for_range(&s, int64(1), count.clone(), vec![
            apply_lambda(&op.lambda, args, &accs)
        ]));
        body.extend(accs.iter()
            .zip(info.dests.iter())
            .enumerate()
            .map(|(idx, (acc, d))| {
                let dst = info.dest_access(idx, add(mul(i64_var(&seg), hist_size.clone()), i64_var(&j)));
                assign(dst, var(acc, scalar(d.elem)))
            }));

        let total = mul(ctx.segments.clone(), hist_size.clone());
        let kernel_body = vec![
            definition(&gtid, global_id(Dim::X)),
            if_stmt(lt(i64_var(&gtid), total.clone()), body, vec![])
        ];
        let kernel = make_kernel(
            Name::sym_str(&format!("{0}_fold", ctx.op.name)),
            kernel_body,
            vec![],
            vec![ceil_div(total, ctx.group_size.clone())],
            vec![ctx.group_size.clone()],
            ctx.op.i.clone().with_label("subhistogram fold")
        );
        vec![if_stmt(
            neq(count.clone(), int64(1)),
            vec![Stmt::LaunchKernel {kernel, i: i()}],
            vec![]
        )]
    }
}

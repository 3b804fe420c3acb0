use super::ast::*;
use crate::kernel::ast::*;
use crate::kernel::ast_builder::*;
use crate::utils::name::Name;

// Describes the subhistogram arrays of one operator. The arrays have the shape
// 'segments ++ [count] ++ [width] ++ shape', where the count is determined by the chosen strategy
// and may only be known at run time. The allocation itself is emitted separately via
// 'emit_alloc'.
#[derive(Clone, Debug, PartialEq)]
pub struct SubhistogramInfo {
    pub dests: Vec<Dest>,
    pub subs: Vec<Name>,
    pub neutral: Vec<Expr>,

    // The number of segments and the number of elements of one histogram (width times the size
    // of the vector stored per bucket).
    pub segments: Expr,
    pub hist_size: Expr,
}

impl SubhistogramInfo {
    pub fn sub_access(&self, j: usize, idx: Expr) -> Expr {
        access(&self.subs[j], self.dests[j].elem, MemSpace::Device, idx)
    }

    pub fn dest_access(&self, j: usize, idx: Expr) -> Expr {
        access(&self.dests[j].id, self.dests[j].elem, MemSpace::Device, idx)
    }

    // Emits code allocating the subhistograms when there is more than one per segment. The first
    // subhistogram of each segment is initialized with the current contents of the destination,
    // and all others with the neutral element. When there is only one subhistogram, the
    // destination is used directly.
    pub fn emit_alloc(&self, count: &Expr) -> Vec<Stmt> {
        let alias = self.subs.iter()
            .zip(self.dests.iter())
            .map(|(sub, dest)| Stmt::SetMem {dst: sub.clone(), src: dest.id.clone(), i: i()})
            .collect::<Vec<Stmt>>();
        let total = mul(mul(self.segments.clone(), count.clone()), self.hist_size.clone());
        let seg = Name::sym_str("seg");
        let alloc = self.subs.iter()
            .zip(self.dests.iter())
            .zip(self.neutral.iter())
            .flat_map(|((sub, dest), ne)| {
                let copy = Stmt::Copy {
                    dst: sub.clone(),
                    dst_offset: mul(mul(i64_var(&seg), count.clone()), self.hist_size.clone()),
                    src: dest.id.clone(),
                    src_offset: mul(i64_var(&seg), self.hist_size.clone()),
                    count: self.hist_size.clone(),
                    i: i()
                };
                vec![
                    Stmt::Alloc {id: sub.clone(), elem: dest.elem, count: total.clone(), i: i()},
                    Stmt::Fill {
                        id: sub.clone(), offset: int64(0), count: total.clone(),
                        value: ne.clone(), i: i()
                    },
                    for_range(&seg, int64(0), self.segments.clone(), vec![copy]),
                ]
            })
            .collect::<Vec<Stmt>>();
        vec![if_stmt(eq(count.clone(), int64(1)), alias, alloc)]
    }

    pub fn emit_free(&self, count: &Expr) -> Vec<Stmt> {
        let free = self.subs.iter()
            .map(|id| Stmt::Free {id: id.clone(), i: i()})
            .collect::<Vec<Stmt>>();
        vec![if_stmt(neq(count.clone(), int64(1)), free, vec![])]
    }
}

pub struct Usage {
    // The number of bytes of one histogram of all operators combined.
    pub hist_bytes: Expr,
    pub subhistograms: Vec<SubhistogramInfo>,
}

// Computes the memory footprint of the operators of a histogram and describes the subhistograms
// of each operator. The sizes are given as expressions over host variables.
pub fn plan(segments: &Expr, widths: &[Expr], vec_sizes: &[Expr], ops: &[ReductionOperator]) -> Usage {
    let hist_bytes = sum(ops.iter()
        .zip(widths.iter().zip(vec_sizes.iter()))
        .map(|(op, (w, v))| mul(mul(w.clone(), v.clone()), int64(op.bytes_per_elem())))
        .collect());
    let subhistograms = ops.iter()
        .zip(widths.iter().zip(vec_sizes.iter()))
        .map(|(op, (w, v))| {
            let subs = op.dests.iter()
                .map(|d| Name::sym_str(&format!("{0}_sub", d.id)))
                .collect();
            SubhistogramInfo {
                dests: op.dests.clone(),
                subs,
                neutral: op.neutral.clone(),
                segments: segments.clone(),
                hist_size: mul(w.clone(), v.clone()),
            }
        })
        .collect();
    Usage {hist_bytes, subhistograms}
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hist::test::*;
    use crate::kernel::constant_fold::{as_const_int, fold_stmts};

    fn two_operator_usage() -> Usage {
        let mut h = counting_hist(4, 10);
        let mut op = h.operators[0].clone();
        op.dests = vec![
            Dest {id: Name::sym_str("a"), elem: ElemSize::F64},
            Dest {id: Name::sym_str("b"), elem: ElemSize::I16},
        ];
        op.neutral = vec![float(0.0, ElemSize::F64), int(0, ElemSize::I16)];
        h.operators.push(op);
        let widths = vec![int64(10), int64(3)];
        let vec_sizes = vec![int64(1), int64(2)];
        plan(&int64(1), &widths, &vec_sizes, &h.operators)
    }

    #[test]
    fn bytes_per_histogram_sums_over_operators_and_destinations() {
        // 10 * 1 * 4 + 3 * 2 * (8 + 2)
        let u = two_operator_usage();
        assert_eq!(as_const_int(&u.hist_bytes), Some(100));
    }

    #[test]
    fn one_subhistogram_array_per_destination() {
        let u = two_operator_usage();
        assert_eq!(u.subhistograms.len(), 2);
        assert_eq!(u.subhistograms[1].subs.len(), 2);
        assert_eq!(as_const_int(&u.subhistograms[1].hist_size), Some(6));
    }

    #[test]
    fn single_subhistogram_aliases_destination() {
        let u = two_operator_usage();
        let info = &u.subhistograms[0];
        let stmts = fold_stmts(info.emit_alloc(&int64(1)));
        assert_eq!(stmts, vec![Stmt::SetMem {
            dst: info.subs[0].clone(), src: info.dests[0].id.clone(), i: i()
        }]);
        assert!(fold_stmts(info.emit_free(&int64(1))).is_empty());
    }

    #[test]
    fn multiple_subhistograms_allocate_fill_and_copy() {
        let u = two_operator_usage();
        let info = &u.subhistograms[0];
        let stmts = fold_stmts(info.emit_alloc(&int64(3)));
        assert_eq!(stmts.len(), 3);
        match &stmts[0] {
            Stmt::Alloc {count, elem, ..} => {
                assert_eq!(as_const_int(count), Some(30));
                assert_eq!(*elem, ElemSize::I32);
            },
            s => panic!("Expected allocation, found {s:?}")
        };
        assert!(matches!(stmts[1], Stmt::Fill {..}));
        assert!(matches!(stmts[2], Stmt::For {..}));
    }
}

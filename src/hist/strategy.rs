use crate::kernel::ast::*;
use crate::kernel::ast_builder::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    // The histogram has no buckets, so no code needs to be generated.
    Skip,

    // Accumulate into the given number of subhistograms per group, kept in local memory.
    Local {subhistograms: i64},

    // Accumulate into subhistograms kept in global memory.
    Global,
}

// The quantities the strategy selection is based on, all in bytes except for the group size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostInputs {
    pub hist_bytes: i64,
    pub group_size: i64,
    pub thread_bytes: i64,
    pub max_local_memory: i64,
    pub lock_bytes: i64,
}

// Division rounding towards positive infinity. Unlike the usual (n + d - 1) / d, this cannot
// overflow for large numerators.
fn div_round_up(n: i64, d: i64) -> i64 {
    let q = n / d;
    if n % d != 0 && (n < 0) == (d < 0) { q + 1 } else { q }
}

// The number of threads needed to cooperatively cover the memory of one histogram when each
// thread is granted the given number of bytes.
pub fn cooperation_level(hist_bytes: i64, thread_bytes: i64) -> i64 {
    div_round_up(hist_bytes, thread_bytes)
}

// The number of complete histograms fitting in the local memory granted to a group.
pub fn local_subhistograms(group_size: i64, thread_bytes: i64, hist_bytes: i64) -> i64 {
    let group_bytes = group_size.saturating_mul(thread_bytes);
    div_round_up(group_bytes, hist_bytes)
}

impl CostInputs {
    pub fn select(&self) -> Strategy {
        let CostInputs {hist_bytes: h, group_size: g, thread_bytes: t, max_local_memory, lock_bytes} = *self;
        if h == 0 {
            return Strategy::Skip;
        }
        if t <= 0 || g <= 0 {
            return Strategy::Global;
        }
        let coop = cooperation_level(h, t);
        let lh = local_subhistograms(g, t, h);
        let required = h.checked_mul(lh).and_then(|b| b.checked_add(lock_bytes));
        match required {
            Some(bytes) if bytes <= max_local_memory && coop <= g => {
                Strategy::Local {subhistograms: lh}
            },
            _ => Strategy::Global
        }
    }
}

pub fn select(h: i64, g: i64, t: i64, lmax: i64, lock_bytes: i64) -> Strategy {
    let inputs = CostInputs {
        hist_bytes: h, group_size: g, thread_bytes: t, max_local_memory: lmax, lock_bytes
    };
    inputs.select()
}

pub fn local_subhistograms_expr(g: Expr, t: Expr, h: Expr) -> Expr {
    ceil_div(mul(g, t), h)
}

// A boolean expression, evaluated on the host, that is true when the local-memory strategy is to
// be used. It encodes the same decision as 'select' for a non-zero histogram size.
pub fn select_expr(h: Expr, g: Expr, t: Expr, lmax: Expr, lock_bytes: Expr) -> Expr {
    let lh = local_subhistograms_expr(g.clone(), t.clone(), h.clone());
    let coop = ceil_div(h.clone(), t.clone());
    let fits = leq(add(lock_bytes, mul(h, lh)), lmax);
    let valid = and(binop(t, BinOp::Gt, int64(0)), binop(g.clone(), BinOp::Gt, int64(0)));
    and(valid, and(fits, leq(coop, g)))
}

#[cfg(test)]
mod test {
    use super::*;
    use super::Strategy;
    use crate::kernel::constant_fold::fold_expr;

    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn eval_select_expr(h: i64, g: i64, t: i64, lmax: i64, lock_bytes: i64) -> Option<bool> {
        let e = select_expr(int64(h), int64(g), int64(t), int64(lmax), int64(lock_bytes));
        match fold_expr(e) {
            Expr::Bool {v, ..} => Some(v),
            _ => None
        }
    }

    #[test]
    fn zero_size_histogram_is_skipped() {
        assert_eq!(select(0, 256, 48, 49152, 0), Strategy::Skip);
    }

    #[test]
    fn small_histogram_uses_local_memory() {
        // H = 16, so LH = ceil(256 * 48 / 16) = 768 and H * LH = 12288 <= 49152.
        assert_eq!(select(16, 256, 48, 49152, 0), Strategy::Local {subhistograms: 768});
    }

    #[test]
    fn exact_local_memory_boundary_chooses_local() {
        // LH = ceil(8 * 4 / 16) = 2, H * LH = 32.
        assert_eq!(select(16, 8, 4, 32, 0), Strategy::Local {subhistograms: 2});
        assert_eq!(select(16, 8, 4, 31, 0), Strategy::Global);
    }

    #[test]
    fn lock_bytes_count_against_local_memory() {
        assert_eq!(select(16, 8, 4, 64, 32), Strategy::Local {subhistograms: 2});
        assert_eq!(select(16, 8, 4, 64, 33), Strategy::Global);
    }

    #[test]
    fn cooperation_level_equal_to_group_size_chooses_local() {
        // COOP = ceil(64 / 8) = 8 = G.
        assert_eq!(cooperation_level(64, 8), 8);
        assert_eq!(select(64, 8, 8, 1 << 20, 0), Strategy::Local {subhistograms: 1});
        // COOP = 9 > G.
        assert_eq!(select(72, 8, 8, 1 << 20, 0), Strategy::Global);
    }

    #[test]
    fn large_histogram_uses_global_memory() {
        assert_eq!(select(1 << 20, 256, 48, 49152, 0), Strategy::Global);
    }

    #[test]
    fn missing_thread_budget_uses_global_memory() {
        assert_eq!(select(16, 256, 0, 49152, 0), Strategy::Global);
    }

    #[test]
    fn extreme_sizes_do_not_overflow() {
        assert_eq!(cooperation_level(i64::MAX, 2), i64::MAX / 2 + 1);
        assert_eq!(cooperation_level(i64::MAX, i64::MAX), 1);
        assert_eq!(local_subhistograms(i64::MAX, i64::MAX, 3), i64::MAX / 3 + 1);
        assert_eq!(local_subhistograms(2, 3, i64::MAX), 1);
        assert_eq!(
            select(i64::MAX, i64::MAX, i64::MAX, i64::MAX, 0),
            Strategy::Local {subhistograms: 1}
        );
        assert_eq!(select(i64::MAX, 1, 1, i64::MAX, 0), Strategy::Global);
    }

    #[test]
    fn rounding_up_division() {
        assert_eq!(div_round_up(7, 2), 4);
        assert_eq!(div_round_up(8, 2), 4);
        assert_eq!(div_round_up(-7, 2), -3);
        assert_eq!(div_round_up(0, 5), 0);
    }

    proptest! {
        #[test]
        fn selection_is_deterministic(
            h in 0i64..100_000, g in 1i64..1024, t in 1i64..256,
            lmax in 0i64..100_000, lock in 0i64..8192
        ) {
            prop_assert_eq!(select(h, g, t, lmax, lock), select(h, g, t, lmax, lock));
        }

        #[test]
        fn runtime_selection_agrees_with_compile_time(
            h in 1i64..100_000, g in 1i64..1024, t in 1i64..256,
            lmax in 0i64..100_000, lock in 0i64..8192
        ) {
            let is_local = matches!(select(h, g, t, lmax, lock), Strategy::Local {..});
            prop_assert_eq!(eval_select_expr(h, g, t, lmax, lock), Some(is_local));
        }

        #[test]
        fn local_subhistograms_fit_thread_budget(
            h in 1i64..100_000, g in 1i64..1024, t in 1i64..256, lmax in 0i64..100_000
        ) {
            if let Strategy::Local {subhistograms} = select(h, g, t, lmax, 0) {
                prop_assert!(subhistograms >= 1);
                prop_assert!(h * subhistograms <= lmax);
                prop_assert!(cooperation_level(h, t) <= g);
            }
        }
    }
}

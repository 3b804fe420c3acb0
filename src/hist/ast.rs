use crate::parhist_internal_error;
use crate::kernel::ast::*;
use crate::kernel::ast_builder::prod;
use crate::utils::err::*;
use crate::utils::info::*;
use crate::utils::name::Name;

// The iteration space of a histogram operation, as an ordered sequence of index variables and
// their sizes. The last dimension produces the buckets; all other dimensions are segment
// dimensions, each segment being an independent instance of the histogram.
pub type IterationSpace = Vec<(Name, Expr)>;

// An existing array which a histogram operator merges its result into.
#[derive(Clone, Debug, PartialEq)]
pub struct Dest {
    pub id: Name,
    pub elem: ElemSize,
}

// A function combining two value tuples of an operator. The first half of the parameters refer to
// the current value and the second half to the new value.
#[derive(Clone, Debug, PartialEq)]
pub struct Lambda {
    pub params: Vec<(Name, ElemSize)>,
    pub body: Vec<Stmt>,
    pub results: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReductionOperator {
    // The number of buckets.
    pub width: Expr,

    // The shape of the values stored in each bucket, and the index variables bound over this
    // shape when computing the values of an update.
    pub shape: Vec<Expr>,
    pub vec_indices: Vec<Name>,

    pub lambda: Lambda,
    pub neutral: Vec<Expr>,
    pub dests: Vec<Dest>,
}

impl ReductionOperator {
    pub fn elem_sizes(&self) -> Vec<ElemSize> {
        self.dests.iter().map(|d| d.elem).collect()
    }

    pub fn bytes_per_elem(&self) -> i64 {
        self.dests.iter().map(|d| d.elem.bytes()).sum()
    }

    // The number of values stored per bucket.
    pub fn vec_size(&self) -> Expr {
        prod(self.shape.clone())
    }
}

// The result of the per-element body for one operator: the bucket to update and the values to
// combine into it, one per destination.
#[derive(Clone, Debug, PartialEq)]
pub struct HistResult {
    pub bucket: Expr,
    pub values: Vec<Expr>,
}

// A per-element value written unchanged to the element of the destination at the flattened index
// of the iteration space.
#[derive(Clone, Debug, PartialEq)]
pub struct MapResult {
    pub dest: Dest,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistBody {
    pub stmts: Vec<Stmt>,
    pub results: Vec<HistResult>,
    pub map_results: Vec<MapResult>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistOp {
    pub name: String,
    pub space: IterationSpace,
    pub operators: Vec<ReductionOperator>,
    pub body: HistBody,
    pub i: Info,
}

impl HistOp {
    pub fn segments(&self) -> &[(Name, Expr)] {
        match self.space.split_last() {
            Some((_, segs)) => segs,
            None => &[]
        }
    }

    pub fn validate(&self) -> CompileResult<()> {
        let i = &self.i;
        if self.space.is_empty() {
            parhist_internal_error!(i, "Histogram {0} has an empty iteration space", self.name)?
        }
        if self.body.results.len() != self.operators.len() {
            parhist_internal_error!(
                i,
                "Histogram {0} has {1} operators but its body produces {2} results",
                self.name, self.operators.len(), self.body.results.len()
            )?
        }
        for (idx, (op, res)) in self.operators.iter().zip(self.body.results.iter()).enumerate() {
            let k = op.dests.len();
            if op.neutral.len() != k {
                parhist_internal_error!(
                    i,
                    "Operator {idx} has {0} neutral elements but {k} destinations",
                    op.neutral.len()
                )?
            }
            if op.lambda.params.len() != 2 * k || op.lambda.results.len() != k {
                parhist_internal_error!(
                    i,
                    "Operator {idx} combines {k} values but its function has {0} parameters \
                     and {1} results",
                    op.lambda.params.len(), op.lambda.results.len()
                )?
            }
            if res.values.len() != k {
                parhist_internal_error!(
                    i,
                    "Operator {idx} has {k} destinations but the body produces {0} values",
                    res.values.len()
                )?
            }
            if op.vec_indices.len() != op.shape.len() {
                parhist_internal_error!(
                    i,
                    "Operator {idx} has a shape of rank {0} but {1} vector indices",
                    op.shape.len(), op.vec_indices.len()
                )?
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hist::test::*;
    use crate::kernel::ast_builder::*;
    use crate::test::assert_error_matches;

    #[test]
    fn valid_counting_histogram() {
        let h = counting_hist(2, 2);
        assert!(h.validate().is_ok());
    }

    #[test]
    fn neutral_count_mismatch() {
        let mut h = counting_hist(2, 2);
        h.operators[0].neutral.push(int(0, ElemSize::I32));
        let r = h.validate();
        assert!(r.clone().unwrap_err().is_internal());
        assert_error_matches(r, "2 neutral elements but 1 destinations");
    }

    #[test]
    fn lambda_arity_mismatch() {
        let mut h = counting_hist(2, 2);
        h.operators[0].lambda.params.pop();
        assert_error_matches(h.validate(), "function has 1 parameters");
    }

    #[test]
    fn result_count_mismatch() {
        let mut h = counting_hist(2, 2);
        h.body.results.clear();
        assert_error_matches(h.validate(), "1 operators but its body produces 0 results");
    }

    #[test]
    fn empty_iteration_space() {
        let mut h = counting_hist(2, 2);
        h.space.clear();
        assert_error_matches(h.validate(), "empty iteration space");
    }

    #[test]
    fn vector_index_mismatch() {
        let mut h = counting_hist(2, 2);
        h.operators[0].shape.push(int64(2));
        assert_error_matches(h.validate(), "rank 1 but 0 vector indices");
    }
}

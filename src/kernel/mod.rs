pub mod ast;
pub mod ast_builder;
pub mod constant_fold;
pub mod free_vars;
pub mod pprint;

use ast::*;
use crate::utils::info::Info;
use crate::utils::name::Name;

// Constructs a kernel, computing the variables it captures from the host code based on its body.
pub fn make_kernel(
    id: Name,
    body: Vec<Stmt>,
    local_mem: Vec<LocalMemory>,
    num_groups: Vec<Expr>,
    group_size: Vec<Expr>,
    i: Info
) -> Kernel {
    let uses = free_vars::free_variables(&body, &local_mem);
    Kernel {id, body, uses, local_mem, num_groups, group_size, i}
}

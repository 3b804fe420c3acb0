pub mod ast;
pub mod codegen;
pub mod grid;
pub mod pprint;
pub mod prelude;

use ast::*;
use codegen::UsedFeatures;
use crate::parhist_runtime_error;
use crate::kernel::ast::{Program, SizeClass};
use crate::option::Target;
use crate::utils::err::*;
use crate::utils::info::Info;
use crate::utils::pprint::*;

use itertools::Itertools;

use std::collections::{BTreeMap, BTreeSet};

// The result of translating the kernels of a program to the language of a target device.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceProgram {
    pub source: String,
    pub prelude: String,
    pub kernel_names: Vec<String>,
    pub launches: Vec<KernelLaunch>,
    pub used_types: BTreeSet<ElemSize>,
    pub sizes: BTreeMap<String, SizeClass>,
}

// What the host needs to know to launch a translated kernel. A permuted kernel takes the physical
// grid dimension of each logical dimension as its trailing block_dim parameters, and is launched
// on the correspondingly permuted grid.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelLaunch {
    pub name: String,
    pub target: Target,
    pub dims: usize,
    pub permuted: bool,
}

impl KernelLaunch {
    fn check_dims(&self, num_groups: &[i64]) -> CompileResult<()> {
        if num_groups.len() == self.dims {
            Ok(())
        } else {
            parhist_runtime_error!(
                Info::default(), "Kernel {0} has {1} grid dimensions but was given {2} group counts",
                self.name, self.dims, num_groups.len()
            )
        }
    }

    pub fn permutation(&self, num_groups: &[i64]) -> CompileResult<Vec<usize>> {
        self.check_dims(num_groups)?;
        if self.permuted {
            Ok(grid::grid_permutation(num_groups))
        } else {
            Ok((0..self.dims).collect())
        }
    }

    // The values of the block_dim parameters, or nothing for a kernel without them.
    pub fn block_dim_args(&self, num_groups: &[i64]) -> CompileResult<Vec<i64>> {
        let perm = self.permutation(num_groups)?;
        if self.permuted {
            Ok(perm.into_iter().map(|d| d as i64).collect())
        } else {
            Ok(vec![])
        }
    }

    // The number of groups per physical dimension of the launch, given the number of groups per
    // logical dimension of the kernel.
    pub fn grid(&self, num_groups: &[i64]) -> CompileResult<Vec<i64>> {
        let perm = self.permutation(num_groups)?;
        let grid = grid::physical_grid(num_groups, &perm);
        if self.target == Target::Cuda && !grid::fits_cuda_grid(&grid) {
            parhist_runtime_error!(
                Info::default(), "Kernel {0} cannot be launched on a grid of {grid:?} groups, as \
                                  CUDA allows at most {1} groups in the secondary dimensions",
                self.name, grid::CUDA_MAX_SECONDARY_GRID_DIM
            )
        } else {
            Ok(grid)
        }
    }
}

impl DeviceProgram {
    // The full text of the program, as passed to the device compiler.
    pub fn full_source(&self) -> String {
        format!("{0}\n\n{1}", self.prelude, self.source)
    }

    pub fn launch(&self, name: &str) -> Option<&KernelLaunch> {
        self.launches.iter().find(|l| l.name == name)
    }
}

const BUILTIN_NAMES: [&'static str; 13] = [
    "get_local_id", "get_local_size", "get_group_id", "get_num_groups", "get_global_id",
    "get_group_id_fn", "get_num_groups_fn", "get_global_id_fn", "physical_dim",
    "barrier_local", "barrier_global", "mem_fence_global", "mem_fence_local",
];

fn reserved_names(used: &UsedFeatures) -> Vec<String> {
    let wrappers = used.atomics.iter()
        .map(|(kind, sz, space)| atomic_wrapper_name(kind, sz, space));
    let intrinsics = used.intrinsics.iter().map(|(f, sz)| intrinsic_name(f, sz));
    let bitcasts = used.bitcasts.iter().map(|(from, to)| bitcast_name(from, to));
    BUILTIN_NAMES.iter()
        .map(|s| s.to_string())
        .chain(std::iter::once("dummy_kernel".to_string()))
        .chain(wrappers)
        .chain(intrinsics)
        .chain(bitcasts)
        .collect()
}

fn print_kernels(
    kernels: &Vec<KernelDef>,
    used: &UsedFeatures
) -> (Vec<String>, Vec<String>) {
    let reserved = reserved_names(used);
    let mut kernel_names: Vec<String> = vec![];
    let mut sources = vec![];
    for k in kernels {
        // Each kernel is printed in its own environment, so that the local names of one kernel
        // do not affect those of another. Kernel names are shared among all of them.
        let env = reserved.iter()
            .chain(kernel_names.iter())
            .fold(PrettyPrintEnv::new(), |env, s| env.reserve(s));
        let (env, id) = k.id.pprint(env);
        let (_, s) = k.pprint(env);
        kernel_names.push(id);
        sources.push(s);
    }
    (kernel_names, sources)
}

pub fn translate(target: Target, program: &Program) -> CompileResult<DeviceProgram> {
    let mut used = UsedFeatures::default();
    let dims = program.kernels().iter().map(|k| k.dims()).collect::<Vec<usize>>();
    let kernels = program.kernels()
        .into_iter()
        .map(|k| codegen::from_kernel(target, k.clone(), &mut used))
        .collect::<CompileResult<Vec<KernelDef>>>()?;
    let (kernel_names, sources) = print_kernels(&kernels, &used);
    let launches = kernel_names.iter()
        .zip(dims.into_iter())
        .map(|(name, dims)| KernelLaunch {
            name: name.clone(), target, dims, permuted: codegen::permutes_grid(target, dims)
        })
        .collect();
    let prelude = prelude::prelude(target, &used);
    tracing::debug!(
        target = ?target, kernels = kernel_names.len(), types = used.types.len(),
        atomics = used.atomics.len(), "translated program"
    );
    Ok(DeviceProgram {
        source: sources.into_iter().join("\n\n"),
        prelude,
        kernel_names,
        launches,
        used_types: used.types,
        sizes: program.sizes.clone(),
    })
}

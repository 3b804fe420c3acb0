use super::ast::*;
use super::codegen::UsedFeatures;
use super::pprint::elem_type_str;
use crate::option::Target;

use itertools::Itertools;

const OPENCL_TYPEDEFS: &'static str = "\
typedef char int8_t;
typedef short int16_t;
typedef int int32_t;
typedef long int64_t;
typedef uchar uint8_t;
typedef ushort uint16_t;
typedef uint uint32_t;
typedef ulong uint64_t;";

const CUDA_TYPEDEFS: &'static str = "\
typedef signed char int8_t;
typedef short int16_t;
typedef int int32_t;
typedef long long int64_t;
typedef unsigned char uint8_t;
typedef unsigned short uint16_t;
typedef unsigned int uint32_t;
typedef unsigned long long uint64_t;
#ifndef INFINITY
#define INFINITY __int_as_float(0x7f800000)
#endif
#ifndef NAN
#define NAN __int_as_float(0x7fffffff)
#endif";

const OPENCL_SYNC: &'static str = "\
static inline void barrier_local() { barrier(CLK_LOCAL_MEM_FENCE); }
static inline void barrier_global() { barrier(CLK_GLOBAL_MEM_FENCE | CLK_LOCAL_MEM_FENCE); }
static inline void mem_fence_global() { mem_fence(CLK_GLOBAL_MEM_FENCE); }
static inline void mem_fence_local() { mem_fence(CLK_LOCAL_MEM_FENCE); }";

const CUDA_SYNC: &'static str = "\
__device__ inline void barrier_local() { __syncthreads(); }
__device__ inline void barrier_global() { __threadfence(); __syncthreads(); }
__device__ inline void mem_fence_global() { __threadfence(); }
__device__ inline void mem_fence_local() { __threadfence_block(); }";

// Functions with the names and meaning of the OpenCL work-item functions, implemented using the
// CUDA built-in variables.
const CUDA_SHIMS: &'static str = "\
__device__ inline int64_t get_local_id(int d) {
  return d == 0 ? threadIdx.x : d == 1 ? threadIdx.y : threadIdx.z;
}
__device__ inline int64_t get_local_size(int d) {
  return d == 0 ? blockDim.x : d == 1 ? blockDim.y : blockDim.z;
}
__device__ inline int64_t get_group_id(int d) {
  return d == 0 ? blockIdx.x : d == 1 ? blockIdx.y : blockIdx.z;
}
__device__ inline int64_t get_num_groups(int d) {
  return d == 0 ? gridDim.x : d == 1 ? gridDim.y : gridDim.z;
}
__device__ inline int64_t get_global_id(int d) {
  return get_group_id(d) * get_local_size(d) + get_local_id(d);
}";

// Variants of the shims taking the mapping from logical to physical grid dimensions.
const CUDA_PERMUTED_SHIMS: &'static str = "\
__device__ inline int physical_dim(int64_t bd0, int64_t bd1, int64_t bd2, int d) {
  return (int)(d == 0 ? bd0 : d == 1 ? bd1 : bd2);
}
__device__ inline int64_t get_group_id_fn(int64_t bd0, int64_t bd1, int64_t bd2, int d) {
  return get_group_id(physical_dim(bd0, bd1, bd2, d));
}
__device__ inline int64_t get_num_groups_fn(int64_t bd0, int64_t bd1, int64_t bd2, int d) {
  return get_num_groups(physical_dim(bd0, bd1, bd2, d));
}
__device__ inline int64_t get_global_id_fn(int64_t bd0, int64_t bd1, int64_t bd2, int d) {
  return get_group_id_fn(bd0, bd1, bd2, d) * get_local_size(d) + get_local_id(d);
}";

// A kernel which does nothing, as some OpenCL implementations reject programs without kernels.
const OPENCL_DUMMY_KERNEL: &'static str = "\
__kernel void dummy_kernel(__global unsigned char *dummy, int n) {
  const int thread_gid = get_global_id(0);
  if (thread_gid >= n) return;
}";

fn function_qualifier(target: Target) -> &'static str {
    match target {
        Target::OpenCL => "static inline",
        Target::Cuda => "__device__ inline",
    }
}

fn opencl_atomic_fun(kind: &AtomicKind, sz: &ElemSize) -> &'static str {
    let wide = sz.bytes() == 8;
    match (kind, wide) {
        (AtomicKind::Op(AtomicOp::Add), false) => "atomic_add",
        (AtomicKind::Op(AtomicOp::Add), true) => "atom_add",
        (AtomicKind::Op(AtomicOp::SMin | AtomicOp::UMin), false) => "atomic_min",
        (AtomicKind::Op(AtomicOp::SMin | AtomicOp::UMin), true) => "atom_min",
        (AtomicKind::Op(AtomicOp::SMax | AtomicOp::UMax), false) => "atomic_max",
        (AtomicKind::Op(AtomicOp::SMax | AtomicOp::UMax), true) => "atom_max",
        (AtomicKind::Op(AtomicOp::And), false) => "atomic_and",
        (AtomicKind::Op(AtomicOp::And), true) => "atom_and",
        (AtomicKind::Op(AtomicOp::Or), false) => "atomic_or",
        (AtomicKind::Op(AtomicOp::Or), true) => "atom_or",
        (AtomicKind::Op(AtomicOp::Xor), false) => "atomic_xor",
        (AtomicKind::Op(AtomicOp::Xor), true) => "atom_xor",
        (AtomicKind::Op(AtomicOp::Xchg), false) => "atomic_xchg",
        (AtomicKind::Op(AtomicOp::Xchg), true) => "atom_xchg",
        (AtomicKind::Cas, false) => "atomic_cmpxchg",
        (AtomicKind::Cas, true) => "atom_cmpxchg",
    }
}

fn cuda_atomic_fun(kind: &AtomicKind) -> &'static str {
    match kind {
        AtomicKind::Op(AtomicOp::Add) => "atomicAdd",
        AtomicKind::Op(AtomicOp::SMin | AtomicOp::UMin) => "atomicMin",
        AtomicKind::Op(AtomicOp::SMax | AtomicOp::UMax) => "atomicMax",
        AtomicKind::Op(AtomicOp::And) => "atomicAnd",
        AtomicKind::Op(AtomicOp::Or) => "atomicOr",
        AtomicKind::Op(AtomicOp::Xor) => "atomicXor",
        AtomicKind::Op(AtomicOp::Xchg) => "atomicExch",
        AtomicKind::Cas => "atomicCAS",
    }
}

// The type the CUDA atomic functions operate on for a given element type. The 64-bit signed
// minimum and maximum are the only 64-bit operations defined on signed integers.
fn cuda_atomic_type(kind: &AtomicKind, sz: &ElemSize) -> &'static str {
    match (kind, sz.bytes(), sz.is_signed_integer()) {
        (_, 4, true) => "int",
        (_, 4, false) => "unsigned int",
        (AtomicKind::Op(AtomicOp::SMin | AtomicOp::SMax), 8, true) => "long long",
        _ => "unsigned long long",
    }
}

pub fn atomic_wrapper(
    target: Target,
    kind: &AtomicKind,
    sz: &ElemSize,
    space: &AtomicSpace
) -> String {
    let name = atomic_wrapper_name(kind, sz, space);
    let ty = elem_type_str(sz);
    let q = function_qualifier(target);
    let (params, args) = match kind {
        AtomicKind::Cas => (format!("{ty} cmp, {ty} val"), vec!["cmp", "val"]),
        AtomicKind::Op(_) => (format!("{ty} val"), vec!["val"]),
    };
    match target {
        Target::OpenCL => {
            let addr_space = match space {
                AtomicSpace::Global => "__global",
                AtomicSpace::Local => "__local",
            };
            let f = opencl_atomic_fun(kind, sz);
            let args = args.iter().join(", ");
            format!("{q} {ty} {name}(volatile {addr_space} {ty}* p, {params}) {{\n\
                     \x20 return {f}(p, {args});\n}}")
        },
        Target::Cuda => {
            let aty = cuda_atomic_type(kind, sz);
            let f = cuda_atomic_fun(kind);
            let args = args.iter().map(|a| format!("({aty}){a}")).join(", ");
            format!("{q} {ty} {name}({ty}* p, {params}) {{\n\
                     \x20 return ({ty}){f}(({aty}*)p, {args});\n}}")
        },
    }
}

fn float_fun(target: Target, base: &str, sz: &ElemSize) -> String {
    match (target, sz) {
        (Target::Cuda, ElemSize::F32) => format!("{base}f"),
        _ => base.to_string()
    }
}

pub fn intrinsic(target: Target, f: &Intrinsic, sz: &ElemSize) -> String {
    let name = intrinsic_name(f, sz);
    let ty = elem_type_str(sz);
    let q = function_qualifier(target);
    let body = match f {
        Intrinsic::Abs if sz.is_floating_point() => format!("{0}(x)", float_fun(target, "fabs", sz)),
        Intrinsic::Abs if sz.is_unsigned_integer() || sz.is_boolean() => "x".to_string(),
        Intrinsic::Abs => "x < 0 ? -x : x".to_string(),
        Intrinsic::Exp => format!("{0}(x)", float_fun(target, "exp", sz)),
        Intrinsic::Log => format!("{0}(x)", float_fun(target, "log", sz)),
        Intrinsic::Sqrt => format!("{0}(x)", float_fun(target, "sqrt", sz)),
        Intrinsic::Max if sz.is_floating_point() => format!("{0}(x, y)", float_fun(target, "fmax", sz)),
        Intrinsic::Max => "x > y ? x : y".to_string(),
        Intrinsic::Min if sz.is_floating_point() => format!("{0}(x, y)", float_fun(target, "fmin", sz)),
        Intrinsic::Min => "x < y ? x : y".to_string(),
    };
    let params = match f {
        Intrinsic::Max | Intrinsic::Min => format!("{ty} x, {ty} y"),
        _ => format!("{ty} x"),
    };
    format!("{q} {ty} {name}({params}) {{ return {body}; }}")
}

fn opencl_type_name(sz: &ElemSize) -> &'static str {
    match sz {
        ElemSize::Bool => "bool",
        ElemSize::I8 => "char",
        ElemSize::I16 => "short",
        ElemSize::I32 => "int",
        ElemSize::I64 => "long",
        ElemSize::U8 => "uchar",
        ElemSize::U16 => "ushort",
        ElemSize::U32 => "uint",
        ElemSize::U64 => "ulong",
        ElemSize::F32 => "float",
        ElemSize::F64 => "double",
    }
}

pub fn bitcast(target: Target, from: &ElemSize, to: &ElemSize) -> String {
    let name = bitcast_name(from, to);
    let from_ty = elem_type_str(from);
    let to_ty = elem_type_str(to);
    let q = function_qualifier(target);
    match target {
        Target::OpenCL => {
            format!("{q} {to_ty} {name}({from_ty} x) {{ return as_{0}(x); }}", opencl_type_name(to))
        },
        Target::Cuda => {
            format!("{q} {to_ty} {name}({from_ty} x) {{\n\
                     \x20 union {{ {from_ty} a; {to_ty} b; }} u;\n\
                     \x20 u.a = x;\n\
                     \x20 return u.b;\n}}")
        },
    }
}

fn uses_wide_atomics(used: &UsedFeatures, extended: bool) -> bool {
    used.atomics.iter().any(|(kind, sz, _)| {
        let is_extended = match kind {
            AtomicKind::Op(AtomicOp::SMin | AtomicOp::SMax | AtomicOp::UMin | AtomicOp::UMax |
                           AtomicOp::And | AtomicOp::Or | AtomicOp::Xor) => true,
            _ => false
        };
        sz.bytes() == 8 && (!extended || is_extended)
    })
}

// Produces the prelude of the device program: the extensions it requires, type definitions,
// synchronization functions, and the functions used by the kernels.
pub fn prelude(target: Target, used: &UsedFeatures) -> String {
    let mut parts = vec![];
    match target {
        Target::OpenCL => {
            if used.types.contains(&ElemSize::F64) {
                parts.push("#pragma OPENCL EXTENSION cl_khr_fp64 : enable".to_string());
            }
            if uses_wide_atomics(used, false) {
                parts.push("#pragma OPENCL EXTENSION cl_khr_int64_base_atomics : enable".to_string());
            }
            if uses_wide_atomics(used, true) {
                parts.push("#pragma OPENCL EXTENSION cl_khr_int64_extended_atomics : enable".to_string());
            }
            parts.push(OPENCL_TYPEDEFS.to_string());
            parts.push(OPENCL_SYNC.to_string());
        },
        Target::Cuda => {
            parts.push(CUDA_TYPEDEFS.to_string());
            parts.push(CUDA_SYNC.to_string());
            parts.push(CUDA_SHIMS.to_string());
            if used.permuted_grid {
                parts.push(CUDA_PERMUTED_SHIMS.to_string());
            }
        },
    };
    parts.extend(used.intrinsics.iter().map(|(f, sz)| intrinsic(target, f, sz)));
    parts.extend(used.bitcasts.iter().map(|(from, to)| bitcast(target, from, to)));
    parts.extend(used.atomics.iter().map(|(kind, sz, space)| atomic_wrapper(target, kind, sz, space)));
    if target == Target::OpenCL {
        parts.push(OPENCL_DUMMY_KERNEL.to_string());
    }
    parts.into_iter().join("\n\n")
}

#[cfg(test)]
mod test {
    use super::*;

    fn used_with_types(types: &[ElemSize]) -> UsedFeatures {
        UsedFeatures {types: types.iter().cloned().collect(), ..UsedFeatures::default()}
    }

    #[test]
    fn opencl_fp64_pragma_only_when_used() {
        let p = prelude(Target::OpenCL, &used_with_types(&[ElemSize::F32]));
        assert!(!p.contains("cl_khr_fp64"));
        let p = prelude(Target::OpenCL, &used_with_types(&[ElemSize::F64]));
        assert!(p.starts_with("#pragma OPENCL EXTENSION cl_khr_fp64 : enable"));
    }

    #[test]
    fn opencl_always_has_dummy_kernel() {
        let p = prelude(Target::OpenCL, &UsedFeatures::default());
        assert!(p.contains("__kernel void dummy_kernel"));
        let p = prelude(Target::Cuda, &UsedFeatures::default());
        assert!(!p.contains("dummy_kernel"));
    }

    #[test]
    fn only_used_atomics_are_emitted() {
        let mut used = UsedFeatures::default();
        used.atomics.insert((AtomicKind::Op(AtomicOp::Add), ElemSize::I32, AtomicSpace::Global));
        let p = prelude(Target::OpenCL, &used);
        assert!(p.contains("atomic_add_i32_global(volatile __global int32_t* p, int32_t val)"));
        assert!(!p.contains("atomic_xchg"));
        assert!(!p.contains("int64_base_atomics"));
    }

    #[test]
    fn wide_atomics_enable_extensions() {
        let mut used = UsedFeatures::default();
        used.atomics.insert((AtomicKind::Op(AtomicOp::SMax), ElemSize::I64, AtomicSpace::Local));
        let p = prelude(Target::OpenCL, &used);
        assert!(p.contains("cl_khr_int64_base_atomics"));
        assert!(p.contains("cl_khr_int64_extended_atomics"));
        assert!(p.contains("return atom_max(p, val);"));
    }

    #[test]
    fn cuda_atomic_wrapper_casts_to_native_type() {
        let s = atomic_wrapper(Target::Cuda, &AtomicKind::Cas, &ElemSize::U64, &AtomicSpace::Global);
        let expected = "__device__ inline uint64_t atomic_cas_u64_global(uint64_t* p, uint64_t cmp, \
                        uint64_t val) {\n  return (uint64_t)atomicCAS((unsigned long long*)p, \
                        (unsigned long long)cmp, (unsigned long long)val);\n}";
        assert_eq!(s, expected);
    }

    #[test]
    fn cuda_permuted_shims_only_when_used() {
        let mut used = UsedFeatures::default();
        assert!(!prelude(Target::Cuda, &used).contains("get_group_id_fn"));
        used.permuted_grid = true;
        assert!(prelude(Target::Cuda, &used).contains("get_group_id_fn"));
    }

    #[test]
    fn intrinsics_per_type() {
        assert_eq!(
            intrinsic(Target::Cuda, &Intrinsic::Max, &ElemSize::F32),
            "__device__ inline float max_f32(float x, float y) { return fmaxf(x, y); }"
        );
        assert_eq!(
            intrinsic(Target::OpenCL, &Intrinsic::Abs, &ElemSize::I64),
            "static inline int64_t abs_i64(int64_t x) { return x < 0 ? -x : x; }"
        );
    }

    #[test]
    fn opencl_bitcast_uses_reinterpretation() {
        assert_eq!(
            bitcast(Target::OpenCL, &ElemSize::F32, &ElemSize::U32),
            "static inline uint32_t bitcast_f32_u32(float x) { return as_uint(x); }"
        );
    }
}

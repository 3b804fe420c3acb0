// Hardware limits of a target device relevant to the histogram compilation. When these are known
// at compile time, the strategy selection can be made by the compiler. Otherwise, the generated
// host code queries the same quantities from the device when it runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceCaps {
    // The maximum number of threads in a group.
    pub max_group_size: i64,

    // The number of threads per group and the number of groups used for a launch when no explicit
    // size has been given.
    pub default_group_size: i64,
    pub default_num_groups: i64,

    // The amount of local (on-chip) memory, in bytes, available to one group.
    pub max_local_memory: i64,

    // The number of bytes of local memory a thread can use without reducing the occupancy of the
    // device.
    pub local_mem_per_thread: i64,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        DeviceCaps {
            max_group_size: 1024,
            default_group_size: 256,
            default_num_groups: 128,
            max_local_memory: 49152,
            local_mem_per_thread: 48,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Target {
    OpenCL, Cuda
}

#[derive(Clone, Debug)]
pub struct CompileOptions {
    // Enable to make the compiler print intermediate programs to standard output.
    pub debug_print: bool,

    // The number of locks in the global lock table used by operators that cannot be updated
    // atomically. Distinct buckets may share a lock.
    pub lock_table_size: i64,

    // Fixed launch sizes of the histogram kernels. When not set, the sizes are registered as
    // runtime-tunable parameters.
    pub group_size: Option<i64>,
    pub num_groups: Option<i64>,

    // Capabilities of the target device, if known at compile time.
    pub device: Option<DeviceCaps>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            debug_print: false,
            lock_table_size: 10000,
            group_size: None,
            num_groups: None,
            device: None,
        }
    }
}

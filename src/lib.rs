pub mod device;
pub mod hist;
pub mod interp;
pub mod kernel;
pub mod option;
pub mod utils;

#[cfg(test)]
mod test;

pub use device::{translate, DeviceProgram};
pub use hist::compile_histogram;
pub use interp::Machine;
pub use interp::value::Value;
pub use option::{CompileOptions, DeviceCaps, Target};
pub use utils::err::{CompileError, CompileResult};

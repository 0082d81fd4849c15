pub mod aggregate_function;
pub mod scalar_function;
pub mod window_function;

use crate::catalog::FunctionInfo;

pub(crate) fn load() -> impl Iterator<Item = FunctionInfo> {
    aggregate_function::load()
        .chain(scalar_function::load())
        .chain(window_function::load())
}

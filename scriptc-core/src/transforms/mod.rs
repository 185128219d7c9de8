//! Module transformations run by the LTO stage and by the script hooks.

mod constant_fold;
mod foreach_expand;
mod global_dce;
mod internalize;

pub use constant_fold::ConstantFoldPass;
pub use foreach_expand::{ELEMENT_SIZE, EXPAND_SUFFIX, ForEachExpandPass};
pub use global_dce::GlobalDcePass;
pub use internalize::InternalizePass;

mod error;
mod module;
mod ops;
mod parser;
mod reflect;
mod reflection;
#[cfg(test)]
mod testing;

pub use error::{ReflectError, Result};
pub use module::Reflector;
pub use ops::{
    BuiltIn, Decoration, Dim, ExecutionMode, ExecutionModel, InvalidEnumValue, Op, SourceLanguage,
    StorageClass,
};
pub use parser::{instructions, Instruction, Version};
pub use reflect::GraphicsApi;
pub use reflection::*;

/// Result ID of an instruction, or a forward reference to one.
pub type Id = u32;

pub(crate) fn is_interface_storage(class: StorageClass) -> bool {
    [StorageClass::Input, StorageClass::Output].contains(&class)
}

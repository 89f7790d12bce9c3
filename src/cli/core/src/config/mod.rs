/* src/cli/core/src/config/mod.rs */

mod loader;
mod types;


pub use loader::{find_ssg_config, load_ssg_config};
pub use types::{
  BuildSection, BundlerSection, CrittersOptions, DirStyle, HooksSection, ModuleFormat,
  PreloadStrategy, SsgConfig,
};

#[cfg(test)]
pub use loader::parse_ssg_config;
#[cfg(test)]
pub use types::CrittersSetting;

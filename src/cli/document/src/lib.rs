/* src/cli/document/src/lib.rs */

// Pure HTML transforms for pre-rendered pages. Nothing here touches the filesystem.

mod document;
mod entry;
mod format;
mod preload;

pub use document::{PageParts, ScriptMode, inject_style_tag, render_html, rewrite_scripts, serialize_state};
pub use entry::{DEFAULT_ENTRY, detect_entry};
pub use format::{Formatting, format_html};
pub use preload::{preload_link, render_preload_links};

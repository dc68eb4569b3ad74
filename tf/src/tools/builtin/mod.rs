//! Builtin tools

mod cross_run_search;
mod list_files;
mod read_file;
mod run_tests;
mod shell;
mod web;
mod write_file;

pub use cross_run_search::CrossRunSearchTool;
pub use list_files::ListFilesTool;
pub use read_file::ReadFileTool;
pub use run_tests::RunTestsTool;
pub use shell::ShellTool;
pub use web::{FetchUrlTool, WebSearchTool};
pub use write_file::WriteFileTool;

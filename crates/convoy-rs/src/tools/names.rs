//! Canonical tool name constants.
//!
//! All tool-name string literals should reference these constants to avoid
//! scattered magic strings. When a tool is renamed, only this file needs
//! to change.

pub const READ_FILE: &str = "read_file";
pub const EDIT_FILE: &str = "edit_file";
pub const WRITE_FILE: &str = "write_file";
pub const DELETE_FILE: &str = "delete_file";
pub const LIST_DIR: &str = "list_dir";
pub const GREP: &str = "grep";
pub const SHELL: &str = "shell";
pub const TODO: &str = "todo";
pub const PLAN: &str = "plan";
pub const ASK_USER: &str = "ask_user";

/// Tools whose results stay intact under every compression level.
pub const PROTECTED_TOOLS: &[&str] = &[TODO, PLAN, ASK_USER];

/// Tools that write file contents through their arguments.
pub const FILE_WRITE_TOOLS: &[&str] = &[WRITE_FILE, EDIT_FILE];

/// Argument fields that carry file bodies or replacement text.
pub const TRUNCATABLE_FIELDS: &[&str] = &["content", "old_string", "new_string"];

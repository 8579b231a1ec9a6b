//! Filesystem layer
//!
//! Path utilities, backup-semantics primitives, the reparse-point codec,
//! security-descriptor copying, and the entry classifier that feeds the
//! sync engine.

pub mod acl;
pub mod item;
pub mod operations;
pub mod path;
pub mod privileges;
pub mod reparse;

pub use acl::{copy_security, get_security_descriptor, set_security_descriptor, SecurityDescriptor};
pub use item::{Item, ItemKind};
pub use operations::{
    copy_file_content, create_directory, create_empty_file, delete_entry, file_length,
    list_directory, read_attributes, rename_entry, write_attributes, BasicAttributes, CopyProgress,
    FileAttributes, ListedEntry, COPY_CHUNK_SIZE,
};
pub use path::{
    ensure_trailing_separator, long_form, normalize_device_root, parent_dir, paths_equal,
    SnapshotPathMap,
};
pub use privileges::enable_backup_privileges;
pub use reparse::{
    delete_junction_data, delete_symlink_data, nice_to_raw, raw_to_nice, read_reparse_data,
    set_junction_data, set_symlink_data, ReparsePointData, ReparseTag,
};

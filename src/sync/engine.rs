//! Mirroring engine
//!
//! Reconciles one target directory tree against a source tree in four
//! phases per directory: removals and kind changes, same-kind syncs,
//! additions, then attribute and ACL refresh. The ordering is
//! load-bearing: earlier phases create the preconditions later ones rely
//! on, the directory's own ACL goes on before its children so inheritable
//! ACEs cascade exactly once, and a subdirectory is fully synced before
//! its parent's refresh phase runs.
//!
//! Reparse points are never traversed: a junction or directory symlink is
//! one opaque entry, both when listing and when deleting.

use crate::error::{MirrorError, Result};
use crate::fs::acl::copy_security;
use crate::fs::item::{Item, ItemKind};
use crate::fs::operations::{
    copy_file_content, create_directory, create_empty_file, delete_entry, list_directory,
    rename_entry, write_attributes, ListedEntry,
};
use crate::fs::path::{normalize_device_root, parent_dir, paths_equal, SnapshotPathMap};
use crate::fs::reparse::{set_junction_data, set_symlink_data, ReparsePointData};
use crate::report::Reporter;
use crate::sync::executor::Guarded;
use chrono::{DateTime, Local};
use humansize::{format_size, BINARY};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Sentinel file a target must contain before it may be mirrored onto.
/// Never compared, copied, or deleted.
pub const GUARD_FILE_NAME: &str = "__HoboMirrorTarget__.txt";

/// Prefix of the per-copy temporary file placed next to the final name
pub const TEMP_FILE_PREFIX: &str = "~HoboMirror-";

/// Behavior switches for one mirror run
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Absolute paths dropped from the source set (their target
    /// counterparts are then deleted like any other extra entry)
    pub ignore_paths: Vec<PathBuf>,
    /// Leaf names of directories dropped from the source set
    pub ignore_dir_names: Vec<String>,
    /// Propagate security descriptors this run
    pub refresh_access_control: bool,
    /// Propagate timestamps and attribute bits this run
    pub update_metadata: bool,
    /// Detect and announce, but mutate nothing
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ignore_paths: Vec::new(),
            ignore_dir_names: Vec::new(),
            refresh_access_control: true,
            update_metadata: true,
            dry_run: false,
        }
    }
}

/// The per-pair mirroring engine
pub struct SyncEngine<'a> {
    options: &'a EngineOptions,
    reporter: &'a Reporter,
    guard: Guarded<'a>,
    map: SnapshotPathMap,
}

impl<'a> SyncEngine<'a> {
    /// Create an engine for one `(source, target)` pair. `map` translates
    /// snapshot-space source paths back to live-volume paths for display
    /// and ignore matching.
    pub fn new(options: &'a EngineOptions, reporter: &'a Reporter, map: SnapshotPathMap) -> Self {
        Self {
            options,
            reporter,
            guard: Guarded::new(reporter, options.dry_run),
            map,
        }
    }

    /// Mirror `target_root` against `source_root`. All outcomes flow
    /// through the reporter.
    pub fn sync_tree(&self, source_root: &Path, target_root: &Path) {
        let source_root = normalize_device_root(source_root);
        let Some(src) = self.guard.run("classify source root", &source_root, || {
            Item::classify(&source_root)
        }) else {
            return;
        };
        let Some(tgt) = self
            .guard
            .run("classify target root", target_root, || Item::classify(target_root))
        else {
            return;
        };

        // Snapshot volume roots list as reparse points but must be walked.
        let src = src.force_dir();
        let tgt = tgt.force_dir();
        self.sync_dir(&src, &tgt, true);
    }

    /// Reconcile one directory pair; both items exist and are
    /// directory-like. `top_level` suppresses the attribute copy onto the
    /// root pair, whose reparse-point attrs cannot be applied meaningfully.
    fn sync_dir(&self, src: &Item, tgt: &Item, top_level: bool) {
        if let Err(error) = self.sync_dir_inner(src, tgt, top_level) {
            let subtree = self.map.display(&src.full_path);
            self.reporter
                .error(&format!("failed to sync subtree '{subtree}': {error}"));
            self.reporter.critical(&format!(
                "unexpected failure escaped the phase loops under '{subtree}'"
            ));
        }
    }

    fn sync_dir_inner(&self, src: &Item, tgt: &Item, top_level: bool) -> Result<()> {
        let Some(src_listing) = self
            .guard
            .run("list directory", &src.full_path, || list_directory(&src.full_path))
        else {
            return Ok(());
        };
        let Some(tgt_listing) = self
            .guard
            .run("list directory", &tgt.full_path, || list_directory(&tgt.full_path))
        else {
            return Ok(());
        };

        let mut src_children: Vec<Item> = self
            .classify_children(&src.full_path, src_listing)
            .into_iter()
            .filter(|child| !is_guard_file(&child.name))
            .filter(|child| !self.is_ignored(child))
            .collect();
        let mut tgt_children: Vec<Item> = self
            .classify_children(&tgt.full_path, tgt_listing)
            .into_iter()
            .filter(|child| !is_guard_file(&child.name))
            .collect();

        sort_children(&mut src_children);
        sort_children(&mut tgt_children);

        // Inheritable ACEs cascade into existing children on write, so the
        // directory's descriptor goes on before any child is touched.
        if self.options.refresh_access_control {
            self.guard.act("copy directory security", &tgt.full_path, || {
                copy_security(&src.full_path, &tgt.full_path, true)
            });
        }

        let src_index: HashMap<String, usize> = src_children
            .iter()
            .enumerate()
            .map(|(i, child)| (name_key(&child.name), i))
            .collect();
        let mut tgt_map: HashMap<String, Item> = tgt_children
            .iter()
            .map(|child| (name_key(&child.name), child.clone()))
            .collect();

        // Phase 1: removals and kind changes. The replacement for a
        // changed kind is created in phase 3.
        for t in &tgt_children {
            let key = name_key(&t.name);
            match src_index.get(&key) {
                None => {
                    self.reporter.change(
                        Some(&t.full_path),
                        &format!("found deleted {}: {}", t.kind.label(), t.full_path.display()),
                    );
                    self.act_delete(t);
                    tgt_map.remove(&key);
                }
                Some(&i) => {
                    let s = &src_children[i];
                    if !s.kind.same_kind(&t.kind) {
                        self.reporter.change(
                            Some(&t.full_path),
                            &format!(
                                "kind changed from {} to {}: {}",
                                t.kind.label(),
                                s.kind.label(),
                                t.full_path.display()
                            ),
                        );
                        self.act_delete(t);
                        tgt_map.remove(&key);
                    }
                }
            }
        }

        // Phase 2: same-name, same-kind reconciliation.
        for s in &src_children {
            let key = name_key(&s.name);
            let Some(t) = tgt_map.get(&key).cloned() else {
                continue;
            };
            match (&s.kind, &t.kind) {
                (ItemKind::Dir, ItemKind::Dir) => self.sync_dir(s, &t, false),
                (ItemKind::File { length: src_len }, ItemKind::File { length: tgt_len }) => {
                    // A content change that keeps both size and write time
                    // stays invisible here.
                    if src_len == tgt_len && s.attrs.modified == t.attrs.modified {
                        continue;
                    }
                    self.reporter.change(
                        Some(&t.full_path),
                        &format!(
                            "modified file: {} ({} -> {}, written {} -> {})",
                            t.full_path.display(),
                            format_size(*tgt_len, BINARY),
                            format_size(*src_len, BINARY),
                            format_time(t.attrs.modified),
                            format_time(s.attrs.modified),
                        ),
                    );
                    let final_path = tgt.full_path.join(&s.name);
                    self.act_copy_or_replace_file(s, &final_path);
                }
                (ItemKind::FileSymlink(sd), ItemKind::FileSymlink(td))
                | (ItemKind::DirSymlink(sd), ItemKind::DirSymlink(td)) => {
                    if symlinks_differ(sd, td) {
                        self.report_link_change(&t, sd, td);
                        self.replace_link(s, &t, &tgt.full_path, &key, &mut tgt_map);
                    }
                }
                (ItemKind::Junction(sd), ItemKind::Junction(td)) => {
                    if junctions_differ(sd, td) {
                        self.report_link_change(&t, sd, td);
                        self.replace_link(s, &t, &tgt.full_path, &key, &mut tgt_map);
                    }
                }
                _ => {
                    // Phase 1 removed every kind mismatch; this cannot fire.
                    let _: Option<()> = self.guard.run("reconcile", &t.full_path, || {
                        Err(MirrorError::unreachable(format!(
                            "kind mismatch survived the removal phase at '{}'",
                            t.full_path.display()
                        )))
                    });
                }
            }
        }

        // Phase 3: additions.
        for s in &src_children {
            let key = name_key(&s.name);
            if tgt_map.contains_key(&key) {
                continue;
            }
            let final_path = tgt.full_path.join(&s.name);
            self.reporter.change(
                Some(&final_path),
                &format!("new {}: {}", s.kind.label(), final_path.display()),
            );
            if self.create_entry(s, &final_path) {
                if let Some(item) = self
                    .guard
                    .run("classify", &final_path, || Item::classify(&final_path))
                {
                    tgt_map.insert(key, item);
                }
            }
        }

        // Phase 4: attribute and ACL refresh of non-directory children.
        // Directory children were handled by their own sync_dir call.
        for s in &src_children {
            if s.kind.is_dir() {
                continue;
            }
            let Some(t) = tgt_map.get(&name_key(&s.name)) else {
                continue;
            };
            let target_path = t.full_path.clone();
            if self.options.refresh_access_control {
                self.guard.act("copy security", &target_path, || {
                    copy_security(&s.full_path, &target_path, false)
                });
            }
            if self.options.update_metadata {
                self.guard.act("copy attributes", &target_path, || {
                    write_attributes(&target_path, &s.attrs)
                });
            }
        }

        if !top_level && self.options.update_metadata {
            self.guard.act("copy directory attributes", &tgt.full_path, || {
                write_attributes(&tgt.full_path, &src.attrs)
            });
        }

        Ok(())
    }

    fn classify_children(&self, dir: &Path, listing: Vec<ListedEntry>) -> Vec<Item> {
        let mut items = Vec::with_capacity(listing.len());
        for entry in listing {
            let path = dir.join(&entry.name);
            if let Some(item) = self
                .guard
                .run("classify", &path, || Item::classify_listed(dir, &entry))
            {
                items.push(item);
            }
        }
        items
    }

    fn is_ignored(&self, child: &Item) -> bool {
        let original = self.map.to_original(&child.full_path);
        if self
            .options
            .ignore_paths
            .iter()
            .any(|p| paths_equal(&original, p))
        {
            self.reporter
                .debug(&format!("ignoring '{}' (ignore path)", original.display()));
            return true;
        }
        if child.kind.is_dir() {
            let name = child.name.to_string_lossy();
            if self
                .options
                .ignore_dir_names
                .iter()
                .any(|n| name.eq_ignore_ascii_case(n))
            {
                self.reporter.debug(&format!(
                    "ignoring '{}' (ignore directory name)",
                    original.display()
                ));
                return true;
            }
        }
        false
    }

    /// Reparse-safe recursive delete. Only a plain directory is descended
    /// into; a junction or directory symlink is removed as one entry,
    /// leaving its target alone.
    fn act_delete(&self, item: &Item) {
        if item.kind.is_dir() {
            let Some(listing) = self
                .guard
                .run("list directory", &item.full_path, || list_directory(&item.full_path))
            else {
                return;
            };
            let mut children = self.classify_children(&item.full_path, listing);
            sort_children(&mut children);
            for child in &children {
                self.act_delete(child);
            }
            self.guard.act("delete directory", &item.full_path, || {
                delete_entry(&item.full_path, true)
            });
        } else {
            let directory = item.attrs.flags.is_directory();
            self.guard
                .act("delete", &item.full_path, || delete_entry(&item.full_path, directory));
        }
    }

    fn report_link_change(&self, t: &Item, sd: &ReparsePointData, td: &ReparsePointData) {
        self.reporter.change(
            Some(&t.full_path),
            &format!(
                "link target changed: {} ('{}' -> '{}')",
                t.full_path.display(),
                td.substitute_name,
                sd.substitute_name,
            ),
        );
    }

    fn replace_link(
        &self,
        s: &Item,
        t: &Item,
        tgt_dir: &Path,
        key: &str,
        tgt_map: &mut HashMap<String, Item>,
    ) {
        self.act_delete(t);
        tgt_map.remove(key);
        let final_path = tgt_dir.join(&s.name);
        if self.create_entry(s, &final_path) {
            if let Some(item) = self
                .guard
                .run("classify", &final_path, || Item::classify(&final_path))
            {
                tgt_map.insert(key.to_string(), item);
            }
        }
    }

    /// Create the target rendering of one source entry. Directories are
    /// created and then recursed into; files go through the crash-safe
    /// replace; links are an empty placeholder plus reparse data.
    fn create_entry(&self, s: &Item, final_path: &Path) -> bool {
        match &s.kind {
            ItemKind::Dir => {
                if !self
                    .guard
                    .act("create directory", final_path, || create_directory(final_path))
                {
                    return false;
                }
                let Some(t) = self
                    .guard
                    .run("classify", final_path, || Item::classify(final_path))
                else {
                    return false;
                };
                self.sync_dir(s, &t, false);
                true
            }
            ItemKind::File { .. } => self.act_copy_or_replace_file(s, final_path),
            ItemKind::FileSymlink(data) => {
                self.guard.act("create file symlink", final_path, || {
                    create_empty_file(final_path)?;
                    set_symlink_data(final_path, &data.substitute_name, &data.print_name, data.relative)
                })
            }
            ItemKind::DirSymlink(data) => {
                self.guard.act("create directory symlink", final_path, || {
                    create_directory(final_path)?;
                    set_symlink_data(final_path, &data.substitute_name, &data.print_name, data.relative)
                })
            }
            ItemKind::Junction(data) => {
                self.guard.act("create junction", final_path, || {
                    create_directory(final_path)?;
                    set_junction_data(final_path, &data.substitute_name, &data.print_name)
                })
            }
        }
    }

    /// Crash-safe file replacement: copy into a temporary sibling, then
    /// atomically rename over the final name. The final name always holds
    /// either the complete old bytes or the complete new bytes. On rename
    /// failure the temporary file stays behind; cleanup is out of scope.
    /// Attributes and ACLs are phase 4's job, not this method's.
    fn act_copy_or_replace_file(&self, s: &Item, final_path: &Path) -> bool {
        let Some(parent) = parent_dir(final_path) else {
            let _: Option<()> = self.guard.run("replace file", final_path, || {
                Err(MirrorError::unreachable(format!(
                    "no parent directory for '{}'",
                    final_path.display()
                )))
            });
            return false;
        };
        let temp_path = parent.join(temp_file_name());
        let detail = format!(
            "{} from {}",
            final_path.display(),
            self.map.display(&s.full_path)
        );
        let mut progress = self.reporter.copy_progress(&s.name.to_string_lossy());
        let copied = self.guard.act_detail("copy file", &detail, &s.full_path, || {
            copy_file_content(&s.full_path, &temp_path, |p| progress.update(p)).map(|_| ())
        });
        progress.finish();
        if !copied {
            return false;
        }
        self.guard.act("replace file", final_path, || {
            rename_entry(&temp_path, final_path, true)
        })
    }
}

/// Guard-file test, case-insensitive on the leaf name
pub fn is_guard_file(name: &OsStr) -> bool {
    name.to_string_lossy().eq_ignore_ascii_case(GUARD_FILE_NAME)
}

/// One fresh `~HoboMirror-<16 alphanumerics>.tmp` name
pub fn temp_file_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("{TEMP_FILE_PREFIX}{suffix}.tmp")
}

fn name_key(name: &OsStr) -> String {
    name.to_string_lossy().to_lowercase()
}

/// Non-directories first, then case-insensitive name: leaves are handled
/// before containers in every phase.
fn sort_children(children: &mut [Item]) {
    children.sort_by_key(|child| (child.kind.is_dir(), name_key(&child.name)));
}

fn symlinks_differ(a: &ReparsePointData, b: &ReparsePointData) -> bool {
    a.substitute_name != b.substitute_name
        || a.print_name != b.print_name
        || a.relative != b.relative
}

/// Junctions carry no relative flag; only the two names matter
fn junctions_differ(a: &ReparsePointData, b: &ReparsePointData) -> bool {
    a.substitute_name != b.substitute_name || a.print_name != b.print_name
}

fn format_time(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string()
}

//! 出力フォルダの移行
//!
//! `<run>/network/...` と `<run>/microreact_<cluster>/...` の構成を
//! `<run>/visualise_<cluster>/...` に組み替えます。
//!
//! 各パスは既存ファイルを確認してからコピー・リネームするため、
//! 何度実行しても同じ結果になります。途中で失敗しても再実行で続きから進みます。

use crate::error::{MigrateError, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const BACKUP_SUFFIX: &str = "_backup";
const NETWORK_DIR: &str = "network";
const OLD_PREFIX: &str = "microreact_";
const NEW_PREFIX: &str = "visualise_";
const COMPONENT: &str = "network_component";
const PRUNED_COMPONENT: &str = "pruned_network_component";

#[allow(clippy::expect_used)]
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static regex should not panic"));

/// パスごとの処理件数
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub backups: usize,
    pub pruned_copies: usize,
    pub renamed_folders: usize,
    pub renamed_files: usize,
    pub csv_copies: usize,
    pub graphml_copies: usize,
    /// 警告を出してスキップしたファイル
    pub skipped: usize,
}

impl MigrationReport {
    /// 変更を加えた件数の合計
    pub fn changes(&self) -> usize {
        self.backups
            + self.pruned_copies
            + self.renamed_folders
            + self.renamed_files
            + self.csv_copies
            + self.graphml_copies
    }
}

/// ファイル名に含まれる最小の整数（割り当てられたクラスタ番号）
pub fn cluster_number(file_name: &str) -> Option<u64> {
    NUMBER
        .find_iter(file_name)
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .min()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .map_err(MigrateError::io(dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(MigrateError::io(dir))?;
    entries.sort();
    Ok(entries)
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == extension))
        .collect())
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(MigrateError::io(from))?;
    Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(MigrateError::io(from))
}

/// 移行対象のランフォルダ（`network/` を含み、バックアップではないもの）
pub fn output_folders(base: &Path) -> Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Err(MigrateError::OutputDirNotFound(base.to_path_buf()));
    }
    Ok(sorted_entries(base)?
        .into_iter()
        .filter(|p| p.is_dir() && !file_name(p).ends_with("backup"))
        .filter(|p| p.join(NETWORK_DIR).exists())
        .collect())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(MigrateError::io(dst))?;

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let out = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&out).map_err(MigrateError::io(&out))?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &out)?;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }
    Ok(())
}

/// 各ランフォルダを `<run>_backup` に複製（既にあればスキップ）
pub fn create_backups(folders: &[PathBuf], report: &mut MigrationReport) -> Result<()> {
    info!(folders = folders.len(), "Creating backups of output folders");
    for folder in folders {
        let backup = PathBuf::from(format!("{}{}", folder.display(), BACKUP_SUFFIX));
        if backup.exists() {
            debug!(backup = %backup.display(), "Backup already exists");
            continue;
        }
        copy_dir_recursive(folder, &backup)?;
        info!(backup = %backup.display(), "Created backup");
        report.backups += 1;
    }
    Ok(())
}

/// ランフォルダ配下の全サブフォルダ
pub fn subfolders(folders: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut all = Vec::new();
    for folder in folders {
        for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                all.push(entry.into_path());
            }
        }
    }
    Ok(all)
}

fn network_folders(all: &[PathBuf]) -> impl Iterator<Item = &PathBuf> {
    all.iter()
        .filter(|p| file_name(p) == NETWORK_DIR && p.is_dir())
}

/// `network_component*` に `pruned_network_component*` のコピーを追加
pub fn add_pruned_copies(all: &[PathBuf], report: &mut MigrationReport) -> Result<()> {
    info!("Adding pruned network component files");
    for network in network_folders(all) {
        for file in sorted_entries(network)? {
            let name = file_name(&file);
            if !file.is_file() || !name.starts_with(COMPONENT) {
                continue;
            }
            let target = network.join(name.replace(COMPONENT, PRUNED_COMPONENT));
            if target.exists() {
                debug!(file = %name, "Pruned version already exists");
                continue;
            }
            copy_file(&file, &target)?;
            info!(from = %name, to = %file_name(&target), "Copied pruned version");
            report.pruned_copies += 1;
        }
    }
    Ok(())
}

/// `microreact_*` フォルダと中のファイルを `visualise_*` にリネーム
///
/// リネーム後のパスに置き換えたフォルダ一覧を返します。
pub fn rename_to_visualise(
    all: &[PathBuf],
    report: &mut MigrationReport,
) -> Result<Vec<PathBuf>> {
    info!("Renaming microreact folders and files to visualise");
    let mut updated = all.to_vec();

    for (i, folder) in all.iter().enumerate() {
        let name = file_name(folder);
        if !name.starts_with(OLD_PREFIX) {
            continue;
        }
        let renamed = folder.with_file_name(name.replacen(OLD_PREFIX, NEW_PREFIX, 1));

        if !renamed.exists() {
            if !folder.is_dir() {
                continue;
            }
            rename(folder, &renamed)?;
            info!(from = %name, to = %file_name(&renamed), "Renamed folder");
            report.renamed_folders += 1;
            updated[i] = renamed.clone();
        } else if folder.exists() {
            warn!(
                folder = %folder.display(),
                target = %renamed.display(),
                "Both folders exist, leaving the old one in place"
            );
        }

        let files: Vec<PathBuf> = WalkDir::new(&renamed)
            .sort_by_file_name()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        for file in files {
            let current = file_name(&file);
            if !current.starts_with(OLD_PREFIX) {
                continue;
            }
            let target = file.with_file_name(current.replacen(OLD_PREFIX, NEW_PREFIX, 1));
            if target.exists() {
                continue;
            }
            rename(&file, &target)?;
            debug!(from = %file.display(), to = %target.display(), "Renamed file");
            report.renamed_files += 1;
        }
    }

    Ok(updated)
}

fn visualise_folders(parent: &Path) -> Result<Vec<PathBuf>> {
    Ok(sorted_entries(parent)?
        .into_iter()
        .filter(|p| p.is_dir() && file_name(p).starts_with(NEW_PREFIX))
        .collect())
}

/// CSV を全ての `visualise_*` フォルダにコピー（`network` をフォルダ名に置換）
pub fn copy_csv_files(
    network: &Path,
    parent: &Path,
    report: &mut MigrationReport,
) -> Result<()> {
    let targets = visualise_folders(parent)?;
    for file in files_with_extension(network, "csv")? {
        let name = file_name(&file);
        for folder in &targets {
            let target = folder.join(name.replace(NETWORK_DIR, &file_name(folder)));
            if target.exists() {
                continue;
            }
            copy_file(&file, &target)?;
            info!(from = %name, to = %target.display(), "Copied CSV file");
            report.csv_copies += 1;
        }
    }
    Ok(())
}

/// GraphML をクラスタ番号に対応する `visualise_<n>` フォルダにコピー
pub fn copy_graphml_files(
    network: &Path,
    parent: &Path,
    report: &mut MigrationReport,
) -> Result<()> {
    for file in files_with_extension(network, "graphml")? {
        let name = file_name(&file);
        let Some(cluster) = cluster_number(&name) else {
            warn!(file = %file.display(), "No cluster number found in file name, skipping");
            report.skipped += 1;
            continue;
        };

        let folder_name = format!("{}{}", NEW_PREFIX, cluster);
        let folder = parent.join(&folder_name);
        if !folder.is_dir() {
            debug!(file = %name, folder = %folder_name, "No matching visualise folder");
            continue;
        }

        let target = folder.join(name.replace(NETWORK_DIR, &folder_name));
        if target.exists() {
            continue;
        }
        copy_file(&file, &target)?;
        info!(from = %name, to = %target.display(), "Copied GraphML file");
        report.graphml_copies += 1;
    }
    Ok(())
}

/// バックアップ以降のパス（pruned コピー、リネーム、CSV、GraphML）
pub fn migrate_tree(folders: &[PathBuf], report: &mut MigrationReport) -> Result<()> {
    let all = subfolders(folders)?;
    add_pruned_copies(&all, report)?;
    let all = rename_to_visualise(&all, report)?;

    info!("Copying network files to visualise folders");
    for network in network_folders(&all) {
        let Some(parent) = network.parent() else {
            continue;
        };
        copy_csv_files(network, parent, report)?;
        copy_graphml_files(network, parent, report)?;
    }
    Ok(())
}

/// フォルダ移行の全パス
pub fn migrate_folders(base: &Path) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();
    let folders = output_folders(base)?;
    create_backups(&folders, &mut report)?;
    migrate_tree(&folders, &mut report)?;
    Ok(report)
}

/// 出力ディレクトリ直下の `*backup` フォルダを削除
///
/// 削除に失敗したフォルダは警告を出して残します。
pub fn cleanup_backups(base: &Path) -> Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Err(MigrateError::OutputDirNotFound(base.to_path_buf()));
    }
    let mut removed = Vec::new();
    for folder in sorted_entries(base)? {
        if !folder.is_dir() || !file_name(&folder).ends_with("backup") {
            continue;
        }
        match fs::remove_dir_all(&folder) {
            Ok(()) => {
                info!(folder = %folder.display(), "Removed backup");
                removed.push(folder);
            }
            Err(e) => warn!(folder = %folder.display(), error = %e, "Failed to remove backup"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_cluster_number() {
        assert_eq!(cluster_number("network_component_3.graphml"), Some(3));
        assert_eq!(cluster_number("network_cluster_12_component_4.graphml"), Some(4));
        assert_eq!(cluster_number("network_cytoscape.graphml"), None);
        assert_eq!(cluster_number("visualise_007.graphml"), Some(7));
    }

    #[test]
    fn test_output_folders_ignores_backups_and_plain_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("run1/network")).unwrap();
        fs::create_dir_all(dir.path().join("run1_backup/network")).unwrap();
        fs::create_dir_all(dir.path().join("run2/visualise_1")).unwrap();

        let folders = output_folders(dir.path()).unwrap();
        assert_eq!(folders, vec![dir.path().join("run1")]);
    }

    #[test]
    fn test_output_folders_missing_base() {
        let dir = TempDir::new().unwrap();
        let err = output_folders(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, MigrateError::OutputDirNotFound(_)));
    }

    #[test]
    fn test_backup_copies_tree_once() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("run1/network/network_component_1.graphml"), "g");
        let folders = output_folders(dir.path()).unwrap();

        let mut report = MigrationReport::default();
        create_backups(&folders, &mut report).unwrap();
        create_backups(&folders, &mut report).unwrap();

        assert_eq!(report.backups, 1);
        let copied = dir.path().join("run1_backup/network/network_component_1.graphml");
        assert_eq!(fs::read_to_string(copied).unwrap(), "g");
    }

    #[test]
    fn test_rename_folder_and_files() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("run1");
        touch(&run.join("network/network_component_1.graphml"), "");
        touch(&run.join("microreact_5/microreact_5_core_NJ.nwk"), "tree");
        touch(&run.join("microreact_5/other.csv"), "");

        let mut report = MigrationReport::default();
        let all = subfolders(&[run.clone()]).unwrap();
        let updated = rename_to_visualise(&all, &mut report).unwrap();

        assert!(updated.contains(&run.join("visualise_5")));
        assert!(!run.join("microreact_5").exists());
        assert!(run.join("visualise_5/visualise_5_core_NJ.nwk").exists());
        assert!(run.join("visualise_5/other.csv").exists());
        assert_eq!(report.renamed_folders, 1);
        assert_eq!(report.renamed_files, 1);
    }

    #[test]
    fn test_csv_copied_into_every_visualise_folder() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("run1");
        touch(&run.join("network/network_cytoscape.csv"), "a,b");
        fs::create_dir_all(run.join("visualise_1")).unwrap();
        fs::create_dir_all(run.join("visualise_2")).unwrap();

        let mut report = MigrationReport::default();
        copy_csv_files(&run.join("network"), &run, &mut report).unwrap();

        assert_eq!(report.csv_copies, 2);
        assert!(run.join("visualise_1/visualise_1_cytoscape.csv").exists());
        assert!(run.join("visualise_2/visualise_2_cytoscape.csv").exists());
        assert!(run.join("network/network_cytoscape.csv").exists());
    }

    #[test]
    fn test_cleanup_backups() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("run1/network")).unwrap();
        fs::create_dir_all(dir.path().join("run1_backup/network")).unwrap();
        fs::create_dir_all(dir.path().join("run2_backup")).unwrap();

        let removed = cleanup_backups(dir.path()).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(dir.path().join("run1").exists());
        assert!(!dir.path().join("run1_backup").exists());
    }
}

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    /// `config/beebop.yml` を書き込む
    pub fn write_config(&self) {
        let dir = self.config_dir();
        fs::create_dir_all(&dir).unwrap();
        beebop_config::testing::write_sample_config(&dir).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_named(&self, name: &str, content: &str) {
        let dir = self.config_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.yml", name)), content).unwrap();
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.path().join("config")
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}

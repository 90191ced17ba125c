//! On-disk artifact layout (§6).

use camino::{Utf8Path, Utf8PathBuf};

/// Resolves the fixed relative paths under a node's `data_dir`.
#[derive(Clone, Debug)]
pub struct DataDir {
    root: Utf8PathBuf,
}

impl DataDir {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn private_key(&self) -> Utf8PathBuf {
        self.root.join("keys/private.pem")
    }

    #[must_use]
    pub fn public_key(&self) -> Utf8PathBuf {
        self.root.join("keys/public.pem")
    }

    #[must_use]
    pub fn libp2p_key(&self) -> Utf8PathBuf {
        self.root.join("keys/libp2p_key.bin")
    }

    #[must_use]
    pub fn pow_cache(&self) -> Utf8PathBuf {
        self.root.join("keys/pow_cache.bin")
    }

    #[must_use]
    pub fn revocations_dir(&self) -> Utf8PathBuf {
        self.root.join("keys/revocations")
    }

    #[must_use]
    pub fn index_db(&self, db_path: &str) -> Utf8PathBuf {
        if Utf8Path::new(db_path).is_absolute() {
            Utf8PathBuf::from(db_path)
        } else {
            self.root.join(db_path)
        }
    }

    #[must_use]
    pub fn dedup_db(&self) -> Utf8PathBuf {
        self.root.join("dedup.db")
    }

    #[must_use]
    pub fn links_db(&self) -> Utf8PathBuf {
        self.root.join("links.db")
    }

    #[must_use]
    pub fn credits_db(&self) -> Utf8PathBuf {
        self.root.join("credits.db")
    }

    #[must_use]
    pub fn credit_sync_db(&self) -> Utf8PathBuf {
        self.root.join("credit_sync.db")
    }

    #[must_use]
    pub fn vector_dir(&self) -> Utf8PathBuf {
        self.root.join("chroma")
    }

    #[must_use]
    pub fn status_file(&self) -> Utf8PathBuf {
        self.root.join("p2p_status.json")
    }

    /// Ensure `root` and the `keys/` subdirectory exist, with the `keys/`
    /// directory restricted to owner access on unix platforms.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.root.join("keys/revocations"))?;
        std::fs::create_dir_all(self.vector_dir())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let keys_dir = self.root.join("keys");
            let mut perms = std::fs::metadata(&keys_dir)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(&keys_dir, perms)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_are_relative_to_root() {
        let dir = DataDir::new("/var/lib/infomesh");
        assert_eq!(
            dir.private_key().as_str(),
            "/var/lib/infomesh/keys/private.pem"
        );
        assert_eq!(dir.dedup_db().as_str(), "/var/lib/infomesh/dedup.db");
    }

    #[test]
    fn absolute_index_db_path_is_preserved() {
        let dir = DataDir::new("/var/lib/infomesh");
        assert_eq!(dir.index_db("/elsewhere/index.db").as_str(), "/elsewhere/index.db");
        assert_eq!(
            dir.index_db("index.db").as_str(),
            "/var/lib/infomesh/index.db"
        );
    }
}

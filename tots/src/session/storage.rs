//! Stockage clé/valeur de la session (mémoire ou fichiers JSON)

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Écriture abandonnée faute de place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityWarning {
    pub key: String,
    /// Taille déjà occupée, en Ko arrondis
    pub storage_kb: usize,
    /// Taille de la valeur refusée, en Ko arrondis
    pub item_kb: usize,
}

impl CapacityWarning {
    pub fn title(&self) -> &'static str {
        "Session Storage Limit Reached"
    }
}

impl fmt::Display for CapacityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "New storage size would be {}K up from {}K already in storage",
            self.storage_kb + self.item_kb,
            self.storage_kb
        )
    }
}

/// Stockage clé/valeur avec quota
///
/// Un dépassement de quota n'est pas une erreur : l'écriture est abandonnée
/// et `set` retourne un [`CapacityWarning`].
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<Option<CapacityWarning>>;

    fn remove(&mut self, key: &str) -> Result<()>;

    /// Octets occupés (clés + valeurs)
    fn used_bytes(&self) -> Result<usize>;
}

fn round_kb(bytes: usize) -> usize {
    (bytes + 512) / 1024
}

/// Vérifie qu'une écriture tient dans le quota
///
/// `previous` est la taille de la valeur remplacée (0 si la clé est neuve).
fn check_quota(
    key: &str,
    value: &str,
    used: usize,
    previous: usize,
    quota: usize,
) -> Option<CapacityWarning> {
    let entry = if previous > 0 { previous + key.len() } else { 0 };
    let next = used.saturating_sub(entry) + key.len() + value.len();
    if next <= quota {
        return None;
    }

    let warning = CapacityWarning {
        key: key.to_string(),
        storage_kb: round_kb(used),
        item_kb: round_kb(value.len()),
    };
    warn!(key, quota, requested = next, "{}", warning);
    Some(warning)
}

/// Stockage en mémoire
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    items: BTreeMap<String, String>,
    quota_bytes: usize,
}

impl MemoryStorage {
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            items: BTreeMap::new(),
            quota_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<Option<CapacityWarning>> {
        let previous = self.items.get(key).map_or(0, String::len);
        if let Some(warning) = check_quota(key, value, self.used_bytes()?, previous, self.quota_bytes) {
            return Ok(Some(warning));
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(None)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }

    fn used_bytes(&self) -> Result<usize> {
        Ok(self.items.iter().map(|(k, v)| k.len() + v.len()).sum())
    }
}

/// Stockage sur disque : un fichier `<clé>.json` par clé
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    quota_bytes: usize,
}

impl FileStorage {
    /// Ouvre (et crée si besoin) le répertoire de session
    pub fn open(dir: &Path, quota_bytes: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create session directory: {}", dir.display()))?;
        debug!(dir = %dir.display(), quota_bytes, "Session ouverte");
        Ok(Self {
            dir: dir.to_path_buf(),
            quota_bytes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn size_of(&self, key: &str) -> Result<usize> {
        match std::fs::metadata(self.path_of(key)) {
            Ok(meta) => Ok(meta.len() as usize),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e).context(format!("Failed to stat session key: {}", key)),
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_of(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Failed to read session file: {}", path.display())),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<Option<CapacityWarning>> {
        let previous = self.size_of(key)?;
        if let Some(warning) = check_quota(key, value, self.used_bytes()?, previous, self.quota_bytes) {
            return Ok(Some(warning));
        }

        // écriture atomique : fichier temporaire puis renommage
        let path = self.path_of(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        std::fs::write(&tmp, value)
            .context(format!("Failed to write session file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .context(format!("Failed to replace session file: {}", path.display()))?;
        Ok(None)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_of(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!("Failed to remove session file: {}", path.display())),
        }
    }

    fn used_bytes(&self) -> Result<usize> {
        let entries = std::fs::read_dir(&self.dir)
            .context(format!("Failed to list session directory: {}", self.dir.display()))?;

        let mut total = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if key.starts_with('.') {
                continue;
            }
            total += key.len() + entry.metadata()?.len() as usize;
        }
        Ok(total)
    }
}

//! University directory backing the school search endpoints, persisted as a
//! JSON snapshot next to the other app data.

pub mod import;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub use import::{builtin_updates, import_csv, normalise_code};

pub const SNAPSHOT_FILE: &str = "universities.json";
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct University {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

impl University {
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self
                .alias
                .as_deref()
                .is_some_and(|alias| alias.to_lowercase().contains(needle))
    }
}

/// A curated entry applied over the directory: `alias` and a missing `code`
/// are filled in for known names, unknown names are inserted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversityUpdate {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    universities: Vec<University>,
}

#[derive(Debug, Default)]
pub struct UniversityDirectory {
    path: Option<PathBuf>,
    universities: Vec<University>,
}

impl UniversityDirectory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens `<data_dir>/universities.json`, starting empty when it does not
    /// exist yet.
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(&data_dir.join(SNAPSHOT_FILE))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let universities = if path.is_file() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("unable to read {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&text)
                .with_context(|| format!("invalid university snapshot {}", path.display()))?;
            snapshot.universities
        } else {
            Vec::new()
        };
        let mut directory = Self {
            path: Some(path.to_path_buf()),
            universities,
        };
        directory.universities.sort_by_key(|u| u.id);
        Ok(directory)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let snapshot = Snapshot {
            universities: self.universities.clone(),
        };
        let text = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, text).with_context(|| format!("unable to write {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.universities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.universities.is_empty()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&University> {
        self.universities.iter().find(|u| u.name == name)
    }

    fn next_id(&self) -> u64 {
        self.universities.iter().map(|u| u.id).max().unwrap_or(0) + 1
    }

    /// Adds a university unless the name is already taken. The id is
    /// assigned here. Returns whether it was inserted.
    pub fn insert(&mut self, mut university: University) -> bool {
        if self.get_by_name(&university.name).is_some() {
            return false;
        }
        university.id = self.next_id();
        self.universities.push(university);
        true
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<University>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ApiError::unprocessable("query parameter `q` must not be empty").into());
        }
        Ok(self
            .universities
            .iter()
            .filter(|u| u.matches(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn list(&self, limit: usize, offset: usize) -> Vec<University> {
        self.universities
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the number of universities added or changed.
    pub fn apply_updates(&mut self, updates: &[UniversityUpdate]) -> usize {
        let mut changes = 0;
        for update in updates {
            match self.universities.iter_mut().find(|u| u.name == update.name) {
                Some(existing) => {
                    let mut changed = false;
                    if let Some(alias) = update.alias.as_deref().filter(|a| !a.is_empty()) {
                        if existing.alias.as_deref() != Some(alias) {
                            existing.alias = Some(alias.to_string());
                            changed = true;
                        }
                    }
                    let missing_code = existing.code.as_deref().map_or(true, str::is_empty);
                    if let Some(code) = update.code.as_deref().filter(|c| missing_code && !c.is_empty()) {
                        existing.code = Some(code.to_string());
                        changed = true;
                    }
                    if changed {
                        changes += 1;
                    }
                }
                None => {
                    self.insert(University {
                        name: update.name.clone(),
                        code: update.code.clone(),
                        location: update.location.clone(),
                        alias: update.alias.clone(),
                        department: Some("教育厅".to_string()),
                        level: Some("本科".to_string()),
                        ..University::default()
                    });
                    changes += 1;
                }
            }
        }
        changes
    }

    /// Empties the directory and removes the snapshot file.
    pub fn clear(&mut self) -> Result<()> {
        self.universities.clear();
        if let Some(path) = self.path.as_deref().filter(|p| p.exists()) {
            fs::remove_file(path).with_context(|| format!("unable to remove {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> University {
        University {
            name: name.to_string(),
            ..University::default()
        }
    }

    #[test]
    fn names_stay_unique_and_ids_grow() {
        let mut directory = UniversityDirectory::in_memory();
        assert!(directory.insert(named("浙江大学")));
        assert!(directory.insert(named("复旦大学")));
        assert!(!directory.insert(named("浙江大学")));
        let ids: Vec<u64> = directory.list(10, 0).iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn search_matches_name_and_alias() {
        let mut directory = UniversityDirectory::in_memory();
        directory.insert(University {
            alias: Some("ZJUT".to_string()),
            ..named("浙江工业大学")
        });
        directory.insert(named("浙江大学"));
        directory.insert(named("北京大学"));

        let hits = directory.search("浙江", 20).unwrap();
        assert_eq!(hits.len(), 2);
        let hits = directory.search("zjut", 20).unwrap();
        assert_eq!(hits[0].name, "浙江工业大学");
        assert_eq!(directory.search("大学", 1).unwrap().len(), 1);

        let err = directory.search("  ", 20).unwrap_err();
        assert_eq!(err.downcast_ref::<ApiError>().map(|e| e.status), Some(422));
    }

    #[test]
    fn updates_fill_alias_and_code() {
        let mut directory = UniversityDirectory::in_memory();
        directory.insert(named("浙江大学"));
        let updates = vec![
            UniversityUpdate {
                name: "浙江大学".to_string(),
                code: Some("4133010335".to_string()),
                location: Some("杭州".to_string()),
                alias: Some("zju".to_string()),
            },
            UniversityUpdate {
                name: "宁波大学".to_string(),
                code: Some("4133011646".to_string()),
                location: Some("宁波".to_string()),
                alias: None,
            },
        ];
        assert_eq!(directory.apply_updates(&updates), 2);
        assert_eq!(directory.apply_updates(&updates), 0);

        let zju = directory.get_by_name("浙江大学").unwrap();
        assert_eq!(zju.alias.as_deref(), Some("zju"));
        assert_eq!(zju.code.as_deref(), Some("4133010335"));
        let nbu = directory.get_by_name("宁波大学").unwrap();
        assert_eq!(nbu.department.as_deref(), Some("教育厅"));
        assert_eq!(nbu.level.as_deref(), Some("本科"));
    }
}

//! Persisted collection of search hits.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::harvest::traits::ResultSetError;
use crate::model::{RepoId, SearchResultRecord};

/// Ordered search hits, as returned across all pages.
///
/// Uniqueness of `(owner, name)` is not enforced; see [`ResultSet::unique_ids`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<SearchResultRecord>,
}

impl ResultSet {
    pub fn new(records: Vec<SearchResultRecord>) -> Self {
        Self { records }
    }

    /// `<output_dir>/q-repo-list_<suffix>.json`
    pub fn path_for(output_dir: &Path, suffix: &str) -> PathBuf {
        output_dir.join(format!("q-repo-list_{}.json", suffix))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SearchResultRecord] {
        &self.records
    }

    /// Number of records per license key; unlicensed rows count under `"none"`.
    pub fn license_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            let key = record.license_key().unwrap_or("none");
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Copy sorted by star count, most popular first. Ties keep their order.
    pub fn sorted_by_stars(&self) -> ResultSet {
        let mut records = self.records.clone();
        records.sort_by(|a, b| b.stargazers_count.cmp(&a.stargazers_count));
        ResultSet { records }
    }

    /// Distinct repository ids in record order; the first occurrence wins.
    ///
    /// Records whose owner or name cannot form a [`RepoId`] are logged and
    /// left out.
    pub fn unique_ids(&self) -> Vec<RepoId> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for record in &self.records {
            match record.repo_id() {
                Ok(id) => {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
                Err(e) => warn!(name = %record.name, error = %e, "Skipping record with unusable id"),
            }
        }
        ids
    }

    /// Writes the set as a pretty-printed JSON array, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), ResultSetError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ResultSetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json =
            serde_json::to_vec_pretty(&self.records).map_err(|source| ResultSetError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        std::fs::write(path, json).map_err(|source| ResultSetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ResultSetError> {
        let raw = std::fs::read(path).map_err(|source| ResultSetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records = serde_json::from_slice(&raw).map_err(|source| ResultSetError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: &str, name: &str, stars: u64) -> SearchResultRecord {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "owner": { "login": owner },
            "stargazers_count": stars
        }))
        .unwrap()
    }

    #[test]
    fn test_sorted_by_stars_is_stable() {
        let set = ResultSet::new(vec![
            record("a", "low", 1),
            record("b", "tie1", 5),
            record("c", "high", 9),
            record("d", "tie2", 5),
        ]);

        let names: Vec<String> = set
            .sorted_by_stars()
            .records()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, vec!["high", "tie1", "tie2", "low"]);
    }

    #[test]
    fn test_unique_ids_keeps_first_and_drops_invalid() {
        let set = ResultSet::new(vec![
            record("a", "x", 1),
            record("a", "x", 2),
            record("a/b", "bad", 3),
            record("b", "y", 4),
        ]);

        let ids: Vec<String> = set.unique_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["a/x", "b/y"]);
    }

    #[test]
    fn test_license_counts() {
        let mut mit = record("a", "x", 1);
        mit.license = Some(serde_json::from_value(serde_json::json!({ "key": "mit" })).unwrap());
        let set = ResultSet::new(vec![mit.clone(), record("b", "y", 2), mit]);

        let counts = set.license_counts();
        assert_eq!(counts.get("mit"), Some(&2));
        assert_eq!(counts.get("none"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = ResultSet::path_for(&dir.path().join("nested"), "q-kdb");
        assert!(path.ends_with("q-repo-list_q-kdb.json"));

        let set = ResultSet::new(vec![record("a", "x", 1), record("b", "y", 2)]);
        set.save(&path).unwrap();

        assert_eq!(ResultSet::load(&path).unwrap(), set);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            ResultSet::load(&path),
            Err(ResultSetError::Json { .. })
        ));
    }
}

//! Assessment structure lookups.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum SpecIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Read-only view of one assessment's structure and version map.
pub trait SpecificationService: Send + Sync {
    /// Code printed on every page of this assessment.
    fn public_code(&self) -> &str;
    /// Version printed on `(paper_id, page_id)`, `None` if the slot does not exist.
    fn page_version(&self, paper_id: u32, page_id: u32) -> Option<u32>;
    fn question_version(&self, paper_id: u32, question_id: u32) -> Option<u32>;
    /// Fixed pages that hold `question_id`.
    fn question_pages(&self, question_id: u32) -> Vec<u32>;
    fn questions_on_page(&self, page_id: u32) -> Vec<u32>;
    /// Page carrying the student identification box.
    fn id_page(&self) -> Option<u32>;
}

/// Versions of one paper.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperVersions {
    #[serde(default)]
    pub pages: BTreeMap<u32, u32>,
    #[serde(default)]
    pub questions: BTreeMap<u32, u32>,
}

/// JSON-backed [`SpecificationService`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSpec {
    pub public_code: String,
    #[serde(default)]
    pub id_page: Option<u32>,
    /// question id → fixed pages.
    #[serde(default)]
    pub question_pages: BTreeMap<u32, Vec<u32>>,
    /// paper id → versions.
    #[serde(default)]
    pub papers: BTreeMap<u32, PaperVersions>,
}

impl ExamSpec {
    pub fn new(public_code: impl Into<String>) -> Self {
        Self {
            public_code: public_code.into(),
            ..Self::default()
        }
    }

    pub fn with_id_page(mut self, page_id: u32) -> Self {
        self.id_page = Some(page_id);
        self
    }

    pub fn with_question(mut self, question_id: u32, pages: impl IntoIterator<Item = u32>) -> Self {
        self.question_pages
            .insert(question_id, pages.into_iter().collect());
        self
    }

    /// Add `paper_id` with every page and question at `version`.
    ///
    /// Pages are `1..=num_pages`; questions are those already registered.
    pub fn with_uniform_paper(mut self, paper_id: u32, num_pages: u32, version: u32) -> Self {
        let pages = (1..=num_pages).map(|p| (p, version)).collect();
        let questions = self.question_pages.keys().map(|&q| (q, version)).collect();
        self.papers
            .insert(paper_id, PaperVersions { pages, questions });
        self
    }

    pub fn with_paper(mut self, paper_id: u32, versions: PaperVersions) -> Self {
        self.papers.insert(paper_id, versions);
        self
    }

    /// Load a JSON spec from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SpecIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SpecIoError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

impl SpecificationService for ExamSpec {
    fn public_code(&self) -> &str {
        &self.public_code
    }

    fn page_version(&self, paper_id: u32, page_id: u32) -> Option<u32> {
        self.papers.get(&paper_id)?.pages.get(&page_id).copied()
    }

    fn question_version(&self, paper_id: u32, question_id: u32) -> Option<u32> {
        self.papers
            .get(&paper_id)?
            .questions
            .get(&question_id)
            .copied()
    }

    fn question_pages(&self, question_id: u32) -> Vec<u32> {
        self.question_pages
            .get(&question_id)
            .cloned()
            .unwrap_or_default()
    }

    fn questions_on_page(&self, page_id: u32) -> Vec<u32> {
        self.question_pages
            .iter()
            .filter(|(_, pages)| pages.contains(&page_id))
            .map(|(&q, _)| q)
            .collect()
    }

    fn id_page(&self) -> Option<u32> {
        self.id_page
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Paper 7 with pages 1..=4; ID on page 1, q1 on pages 2-3, q2 on page 4.
    pub(crate) fn sample_spec() -> ExamSpec {
        ExamSpec::new("93849")
            .with_id_page(1)
            .with_question(1, [2, 3])
            .with_question(2, [4])
            .with_uniform_paper(7, 4, 1)
            .with_uniform_paper(8, 4, 2)
    }

    #[test]
    fn lookups_follow_version_map() {
        let spec = sample_spec();
        assert_eq!(spec.public_code(), "93849");
        assert_eq!(spec.page_version(7, 3), Some(1));
        assert_eq!(spec.page_version(8, 3), Some(2));
        assert_eq!(spec.page_version(7, 5), None);
        assert_eq!(spec.page_version(9, 1), None);
        assert_eq!(spec.question_version(8, 2), Some(2));
        assert_eq!(spec.question_pages(1), vec![2, 3]);
        assert!(spec.question_pages(9).is_empty());
        assert_eq!(spec.questions_on_page(4), vec![2]);
        assert!(spec.questions_on_page(1).is_empty());
        assert_eq!(spec.id_page(), Some(1));
    }

    #[test]
    fn json_round_trip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("spec.json");
        let spec = sample_spec();
        spec.write_json(&path).expect("write");
        assert_eq!(ExamSpec::load_json(&path).expect("load"), spec);
    }

    #[test]
    fn integer_keys_parse_from_json_strings() {
        let spec: ExamSpec = serde_json::from_str(
            r#"{"public_code": "00042", "papers": {"3": {"pages": {"1": 2}}}}"#,
        )
        .expect("parse");
        assert_eq!(spec.page_version(3, 1), Some(2));
        assert_eq!(spec.question_version(3, 1), None);
    }
}

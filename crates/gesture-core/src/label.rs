//! ラベル名 ↔ クラスID の対応表

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::take::TakeSet;

/// 辞書順に並べたラベルに 0 から連番を振った全単射
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    /// ラベル集合から作成（2クラス未満はエラー）
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        let labels: Vec<String> = sorted.into_iter().collect();
        if labels.len() < 2 {
            return Err(Error::InsufficientClasses {
                found: labels.len(),
                labels,
            });
        }
        Ok(Self { labels })
    }

    /// 集約済みテイクに現れる全ラベルから作成
    pub fn from_takes(takes: &TakeSet) -> Result<Self> {
        Self::from_labels(takes.takes().iter().map(|t| t.key.label.as_str()))
    }

    pub fn id(&self, label: &str) -> Option<usize> {
        self.labels.binary_search_by(|l| l.as_str().cmp(label)).ok()
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl std::fmt::Display for LabelMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{label:?}: {i}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_sorted_lexicographically() {
        let map = LabelMap::from_labels(["wave", "punch", "wave", "circle"]).unwrap();
        assert_eq!(map.num_classes(), 3);
        assert_eq!(map.id("circle"), Some(0));
        assert_eq!(map.id("punch"), Some(1));
        assert_eq!(map.id("wave"), Some(2));
        assert_eq!(map.id("kick"), None);
        assert_eq!(map.label(1), Some("punch"));
        assert_eq!(map.to_string(), r#"{"circle": 0, "punch": 1, "wave": 2}"#);
    }

    #[test]
    fn single_label_is_insufficient() {
        let err = LabelMap::from_labels(["wave", "wave"]).unwrap_err();
        match err {
            Error::InsufficientClasses { found, labels } => {
                assert_eq!(found, 1);
                assert_eq!(labels, vec!["wave".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! Blob key layout: `prefix + task key + extension`.

use serde::{Deserialize, Serialize};

use crate::domain::{ImageKind, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyLayout {
    pub source_prefix: String,
    pub watermark_prefix: String,
    pub result_prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            source_prefix: "source/".to_string(),
            watermark_prefix: "watermark/".to_string(),
            result_prefix: "result/".to_string(),
        }
    }
}

impl KeyLayout {
    pub fn source_key(&self, id: TaskId, kind: ImageKind) -> String {
        build(&self.source_prefix, id, kind)
    }

    pub fn watermark_key(&self, id: TaskId, kind: ImageKind) -> String {
        build(&self.watermark_prefix, id, kind)
    }

    pub fn result_key(&self, id: TaskId, kind: ImageKind) -> String {
        build(&self.result_prefix, id, kind)
    }
}

fn build(prefix: &str, id: TaskId, kind: ImageKind) -> String {
    format!("{prefix}{}{}", id.key(), kind.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn keys_use_prefix_bare_id_and_extension() {
        let ulid = Ulid::new();
        let id = TaskId::from_ulid(ulid);
        let keys = KeyLayout::default();

        assert_eq!(keys.source_key(id, ImageKind::Jpeg), format!("source/{ulid}.jpg"));
        assert_eq!(keys.watermark_key(id, ImageKind::Png), format!("watermark/{ulid}.png"));
        assert_eq!(keys.result_key(id, ImageKind::Gif), format!("result/{ulid}.gif"));
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{AgentClass, Contact, ContactKind};

/// テープのメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TapeMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 再生するエージェントの設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TapeAgent {
    #[serde(default)]
    pub class: AgentClass,
}

fn nothing() -> ContactKind {
    ContactKind::Nothing
}

/// 1ティック分の記録済みセンサー値
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Frame {
    pub heading: f64,
    pub health: f64,
    #[serde(default = "nothing")]
    pub front: ContactKind,
    #[serde(default)]
    pub radar: Vec<Contact>,
    #[serde(default)]
    pub inbox: Vec<String>,
}

/// センサーテープ全体
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tape {
    pub meta: TapeMeta,
    #[serde(default)]
    pub agent: TapeAgent,
    pub frames: Vec<Frame>,
}

impl Tape {
    /// YAMLファイルからテープを読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TapeError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(TapeError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| TapeError::Io(path.to_path_buf(), e))?;

        let tape: Tape =
            serde_yaml::from_str(&contents).map_err(|e| TapeError::Parse(path.to_path_buf(), e))?;

        tape.validate()?;
        Ok(tape)
    }

    /// テープの基本的な検証
    pub fn validate(&self) -> Result<(), TapeError> {
        if self.frames.is_empty() {
            return Err(TapeError::Empty);
        }
        if let Some(index) = self
            .frames
            .iter()
            .position(|f| !f.heading.is_finite() || !f.health.is_finite())
        {
            return Err(TapeError::Validation(format!(
                "frame {} has a non-finite heading or health",
                index
            )));
        }
        Ok(())
    }

    /// テープの概要を表示
    pub fn print_summary(&self) {
        println!("=== テープ情報 ===");
        println!("名前: {}", self.meta.name);
        if !self.meta.description.is_empty() {
            println!("説明: {}", self.meta.description);
        }
        println!("機体種別: {:?}", self.agent.class);
        println!("フレーム数: {}", self.frames.len());

        let messages: usize = self.frames.iter().map(|f| f.inbox.len()).sum();
        let hostiles = self
            .frames
            .iter()
            .filter(|f| f.radar.iter().any(|c| c.kind.is_hostile()))
            .count();
        println!("受信メッセージ: {}件", messages);
        println!("敵が映っているフレーム: {}", hostiles);
    }
}

/// テープ読み込みエラー
#[derive(Debug, Error)]
pub enum TapeError {
    #[error("テープファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("YAML解析エラー {}: {1}", .0.display())]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("テープにフレームがありません")]
    Empty,

    #[error("テープ検証エラー: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAPE: &str = r#"
meta:
  name: corridor
agent:
  class: Secondary
frames:
  - heading: 0.0
    health: 100.0
  - heading: 0.0
    health: 100.0
    front: Wreck
    radar:
      - { kind: Wreck, bearing: 0.0, range: 90.0 }
    inbox: ["BORDER|NORTH|40"]
"#;

    #[test]
    fn test_parse_tape_with_defaults() {
        let tape: Tape = serde_yaml::from_str(TAPE).unwrap();
        assert!(tape.validate().is_ok());
        assert_eq!(tape.agent.class, AgentClass::Secondary);
        assert_eq!(tape.frames[0].front, ContactKind::Nothing);
        assert!(tape.frames[0].radar.is_empty());
        assert_eq!(tape.frames[1].radar[0].kind, ContactKind::Wreck);
        assert_eq!(tape.frames[1].inbox.len(), 1);
    }

    #[test]
    fn test_empty_tape_rejected() {
        let tape: Tape = serde_yaml::from_str("meta: { name: empty }\nframes: []\n").unwrap();
        assert!(matches!(tape.validate(), Err(TapeError::Empty)));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Tape::from_file("no/such/tape.yaml"),
            Err(TapeError::FileNotFound(_))
        ));
    }
}
